//! The boundary between tables and an expression evaluator.
//!
//! A [`ScriptEngine`] compiles expression text once per column against a
//! [`ScriptEnv`] naming the columns it may reference, then evaluates the
//! compiled form row by row. The row being evaluated is passed in explicitly
//! as a [`RowScope`]; nothing about the current row or column lives in
//! thread-local state.

use crate::column::ColumnValue;
use crate::error::ScriptError;
use std::fmt;

/// Names of the columns an expression can see, in positional order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptEnv {
    columns: Vec<String>,
}

impl ScriptEnv {
    pub fn new(columns: Vec<String>) -> Self {
        ScriptEnv { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of a column. Exact names win over case-insensitive matches.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .or_else(|| self.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
    }
}

/// The row an expression is evaluated against.
///
/// `values` holds one slot per environment column. A slot is `None` for a
/// computed column that comes later in the same row and has not been
/// evaluated yet; reading it yields null.
#[derive(Debug, Clone, Copy)]
pub struct RowScope<'a> {
    pub row: usize,
    pub col: usize,
    env: &'a ScriptEnv,
    values: &'a [Option<ColumnValue>],
}

impl<'a> RowScope<'a> {
    pub fn new(row: usize, col: usize, env: &'a ScriptEnv, values: &'a [Option<ColumnValue>]) -> Self {
        RowScope {
            row,
            col,
            env,
            values,
        }
    }

    pub fn env(&self) -> &ScriptEnv {
        self.env
    }

    pub fn value(&self, name: &str) -> Result<ColumnValue, ScriptError> {
        let position = self
            .env
            .position(name)
            .ok_or_else(|| ScriptError::UnknownColumn(name.to_string()))?;
        self.value_at(position)
    }

    /// Value by zero-based position.
    pub fn value_at(&self, position: usize) -> Result<ColumnValue, ScriptError> {
        if position >= self.env.columns.len() {
            return Err(ScriptError::UnknownColumn(format!("${}", position + 1)));
        }
        Ok(self
            .values
            .get(position)
            .cloned()
            .flatten()
            .unwrap_or_default())
    }
}

/// A compiled expression, ready to evaluate against rows.
pub trait CompiledScript: Send + Sync + fmt::Debug {
    fn source(&self) -> &str;

    fn evaluate(&self, scope: &RowScope<'_>) -> Result<ColumnValue, ScriptError>;
}

pub trait ScriptEngine: Send + Sync {
    fn compile(&self, expression: &str, env: &ScriptEnv) -> Result<Box<dyn CompiledScript>, ScriptError>;

    fn execute(&self, script: &dyn CompiledScript, scope: &RowScope<'_>) -> Result<ColumnValue, ScriptError> {
        script.evaluate(scope)
    }

    /// A human-readable fix for `error`, used only in error messages.
    fn suggest_fix(&self, _expression: &str, _error: &ScriptError, _env: &ScriptEnv) -> Option<String> {
        None
    }
}
