//! Error types shared by every lens.

use thiserror::Error;

/// Failure raised by the expression evaluator boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("cannot compile '{expression}': {message}")]
    Compile { expression: String, message: String },

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("type error: {0}")]
    Type(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LensError {
    /// Bad arguments detected at call time. Never retried.
    #[error("invalid configuration: {0}")]
    Precondition(String),

    #[error("{lens} does not support {operation}")]
    Unsupported {
        lens: &'static str,
        operation: &'static str,
    },

    #[error(
        "cross join of {left_rows} x {right_rows} rows over {columns} columns would produce \
         {cells} cells, exceeding the limit of {limit} (property crossjoin.cell.max)"
    )]
    CellLimitExceeded {
        left_rows: usize,
        right_rows: usize,
        columns: usize,
        cells: u128,
        limit: u64,
    },

    #[error("row {row} out of range [0, {rows})")]
    RowOutOfRange { row: usize, rows: usize },

    #[error("column {col} out of range [0, {cols})")]
    ColumnOutOfRange { col: usize, cols: usize },

    #[error("expression for column '{column}' failed: {cause}{}", suggestion_suffix(.suggestion))]
    ExpressionFailed {
        column: String,
        cause: ScriptError,
        suggestion: Option<String>,
    },

    #[error("table materialization was cancelled")]
    Cancelled,

    #[error("invalid value '{value}' for property {key}")]
    InvalidProperty { key: String, value: String },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(fix) => format!(" (suggested fix: {fix})"),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, LensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_error_message_includes_suggestion() {
        let err = LensError::ExpressionFailed {
            column: "total".to_string(),
            cause: ScriptError::UnknownColumn("qty".to_string()),
            suggestion: Some("did you mean 'quantity'?".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("'total'"));
        assert!(msg.contains("unknown column 'qty'"));
        assert!(msg.ends_with("(suggested fix: did you mean 'quantity'?)"));
    }

    #[test]
    fn test_cell_limit_message_names_property() {
        let err = LensError::CellLimitExceeded {
            left_rows: 10_000,
            right_rows: 10_000,
            columns: 2,
            cells: 200_000_000,
            limit: 50_000_000,
        };
        assert!(err.to_string().contains("crossjoin.cell.max"));
    }
}
