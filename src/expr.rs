//! Built-in expression engine for computed columns.
//!
//! Supports expressions like:
//! - `price * qty`
//! - `[unit price] * (1 - discount)`
//! - `$1 + $2` (1-based column positions)
//! - `IF(qty > 10, 'bulk', 'retail')`
//! - `score >= 90 AND name != 'Bob'`
//! - `note IS NOT NULL`
//!
//! Column names are resolved when the expression is compiled, so a typo is
//! reported once per column rather than once per row. Arithmetic on a null
//! operand yields null; a comparison with a null operand is false.

use crate::column::ColumnValue;
use crate::error::ScriptError;
use crate::script::{CompiledScript, RowScope, ScriptEngine, ScriptEnv};
use std::cmp::Ordering;

/// A parsed expression with column references resolved to positions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(ColumnValue),
    Column { name: String, position: usize },
    Negate(Box<Expr>),
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    IsNull { expr: Box<Expr>, negated: bool },
    If {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }
}

/// Token types for lexing
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    /// `[name with spaces]`
    Quoted(String),
    /// `$n`, 1-based
    Position(usize),
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Is,
    If,
    LParen,
    RParen,
    Eof,
}

/// Lexer for tokenizing expression strings
struct Lexer {
    input: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(input: &str) -> Self {
        Lexer {
            input: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    /// Consume `next` if it follows.
    fn eat(&mut self, next: char) -> bool {
        if self.peek() == Some(next) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn read_while(&mut self, accept: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !accept(c) {
                break;
            }
            text.push(c);
            self.advance();
        }
        text
    }

    fn read_number(&mut self) -> Result<Token, String> {
        let mut num_str = String::new();
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                num_str.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                is_float = true;
                num_str.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            num_str
                .parse()
                .map(Token::Float)
                .map_err(|_| format!("invalid number '{num_str}'"))
        } else {
            num_str
                .parse()
                .map(Token::Int)
                .map_err(|_| format!("number '{num_str}' is too large"))
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, String> {
        self.advance(); // consume opening quote
        let mut s = String::new();

        while let Some(c) = self.advance() {
            if c == quote {
                return Ok(Token::String(s));
            } else if c == '\\' {
                match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some(escaped) => s.push(escaped),
                    None => break,
                }
            } else {
                s.push(c);
            }
        }

        Err("unterminated string".to_string())
    }

    fn read_quoted_name(&mut self) -> Result<Token, String> {
        self.advance(); // consume '['
        let name = self.read_while(|c| c != ']');
        if self.eat(']') {
            Ok(Token::Quoted(name.trim().to_string()))
        } else {
            Err(format!("missing ']' after column name '{name}'"))
        }
    }

    fn read_position(&mut self) -> Result<Token, String> {
        self.advance(); // consume '$'
        let digits = self.read_while(|c| c.is_ascii_digit());
        match digits.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Token::Position(n)),
            _ => Err(format!("invalid column position '${digits}'")),
        }
    }

    fn next_token(&mut self) -> Result<Token, String> {
        self.skip_whitespace();

        let Some(c) = self.peek() else {
            return Ok(Token::Eof);
        };
        let single = |token: Token, lexer: &mut Lexer| -> Result<Token, String> {
            lexer.advance();
            Ok(token)
        };
        match c {
            '(' => single(Token::LParen, self),
            ')' => single(Token::RParen, self),
            ',' => single(Token::Comma, self),
            '+' => single(Token::Plus, self),
            '-' => single(Token::Minus, self),
            '*' => single(Token::Star, self),
            '/' => single(Token::Slash, self),
            '%' => single(Token::Percent, self),
            '=' => {
                self.advance();
                self.eat('=');
                Ok(Token::Eq)
            }
            '!' => {
                self.advance();
                Ok(if self.eat('=') { Token::Ne } else { Token::Not })
            }
            '<' => {
                self.advance();
                if self.eat('=') {
                    Ok(Token::Le)
                } else if self.eat('>') {
                    Ok(Token::Ne)
                } else {
                    Ok(Token::Lt)
                }
            }
            '>' => {
                self.advance();
                Ok(if self.eat('=') { Token::Ge } else { Token::Gt })
            }
            '&' => {
                self.advance();
                if self.eat('&') {
                    Ok(Token::And)
                } else {
                    Err("expected '&&'".to_string())
                }
            }
            '|' => {
                self.advance();
                if self.eat('|') {
                    Ok(Token::Or)
                } else {
                    Err("expected '||'".to_string())
                }
            }
            '\'' | '"' => self.read_string(c),
            '[' => self.read_quoted_name(),
            '$' => self.read_position(),
            _ if c.is_ascii_digit() || c == '.' => self.read_number(),
            _ if c.is_alphabetic() || c == '_' => {
                let ident = self.read_while(|c| c.is_alphanumeric() || c == '_');
                // Check for keywords
                Ok(match ident.to_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "IS" => Token::Is,
                    "IF" => Token::If,
                    "NULL" => Token::Null,
                    "TRUE" => Token::Bool(true),
                    "FALSE" => Token::Bool(false),
                    _ => Token::Ident(ident),
                })
            }
            _ => Err(format!("unexpected character '{c}'")),
        }
    }
}

/// Failure while building the AST. Unknown columns are kept apart so the
/// engine can report them as such.
enum ParseError {
    Syntax(String),
    UnknownColumn(String),
}

impl From<String> for ParseError {
    fn from(message: String) -> Self {
        ParseError::Syntax(message)
    }
}

/// Parser for building expression AST
struct Parser<'a> {
    lexer: Lexer,
    current: Token,
    env: &'a ScriptEnv,
}

impl<'a> Parser<'a> {
    fn new(input: &str, env: &'a ScriptEnv) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current, env })
    }

    fn advance(&mut self) -> Result<(), ParseError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if &self.current == expected {
            self.advance()
        } else {
            Err(ParseError::Syntax(format!(
                "expected {:?}, got {:?}",
                expected, self.current
            )))
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.current == Token::Or {
            self.advance()?;
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_not()?;
        while self.current == Token::And {
            self.advance()?;
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.current == Token::Not {
            self.advance()?;
            let expr = self.parse_not()?;
            Ok(Expr::Not(Box::new(expr)))
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;

        if self.current == Token::Is {
            self.advance()?;
            let negated = self.current == Token::Not;
            if negated {
                self.advance()?;
            }
            self.expect(&Token::Null)?;
            return Ok(Expr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let op = match self.current {
            Token::Eq => BinaryOp::Eq,
            Token::Ne => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance()?;
        let right = self.parse_additive()?;
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.current == Token::Minus {
            self.advance()?;
            let expr = self.parse_unary()?;
            return Ok(match expr {
                Expr::Literal(ColumnValue::Int64(v)) => Expr::Literal(ColumnValue::Int64(-v)),
                Expr::Literal(ColumnValue::Float64(v)) => Expr::Literal(ColumnValue::Float64(-v)),
                other => Expr::Negate(Box::new(other)),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let token = self.current.clone();
        self.advance()?;
        match token {
            Token::Int(n) => Ok(Expr::Literal(ColumnValue::Int64(n))),
            Token::Float(f) => Ok(Expr::Literal(ColumnValue::Float64(f))),
            Token::String(s) => Ok(Expr::Literal(ColumnValue::String(s))),
            Token::Bool(b) => Ok(Expr::Literal(ColumnValue::Bool(b))),
            Token::Null => Ok(Expr::Literal(ColumnValue::Null)),
            Token::Ident(name) | Token::Quoted(name) => self.column(name),
            Token::Position(n) => {
                let name = format!("${n}");
                match self.env.columns().get(n - 1) {
                    Some(_) => Ok(Expr::Column {
                        name,
                        position: n - 1,
                    }),
                    None => Err(ParseError::UnknownColumn(name)),
                }
            }
            Token::LParen => {
                let expr = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::If => {
                self.expect(&Token::LParen)?;
                let condition = self.parse_or()?;
                self.expect(&Token::Comma)?;
                let then = self.parse_or()?;
                self.expect(&Token::Comma)?;
                let otherwise = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::If {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                })
            }
            other => Err(ParseError::Syntax(format!("unexpected {other:?}"))),
        }
    }

    fn column(&self, name: String) -> Result<Expr, ParseError> {
        match self.env.position(&name) {
            Some(position) => Ok(Expr::Column { name, position }),
            None => Err(ParseError::UnknownColumn(name)),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Parse and resolve `input` against the columns of `env`.
pub fn parse_expr(input: &str, env: &ScriptEnv) -> Result<Expr, ScriptError> {
    let compile_error = |message: String| ScriptError::Compile {
        expression: input.to_string(),
        message,
    };
    let parsed = Parser::new(input, env).and_then(|mut parser| {
        let expr = parser.parse_or()?;
        // Ensure we consumed all input
        if parser.current != Token::Eof {
            return Err(ParseError::Syntax(format!(
                "unexpected {:?} after expression",
                parser.current
            )));
        }
        Ok(expr)
    });
    parsed.map_err(|e| match e {
        ParseError::Syntax(message) => compile_error(message),
        ParseError::UnknownColumn(name) => ScriptError::UnknownColumn(name),
    })
}

/// Evaluate an expression against a row.
pub fn eval_expr(expr: &Expr, scope: &RowScope<'_>) -> Result<ColumnValue, ScriptError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Column { position, .. } => scope.value_at(*position),
        Expr::Negate(inner) => {
            let value = eval_expr(inner, scope)?;
            arithmetic(BinaryOp::Sub, &ColumnValue::Int64(0), &value)
        }
        Expr::Not(inner) => {
            let value = eval_expr(inner, scope)?;
            Ok(ColumnValue::Bool(!truthy(&value)?))
        }
        Expr::IsNull { expr, negated } => {
            let value = eval_expr(expr, scope)?;
            Ok(ColumnValue::Bool(value.is_null() != *negated))
        }
        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            if truthy(&eval_expr(condition, scope)?)? {
                eval_expr(then, scope)
            } else {
                eval_expr(otherwise, scope)
            }
        }
        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let result = truthy(&eval_expr(left, scope)?)? && truthy(&eval_expr(right, scope)?)?;
                Ok(ColumnValue::Bool(result))
            }
            BinaryOp::Or => {
                let result = truthy(&eval_expr(left, scope)?)? || truthy(&eval_expr(right, scope)?)?;
                Ok(ColumnValue::Bool(result))
            }
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let a = eval_expr(left, scope)?;
                let b = eval_expr(right, scope)?;
                Ok(ColumnValue::Bool(compare(*op, &a, &b)))
            }
            _ => {
                let a = eval_expr(left, scope)?;
                let b = eval_expr(right, scope)?;
                arithmetic(*op, &a, &b)
            }
        },
    }
}

/// Condition value: booleans as is, null as false, numbers by non-zero.
fn truthy(value: &ColumnValue) -> Result<bool, ScriptError> {
    if value.is_null() {
        return Ok(false);
    }
    if let Some(b) = value.as_bool() {
        return Ok(b);
    }
    match value.as_f64() {
        Some(n) => Ok(n != 0.0),
        None => Err(ScriptError::Type(format!("'{value}' is not a condition"))),
    }
}

/// Any comparison involving NULL is false.
fn compare(op: BinaryOp, a: &ColumnValue, b: &ColumnValue) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    let ordering = a.compare(b);
    match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::Ne => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

fn arithmetic(op: BinaryOp, a: &ColumnValue, b: &ColumnValue) -> Result<ColumnValue, ScriptError> {
    if a.is_null() || b.is_null() {
        return Ok(ColumnValue::Null);
    }
    if op == BinaryOp::Add && (a.as_string().is_some() || b.as_string().is_some()) {
        return Ok(ColumnValue::String(format!("{a}{b}")));
    }
    let type_error = || {
        ScriptError::Type(format!(
            "cannot apply '{}' to '{a}' and '{b}'",
            op.symbol()
        ))
    };
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let overflow = || ScriptError::Evaluation(format!("integer overflow in {x} {} {y}", op.symbol()));
        let result = match op {
            BinaryOp::Add => x.checked_add(y).ok_or_else(overflow)?,
            BinaryOp::Sub => x.checked_sub(y).ok_or_else(overflow)?,
            BinaryOp::Mul => x.checked_mul(y).ok_or_else(overflow)?,
            BinaryOp::Div | BinaryOp::Rem if y == 0 => return Err(ScriptError::DivisionByZero),
            BinaryOp::Div if x % y != 0 => return Ok(ColumnValue::Float64(x as f64 / y as f64)),
            BinaryOp::Div => x.checked_div(y).ok_or_else(overflow)?,
            BinaryOp::Rem => x.checked_rem(y).ok_or_else(overflow)?,
            _ => return Err(type_error()),
        };
        return Ok(ColumnValue::Int64(result));
    }
    let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) else {
        return Err(type_error());
    };
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div | BinaryOp::Rem if y == 0.0 => return Err(ScriptError::DivisionByZero),
        BinaryOp::Div => x / y,
        BinaryOp::Rem => x % y,
        _ => return Err(type_error()),
    };
    Ok(ColumnValue::Float64(result))
}

/// Extract all column names referenced in an expression.
pub fn extract_columns(expr: &Expr) -> Vec<String> {
    let mut columns = Vec::new();
    extract_columns_recursive(expr, &mut columns);
    columns.sort();
    columns.dedup();
    columns
}

fn extract_columns_recursive(expr: &Expr, columns: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Column { name, .. } => columns.push(name.clone()),
        Expr::Negate(inner) | Expr::Not(inner) => extract_columns_recursive(inner, columns),
        Expr::IsNull { expr, .. } => extract_columns_recursive(expr, columns),
        Expr::Binary { left, right, .. } => {
            extract_columns_recursive(left, columns);
            extract_columns_recursive(right, columns);
        }
        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            extract_columns_recursive(condition, columns);
            extract_columns_recursive(then, columns);
            extract_columns_recursive(otherwise, columns);
        }
    }
}

/// Edit distance between two names, ignoring ASCII case.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b.len()]
}

#[derive(Debug)]
struct CompiledExpr {
    source: String,
    expr: Expr,
}

impl CompiledScript for CompiledExpr {
    fn source(&self) -> &str {
        &self.source
    }

    fn evaluate(&self, scope: &RowScope<'_>) -> Result<ColumnValue, ScriptError> {
        eval_expr(&self.expr, scope)
    }
}

/// The default [`ScriptEngine`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEngine;

impl ScriptEngine for ExprEngine {
    fn compile(&self, expression: &str, env: &ScriptEnv) -> Result<Box<dyn CompiledScript>, ScriptError> {
        let expr = parse_expr(expression, env)?;
        Ok(Box::new(CompiledExpr {
            source: expression.to_string(),
            expr,
        }))
    }

    fn suggest_fix(&self, expression: &str, error: &ScriptError, env: &ScriptEnv) -> Option<String> {
        match error {
            ScriptError::UnknownColumn(name) => {
                let limit = (name.chars().count() / 3).max(2);
                env.columns()
                    .iter()
                    .map(|c| (edit_distance(name, c), c))
                    .filter(|(d, _)| *d <= limit)
                    .min_by_key(|(d, _)| *d)
                    .map(|(_, c)| {
                        if c.chars().all(|ch| ch.is_alphanumeric() || ch == '_') {
                            format!("use column '{c}' instead of '{name}'")
                        } else {
                            format!("use column '[{c}]' instead of '{name}'")
                        }
                    })
            }
            ScriptError::Compile { .. } => {
                let open = expression.matches('(').count();
                let close = expression.matches(')').count();
                match open.cmp(&close) {
                    Ordering::Greater => Some(format!("add {} closing ')'", open - close)),
                    Ordering::Less => Some(format!("remove {} unmatched ')'", close - open)),
                    Ordering::Equal => None,
                }
            }
            ScriptError::DivisionByZero => {
                Some("guard the divisor, e.g. IF(d = 0, NULL, n / d)".to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> ScriptEnv {
        ScriptEnv::new(vec![
            "id".into(),
            "name".into(),
            "score".into(),
            "active".into(),
            "nullable".into(),
            "unit price".into(),
        ])
    }

    fn make_row() -> Vec<Option<ColumnValue>> {
        vec![
            Some(ColumnValue::Int32(1)),
            Some(ColumnValue::String("Alice".to_string())),
            Some(ColumnValue::Float64(95.5)),
            Some(ColumnValue::Bool(true)),
            Some(ColumnValue::Null),
            Some(ColumnValue::Float64(2.5)),
        ]
    }

    fn eval(source: &str) -> Result<ColumnValue, ScriptError> {
        let env = env();
        let row = make_row();
        let expr = parse_expr(source, &env)?;
        eval_expr(&expr, &RowScope::new(0, 0, &env, &row))
    }

    #[test]
    fn test_simple_comparison() {
        assert_eq!(eval("score > 90").unwrap(), ColumnValue::Bool(true));
        assert_eq!(eval("score < 90").unwrap(), ColumnValue::Bool(false));
        assert_eq!(eval("id == 1").unwrap(), ColumnValue::Bool(true));
        assert_eq!(eval("name = 'Alice'").unwrap(), ColumnValue::Bool(true));
        assert_eq!(eval("name <> 'Bob'").unwrap(), ColumnValue::Bool(true));
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), ColumnValue::Int64(7));
        assert_eq!(eval("(1 + 2) * 3").unwrap(), ColumnValue::Int64(9));
        assert_eq!(eval("7 / 2").unwrap(), ColumnValue::Float64(3.5));
        assert_eq!(eval("8 / 2").unwrap(), ColumnValue::Int64(4));
        assert_eq!(eval("[unit price] * 4").unwrap(), ColumnValue::Float64(10.0));
        assert_eq!(eval("-$1 - 1").unwrap(), ColumnValue::Int64(-2));
        assert_eq!(eval("name + ' ' + id").unwrap(), ColumnValue::from("Alice 1"));
    }

    #[test]
    fn test_nulls() {
        assert_eq!(eval("nullable + 1").unwrap(), ColumnValue::Null);
        assert_eq!(eval("nullable = NULL").unwrap(), ColumnValue::Bool(false));
        assert_eq!(eval("nullable IS NULL").unwrap(), ColumnValue::Bool(true));
        assert_eq!(eval("score IS NOT NULL").unwrap(), ColumnValue::Bool(true));
    }

    #[test]
    fn test_logic_and_if() {
        assert_eq!(eval("score > 90 AND id == 1").unwrap(), ColumnValue::Bool(true));
        assert_eq!(eval("score < 90 || id == 1").unwrap(), ColumnValue::Bool(true));
        assert_eq!(eval("NOT score > 90").unwrap(), ColumnValue::Bool(false));
        assert_eq!(
            eval("IF(score >= 90, 'A', 'B')").unwrap(),
            ColumnValue::from("A")
        );
        assert_eq!(
            eval("(score < 90 OR id == 1) AND active == true").unwrap(),
            ColumnValue::Bool(true)
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(eval("1 / 0"), Err(ScriptError::DivisionByZero));
        assert_eq!(eval("scor > 1"), Err(ScriptError::UnknownColumn("scor".into())));
        assert_eq!(eval("$9"), Err(ScriptError::UnknownColumn("$9".into())));
        assert!(matches!(eval("(1 + 2"), Err(ScriptError::Compile { .. })));
        assert!(matches!(eval("name * 2"), Err(ScriptError::Type(_))));
        assert!(matches!(eval("'open"), Err(ScriptError::Compile { .. })));
    }

    #[test]
    fn test_suggest_fix() {
        let engine = ExprEngine;
        let env = env();
        let error = engine.compile("scroe * 2", &env).err().unwrap();
        assert_eq!(
            engine.suggest_fix("scroe * 2", &error, &env),
            Some("use column 'score' instead of 'scroe'".to_string())
        );
        let error = engine.compile("unit_price", &env).err().unwrap();
        assert_eq!(
            engine.suggest_fix("unit_price", &error, &env),
            Some("use column '[unit price]' instead of 'unit_price'".to_string())
        );
        let error = engine.compile("IF(id > 1, 1, 2", &env).err().unwrap();
        assert_eq!(
            engine.suggest_fix("IF(id > 1, 1, 2", &error, &env),
            Some("add 1 closing ')'".to_string())
        );
    }

    #[test]
    fn test_extract_columns() {
        let expr = parse_expr("IF(score > 1, [unit price], id + id)", &env()).unwrap();
        assert_eq!(extract_columns(&expr), vec!["id", "score", "unit price"]);
    }
}
