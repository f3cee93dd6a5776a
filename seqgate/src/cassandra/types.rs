//! Statement and row value types shared across the driver seam.

use std::fmt;

/// Consistency level a statement is executed at.
///
/// Only the levels seqgate actually uses are listed; the bootstrap reads go
/// out at [`Consistency::LocalQuorum`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    One,
    LocalOne,
    LocalQuorum,
    Quorum,
}

impl Default for Consistency {
    fn default() -> Self {
        Consistency::LocalQuorum
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Consistency::One => "ONE",
            Consistency::LocalOne => "LOCAL_ONE",
            Consistency::LocalQuorum => "LOCAL_QUORUM",
            Consistency::Quorum => "QUORUM",
        };
        f.write_str(name)
    }
}

/// A bound parameter or a column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    BigInt(i64),
    Text(String),
}

impl Value {
    /// Column as `i32`, or `default` when absent or of another type.
    pub fn as_i32_or(&self, default: i32) -> i32 {
        match self {
            Value::Int(v) => *v,
            _ => default,
        }
    }

    /// Column as `i64`, widening `Int`, or `default`.
    pub fn as_i64_or(&self, default: i64) -> i64 {
        match self {
            Value::BigInt(v) => *v,
            Value::Int(v) => i64::from(*v),
            _ => default,
        }
    }

    /// Column as `&str`, or `default` when absent or non-textual.
    pub fn as_str_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self {
            Value::Text(v) => v.as_str(),
            _ => default,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::BigInt(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// One result row, addressed by column index in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<Value>,
}

impl Row {
    pub fn new(columns: Vec<Value>) -> Self {
        Self { columns }
    }

    pub fn column(&self, index: usize) -> &Value {
        self.columns.get(index).unwrap_or(&Value::Null)
    }

    pub fn i32_or(&self, index: usize, default: i32) -> i32 {
        self.column(index).as_i32_or(default)
    }

    pub fn i64_or(&self, index: usize, default: i64) -> i64 {
        self.column(index).as_i64_or(default)
    }

    pub fn str_or<'a>(&'a self, index: usize, default: &'a str) -> &'a str {
        self.column(index).as_str_or(default)
    }
}

/// A CQL statement with bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<Value>,
    consistency: Consistency,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            consistency: Consistency::default(),
        }
    }

    /// Appends a bound parameter (positional, in `?` order).
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn consistency(&self) -> Consistency {
        self.consistency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_defaults_for_missing_columns() {
        let row = Row::new(vec![Value::Int(7)]);
        assert_eq!(row.i32_or(0, -1), 7);
        assert_eq!(row.i32_or(1, -1), -1);
        assert_eq!(row.str_or(1, "fallback"), "fallback");
    }

    #[test]
    fn test_row_widens_int_to_i64() {
        let row = Row::new(vec![Value::Int(42)]);
        assert_eq!(row.i64_or(0, 0), 42);
    }

    #[test]
    fn test_statement_binding_order() {
        let stmt = Statement::new("SELECT x FROM t WHERE a = ? AND b = ?")
            .bind(5)
            .bind("psg");
        assert_eq!(stmt.params().len(), 2);
        assert_eq!(stmt.params()[0], Value::Int(5));
        assert_eq!(stmt.params()[1], Value::Text("psg".to_string()));
    }

    #[test]
    fn test_default_consistency_is_local_quorum() {
        let stmt = Statement::new("SELECT 1");
        assert_eq!(stmt.consistency(), Consistency::LocalQuorum);
        assert_eq!(stmt.consistency().to_string(), "LOCAL_QUORUM");
    }
}
