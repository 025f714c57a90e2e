//! Encoded query builder
//!
//! Accumulates conditions, ordering directives and logical connectives into
//! the store's native filter grammar. Tokens are written exactly as the store
//! expects them (`<field><OPERATOR><operand>`, joined by `^`, `^OR` and `^NQ`),
//! so compiling is a plain concatenation. Operands are not escaped; callers are
//! responsible for sanitizing field names and values.
//!
//! ```
//! use snowtable_core::QueryBuilder;
//!
//! let mut query = QueryBuilder::new();
//! query
//!     .field("active")
//!     .equals("true")?
//!     .and()
//!     .field("priority")
//!     .equals(vec![1, 2])?;
//!
//! assert_eq!(query.build()?, "active=true^priorityIN1,2");
//! # Ok::<(), snowtable_core::QueryError>(())
//! ```

use std::fmt;

use crate::error::{QueryError, QueryResult};
use crate::operand::{DateFormat, Operand, OperandKind};

const TEXT: &[OperandKind] = &[OperandKind::String];
const SCALAR: &[OperandKind] = &[OperandKind::String, OperandKind::Number];
const COMPARABLE: &[OperandKind] = &[
    OperandKind::String,
    OperandKind::Number,
    OperandKind::DateTime,
];
const LIST: &[OperandKind] = &[OperandKind::List];

/// Fluent builder for encoded queries
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    segments: Vec<String>,
    current_field: String,
    date_format: DateFormat,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different pattern for date/time operands
    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    /// Scope the following conditions to `name`
    pub fn field(&mut self, name: impl Into<String>) -> &mut Self {
        self.current_field = name.into();
        self
    }

    pub fn order_ascending(&mut self) -> QueryResult<&mut Self> {
        let field = self.require_field()?;
        self.segments.push(format!("ORDERBY{field}"));
        Ok(self)
    }

    pub fn order_descending(&mut self) -> QueryResult<&mut Self> {
        let field = self.require_field()?;
        self.segments.push(format!("ORDERBYDESC{field}"));
        Ok(self)
    }

    pub fn starts_with(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition("STARTSWITH", value.into(), TEXT)
    }

    pub fn ends_with(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition("ENDSWITH", value.into(), TEXT)
    }

    pub fn contains(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition("LIKE", value.into(), TEXT)
    }

    pub fn does_not_contain(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition("NOTLIKE", value.into(), TEXT)
    }

    pub fn is_empty(&mut self) -> QueryResult<&mut Self> {
        self.add_flag("ISEMPTY")
    }

    pub fn is_not_empty(&mut self) -> QueryResult<&mut Self> {
        self.add_flag("ISNOTEMPTY")
    }

    /// `=` for strings and numbers, `IN` for lists
    pub fn equals(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_membership("=", "IN", value.into())
    }

    /// `!=` for strings and numbers, `NOT IN` for lists
    pub fn not_equals(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_membership("!=", "NOT IN", value.into())
    }

    pub fn greater_than(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition(">", value.into(), COMPARABLE)
    }

    pub fn greater_than_or_is(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition(">=", value.into(), COMPARABLE)
    }

    pub fn less_than(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition("<", value.into(), COMPARABLE)
    }

    pub fn less_than_or_is(&mut self, value: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition("<=", value.into(), COMPARABLE)
    }

    /// Inclusive range, encoded as `<field>BETWEEN<start>@<end>`
    pub fn between(
        &mut self,
        start: impl Into<Operand>,
        end: impl Into<Operand>,
    ) -> QueryResult<&mut Self> {
        let field = self.require_field()?;
        let start = self.check(start.into(), COMPARABLE)?;
        let end = self.check(end.into(), COMPARABLE)?;
        self.segments.push(format!("{field}BETWEEN{start}@{end}"));
        Ok(self)
    }

    /// Matches every record, including ones where the field is empty
    pub fn is_anything(&mut self) -> QueryResult<&mut Self> {
        self.add_flag("ANYTHING")
    }

    pub fn is_one_of(&mut self, values: impl Into<Operand>) -> QueryResult<&mut Self> {
        self.add_condition("IN", values.into(), LIST)
    }

    /// Matches an empty string value, which the store distinguishes from null
    pub fn is_empty_string(&mut self) -> QueryResult<&mut Self> {
        self.add_flag("EMPTYSTRING")
    }

    pub fn and(&mut self) -> &mut Self {
        self.add_logical_operator("^")
    }

    pub fn or(&mut self) -> &mut Self {
        self.add_logical_operator("^OR")
    }

    /// Start a new query whose results are unioned with the previous one
    pub fn new_query(&mut self) -> &mut Self {
        self.add_logical_operator("^NQ")
    }

    /// Tokens accumulated so far, in insertion order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True when nothing has been added yet
    pub fn is_blank(&self) -> bool {
        self.segments.is_empty()
    }

    /// Compile the accumulated tokens. Can be called any number of times.
    pub fn build(&self) -> QueryResult<String> {
        if self.segments.is_empty() {
            return Err(QueryError::empty_query());
        }
        Ok(self.segments.concat())
    }

    fn add_logical_operator(&mut self, operator: &str) -> &mut Self {
        self.segments.push(operator.to_string());
        self
    }

    fn add_flag(&mut self, operator: &str) -> QueryResult<&mut Self> {
        let field = self.require_field()?;
        self.segments.push(format!("{field}{operator}"));
        Ok(self)
    }

    fn add_condition(
        &mut self,
        operator: &str,
        operand: Operand,
        allowed: &[OperandKind],
    ) -> QueryResult<&mut Self> {
        let field = self.require_field()?;
        let rendered = self.check(operand, allowed)?;
        self.segments.push(format!("{field}{operator}{rendered}"));
        Ok(self)
    }

    fn add_membership(
        &mut self,
        scalar_operator: &str,
        list_operator: &str,
        operand: Operand,
    ) -> QueryResult<&mut Self> {
        // Field scope is checked first, matching every other condition
        self.require_field()?;
        match operand.kind() {
            OperandKind::String | OperandKind::Number => {
                self.add_condition(scalar_operator, operand, SCALAR)
            }
            OperandKind::List => self.add_condition(list_operator, operand, LIST),
            other => Err(QueryError::TypeMismatch(format!(
                "Expected string or list type, not: {other}"
            ))),
        }
    }

    fn require_field(&self) -> QueryResult<String> {
        if self.current_field.is_empty() {
            return Err(QueryError::missing_field());
        }
        Ok(self.current_field.clone())
    }

    fn check(&self, operand: Operand, allowed: &[OperandKind]) -> QueryResult<String> {
        if !allowed.contains(&operand.kind()) {
            return Err(QueryError::expected(allowed));
        }
        Ok(operand.render(&self.date_format))
    }
}

impl fmt::Display for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            f.write_str(segment)?;
        }
        Ok(())
    }
}
