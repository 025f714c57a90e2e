use std::fmt;

/// Category of a query construction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    MissingField,
    TypeMismatch,
    Empty,
}

/// Errors raised while building an encoded query
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// A condition or ordering was added before any field was scoped
    #[error("{0}")]
    MissingField(String),

    /// The operand kind is not accepted by the operator
    #[error("{0}")]
    TypeMismatch(String),

    /// `build()` was called with nothing to compile
    #[error("{0}")]
    EmptyQuery(String),
}

impl QueryError {
    pub fn missing_field() -> Self {
        Self::MissingField("Conditions requires a field.".to_string())
    }

    pub fn empty_query() -> Self {
        Self::EmptyQuery("At least one condition is required in query.".to_string())
    }

    /// Type mismatch listing the kinds the operator accepts
    pub fn expected<K: fmt::Display>(allowed: &[K]) -> Self {
        let joined = allowed
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        if allowed.len() > 1 {
            Self::TypeMismatch(format!("Invalid type passed. Expected one of: {joined}"))
        } else {
            Self::TypeMismatch(format!("Invalid type passed. Expected: {joined}"))
        }
    }

    pub fn kind(&self) -> QueryErrorKind {
        match self {
            Self::MissingField(_) => QueryErrorKind::MissingField,
            Self::TypeMismatch(_) => QueryErrorKind::TypeMismatch,
            Self::EmptyQuery(_) => QueryErrorKind::Empty,
        }
    }
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;
