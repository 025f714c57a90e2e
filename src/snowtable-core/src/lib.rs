//! Snowtable Core Library
//!
//! This crate provides the transport-independent pieces of snowtable:
//! - Encoded query builder for the Table API filter grammar
//! - Operand values and date/time formatting
//! - Request/response value objects passed to transports
//! - Client configuration

pub mod config;
pub mod error;
pub mod models;
pub mod operand;
pub mod query;

// Re-export commonly used types
pub use config::ClientConfig;
pub use error::{QueryError, QueryErrorKind, QueryResult};
pub use models::*;
pub use operand::{DateFormat, Operand, OperandKind};
pub use query::QueryBuilder;
