//! Snowtable Client Library
//!
//! HTTP client for reading and writing records through the Table API.

use std::fmt;

mod client;
mod transport;

pub use client::Client;
pub use snowtable_core::{
    ClientConfig, DateFormat, HttpMethod, Operand, QueryBuilder, QueryError, QueryErrorKind,
    RequestDescriptor, TransportResponse,
};
pub use transport::{ReqwestTransport, Transport};

/// Record operation a client error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetRecords,
    CountRecords,
    GetSingleRecord,
    CreateRecord,
    UpdateSingleRecord,
    DeleteSingleRecord,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self {
            Self::GetRecords => "fetching records",
            Self::CountRecords => "counting records",
            Self::GetSingleRecord => "fetching single record",
            Self::CreateRecord => "creating record",
            Self::UpdateSingleRecord => "updating single record",
            Self::DeleteSingleRecord => "deleting single record",
        };
        f.write_str(action)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Error while {operation} on {instance}. Error: {source:#}")]
    Transport {
        operation: Operation,
        instance: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Error while {operation} on {instance}. Retrieved empty response")]
    EmptyResponse {
        operation: Operation,
        instance: String,
    },

    #[error("Error while {operation} on {instance}. Error: {body}")]
    Status {
        operation: Operation,
        instance: String,
        status: u16,
        body: String,
    },

    #[error("Error while {operation} on {instance}. Expected status {expected}, got {status}: {body}")]
    UnexpectedStatus {
        operation: Operation,
        instance: String,
        expected: u16,
        status: u16,
        body: String,
    },

    #[error("Error while {operation} on {instance}. Malformed response: {source}")]
    MalformedBody {
        operation: Operation,
        instance: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// The instance URL has no hierarchical path, e.g. `mailto:` or `data:`
    #[error("URL {url} cannot hold a record path")]
    CannotBeABase { url: String },

    /// Table names and sys_ids must be non-empty and not `.` or `..`
    #[error("Invalid path segment {segment:?}")]
    InvalidPathSegment { segment: String },
}

impl ClientError {
    /// True when the request never got a reply from the store
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// HTTP status of the reply, when there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
