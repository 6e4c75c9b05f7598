//! Sorter error types.

use thiserror::Error;

/// Contract violations reported by the sorter.
///
/// Every operation checks its preconditions before touching the tree, so
/// an error leaves the sorter unchanged. The allocator treats these as
/// programming errors: it validates with `contains` before mutating.
#[derive(Debug, Error, PartialEq)]
pub enum SorterError {
    #[error("unknown client: {0}")]
    UnknownClient(String),

    #[error("client already exists: {0}")]
    ClientExists(String),

    #[error("invalid client path: {0:?}")]
    InvalidPath(String),

    #[error("{holder} on agent {agent} does not contain {requested}")]
    InsufficientResources {
        holder: String,
        agent: String,
        requested: String,
    },

    #[error("inconsistent tree: {0}")]
    Inconsistent(String),

    #[error("config error: {0}")]
    Config(String),
}

pub type SorterResult<T> = Result<T, SorterError>;
