//! Error taxonomy (spec §7).
//!
//! Every port returns `Result<_, NetopsError>`. Adapter- and per-target
//! failures are recovered locally by the caller and folded into a result's
//! `errors[]`; they reach this type only when there is nowhere left to
//! recover them (e.g. a malformed `Targeting` passed to the resolver).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetopsError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {entity} ({key})")]
    NotFound { entity: &'static str, key: String },

    #[error("targeting error: {0}")]
    Targeting(String),

    #[error("adapter error on {target}: {source}")]
    Adapter {
        target: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("sink error writing {table}: {message}")]
    Sink { table: String, message: String },

    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("enqueue error: {0}")]
    Enqueue(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

pub type Result<T> = std::result::Result<T, NetopsError>;
