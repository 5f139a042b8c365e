//! Core resolution engine for envpin.
//!
//! This crate ties together manifest hashing, the lock store, and artifact
//! providers into the `Resolver`, which turns a manifest into a pinned
//! `ResolvedEnvironment` exactly once per manifest content. It also provides
//! the environment materializer that turns a resolved environment into an
//! activation description, store-wide locking, interrupt handling, and the
//! user configuration file.

pub mod concurrency;
pub mod config;
pub mod materialize;
pub mod resolver;

pub use concurrency::{check_interrupted, install_signal_handler, interrupt_requested, StoreLock};
pub use config::EnvpinConfig;
pub use materialize::{materialize, ActivationDescription, ShellFormat, MANIFEST_HASH_VARIABLE};
pub use resolver::{ResolveOptions, ResolveOutcome, Resolver};

use envpin_schema::{ExprError, ManifestError};
use envpin_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    MalformedManifest(#[from] ManifestError),
    #[error("cannot resolve '{reference}': {reason}")]
    UnresolvableReference { reference: String, reason: String },
    #[error("unsatisfied constraint: {0}")]
    UnsatisfiedConstraint(String),
    #[error("variable '{variable}' is unbound: {source}")]
    UnboundVariableReference {
        variable: String,
        #[source]
        source: ExprError,
    },
    #[error("lock conflict for manifest {hash}: stored content {existing} differs from resolved content {proposed}")]
    LockConflict {
        hash: String,
        existing: String,
        proposed: String,
    },
    #[error("store error: {0}")]
    Store(StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("operation interrupted")]
    Interrupted,
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockConflict {
                hash,
                existing,
                proposed,
            } => CoreError::LockConflict {
                hash,
                existing,
                proposed,
            },
            other => CoreError::Store(other),
        }
    }
}
