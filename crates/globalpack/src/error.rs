//! Error types for the packing pipeline
//!
//! Every failure is terminal: configuration problems are raised before any
//! record is consumed, upstream and write failures abort the run.

use std::{io, path::PathBuf};

use thiserror::Error;

pub type Result<T, E = GlobalPackError> = std::result::Result<T, E>;

/// Boxed error produced by a bundler or packer
pub type UpstreamSource = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum GlobalPackError {
    #[error("globalpack requires `write_to_dir` or `get_outfile` to be set")]
    MissingOutput,

    #[error("overspecified: `write_to_dir` and `get_outfile` cannot be set together")]
    ConflictingOutput,

    #[error("invalid configuration file {path}: {reason}")]
    InvalidConfigFile { path: PathBuf, reason: String },

    #[error("invalid value {value:?} for environment variable {name}")]
    InvalidEnvValue { name: String, value: String },

    /// Failure surfaced by the bundler or the packing transform
    #[error("upstream stream failed: {0}")]
    Upstream(#[source] UpstreamSource),

    #[error("failed to write {path}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to emit audit log")]
    Audit(#[source] io::Error),

    #[error("no `{label}` stage registered in the bundle pipeline")]
    MissingStage { label: String },

    #[error("cannot derive an output file name from module id {id:?}")]
    UnnamedModule { id: String },
}

impl GlobalPackError {
    /// Wrap any bundler or packer error as an upstream failure
    pub fn upstream(err: impl Into<UpstreamSource>) -> Self {
        Self::Upstream(err.into())
    }

    /// Whether this error was raised while validating configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingOutput
                | Self::ConflictingOutput
                | Self::InvalidConfigFile { .. }
                | Self::InvalidEnvValue { .. }
        )
    }
}
