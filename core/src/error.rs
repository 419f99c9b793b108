//! Error types for path-query construction and compilation.
//!
//! Construction-time errors (registration, atom algebra) fail the single
//! call that raised them. Compilation-time errors fail the whole pass: no
//! partial policy is ever returned, so the previously installed dataplane
//! program stays in place.

use std::path::PathBuf;

/// Errors from building, finalizing and compiling path queries.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No printable symbol is left below the token ceiling.
    #[error(
        "token space exhausted: {needed} more token(s) needed after {minted} minted \
         (ceiling U+{ceiling:04X})"
    )]
    PartitionExhausted {
        /// Tokens minted so far in this universe.
        minted: usize,
        /// Tokens the failed registration needed.
        needed: usize,
        /// Highest code point a token may use.
        ceiling: u32,
    },

    /// An atom-only operator received a composite path expression.
    #[error("`{op}` is only defined between path atoms, got a {found} operand")]
    InvalidOperand {
        /// The operator that was invoked.
        op: &'static str,
        /// Kind of the offending operand.
        found: &'static str,
    },

    /// A query id that no registry entry was finalized under.
    #[error("unknown query {0}")]
    UnknownQuery(crate::QueryId),

    /// A token was dereferenced that the partitioner never minted.
    #[error("unknown token {0:?}")]
    UnknownToken(char),

    /// The regex set could not be turned into an automaton.
    #[error("automaton build failed: {reason}")]
    AutomatonBuildFailure {
        /// What went wrong.
        reason: String,
    },

    /// A path regex string could not be parsed.
    #[error("malformed path expression {pattern:?} at offset {offset}: {reason}")]
    MalformedPattern {
        /// The offending regex string.
        pattern: String,
        /// Character offset of the failure.
        offset: usize,
        /// What the parser expected.
        reason: String,
    },

    /// Writing the staging file failed.
    #[error("failed to stage regex set at {}: {source}", path.display())]
    Io {
        /// The staging path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A query-set configuration is inconsistent (unknown or cyclic names).
    #[error("invalid query set: {0}")]
    InvalidConfig(String),
}

impl PathError {
    pub(crate) fn build_failure(reason: impl Into<String>) -> Self {
        Self::AutomatonBuildFailure {
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = PathError> = std::result::Result<T, E>;
