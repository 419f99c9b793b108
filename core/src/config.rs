//! Config types for the compiler and for config-driven query sets.
//!
//! [`CompilerConfig`] is always available. The query-set types are behind the
//! `config` feature; they deserialize from JSON/YAML and are turned into
//! registered atoms and finalized queries by [`Compiler::load`](crate::Compiler::load).
//!
//! # Relationship to runtime types
//!
//! | Config type | Runtime type | Built by |
//! |-------------|-------------|----------|
//! | [`AtomConfig`] | [`PathExpr::Atom`](crate::PathExpr::Atom) | predicate algebra, then [`Compiler::atom`](crate::Compiler::atom) |
//! | [`PathConfig`] | [`PathExpr`](crate::PathExpr) | `concat` / `alternate` / `star` |
//! | [`QueryConfig`] | [`FinalizedQuery`](crate::FinalizedQuery) | [`Compiler::finalize_named`](crate::Compiler::finalize_named) |
//!
//! # Example
//!
//! ```yaml
//! compiler:
//!   max_states: 1024
//! atoms:
//!   s1: { match: { switch: 1 } }
//!   s2: { match: { switch: 2 } }
//!   core: { or: [s1, s2] }
//!   edge: { not: core }
//! queries:
//!   - name: through_core
//!     path: { concat: [ { atom: edge }, { star: { atom: core } }, { atom: edge } ] }
//! ```

use crate::token::{DEFAULT_TOKEN_CEILING, TOKEN_START_VALUE};
use crate::{PathError, Result, DEFAULT_MAX_STATES};
use std::path::PathBuf;

/// Tunables for one compiler context.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct CompilerConfig {
    /// Highest code point a token may use.
    pub token_ceiling: u32,
    /// Bound on automaton states during construction.
    pub max_states: usize,
    /// When set, every compilation writes the lexer-definition text of the
    /// regex set here before building the automaton.
    pub staging_path: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            token_ceiling: DEFAULT_TOKEN_CEILING,
            max_states: DEFAULT_MAX_STATES,
            staging_path: None,
        }
    }
}

impl CompilerConfig {
    /// Check the values make sense.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidConfig`] if no token fits below the ceiling
    /// or the state bound is zero.
    pub fn validate(&self) -> Result<()> {
        if self.token_ceiling <= TOKEN_START_VALUE || char::from_u32(self.token_ceiling).is_none() {
            return Err(PathError::InvalidConfig(format!(
                "token_ceiling U+{:04X} leaves no room for tokens",
                self.token_ceiling
            )));
        }
        if self.max_states == 0 {
            return Err(PathError::InvalidConfig("max_states must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(feature = "config")]
pub use query_set::*;

#[cfg(feature = "config")]
mod query_set {
    use super::CompilerConfig;
    use crate::{HeaderPredicate, Result};
    use serde::Deserialize;
    use std::collections::BTreeMap;

    /// Turns a domain-specific match description into a predicate.
    ///
    /// Implemented by the domain crate for its config shape (e.g. a map of
    /// header field to value).
    pub trait IntoPredicate<P: HeaderPredicate> {
        /// Build the predicate.
        ///
        /// # Errors
        ///
        /// Returns [`PathError::InvalidConfig`](crate::PathError::InvalidConfig)
        /// if the description is not valid for the domain.
        fn into_predicate(&self) -> Result<P>;
    }

    /// A whole query set: compiler tunables, named atoms and queries.
    #[derive(Debug, Clone, Deserialize)]
    #[serde(bound(deserialize = "M: Deserialize<'de>"))]
    pub struct QuerySetConfig<M> {
        /// Compiler tunables.
        #[serde(default)]
        pub compiler: CompilerConfig,

        /// Named atoms, referenced by name from other atoms and from paths.
        #[serde(default)]
        pub atoms: BTreeMap<String, AtomConfig<M>>,

        /// Queries to finalize, in order.
        #[serde(default)]
        pub queries: Vec<QueryConfig>,
    }

    /// One atom: a domain match or predicate algebra over other atoms.
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "snake_case")]
    #[serde(bound(deserialize = "M: Deserialize<'de>"))]
    pub enum AtomConfig<M> {
        /// A domain match.
        Match(M),
        /// Intersection of the named atoms.
        And(Vec<String>),
        /// Union of the named atoms.
        Or(Vec<String>),
        /// First atom without the second.
        Minus(String, String),
        /// Complement of the named atom.
        Not(String),
    }

    /// A path over named atoms.
    #[derive(Debug, Clone, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum PathConfig {
        /// One hop matching the named atom.
        Atom(String),
        /// The parts in sequence.
        Concat(Vec<PathConfig>),
        /// Any one of the parts.
        Alt(Vec<PathConfig>),
        /// Zero or more repetitions.
        Star(Box<PathConfig>),
    }

    /// A named query.
    #[derive(Debug, Clone, Deserialize)]
    pub struct QueryConfig {
        /// Report name, unique within the set.
        pub name: String,
        /// The path to match.
        pub path: PathConfig,
    }
}
