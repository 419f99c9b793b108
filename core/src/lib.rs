//! pathq - path-query compiler for software-defined networks
//!
//! Turns regular expressions over packet paths into three dataplane policies:
//! one that tags packets with the state of a path automaton, one that strips
//! the tag at egress, and one that delivers packets completing a query path
//! to that query's sink.
//!
//! # Architecture
//!
//! - [`HeaderPredicate`] — The host boolean algebra over header space (domain crate)
//! - [`Partitioner`] — Refines atom predicates into disjoint tokens
//! - [`PathExpr`] — Atoms and regular compositions, rendered as token regexes
//! - [`QueryRegistry`] — Keeps finalized queries as a pairwise-disjoint regex set
//! - [`Automaton`] — Minimal DFA over the token alphabet, one accept tag per entry
//! - [`CompiledPolicies`] — Tagging, untagging and counting [`Policy`] trees
//! - [`Compiler`] — Owns one universe of tokens and queries
//!
//! # Key Design Insights
//!
//! 1. **Tokens stay disjoint**: registering an atom may split earlier tokens;
//!    the earlier token becomes a composite and is expanded to its current
//!    leaves whenever a regex is compiled.
//!
//! 2. **Queries stay disjoint**: each finalized regex is intersected with the
//!    existing set, so every path word is accepted by at most one entry and
//!    every accepting state reports a definite set of queries.
//!
//! 3. **Compilation is pure**: [`Compiler::compile`] reads the registries and
//!    never changes them.
//!
//! # Example
//!
//! ```ignore
//! use pathq::prelude::*;
//!
//! let mut compiler = Compiler::new();
//! let a = compiler.atom(HeaderSpace::field("switch", 1))?;
//! let b = compiler.atom(HeaderSpace::field("switch", 2))?;
//! compiler.finalize_named("a_then_b", &(&a ^ &b))?;
//! let compiled = compiler.compile(&TagField::default())?;
//! println!("{}", compiled.automaton);
//! ```
//!
//! # Extensions
//!
//! - [`pathq-test`](https://docs.rs/pathq-test) — Field-map header space for conformance (internal)
//! - `pathq` binary (`pathq-cli`) — Compile and replay query-set files

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

mod automaton;
mod compiler;
mod config;
mod dfa;
mod error;
mod language;
mod nfa;
mod partition;
mod path;
mod pattern;
mod policy;
mod predicate;
mod registry;
mod synth;
mod token;
mod trace;

#[cfg(feature = "config")]
mod loader;

#[cfg(test)]
mod testing;

// ═══════════════════════════════════════════════════════════════════════════════
// Public API
// ═══════════════════════════════════════════════════════════════════════════════

// Core types
pub use automaton::{lexer_spec, Automaton, Edge, StateId, DEFAULT_MAX_STATES};
pub use compiler::{Compiler, Replay};
pub use language::Language;
pub use partition::Partitioner;
pub use path::{Atom, Callback, Composite, PathExpr};
pub use pattern::{Pattern, MAX_PATTERN_DEPTH};
pub use predicate::{HeaderPredicate, TagEncoding};
pub use registry::{Bucket, Entry, FinalizedQuery, QueryId, QueryRegistry, SinkId};
pub use token::{
    is_reserved, Token, TokenMinter, TokenSet, DEFAULT_TOKEN_CEILING, RESERVED_SYMBOLS,
    TOKEN_START_VALUE,
};

// Policies
pub use policy::{Outcome, Policy};
pub use synth::{CompiledPolicies, CountRule, TagRule};

// Config
pub use config::CompilerConfig;
#[cfg(feature = "config")]
pub use config::{AtomConfig, IntoPredicate, PathConfig, QueryConfig, QuerySetConfig};
#[cfg(feature = "config")]
pub use loader::LoadedQueries;

// Trace types
pub use trace::{PolicyTrace, TraceStep};

// Errors
pub use error::{PathError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════════════════════════════════════════

/// Prelude module for convenient imports.
///
/// ```
/// use pathq::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        // Core types
        Automaton,
        // Policies
        CompiledPolicies,
        Compiler,
        // Config types
        CompilerConfig,
        // Traits
        HeaderPredicate,
        // Errors
        PathError,
        PathExpr,
        Policy,
        // Trace types
        PolicyTrace,
        QueryId,
        Replay,
        SinkId,
        StateId,
        TagEncoding,
        Token,
        TokenSet,
    };

    #[cfg(feature = "config")]
    pub use crate::{IntoPredicate, QuerySetConfig};
}
