//! Compiler — one path-query universe
//!
//! A [`Compiler`] owns the [`Partitioner`] and the [`QueryRegistry`], so two
//! compilers never share tokens or queries. Building atoms and finalizing
//! queries take `&mut self`; compiling takes `&self` and never mutates the
//! registries, so a failed compilation leaves everything as it was.
//!
//! # Example
//!
//! ```ignore
//! let mut compiler = Compiler::new();
//! let x = compiler.atom(HeaderSpace::field("switch", 1))?;
//! let y = compiler.atom(HeaderSpace::field("switch", 2))?;
//! compiler.finalize_named("x_then_y", &(&x ^ &y))?;
//! let compiled = compiler.compile(&TagField::default())?;
//! println!("{}", compiled.automaton);
//! ```

use crate::automaton::lexer_spec;
use crate::synth::synthesize;
use crate::{
    CompiledPolicies, CompilerConfig, HeaderPredicate, Language, Partitioner, PathError, PathExpr,
    QueryId, QueryRegistry, Result, SinkId, StateId, TagEncoding, TokenMinter,
};
use tracing::{debug, info};

/// Owns every registry of one compilation universe.
#[derive(Debug)]
pub struct Compiler<P: HeaderPredicate> {
    partitioner: Partitioner<P>,
    registry: QueryRegistry<P>,
    config: CompilerConfig,
}

/// What a replayed path did, hop by hop.
#[derive(Debug, Clone)]
pub struct Replay<Pkt> {
    /// Automaton state after each hop.
    pub states: Vec<StateId>,
    /// `(hop index, sink)` for every delivery, in order.
    pub deliveries: Vec<(usize, SinkId)>,
    /// The last hop's packet after tagging and egress untagging.
    pub egress: Option<Pkt>,
}

impl<Pkt> Replay<Pkt> {
    /// Sinks that saw at least one delivery, ascending and deduplicated.
    #[must_use]
    pub fn reached(&self) -> Vec<SinkId> {
        let mut sinks: Vec<SinkId> = self.deliveries.iter().map(|(_, s)| *s).collect();
        sinks.sort_unstable();
        sinks.dedup();
        sinks
    }
}

impl<P: HeaderPredicate> Compiler<P> {
    /// A fresh universe with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(CompilerConfig::default())
    }

    /// A fresh universe with `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::InvalidConfig`] if `config` does not validate.
    pub fn with_config(config: CompilerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CompilerConfig) -> Self {
        Self {
            partitioner: Partitioner::with_minter(TokenMinter::new(config.token_ceiling)),
            registry: QueryRegistry::new(),
            config,
        }
    }

    /// Forget every token, query and sink. Configuration is kept.
    pub fn reset(&mut self) {
        self.partitioner.clear();
        self.registry.clear();
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// The predicate partition.
    #[must_use]
    pub fn partitioner(&self) -> &Partitioner<P> {
        &self.partitioner
    }

    /// The finalized queries and their disjoint regex set.
    #[must_use]
    pub fn registry(&self) -> &QueryRegistry<P> {
        &self.registry
    }

    /// Language queries over the current alphabet.
    #[must_use]
    pub fn language(&self) -> Language<'_, P> {
        Language::new(&self.partitioner, self.config.max_states)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Building
    // ═══════════════════════════════════════════════════════════════════════

    /// Register `predicate` and return an atom over it.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::PartitionExhausted`] if the token space runs out.
    pub fn atom(&mut self, predicate: P) -> Result<PathExpr<P>> {
        PathExpr::atom(predicate, &mut self.partitioner)
    }

    /// Atom over the intersection of two atoms.
    ///
    /// # Errors
    ///
    /// See [`PathExpr::and`].
    pub fn and(&mut self, a: &PathExpr<P>, b: &PathExpr<P>) -> Result<PathExpr<P>> {
        a.and(b, &mut self.partitioner)
    }

    /// Atom over `a` without `b`.
    ///
    /// # Errors
    ///
    /// See [`PathExpr::minus`].
    pub fn minus(&mut self, a: &PathExpr<P>, b: &PathExpr<P>) -> Result<PathExpr<P>> {
        a.minus(b, &mut self.partitioner)
    }

    /// Atom over the complement of an atom.
    ///
    /// # Errors
    ///
    /// See [`PathExpr::invert`].
    pub fn invert(&mut self, a: &PathExpr<P>) -> Result<PathExpr<P>> {
        a.invert(&mut self.partitioner)
    }

    /// Add `query` to the set compiled by [`compile`](Self::compile).
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`] if the query was built by another
    /// compiler, or any error from the language comparisons.
    pub fn finalize(&mut self, query: &PathExpr<P>) -> Result<QueryId> {
        self.finalize_inner(None, query)
    }

    /// [`finalize`](Self::finalize) with a report name.
    ///
    /// # Errors
    ///
    /// See [`finalize`](Self::finalize).
    pub fn finalize_named(&mut self, name: &str, query: &PathExpr<P>) -> Result<QueryId> {
        self.finalize_inner(Some(name), query)
    }

    fn finalize_inner(&mut self, name: Option<&str>, query: &PathExpr<P>) -> Result<QueryId> {
        let language = Language::new(&self.partitioner, self.config.max_states);
        let id = self.registry.finalize(name, query, &language)?;
        debug!(
            query = %id,
            expr = %query,
            entries = self.registry.entries().len(),
            "finalized query"
        );
        Ok(id)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Compiling
    // ═══════════════════════════════════════════════════════════════════════

    /// Finalize every query in `queries`, then compile.
    ///
    /// # Errors
    ///
    /// Any error from [`finalize`](Self::finalize) or [`compile`](Self::compile).
    pub fn compile_queries<E>(
        &mut self,
        queries: &[PathExpr<P>],
        encoding: &E,
    ) -> Result<CompiledPolicies<P>>
    where
        E: TagEncoding<P> + ?Sized,
    {
        for query in queries {
            self.finalize(query)?;
        }
        self.compile(encoding)
    }

    /// Build the automaton for the finalized set and synthesize the tagging,
    /// untagging and counting policies.
    ///
    /// # Errors
    ///
    /// - [`PathError::Io`] if the staging file cannot be written.
    /// - [`PathError::AutomatonBuildFailure`] if an entry does not parse or
    ///   the automaton exceeds `max_states`.
    /// - [`PathError::UnknownToken`] on an internal inconsistency.
    pub fn compile<E>(&self, encoding: &E) -> Result<CompiledPolicies<P>>
    where
        E: TagEncoding<P> + ?Sized,
    {
        let patterns = self.registry.patterns();
        if let Some(path) = &self.config.staging_path {
            std::fs::write(path, lexer_spec(&patterns)).map_err(|source| PathError::Io {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), entries = patterns.len(), "staged regex set");
        }

        let automaton = self.language().automaton(&patterns).map_err(|e| match e {
            PathError::MalformedPattern { .. } => PathError::build_failure(e.to_string()),
            other => other,
        })?;
        let compiled = synthesize(automaton, &self.partitioner, &self.registry, encoding)?;
        info!(
            queries = self.registry.queries().len(),
            entries = patterns.len(),
            tokens = self.partitioner.alphabet().len(),
            states = compiled.automaton.len(),
            accepting = compiled.automaton.accepting_count(),
            tag_rules = compiled.tag_rules.len(),
            count_rules = compiled.count_rules.len(),
            "compiled path queries"
        );
        Ok(compiled)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Runtime side
    // ═══════════════════════════════════════════════════════════════════════

    /// Deliver `packet` to a sink as the runtime would. Returns `false` for an
    /// unknown sink.
    pub fn dispatch(&self, sink: SinkId, packet: &P::Packet) -> bool {
        match self.registry.bucket(sink) {
            Some(bucket) => {
                bucket.notify(packet);
                true
            }
            None => false,
        }
    }

    /// Push one packet along `hops` through the compiled policies.
    ///
    /// Each element of `hops` is the packet as observed at that hop; the state
    /// tag written at one hop is carried into the next. At every hop the
    /// counting policy sees the packet before it is retagged. Deliveries are
    /// dispatched to the sinks.
    pub fn replay<E>(
        &self,
        compiled: &CompiledPolicies<P>,
        encoding: &E,
        hops: &[P::Packet],
    ) -> Replay<P::Packet>
    where
        E: TagEncoding<P> + ?Sized,
    {
        let mut state = StateId::START;
        let mut replay = Replay {
            states: Vec::with_capacity(hops.len()),
            deliveries: Vec::new(),
            egress: None,
        };
        let mut last = None;
        for (i, hop) in hops.iter().enumerate() {
            let mut packet = hop.clone();
            encoding.set_state(&mut packet, state);

            for (sink, delivered) in compiled.counting.evaluate(&packet, encoding).deliveries {
                self.dispatch(sink, &delivered);
                replay.deliveries.push((i, sink));
            }

            let tagged = compiled
                .tagging
                .evaluate(&packet, encoding)
                .packets
                .into_iter()
                .next()
                .unwrap_or(packet);
            state = encoding.state_of(&tagged);
            replay.states.push(state);
            last = Some(tagged);
        }
        replay.egress = last.and_then(|pkt| {
            compiled
                .untagging
                .evaluate(&pkt, encoding)
                .packets
                .into_iter()
                .next()
        });
        replay
    }
}

impl<P: HeaderPredicate> Default for Compiler<P> {
    fn default() -> Self {
        Self::new()
    }
}
