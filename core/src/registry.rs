//! Finalized query registry — the disjoint regex set that gets compiled.
//!
//! Every finalized query gets its own [`Bucket`]. Its terminal regex is then
//! merged into the entry list so that entries stay pairwise disjoint as
//! languages. Each entry remembers which queries contributed to it, so an
//! accepting automaton state maps back to every query it reports for.
//!
//! # Merge
//!
//! For a new regex `N`, each existing entry `R` is compared by language:
//!
//! | `R` vs `N` | Action |
//! |------------|--------|
//! | equal | add the query to `R`, stop |
//! | `R ⊆ N` | add the query to `R`, `R` is covered |
//! | overlap | shrink `R` to `(R)&~(N)`, append `(R)&(N)` with `R`'s contributors plus the query, `R` is covered |
//! | disjoint | nothing |
//!
//! Whatever part of `N` no covered entry accounts for is appended last.
//! All comparisons run before anything is mutated, so an error leaves the
//! registry unchanged.

use crate::{Callback, HeaderPredicate, Language, PathError, PathExpr, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Index of a finalized query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryId(usize);

impl QueryId {
    /// Position in [`QueryRegistry::queries`].
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// Handle of a result sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SinkId(usize);

impl SinkId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position in [`QueryRegistry::buckets`].
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink{}", self.0)
    }
}

/// Result sink for one finalized query.
pub struct Bucket<P: HeaderPredicate> {
    callbacks: Vec<Callback<P>>,
    delivered: AtomicU64,
}

impl<P: HeaderPredicate> Bucket<P> {
    fn new() -> Self {
        Self {
            callbacks: Vec::new(),
            delivered: AtomicU64::new(0),
        }
    }

    /// Attach an observer invoked on every delivery.
    pub fn register_callback(&mut self, callback: Callback<P>) {
        self.callbacks.push(callback);
    }

    /// Number of observers.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// Count a delivery and run every observer in registration order.
    pub fn notify(&self, packet: &P::Packet) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        for callback in &self.callbacks {
            callback(packet);
        }
    }

    /// Packets delivered so far.
    #[must_use]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl<P: HeaderPredicate> fmt::Debug for Bucket<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket")
            .field("callbacks", &self.callbacks.len())
            .field("delivered", &self.delivered())
            .finish()
    }
}

/// One region of the disjoint regex set.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Entry {
    /// Regex over tokens.
    pub pattern: String,
    /// Queries whose language includes this region, in finalize order.
    pub contributors: Vec<QueryId>,
}

/// A query handed to [`QueryRegistry::finalize`].
#[derive(Debug, Clone)]
pub struct FinalizedQuery {
    /// Name for reports, defaults to the query id.
    pub name: String,
    /// The expression as written, over possibly composite tokens.
    pub expr: String,
    /// The expression over leaf tokens at finalize time.
    pub terminal: String,
    /// Where matches are delivered.
    pub sink: SinkId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Relation {
    Equal,
    Subset,
    Overlap,
    Disjoint,
}

/// The disjoint regex set plus the queries and sinks behind it.
pub struct QueryRegistry<P: HeaderPredicate> {
    entries: Vec<Entry>,
    queries: Vec<FinalizedQuery>,
    buckets: Vec<Bucket<P>>,
}

impl<P: HeaderPredicate> QueryRegistry<P> {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            queries: Vec::new(),
            buckets: Vec::new(),
        }
    }

    /// Drop every entry, query and sink.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.queries.clear();
        self.buckets.clear();
    }

    /// The disjoint entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entry patterns, in the order the automaton indexes them.
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.pattern.as_str()).collect()
    }

    /// Every finalized query.
    #[must_use]
    pub fn queries(&self) -> &[FinalizedQuery] {
        &self.queries
    }

    /// A finalized query by id.
    #[must_use]
    pub fn query(&self, id: QueryId) -> Option<&FinalizedQuery> {
        self.queries.get(id.0)
    }

    /// Look a query up by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<QueryId> {
        self.queries.iter().position(|q| q.name == name).map(QueryId)
    }

    /// Every sink, indexed by [`SinkId`].
    #[must_use]
    pub fn buckets(&self) -> &[Bucket<P>] {
        &self.buckets
    }

    /// A sink by id.
    #[must_use]
    pub fn bucket(&self, sink: SinkId) -> Option<&Bucket<P>> {
        self.buckets.get(sink.0)
    }

    /// Returns `true` if nothing has been finalized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Bind a fresh sink to `query` and merge its language into the entries.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`](crate::PathError::UnknownToken) if
    /// the expression mentions a token `language` does not know, or any
    /// error from the language comparisons. The registry is unchanged then.
    pub fn finalize(
        &mut self,
        name: Option<&str>,
        query: &PathExpr<P>,
        language: &Language<'_, P>,
    ) -> Result<QueryId> {
        let expr = query.expr();
        let terminal = language.partitioner().terminal_expression(&expr)?;
        let id = QueryId(self.queries.len());
        let plan = self.plan(&terminal, language)?;

        let sink = SinkId(self.buckets.len());
        let mut bucket = Bucket::new();
        for callback in query.callbacks() {
            bucket.register_callback(callback.clone());
        }
        self.buckets.push(bucket);
        self.queries.push(FinalizedQuery {
            name: name.map_or_else(|| id.to_string(), str::to_owned),
            expr,
            terminal: terminal.clone(),
            sink,
        });
        self.apply(&terminal, id, plan);
        Ok(id)
    }

    /// Merge `new_re` for `query` keeping entries pairwise disjoint.
    ///
    /// Returns `true` if a region not covered by any earlier entry was added.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownQuery`] if `query` was never finalized
    /// here, and propagates language comparison errors. The registry is
    /// unchanged in both cases.
    pub fn append_without_intersection(
        &mut self,
        new_re: &str,
        query: QueryId,
        language: &Language<'_, P>,
    ) -> Result<bool> {
        if self.query(query).is_none() {
            return Err(PathError::UnknownQuery(query));
        }
        let plan = self.plan(new_re, language)?;
        Ok(self.apply(new_re, query, plan))
    }

    fn plan(&self, new_re: &str, language: &Language<'_, P>) -> Result<Plan> {
        let mut relations = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let relation = if language.equals(&entry.pattern, new_re)? {
                Relation::Equal
            } else if language.is_subset(&entry.pattern, new_re)? {
                Relation::Subset
            } else if language.intersects(&entry.pattern, new_re)? {
                Relation::Overlap
            } else {
                Relation::Disjoint
            };
            relations.push(relation);
            if relation == Relation::Equal {
                return Ok(Plan {
                    relations,
                    remainder: None,
                });
            }
        }

        let covered: Vec<&str> = self
            .entries
            .iter()
            .zip(&relations)
            .filter(|(_, r)| matches!(r, Relation::Subset | Relation::Overlap))
            .map(|(e, _)| e.pattern.as_str())
            .collect();
        let remainder = if covered.is_empty() {
            if language.is_empty(new_re)? {
                debug!(pattern = new_re, "query language is empty, entry will never match");
            }
            Some(new_re.to_owned())
        } else {
            let covered = covered.join("|");
            if language.is_subset(new_re, &covered)? {
                None
            } else {
                Some(format!("({new_re}) & ~({covered})"))
            }
        };
        Ok(Plan { relations, remainder })
    }

    fn apply(&mut self, new_re: &str, query: QueryId, plan: Plan) -> bool {
        let mut appended = Vec::new();
        for (i, relation) in plan.relations.iter().enumerate() {
            let entry = &mut self.entries[i];
            match relation {
                Relation::Equal => {
                    entry.contributors.push(query);
                    warn!(%query, entry = i, "query language equals an existing entry");
                    return false;
                }
                Relation::Subset => entry.contributors.push(query),
                Relation::Overlap => {
                    let existing = std::mem::take(&mut entry.pattern);
                    entry.pattern = format!("({existing}) & ~({new_re})");
                    let mut contributors = entry.contributors.clone();
                    contributors.push(query);
                    appended.push(Entry {
                        pattern: format!("({existing}) & ({new_re})"),
                        contributors,
                    });
                }
                Relation::Disjoint => {}
            }
        }
        let splits = appended.len();
        self.entries.extend(appended);
        match plan.remainder {
            Some(pattern) => {
                self.entries.push(Entry {
                    pattern,
                    contributors: vec![query],
                });
                debug!(%query, splits, entries = self.entries.len(), "merged query into registry");
                true
            }
            None => {
                warn!(%query, splits, "query language already covered by existing entries");
                false
            }
        }
    }
}

struct Plan {
    relations: Vec<Relation>,
    remainder: Option<String>,
}

impl<P: HeaderPredicate> Default for QueryRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: HeaderPredicate> fmt::Debug for QueryRegistry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRegistry")
            .field("entries", &self.entries)
            .field("queries", &self.queries)
            .field("buckets", &self.buckets)
            .finish()
    }
}
