//! Automaton — the DFA compiled from the disjoint regex set
//!
//! Built in-process: Thompson construction, subset construction, removal of
//! states that cannot reach acceptance, then Moore minimization. States are
//! numbered breadth-first from the start state, which is always state 0.
//!
//! Each accepting state records which regex entries it accepts. When the
//! entries are pairwise disjoint (as the registry guarantees) that is exactly
//! one entry per accepting state.
//!
//! # Rendering
//!
//! ```text
//! States:
//! 0
//! 1
//! 2: accepting state for expression 0
//! Transitions:
//! 0 --> 1 --> 1
//! 1 --> 2 --> 2
//! ```

use crate::dfa::Dfa;
use crate::nfa::{self, Alphabet};
use crate::{HeaderPredicate, Partitioner, Pattern, Result, Token, TokenSet};
use std::collections::{BTreeMap, VecDeque};
use std::fmt::{self, Write as _};
use tracing::debug;

/// Default bound on the number of states subset construction may create.
pub const DEFAULT_MAX_STATES: usize = 4096;

/// Identifier of an automaton state, also the value carried in the packet tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StateId(u32);

impl StateId {
    /// The start state. Packets without a tag are in this state.
    pub const START: Self = Self(0);

    /// Wrap a raw state number.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw state number.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Returns `true` for [`StateId::START`].
    #[must_use]
    pub const fn is_start(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transition between two states on a set of tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// State the transition leaves.
    pub source: StateId,
    /// State the transition enters.
    pub target: StateId,
    /// Tokens that trigger it.
    pub label: TokenSet,
}

#[derive(Debug, Clone)]
struct State {
    accepts: Vec<usize>,
    edges: Vec<Edge>,
}

/// A trimmed, minimal DFA over leaf tokens.
#[derive(Debug, Clone)]
pub struct Automaton {
    states: Vec<State>,
    alphabet: Vec<Token>,
}

impl Automaton {
    /// Compile `entries` into one automaton whose accepting states remember
    /// the index of the entry they accept.
    ///
    /// Every token must belong to `alphabet`; `~` complements relative to it.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`](crate::PathError::UnknownToken)
    /// for a token outside the alphabet and
    /// [`PathError::AutomatonBuildFailure`](crate::PathError::AutomatonBuildFailure)
    /// if the construction exceeds `max_states`.
    pub fn build(entries: &[Pattern], alphabet: &[Token], max_states: usize) -> Result<Self> {
        let alphabet = Alphabet::new(alphabet.iter().copied());
        let dfa = nfa::determinize(entries, &alphabet, max_states)?;
        let raw = dfa.len();
        let min = dfa.minimize();
        let automaton = Self::from_dfa(&min, &alphabet);
        debug!(
            entries = entries.len(),
            symbols = alphabet.len(),
            subset_states = raw,
            states = automaton.len(),
            "built automaton"
        );
        Ok(automaton)
    }

    fn from_dfa(dfa: &Dfa, alphabet: &Alphabet) -> Self {
        let live = dfa.live();

        // Breadth-first numbering over live states, start first.
        let mut number: BTreeMap<usize, u32> = BTreeMap::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([dfa.start]);
        number.insert(dfa.start, 0);
        while let Some(s) = queue.pop_front() {
            order.push(s);
            for t in &dfa.delta[s] {
                if live[*t] && !number.contains_key(t) {
                    let id = u32::try_from(number.len()).unwrap_or(u32::MAX);
                    number.insert(*t, id);
                    queue.push_back(*t);
                }
            }
        }

        let states = order
            .iter()
            .map(|s| {
                let source = StateId(number[s]);
                let mut by_target: BTreeMap<u32, TokenSet> = BTreeMap::new();
                for (symbol, t) in dfa.delta[*s].iter().enumerate() {
                    if let Some(id) = number.get(t).filter(|_| live[*t]) {
                        by_target.entry(*id).or_default().insert(alphabet.token(symbol));
                    }
                }
                let edges = by_target
                    .into_iter()
                    .map(|(target, label)| Edge {
                        source,
                        target: StateId(target),
                        label,
                    })
                    .collect();
                State {
                    accepts: dfa.labels[*s].iter().copied().collect(),
                    edges,
                }
            })
            .collect();

        Self {
            states,
            alphabet: alphabet.tokens().to_vec(),
        }
    }

    /// The start state.
    #[must_use]
    pub fn start(&self) -> StateId {
        StateId::START
    }

    /// Number of states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Always `false`: an automaton has at least its start state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The tokens this automaton was built over.
    #[must_use]
    pub fn alphabet(&self) -> &[Token] {
        &self.alphabet
    }

    /// All states in breadth-first order.
    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        (0..self.states.len()).map(|i| StateId(u32::try_from(i).unwrap_or(u32::MAX)))
    }

    fn state(&self, id: StateId) -> Option<&State> {
        self.states.get(id.0 as usize)
    }

    /// All edges, grouped by source state.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> + '_ {
        self.states.iter().flat_map(|s| s.edges.iter())
    }

    /// Edges leaving `id`.
    #[must_use]
    pub fn edges_from(&self, id: StateId) -> &[Edge] {
        self.state(id).map_or(&[][..], |s| s.edges.as_slice())
    }

    /// Returns `true` if `id` accepts some entry.
    #[must_use]
    pub fn is_accepting(&self, id: StateId) -> bool {
        self.state(id).is_some_and(|s| !s.accepts.is_empty())
    }

    /// The entry index accepted at `id`, if any.
    #[must_use]
    pub fn accepted_entry(&self, id: StateId) -> Option<usize> {
        self.state(id).and_then(|s| s.accepts.first().copied())
    }

    /// Every entry index accepted at `id`, ascending.
    #[must_use]
    pub fn accepted_entries(&self, id: StateId) -> &[usize] {
        self.state(id).map_or(&[][..], |s| s.accepts.as_slice())
    }

    /// Number of accepting states.
    #[must_use]
    pub fn accepting_count(&self) -> usize {
        self.states.iter().filter(|s| !s.accepts.is_empty()).count()
    }

    /// Follow one transition. `None` means the word can no longer be accepted.
    #[must_use]
    pub fn step(&self, from: StateId, token: Token) -> Option<StateId> {
        self.edges_from(from)
            .iter()
            .find(|e| e.label.contains(token))
            .map(|e| e.target)
    }

    /// State reached after reading `word` from the start.
    #[must_use]
    pub fn run(&self, word: &[Token]) -> Option<StateId> {
        word.iter().try_fold(self.start(), |s, t| self.step(s, *t))
    }

    /// Returns `true` if `word` is in the language.
    #[must_use]
    pub fn accepts(&self, word: &[Token]) -> bool {
        self.run(word).is_some_and(|s| self.is_accepting(s))
    }

    /// Predicate denoted by an edge label, through the partitioner that minted
    /// its tokens.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::UnknownToken`](crate::PathError::UnknownToken) if
    /// the label mentions a token the partitioner never minted.
    pub fn edge_predicate<P: HeaderPredicate>(
        &self,
        edge: &Edge,
        partitioner: &Partitioner<P>,
    ) -> Result<P> {
        partitioner.label_predicate(&edge.label)
    }

    /// Graphviz rendering. Accepting states are double circles.
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph path_automaton {\n    rankdir=LR;\n");
        for id in self.states() {
            match self.accepted_entries(id) {
                [] => {
                    let _ = writeln!(out, "    {id} [shape=circle];");
                }
                entries => {
                    let list: Vec<String> = entries.iter().map(ToString::to_string).collect();
                    let _ = writeln!(
                        out,
                        "    {id} [shape=doublecircle, xlabel=\"expr {}\"];",
                        list.join(",")
                    );
                }
            }
        }
        for edge in self.edges() {
            let label = edge.label.to_string().replace('\\', "\\\\").replace('"', "\\\"");
            let _ = writeln!(out, "    {} -> {} [label=\"{label}\"];", edge.source, edge.target);
        }
        out.push_str("}\n");
        out
    }
}

impl fmt::Display for Automaton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "States:")?;
        for id in self.states() {
            match self.accepted_entries(id) {
                [] => writeln!(f, "{id}")?,
                entries => {
                    for entry in entries {
                        writeln!(f, "{id}: accepting state for expression {entry}")?;
                    }
                }
            }
        }
        writeln!(f, "Transitions:")?;
        for edge in self.edges() {
            writeln!(f, "{} --> {} --> {}", edge.source, edge.label, edge.target)?;
        }
        Ok(())
    }
}

/// Lexer-definition text for a regex set, one rule per entry:
/// `<regex> => ( T.expr_<n> );`.
#[must_use]
pub fn lexer_spec<S: AsRef<str>>(entries: &[S]) -> String {
    let mut out = String::new();
    for (n, entry) in entries.iter().enumerate() {
        let _ = writeln!(out, "{} => ( T.expr_{n} );", entry.as_ref());
    }
    out
}
