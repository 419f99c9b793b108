//! Language-level comparisons between path regex strings.
//!
//! Two regexes are compared by what they denote, not how they are written:
//! `a ⊆ b` holds when `a & ~b` accepts nothing. Tokens are expanded to the
//! partitioner's current leaves first, so regexes written before a later
//! refinement still compare correctly.

use crate::automaton::Automaton;
use crate::nfa::{self, Alphabet};
use crate::{HeaderPredicate, Partitioner, Pattern, Result, Token};

/// Regex language queries against one partitioner's alphabet.
#[derive(Debug)]
pub struct Language<'a, P: HeaderPredicate> {
    partitioner: &'a Partitioner<P>,
    max_states: usize,
}

impl<'a, P: HeaderPredicate> Language<'a, P> {
    /// Compare regexes over the leaves of `partitioner`.
    #[must_use]
    pub fn new(partitioner: &'a Partitioner<P>, max_states: usize) -> Self {
        Self {
            partitioner,
            max_states,
        }
    }

    /// Parse `re` and rewrite every token into the leaves it stands for.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::MalformedPattern`](crate::PathError::MalformedPattern)
    /// or [`PathError::UnknownToken`](crate::PathError::UnknownToken).
    pub fn parse(&self, re: &str) -> Result<Pattern> {
        Pattern::parse(re)?.resolve(&mut |t| self.partitioner.leaves(t))
    }

    /// The partitioner tokens are resolved against.
    #[must_use]
    pub fn partitioner(&self) -> &'a Partitioner<P> {
        self.partitioner
    }

    fn alphabet(&self) -> Alphabet {
        Alphabet::new(self.partitioner.alphabet())
    }

    fn nonempty(&self, pattern: Pattern) -> Result<bool> {
        let dfa = nfa::determinize(&[pattern], &self.alphabet(), self.max_states)?;
        Ok(dfa.has_accepting())
    }

    fn difference(&self, a: &str, b: &str) -> Result<Pattern> {
        Ok(Pattern::And(
            Box::new(self.parse(a)?),
            Box::new(Pattern::Not(Box::new(self.parse(b)?))),
        ))
    }

    /// Returns `true` if `re` denotes no path at all.
    ///
    /// # Errors
    ///
    /// Propagates parse and construction errors.
    pub fn is_empty(&self, re: &str) -> Result<bool> {
        Ok(!self.nonempty(self.parse(re)?)?)
    }

    /// Returns `true` if every path in `a` is also in `b`.
    ///
    /// # Errors
    ///
    /// Propagates parse and construction errors.
    pub fn is_subset(&self, a: &str, b: &str) -> Result<bool> {
        Ok(!self.nonempty(self.difference(a, b)?)?)
    }

    /// Returns `true` if `a` and `b` denote the same paths.
    ///
    /// # Errors
    ///
    /// Propagates parse and construction errors.
    pub fn equals(&self, a: &str, b: &str) -> Result<bool> {
        Ok(self.is_subset(a, b)? && self.is_subset(b, a)?)
    }

    /// Returns `true` if some path is in both `a` and `b`.
    ///
    /// # Errors
    ///
    /// Propagates parse and construction errors.
    pub fn intersects(&self, a: &str, b: &str) -> Result<bool> {
        let both = Pattern::And(Box::new(self.parse(a)?), Box::new(self.parse(b)?));
        self.nonempty(both)
    }

    /// Returns `true` if the token word (leaf tokens) is in `re`.
    ///
    /// # Errors
    ///
    /// Propagates parse and construction errors.
    pub fn matches(&self, re: &str, word: &[Token]) -> Result<bool> {
        Ok(self.automaton(&[re])?.accepts(word))
    }

    /// Build the automaton for a regex set over the current leaves.
    ///
    /// # Errors
    ///
    /// Propagates parse and construction errors.
    pub fn automaton<S: AsRef<str>>(&self, entries: &[S]) -> Result<Automaton> {
        let patterns = entries
            .iter()
            .map(|e| self.parse(e.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Automaton::build(&patterns, &self.partitioner.alphabet(), self.max_states)
    }
}
