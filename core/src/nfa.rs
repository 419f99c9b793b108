//! Thompson construction from [`Pattern`] to an ε-NFA.
//!
//! Intersection and complement have no Thompson gadget. Their operands are
//! determinized on the spot, combined as DFAs and spliced back in as an
//! ordinary fragment.

use crate::dfa::Dfa;
use crate::{PathError, Pattern, Result, Token};
use std::collections::HashMap;

/// The symbols an automaton is built over, indexed densely.
#[derive(Debug, Clone)]
pub(crate) struct Alphabet {
    tokens: Vec<Token>,
    index: HashMap<Token, usize>,
}

impl Alphabet {
    pub(crate) fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        let mut tokens: Vec<Token> = tokens.into_iter().collect();
        tokens.sort_unstable();
        tokens.dedup();
        let index = tokens.iter().enumerate().map(|(i, t)| (*t, i)).collect();
        Self { tokens, index }
    }

    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }

    pub(crate) fn token(&self, symbol: usize) -> Token {
        self.tokens[symbol]
    }

    pub(crate) fn symbol(&self, token: Token) -> Result<usize> {
        self.index
            .get(&token)
            .copied()
            .ok_or(PathError::UnknownToken(token.as_char()))
    }

    pub(crate) fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

#[derive(Debug, Default)]
pub(crate) struct Nfa {
    pub(crate) eps: Vec<Vec<usize>>,
    pub(crate) moves: Vec<Vec<(usize, usize)>>,
    pub(crate) accepts: Vec<Option<usize>>,
}

#[derive(Debug, Clone, Copy)]
struct Fragment {
    start: usize,
    end: usize,
}

impl Nfa {
    pub(crate) fn len(&self) -> usize {
        self.eps.len()
    }

    fn state(&mut self) -> usize {
        self.eps.push(Vec::new());
        self.moves.push(Vec::new());
        self.accepts.push(None);
        self.eps.len() - 1
    }

    fn link(&mut self, from: usize, to: usize) {
        self.eps[from].push(to);
    }
}

struct Thompson<'a> {
    nfa: Nfa,
    alphabet: &'a Alphabet,
    max_states: usize,
}

impl Thompson<'_> {
    fn fragment(&mut self, pattern: &Pattern) -> Result<Fragment> {
        if self.nfa.len() > self.max_states.saturating_mul(8) {
            return Err(PathError::build_failure(format!(
                "pattern expands beyond {} NFA states",
                self.max_states.saturating_mul(8)
            )));
        }
        let frag = match pattern {
            Pattern::Empty => {
                let start = self.nfa.state();
                let end = self.nfa.state();
                Fragment { start, end }
            }
            Pattern::Epsilon => {
                let start = self.nfa.state();
                let end = self.nfa.state();
                self.nfa.link(start, end);
                Fragment { start, end }
            }
            Pattern::Class(tokens) => {
                let start = self.nfa.state();
                let end = self.nfa.state();
                for token in tokens {
                    let symbol = self.alphabet.symbol(*token)?;
                    self.nfa.moves[start].push((symbol, end));
                }
                Fragment { start, end }
            }
            Pattern::Concat(parts) => {
                let start = self.nfa.state();
                let mut end = start;
                for part in parts {
                    let f = self.fragment(part)?;
                    self.nfa.link(end, f.start);
                    end = f.end;
                }
                Fragment { start, end }
            }
            Pattern::Alt(parts) => {
                let start = self.nfa.state();
                let end = self.nfa.state();
                for part in parts {
                    let f = self.fragment(part)?;
                    self.nfa.link(start, f.start);
                    self.nfa.link(f.end, end);
                }
                Fragment { start, end }
            }
            Pattern::Star(inner) => {
                let start = self.nfa.state();
                let end = self.nfa.state();
                let f = self.fragment(inner)?;
                self.nfa.link(start, f.start);
                self.nfa.link(start, end);
                self.nfa.link(f.end, f.start);
                self.nfa.link(f.end, end);
                Fragment { start, end }
            }
            Pattern::And(a, b) => {
                let da = self.isolate(a)?;
                let db = self.isolate(b)?;
                let product = da.intersect(&db, self.max_states)?;
                self.splice(&product)
            }
            Pattern::Not(inner) => {
                let d = self.isolate(inner)?;
                self.splice(&d.complement())
            }
        };
        Ok(frag)
    }

    /// Determinize one sub-pattern on its own.
    fn isolate(&self, pattern: &Pattern) -> Result<Dfa> {
        determinize(std::slice::from_ref(pattern), self.alphabet, self.max_states)
    }

    /// Copy a DFA in as a fragment whose accepting states feed one exit.
    fn splice(&mut self, dfa: &Dfa) -> Fragment {
        let base = self.nfa.len();
        for _ in 0..dfa.len() {
            self.nfa.state();
        }
        let end = self.nfa.state();
        for (state, row) in dfa.delta.iter().enumerate() {
            for (symbol, target) in row.iter().enumerate() {
                self.nfa.moves[base + state].push((symbol, base + target));
            }
            if !dfa.labels[state].is_empty() {
                self.nfa.link(base + state, end);
            }
        }
        Fragment {
            start: base + dfa.start,
            end,
        }
    }
}

/// Build one ε-NFA whose accepting states carry the index of the pattern
/// they finish, then run subset construction on it.
///
/// # Errors
///
/// Returns [`PathError::UnknownToken`] for tokens outside `alphabet` and
/// [`PathError::AutomatonBuildFailure`] when `max_states` is exceeded.
pub(crate) fn determinize(
    patterns: &[Pattern],
    alphabet: &Alphabet,
    max_states: usize,
) -> Result<Dfa> {
    let mut builder = Thompson {
        nfa: Nfa::default(),
        alphabet,
        max_states,
    };
    let start = builder.nfa.state();
    for (index, pattern) in patterns.iter().enumerate() {
        let f = builder.fragment(pattern)?;
        builder.nfa.link(start, f.start);
        builder.nfa.accepts[f.end] = Some(index);
    }
    Dfa::from_nfa(&builder.nfa, start, alphabet.len(), max_states)
}
