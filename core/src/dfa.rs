//! Complete DFAs: subset construction, product, complement, minimization.
//!
//! Every state has a transition on every symbol (a dead state absorbs the
//! rest), which is what makes complement a simple label flip. Labels are the
//! sets of pattern indices a state accepts; an empty label is non-accepting.

use crate::nfa::Nfa;
use crate::{PathError, Result};
use std::collections::{BTreeSet, HashMap, VecDeque};

pub(crate) type Label = BTreeSet<usize>;

#[derive(Debug, Clone)]
pub(crate) struct Dfa {
    pub(crate) start: usize,
    pub(crate) delta: Vec<Vec<usize>>,
    pub(crate) labels: Vec<Label>,
}

fn too_many(max_states: usize) -> PathError {
    PathError::build_failure(format!("automaton exceeds {max_states} states"))
}

impl Dfa {
    pub(crate) fn len(&self) -> usize {
        self.delta.len()
    }

    pub(crate) fn symbols(&self) -> usize {
        self.delta.first().map_or(0, Vec::len)
    }

    fn closure(nfa: &Nfa, seeds: impl IntoIterator<Item = usize>) -> BTreeSet<usize> {
        let mut set = BTreeSet::new();
        let mut stack: Vec<usize> = seeds.into_iter().collect();
        while let Some(s) = stack.pop() {
            if set.insert(s) {
                stack.extend(nfa.eps[s].iter().copied());
            }
        }
        set
    }

    /// Subset construction.
    pub(crate) fn from_nfa(
        nfa: &Nfa,
        start: usize,
        symbols: usize,
        max_states: usize,
    ) -> Result<Self> {
        let mut ids: HashMap<BTreeSet<usize>, usize> = HashMap::new();
        let mut sets: Vec<BTreeSet<usize>> = Vec::new();
        let mut delta: Vec<Vec<usize>> = Vec::new();
        let mut labels = Vec::new();

        let initial = Self::closure(nfa, [start]);
        ids.insert(initial.clone(), 0);
        sets.push(initial);

        let mut next = 0;
        while next < sets.len() {
            let current = sets[next].clone();
            labels.push(current.iter().filter_map(|s| nfa.accepts[*s]).collect::<Label>());
            let mut row = Vec::with_capacity(symbols);
            for symbol in 0..symbols {
                let targets = current
                    .iter()
                    .flat_map(|s| nfa.moves[*s].iter())
                    .filter(|(sym, _)| *sym == symbol)
                    .map(|(_, dst)| *dst);
                let set = Self::closure(nfa, targets);
                let id = match ids.get(&set) {
                    Some(id) => *id,
                    None => {
                        if sets.len() >= max_states {
                            return Err(too_many(max_states));
                        }
                        ids.insert(set.clone(), sets.len());
                        sets.push(set);
                        sets.len() - 1
                    }
                };
                row.push(id);
            }
            delta.push(row);
            next += 1;
        }
        Ok(Self {
            start: 0,
            delta,
            labels,
        })
    }

    /// Product automaton accepting where both operands accept.
    pub(crate) fn intersect(&self, other: &Self, max_states: usize) -> Result<Self> {
        let symbols = self.symbols().max(other.symbols());
        let mut ids: HashMap<(usize, usize), usize> = HashMap::new();
        let mut pairs = vec![(self.start, other.start)];
        ids.insert((self.start, other.start), 0);
        let mut delta = Vec::new();
        let mut labels = Vec::new();

        let mut next = 0;
        while next < pairs.len() {
            let (a, b) = pairs[next];
            let accepting = !self.labels[a].is_empty() && !other.labels[b].is_empty();
            labels.push(if accepting { Label::from([0]) } else { Label::new() });
            let mut row = Vec::with_capacity(symbols);
            for symbol in 0..symbols {
                let pair = (self.delta[a][symbol], other.delta[b][symbol]);
                let id = match ids.get(&pair) {
                    Some(id) => *id,
                    None => {
                        if pairs.len() >= max_states {
                            return Err(too_many(max_states));
                        }
                        ids.insert(pair, pairs.len());
                        pairs.push(pair);
                        pairs.len() - 1
                    }
                };
                row.push(id);
            }
            delta.push(row);
            next += 1;
        }
        Ok(Self {
            start: 0,
            delta,
            labels,
        })
    }

    /// Same transitions, accepting exactly where `self` does not.
    pub(crate) fn complement(&self) -> Self {
        let labels = self
            .labels
            .iter()
            .map(|l| if l.is_empty() { Label::from([0]) } else { Label::new() })
            .collect();
        Self {
            start: self.start,
            delta: self.delta.clone(),
            labels,
        }
    }

    /// Returns `true` if some reachable state accepts.
    pub(crate) fn has_accepting(&self) -> bool {
        self.reachable().iter().any(|s| !self.labels[*s].is_empty())
    }

    /// Label of the state reached by `word`.
    pub(crate) fn run(&self, word: &[usize]) -> Option<&Label> {
        let mut state = self.start;
        for symbol in word {
            state = *self.delta[state].get(*symbol)?;
        }
        Some(&self.labels[state])
    }

    fn reachable(&self) -> Vec<usize> {
        let mut seen = vec![false; self.len()];
        let mut order = Vec::new();
        let mut queue = VecDeque::from([self.start]);
        seen[self.start] = true;
        while let Some(s) = queue.pop_front() {
            order.push(s);
            for t in &self.delta[s] {
                if !seen[*t] {
                    seen[*t] = true;
                    queue.push_back(*t);
                }
            }
        }
        order
    }

    /// States from which some accepting state is reachable.
    pub(crate) fn live(&self) -> Vec<bool> {
        let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); self.len()];
        for (s, row) in self.delta.iter().enumerate() {
            for t in row {
                reverse[*t].push(s);
            }
        }
        let mut live = vec![false; self.len()];
        let mut stack: Vec<usize> = (0..self.len())
            .filter(|s| !self.labels[*s].is_empty())
            .collect();
        for s in &stack {
            live[*s] = true;
        }
        while let Some(s) = stack.pop() {
            for p in &reverse[s] {
                if !live[*p] {
                    live[*p] = true;
                    stack.push(*p);
                }
            }
        }
        live
    }

    /// Moore partition refinement, seeded by label.
    ///
    /// The quotient keeps only states reachable from the start.
    pub(crate) fn minimize(&self) -> Self {
        let mut block: Vec<usize> = {
            let mut seed: HashMap<&Label, usize> = HashMap::new();
            self.labels
                .iter()
                .map(|l| {
                    let n = seed.len();
                    *seed.entry(l).or_insert(n)
                })
                .collect()
        };
        let mut count = block.iter().collect::<BTreeSet<_>>().len();
        loop {
            let mut signatures: HashMap<(usize, Vec<usize>), usize> = HashMap::new();
            let refined: Vec<usize> = (0..self.len())
                .map(|s| {
                    let sig = (block[s], self.delta[s].iter().map(|t| block[*t]).collect());
                    let n = signatures.len();
                    *signatures.entry(sig).or_insert(n)
                })
                .collect();
            let refined_count = signatures.len();
            block = refined;
            if refined_count == count {
                break;
            }
            count = refined_count;
        }

        // Renumber blocks in reachability order of their members.
        let mut renumber: HashMap<usize, usize> = HashMap::new();
        let mut delta = Vec::new();
        let mut labels = Vec::new();
        for s in self.reachable() {
            if renumber.contains_key(&block[s]) {
                continue;
            }
            renumber.insert(block[s], renumber.len());
            delta.push(s);
            labels.push(self.labels[s].clone());
        }
        let delta = delta
            .into_iter()
            .map(|rep| {
                self.delta[rep]
                    .iter()
                    .map(|t| renumber.get(&block[*t]).copied().unwrap_or_default())
                    .collect()
            })
            .collect();
        Self {
            start: renumber.get(&block[self.start]).copied().unwrap_or_default(),
            delta,
            labels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-symbol DFA accepting words ending in symbol 1, with a redundant copy
    /// of the accepting state.
    fn ends_in_one() -> Dfa {
        Dfa {
            start: 0,
            delta: vec![vec![0, 1], vec![0, 2], vec![0, 1]],
            labels: vec![Label::new(), Label::from([0]), Label::from([0])],
        }
    }

    #[test]
    fn minimize_merges_equivalent_states() {
        let min = ends_in_one().minimize();
        assert_eq!(min.len(), 2);
        assert_eq!(min.start, 0);
        assert!(min.run(&[0, 1]).is_some_and(|l| !l.is_empty()));
        assert!(min.run(&[1, 0]).is_some_and(Label::is_empty));
    }

    #[test]
    fn minimize_keeps_distinct_labels_apart() {
        let dfa = Dfa {
            start: 0,
            delta: vec![vec![1, 2], vec![1, 1], vec![2, 2]],
            labels: vec![Label::new(), Label::from([0]), Label::from([1])],
        };
        assert_eq!(dfa.minimize().len(), 3);
    }

    #[test]
    fn complement_flips_acceptance() {
        let c = ends_in_one().complement();
        assert!(c.run(&[]).is_some_and(|l| !l.is_empty()));
        assert!(c.run(&[1]).is_some_and(Label::is_empty));
    }

    #[test]
    fn product_of_disjoint_is_empty() {
        let d = ends_in_one();
        assert!(!d.intersect(&d.complement(), 16).unwrap().has_accepting());
        assert!(d.intersect(&d, 16).unwrap().has_accepting());
    }

    #[test]
    fn state_limit_is_enforced() {
        let d = ends_in_one();
        let err = d.intersect(&d.complement(), 1).unwrap_err();
        assert!(matches!(err, PathError::AutomatonBuildFailure { .. }));
    }

    #[test]
    fn live_excludes_dead_sink() {
        let dfa = Dfa {
            start: 0,
            delta: vec![vec![1, 2], vec![1, 1], vec![2, 2]],
            labels: vec![Label::new(), Label::from([0]), Label::new()],
        };
        assert_eq!(dfa.live(), vec![true, true, false]);
    }
}
