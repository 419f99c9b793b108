//! Policy synthesis — from automaton to tag, untag and count rules
//!
//! The automaton state rides in the packet as a tag. Every edge
//! `src --label--> dst` becomes a tagging rule "tag is `src` and the packet
//! matches `label`: set the tag to `dst`"; packets no rule catches keep their
//! tag. Edges into an accepting state additionally become counting rules
//! that deliver the packet to the sink of every query that state reports
//! for. At egress the tag is stripped so end hosts never see it.
//!
//! A registry that disagrees with the automaton about its entries fails
//! synthesis; no counting rule is dropped silently.

use crate::{
    Automaton, HeaderPredicate, Partitioner, PathError, Policy, QueryId, QueryRegistry, Result,
    SinkId, StateId, TagEncoding, TokenSet,
};
use std::collections::{BTreeMap, BTreeSet};

/// One tagging transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRule<P: HeaderPredicate> {
    /// State the packet must be tagged with.
    pub src: StateId,
    /// State written into the tag.
    pub dst: StateId,
    /// Edge label the rule was built from.
    pub label: TokenSet,
    /// Packets the label denotes.
    pub predicate: P,
}

/// One counting rule: a transition into an accepting state, for one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRule<P: HeaderPredicate> {
    /// State the packet must be tagged with.
    pub src: StateId,
    /// The accepting state entered.
    pub dst: StateId,
    /// Edge label the rule was built from.
    pub label: TokenSet,
    /// Packets the label denotes.
    pub predicate: P,
    /// The query reporting the match.
    pub query: QueryId,
    /// Where the packet is delivered.
    pub sink: SinkId,
}

/// The three dataplane policies plus the structure they were built from.
#[derive(Debug, Clone)]
pub struct CompiledPolicies<P: HeaderPredicate> {
    /// Simulates the automaton by retagging.
    pub tagging: Policy<P>,
    /// Strips the tag at egress.
    pub untagging: Policy<P>,
    /// Delivers packets entering accepting states to their sinks.
    pub counting: Policy<P>,
    /// Tagging transitions, one per automaton edge.
    pub tag_rules: Vec<TagRule<P>>,
    /// Counting rules, one per (accepting edge, query).
    pub count_rules: Vec<CountRule<P>>,
    /// The automaton the rules came from.
    pub automaton: Automaton,
}

impl<P: HeaderPredicate> CompiledPolicies<P> {
    /// The deployable program: count alongside tag-then-untag.
    #[must_use]
    pub fn program(&self) -> Policy<P> {
        Policy::par(vec![
            Policy::seq(vec![self.tagging.clone(), self.untagging.clone()]),
            self.counting.clone(),
        ])
    }

    /// Sinks fed by the counting rules, ascending.
    #[must_use]
    pub fn sinks(&self) -> BTreeSet<SinkId> {
        self.count_rules.iter().map(|r| r.sink).collect()
    }
}

pub(crate) fn synthesize<P, E>(
    automaton: Automaton,
    partitioner: &Partitioner<P>,
    registry: &QueryRegistry<P>,
    encoding: &E,
) -> Result<CompiledPolicies<P>>
where
    P: HeaderPredicate,
    E: TagEncoding<P> + ?Sized,
{
    let mut tag_rules = Vec::new();
    let mut count_rules = Vec::new();
    for edge in automaton.edges() {
        let predicate = automaton.edge_predicate(edge, partitioner)?;
        let mut queries = BTreeSet::new();
        for &index in automaton.accepted_entries(edge.target) {
            let entry = registry.entries().get(index).ok_or_else(|| {
                PathError::build_failure(format!(
                    "state {} accepts entry {index}, registry holds {}",
                    edge.target,
                    registry.entries().len()
                ))
            })?;
            queries.extend(entry.contributors.iter().copied());
        }
        for query in queries {
            let q = registry.query(query).ok_or_else(|| {
                PathError::build_failure(format!("entry contributor {query} is not registered"))
            })?;
            count_rules.push(CountRule {
                src: edge.source,
                dst: edge.target,
                label: edge.label.clone(),
                predicate: predicate.clone(),
                query,
                sink: q.sink,
            });
        }
        tag_rules.push(TagRule {
            src: edge.source,
            dst: edge.target,
            label: edge.label.clone(),
            predicate,
        });
    }

    let trigger = |src: StateId, predicate: &P| encoding.matches_state(src).and(predicate);

    // Pass-through is split per source state: `tag=s ∧ ¬L_s` for the union
    // `L_s` of the labels leaving `s`, plus every tag with no outgoing edge.
    // Each complement is taken over one state's labels only.
    let mut leaving: BTreeMap<StateId, P> = BTreeMap::new();
    let mut branches = Vec::with_capacity(2 * tag_rules.len() + 1);
    for rule in &tag_rules {
        branches.push(Policy::seq(vec![
            Policy::Filter(trigger(rule.src, &rule.predicate)),
            Policy::SetState(rule.dst),
        ]));
        leaving
            .entry(rule.src)
            .and_modify(|labels| *labels = labels.or(&rule.predicate))
            .or_insert_with(|| rule.predicate.clone());
    }
    let mut idle = P::identity();
    for (&src, labels) in &leaving {
        let tagged = encoding.matches_state(src);
        branches.push(Policy::Filter(tagged.and(&labels.not())));
        idle = idle.and(&tagged.not());
    }
    branches.push(Policy::Filter(idle));
    let tagging = Policy::par(branches);

    let egress = encoding.at_egress();
    let untagging = Policy::par(vec![
        Policy::seq(vec![Policy::Filter(egress.clone()), Policy::StripState]),
        Policy::Filter(egress.not()),
    ]);

    let counting = Policy::par(
        count_rules
            .iter()
            .map(|r| {
                Policy::seq(vec![
                    Policy::Filter(trigger(r.src, &r.predicate)),
                    Policy::Deliver(r.sink),
                ])
            })
            .collect(),
    );

    Ok(CompiledPolicies {
        tagging,
        untagging,
        counting,
        tag_rules,
        count_rules,
        automaton,
    })
}
