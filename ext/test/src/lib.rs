//! pathq-test: Reference header-space domain for conformance testing
//!
//! Provides a concrete, exact predicate algebra over named integer header
//! fields, a packet type and a tag encoding. This is the reference domain
//! that shows how to plug a predicate language into pathq.
//!
//! # Example
//!
//! ```
//! use pathq_test::prelude::*;
//!
//! let s1 = HeaderSpace::field("switch", 1);
//! let web = HeaderSpace::field("port", 80);
//! let pkt = Packet::new().with("switch", 1).with("port", 80);
//!
//! assert!(s1.and(&web).matches(&pkt));
//! assert!(!s1.and(&web.not()).matches(&pkt));
//! assert!(s1.and(&HeaderSpace::field("switch", 2)).is_empty());
//! ```

use pathq::{HeaderPredicate, IntoPredicate, PathError, StateId, TagEncoding};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[cfg(feature = "fixtures")]
pub mod fixture;

// ═══════════════════════════════════════════════════════════════════════════════
// Packets
// ═══════════════════════════════════════════════════════════════════════════════

/// A packet: named header fields with integer values.
///
/// A field that is not present reads as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    fields: BTreeMap<String, u64>,
}

impl Packet {
    /// A packet with no fields set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field (builder pattern).
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: u64) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Value of `field`, 0 if absent.
    #[must_use]
    pub fn get(&self, field: &str) -> u64 {
        self.fields.get(field).copied().unwrap_or(0)
    }

    /// Returns `true` if `field` is present.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Set a field in place.
    pub fn set(&mut self, field: impl Into<String>, value: u64) {
        self.fields.insert(field.into(), value);
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) {
        self.fields.remove(field);
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        write!(f, "}}")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Header space
// ═══════════════════════════════════════════════════════════════════════════════

/// Test on one field inside a cube.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldTest {
    /// Field equals the value.
    Eq(u64),
    /// Field equals none of the values. Never empty: the value space is
    /// far larger than any finite exclusion list.
    NotIn(BTreeSet<u64>),
}

impl FieldTest {
    fn accepts(&self, value: u64) -> bool {
        match self {
            Self::Eq(v) => *v == value,
            Self::NotIn(vs) => !vs.contains(&value),
        }
    }

    fn meet(&self, other: &Self) -> Option<Self> {
        match (self, other) {
            (Self::Eq(a), Self::Eq(b)) => (a == b).then_some(Self::Eq(*a)),
            (Self::Eq(a), Self::NotIn(s)) | (Self::NotIn(s), Self::Eq(a)) => {
                (!s.contains(a)).then_some(Self::Eq(*a))
            }
            (Self::NotIn(s), Self::NotIn(t)) => Some(Self::NotIn(s.union(t).copied().collect())),
        }
    }

    fn within(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Eq(a), Self::Eq(b)) => a == b,
            (Self::Eq(a), Self::NotIn(s)) => !s.contains(a),
            (Self::NotIn(_), Self::Eq(_)) => false,
            (Self::NotIn(s), Self::NotIn(t)) => t.is_subset(s),
        }
    }
}

/// Conjunction of field tests. Fields not mentioned are unconstrained.
type Cube = BTreeMap<String, FieldTest>;

fn cube_meet(a: &Cube, b: &Cube) -> Option<Cube> {
    let mut out = a.clone();
    for (field, test) in b {
        let merged = match out.get(field) {
            Some(existing) => existing.meet(test)?,
            None => test.clone(),
        };
        out.insert(field.clone(), merged);
    }
    Some(out)
}

fn cube_within(a: &Cube, b: &Cube) -> bool {
    b.iter()
        .all(|(field, test)| a.get(field).is_some_and(|mine| mine.within(test)))
}

fn cube_negate(cube: &Cube) -> Vec<Cube> {
    let mut out = Vec::new();
    for (field, test) in cube {
        match test {
            FieldTest::Eq(v) => {
                out.push(Cube::from([(field.clone(), FieldTest::NotIn(BTreeSet::from([*v])))]));
            }
            FieldTest::NotIn(vs) => {
                out.extend(vs.iter().map(|v| Cube::from([(field.clone(), FieldTest::Eq(*v))])));
            }
        }
    }
    out
}

/// A set of packets in disjunctive normal form over named `u64` fields.
///
/// Every stored cube is satisfiable, so [`is_empty`](HeaderPredicate::is_empty)
/// is exact. Cubes contained in another cube are dropped on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderSpace {
    cubes: BTreeSet<Cube>,
}

impl HeaderSpace {
    /// Packets whose `field` equals `value`.
    #[must_use]
    pub fn field(field: impl Into<String>, value: u64) -> Self {
        Self::from_cubes([Cube::from([(field.into(), FieldTest::Eq(value))])])
    }

    /// Packets whose `field` equals any of `values`.
    #[must_use]
    pub fn any_value(field: &str, values: &[u64]) -> Self {
        Self::from_cubes(
            values
                .iter()
                .map(|v| Cube::from([(field.to_owned(), FieldTest::Eq(*v))])),
        )
    }

    /// Packets matching every `(field, value)` pair.
    #[must_use]
    pub fn all_of<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u64)>,
    {
        pairs
            .into_iter()
            .fold(Self::identity(), |acc, (f, v)| acc.and(&Self::field(f, v)))
    }

    /// Number of cubes in the normal form.
    #[must_use]
    pub fn cube_count(&self) -> usize {
        self.cubes.len()
    }

    fn from_cubes<I: IntoIterator<Item = Cube>>(cubes: I) -> Self {
        let mut kept: Vec<Cube> = Vec::new();
        for cube in cubes {
            if kept.iter().any(|k| cube_within(&cube, k)) {
                continue;
            }
            kept.retain(|k| !cube_within(k, &cube));
            kept.push(cube);
        }
        Self {
            cubes: kept.into_iter().collect(),
        }
    }
}

impl HeaderPredicate for HeaderSpace {
    type Packet = Packet;

    fn identity() -> Self {
        Self {
            cubes: BTreeSet::from([Cube::new()]),
        }
    }

    fn drop() -> Self {
        Self { cubes: BTreeSet::new() }
    }

    fn and(&self, other: &Self) -> Self {
        Self::from_cubes(
            self.cubes
                .iter()
                .flat_map(|a| other.cubes.iter().filter_map(move |b| cube_meet(a, b))),
        )
    }

    fn or(&self, other: &Self) -> Self {
        Self::from_cubes(self.cubes.iter().chain(&other.cubes).cloned())
    }

    fn not(&self) -> Self {
        self.cubes
            .iter()
            .fold(Self::identity(), |acc, cube| acc.and(&Self::from_cubes(cube_negate(cube))))
    }

    fn is_empty(&self) -> bool {
        self.cubes.is_empty()
    }

    fn matches(&self, packet: &Packet) -> bool {
        self.cubes
            .iter()
            .any(|cube| cube.iter().all(|(field, test)| test.accepts(packet.get(field))))
    }
}

impl fmt::Display for HeaderSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.cubes.is_empty() {
            return write!(f, "false");
        }
        for (i, cube) in self.cubes.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            if cube.is_empty() {
                write!(f, "true")?;
                continue;
            }
            for (j, (field, test)) in cube.iter().enumerate() {
                if j > 0 {
                    write!(f, " & ")?;
                }
                match test {
                    FieldTest::Eq(v) => write!(f, "{field}={v}")?,
                    FieldTest::NotIn(vs) => {
                        let list: Vec<String> = vs.iter().map(u64::to_string).collect();
                        write!(f, "{field}!={{{}}}", list.join(","))?;
                    }
                }
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tag encoding
// ═══════════════════════════════════════════════════════════════════════════════

/// Carries the automaton state in an integer header field.
///
/// State 0 is "untagged": a missing tag field reads as 0, and setting the
/// start state removes the field. Egress is marked by a second field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagField {
    /// Field holding the state.
    pub field: String,
    /// Field marking the last hop.
    pub egress_field: String,
    /// Value of `egress_field` at the last hop.
    pub egress_value: u64,
}

impl Default for TagField {
    fn default() -> Self {
        Self {
            field: "path_tag".into(),
            egress_field: "egress".into(),
            egress_value: 1,
        }
    }
}

impl TagField {
    /// Tag on `field`, default egress marker.
    #[must_use]
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }
}

impl TagEncoding<HeaderSpace> for TagField {
    fn matches_state(&self, state: StateId) -> HeaderSpace {
        HeaderSpace::field(self.field.as_str(), u64::from(state.index()))
    }

    fn at_egress(&self) -> HeaderSpace {
        HeaderSpace::field(self.egress_field.as_str(), self.egress_value)
    }

    fn set_state(&self, packet: &mut Packet, state: StateId) {
        if state.is_start() {
            packet.remove(&self.field);
        } else {
            packet.set(self.field.as_str(), u64::from(state.index()));
        }
    }

    fn strip(&self, packet: &mut Packet) {
        packet.remove(&self.field);
    }

    fn state_of(&self, packet: &Packet) -> StateId {
        StateId::new(u32::try_from(packet.get(&self.field)).unwrap_or(u32::MAX))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Config support
// ═══════════════════════════════════════════════════════════════════════════════

/// One field's accepted values in a [`HeaderMatch`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Exactly this value.
    One(u64),
    /// Any of these values.
    AnyOf(Vec<u64>),
}

/// Config form of an atom: `{ field: value, field: [v1, v2] }`, the
/// conjunction of its fields. An empty map matches every packet.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct HeaderMatch(pub BTreeMap<String, FieldValue>);

impl IntoPredicate<HeaderSpace> for HeaderMatch {
    fn into_predicate(&self) -> pathq::Result<HeaderSpace> {
        let mut acc = HeaderSpace::identity();
        for (field, value) in &self.0 {
            let space = match value {
                FieldValue::One(v) => HeaderSpace::field(field.as_str(), *v),
                FieldValue::AnyOf(vs) if vs.is_empty() => {
                    return Err(PathError::InvalidConfig(format!(
                        "field `{field}` lists no values"
                    )));
                }
                FieldValue::AnyOf(vs) => HeaderSpace::any_value(field, vs),
            };
            acc = acc.and(&space);
        }
        Ok(acc)
    }
}

/// Query-set file shape for this domain.
pub type QuerySet = pathq::QuerySetConfig<HeaderMatch>;

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{FieldTest, FieldValue, HeaderMatch, HeaderSpace, Packet, QuerySet, TagField};
    pub use pathq::prelude::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkt(switch: u64, port: u64) -> Packet {
        Packet::new().with("switch", switch).with("port", port)
    }

    #[test]
    fn packet_builder() {
        let p = Packet::new().with("switch", 3);
        assert_eq!(p.get("switch"), 3);
        assert_eq!(p.get("missing"), 0);
        assert!(!p.has("missing"));
        assert_eq!(p.to_string(), "{switch=3}");
    }

    #[test]
    fn field_and_or() {
        let s1 = HeaderSpace::field("switch", 1);
        let s2 = HeaderSpace::field("switch", 2);
        assert!(s1.and(&s2).is_empty());
        let either = s1.or(&s2);
        assert!(either.matches(&pkt(1, 0)));
        assert!(either.matches(&pkt(2, 0)));
        assert!(!either.matches(&pkt(3, 0)));
    }

    #[test]
    fn not_is_exact() {
        let s1 = HeaderSpace::field("switch", 1);
        let rest = s1.not();
        assert!(!rest.is_empty());
        assert!(rest.matches(&pkt(2, 0)));
        assert!(!rest.matches(&pkt(1, 0)));
        assert!(s1.and(&rest).is_empty());
        assert!(HeaderSpace::identity().not().is_empty());
        assert_eq!(HeaderSpace::drop().not(), HeaderSpace::identity());
    }

    #[test]
    fn double_negation_is_equivalent() {
        let a = HeaderSpace::all_of([("switch", 1), ("port", 80)]);
        let back = a.not().not();
        assert!(a.equivalent(&back));
        assert!(back.matches(&pkt(1, 80)));
        assert!(!back.matches(&pkt(1, 22)));
    }

    #[test]
    fn subsumed_cubes_are_dropped() {
        let wide = HeaderSpace::field("switch", 1);
        let narrow = HeaderSpace::all_of([("switch", 1), ("port", 80)]);
        assert_eq!(wide.or(&narrow), wide);
        assert_eq!(wide.or(&narrow).cube_count(), 1);
    }

    #[test]
    fn tag_field_round_trip() {
        let tags = TagField::default();
        let mut p = pkt(1, 0);
        assert!(tags.state_of(&p).is_start());
        assert!(tags.matches_state(StateId::START).matches(&p));

        tags.set_state(&mut p, StateId::new(4));
        assert_eq!(p.get("path_tag"), 4);
        assert!(tags.matches_state(StateId::new(4)).matches(&p));

        tags.set_state(&mut p, StateId::START);
        assert!(!p.has("path_tag"));

        tags.set_state(&mut p, StateId::new(2));
        tags.strip(&mut p);
        assert!(!p.has("path_tag"));
    }

    #[test]
    fn header_match_into_predicate() {
        let m = HeaderMatch(BTreeMap::from([
            ("switch".to_owned(), FieldValue::AnyOf(vec![1, 2])),
            ("port".to_owned(), FieldValue::One(80)),
        ]));
        let p = m.into_predicate().unwrap();
        assert!(p.matches(&pkt(2, 80)));
        assert!(!p.matches(&pkt(2, 22)));
        assert!(!p.matches(&pkt(3, 80)));

        let empty = HeaderMatch(BTreeMap::from([("switch".to_owned(), FieldValue::AnyOf(vec![]))]));
        assert!(matches!(empty.into_predicate(), Err(PathError::InvalidConfig(_))));
        assert_eq!(HeaderMatch::default().into_predicate().unwrap(), HeaderSpace::identity());
    }

    #[test]
    fn display_forms() {
        assert_eq!(HeaderSpace::drop().to_string(), "false");
        assert_eq!(HeaderSpace::identity().to_string(), "true");
        assert_eq!(HeaderSpace::field("switch", 1).not().to_string(), "switch!={1}");
    }
}
