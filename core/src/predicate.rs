//! Predicate — the host boolean algebra over packet header space
//!
//! The compiler never looks inside a predicate. It only needs the algebra
//! (intersection, union, complement), an emptiness test and the two
//! constants. Everything else (which header fields exist, how a predicate
//! compiles to switch rules) belongs to the domain crate that implements
//! [`HeaderPredicate`].
//!
//! [`TagEncoding`] is the second seam: it names the header field that
//! carries the automaton state. Choosing that field is a deployment
//! decision, so the compiler takes it as a parameter.

use crate::StateId;
use std::fmt::Debug;
use std::hash::Hash;

/// A boolean predicate over packet header space.
///
/// Implementations must be exact: [`is_empty`](Self::is_empty) returns `true`
/// only when no packet can satisfy the predicate. Partition refinement relies
/// on it to keep tokens pairwise disjoint.
///
/// Equality and hashing are *structural*. Two predicates that denote the same
/// header space but are built differently are different keys; the
/// partitioner handles them through refinement instead of lookup.
///
/// # Example
///
/// ```ignore
/// let a = HeaderSpace::field("switch", 1);
/// let b = HeaderSpace::field("switch", 2);
/// assert!(!a.overlaps(&b));
/// assert!(a.is_subset_of(&a.or(&b)));
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `HeaderPredicate`",
    note = "path atoms need a predicate algebra: implement `and`, `or`, `not`, `is_empty` and `matches`"
)]
pub trait HeaderPredicate: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// The packet this predicate classifies.
    type Packet: Clone + Debug + Send + Sync;

    /// The predicate every packet satisfies.
    fn identity() -> Self;

    /// The predicate no packet satisfies.
    fn drop() -> Self;

    /// Intersection.
    #[must_use]
    fn and(&self, other: &Self) -> Self;

    /// Union.
    #[must_use]
    fn or(&self, other: &Self) -> Self;

    /// Complement.
    #[must_use]
    fn not(&self) -> Self;

    /// Returns `true` when no packet satisfies this predicate.
    ///
    /// This is the "compile to elementary match rules and check whether any
    /// non-drop rule remains" test of the host language.
    fn is_empty(&self) -> bool;

    /// Evaluate against a single packet.
    fn matches(&self, packet: &Self::Packet) -> bool;

    /// Returns `true` when some packet satisfies both predicates.
    fn overlaps(&self, other: &Self) -> bool {
        !self.and(other).is_empty()
    }

    /// Returns `true` when every packet satisfying `self` satisfies `other`.
    fn is_subset_of(&self, other: &Self) -> bool {
        self.and(&other.not()).is_empty()
    }

    /// Returns `true` when both predicates denote the same header space.
    fn equivalent(&self, other: &Self) -> bool {
        self.is_subset_of(other) && other.is_subset_of(self)
    }

    /// Union of all predicates, [`drop`](Self::drop) when empty.
    fn any_of<'a, I>(predicates: I) -> Self
    where
        I: IntoIterator<Item = &'a Self>,
        Self: 'a,
    {
        let mut iter = predicates.into_iter();
        match iter.next() {
            None => Self::drop(),
            Some(first) => iter.fold(first.clone(), |acc, p| acc.or(p)),
        }
    }
}

/// How an automaton state travels inside a packet.
///
/// The state tag lives in a header field reserved for this purpose and
/// invisible to end hosts. [`StateId::START`] is the "no tag assigned yet"
/// sentinel: a packet without a tag is in the start state, and moving a
/// packet back to the start state removes its tag.
pub trait TagEncoding<P: HeaderPredicate> {
    /// Predicate matching packets whose tag says they are in `state`.
    fn matches_state(&self, state: StateId) -> P;

    /// Predicate matching packets about to leave the network.
    fn at_egress(&self) -> P;

    /// Rewrite the tag of `packet` to `state`.
    fn set_state(&self, packet: &mut P::Packet, state: StateId);

    /// Remove the tag field entirely.
    fn strip(&self, packet: &mut P::Packet);

    /// Read the state carried by `packet`.
    fn state_of(&self, packet: &P::Packet) -> StateId;
}
