//! Exact finite predicate algebra for unit tests.
//!
//! The universe is 8 packet kinds x 8 tag values = 64 cells, so a predicate
//! is a `u64` bit set and every algebra operation is exact. Kind 7 is the
//! network egress.

use crate::{HeaderPredicate, StateId, TagEncoding};

pub(crate) const KINDS: u8 = 8;
pub(crate) const TAGS: u8 = 8;
pub(crate) const EGRESS_KIND: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Cells(pub(crate) u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cell {
    pub(crate) kind: u8,
    pub(crate) tag: u8,
}

impl Cell {
    pub(crate) fn at(kind: u8) -> Self {
        Self { kind, tag: 0 }
    }
}

fn bit(kind: u8, tag: u8) -> u64 {
    1u64 << (u32::from(tag) * u32::from(KINDS) + u32::from(kind))
}

impl Cells {
    /// Every packet of the given kind, whatever its tag.
    pub(crate) fn kind(kind: u8) -> Self {
        Self((0..TAGS).fold(0, |acc, tag| acc | bit(kind, tag)))
    }

    pub(crate) fn kinds(kinds: &[u8]) -> Self {
        Self(kinds.iter().fold(0, |acc, k| acc | Self::kind(*k).0))
    }

    pub(crate) fn tag(tag: u8) -> Self {
        Self((0..KINDS).fold(0, |acc, kind| acc | bit(kind, tag)))
    }
}

impl HeaderPredicate for Cells {
    type Packet = Cell;

    fn identity() -> Self {
        Self(u64::MAX)
    }

    fn drop() -> Self {
        Self(0)
    }

    fn and(&self, other: &Self) -> Self {
        Self(self.0 & other.0)
    }

    fn or(&self, other: &Self) -> Self {
        Self(self.0 | other.0)
    }

    fn not(&self) -> Self {
        Self(!self.0)
    }

    fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn matches(&self, packet: &Cell) -> bool {
        self.0 & bit(packet.kind, packet.tag) != 0
    }
}

/// Tag encoding that stores the state in `Cell::tag`, 0 meaning untagged.
#[derive(Debug, Default)]
pub(crate) struct CellTags;

impl TagEncoding<Cells> for CellTags {
    fn matches_state(&self, state: StateId) -> Cells {
        u8::try_from(state.index())
            .ok()
            .filter(|t| *t < TAGS)
            .map_or(Cells(0), Cells::tag)
    }

    fn at_egress(&self) -> Cells {
        Cells::kind(EGRESS_KIND)
    }

    fn set_state(&self, packet: &mut Cell, state: StateId) {
        packet.tag = u8::try_from(state.index()).unwrap_or(u8::MAX);
    }

    fn strip(&self, packet: &mut Cell) {
        packet.tag = 0;
    }

    fn state_of(&self, packet: &Cell) -> StateId {
        StateId::new(u32::from(packet.tag))
    }
}
