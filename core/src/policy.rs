//! Policy — the dataplane program the compiler emits
//!
//! A small forwarding-policy AST in the style of the host policy language:
//! filters, header rewrites of the state tag, delivery to a result sink, and
//! sequential / parallel composition. It is what the external runtime would
//! install, and [`Policy::evaluate`] replays it on a single packet so the
//! compiled behavior can be checked without a network.

use crate::trace::{PolicyTrace, TraceStep};
use crate::{HeaderPredicate, SinkId, StateId, TagEncoding};
use std::fmt;

/// A forwarding policy over packets classified by `P`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy<P: HeaderPredicate> {
    /// Emit nothing.
    Drop,
    /// Emit the packet unchanged.
    Identity,
    /// Emit the packet only if it satisfies the predicate.
    Filter(P),
    /// Rewrite the state tag.
    SetState(StateId),
    /// Remove the state tag.
    StripState,
    /// Hand the packet to a result sink. Emits nothing downstream.
    Deliver(SinkId),
    /// Feed every output of one policy into the next.
    Sequence(Vec<Policy<P>>),
    /// Run every branch on the same input and merge the outputs.
    Parallel(Vec<Policy<P>>),
}

/// What one packet turned into.
#[derive(Debug, Clone)]
pub struct Outcome<Pkt> {
    /// Packets emitted downstream, in branch order.
    pub packets: Vec<Pkt>,
    /// Packets handed to sinks, in evaluation order.
    pub deliveries: Vec<(SinkId, Pkt)>,
}

impl<Pkt> Outcome<Pkt> {
    fn new() -> Self {
        Self {
            packets: Vec::new(),
            deliveries: Vec::new(),
        }
    }

    /// Sinks that received a packet, in delivery order.
    pub fn sinks(&self) -> impl Iterator<Item = SinkId> + '_ {
        self.deliveries.iter().map(|(s, _)| *s)
    }
}

impl<P: HeaderPredicate> Policy<P> {
    /// Sequential composition, collapsing trivial cases.
    #[must_use]
    pub fn seq(mut parts: Vec<Self>) -> Self {
        if parts.iter().any(|p| matches!(p, Self::Drop)) {
            return Self::Drop;
        }
        parts.retain(|p| !matches!(p, Self::Identity));
        match parts.len() {
            0 => Self::Identity,
            1 => parts.swap_remove(0),
            _ => Self::Sequence(parts),
        }
    }

    /// Parallel composition, collapsing trivial cases.
    #[must_use]
    pub fn par(mut parts: Vec<Self>) -> Self {
        parts.retain(|p| !matches!(p, Self::Drop));
        match parts.len() {
            0 => Self::Drop,
            1 => parts.swap_remove(0),
            _ => Self::Parallel(parts),
        }
    }

    /// Run the policy on one packet.
    pub fn evaluate<E>(&self, packet: &P::Packet, encoding: &E) -> Outcome<P::Packet>
    where
        E: TagEncoding<P> + ?Sized,
    {
        let mut out = Outcome::new();
        self.apply(packet, encoding, &mut out);
        out
    }

    fn apply<E>(&self, packet: &P::Packet, encoding: &E, out: &mut Outcome<P::Packet>)
    where
        E: TagEncoding<P> + ?Sized,
    {
        match self {
            Self::Drop => {}
            Self::Identity => out.packets.push(packet.clone()),
            Self::Filter(p) => {
                if p.matches(packet) {
                    out.packets.push(packet.clone());
                }
            }
            Self::SetState(state) => {
                let mut pkt = packet.clone();
                encoding.set_state(&mut pkt, *state);
                out.packets.push(pkt);
            }
            Self::StripState => {
                let mut pkt = packet.clone();
                encoding.strip(&mut pkt);
                out.packets.push(pkt);
            }
            Self::Deliver(sink) => out.deliveries.push((*sink, packet.clone())),
            Self::Sequence(parts) => {
                let mut current = vec![packet.clone()];
                for part in parts {
                    let mut next = Outcome::new();
                    for pkt in &current {
                        part.apply(pkt, encoding, &mut next);
                    }
                    out.deliveries.append(&mut next.deliveries);
                    current = next.packets;
                }
                out.packets.extend(current);
            }
            Self::Parallel(branches) => {
                for branch in branches {
                    branch.apply(packet, encoding, out);
                }
            }
        }
    }

    /// Run the policy on one packet, recording every step.
    ///
    /// The outcome is identical to [`evaluate`](Self::evaluate).
    pub fn evaluate_with_trace<E>(
        &self,
        packet: &P::Packet,
        encoding: &E,
    ) -> (Outcome<P::Packet>, PolicyTrace)
    where
        E: TagEncoding<P> + ?Sized,
    {
        let mut out = Outcome::new();
        let trace = self.apply_traced(packet, encoding, &mut out);
        (out, trace)
    }

    fn apply_traced<E>(
        &self,
        packet: &P::Packet,
        encoding: &E,
        out: &mut Outcome<P::Packet>,
    ) -> PolicyTrace
    where
        E: TagEncoding<P> + ?Sized,
    {
        let input = format!("{packet:?}");
        let before = (out.packets.len(), out.deliveries.len());
        let (step, children) = match self {
            Self::Sequence(parts) => {
                let mut children = Vec::new();
                let mut current = vec![packet.clone()];
                for part in parts {
                    let mut next = Outcome::new();
                    for pkt in &current {
                        children.push(part.apply_traced(pkt, encoding, &mut next));
                    }
                    out.deliveries.append(&mut next.deliveries);
                    current = next.packets;
                }
                out.packets.extend(current);
                (TraceStep::Sequence, children)
            }
            Self::Parallel(branches) => {
                let children = branches
                    .iter()
                    .map(|b| b.apply_traced(packet, encoding, out))
                    .collect();
                (TraceStep::Parallel, children)
            }
            leaf => {
                leaf.apply(packet, encoding, out);
                let step = match leaf {
                    Self::Drop => TraceStep::Drop,
                    Self::Identity => TraceStep::Identity,
                    Self::Filter(p) => TraceStep::Filter {
                        predicate: format!("{p:?}"),
                        matched: out.packets.len() > before.0,
                    },
                    Self::SetState(s) => TraceStep::SetState(*s),
                    Self::StripState => TraceStep::StripState,
                    Self::Deliver(s) => TraceStep::Deliver(*s),
                    Self::Sequence(_) | Self::Parallel(_) => TraceStep::Drop,
                };
                (step, Vec::new())
            }
        };
        PolicyTrace {
            step,
            input,
            emitted: out.packets.len() - before.0,
            delivered: out.deliveries[before.1..].iter().map(|(s, _)| *s).collect(),
            children,
        }
    }

    /// Number of nodes in the policy tree.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Sequence(parts) | Self::Parallel(parts) => {
                1 + parts.iter().map(Self::size).sum::<usize>()
            }
            _ => 1,
        }
    }
}

impl<P: HeaderPredicate> fmt::Display for Policy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, parts: &[Self], sep: &str| -> fmt::Result {
            f.write_str("(")?;
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{p}")?;
            }
            f.write_str(")")
        };
        match self {
            Self::Drop => f.write_str("drop"),
            Self::Identity => f.write_str("identity"),
            Self::Filter(p) => write!(f, "filter({p:?})"),
            Self::SetState(s) => write!(f, "set_state({s})"),
            Self::StripState => f.write_str("strip_state"),
            Self::Deliver(s) => write!(f, "deliver({s})"),
            Self::Sequence(parts) => join(f, parts, " >> "),
            Self::Parallel(parts) => join(f, parts, " + "),
        }
    }
}
