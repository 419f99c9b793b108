//! Evaluation trace types for debugging compiled policies.
//!
//! [`PolicyTrace`] mirrors the [`Policy`](crate::Policy) tree but records
//! what happened to one packet at each node instead of the node itself. Use
//! [`Policy::evaluate_with_trace`](crate::Policy::evaluate_with_trace) to get
//! one.
//!
//! A sequence node has one child per (stage, packet) application, so a stage
//! fed two packets by a parallel stage before it shows up twice.
//!
//! # Example
//!
//! ```ignore
//! let (outcome, trace) = compiled.tagging.evaluate_with_trace(&packet, &encoding);
//! print!("{trace}");
//! ```

use crate::{SinkId, StateId};
use std::fmt;

/// What kind of node a trace step evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceStep {
    /// Nothing emitted.
    Drop,
    /// Packet passed unchanged.
    Identity,
    /// A predicate test.
    Filter {
        /// Debug rendering of the predicate.
        predicate: String,
        /// Whether the packet satisfied it.
        matched: bool,
    },
    /// Tag rewritten.
    SetState(StateId),
    /// Tag removed.
    StripState,
    /// Packet handed to a sink.
    Deliver(SinkId),
    /// Sequential composition.
    Sequence,
    /// Parallel composition.
    Parallel,
}

/// Trace of one policy node applied to one packet.
#[derive(Debug, Clone)]
pub struct PolicyTrace {
    /// The node.
    pub step: TraceStep,
    /// Debug rendering of the packet that entered the node.
    pub input: String,
    /// Packets the node emitted.
    pub emitted: usize,
    /// Sinks reached from this node, in delivery order.
    pub delivered: Vec<SinkId>,
    /// Traces of the child applications.
    pub children: Vec<PolicyTrace>,
}

impl PolicyTrace {
    /// Returns `true` if the node emitted or delivered anything.
    #[must_use]
    pub fn matched(&self) -> bool {
        self.emitted > 0 || !self.delivered.is_empty()
    }

    /// Every filter that passed, depth first.
    #[must_use]
    pub fn passed_filters(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(t) = stack.pop() {
            if let TraceStep::Filter {
                predicate,
                matched: true,
            } = &t.step
            {
                out.push(predicate.as_str());
            }
            stack.extend(t.children.iter().rev());
        }
        out
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match &self.step {
            TraceStep::Filter { predicate, matched } => {
                let mark = if *matched { "pass" } else { "fail" };
                writeln!(f, "{pad}filter {predicate} [{mark}]")?;
            }
            TraceStep::SetState(s) => writeln!(f, "{pad}set_state {s}")?,
            TraceStep::Deliver(s) => writeln!(f, "{pad}deliver {s}")?,
            TraceStep::Drop => writeln!(f, "{pad}drop")?,
            TraceStep::Identity => writeln!(f, "{pad}identity")?,
            TraceStep::StripState => writeln!(f, "{pad}strip_state")?,
            TraceStep::Sequence => writeln!(f, "{pad}sequence -> {} packet(s)", self.emitted)?,
            TraceStep::Parallel => writeln!(f, "{pad}parallel -> {} packet(s)", self.emitted)?,
        }
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PolicyTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
