//! Interrupt aggregation.
//!
//! One interruption can halt several execution points at once: the node
//! that raised it, plus every child (a tool under that node, a sibling
//! branch of the graph) that was stopped with it. Each of those points
//! needs its own operator attention, so all of them are reported, in the
//! order the agent system listed them, without deduplication.

use serde::{Deserialize, Serialize};
use tandem_core::event::InterruptPayload;

/// One execution locus that was halted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptPoint {
    /// Position in the upstream report; 0 is the root cause
    pub position: usize,

    pub description: String,
}

impl InterruptPoint {
    pub fn is_root(&self) -> bool {
        self.position == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptReport {
    pub points: Vec<InterruptPoint>,
}

impl InterruptReport {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn root(&self) -> Option<&InterruptPoint> {
        self.points.first()
    }
}

/// Collect every interrupt context into a report.
pub fn collect(payload: &InterruptPayload) -> InterruptReport {
    let points = payload
        .contexts
        .iter()
        .enumerate()
        .map(|(position, ctx)| {
            let rendered = ctx.info.describe();
            let description = if rendered.trim().is_empty() {
                format!("{:?}", ctx.info)
            } else {
                rendered
            };
            InterruptPoint {
                position,
                description,
            }
        })
        .collect();

    InterruptReport { points }
}
