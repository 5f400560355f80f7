//! Separates one-time setup cost from the marginal cost of one iteration.
//!
//! Our protocol is benchmarked at depths 0, 1 and 2, the reference protocol at depths 1 and 2.
//! Communication is data-independent, so one step of differencing is exact. Time and memory are
//! noisy; for our protocol they are averaged over the two steps from depth 0 to depth 2.
use serde::Serialize;

use crate::{
    Error,
    aggregate::AggregatedConfiguration,
    measured::Measured,
    protocol::Family,
    trace::SchemaViolation,
};

/// The marginal cost of one additional iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationCost {
    /// Additional preprocessing bytes.
    pub offline_communication: i128,
    /// Additional online bytes per computing party.
    pub online_communication: i128,
    /// Additional preprocessing time in milliseconds.
    pub offline_time_ms: f64,
    /// Additional online time in milliseconds.
    pub online_time_ms: f64,
    /// Change of peak memory in bytes.
    pub memory_delta: f64,
}

/// One-time and per-iteration cost of a configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedCostPoint {
    /// Number of graph nodes.
    pub nodes: u64,
    /// The cost at the family's minimum depth.
    pub one_time: AggregatedConfiguration,
    /// The marginal cost of one iteration.
    pub per_iteration: IterationCost,
}

/// Derives the cost point of a configuration from its aggregates at the family's
/// [differencing depths](Family::differencing_depths), given in that order.
///
/// If any of the depths was not benchmarked, the result is missing as well.
pub fn derive_cost_point(
    family: Family,
    slots: &[Measured<AggregatedConfiguration>],
) -> Result<Measured<DerivedCostPoint>, Error> {
    let depths = family.differencing_depths();
    if slots.len() != depths.len() {
        return Err(SchemaViolation::DepthSlots {
            expected: depths.len(),
            actual: slots.len(),
        }
        .into());
    }
    let mut present = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Measured::Present(config) => present.push(config),
            Measured::Missing(missing) => return Ok(Measured::Missing(*missing)),
        }
    }
    let base = present[0];
    for (&depth, config) in depths.iter().zip(&present) {
        if config.depth != depth {
            return Err(SchemaViolation::MisplacedDepth {
                expected: depth,
                actual: config.depth,
            }
            .into());
        }
        if config.nodes != base.nodes {
            return Err(SchemaViolation::DepthNodeCount {
                base_depth: base.depth,
                expected: base.nodes,
                depth,
                actual: config.nodes,
            }
            .into());
        }
    }

    let (first, last) = (present[0], present[present.len() - 1]);
    let before_last = present[present.len() - 2];
    let steps = (present.len() - 1) as f64;
    let per_step =
        |metric: fn(&AggregatedConfiguration) -> f64| (metric(last) - metric(first)) / steps;
    let per_iteration = IterationCost {
        offline_communication: signed(last.offline_communication)
            - signed(before_last.offline_communication),
        online_communication: signed(last.online_communication)
            - signed(before_last.online_communication),
        offline_time_ms: per_step(|c| c.offline_time_ms),
        online_time_ms: per_step(|c| c.online_time_ms),
        memory_delta: per_step(|c| c.peak_memory as f64),
    };
    Ok(Measured::Present(DerivedCostPoint {
        nodes: base.nodes,
        one_time: base.clone(),
        per_iteration,
    }))
}

fn signed(bytes: u64) -> i128 {
    i128::from(bytes)
}
