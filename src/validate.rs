//! Cross-validation of measured communication against the analytical cost model.
//!
//! The benchmarks send a little more than the cost tables predict: the helper synchronizes vector
//! sizes with 56 bytes, and the computed scores are opened for a correctness check (8 bytes per
//! node). Beyond that, the implementation is known to deviate from the cost tables in a few
//! documented places. Those are listed in a table of [`KnownCorrection`]s. A measurement is valid
//! if its deviation from the expected total is explained exactly by the first applicable entry.
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    Error,
    aggregate::AggregatedConfiguration,
    model::{AnalyticalPrediction, Elements, ModelError, ModelParams},
    protocol::{Measure, Variant},
    trace::SchemaViolation,
};

/// Bytes sent by the helper to synchronize vector sizes.
pub const SYNC_OVERHEAD_BYTES: u64 = 56;

/// Bytes per node used to open the computed scores.
pub const OPENING_BYTES_PER_NODE: u64 = 8;

/// Double-shuffle setup counted in the one-time cost but skipped when no iteration runs.
const DEFERRED_SHUFFLE_BYTES_PER_SIZE: i128 = 24;

/// A documented discrepancy between the implementation and the cost tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Correction {
    /// The measurement matches the prediction exactly.
    Exact,
    /// Zero iterations skip the double-shuffle setup (24 bytes per size unit).
    DeferredShuffleSetup,
    /// Deduplication packs bits suboptimally: `2(t-1)` equality tests and `t-1` ANDs.
    DedupPacking,
    /// [`Correction::DedupPacking`] at zero iterations, which also skips the shuffle setup.
    DedupPackingDeferredShuffle,
    /// Final clipping packs bits suboptimally: `n^2` equality tests.
    ClippingPacking,
    /// [`Correction::ClippingPacking`] at zero iterations, which also skips the shuffle setup.
    ClippingPackingDeferredShuffle,
    /// The reference protocol's clipping packs bits suboptimally: `n^2` equality tests.
    ReferenceClippingPacking,
}

/// An entry of the correction table.
#[derive(Debug, Clone, Copy)]
pub struct KnownCorrection {
    /// The correction reported on a match.
    pub correction: Correction,
    /// Whether the correction can apply to a variant at a depth.
    pub applies: fn(Variant, u32) -> bool,
    /// The extra bits the correction accounts for, given the graph and the ring bit-width, or
    /// `None` if they are not representable.
    pub bits: fn(&ModelParams, u32) -> Option<i128>,
}

fn any_variant(_: Variant, _: u32) -> bool {
    true
}

fn zero(_: &ModelParams, _: u32) -> Option<i128> {
    Some(0)
}

fn deferred_shuffle(params: &ModelParams) -> Option<i128> {
    Some(-DEFERRED_SHUFFLE_BYTES_PER_SIZE * i128::from(params.total_size) * 8)
}

/// An equality test costs `25 - 5 + 5/R` elements with word-wise packing instead of `5 - 5/R`
/// bits, an AND costs `5 - 5/R` elements instead of `5/R`.
fn dedup_packing(params: &ModelParams, ring_bits: u32) -> Option<i128> {
    let t = i128::from(params.total_size);
    let cost = Elements::new(20, 5) * (2 * (t - 1)) + Elements::new(5, -5) * (t - 1);
    cost.checked_to_bits(ring_bits)
}

fn clipping_packing(params: &ModelParams, ring_bits: u32) -> Option<i128> {
    let n = i128::from(params.nodes);
    Elements::new(20, 5)
        .checked_mul(n.checked_mul(n)?)?
        .checked_to_bits(ring_bits)
}

fn with_deferred_shuffle(
    packing: fn(&ModelParams, u32) -> Option<i128>,
    params: &ModelParams,
    ring_bits: u32,
) -> Option<i128> {
    packing(params, ring_bits)?.checked_add(deferred_shuffle(params)?)
}

/// The documented discrepancies, in matching order.
pub const KNOWN_CORRECTIONS: &[KnownCorrection] = &[
    KnownCorrection {
        correction: Correction::Exact,
        applies: any_variant,
        bits: zero,
    },
    KnownCorrection {
        correction: Correction::DeferredShuffleSetup,
        applies: |variant, depth| variant == Variant::ours(Measure::Pi3) && depth == 0,
        bits: |params, _| deferred_shuffle(params),
    },
    KnownCorrection {
        correction: Correction::DedupPacking,
        applies: |variant, depth| variant == Variant::ours(Measure::Pi2) && depth > 0,
        bits: dedup_packing,
    },
    KnownCorrection {
        correction: Correction::DedupPackingDeferredShuffle,
        applies: |variant, depth| variant == Variant::ours(Measure::Pi2) && depth == 0,
        bits: |params, ring_bits| with_deferred_shuffle(dedup_packing, params, ring_bits),
    },
    KnownCorrection {
        correction: Correction::ClippingPacking,
        applies: |variant, depth| variant == Variant::ours(Measure::Pi1) && depth > 0,
        bits: clipping_packing,
    },
    KnownCorrection {
        correction: Correction::ClippingPackingDeferredShuffle,
        applies: |variant, depth| variant == Variant::ours(Measure::Pi1) && depth == 0,
        bits: |params, ring_bits| with_deferred_shuffle(clipping_packing, params, ring_bits),
    },
    KnownCorrection {
        correction: Correction::ReferenceClippingPacking,
        applies: |variant, _| variant == Variant::reference(Measure::Pi1),
        bits: clipping_packing,
    },
];

/// The outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// Measured bytes of all parties.
    pub measured_bytes: u128,
    /// Bits predicted by the cost model.
    pub predicted_bits: i128,
    /// Predicted bits plus synchronization and opening overhead.
    pub expected_bits: i128,
    /// Measured minus expected bits.
    pub deviation_bits: i128,
    /// Deviation relative to the expected total.
    pub relative_deviation: f64,
    /// The correction explaining the deviation.
    pub correction: Correction,
}

impl ValidationResult {
    /// The correction that was needed, `None` if the measurement matched exactly.
    pub fn matched_correction(&self) -> Option<Correction> {
        match self.correction {
            Correction::Exact => None,
            correction => Some(correction),
        }
    }
}

/// Measured communication deviates from the prediction by an amount no known correction explains.
///
/// This indicates a regression or an undocumented change of the measured system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error(
    "{variant} at depth {depth} with {nodes} nodes sent {measured_bytes} bytes, \
     expected {expected_bits} bits (deviation {deviation_bits} bits)"
)]
pub struct ValidationFailure {
    /// The validated protocol.
    pub variant: Variant,
    /// The validated depth.
    pub depth: u32,
    /// The node count of the graph.
    pub nodes: u64,
    /// Measured bytes of all parties.
    pub measured_bytes: u128,
    /// Predicted bits plus overhead.
    pub expected_bits: i128,
    /// Measured minus expected bits.
    pub deviation_bits: i128,
}

/// Matches measurements against predictions using an ordered correction table.
#[derive(Debug, Clone)]
pub struct CrossValidator {
    table: Vec<KnownCorrection>,
}

impl Default for CrossValidator {
    fn default() -> Self {
        Self::with_corrections(KNOWN_CORRECTIONS.to_vec())
    }
}

impl CrossValidator {
    /// Creates a validator using the documented corrections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a validator using a custom correction table, matched in order.
    pub fn with_corrections(table: Vec<KnownCorrection>) -> Self {
        CrossValidator { table }
    }

    /// The correction table, in matching order.
    pub fn corrections(&self) -> &[KnownCorrection] {
        &self.table
    }

    /// Validates a measured configuration against the prediction for the same graph and depth.
    pub fn validate(
        &self,
        measured: &AggregatedConfiguration,
        prediction: &AnalyticalPrediction,
    ) -> Result<ValidationResult, Error> {
        if measured.nodes != prediction.params.nodes {
            return Err(SchemaViolation::PredictionNodeCount {
                expected: prediction.params.nodes,
                actual: measured.nodes,
            }
            .into());
        }
        if measured.depth != prediction.depth {
            return Err(SchemaViolation::MisplacedDepth {
                expected: prediction.depth,
                actual: measured.depth,
            }
            .into());
        }
        let variant = prediction.variant;
        let depth = prediction.depth;
        let measured_bytes = measured.total_communication();
        let predicted_bits = prediction.total_bits();
        let overhead_bytes = i128::from(SYNC_OVERHEAD_BYTES)
            + i128::from(OPENING_BYTES_PER_NODE) * i128::from(measured.nodes);
        let expected_bits = predicted_bits.checked_add(overhead_bytes * 8).ok_or(
            ModelError::Overflow {
                variant,
                nodes: measured.nodes,
                depth,
            },
        )?;
        let measured_bits = (i128::from(measured.offline_communication)
            + 2 * i128::from(measured.online_communication))
            * 8;
        let deviation_bits = measured_bits - expected_bits;

        let matched = self.table.iter().find(|entry| {
            (entry.applies)(variant, depth)
                && (entry.bits)(&prediction.params, prediction.ring_bits) == Some(deviation_bits)
        });
        let Some(entry) = matched else {
            warn!(%variant, depth, deviation_bits, "no known correction explains the deviation");
            return Err(ValidationFailure {
                variant,
                depth,
                nodes: measured.nodes,
                measured_bytes,
                expected_bits,
                deviation_bits,
            }
            .into());
        };
        debug!(%variant, depth, correction = ?entry.correction, "communication validated");
        Ok(ValidationResult {
            measured_bytes,
            predicted_bits,
            expected_bits,
            deviation_bits,
            relative_deviation: deviation_bits as f64 / expected_bits as f64,
            correction: entry.correction,
        })
    }
}
