//! Closed-form communication cost of every benchmarked protocol variant.
//!
//! The published cost tables count ring elements, some of them with fractional parts in units of
//! single bits (e.g. `5 - 5/R` elements for an AND of `R`-bit values). To evaluate the formulas
//! exactly, costs are represented as [`Elements`], a whole number of elements plus a number of
//! `1/R` fractions, which converts exactly to bits.
//!
//! Every variant is decomposed into preprocessing and online cost, each split into a one-time
//! part (the cost at the family's minimum depth) and a per-iteration part. Online costs are
//! reported for both computing parties together, i.e. twice the per-party figure of the tables.
use std::ops::{Add, Mul, Sub};

use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    protocol::{Family, Granularity, Measure, Phase, Variant},
};

/// An exact number of ring elements: `whole + per_ring / R` for ring bit-width `R`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Elements {
    /// Whole ring elements.
    pub whole: i128,
    /// Additional fractions of `1/R` elements, i.e. single bits.
    pub per_ring: i128,
}

impl Elements {
    /// No elements at all.
    pub const ZERO: Elements = Elements {
        whole: 0,
        per_ring: 0,
    };

    /// Returns `whole + per_ring / R` elements.
    pub const fn new(whole: i128, per_ring: i128) -> Self {
        Elements { whole, per_ring }
    }

    /// Returns a whole number of elements.
    pub const fn whole(whole: i128) -> Self {
        Elements { whole, per_ring: 0 }
    }

    /// Size in bits for ring bit-width `ring_bits`.
    pub fn to_bits(self, ring_bits: u32) -> i128 {
        self.whole * i128::from(ring_bits) + self.per_ring
    }

    /// [`Elements::to_bits`], or `None` on overflow.
    pub fn checked_to_bits(self, ring_bits: u32) -> Option<i128> {
        self.whole
            .checked_mul(i128::from(ring_bits))?
            .checked_add(self.per_ring)
    }

    /// Sum of two costs, or `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Elements::new(
            self.whole.checked_add(rhs.whole)?,
            self.per_ring.checked_add(rhs.per_ring)?,
        ))
    }

    /// The cost repeated `times` times, or `None` on overflow.
    pub fn checked_mul(self, times: i128) -> Option<Self> {
        Some(Elements::new(
            self.whole.checked_mul(times)?,
            self.per_ring.checked_mul(times)?,
        ))
    }
}

impl Add for Elements {
    type Output = Elements;

    fn add(self, rhs: Self) -> Self::Output {
        Elements::new(self.whole + rhs.whole, self.per_ring + rhs.per_ring)
    }
}

impl Sub for Elements {
    type Output = Elements;

    fn sub(self, rhs: Self) -> Self::Output {
        Elements::new(self.whole - rhs.whole, self.per_ring - rhs.per_ring)
    }
}

impl Mul<i128> for Elements {
    type Output = Elements;

    fn mul(self, rhs: i128) -> Self::Output {
        Elements::new(self.whole * rhs, self.per_ring * rhs)
    }
}

/// Size parameters of the input graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelParams {
    /// Number of nodes `n`.
    pub nodes: u64,
    /// Total size `t` (nodes plus edges).
    pub total_size: u64,
    /// Number of layers of the reference protocol's input.
    pub layers: u64,
}

/// The cost of one phase, split into one-time and per-iteration contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseCost {
    /// Cost at the family's minimum depth.
    pub one_time: Elements,
    /// Additional cost of every further iteration.
    pub per_iteration: Elements,
}

impl PhaseCost {
    fn after(&self, iterations: u32) -> Elements {
        self.one_time + self.per_iteration * i128::from(iterations)
    }

    fn checked_after(&self, iterations: u32) -> Option<Elements> {
        self.one_time
            .checked_add(self.per_iteration.checked_mul(i128::from(iterations))?)
    }
}

/// The predicted communication of one variant at one depth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticalPrediction {
    /// The predicted protocol.
    pub variant: Variant,
    /// The graph the prediction is for.
    pub params: ModelParams,
    /// The depth the prediction is for.
    pub depth: u32,
    /// Bit-width of ring elements.
    pub ring_bits: u32,
    /// Communication of the helper during preprocessing.
    pub preprocessing: PhaseCost,
    /// Online communication of both computing parties together.
    pub online: PhaseCost,
}

impl AnalyticalPrediction {
    fn phase(&self, phase: Phase) -> &PhaseCost {
        match phase {
            Phase::Preprocessing => &self.preprocessing,
            Phase::Online => &self.online,
        }
    }

    /// The predicted elements of one phase at the given granularity.
    pub fn elements(&self, phase: Phase, granularity: Granularity) -> Elements {
        let cost = self.phase(phase);
        match granularity {
            Granularity::OneTime => cost.one_time,
            Granularity::PerIteration => cost.per_iteration,
            Granularity::Cumulative => cost.after(self.depth - self.variant.min_depth()),
        }
    }

    /// The predicted bits of one phase at the given granularity.
    pub fn bits(&self, phase: Phase, granularity: Granularity) -> i128 {
        self.elements(phase, granularity).to_bits(self.ring_bits)
    }

    /// Total predicted bits of both phases at the prediction's depth.
    pub fn total_bits(&self) -> i128 {
        self.bits(Phase::Preprocessing, Granularity::Cumulative)
            + self.bits(Phase::Online, Granularity::Cumulative)
    }

    /// Total predicted bytes of both phases at the prediction's depth.
    pub fn total_bytes(&self) -> f64 {
        self.total_bits() as f64 / 8.0
    }

    /// [`AnalyticalPrediction::total_bits`], or `None` if it or any figure reported by
    /// [`AnalyticalPrediction::bits`] leaves the `i128` range.
    fn checked_total_bits(&self) -> Option<i128> {
        let iterations = self.depth - self.variant.min_depth();
        let mut total = 0i128;
        for cost in [&self.preprocessing, &self.online] {
            cost.one_time.checked_to_bits(self.ring_bits)?;
            cost.per_iteration.checked_to_bits(self.ring_bits)?;
            let cumulative = cost.checked_after(iterations)?.checked_to_bits(self.ring_bits)?;
            total = total.checked_add(cumulative)?;
        }
        Some(total)
    }
}

/// The cost model was evaluated outside its domain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Ring elements must consist of whole bytes.
    #[error("ring bit-width must be a positive multiple of 8, got {0}")]
    RingBits(u32),
    /// The graph has no nodes.
    #[error("the graph must have at least one node")]
    NoNodes,
    /// The total size counts every node, so it cannot be smaller than the node count.
    #[error("total size {total_size} is smaller than the node count {nodes}")]
    TotalSizeBelowNodes {
        /// Node count.
        nodes: u64,
        /// Total size.
        total_size: u64,
    },
    /// The family cannot run at this depth.
    #[error("{variant} cannot be evaluated at depth {depth}")]
    DepthBelowMinimum {
        /// The evaluated variant.
        variant: Variant,
        /// The requested depth.
        depth: u32,
    },
    /// The reference protocol needs at least one layer.
    #[error("the reference protocol needs at least one layer")]
    NoLayers,
    /// The predicted cost does not fit in 128 bits.
    #[error("cost of {variant} on {nodes} nodes at depth {depth} exceeds the representable range")]
    Overflow {
        /// The evaluated variant.
        variant: Variant,
        /// Node count.
        nodes: u64,
        /// The requested depth.
        depth: u32,
    },
}

/// Evaluates the published cost formulas for a fixed ring bit-width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostModel {
    ring_bits: u32,
}

impl CostModel {
    /// Creates a model for ring elements of `ring_bits` bits.
    pub fn new(ring_bits: u32) -> Result<Self, ModelError> {
        if ring_bits == 0 || ring_bits % 8 != 0 {
            return Err(ModelError::RingBits(ring_bits));
        }
        Ok(CostModel { ring_bits })
    }

    /// Creates a model with the ring bit-width of the configuration.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, ModelError> {
        Self::new(config.ring_bits)
    }

    /// The bit-width of ring elements.
    pub fn ring_bits(&self) -> u32 {
        self.ring_bits
    }

    /// Predicts the communication of `variant` on a graph with `params` at `depth`.
    pub fn predict(
        &self,
        variant: Variant,
        params: ModelParams,
        depth: u32,
    ) -> Result<AnalyticalPrediction, ModelError> {
        if params.nodes == 0 {
            return Err(ModelError::NoNodes);
        }
        if params.total_size < params.nodes {
            return Err(ModelError::TotalSizeBelowNodes {
                nodes: params.nodes,
                total_size: params.total_size,
            });
        }
        if depth < variant.min_depth() {
            return Err(ModelError::DepthBelowMinimum { variant, depth });
        }
        if variant.family == Family::Reference && params.layers == 0 {
            return Err(ModelError::NoLayers);
        }
        let overflow = ModelError::Overflow {
            variant,
            nodes: params.nodes,
            depth,
        };
        let costs = match variant.family {
            Family::Ours => ours(variant.measure, params),
            Family::Reference => reference(variant.measure, params),
        };
        let Some((preprocessing, online)) = costs else {
            return Err(overflow);
        };
        let prediction = AnalyticalPrediction {
            variant,
            params,
            depth,
            ring_bits: self.ring_bits,
            preprocessing,
            online,
        };
        match prediction.checked_total_bits() {
            Some(_) => Ok(prediction),
            None => Err(overflow),
        }
    }
}

/// Predicted bits of one phase of `variant` at the given granularity.
///
/// This is a convenience wrapper around [`CostModel::predict`] for callers that need a single
/// figure.
pub fn predict(
    variant: Variant,
    phase: Phase,
    granularity: Granularity,
    params: ModelParams,
    depth: u32,
    ring_bits: u32,
) -> Result<i128, ModelError> {
    let prediction = CostModel::new(ring_bits)?.predict(variant, params, depth)?;
    Ok(prediction.bits(phase, granularity))
}

/// `ceil(log2(n))`, with `ceil(log2(1)) = 0`.
pub(crate) fn ceil_log2(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        u64::BITS - (n - 1).leading_zeros()
    }
}

/// Product of `factors`, or `None` on overflow.
fn product(factors: &[i128]) -> Option<i128> {
    factors
        .iter()
        .try_fold(1i128, |acc, &factor| acc.checked_mul(factor))
}

/// Sum of `terms`, or `None` on overflow.
fn sum(terms: &[i128]) -> Option<i128> {
    terms.iter().try_fold(0i128, |acc, &term| acc.checked_add(term))
}

fn ours(measure: Measure, params: ModelParams) -> Option<(PhaseCost, PhaseCost)> {
    let n = i128::from(params.nodes);
    let t = i128::from(params.total_size);
    let log_n = i128::from(ceil_log2(params.nodes));
    let t_log_n = product(&[t, log_n])?;
    // per computing party, doubled below
    let (offline_once, online_once, offline_iter, online_iter) = match measure {
        Measure::Pi3 => (
            Elements::whole(sum(&[product(&[16, t_log_n])?, product(&[27, t])?])?),
            Elements::whole(sum(&[product(&[12, t_log_n])?, product(&[17, t])?])?),
            Elements::whole(product(&[8, t])?),
            Elements::whole(product(&[4, t])?),
        ),
        Measure::Pi2 => (
            Elements::new(
                sum(&[product(&[24, t_log_n])?, product(&[55, t])?, -3])?,
                1 - t,
            ),
            Elements::new(
                sum(&[product(&[18, t_log_n])?, product(&[40, t])?, -6])?,
                2 - 2 * t,
            ),
            Elements::whole(product(&[8, t])?),
            Elements::whole(product(&[4, t])?),
        ),
        Measure::Pi1 => {
            let n_squared = product(&[n, n])?;
            let n_edges = product(&[n, t - n])?;
            (
                Elements::new(
                    sum(&[
                        product(&[16, t_log_n])?,
                        product(&[4, n_squared])?,
                        product(&[2, n_edges])?,
                        product(&[25, t])?,
                    ])?,
                    -n_squared,
                ),
                Elements::new(
                    sum(&[
                        product(&[12, t_log_n])?,
                        product(&[5, n_squared])?,
                        n_edges,
                        product(&[16, t])?,
                    ])?,
                    product(&[-2, n_squared])?,
                ),
                Elements::whole(product(&[8, t, n])?),
                Elements::whole(product(&[4, t, n])?),
            )
        }
    };
    Some((
        PhaseCost {
            one_time: offline_once,
            per_iteration: offline_iter,
        },
        PhaseCost {
            one_time: online_once.checked_mul(2)?,
            per_iteration: online_iter.checked_mul(2)?,
        },
    ))
}

/// The reference protocol's cost is published as `5` elements per multiplication. Each
/// multiplication consumes one preprocessed element sent by the helper and two elements sent
/// online by each computing party.
fn reference(measure: Measure, params: ModelParams) -> Option<(PhaseCost, PhaseCost)> {
    let n = i128::from(params.nodes);
    let layers = i128::from(params.layers);
    let n_squared = product(&[n, n])?;
    let (once, per_iteration) = match measure {
        Measure::Pi3 => (Elements::ZERO, Elements::whole(n_squared)),
        Measure::Pi2 => (
            Elements::whole(product(&[n_squared, layers - 1])?),
            Elements::whole(n_squared),
        ),
        Measure::Pi1 => (
            Elements::new(product(&[2, n_squared])?, -n_squared),
            Elements::whole(product(&[n_squared, n])?),
        ),
    };
    Some((
        PhaseCost {
            one_time: once,
            per_iteration,
        },
        PhaseCost {
            one_time: once.checked_mul(4)?,
            per_iteration: per_iteration.checked_mul(4)?,
        },
    ))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn params(nodes: u64, total_size: u64, layers: u64) -> ModelParams {
        ModelParams {
            nodes,
            total_size,
            layers,
        }
    }

    #[test]
    fn ceil_log2_matches_float_definition() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(4), 2);
        assert_eq!(ceil_log2(61), 6);
        assert_eq!(ceil_log2(1024), 10);
        assert_eq!(ceil_log2(1025), 11);
    }

    #[test]
    fn pi3_small_graph() {
        let model = CostModel::new(32).unwrap();
        let prediction = model
            .predict(Variant::ours(Measure::Pi3), params(4, 8, 1), 1)
            .unwrap();
        // offline: 16*8*2 + 27*8 + 8*8 = 536 elements, online: 2 * (12*8*2 + 17*8 + 4*8) = 720
        assert_eq!(
            prediction.elements(Phase::Preprocessing, Granularity::Cumulative),
            Elements::whole(536)
        );
        assert_eq!(
            prediction.elements(Phase::Online, Granularity::Cumulative),
            Elements::whole(720)
        );
        assert_eq!(prediction.total_bits(), 1256 * 32);
        assert_eq!(prediction.total_bytes(), 5024.0);
    }

    #[test]
    fn pi2_keeps_bit_fractions_exact() {
        let model = CostModel::new(32).unwrap();
        let prediction = model
            .predict(Variant::ours(Measure::Pi2), params(4, 8, 1), 0)
            .unwrap();
        // offline: 24*8*2 + 55*8 - 3 = 821 elements and (1 - 8) bits
        assert_eq!(
            prediction.bits(Phase::Preprocessing, Granularity::OneTime),
            821 * 32 - 7
        );
        // online: 2 * (18*8*2 + 40*8 - 6) = 1204 elements and 2 * (2 - 16) bits
        assert_eq!(prediction.bits(Phase::Online, Granularity::OneTime), 1204 * 32 - 28);
    }

    #[test]
    fn reference_matches_published_totals() {
        let model = CostModel::new(32).unwrap();
        let (n, l) = (7i128, 3u64);
        for depth in 1..6u32 {
            let d = i128::from(depth);
            let pi3 = model
                .predict(Variant::reference(Measure::Pi3), params(7, 7, l), depth)
                .unwrap();
            assert_eq!(pi3.total_bits(), 32 * 5 * n * n * (d - 1));
            let pi2 = model
                .predict(Variant::reference(Measure::Pi2), params(7, 7, l), depth)
                .unwrap();
            assert_eq!(pi2.total_bits(), 32 * 5 * n * n * (d + 3 - 2));
            let pi1 = model
                .predict(Variant::reference(Measure::Pi1), params(7, 7, l), depth)
                .unwrap();
            // 5 * (n^3 (d-1) + (2 - 1/32) n^2) elements
            assert_eq!(
                pi1.total_bits(),
                32 * 5 * (n * n * n * (d - 1) + 2 * n * n) - 5 * n * n
            );
        }
    }

    #[test]
    fn free_function_matches_model() {
        let variant = Variant::ours(Measure::Pi1);
        let p = params(10, 60, 1);
        let prediction = CostModel::new(64).unwrap().predict(variant, p, 3).unwrap();
        assert_eq!(
            predict(variant, Phase::Online, Granularity::PerIteration, p, 3, 64),
            Ok(prediction.bits(Phase::Online, Granularity::PerIteration))
        );
        assert_eq!(
            prediction.bits(Phase::Online, Granularity::PerIteration),
            2 * 4 * 60 * 10 * 64
        );
    }

    #[test]
    fn rejects_inputs_outside_domain() {
        let model = CostModel::new(32).unwrap();
        assert_eq!(CostModel::new(30), Err(ModelError::RingBits(30)));
        assert_eq!(
            model.predict(Variant::ours(Measure::Pi3), params(0, 0, 1), 0),
            Err(ModelError::NoNodes)
        );
        assert!(matches!(
            model.predict(Variant::ours(Measure::Pi3), params(5, 4, 1), 0),
            Err(ModelError::TotalSizeBelowNodes { .. })
        ));
        assert!(matches!(
            model.predict(Variant::reference(Measure::Pi3), params(5, 5, 1), 0),
            Err(ModelError::DepthBelowMinimum { depth: 0, .. })
        ));
        assert_eq!(
            model.predict(Variant::reference(Measure::Pi2), params(5, 5, 0), 1),
            Err(ModelError::NoLayers)
        );
    }

    #[test]
    fn cost_beyond_128_bits_is_a_model_error() {
        let model = CostModel::new(32).unwrap();
        let variant = Variant::reference(Measure::Pi1);
        // 5 * 32 * n^3 bits still fit for n = 2^39
        let fits = model.predict(variant, params(1 << 39, 1 << 39, 1), 2).unwrap();
        assert!(fits.total_bits() > 0);
        // 4 * n^3 online elements fit for n = 2^40, but not their 32-bit size
        for nodes in [1u64 << 40, 1 << 43] {
            assert_eq!(
                model.predict(variant, params(nodes, nodes, 1), 2),
                Err(ModelError::Overflow {
                    variant,
                    nodes,
                    depth: 2
                })
            );
        }
        // the cumulative cost overflows only after enough iterations
        let variant = Variant::ours(Measure::Pi1);
        let huge = params(1 << 50, 1 << 50, 1);
        assert!(model.predict(variant, huge, 1).is_ok());
        assert!(matches!(
            model.predict(variant, huge, u32::MAX),
            Err(ModelError::Overflow { .. })
        ));
        assert!(matches!(
            predict(variant, Phase::Online, Granularity::Cumulative, huge, u32::MAX, 32),
            Err(ModelError::Overflow { .. })
        ));
    }

    proptest! {
        #[test]
        fn cumulative_cost_grows_by_per_iteration_cost(
            nodes in 1u64..5_000,
            factor in 1u64..120,
            depth in 1u32..12,
            measure in prop_oneof![Just(Measure::Pi3), Just(Measure::Pi2), Just(Measure::Pi1)],
            reference in any::<bool>(),
        ) {
            let variant = if reference {
                Variant::reference(measure)
            } else {
                Variant::ours(measure)
            };
            let model = CostModel::new(32).unwrap();
            let p = params(nodes, nodes * factor, 3);
            let before = model.predict(variant, p, depth).unwrap();
            let after = model.predict(variant, p, depth + 1).unwrap();
            for phase in [Phase::Preprocessing, Phase::Online] {
                let growth = after.bits(phase, Granularity::Cumulative)
                    - before.bits(phase, Granularity::Cumulative);
                prop_assert_eq!(growth, before.bits(phase, Granularity::PerIteration));
            }
        }
    }
}
