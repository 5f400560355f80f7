//! Vocabulary of the benchmarked protocol runs: parties, variants, phases and trace file names.
//!
//! Every benchmark run involves three parties. The helper `P0` only communicates during
//! preprocessing, the two computing parties `P1` and `P2` only communicate during the online
//! phase. Each of the three centrality measures is benchmarked for our protocol family and for the
//! prior reference family, which has no zero-iteration mode.
use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three parties of a benchmark run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Party {
    /// The helper party `P0`, which only sends preprocessing material.
    Helper,
    /// The first computing party `P1`.
    P1,
    /// The second computing party `P2`.
    P2,
}

impl Party {
    /// All parties, ordered by their party id.
    pub const ALL: [Party; 3] = [Party::Helper, Party::P1, Party::P2];

    /// The party id as recorded in the trace details.
    pub fn pid(self) -> u32 {
        match self {
            Party::Helper => 0,
            Party::P1 => 1,
            Party::P2 => 2,
        }
    }

    /// Returns the party with the given id, if there is one.
    pub fn from_pid(pid: u32) -> Option<Self> {
        match pid {
            0 => Some(Party::Helper),
            1 => Some(Party::P1),
            2 => Some(Party::P2),
            _ => None,
        }
    }
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.pid())
    }
}

/// The centrality measure computed by a benchmarked protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Measure {
    /// `pi_3`, the M centrality.
    Pi3,
    /// `pi_2`, the K centrality (deduplicates reachable nodes).
    Pi2,
    /// `pi_1`, the R centrality (clips the final scores).
    Pi1,
}

impl Measure {
    /// All measures in the order they are reported.
    pub const ALL: [Measure; 3] = [Measure::Pi3, Measure::Pi2, Measure::Pi1];

    /// The token used in trace file names.
    pub fn file_token(self) -> &'static str {
        match self {
            Measure::Pi3 => "pi_3",
            Measure::Pi2 => "pi_2",
            Measure::Pi1 => "pi_1",
        }
    }
}

/// Whether a run used our protocol or the prior reference protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Family {
    /// Our protocol, benchmarked from depth 0.
    Ours,
    /// The reference protocol, which cannot run zero iterations.
    Reference,
}

impl Family {
    /// The smallest depth at which the family can be benchmarked.
    pub fn min_depth(self) -> u32 {
        match self {
            Family::Ours => 0,
            Family::Reference => 1,
        }
    }

    /// The depths needed to separate one-time from per-iteration cost.
    pub fn differencing_depths(self) -> &'static [u32] {
        match self {
            Family::Ours => &[0, 1, 2],
            Family::Reference => &[1, 2],
        }
    }
}

/// A benchmarked protocol: a centrality measure in one of the two families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Variant {
    /// The computed centrality measure.
    pub measure: Measure,
    /// Our protocol or the reference.
    pub family: Family,
}

impl Variant {
    /// Our protocol for the given measure.
    pub const fn ours(measure: Measure) -> Self {
        Variant {
            measure,
            family: Family::Ours,
        }
    }

    /// The reference protocol for the given measure.
    pub const fn reference(measure: Measure) -> Self {
        Variant {
            measure,
            family: Family::Reference,
        }
    }

    /// All six benchmarked variants.
    pub fn all() -> impl Iterator<Item = Variant> {
        [Family::Ours, Family::Reference]
            .into_iter()
            .flat_map(|family| Measure::ALL.map(|measure| Variant { measure, family }))
    }

    /// Shorthand for `self.family.min_depth()`.
    pub fn min_depth(self) -> u32 {
        self.family.min_depth()
    }

    /// The metric part of a trace file name, e.g. `pi_2` or `pi_2_ref`.
    pub fn file_token(self) -> String {
        match self.family {
            Family::Ours => self.measure.file_token().to_string(),
            Family::Reference => format!("{}_ref", self.measure.file_token()),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_token())
    }
}

/// The phase a cost is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Input-independent preprocessing, sent by the helper.
    Preprocessing,
    /// The input-dependent online phase, sent by both computing parties.
    Online,
}

/// Whether a cost is paid once or for every iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    /// Setup cost, i.e. the cost at the family's minimum depth.
    OneTime,
    /// Marginal cost of one additional iteration.
    PerIteration,
    /// One-time cost plus the cost of every iteration executed up to a given depth.
    Cumulative,
}

/// The network setting a benchmark ran in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Local network, the default setting.
    #[default]
    Lan,
    /// Wide-area network; trace files carry a `WAN_` prefix.
    Wan,
}

impl Network {
    fn file_prefix(self) -> &'static str {
        match self {
            Network::Lan => "",
            Network::Wan => "WAN_",
        }
    }
}

/// Identifies which benchmark a trace file belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TraceCase {
    /// A sweep over depths on a real dataset, one record per depth.
    Dataset(String),
    /// A sweep over graph sizes with `t = factor * n`, one file per depth and one record per size.
    ///
    /// The reference protocol does not depend on `t`, so its size sweep ignores the factor.
    SizeSweep {
        /// Total size as a multiple of the node count (11, 51 or 101 in the benchmark suite).
        factor: u64,
    },
}

/// Returns the file name (without the party directory) storing the given trace.
///
/// Size sweeps store one file per depth, so `depth` is required for them and ignored for
/// dataset sweeps.
pub fn trace_file_name(variant: Variant, case: &TraceCase, network: Network, depth: u32) -> String {
    let prefix = network.file_prefix();
    let metric = variant.measure.file_token();
    match (case, variant.family) {
        (TraceCase::Dataset(name), Family::Ours) => format!("{prefix}output_{metric}_{name}.txt"),
        (TraceCase::Dataset(name), Family::Reference) => {
            format!("{prefix}output_{metric}_ref_{name}.txt")
        }
        (TraceCase::SizeSweep { factor }, Family::Ours) => {
            format!("{prefix}output_{metric}_{factor}_d{depth}.txt")
        }
        (TraceCase::SizeSweep { .. }, Family::Reference) => {
            format!("{prefix}output_{metric}_ref_d{depth}.txt")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_follow_benchmark_layout() {
        let aarhus = TraceCase::Dataset("aarhus".into());
        assert_eq!(
            trace_file_name(Variant::ours(Measure::Pi3), &aarhus, Network::Lan, 0),
            "output_pi_3_aarhus.txt"
        );
        assert_eq!(
            trace_file_name(Variant::reference(Measure::Pi2), &aarhus, Network::Lan, 4),
            "output_pi_2_ref_aarhus.txt"
        );
        let sweep = TraceCase::SizeSweep { factor: 51 };
        assert_eq!(
            trace_file_name(Variant::ours(Measure::Pi1), &sweep, Network::Wan, 2),
            "WAN_output_pi_1_51_d2.txt"
        );
        assert_eq!(
            trace_file_name(Variant::reference(Measure::Pi3), &sweep, Network::Lan, 1),
            "output_pi_3_ref_d1.txt"
        );
    }

    #[test]
    fn party_ids_round_trip() {
        for party in Party::ALL {
            assert_eq!(Party::from_pid(party.pid()), Some(party));
        }
        assert_eq!(Party::from_pid(3), None);
    }

    #[test]
    fn six_variants() {
        assert_eq!(Variant::all().count(), 6);
        assert_eq!(Variant::reference(Measure::Pi1).min_depth(), 1);
    }
}
