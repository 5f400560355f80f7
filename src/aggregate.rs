//! Combines the three per-party records of one configuration into a single cost record.
//!
//! Communication is summed globally: the helper is the only party sending during
//! preprocessing, and both computing parties send the same amount online, so the offline total is
//! the helper's figure and the online figure is reported per computing party. Running time is the
//! slowest party per repetition, averaged over repetitions. Memory is the worst case over parties.
use serde::Serialize;

use crate::{
    Error,
    protocol::Party,
    trace::{SchemaViolation, TraceRecord},
};

/// The aggregated cost of one configuration at one depth, in raw units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedConfiguration {
    /// The depth the three records were measured at.
    pub depth: u32,
    /// Number of graph nodes.
    pub nodes: u64,
    /// Bytes sent during preprocessing (by the helper).
    pub offline_communication: u64,
    /// Bytes sent online by each computing party.
    pub online_communication: u64,
    /// Mean preprocessing time in milliseconds.
    pub offline_time_ms: f64,
    /// Mean online time in milliseconds.
    pub online_time_ms: f64,
    /// Peak virtual memory in bytes, maximum over the parties.
    pub peak_memory: u64,
}

impl AggregatedConfiguration {
    /// Total bytes sent by all parties: preprocessing plus online traffic of both computing
    /// parties. Widened so that no pair of `u64` phase totals can overflow it.
    pub fn total_communication(&self) -> u128 {
        u128::from(self.offline_communication) + 2 * u128::from(self.online_communication)
    }
}

/// A cross-party communication invariant does not hold.
///
/// The protocol's message volume is data-independent, so any of these indicates a bug in the
/// instrumentation or the measured system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    /// The helper sent data during the online phase.
    #[error("helper sent {bytes} bytes online in repetition {repetition}")]
    HelperOnline {
        /// Index of the repetition.
        repetition: usize,
        /// Bytes sent.
        bytes: u64,
    },
    /// A computing party sent data during preprocessing.
    #[error("{party} sent {bytes} bytes during preprocessing in repetition {repetition}")]
    ComputingPartyOffline {
        /// The offending computing party.
        party: Party,
        /// Index of the repetition.
        repetition: usize,
        /// Bytes sent.
        bytes: u64,
    },
    /// The two computing parties sent different amounts online.
    #[error("P1 sent {p1} bytes online but P2 sent {p2} bytes in repetition {repetition}")]
    AsymmetricOnline {
        /// Index of the repetition.
        repetition: usize,
        /// Bytes sent by P1.
        p1: u64,
        /// Bytes sent by P2.
        p2: u64,
    },
    /// Communication differs between repetitions of the same configuration.
    #[error(
        "{phase} communication of repetition {repetition} is {actual} bytes, \
         the first repetition sent {expected} bytes"
    )]
    NonDeterministic {
        /// `"preprocessing"` or `"online"`.
        phase: &'static str,
        /// Index of the deviating repetition.
        repetition: usize,
        /// Bytes of the first repetition.
        expected: u64,
        /// Bytes of the deviating repetition.
        actual: u64,
    },
    /// The message classes of one phase sum to more than `u64::MAX` bytes.
    #[error("{phase} communication of {party} overflows in repetition {repetition}")]
    CommunicationOverflow {
        /// The party whose record overflows.
        party: Party,
        /// `"preprocessing"` or `"online"`.
        phase: &'static str,
        /// Index of the repetition.
        repetition: usize,
    },
}

/// Aggregates the records of the helper (`p0`) and the two computing parties (`p1`, `p2`).
pub fn aggregate(
    p0: &TraceRecord,
    p1: &TraceRecord,
    p2: &TraceRecord,
) -> Result<AggregatedConfiguration, Error> {
    check_siblings(p0, p1, p2)?;

    let repetitions = p0.repetitions();
    let mut comm_off = Vec::with_capacity(repetitions);
    let mut comm_on = Vec::with_capacity(repetitions);
    let mut time_off = 0.0;
    let mut time_on = 0.0;
    for r in 0..repetitions {
        let helper_online = online_bytes(Party::Helper, p0, r)?;
        if helper_online != 0 {
            return Err(InvariantViolation::HelperOnline {
                repetition: r,
                bytes: helper_online,
            }
            .into());
        }
        for (party, record) in [(Party::P1, p1), (Party::P2, p2)] {
            let bytes = preprocessing_bytes(party, record, r)?;
            if bytes != 0 {
                return Err(InvariantViolation::ComputingPartyOffline {
                    party,
                    repetition: r,
                    bytes,
                }
                .into());
            }
        }
        let p1_online = online_bytes(Party::P1, p1, r)?;
        let p2_online = online_bytes(Party::P2, p2, r)?;
        if p1_online != p2_online {
            return Err(InvariantViolation::AsymmetricOnline {
                repetition: r,
                p1: p1_online,
                p2: p2_online,
            }
            .into());
        }
        comm_off.push(preprocessing_bytes(Party::Helper, p0, r)?);
        comm_on.push(p1_online);
        time_off += slowest(p0, p1, p2, |record| record.benchmarks_pre[r].time);
        time_on += slowest(p0, p1, p2, |record| record.benchmarks[r].time);
    }

    let offline_communication = constant_across_repetitions("preprocessing", &comm_off)?;
    let online_communication = constant_across_repetitions("online", &comm_on)?;
    let peak_memory = [p0, p1, p2]
        .iter()
        .map(|record| record.stats.peak_virtual_memory)
        .max()
        .unwrap_or_default();

    Ok(AggregatedConfiguration {
        depth: p0.details.depth,
        nodes: p0.details.nodes,
        offline_communication,
        online_communication,
        offline_time_ms: time_off / repetitions as f64,
        online_time_ms: time_on / repetitions as f64,
        peak_memory,
    })
}

fn preprocessing_bytes(
    party: Party,
    record: &TraceRecord,
    repetition: usize,
) -> Result<u64, InvariantViolation> {
    record.benchmarks_pre[repetition]
        .total_communication()
        .ok_or(InvariantViolation::CommunicationOverflow {
            party,
            phase: "preprocessing",
            repetition,
        })
}

fn online_bytes(
    party: Party,
    record: &TraceRecord,
    repetition: usize,
) -> Result<u64, InvariantViolation> {
    record.benchmarks[repetition]
        .total_communication()
        .ok_or(InvariantViolation::CommunicationOverflow {
            party,
            phase: "online",
            repetition,
        })
}

fn check_siblings(
    p0: &TraceRecord,
    p1: &TraceRecord,
    p2: &TraceRecord,
) -> Result<(), SchemaViolation> {
    let depth = p0.details.depth;
    let nodes = p0.details.nodes;
    let repetitions = p0.repetitions();
    for (party, record) in Party::ALL.into_iter().zip([p0, p1, p2]) {
        record.check_identity(party, depth)?;
        if record.details.nodes != nodes {
            return Err(SchemaViolation::NodeCount {
                party,
                expected: nodes,
                actual: record.details.nodes,
            });
        }
        if record.repetitions() != repetitions {
            return Err(SchemaViolation::SiblingRepetitions {
                party,
                expected: repetitions,
                actual: record.repetitions(),
            });
        }
    }
    Ok(())
}

fn slowest(
    p0: &TraceRecord,
    p1: &TraceRecord,
    p2: &TraceRecord,
    time: impl Fn(&TraceRecord) -> f64,
) -> f64 {
    time(p0).max(time(p1)).max(time(p2))
}

fn constant_across_repetitions(
    phase: &'static str,
    bytes: &[u64],
) -> Result<u64, InvariantViolation> {
    let first = bytes.first().copied().unwrap_or_default();
    match bytes.iter().enumerate().find(|(_, b)| **b != first) {
        Some((repetition, actual)) => Err(InvariantViolation::NonDeterministic {
            phase,
            repetition,
            expected: first,
            actual: *actual,
        }),
        None => Ok(first),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::trace::{Details, PhaseSample, Stats};

    fn sample(communication: Vec<u64>, time: f64) -> PhaseSample {
        PhaseSample {
            communication,
            time,
        }
    }

    fn record(
        pid: u32,
        pre: Vec<PhaseSample>,
        online: Vec<PhaseSample>,
        memory: u64,
    ) -> TraceRecord {
        TraceRecord {
            details: Details {
                depth: 1,
                pid,
                nodes: 61,
                size: None,
                layers: None,
                repeat: None,
                threads: None,
                nmbr_bits: None,
            },
            benchmarks_pre: pre,
            benchmarks: online,
            stats: Stats {
                peak_virtual_memory: memory,
                peak_resident_set_size: None,
            },
        }
    }

    fn parties(off: [u64; 2], on: [u64; 2]) -> [TraceRecord; 3] {
        let p0 = record(
            0,
            vec![sample(vec![off[0] - 8, 8], 10.0), sample(vec![off[1]], 14.0)],
            vec![sample(vec![0], 20.0), sample(vec![0, 0], 22.0)],
            300,
        );
        let p1 = record(
            1,
            vec![sample(vec![0], 12.0), sample(vec![0], 12.0)],
            vec![sample(vec![on[0]], 25.0), sample(vec![on[1]], 21.0)],
            500,
        );
        let p2 = record(
            2,
            vec![sample(vec![], 11.0), sample(vec![0], 13.0)],
            vec![sample(vec![on[0] / 2, on[0] - on[0] / 2], 24.0), sample(vec![on[1]], 26.0)],
            400,
        );
        [p0, p1, p2]
    }

    #[test]
    fn aggregates_three_parties() {
        let [p0, p1, p2] = parties([100, 100], [50, 50]);
        let agg = aggregate(&p0, &p1, &p2).unwrap();
        assert_eq!(agg.nodes, 61);
        assert_eq!(agg.depth, 1);
        assert_eq!(agg.offline_communication, 100);
        assert_eq!(agg.online_communication, 50);
        assert_eq!(agg.total_communication(), 200);
        // slowest party per repetition: (12 + 14) / 2 and (25 + 26) / 2
        assert_eq!(agg.offline_time_ms, 13.0);
        assert_eq!(agg.online_time_ms, 25.5);
        assert_eq!(agg.peak_memory, 500);
    }

    #[test]
    fn helper_must_be_silent_online() {
        let [mut p0, p1, p2] = parties([100, 100], [50, 50]);
        p0.benchmarks[1].communication = vec![0, 4];
        assert!(matches!(
            aggregate(&p0, &p1, &p2),
            Err(Error::Invariant(InvariantViolation::HelperOnline {
                repetition: 1,
                bytes: 4
            }))
        ));
    }

    #[test]
    fn computing_parties_must_be_silent_offline() {
        let [p0, p1, mut p2] = parties([100, 100], [50, 50]);
        p2.benchmarks_pre[0].communication = vec![1];
        assert!(matches!(
            aggregate(&p0, &p1, &p2),
            Err(Error::Invariant(InvariantViolation::ComputingPartyOffline {
                party: Party::P2,
                repetition: 0,
                bytes: 1
            }))
        ));
    }

    #[test]
    fn computing_parties_send_equally() {
        let [p0, mut p1, p2] = parties([100, 100], [50, 50]);
        p1.benchmarks[0].communication = vec![51];
        assert!(matches!(
            aggregate(&p0, &p1, &p2),
            Err(Error::Invariant(InvariantViolation::AsymmetricOnline { p1: 51, p2: 50, .. }))
        ));
    }

    #[test]
    fn communication_is_deterministic() {
        let [p0, p1, p2] = parties([100, 104], [50, 50]);
        assert!(matches!(
            aggregate(&p0, &p1, &p2),
            Err(Error::Invariant(InvariantViolation::NonDeterministic {
                phase: "preprocessing",
                repetition: 1,
                expected: 100,
                actual: 104
            }))
        ));
        let [p0, p1, p2] = parties([100, 100], [50, 48]);
        assert!(matches!(
            aggregate(&p0, &p1, &p2),
            Err(Error::Invariant(InvariantViolation::NonDeterministic { phase: "online", .. }))
        ));
    }

    #[test]
    fn siblings_must_agree_on_nodes() {
        let [p0, p1, mut p2] = parties([100, 100], [50, 50]);
        p2.details.nodes = 60;
        assert!(matches!(
            aggregate(&p0, &p1, &p2),
            Err(Error::Schema(SchemaViolation::NodeCount {
                party: Party::P2,
                expected: 61,
                actual: 60
            }))
        ));
    }

    #[test]
    fn siblings_must_be_ordered_by_party() {
        let [p0, p1, p2] = parties([100, 100], [50, 50]);
        assert!(matches!(
            aggregate(&p0, &p2, &p1),
            Err(Error::Schema(SchemaViolation::PartyId { expected: Party::P1, actual: 2 }))
        ));
    }

    #[test]
    fn overflowing_message_classes_are_rejected() {
        let [mut p0, p1, p2] = parties([100, 100], [50, 50]);
        p0.benchmarks_pre[1].communication = vec![u64::MAX, 1];
        assert!(matches!(
            aggregate(&p0, &p1, &p2),
            Err(Error::Invariant(InvariantViolation::CommunicationOverflow {
                party: Party::Helper,
                phase: "preprocessing",
                repetition: 1
            }))
        ));
        let [p0, mut p1, p2] = parties([100, 100], [50, 50]);
        p1.benchmarks[0].communication = vec![u64::MAX, u64::MAX];
        assert!(matches!(
            aggregate(&p0, &p1, &p2),
            Err(Error::Invariant(InvariantViolation::CommunicationOverflow {
                party: Party::P1,
                phase: "online",
                ..
            }))
        ));
    }

    #[test]
    fn total_communication_does_not_wrap() {
        let [p0, p1, p2] = parties([u64::MAX / 2, u64::MAX / 2], [u64::MAX / 2, u64::MAX / 2]);
        let agg = aggregate(&p0, &p1, &p2).unwrap();
        assert_eq!(agg.total_communication(), 3 * u128::from(u64::MAX / 2));
    }

    proptest! {
        #[test]
        fn aggregation_keeps_constant_communication(
            off in 8u64..1_000_000,
            on in 0u64..1_000_000,
            times in proptest::collection::vec((0.0f64..1e4, 0.0f64..1e4, 0.0f64..1e4), 1..8),
        ) {
            let reps = times.len();
            let p0 = record(
                0,
                times.iter().map(|t| sample(vec![off], t.0)).collect(),
                times.iter().map(|t| sample(vec![0], t.0)).collect(),
                7,
            );
            let p1 = record(
                1,
                times.iter().map(|t| sample(vec![0], t.1)).collect(),
                times.iter().map(|t| sample(vec![on], t.1)).collect(),
                9,
            );
            let p2 = record(
                2,
                times.iter().map(|t| sample(vec![], t.2)).collect(),
                times.iter().map(|t| sample(vec![on], t.2)).collect(),
                8,
            );
            let agg = aggregate(&p0, &p1, &p2).unwrap();
            prop_assert_eq!(agg.offline_communication, off);
            prop_assert_eq!(agg.online_communication, on);
            prop_assert_eq!(agg.peak_memory, 9);
            let mean_max = times.iter().map(|t| t.0.max(t.1).max(t.2)).sum::<f64>() / reps as f64;
            prop_assert!((agg.online_time_ms - mean_max).abs() <= 1e-9 * mean_max.max(1.0));
            prop_assert!((agg.offline_time_ms - mean_max).abs() <= 1e-9 * mean_max.max(1.0));
        }

        #[test]
        fn perturbed_repetition_is_rejected(
            off in 1u64..1_000_000,
            delta in 1u64..1000,
            reps in 2usize..6,
            at in 1usize..6,
        ) {
            let at = at % reps;
            prop_assume!(at > 0);
            let constant = |bytes: u64| (0..reps).map(|_| sample(vec![bytes], 1.0)).collect();
            let perturbed = (0..reps)
                .map(|r| sample(vec![if r == at { off + delta } else { off }], 1.0))
                .collect();
            let p0 = record(0, perturbed, constant(0), 1);
            let p1 = record(1, constant(0), constant(3), 1);
            let p2 = record(2, constant(0), constant(3), 1);
            let is_nondeterministic = matches!(
                aggregate(&p0, &p1, &p2),
                Err(Error::Invariant(InvariantViolation::NonDeterministic {
                    phase: "preprocessing",
                    ..
                }))
            );
            prop_assert!(is_nondeterministic);
        }
    }
}
