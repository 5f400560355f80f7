//! Per-party trace records as written by the benchmark binaries.
use serde::{Deserialize, Serialize};

use crate::protocol::Party;

/// The header of a trace record, identifying which run it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Details {
    /// The number of iterations executed before measurement.
    #[serde(rename = "D")]
    pub depth: u32,
    /// The id of the party that wrote the record.
    pub pid: u32,
    /// The number of graph nodes.
    pub nodes: u64,
    /// Total size of the graph (nodes plus directed edges), if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Number of layers of the reference protocol input, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layers: Option<u64>,
    /// Number of repetitions the benchmark was configured with, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,
    /// Number of worker threads, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<u32>,
    /// Ring bit-width used by the run, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nmbr_bits: Option<u32>,
}

/// Measurements of one phase in one repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSample {
    /// Bytes sent, one entry per message class.
    pub communication: Vec<u64>,
    /// Wall-clock time in milliseconds.
    pub time: f64,
}

impl PhaseSample {
    /// Total bytes sent in this phase, or `None` if the sum does not fit in a `u64`.
    pub fn total_communication(&self) -> Option<u64> {
        self.communication
            .iter()
            .try_fold(0u64, |total, &bytes| total.checked_add(bytes))
    }
}

/// Process statistics of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    /// Peak virtual memory of the process in bytes.
    pub peak_virtual_memory: u64,
    /// Peak resident set size in bytes, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peak_resident_set_size: Option<u64>,
}

/// One party's measurements for one protocol, configuration and depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Identity of the run.
    pub details: Details,
    /// Preprocessing samples, one per repetition.
    pub benchmarks_pre: Vec<PhaseSample>,
    /// Online samples, one per repetition.
    pub benchmarks: Vec<PhaseSample>,
    /// Process statistics.
    pub stats: Stats,
}

impl TraceRecord {
    /// The number of repetitions of this run.
    pub fn repetitions(&self) -> usize {
        self.benchmarks.len()
    }

    /// Checks that the record was written by `party` at `depth` and is internally consistent.
    pub fn check_identity(&self, party: Party, depth: u32) -> Result<(), SchemaViolation> {
        if self.details.pid != party.pid() {
            return Err(SchemaViolation::PartyId {
                expected: party,
                actual: self.details.pid,
            });
        }
        if self.details.depth != depth {
            return Err(SchemaViolation::Depth {
                party,
                expected: depth,
                actual: self.details.depth,
            });
        }
        self.check_repetitions(party)
    }

    pub(crate) fn check_repetitions(&self, party: Party) -> Result<(), SchemaViolation> {
        if self.benchmarks_pre.len() != self.benchmarks.len() {
            return Err(SchemaViolation::PhaseRepetitions {
                party,
                preprocessing: self.benchmarks_pre.len(),
                online: self.benchmarks.len(),
            });
        }
        if self.benchmarks.is_empty() {
            return Err(SchemaViolation::NoRepetitions { party });
        }
        if self.details.nodes == 0 {
            return Err(SchemaViolation::EmptyGraph { party });
        }
        let samples = self.benchmarks_pre.iter().zip(&self.benchmarks);
        for (repetition, (pre, online)) in samples.enumerate() {
            // also rejects NaN
            if !(pre.time >= 0.0 && online.time >= 0.0) {
                return Err(SchemaViolation::NegativeTime { party, repetition });
            }
        }
        Ok(())
    }

    /// Checks the optional header fields against the configuration the record is analyzed
    /// under. Fields the benchmark did not record are accepted.
    pub fn check_header(
        &self,
        party: Party,
        expected: &ExpectedHeader,
    ) -> Result<(), SchemaViolation> {
        let fields = [
            ("size", self.details.size, expected.total_size),
            ("layers", self.details.layers, expected.layers),
            (
                "nmbr_bits",
                self.details.nmbr_bits.map(u64::from),
                expected.ring_bits.map(u64::from),
            ),
        ];
        for (field, recorded, expected) in fields {
            match (recorded, expected) {
                (Some(actual), Some(expected)) if actual != expected => {
                    return Err(SchemaViolation::HeaderMismatch {
                        party,
                        field,
                        expected,
                        actual,
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Header values a record must agree with when it states them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpectedHeader {
    /// Total size of the graph.
    pub total_size: Option<u64>,
    /// Number of layers of the reference protocol input.
    pub layers: Option<u64>,
    /// Ring bit-width.
    pub ring_bits: Option<u32>,
}

/// A record's header does not match the identity expected for its slot.
///
/// This indicates a corrupted or mismatched benchmark run and aborts the analysis of the
/// affected configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    /// The record was written by a different party than the file belongs to.
    #[error("expected a record of party {expected}, found pid {actual}")]
    PartyId {
        /// The party the file belongs to.
        expected: Party,
        /// The pid stored in the record.
        actual: u32,
    },
    /// The record's depth does not match its position in the sweep.
    #[error("record of {party} has depth {actual}, expected depth {expected}")]
    Depth {
        /// The party the record belongs to.
        party: Party,
        /// The depth implied by the file name or line.
        expected: u32,
        /// The depth stored in the record.
        actual: u32,
    },
    /// Records that describe the same configuration disagree on the number of nodes.
    #[error("node count mismatch: expected {expected} nodes, {party} reports {actual}")]
    NodeCount {
        /// The party (or first party of a sibling record) reporting the deviating count.
        party: Party,
        /// The node count of the reference sibling.
        expected: u64,
        /// The deviating node count.
        actual: u64,
    },
    /// The record has a different number of preprocessing and online samples.
    #[error("{party} recorded {preprocessing} preprocessing but {online} online repetitions")]
    PhaseRepetitions {
        /// The party the record belongs to.
        party: Party,
        /// Number of preprocessing samples.
        preprocessing: usize,
        /// Number of online samples.
        online: usize,
    },
    /// Sibling records have a different number of repetitions.
    #[error("{party} recorded {actual} repetitions, the helper recorded {expected}")]
    SiblingRepetitions {
        /// The party with the deviating repetition count.
        party: Party,
        /// The helper's repetition count.
        expected: usize,
        /// The deviating repetition count.
        actual: usize,
    },
    /// The record contains no repetition at all.
    #[error("record of {party} contains no repetitions")]
    NoRepetitions {
        /// The party the record belongs to.
        party: Party,
    },
    /// The record claims a graph without nodes.
    #[error("record of {party} reports a graph without nodes")]
    EmptyGraph {
        /// The party the record belongs to.
        party: Party,
    },
    /// Sibling configurations at different depths disagree on the number of nodes.
    #[error(
        "node count changes across depths: {expected} nodes at depth {base_depth}, \
         {actual} at depth {depth}"
    )]
    DepthNodeCount {
        /// The depth of the reference configuration.
        base_depth: u32,
        /// The node count at the reference depth.
        expected: u64,
        /// The depth of the deviating configuration.
        depth: u32,
        /// The deviating node count.
        actual: u64,
    },
    /// The number of depth slots does not match the depths needed for differencing.
    #[error("expected configurations at {expected} depths, got {actual}")]
    DepthSlots {
        /// The number of differencing depths of the family.
        expected: usize,
        /// The number of supplied configurations.
        actual: usize,
    },
    /// A prediction was made for a different graph than the one that was measured.
    #[error("prediction is for {expected} nodes, but {actual} nodes were measured")]
    PredictionNodeCount {
        /// The node count of the prediction.
        expected: u64,
        /// The measured node count.
        actual: u64,
    },
    /// A configuration was supplied for a different depth than the slot it was supplied for.
    #[error("configuration for depth {actual} supplied where depth {expected} was required")]
    MisplacedDepth {
        /// The depth of the slot.
        expected: u32,
        /// The depth of the supplied configuration.
        actual: u32,
    },
    /// A repetition reports a negative (or NaN) running time.
    #[error("{party} reports a negative time in repetition {repetition}")]
    NegativeTime {
        /// The party the record belongs to.
        party: Party,
        /// The index of the offending repetition.
        repetition: usize,
    },
    /// A recorded header field disagrees with the configuration under analysis.
    #[error("{party} recorded {field} = {actual}, expected {expected}")]
    HeaderMismatch {
        /// The party the record belongs to.
        party: Party,
        /// The name of the header field.
        field: &'static str,
        /// The configured value.
        expected: u64,
        /// The recorded value.
        actual: u64,
    },
    /// The three party files of a run hold different numbers of records.
    #[error("trace file of {party} ends after {actual} records, its siblings hold {expected}")]
    PartyFileLength {
        /// The party whose file is short.
        party: Party,
        /// The number of records in the longest sibling file.
        expected: usize,
        /// The number of records in this party's file.
        actual: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = r#"{"details":{"pid":1,"threads":6,"seeds_h":200,"seeds_l":200,"repeat":2,"nodes":61,"size":1301,"nmbr_bits":32,"D":3},"benchmarks_pre":[{"communication":[0,0],"time":12.5},{"communication":[0,0],"time":11.0}],"benchmarks":[{"communication":[400,24],"time":31.0},{"communication":[400,24],"time":30.0}],"stats":{"peak_virtual_memory":1048576,"peak_resident_set_size":4096}}"#;

    #[test]
    fn parses_benchmark_output() {
        let record: TraceRecord = serde_json::from_str(LINE).unwrap();
        assert_eq!(record.details.depth, 3);
        assert_eq!(record.details.pid, 1);
        assert_eq!(record.details.nodes, 61);
        assert_eq!(record.details.size, Some(1301));
        assert_eq!(record.details.layers, None);
        assert_eq!(record.repetitions(), 2);
        assert_eq!(record.benchmarks[0].total_communication(), Some(424));
        assert_eq!(record.stats.peak_virtual_memory, 1048576);
        assert!(record.check_identity(Party::P1, 3).is_ok());
    }

    #[test]
    fn identity_mismatches_are_schema_violations() {
        let record: TraceRecord = serde_json::from_str(LINE).unwrap();
        assert_eq!(
            record.check_identity(Party::P2, 3),
            Err(SchemaViolation::PartyId {
                expected: Party::P2,
                actual: 1
            })
        );
        assert_eq!(
            record.check_identity(Party::P1, 2),
            Err(SchemaViolation::Depth {
                party: Party::P1,
                expected: 2,
                actual: 3
            })
        );
    }

    #[test]
    fn misaligned_repetitions_are_rejected() {
        let mut record: TraceRecord = serde_json::from_str(LINE).unwrap();
        record.benchmarks.pop();
        assert!(matches!(
            record.check_identity(Party::P1, 3),
            Err(SchemaViolation::PhaseRepetitions {
                preprocessing: 2,
                online: 1,
                ..
            })
        ));
    }

    #[test]
    fn communication_sum_overflow_is_detected() {
        let sample = PhaseSample {
            communication: vec![u64::MAX, 1],
            time: 1.0,
        };
        assert_eq!(sample.total_communication(), None);
        let sample = PhaseSample {
            communication: vec![u64::MAX - 1, 1],
            time: 1.0,
        };
        assert_eq!(sample.total_communication(), Some(u64::MAX));
    }

    #[test]
    fn negative_times_are_rejected() {
        let mut record: TraceRecord = serde_json::from_str(LINE).unwrap();
        record.benchmarks[1].time = -0.5;
        assert_eq!(
            record.check_identity(Party::P1, 3),
            Err(SchemaViolation::NegativeTime {
                party: Party::P1,
                repetition: 1
            })
        );
        record.benchmarks[1].time = 0.0;
        record.benchmarks_pre[0].time = f64::NAN;
        assert!(matches!(
            record.check_identity(Party::P1, 3),
            Err(SchemaViolation::NegativeTime { repetition: 0, .. })
        ));
    }

    #[test]
    fn recorded_header_fields_are_cross_checked() {
        let record: TraceRecord = serde_json::from_str(LINE).unwrap();
        let matching = ExpectedHeader {
            total_size: Some(1301),
            layers: Some(3),
            ring_bits: Some(32),
        };
        // layers are not recorded, so any configured value is accepted
        assert!(record.check_header(Party::P1, &matching).is_ok());
        assert!(record.check_header(Party::P1, &ExpectedHeader::default()).is_ok());
        assert_eq!(
            record.check_header(
                Party::P1,
                &ExpectedHeader {
                    ring_bits: Some(64),
                    ..matching
                }
            ),
            Err(SchemaViolation::HeaderMismatch {
                party: Party::P1,
                field: "nmbr_bits",
                expected: 64,
                actual: 32
            })
        );
        assert!(matches!(
            record.check_header(
                Party::P1,
                &ExpectedHeader {
                    total_size: Some(1300),
                    ..matching
                }
            ),
            Err(SchemaViolation::HeaderMismatch { field: "size", .. })
        ));
    }
}
