//! Reads per-party trace files and checks record identities before any arithmetic happens.
//!
//! Trace files are newline-delimited JSON with one [`TraceRecord`] per line, stored in one
//! directory per party (`p0`, `p1`, `p2`). Dataset sweeps store one record per depth, starting at
//! the family's minimum depth. Size sweeps store one file per depth and one record per graph size.
//! Files may be shorter than the sweep they belong to; absent cells are reported as
//! [`Measured::Missing`]. The three files of one run must hold the same number of records, since a
//! record present for only some parties belongs to a truncated or mismatched run.
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use tracing::{Level, debug, instrument, warn};

use crate::{
    Error,
    aggregate::{AggregatedConfiguration, aggregate},
    config::{AnalysisConfig, DatasetConfig},
    measured::{Measured, MissingData},
    protocol::{Family, Network, Party, TraceCase, Variant, trace_file_name},
    trace::{ExpectedHeader, SchemaViolation, TraceRecord},
};

/// A trace file could not be read or parsed.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("could not read trace file {path}: {source}")]
    Io {
        /// The trace file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
    /// A line is not a valid trace record.
    #[error("invalid trace record in {path}, line {line}: {source}")]
    Parse {
        /// The trace file.
        path: PathBuf,
        /// The 1-based line number.
        line: usize,
        /// The underlying error.
        source: serde_json::Error,
    },
}

/// The records of the three parties for one configuration and depth.
#[derive(Debug, Clone, PartialEq)]
pub struct PartyRecords {
    /// The record of the helper `P0`.
    pub helper: TraceRecord,
    /// The record of `P1`.
    pub p1: TraceRecord,
    /// The record of `P2`.
    pub p2: TraceRecord,
}

impl PartyRecords {
    /// Aggregates the three records, see [`aggregate`].
    pub fn aggregate(&self) -> Result<AggregatedConfiguration, Error> {
        aggregate(&self.helper, &self.p1, &self.p2)
    }
}

/// One row of a size sweep: the records at each differencing depth of the family.
#[derive(Debug, Clone, PartialEq)]
pub struct SizeSweepRow {
    /// Index of the row in the sweep files.
    pub row: usize,
    /// Records at the family's differencing depths, in order.
    pub slots: Vec<Measured<PartyRecords>>,
}

/// Loads trace files relative to a base directory.
#[derive(Debug, Clone)]
pub struct TraceLoader {
    base_dir: PathBuf,
    ring_bits: Option<u32>,
}

impl TraceLoader {
    /// Creates a loader reading from `base_dir`, accepting any recorded ring bit-width.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        TraceLoader {
            base_dir: base_dir.into(),
            ring_bits: None,
        }
    }

    /// Rejects records stating a ring bit-width other than `ring_bits`.
    pub fn with_ring_bits(mut self, ring_bits: u32) -> Self {
        self.ring_bits = Some(ring_bits);
        self
    }

    /// Creates a loader reading from the configured base directory, expecting the configured
    /// ring bit-width.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(&config.base_dir).with_ring_bits(config.ring_bits)
    }

    /// The directory containing the party directories.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The path of the trace file written by `party`.
    pub fn trace_path(
        &self,
        party: Party,
        variant: Variant,
        case: &TraceCase,
        network: Network,
        depth: u32,
    ) -> PathBuf {
        self.base_dir
            .join(format!("p{}", party.pid()))
            .join(trace_file_name(variant, case, network, depth))
    }

    /// Loads the depth sweep of `variant` on `dataset` from the family's minimum depth up to
    /// `max_depth`.
    ///
    /// Every record must be written by the party of its directory, carry the depth of its line
    /// and report the dataset's node count. Recorded total sizes, reference layer counts and ring
    /// bit-widths must match the configuration.
    #[instrument(level = Level::DEBUG, skip(self, dataset), fields(dataset = %dataset.name), err)]
    pub fn load_depth_sweep(
        &self,
        variant: Variant,
        dataset: &DatasetConfig,
        network: Network,
        max_depth: u32,
    ) -> Result<Vec<Measured<PartyRecords>>, Error> {
        let case = TraceCase::Dataset(dataset.name.clone());
        let min_depth = variant.min_depth();
        let [helper, p1, p2] = self.load_parties(variant, &case, network, 0)?;
        let header = ExpectedHeader {
            total_size: Some(dataset.total_size),
            layers: (variant.family == Family::Reference).then_some(dataset.layers),
            ring_bits: self.ring_bits,
        };
        let mut sweep = Vec::new();
        for depth in min_depth..=max_depth {
            let index = (depth - min_depth) as usize;
            let missing = MissingData { depth, row: None };
            let Some(records) = pick(&helper, &p1, &p2, index) else {
                warn!(%variant, depth, "no benchmark data for depth");
                sweep.push(Measured::Missing(missing));
                continue;
            };
            for (party, record) in Party::ALL.into_iter().zip(records.iter()) {
                record.check_identity(party, depth)?;
                if record.details.nodes != dataset.nodes {
                    return Err(SchemaViolation::NodeCount {
                        party,
                        expected: dataset.nodes,
                        actual: record.details.nodes,
                    }
                    .into());
                }
                record.check_header(party, &header)?;
            }
            sweep.push(Measured::Present(records.into_party_records()));
        }
        Ok(sweep)
    }

    /// Loads the size sweep of `variant` at the family's differencing depths.
    ///
    /// `factor` selects the total-size factor of our protocol and is ignored for the reference.
    /// The sweep has as many rows as its longest file. Our protocol's records must state a total
    /// size of `factor` times their node count if they state one; the reference protocol's
    /// siblings must agree on their layer count.
    #[instrument(level = Level::DEBUG, skip(self), err)]
    pub fn load_size_sweep(
        &self,
        variant: Variant,
        factor: u64,
        network: Network,
    ) -> Result<Vec<SizeSweepRow>, Error> {
        let case = TraceCase::SizeSweep { factor };
        let depths = variant.family.differencing_depths();
        let mut files = Vec::with_capacity(depths.len());
        for &depth in depths {
            files.push(self.load_parties(variant, &case, network, depth)?);
        }
        let rows = files
            .iter()
            .flat_map(|parties| parties.iter().map(Vec::len))
            .max()
            .unwrap_or_default();

        let mut sweep = Vec::with_capacity(rows);
        for row in 0..rows {
            let mut slots = Vec::with_capacity(depths.len());
            for (&depth, [helper, p1, p2]) in depths.iter().zip(&files) {
                let Some(records) = pick(helper, p1, p2, row) else {
                    warn!(%variant, depth, row, "no benchmark data for size sweep row");
                    slots.push(Measured::Missing(MissingData {
                        depth,
                        row: Some(row),
                    }));
                    continue;
                };
                let helper_details = &records.0[0].details;
                let header = match variant.family {
                    Family::Ours => ExpectedHeader {
                        total_size: factor.checked_mul(helper_details.nodes),
                        layers: None,
                        ring_bits: self.ring_bits,
                    },
                    Family::Reference => ExpectedHeader {
                        total_size: None,
                        layers: helper_details.layers,
                        ring_bits: self.ring_bits,
                    },
                };
                for (party, record) in Party::ALL.into_iter().zip(records.iter()) {
                    record.check_identity(party, depth)?;
                    record.check_header(party, &header)?;
                }
                slots.push(Measured::Present(records.into_party_records()));
            }
            sweep.push(SizeSweepRow { row, slots });
        }
        Ok(sweep)
    }

    fn load_parties(
        &self,
        variant: Variant,
        case: &TraceCase,
        network: Network,
        depth: u32,
    ) -> Result<[Vec<TraceRecord>; 3], Error> {
        let [helper, p1, p2] =
            Party::ALL.map(|party| self.trace_path(party, variant, case, network, depth));
        let files = [
            read_trace_file(&helper)?,
            read_trace_file(&p1)?,
            read_trace_file(&p2)?,
        ];
        check_file_lengths(&files)?;
        Ok(files)
    }
}

/// The files of one run hold one record per configuration for every party.
fn check_file_lengths(files: &[Vec<TraceRecord>; 3]) -> Result<(), SchemaViolation> {
    let longest = files.iter().map(Vec::len).max().unwrap_or_default();
    for (party, file) in Party::ALL.into_iter().zip(files) {
        if file.len() != longest {
            return Err(SchemaViolation::PartyFileLength {
                party,
                expected: longest,
                actual: file.len(),
            });
        }
    }
    Ok(())
}

struct Siblings<'a>([&'a TraceRecord; 3]);

impl<'a> Siblings<'a> {
    fn iter(&self) -> impl Iterator<Item = &'a TraceRecord> + '_ {
        self.0.iter().copied()
    }

    fn into_party_records(self) -> PartyRecords {
        let [helper, p1, p2] = self.0;
        PartyRecords {
            helper: helper.clone(),
            p1: p1.clone(),
            p2: p2.clone(),
        }
    }
}

fn pick<'a>(
    helper: &'a [TraceRecord],
    p1: &'a [TraceRecord],
    p2: &'a [TraceRecord],
    index: usize,
) -> Option<Siblings<'a>> {
    Some(Siblings([helper.get(index)?, p1.get(index)?, p2.get(index)?]))
}

/// Reads all records of a trace file, skipping blank lines.
///
/// A file that does not exist belongs to a benchmark that was never run and yields no records.
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceRecord>, LoadError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "trace file does not exist");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(LoadError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let records = parse_records(BufReader::new(file), path)?;
    debug!(path = %path.display(), records = records.len(), "trace file loaded");
    Ok(records)
}

fn parse_records(reader: impl BufRead, path: &Path) -> Result<Vec<TraceRecord>, LoadError> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            line: i + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Measure;

    const RECORD: &str = r#"{"details":{"pid":0,"nodes":4,"D":0},"benchmarks_pre":[{"communication":[8],"time":1.0}],"benchmarks":[{"communication":[0],"time":1.0}],"stats":{"peak_virtual_memory":64}}"#;

    #[test]
    fn skips_blank_lines_and_reports_line_numbers() {
        let input = format!("{RECORD}\n\n{RECORD}\n");
        let records = parse_records(input.as_bytes(), Path::new("p0/x.txt")).unwrap();
        assert_eq!(records.len(), 2);

        let input = format!("{RECORD}\n\n{{\"details\": 3}}\n");
        let err = parse_records(input.as_bytes(), Path::new("p0/x.txt")).unwrap_err();
        assert!(matches!(err, LoadError::Parse { line: 3, .. }));
        assert!(err.to_string().contains("p0/x.txt"));
    }

    #[test]
    fn nonexistent_file_has_no_records() {
        let dir = tempfile::tempdir().unwrap();
        let records = read_trace_file(&dir.path().join("p0/output_pi_1_higgs.txt")).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn party_files_must_have_equal_length() {
        let record: TraceRecord = serde_json::from_str(RECORD).unwrap();
        let complete = [vec![record.clone()], vec![record.clone()], vec![record.clone()]];
        assert!(check_file_lengths(&complete).is_ok());
        assert!(check_file_lengths(&[vec![], vec![], vec![]]).is_ok());

        let truncated = [vec![record.clone(), record.clone()], vec![record.clone()], vec![]];
        assert_eq!(
            check_file_lengths(&truncated),
            Err(SchemaViolation::PartyFileLength {
                party: Party::P1,
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn configured_ring_bits_are_enforced() {
        let config = AnalysisConfig {
            ring_bits: 64,
            ..AnalysisConfig::default()
        };
        assert_eq!(TraceLoader::from_config(&config).ring_bits, Some(64));
        assert_eq!(TraceLoader::new("bench").ring_bits, None);
    }

    #[test]
    fn paths_use_party_directories() {
        let loader = TraceLoader::new("bench");
        assert_eq!(
            loader.trace_path(
                Party::P2,
                Variant::ours(Measure::Pi3),
                &TraceCase::SizeSweep { factor: 11 },
                Network::Lan,
                1
            ),
            Path::new("bench/p2/output_pi_3_11_d1.txt")
        );
    }
}
