//! Synthesizes consistent per-party benchmark traces for tests and benchmarks.
//!
//! A [`ConfigurationFixture`] describes the aggregated cost of one configuration; it is expanded
//! into the three per-party trace records a real benchmark run would write. [`TraceDir`] lays those
//! records out in a temporary benchmark directory.
use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::Path,
};

use serde_json::{Value, json};
use tempfile::TempDir;

/// The aggregated cost of one configuration, expanded into per-party records on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigurationFixture {
    /// Depth written to every record.
    pub depth: u32,
    /// Node count written to every record.
    pub nodes: u64,
    /// Bytes sent by the helper during preprocessing.
    pub offline_bytes: u64,
    /// Bytes sent online by each computing party.
    pub online_bytes: u64,
    /// Preprocessing time of each repetition, per party.
    pub offline_times_ms: Vec<[f64; 3]>,
    /// Online time of each repetition, per party.
    pub online_times_ms: Vec<[f64; 3]>,
    /// Peak virtual memory per party.
    pub peak_memory: [u64; 3],
    /// Total graph size written to every record, if any.
    pub size: Option<u64>,
    /// Reference layer count written to every record, if any.
    pub layers: Option<u64>,
    /// Ring bit-width written to every record, if any.
    pub nmbr_bits: Option<u32>,
}

impl ConfigurationFixture {
    /// A configuration with a single repetition and identical times for all parties.
    pub fn new(depth: u32, nodes: u64, offline_bytes: u64, online_bytes: u64) -> Self {
        ConfigurationFixture {
            depth,
            nodes,
            offline_bytes,
            online_bytes,
            offline_times_ms: vec![[10.0; 3]],
            online_times_ms: vec![[20.0; 3]],
            peak_memory: [1 << 20; 3],
            size: None,
            layers: None,
            nmbr_bits: None,
        }
    }

    /// Sets the per-repetition times, given per party.
    pub fn with_times(mut self, offline: Vec<[f64; 3]>, online: Vec<[f64; 3]>) -> Self {
        assert_eq!(offline.len(), online.len(), "phases need equal repetitions");
        self.offline_times_ms = offline;
        self.online_times_ms = online;
        self
    }

    /// Sets the peak memory of each party.
    pub fn with_peak_memory(mut self, peak_memory: [u64; 3]) -> Self {
        self.peak_memory = peak_memory;
        self
    }

    /// Records the total graph size in the header.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Records the reference layer count in the header.
    pub fn with_layers(mut self, layers: u64) -> Self {
        self.layers = Some(layers);
        self
    }

    /// Records the ring bit-width in the header.
    pub fn with_ring_bits(mut self, nmbr_bits: u32) -> Self {
        self.nmbr_bits = Some(nmbr_bits);
        self
    }

    /// The records of the helper, `P1` and `P2`, in that order.
    pub fn party_records(&self) -> [Value; 3] {
        [0, 1, 2].map(|pid| self.record(pid))
    }

    fn record(&self, pid: usize) -> Value {
        let (offline, online) = match pid {
            0 => (vec![self.offline_bytes], vec![0]),
            // online traffic is recorded in two message classes
            _ => {
                let half = self.online_bytes / 2;
                (vec![0], vec![half, self.online_bytes - half])
            }
        };
        let samples = |times: &[[f64; 3]], communication: &[u64]| -> Vec<Value> {
            times
                .iter()
                .map(|time| json!({"communication": communication, "time": time[pid]}))
                .collect()
        };
        let mut details = json!({
            "pid": pid,
            "D": self.depth,
            "nodes": self.nodes,
            "repeat": self.online_times_ms.len(),
            "threads": 1,
        });
        let optional = [
            ("size", self.size),
            ("layers", self.layers),
            ("nmbr_bits", self.nmbr_bits.map(u64::from)),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                details[key] = json!(value);
            }
        }
        json!({
            "details": details,
            "benchmarks_pre": samples(&self.offline_times_ms, &offline),
            "benchmarks": samples(&self.online_times_ms, &online),
            "stats": {"peak_virtual_memory": self.peak_memory[pid]},
        })
    }
}

/// A temporary benchmark directory with one sub-directory per party.
#[derive(Debug)]
pub struct TraceDir {
    dir: TempDir,
}

impl TraceDir {
    /// Creates an empty benchmark directory with `p0`, `p1` and `p2` sub-directories.
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        for pid in 0..3 {
            fs::create_dir(dir.path().join(format!("p{pid}")))?;
        }
        Ok(TraceDir { dir })
    }

    /// The benchmark directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Appends a raw line to the file of one party.
    pub fn append_line(&self, pid: usize, file_name: &str, line: &str) -> io::Result<()> {
        let path = self.path().join(format!("p{pid}")).join(file_name);
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")
    }

    /// Appends the records of each configuration, one line per configuration, to the file of
    /// every party.
    pub fn append_configurations(
        &self,
        file_name: &str,
        configurations: &[ConfigurationFixture],
    ) -> io::Result<()> {
        for configuration in configurations {
            for (pid, record) in configuration.party_records().iter().enumerate() {
                self.append_line(pid, file_name, &record.to_string())?;
            }
        }
        Ok(())
    }

    /// Appends a record to the file of a single party.
    pub fn append_record(&self, pid: usize, file_name: &str, record: &Value) -> io::Result<()> {
        self.append_line(pid, file_name, &record.to_string())
    }
}
