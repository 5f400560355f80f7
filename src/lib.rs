//! Aggregation, cost differencing and analytical cross-validation of three-party secure graph
//! computation benchmarks.
//!
//! The benchmarked protocols compute centrality measures on secret-shared graphs with a helper
//! party `P0` and two computing parties `P1` and `P2`. Each party writes a trace of its
//! communication, running time and memory. This crate turns those traces into trustworthy cost
//! records:
//!
//! - the three per-party records of a configuration are combined into one record while checking
//!   that the helper is silent online, the computing parties are silent offline and send equally
//!   much, and that communication is identical across repetitions,
//! - one-time setup cost is separated from the marginal cost of an iteration by differencing
//!   across depths,
//! - every measured communication figure is checked against closed-form cost formulas, allowing
//!   only a fixed table of documented implementation overheads.
//!
//! ## Main Components
//!
//! * [`loader`]: Reads per-party trace files and checks record identities.
//! * [`aggregate`]: The [`aggregate::aggregate`] function combining three party records.
//! * [`difference`]: Separates one-time from per-iteration cost.
//! * [`model`]: The analytical [`model::CostModel`].
//! * [`validate`]: The [`validate::CrossValidator`] and its table of known corrections.
//! * [`analysis`]: The [`analysis::Analysis`] facade producing validated sweeps.
//!
//! ## Example
//!
//! ```no_run
//! use graphsc_eval::{
//!     analysis::{Analysis, Metric},
//!     config::AnalysisConfig,
//!     protocol::{Measure, Network, Variant},
//! };
//!
//! # fn example() -> Result<(), graphsc_eval::Error> {
//! let config = AnalysisConfig::from_path("analysis.json")?;
//! let analysis = Analysis::new(config)?;
//! for point in analysis.depth_sweep(Variant::ours(Measure::Pi2), "aarhus", Network::Lan)? {
//!     let online = point.metric(Metric::OnlineTime);
//!     println!("depth {}: {:?} ms, {:?}", point.depth, online, point.validation);
//! }
//! # Ok(())
//! # }
//! ```
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod aggregate;
pub mod analysis;
pub mod config;
pub mod difference;
pub mod loader;
pub mod measured;
pub mod model;
pub mod protocol;
pub mod trace;
pub mod validate;

mod error;

pub use error::Error;
pub use measured::{Measured, MissingData};
