//! Validated sweeps over benchmark traces, ready for tables and plots.
//!
//! [`Analysis`] wires the loader, the aggregator, the differencer, the cost model and the
//! cross-validator together. Schema and invariant violations abort a sweep, since they invalidate
//! every number of the affected configuration. Validation failures are collected per point so that
//! a single regression does not hide the rest of the sweep.
use serde::Serialize;
use tracing::{Level, debug, instrument};

use crate::{
    Error,
    aggregate::AggregatedConfiguration,
    config::{AnalysisConfig, ConfigError},
    difference::{DerivedCostPoint, derive_cost_point},
    loader::TraceLoader,
    measured::Measured,
    model::{AnalyticalPrediction, CostModel, ModelError, ModelParams},
    protocol::{Family, Network, Variant},
    validate::{CrossValidator, ValidationFailure, ValidationResult},
};

/// The outcome of validating one measured point.
pub type Validation = Result<ValidationResult, ValidationFailure>;

/// A cost metric that can be selected for presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Metric {
    /// Preprocessing bytes.
    OfflineCommunication,
    /// Online bytes per computing party.
    OnlineCommunication,
    /// Bytes of all parties.
    TotalCommunication,
    /// Preprocessing time in milliseconds.
    OfflineTime,
    /// Online time in milliseconds.
    OnlineTime,
    /// Peak virtual memory in bytes.
    PeakMemory,
}

impl Metric {
    /// All metrics.
    pub const ALL: [Metric; 6] = [
        Metric::OfflineCommunication,
        Metric::OnlineCommunication,
        Metric::TotalCommunication,
        Metric::OfflineTime,
        Metric::OnlineTime,
        Metric::PeakMemory,
    ];

    /// The metric of an aggregated configuration.
    pub fn of(self, config: &AggregatedConfiguration) -> f64 {
        match self {
            Metric::OfflineCommunication => config.offline_communication as f64,
            Metric::OnlineCommunication => config.online_communication as f64,
            Metric::TotalCommunication => config.total_communication() as f64,
            Metric::OfflineTime => config.offline_time_ms,
            Metric::OnlineTime => config.online_time_ms,
            Metric::PeakMemory => config.peak_memory as f64,
        }
    }

    /// The one-time part of the metric.
    pub fn one_time(self, point: &DerivedCostPoint) -> f64 {
        self.of(&point.one_time)
    }

    /// The per-iteration part of the metric.
    pub fn per_iteration(self, point: &DerivedCostPoint) -> f64 {
        let cost = &point.per_iteration;
        match self {
            Metric::OfflineCommunication => cost.offline_communication as f64,
            Metric::OnlineCommunication => cost.online_communication as f64,
            Metric::TotalCommunication => {
                (cost.offline_communication + 2 * cost.online_communication) as f64
            }
            Metric::OfflineTime => cost.offline_time_ms,
            Metric::OnlineTime => cost.online_time_ms,
            Metric::PeakMemory => cost.memory_delta,
        }
    }
}

/// One depth of a dataset sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthSweepPoint {
    /// The depth of the point.
    pub depth: u32,
    /// The aggregated measurement, if the depth was benchmarked.
    pub measured: Measured<AggregatedConfiguration>,
    /// The analytical prediction, available whether or not the depth was benchmarked.
    pub prediction: AnalyticalPrediction,
    /// The validation of the measurement against the prediction.
    pub validation: Measured<Validation>,
}

impl DepthSweepPoint {
    /// The selected metric of the measurement.
    pub fn metric(&self, metric: Metric) -> Measured<f64> {
        self.measured.as_ref().map(|config| metric.of(config))
    }
}

/// One graph size of a size sweep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeSweepPoint {
    /// Index of the row in the sweep files.
    pub row: usize,
    /// Aggregated measurements at the family's differencing depths.
    pub configurations: Vec<Measured<AggregatedConfiguration>>,
    /// Validation of each measurement, in the same order.
    pub validations: Vec<Measured<Validation>>,
    /// One-time and per-iteration cost, if all depths were benchmarked.
    pub derived: Measured<DerivedCostPoint>,
}

impl SizeSweepPoint {
    /// The node count of the row, if any depth was benchmarked.
    pub fn nodes(&self) -> Option<u64> {
        self.configurations
            .iter()
            .find_map(|config| config.present().map(|config| config.nodes))
    }
}

/// The size sweep of one total-size factor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeSweep {
    /// The total-size factor, `None` for the reference protocol whose sweep does not depend on it.
    pub factor: Option<u64>,
    /// The analyzed rows.
    pub points: Vec<SizeSweepPoint>,
}

/// Produces validated cost records for the configured benchmark suite.
#[derive(Debug, Clone)]
pub struct Analysis {
    config: AnalysisConfig,
    loader: TraceLoader,
    model: CostModel,
    validator: CrossValidator,
}

impl Analysis {
    /// Creates an analysis of the configured benchmark suite.
    pub fn new(config: AnalysisConfig) -> Result<Self, Error> {
        config.validate()?;
        let loader = TraceLoader::from_config(&config);
        let model = CostModel::from_config(&config)?;
        Ok(Analysis {
            config,
            loader,
            model,
            validator: CrossValidator::new(),
        })
    }

    /// Replaces the cross-validator, e.g. to register additional known corrections.
    pub fn with_validator(mut self, validator: CrossValidator) -> Self {
        self.validator = validator;
        self
    }

    /// The configuration of the analysis.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Sweeps `variant` on `dataset` over all depths from the family minimum to the configured
    /// maximum depth.
    #[instrument(level = Level::DEBUG, skip(self), err)]
    pub fn depth_sweep(
        &self,
        variant: Variant,
        dataset: &str,
        network: Network,
    ) -> Result<Vec<DepthSweepPoint>, Error> {
        let dataset = self.config.dataset(dataset)?;
        let params = ModelParams {
            nodes: dataset.nodes,
            total_size: dataset.total_size,
            layers: dataset.layers,
        };
        let records = self
            .loader
            .load_depth_sweep(variant, dataset, network, self.config.max_depth)?;
        let mut sweep = Vec::with_capacity(records.len());
        for (depth, records) in (variant.min_depth()..).zip(records) {
            let measured = records.try_map(|records| records.aggregate())?;
            let prediction = self.model.predict(variant, params, depth)?;
            let validation = self.validate(&measured, &prediction)?;
            sweep.push(DepthSweepPoint {
                depth,
                measured,
                prediction,
                validation,
            });
        }
        debug!(points = sweep.len(), "depth sweep analyzed");
        Ok(sweep)
    }

    /// Sweeps `variant` over graph sizes with total size `factor * n`.
    ///
    /// The reference protocol's size sweep does not depend on the total size, so `factor` is only
    /// used to select the files of our protocol. The reference protocol is evaluated with the layer
    /// count its records state, falling back to the configured one.
    #[instrument(level = Level::DEBUG, skip(self), err)]
    pub fn size_sweep(
        &self,
        variant: Variant,
        factor: u64,
        network: Network,
    ) -> Result<Vec<SizeSweepPoint>, Error> {
        if factor == 0 {
            return Err(ConfigError::SizeFactor(factor).into());
        }
        let rows = self.loader.load_size_sweep(variant, factor, network)?;
        let mut sweep = Vec::with_capacity(rows.len());
        for row in rows {
            let mut configurations = Vec::with_capacity(row.slots.len());
            let mut validations = Vec::with_capacity(row.slots.len());
            for slot in row.slots {
                let (measured, validation) = match slot {
                    Measured::Present(records) => {
                        let config = records.aggregate()?;
                        let layers = records.helper.details.layers;
                        let params =
                            self.size_params(variant, factor, config.nodes, layers, config.depth)?;
                        let prediction = self.model.predict(variant, params, config.depth)?;
                        let measured = Measured::Present(config);
                        let validation = self.validate(&measured, &prediction)?;
                        (measured, validation)
                    }
                    Measured::Missing(missing) => {
                        (Measured::Missing(missing), Measured::Missing(missing))
                    }
                };
                configurations.push(measured);
                validations.push(validation);
            }
            let derived = derive_cost_point(variant.family, &configurations)?;
            sweep.push(SizeSweepPoint {
                row: row.row,
                configurations,
                validations,
                derived,
            });
        }
        debug!(points = sweep.len(), "size sweep analyzed");
        Ok(sweep)
    }

    /// Runs the size sweep of `variant` for every configured size factor, or once for the
    /// reference protocol.
    pub fn size_sweeps(&self, variant: Variant, network: Network) -> Result<Vec<SizeSweep>, Error> {
        match variant.family {
            Family::Ours => self
                .config
                .size_factors
                .iter()
                .map(|&factor| -> Result<SizeSweep, Error> {
                    Ok(SizeSweep {
                        factor: Some(factor),
                        points: self.size_sweep(variant, factor, network)?,
                    })
                })
                .collect(),
            Family::Reference => Ok(vec![SizeSweep {
                factor: None,
                // any factor selects the same files
                points: self.size_sweep(variant, 1, network)?,
            }]),
        }
    }

    /// Predicts the communication of `variant` at `depth` for each node count in `sizes`, with
    /// total size `factor * n`.
    pub fn analytical_size_curve(
        &self,
        variant: Variant,
        factor: u64,
        sizes: impl IntoIterator<Item = u64>,
        depth: u32,
    ) -> Result<Vec<AnalyticalPrediction>, Error> {
        if factor == 0 {
            return Err(ConfigError::SizeFactor(factor).into());
        }
        sizes
            .into_iter()
            .map(|nodes| -> Result<AnalyticalPrediction, Error> {
                let params = self.size_params(variant, factor, nodes, None, depth)?;
                Ok(self.model.predict(variant, params, depth)?)
            })
            .collect()
    }

    fn size_params(
        &self,
        variant: Variant,
        factor: u64,
        nodes: u64,
        layers: Option<u64>,
        depth: u32,
    ) -> Result<ModelParams, ModelError> {
        let total_size = match variant.family {
            Family::Ours => factor.checked_mul(nodes).ok_or(ModelError::Overflow {
                variant,
                nodes,
                depth,
            })?,
            Family::Reference => nodes,
        };
        Ok(ModelParams {
            nodes,
            total_size,
            layers: layers.unwrap_or(self.config.reference_layers),
        })
    }

    fn validate(
        &self,
        measured: &Measured<AggregatedConfiguration>,
        prediction: &AnalyticalPrediction,
    ) -> Result<Measured<Validation>, Error> {
        measured.as_ref().try_map(|config| {
            match self.validator.validate(config, prediction) {
                Ok(result) => Ok(Ok(result)),
                Err(Error::Validation(failure)) => Ok(Err(failure)),
                Err(err) => Err(err),
            }
        })
    }
}
