//! The crate-level error, gathering the errors of the individual pipeline stages.
use crate::{
    aggregate::InvariantViolation, config::ConfigError, loader::LoadError, measured::MissingData,
    model::ModelError, trace::SchemaViolation, validate::ValidationFailure,
};

/// A custom error type for loading, aggregating and validating benchmark traces.
///
/// Schema and invariant violations invalidate all numbers of the affected configuration and abort
/// its analysis. Validation failures are reported per data point by the sweeps in
/// [`crate::analysis`] and only surface here when a single point is validated directly.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A record's header does not match the identity expected for its slot.
    #[error("schema violation: {0}")]
    Schema(#[from] SchemaViolation),
    /// A cross-party communication invariant does not hold.
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
    /// A value was required, but the sweep has no data for it.
    #[error("missing data: {0}")]
    MissingData(MissingData),
    /// Measured communication deviates from the analytical model by an unknown amount.
    #[error("validation failure: {0}")]
    Validation(#[from] ValidationFailure),
    /// A trace file could not be read or parsed.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The analytical model was evaluated outside its domain.
    #[error("cost model: {0}")]
    Model(#[from] ModelError),
    /// The configuration is invalid.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether the error signals a potential regression of the benchmarked system's communication.
    pub fn is_validation_failure(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
