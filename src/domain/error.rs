//! Domain error types.

/// Why a proposed trade could not be sized. Never escalated: the sizer turns
/// it into a zero size and the caller skips the trade.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("stop distance is zero for {symbol}")]
    ZeroStopDistance { symbol: String },

    #[error("stop for {symbol} is not on the losing side of entry")]
    StopOnWrongSide { symbol: String },

    #[error("no pip metadata for {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("invalid {field}: {value}")]
    NonPositive { field: &'static str, value: f64 },
}

/// Top-level error type for fxrisk.
#[derive(Debug, thiserror::Error)]
pub enum FxRiskError {
    #[error("position {id} not found or already closed")]
    PositionNotFound { id: u64 },

    #[error("no pip metadata for {symbol}")]
    UnknownSymbol { symbol: String },

    #[error("invalid order for {symbol}: {reason}")]
    InvalidOrder { symbol: String, reason: String },

    #[error("ledger lock poisoned")]
    LedgerPoisoned,

    #[error("{worker} loop panicked")]
    WorkerPanicked { worker: &'static str },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ValidationError> for FxRiskError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::UnknownSymbol { symbol } => FxRiskError::UnknownSymbol { symbol },
            other => FxRiskError::InvalidOrder {
                symbol: String::new(),
                reason: other.to_string(),
            },
        }
    }
}

impl From<&FxRiskError> for std::process::ExitCode {
    fn from(err: &FxRiskError) -> Self {
        let code: u8 = match err {
            FxRiskError::Io(_) | FxRiskError::Json(_) => 1,
            FxRiskError::ConfigParse { .. }
            | FxRiskError::ConfigMissing { .. }
            | FxRiskError::ConfigInvalid { .. } => 2,
            FxRiskError::Data { .. } | FxRiskError::Csv(_) => 3,
            FxRiskError::PositionNotFound { .. }
            | FxRiskError::UnknownSymbol { .. }
            | FxRiskError::InvalidOrder { .. }
            | FxRiskError::LedgerPoisoned
            | FxRiskError::WorkerPanicked { .. } => 4,
        };
        std::process::ExitCode::from(code)
    }
}
