use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Invalid value '{value}' in column '{column}' at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("Config: {0}")]
    Config(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation: {0}")]
    Validation(String),

    #[error("{0}")]
    General(String),
}

#[cfg(feature = "python")]
impl From<RiskError> for pyo3::PyErr {
    fn from(err: RiskError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<pyo3::PyErr> for RiskError {
    fn from(err: pyo3::PyErr) -> Self {
        RiskError::General(err.to_string())
    }
}
