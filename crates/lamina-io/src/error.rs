use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("no {kind} loader registered for data source type '{source_type}'")]
    UnregisteredType {
        kind: &'static str,
        source_type: String,
    },

    #[error("data source '{source_type}' is missing option '{option}'")]
    MissingOption { source_type: String, option: String },

    #[error("invalid data source option '{option}': {message}")]
    InvalidOption { option: String, message: String },

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("points data has no coordinate dimension '{0}'")]
    MissingDimension(String),

    #[error("failed to load {what}: {message}")]
    Load { what: String, message: String },

    #[error("operation aborted")]
    Aborted,
}

impl DataError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, DataError::Aborted)
    }

    /// Configuration mistakes, as opposed to transient load failures.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            DataError::UnregisteredType { .. }
                | DataError::MissingOption { .. }
                | DataError::InvalidOption { .. }
                | DataError::UnknownTable(_)
                | DataError::MissingColumn { .. }
                | DataError::MissingDimension(_)
        )
    }

    pub fn invalid_option(option: &str, message: impl ToString) -> Self {
        DataError::InvalidOption {
            option: option.to_string(),
            message: message.to_string(),
        }
    }
}
