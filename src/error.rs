use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelationalError {
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No persistent entity registered for type '{0}'")]
    UnmappedType(String),

    #[error("Property '{property}' not found on entity '{entity}'")]
    UnknownProperty { entity: String, property: String },

    #[error("Cannot navigate path '{path}': {reason}")]
    Navigation { path: String, reason: String },

    #[error("Cannot convert {value} to {target}")]
    ConversionFailed { value: String, target: String },

    /// Failures raised by the interpreter while executing an action.
    #[error(transparent)]
    Interpreter(#[from] anyhow::Error),
}

impl RelationalError {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn navigation(path: impl ToString, reason: impl Into<String>) -> Self {
        Self::Navigation {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelationalError>;
