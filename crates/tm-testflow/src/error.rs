use thiserror::Error;
use tm_core::errors::{DefinitionError, LocationError};

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Cannot resolve test definitions of step '{step}': {source}")]
    Resolve {
        step: String,
        #[source]
        source: LocationError,
    },

    #[error("Step '{step}' references unknown step '{dependency}'.")]
    UnknownStep { step: String, dependency: String },

    #[error("Step '{0}' does not match any test definition.")]
    EmptyStep(String),

    #[error(transparent)]
    Definition(#[from] DefinitionError),
}

pub type Result<T> = std::result::Result<T, FlowError>;
