use thiserror::Error;

use crate::voyage::ApiError;

/// Everything a component can fail with.
///
/// Local errors (all variants except [`EmbedderError::Api`]) are raised before any
/// request leaves the process. Remote failures are carried through untouched.
#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(
        "document is missing the '{field}' metadata field. All documents must have this field \
         to group contextualized chunks. You can change the field name with the \
         'source_id_field' parameter."
    )]
    MissingGroupingKey { field: String },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("no API key was given and the environment variable {env_var} is not set")]
    MissingApiKey { env_var: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}
