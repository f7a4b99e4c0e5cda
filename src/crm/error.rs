use thiserror::Error;

use crate::auth::error::AuthError;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Field metadata for a module could not be obtained.
    #[error("Schema discovery failed for module '{module}': {message}")]
    SchemaFetch { module: String, message: String },

    /// A page request failed. The whole fetch is abandoned.
    #[error("Fetch failed for module '{module}' (field batch {chunk}, page {page}): {cause}")]
    Fetch {
        module: String,
        chunk: usize,
        page: u32,
        cause: String,
    },

    #[error("Invalid fetch options: {0}")]
    InvalidOptions(String),

    #[error("Error fetching organizations: {0}")]
    Organizations(String),
}

impl CrmError {
    /// True when the failure originated in the token lifecycle, which means
    /// no module request was made.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}
