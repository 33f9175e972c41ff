use crate::errors::AuthErr;
use httpkit::{Context, StatusError};

/// Resolves the caller from its token.
pub struct Auth {
    #[param(header, name = "Authorization", security)]
    pub token: String,
    #[param(query, name = "tenant")]
    pub tenant: Option<String>,
}

impl Auth {
    pub fn context_key(&self) -> &'static str {
        "auth"
    }

    pub fn output(&self, ctx: &Context) -> Result<(), StatusError> {
        if self.token.is_empty() {
            return Err(AuthErr::Unauthorized.into());
        }
        Ok(())
    }
}
