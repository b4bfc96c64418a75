use anyhow::{Context, Result};
use gcp_auth::{CustomServiceAccount, TokenProvider};

use crate::config::{ServiceAccountInfo, SCOPES};

/// OAuth2 bearer tokens for the service account, scoped to Drive and
/// Sheets. Tokens are cached and refreshed by the provider.
pub struct GoogleAuth {
    provider: CustomServiceAccount,
    scopes: &'static [&'static str],
}

impl GoogleAuth {
    pub fn new(credentials: &ServiceAccountInfo) -> Result<Self> {
        let provider = CustomServiceAccount::from_json(&credentials.raw)
            .context("loading service account key")?;
        Ok(Self {
            provider,
            scopes: SCOPES,
        })
    }

    pub async fn bearer(&self) -> Result<String> {
        let token = self
            .provider
            .token(self.scopes)
            .await
            .context("fetching OAuth token for service account")?;
        Ok(token.as_str().to_string())
    }
}
