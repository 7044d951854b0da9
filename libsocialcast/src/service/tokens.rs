//! Access token refresh sweep
//!
//! Hosts run [`TokenRefresher::refresh_expiring`] periodically with the
//! accounts they store. Refreshed credentials are handed back to the caller
//! for storage; accounts whose refresh fails should be deactivated.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::{add_saturating, Clock};
use crate::error::{Result, SocialcastError};
use crate::health::AccountHealthTracker;
use crate::platforms::{OAuthTokens, PublisherFactory};
use crate::types::SocialAccount;

/// Result of refreshing one account
#[derive(Debug)]
pub enum TokenRefresh {
    Refreshed {
        account_id: String,
        platform: String,
        tokens: OAuthTokens,
        /// None when the platform did not report a lifetime
        expires_at: Option<DateTime<Utc>>,
    },
    /// Refresh was refused; the account needs re-authorization
    Deactivated {
        account_id: String,
        platform: String,
        error: String,
    },
}

impl TokenRefresh {
    pub fn account_id(&self) -> &str {
        match self {
            TokenRefresh::Refreshed { account_id, .. }
            | TokenRefresh::Deactivated { account_id, .. } => account_id,
        }
    }

    pub fn is_refreshed(&self) -> bool {
        matches!(self, TokenRefresh::Refreshed { .. })
    }
}

pub struct TokenRefresher {
    publishers: Arc<dyn PublisherFactory>,
    health: Arc<AccountHealthTracker>,
    clock: Arc<dyn Clock>,
    refresh_window: Duration,
}

impl TokenRefresher {
    pub fn new(
        publishers: Arc<dyn PublisherFactory>,
        health: Arc<AccountHealthTracker>,
        clock: Arc<dyn Clock>,
        refresh_window: Duration,
    ) -> Self {
        Self {
            publishers,
            health,
            clock,
            refresh_window,
        }
    }

    /// Active accounts with a refresh token whose access token expires within the window
    pub fn needs_refresh(&self, account: &SocialAccount) -> bool {
        let deadline = add_saturating(self.clock.now(), self.refresh_window);
        account.is_active
            && account.refresh_token.is_some()
            && account.token_expires_at.is_some_and(|at| at <= deadline)
    }

    /// Refresh every account that needs it; one failure never stops the others
    pub async fn refresh_expiring(&self, accounts: &[SocialAccount]) -> Vec<TokenRefresh> {
        let due: Vec<&SocialAccount> = accounts.iter().filter(|a| self.needs_refresh(a)).collect();
        if due.is_empty() {
            return Vec::new();
        }

        info!("Refreshing {} expiring access token(s)", due.len());
        join_all(due.into_iter().map(|account| self.refresh_one(account))).await
    }

    async fn request_tokens(&self, account: &SocialAccount) -> Result<OAuthTokens> {
        let publisher = self.publishers.publisher_for(account)?;
        let refresh_token = account.refresh_token.as_ref().ok_or_else(|| {
            SocialcastError::InvalidInput(format!("Account {} has no refresh token", account.id))
        })?;
        publisher.refresh_access_token(refresh_token).await
    }

    async fn refresh_one(&self, account: &SocialAccount) -> TokenRefresh {
        match self.request_tokens(account).await {
            Ok(tokens) => {
                let expires_at = tokens
                    .expires_in
                    .map(|d| add_saturating(self.clock.now(), d));
                self.health
                    .set_token_expiry(&account.platform, &account.id, expires_at);
                info!("Refreshed token for {}:{}", account.platform, account.id);
                TokenRefresh::Refreshed {
                    account_id: account.id.clone(),
                    platform: account.platform.clone(),
                    tokens,
                    expires_at,
                }
            }
            Err(e) => {
                warn!(
                    "Token refresh failed for {}:{}, deactivating: {}",
                    account.platform, account.id, e
                );
                self.health.record_auth_failure(&account.platform, &account.id);
                TokenRefresh::Deactivated {
                    account_id: account.id.clone(),
                    platform: account.platform.clone(),
                    error: e.to_string(),
                }
            }
        }
    }
}
