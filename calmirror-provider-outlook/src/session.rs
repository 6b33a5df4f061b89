//! An Outlook session that refreshes itself before use.

use calmirror_core::CalMirrorResult;
use calmirror_core::session::{SessionData, TokenStore};
use tracing::debug;

use crate::app_config::AppConfig;
use crate::auth;

pub struct Session {
    account: String,
    data: SessionData,
    store: TokenStore,
}

impl Session {
    pub fn load(store: TokenStore, account: &str) -> CalMirrorResult<Self> {
        let data = store.load(account)?;
        Ok(Session {
            account: account.to_string(),
            data,
            store,
        })
    }

    /// A valid access token, refreshing and persisting the session first if it expired.
    pub async fn access_token(
        &mut self,
        http: &reqwest::Client,
        app: &AppConfig,
    ) -> CalMirrorResult<String> {
        if self.data.is_expired() {
            debug!(account = %self.account, "Refreshing Outlook access token");
            self.data = auth::refresh(http, app, &self.data).await?;
            self.store.save(&self.account, &self.data)?;
        }

        Ok(self.data.access_token.clone())
    }
}
