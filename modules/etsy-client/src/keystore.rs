use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EtsyError, Result};
use crate::types::TokenResponse;

const REFRESH_URL: &str = "https://api.etsy.com/v3/public/oauth/token";

/// Contents of keys.json: app keystring plus the OAuth token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtsyKeys {
    pub keystring: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Reads, caches, and refreshes the Etsy OAuth credentials. Refreshed tokens
/// are written back to the keys file so the next process start reuses them.
pub struct EtsyKeyStore {
    path: PathBuf,
    keys: Mutex<EtsyKeys>,
}

impl EtsyKeyStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path)?;
        let keys: EtsyKeys = serde_json::from_str(&raw)?;
        Ok(Self { path, keys: Mutex::new(keys) })
    }

    pub fn keystring(&self) -> String {
        self.keys.lock().expect("key store lock poisoned").keystring.clone()
    }

    pub fn access_token(&self) -> String {
        self.keys.lock().expect("key store lock poisoned").access_token.clone()
    }

    /// Exchange the refresh token for a new token pair and persist it.
    pub async fn refresh(&self, http: &reqwest::Client) -> Result<()> {
        let (keystring, refresh_token) = {
            let keys = self.keys.lock().expect("key store lock poisoned");
            (keys.keystring.clone(), keys.refresh_token.clone())
        };

        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", keystring.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];
        let resp = http.post(REFRESH_URL).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EtsyError::Api { status: status.as_u16(), message: body });
        }
        let token: TokenResponse = resp.json().await?;

        let snapshot = {
            let mut keys = self.keys.lock().expect("key store lock poisoned");
            keys.access_token = token.access_token;
            keys.refresh_token = token.refresh_token;
            keys.clone()
        };
        std::fs::write(&self.path, serde_json::to_string_pretty(&snapshot)?)?;
        info!("Refreshed Etsy access token");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_keys_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(
            &path,
            r#"{"keystring":"ks","access_token":"at","refresh_token":"rt"}"#,
        )
        .unwrap();

        let store = EtsyKeyStore::load(&path).unwrap();
        assert_eq!(store.keystring(), "ks");
        assert_eq!(store.access_token(), "at");
    }
}
