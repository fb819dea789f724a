// ABOUTME: Typed access to the key-value store: credentials, OAuth state, channels, subscriptions
// ABOUTME: Values are JSON-encoded under stable, per-user key names
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::kv::KvStore;
use crate::model::{SubscriptionStatus, UserCredential};

pub const CALENDAR_EVENTS_KEY: &str = "calendar_events";
pub const NOTIFICATION_CHANNEL_KEY: &str = "notification_channel";

pub fn credential_key(user_id: &str) -> String {
    format!("user_{}", user_id)
}

pub fn oauth_state_key(user_id: &str) -> String {
    format!("oauth_state_{}", user_id)
}

pub fn subscription_key(user_id: &str) -> String {
    format!("subscription_{}", user_id)
}

#[derive(Clone)]
pub struct BridgeStore {
    kv: Arc<dyn KvStore>,
}

impl BridgeStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    pub(crate) fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.kv.get(key)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Failed to decode stored value for {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)
            .with_context(|| format!("Failed to encode value for {}", key))?;
        self.kv.set(key, &bytes)
    }

    // =========================================================================
    // Credentials
    // =========================================================================

    /// Load the user's provider credential; absent means the user never connected
    pub fn credential(&self, user_id: &str) -> BridgeResult<UserCredential> {
        self.get_json::<UserCredential>(&credential_key(user_id))
            .context("Failed to load user credential")
            .map_err(BridgeError::Store)?
            .ok_or_else(|| BridgeError::NotConnected(user_id.to_string()))
    }

    pub fn save_credential(&self, user_id: &str, credential: &UserCredential) -> Result<()> {
        self.set_json(&credential_key(user_id), credential)
            .context("Failed to store user credential")
    }

    // =========================================================================
    // OAuth handshake state
    // =========================================================================

    pub fn oauth_state(&self, user_id: &str) -> Result<Option<String>> {
        let raw = self
            .kv
            .get(&oauth_state_key(user_id))
            .context("Failed to load OAuth state")?;
        Ok(raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn save_oauth_state(&self, user_id: &str, token: &str) -> Result<()> {
        self.kv
            .set(&oauth_state_key(user_id), token.as_bytes())
            .context("Failed to store OAuth state")
    }

    /// Consume the stored state if it equals `token`; false when absent or different
    pub fn take_oauth_state(&self, user_id: &str, token: &str) -> Result<bool> {
        self.kv
            .compare_and_delete(&oauth_state_key(user_id), token.as_bytes())
            .context("Failed to consume OAuth state")
    }

    pub fn clear_oauth_state(&self, user_id: &str) -> Result<()> {
        self.kv
            .delete(&oauth_state_key(user_id))
            .context("Failed to clear OAuth state")
    }

    // =========================================================================
    // Notification channel and subscription status
    // =========================================================================

    /// Store the provider's channel response verbatim
    pub fn save_channel(&self, raw: &str) -> Result<()> {
        self.kv
            .set(NOTIFICATION_CHANNEL_KEY, raw.as_bytes())
            .context("Failed to store notification channel")
    }

    pub fn channel(&self) -> Result<Option<String>> {
        let raw = self
            .kv
            .get(NOTIFICATION_CHANNEL_KEY)
            .context("Failed to load notification channel")?;
        Ok(raw.map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }

    pub fn subscription_status(&self, user_id: &str) -> Result<Option<SubscriptionStatus>> {
        self.get_json(&subscription_key(user_id))
            .context("Failed to load subscription status")
    }

    pub fn save_subscription_status(&self, user_id: &str, status: &SubscriptionStatus) -> Result<()> {
        self.set_json(&subscription_key(user_id), status)
            .context("Failed to store subscription status")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use crate::model::SubscriptionState;

    fn store() -> BridgeStore {
        BridgeStore::new(Arc::new(MemoryKvStore::new()))
    }

    #[test]
    fn test_missing_credential_is_not_connected() {
        let store = store();
        let err = store.credential("u1").unwrap_err();
        assert!(matches!(err, BridgeError::NotConnected(ref id) if id == "u1"));
    }

    #[test]
    fn test_credential_round_trip_uses_user_key() {
        let store = store();
        let cred = UserCredential {
            access_token: "tok".into(),
            sub: "acc_sub".into(),
            ..Default::default()
        };
        store.save_credential("u1", &cred).unwrap();
        assert!(store.kv().get("user_u1").unwrap().is_some());
        assert_eq!(store.credential("u1").unwrap(), cred);
    }

    #[test]
    fn test_corrupt_credential_is_store_error() {
        let store = store();
        store.kv().set("user_u1", b"not json").unwrap();
        assert!(matches!(
            store.credential("u1").unwrap_err(),
            BridgeError::Store(_)
        ));
    }

    #[test]
    fn test_oauth_state_lifecycle() {
        let store = store();
        assert_eq!(store.oauth_state("u1").unwrap(), None);
        store.save_oauth_state("u1", "abc").unwrap();
        assert_eq!(store.oauth_state("u1").unwrap().as_deref(), Some("abc"));
        store.clear_oauth_state("u1").unwrap();
        assert_eq!(store.oauth_state("u1").unwrap(), None);
    }

    #[test]
    fn test_subscription_status_round_trip() {
        let store = store();
        let status = SubscriptionStatus {
            state: SubscriptionState::Failed,
            detail: Some("boom".into()),
            attempts: 3,
            updated_at: "2024-01-01T00:00:00+00:00".into(),
        };
        store.save_subscription_status("u1", &status).unwrap();
        assert_eq!(store.subscription_status("u1").unwrap(), Some(status));
    }
}
