//! Lifecycle of a `cloudflare_user_token` resource
//!
//! [`UserTokenResource`] runs create/read/update/delete against a
//! [`UserTokenApi`] and reconciles the responses into a [`UserTokenState`].
//!
//! ```text
//! Unmanaged ──create──▶ Present ──update*──▶ Present ──delete──▶ Unmanaged
//!                          │
//!                          └──read (not found)──▶ Unmanaged
//! ```

use crate::api::UserTokenApi;
use crate::error::{Result, TokenError};
use crate::model::{DesiredToken, SecretValue, UserToken, format_timestamp};
use crate::policy::{PolicyBlock, dedup_blocks, from_remote, to_remote};
use serde::{Deserialize, Serialize};
use tokenflow_state::ResourceState;

/// Resource type name used for state keys
pub const RESOURCE_TYPE: &str = "cloudflare_user_token";

/// Tracked attributes of a user token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTokenState {
    /// Remote id; `None` while the token is unmanaged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    /// Secret returned on creation. Never refreshed afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SecretValue>,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub issued_on: Option<String>,

    #[serde(default)]
    pub modified_on: Option<String>,

    #[serde(default)]
    pub policy: Vec<PolicyBlock>,
}

impl UserTokenState {
    pub fn is_managed(&self) -> bool {
        self.id.is_some()
    }

    /// Decode from a state store record
    pub fn from_record(record: &ResourceState) -> Result<Self> {
        Ok(record.attributes()?)
    }

    /// Encode as a new state store record
    pub fn to_record(&self) -> Result<ResourceState> {
        Ok(ResourceState::from_attributes(RESOURCE_TYPE, self)?)
    }

    fn managed_id(&self) -> Result<String> {
        self.id.clone().ok_or(TokenError::NotManaged)
    }

    /// Copy server-computed timestamps and status
    fn apply_computed(&mut self, token: &UserToken) {
        self.status = token.status.clone();
        self.issued_on = token.issued_on.as_ref().map(format_timestamp);
        self.modified_on = token.modified_on.as_ref().map(format_timestamp);
    }

    /// Overwrite everything observable from the API. `value` is left alone.
    fn apply_observed(&mut self, token: &UserToken) {
        self.name = token.name.clone();
        self.policy = from_remote(&token.policies);
        self.apply_computed(token);
    }
}

/// Lifecycle controller for user tokens
pub struct UserTokenResource<C> {
    client: C,
}

impl<C: UserTokenApi> UserTokenResource<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Create the token and start tracking it
    ///
    /// The tracked state is only written once the API call succeeded.
    pub async fn create(
        &self,
        desired: &DesiredToken,
        state: &mut UserTokenState,
    ) -> Result<UserToken> {
        if let Some(id) = &state.id {
            return Err(TokenError::AlreadyManaged(id.clone()));
        }
        desired.validate()?;

        let blocks = dedup_blocks(&desired.policy);
        let policies = to_remote(&blocks);

        tracing::info!("Creating Cloudflare user token: name {}", desired.name);

        let token = self
            .client
            .create_user_token(&desired.name, &policies)
            .await
            .map_err(|source| TokenError::CreateFailed {
                name: desired.name.clone(),
                source,
            })?;

        state.id = Some(token.id.clone());
        state.name = desired.name.clone();
        state.policy = blocks;
        state.value = token.value.clone();
        state.apply_computed(&token);

        tracing::info!("Created Cloudflare user token {} ({})", token.id, state.status);
        Ok(token)
    }

    /// Refresh the tracked state from the API
    ///
    /// Returns `Ok(None)` and clears the tracked id when the token no longer
    /// exists remotely. Other failures leave the state untouched.
    pub async fn read(&self, state: &mut UserTokenState) -> Result<Option<UserToken>> {
        let id = state.managed_id()?;

        let token = match self.client.user_token(&id).await {
            Ok(token) => token,
            Err(e) if e.is_not_found() => {
                tracing::info!("Cloudflare user token {} no longer exists", id);
                state.id = None;
                return Ok(None);
            }
            Err(source) => return Err(TokenError::ReadFailed { id, source }),
        };

        tracing::debug!("Cloudflare user token: {:?}", token);

        state.apply_observed(&token);
        Ok(Some(token))
    }

    /// Push the desired name and policies to an existing token
    ///
    /// The whole tracked record is refreshed from the response, except the
    /// secret value.
    pub async fn update(
        &self,
        desired: &DesiredToken,
        state: &mut UserTokenState,
    ) -> Result<UserToken> {
        let id = state.managed_id()?;
        desired.validate()?;

        let request = UserToken {
            id,
            name: desired.name.clone(),
            policies: to_remote(&dedup_blocks(&desired.policy)),
            ..Default::default()
        };

        tracing::info!("Updating Cloudflare user token: name {}", desired.name);

        let token = self
            .client
            .update_user_token(&request)
            .await
            .map_err(|source| TokenError::UpdateFailed {
                name: desired.name.clone(),
                source,
            })?;

        state.apply_observed(&token);
        Ok(token)
    }

    /// Delete the remote token
    ///
    /// Clearing the tracked record is left to the caller.
    pub async fn delete(&self, state: &UserTokenState) -> Result<()> {
        let id = state.managed_id()?;

        tracing::info!("Deleting Cloudflare user token: id {}", id);

        self.client
            .delete_user_token(&id)
            .await
            .map_err(|source| TokenError::DeleteFailed { id, source })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiResult, DeletedToken};
    use crate::error::CloudflareError;
    use crate::model::{PolicyEffect, TokenVerification, UserTokenPolicy};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the Cloudflare API
    #[derive(Default)]
    struct FakeApi {
        tokens: Mutex<BTreeMap<String, UserToken>>,
        create_calls: Mutex<Vec<(String, Vec<UserTokenPolicy>)>>,
        fail_with: Mutex<Option<CloudflareError>>,
        updates: Mutex<u32>,
    }

    impl FakeApi {
        fn fail_next(&self, err: CloudflareError) {
            *self.fail_with.lock().unwrap() = Some(err);
        }

        fn take_failure(&self) -> ApiResult<()> {
            match self.fail_with.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }

        fn not_found() -> CloudflareError {
            CloudflareError::Api {
                status: 404,
                message: "Not Found".to_string(),
            }
        }

        fn remote(&self, id: &str) -> UserToken {
            self.tokens.lock().unwrap()[id].clone()
        }
    }

    #[async_trait]
    impl UserTokenApi for FakeApi {
        async fn create_user_token(
            &self,
            name: &str,
            policies: &[UserTokenPolicy],
        ) -> ApiResult<UserToken> {
            self.create_calls
                .lock()
                .unwrap()
                .push((name.to_string(), policies.to_vec()));
            self.take_failure()?;

            let mut tokens = self.tokens.lock().unwrap();
            let id = format!("tok-{}", tokens.len() + 1);
            let issued = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
            let token = UserToken {
                id: id.clone(),
                name: name.to_string(),
                value: Some(SecretValue::new("secret-xyz")),
                status: "active".to_string(),
                issued_on: Some(issued),
                modified_on: Some(issued),
                policies: policies.to_vec(),
                ..Default::default()
            };
            let mut stored = token.clone();
            stored.value = None;
            tokens.insert(id, stored);
            Ok(token)
        }

        async fn user_token(&self, id: &str) -> ApiResult<UserToken> {
            self.take_failure()?;
            self.tokens
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(Self::not_found)
        }

        async fn update_user_token(&self, token: &UserToken) -> ApiResult<UserToken> {
            self.take_failure()?;
            let mut updates = self.updates.lock().unwrap();
            *updates += 1;

            let mut tokens = self.tokens.lock().unwrap();
            let stored = tokens.get_mut(&token.id).ok_or_else(Self::not_found)?;
            stored.name = token.name.clone();
            stored.policies = token.policies.clone();
            stored.modified_on = stored
                .modified_on
                .map(|t| t + Duration::seconds(i64::from(*updates)));

            // Some API versions echo a value back; it must never be tracked.
            let mut response = stored.clone();
            response.value = Some(SecretValue::new("rotated-by-server"));
            Ok(response)
        }

        async fn delete_user_token(&self, id: &str) -> ApiResult<DeletedToken> {
            self.take_failure()?;
            self.tokens
                .lock()
                .unwrap()
                .remove(id)
                .map(|_| DeletedToken { id: id.to_string() })
                .ok_or_else(Self::not_found)
        }

        async fn verify_user_token(&self) -> ApiResult<TokenVerification> {
            Ok(TokenVerification {
                id: "self".to_string(),
                status: "active".to_string(),
                expires_on: None,
            })
        }
    }

    fn ci_token() -> DesiredToken {
        DesiredToken::new("ci-token", vec![PolicyBlock::new(["zone:123"], ["pg-1"])])
    }

    async fn created() -> (UserTokenResource<FakeApi>, UserTokenState) {
        let resource = UserTokenResource::new(FakeApi::default());
        let mut state = UserTokenState::default();
        resource.create(&ci_token(), &mut state).await.unwrap();
        (resource, state)
    }

    #[tokio::test]
    async fn test_create_sends_single_call_and_tracks_secret() {
        let resource = UserTokenResource::new(FakeApi::default());
        let mut state = UserTokenState::default();

        resource.create(&ci_token(), &mut state).await.unwrap();

        let calls = resource.client().create_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "ci-token");
        assert_eq!(
            serde_json::to_value(&calls[0].1).unwrap(),
            json!([{
                "effect": "allow",
                "resources": {"zone:123": "*"},
                "permission_groups": [{"id": "pg-1"}]
            }])
        );

        assert_eq!(state.id.as_deref(), Some("tok-1"));
        assert_eq!(state.value.as_ref().map(|v| v.expose()), Some("secret-xyz"));
        assert_eq!(state.status, "active");
        assert_eq!(
            state.issued_on.as_deref(),
            Some("2024-05-01T10:00:00.000000000Z")
        );
    }

    #[tokio::test]
    async fn test_create_failure_leaves_state_unmanaged() {
        let resource = UserTokenResource::new(FakeApi::default());
        resource.client().fail_next(CloudflareError::Api {
            status: 400,
            message: "bad policy".to_string(),
        });
        let mut state = UserTokenState::default();

        let err = resource.create(&ci_token(), &mut state).await.unwrap_err();

        assert!(matches!(err, TokenError::CreateFailed { ref name, .. } if name == "ci-token"));
        assert_eq!(state, UserTokenState::default());
    }

    #[tokio::test]
    async fn test_create_collapses_identical_blocks() {
        let resource = UserTokenResource::new(FakeApi::default());
        let mut state = UserTokenState::default();
        let desired = DesiredToken::new(
            "ci-token",
            vec![
                PolicyBlock::new(["zone:1"], ["pg-1"]),
                PolicyBlock::new(["zone:1", "zone:1"], ["pg-1"]),
            ],
        );

        resource.create(&desired, &mut state).await.unwrap();

        assert_eq!(resource.client().create_calls.lock().unwrap()[0].1.len(), 1);
        assert_eq!(state.policy.len(), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_managed_state() {
        let (resource, mut state) = created().await;

        let err = resource.create(&ci_token(), &mut state).await.unwrap_err();
        assert!(matches!(err, TokenError::AlreadyManaged(ref id) if id == "tok-1"));
    }

    #[tokio::test]
    async fn test_read_refreshes_observed_fields_but_not_value() {
        let (resource, mut state) = created().await;
        {
            let mut tokens = resource.client().tokens.lock().unwrap();
            let remote = tokens.get_mut("tok-1").unwrap();
            remote.name = "renamed-in-dashboard".to_string();
            remote.status = "disabled".to_string();
            remote.policies[0]
                .resources
                .insert("zone:456".to_string(), "*".to_string());
        }

        let token = resource.read(&mut state).await.unwrap();

        assert!(token.is_some());
        assert_eq!(state.name, "renamed-in-dashboard");
        assert_eq!(state.status, "disabled");
        assert_eq!(state.policy[0].resources, vec!["zone:123", "zone:456"]);
        assert_eq!(state.value.as_ref().map(|v| v.expose()), Some("secret-xyz"));
    }

    #[tokio::test]
    async fn test_read_not_found_clears_identity() {
        let (resource, mut state) = created().await;
        resource.client().tokens.lock().unwrap().clear();

        let token = resource.read(&mut state).await.unwrap();

        assert!(token.is_none());
        assert!(!state.is_managed());
    }

    #[tokio::test]
    async fn test_read_not_found_by_message_clears_identity() {
        let (resource, mut state) = created().await;
        resource.client().fail_next(CloudflareError::Envelope(
            "error from makeRequest: HTTP status 404: content \"{}\"".to_string(),
        ));

        assert!(resource.read(&mut state).await.unwrap().is_none());
        assert_eq!(state.id, None);
    }

    #[tokio::test]
    async fn test_read_other_error_keeps_identity() {
        let (resource, mut state) = created().await;
        let before = state.clone();
        resource.client().fail_next(CloudflareError::Envelope(
            "error from makeRequest: HTTP status 500".to_string(),
        ));

        let err = resource.read(&mut state).await.unwrap_err();

        assert!(matches!(err, TokenError::ReadFailed { ref id, .. } if id == "tok-1"));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_read_requires_identity() {
        let resource = UserTokenResource::new(FakeApi::default());
        let mut state = UserTokenState::default();

        assert!(matches!(
            resource.read(&mut state).await,
            Err(TokenError::NotManaged)
        ));
    }

    #[tokio::test]
    async fn test_update_refreshes_record_and_never_touches_value() {
        let (resource, mut state) = created().await;
        let modified_before = state.modified_on.clone();
        let desired = DesiredToken::new(
            "ci-token-v2",
            vec![PolicyBlock::new(["zone:123", "zone:789"], ["pg-1", "pg-2"])],
        );

        let token = resource.update(&desired, &mut state).await.unwrap();

        assert_eq!(
            token.value.as_ref().map(|v| v.expose()),
            Some("rotated-by-server")
        );
        assert_eq!(state.value.as_ref().map(|v| v.expose()), Some("secret-xyz"));
        assert_eq!(state.name, "ci-token-v2");
        assert_eq!(state.policy[0].permission_groups, vec!["pg-1", "pg-2"]);
        assert_ne!(state.modified_on, modified_before);
        assert_eq!(resource.client().remote("tok-1").name, "ci-token-v2");
    }

    #[tokio::test]
    async fn test_update_failure_leaves_state_unchanged() {
        let (resource, mut state) = created().await;
        let before = state.clone();
        resource.client().fail_next(CloudflareError::Api {
            status: 403,
            message: "forbidden".to_string(),
        });

        let err = resource.update(&ci_token(), &mut state).await.unwrap_err();

        assert!(matches!(err, TokenError::UpdateFailed { ref name, .. } if name == "ci-token"));
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_update_requires_identity() {
        let resource = UserTokenResource::new(FakeApi::default());
        let mut state = UserTokenState::default();

        assert!(matches!(
            resource.update(&ci_token(), &mut state).await,
            Err(TokenError::NotManaged)
        ));
    }

    #[tokio::test]
    async fn test_delete_then_read_takes_not_found_path() {
        let (resource, mut state) = created().await;

        resource.delete(&state).await.unwrap();
        let token = resource.read(&mut state).await.unwrap();

        assert!(token.is_none());
        assert!(!state.is_managed());
    }

    #[tokio::test]
    async fn test_delete_twice_surfaces_client_error() {
        let (resource, state) = created().await;

        resource.delete(&state).await.unwrap();
        let err = resource.delete(&state).await.unwrap_err();

        assert!(matches!(err, TokenError::DeleteFailed { ref id, .. } if id == "tok-1"));
    }

    #[tokio::test]
    async fn test_state_record_round_trip() {
        let (_resource, state) = created().await;

        let record = state.to_record().unwrap();
        assert_eq!(record.resource_type, RESOURCE_TYPE);
        assert_eq!(UserTokenState::from_record(&record).unwrap(), state);
    }

    #[test]
    fn test_observed_deny_policy_is_flattened() {
        let mut state = UserTokenState::default();
        let token = UserToken {
            id: "tok-1".to_string(),
            name: "n".to_string(),
            policies: vec![UserTokenPolicy {
                id: None,
                effect: PolicyEffect::Deny,
                resources: BTreeMap::from([("zone:1".to_string(), "*".to_string())]),
                permission_groups: vec![],
            }],
            ..Default::default()
        };

        state.apply_observed(&token);
        assert_eq!(state.policy, vec![PolicyBlock::new(["zone:1"], Vec::<String>::new())]);
        assert_eq!(state.issued_on, None);
    }
}
