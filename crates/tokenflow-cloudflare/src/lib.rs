//! Cloudflare user tokens for tokenflow
//!
//! This crate manages a Cloudflare API "user token" declaratively: the
//! manifest names the token and lists its policies, and the lifecycle
//! controller converges the remote token and records what it observed.
//!
//! # Components
//!
//! - [`policy`]: translation between manifest policy blocks and API policies
//! - [`api`]: the remote client contract and its reqwest implementation
//! - [`resource`]: create/read/update/delete with drift handling
//!
//! # Requirements
//!
//! `CLOUDFLARE_API_TOKEN`, or `CLOUDFLARE_EMAIL` + `CLOUDFLARE_API_KEY`.
//!
//! # Example
//!
//! ```ignore
//! use tokenflow_cloudflare::{
//!     ApiConfig, CloudflareClient, DesiredToken, PolicyBlock, UserTokenResource, UserTokenState,
//! };
//!
//! let client = CloudflareClient::new(ApiConfig::from_env()?);
//! let resource = UserTokenResource::new(client);
//!
//! let desired = DesiredToken::new(
//!     "ci-token",
//!     vec![PolicyBlock::new(["com.cloudflare.api.account.zone.123"], ["pg-1"])],
//! );
//! let mut state = UserTokenState::default();
//! resource.create(&desired, &mut state).await?;
//!
//! // Later: None means the token was deleted out of band
//! if resource.read(&mut state).await?.is_none() {
//!     println!("token is gone");
//! }
//! ```

pub mod api;
pub mod error;
pub mod model;
pub mod policy;
pub mod resource;

pub use api::{ApiConfig, ApiCredentials, CloudflareClient, DeletedToken, UserTokenApi};
pub use error::{CloudflareError, Result, TokenError};
pub use model::{
    DesiredToken, PermissionGroupRef, PolicyEffect, SecretValue, TokenVerification, UserToken,
    UserTokenPolicy,
};
pub use policy::{PolicyBlock, dedup_blocks, from_remote, same_policy_set, to_remote};
pub use resource::{RESOURCE_TYPE, UserTokenResource, UserTokenState};
