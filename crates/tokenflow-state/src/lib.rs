//! tokenflow tracked state
//!
//! Persists the last-known remote attributes of every managed resource so the
//! lifecycle controllers can diff, refresh and detect drift between runs.
//!
//! # Layout
//!
//! ```text
//! <project>/.tokenflow/
//! ├── state.json          current state
//! ├── state.json.backup   previous state (rotated on every save)
//! └── lock.json           advisory lock held while a command runs
//! ```
//!
//! Records are keyed by `<resource_type>.<address>`, for example
//! `cloudflare_user_token.ci`.

pub mod error;
pub mod state;

// Re-exports
pub use error::{Result, StateError};
pub use state::{GlobalState, ResourceState, StateLock, StateManager, resource_key};
