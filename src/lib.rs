//! Authentication gate for protected pages
//!
//! Every protected page runs an [`AuthGate`](gate::AuthGate) before it renders.
//! The gate decides whether the visiting session belongs to a signed-in,
//! authorized user, provisions the user's profile record and unblocks the page,
//! or sends the visitor back to the login page with a coarse reason code.
//!
//! The identity provider, the profile store, the page surface and the name
//! prompt are all injected, so each outcome can be reached without a backend.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use hub_gate::prelude::*;
//!
//! # async fn page(surface: Arc<dyn PageSurface>, prompt: Arc<dyn NamePrompt>) -> Result<(), Error> {
//! let app = AppRegistry::global().get_or_init(ProjectConfig::from_env()?)?;
//! let policy = AccessPolicy::new()
//!     .with_domain("eduversal.org")
//!     .with_allowlist(true);
//!
//! let gate = app.gate(policy, surface, prompt, GateOptions::default());
//! let ready = gate.ready();
//! tokio::spawn(gate.run());
//!
//! if let Some(context) = ready.wait().await {
//!     println!("signed in as {}", context.session.email);
//! }
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod gate;
pub mod migration;
pub mod policy;
pub mod store;
pub mod ui;

/// A convenience module for common imports
pub mod prelude {
    pub use crate::app::{App, AppRegistry};
    pub use crate::auth::{AuthState, IdentityProvider, Session};
    pub use crate::config::{GateOptions, ProjectConfig};
    pub use crate::error::{Error, StoreError};
    pub use crate::gate::{AuthContext, AuthGate, AuthReady, ErrorCode, GateOutcome, Redirect};
    pub use crate::migration::RoleSchema;
    pub use crate::policy::AccessPolicy;
    pub use crate::store::{EmailAllowlist, ProfileStore, UserProfile};
    pub use crate::ui::{NamePrompt, NavLink, PageSurface};
}
