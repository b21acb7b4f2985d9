mod browser;
mod credential_store;
mod error;
mod flow;
mod manual;
mod oauth;
mod orchestrator;
mod session;
mod utils;

pub use browser::run_loopback_flow;
pub use credential_store::{CredentialStore, FileCredentialStore};
pub use error::AuthError;
pub use flow::{AuthFlow, FlowPreference};
pub use manual::run_manual_flow;
pub use oauth::{OAuthClient, OAuthConfig, OAuthEndpoints};
pub use orchestrator::{AuthLifecycle, AuthManager, NoopLifecycle};
pub use session::AuthSession;
