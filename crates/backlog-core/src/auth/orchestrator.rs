use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use url::Url;

use super::browser::run_loopback_flow;
use super::manual::run_manual_flow;
use super::{AuthError, AuthFlow, AuthSession, CredentialStore, FlowPreference, OAuthClient};

/// Host hooks invoked around the interactive authorization wait.
///
/// A host that must pause its own processing while the user is in the browser
/// implements this; `resume` runs whether the flow succeeded or not.
pub trait AuthLifecycle {
    fn suspend(&self) {}
    fn resume(&self) {}
}

/// Lifecycle that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycle;

impl AuthLifecycle for NoopLifecycle {}

/// Coordinates authentication flows, the token cache, and token refresh.
pub struct AuthManager<S> {
    store: Arc<Mutex<S>>,
    oauth: OAuthClient,
    refresh_window: Duration,
}

impl<S> AuthManager<S>
where
    S: CredentialStore + Send + Sync + 'static,
{
    pub fn new(store: S, oauth: OAuthClient) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            oauth,
            refresh_window: Duration::minutes(5),
        }
    }

    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    pub async fn current_session(&self) -> Result<Option<AuthSession>, AuthError> {
        let store = self.store.lock().await;
        store.load()
    }

    /// Load the cached session, refreshing and re-persisting it when close to expiry.
    pub async fn ensure_fresh_session(&self) -> Result<Option<AuthSession>, AuthError> {
        if let Some(mut session) = self.current_session().await? {
            if session.will_expire_within(self.refresh_window) {
                tracing::debug!("cached token close to expiry, refreshing");
                session = self.oauth.refresh_session(&session).await?;
                self.persist(session.clone()).await?;
            }
            return Ok(Some(session));
        }
        Ok(None)
    }

    /// Produce a usable session: cached when possible, interactive otherwise.
    ///
    /// A cached token that cannot be decoded, or whose refresh is rejected by the
    /// token endpoint, is dropped and the interactive flow runs instead. Any other
    /// failure propagates.
    pub async fn authenticate<L, Notify, Input, Fut>(
        &self,
        preference: &FlowPreference,
        lifecycle: &L,
        notify: Notify,
        read_input: Input,
    ) -> Result<AuthSession, AuthError>
    where
        L: AuthLifecycle + ?Sized,
        Notify: Fn(&Url) -> Result<(), AuthError>,
        Input: FnMut() -> Fut,
        Fut: Future<Output = Result<String, AuthError>>,
    {
        match self.ensure_fresh_session().await {
            Ok(Some(session)) => return Ok(session),
            Ok(None) => {}
            Err(
                err @ (AuthError::TokenEndpoint { .. }
                | AuthError::RefreshUnavailable
                | AuthError::Serde(_)),
            ) => {
                tracing::warn!(error = %err, "discarding cached credentials");
                self.logout().await?;
            }
            Err(err) => return Err(err),
        }

        lifecycle.suspend();
        let result = self
            .authenticate_interactive(preference, notify, read_input)
            .await;
        lifecycle.resume();
        result
    }

    async fn authenticate_interactive<Notify, Input, Fut>(
        &self,
        preference: &FlowPreference,
        notify: Notify,
        read_input: Input,
    ) -> Result<AuthSession, AuthError>
    where
        Notify: Fn(&Url) -> Result<(), AuthError>,
        Input: FnMut() -> Fut,
        Fut: Future<Output = Result<String, AuthError>>,
    {
        if preference.preferred() == AuthFlow::Browser {
            match self
                .authenticate_browser(preference.browser_available(), &notify)
                .await
            {
                Err(err @ (AuthError::BrowserLaunch(_) | AuthError::NonLoopbackRedirect(_))) => {
                    tracing::warn!(error = %err, "falling back to manual authorization");
                }
                other => return other,
            }
        }
        self.authenticate_manual(false, notify, read_input).await
    }

    pub async fn authenticate_browser<F>(
        &self,
        open_browser: bool,
        notify: F,
    ) -> Result<AuthSession, AuthError>
    where
        F: Fn(&Url) -> Result<(), AuthError>,
    {
        let session = run_loopback_flow(&self.oauth, open_browser, notify).await?;
        self.persist(session.clone()).await?;
        Ok(session)
    }

    pub async fn authenticate_manual<Notify, Input, Fut>(
        &self,
        open_browser: bool,
        notify: Notify,
        read_input: Input,
    ) -> Result<AuthSession, AuthError>
    where
        Notify: Fn(&Url) -> Result<(), AuthError>,
        Input: FnMut() -> Fut,
        Fut: Future<Output = Result<String, AuthError>>,
    {
        let session = run_manual_flow(&self.oauth, open_browser, notify, read_input).await?;
        self.persist(session.clone()).await?;
        Ok(session)
    }

    async fn persist(&self, session: AuthSession) -> Result<(), AuthError> {
        let store = self.store.lock().await;
        store.save(&session)
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        let store = self.store.lock().await;
        store.delete()
    }
}
