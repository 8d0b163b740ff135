use crate::{BackendEvent, Host, Inbox};
use audion_core::SecretStore;
use audion_spotify::{AuthEvent, Authorizer};
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Unauthenticated,
    AwaitingCallback,
    Authenticated,
    Refreshing,
    Deauthenticated,
}

/// Drives an [`Authorizer`] through restore, browser hand-off, code exchange and
/// deauthorization, keeping the stored credential in step with it.
pub struct AuthorizationLifecycle {
    authorizer: Arc<dyn Authorizer>,
    secrets: Arc<dyn SecretStore>,
    host: Rc<dyn Host>,
    inbox: Inbox,
    key: String,
    phase: AuthPhase,
    forwarder: Option<JoinHandle<()>>,
    exchange: Option<JoinHandle<()>>,
}

impl AuthorizationLifecycle {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        secrets: Arc<dyn SecretStore>,
        host: Rc<dyn Host>,
        inbox: Inbox,
        key: impl Into<String>,
    ) -> Self {
        Self {
            authorizer,
            secrets,
            host,
            inbox,
            key: key.into(),
            phase: AuthPhase::Unauthenticated,
            forwarder: None,
            exchange: None,
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.phase
    }

    pub fn is_authorized(&self) -> bool {
        self.authorizer.is_authorized()
    }

    /// Starts forwarding authorizer events, then restores the stored credential or sends
    /// the user to the authorization page. Returns whether a credential was restored.
    pub fn start(&mut self) -> bool {
        if self.forwarder.is_none() {
            self.forwarder = Some(self.spawn_forwarder());
        }

        if self.restore() {
            return true;
        }
        self.begin_authorization();
        false
    }

    fn spawn_forwarder(&self) -> JoinHandle<()> {
        let mut events = self.authorizer.subscribe();
        let inbox = self.inbox.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if inbox.send(BackendEvent::Auth(event)).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "authorization events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn restore(&mut self) -> bool {
        let stored = match self.secrets.get_data(&self.key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %self.key, "no stored credential");
                return false;
            }
            Err(err) => {
                warn!(error=%err, "failed to read stored credential");
                return false;
            }
        };

        match self.authorizer.restore(&stored) {
            Ok(()) if self.authorizer.is_authorized() => {
                info!("restored stored credential");
                self.phase = AuthPhase::Authenticated;
                true
            }
            Ok(()) => {
                warn!("stored credential has expired and cannot be refreshed");
                self.forget();
                false
            }
            Err(err) => {
                warn!(error=%err, "stored credential is unusable");
                self.forget();
                false
            }
        }
    }

    /// Opens the authorization page in the user's browser.
    pub fn begin_authorization(&mut self) {
        match self.authorizer.authorization_url() {
            Ok(url) => {
                if !self.host.open_external(&url) {
                    warn!(url = %url, "could not hand authorization page to the system");
                }
                self.phase = AuthPhase::AwaitingCallback;
            }
            Err(err) => {
                warn!(error=%err, "failed to build authorization url");
                self.phase = AuthPhase::Unauthenticated;
            }
        }
    }

    pub fn is_redirect(&self, url: &Url) -> bool {
        self.authorizer.is_redirect(url)
    }

    /// Exchanges the code carried by `redirect`. Success arrives as [`AuthEvent::Changed`];
    /// failure as [`AuthEvent::ExchangeFailed`].
    pub fn complete(&mut self, redirect: Url) {
        if let Some(previous) = self.exchange.take() {
            previous.abort();
        }
        let authorizer = self.authorizer.clone();
        let inbox = self.inbox.clone();
        self.exchange = Some(tokio::spawn(async move {
            if let Err(err) = authorizer.request_tokens(&redirect).await {
                warn!(error=%err, "authorization code exchange failed");
                let _ = inbox.send(BackendEvent::Auth(AuthEvent::ExchangeFailed(
                    err.to_string(),
                )));
            }
        }));
    }

    /// Applies an authorizer event. Returns the new authorized flag when it changed meaning.
    pub fn handle(&mut self, event: &AuthEvent) -> Option<bool> {
        match event {
            AuthEvent::Changed => {
                if self.authorizer.is_authorized() {
                    self.persist();
                }
                self.phase = AuthPhase::Authenticated;
                Some(true)
            }
            AuthEvent::Refreshing => {
                if self.phase == AuthPhase::Authenticated {
                    self.phase = AuthPhase::Refreshing;
                }
                None
            }
            AuthEvent::RefreshFailed(reason) => {
                warn!(reason = %reason, "token refresh failed");
                self.phase = AuthPhase::Unauthenticated;
                Some(false)
            }
            AuthEvent::ExchangeFailed(reason) => {
                warn!(reason = %reason, "authorization did not complete");
                self.phase = AuthPhase::Unauthenticated;
                Some(false)
            }
            AuthEvent::Deauthorized => {
                self.forget();
                self.phase = AuthPhase::Deauthenticated;
                Some(false)
            }
        }
    }

    /// Drops tokens and the stored credential.
    pub fn deauthorize(&mut self) {
        self.authorizer.deauthorize();
        self.forget();
        self.phase = AuthPhase::Deauthenticated;
    }

    pub fn has_credential(&self) -> bool {
        matches!(self.secrets.get_data(&self.key), Ok(Some(_)))
    }

    fn persist(&self) {
        match self.authorizer.credential() {
            Ok(Some(bytes)) => {
                if let Err(err) = self.secrets.set(&bytes, &self.key) {
                    warn!(error=%err, "failed to store credential");
                }
            }
            Ok(None) => debug!("authorizer has no credential to store"),
            Err(err) => warn!(error=%err, "failed to serialize credential"),
        }
    }

    fn forget(&self) {
        if let Err(err) = self.secrets.delete(&self.key) {
            warn!(error=%err, "failed to delete stored credential");
        }
    }
}

impl Drop for AuthorizationLifecycle {
    fn drop(&mut self) {
        if let Some(task) = self.forwarder.take() {
            task.abort();
        }
        if let Some(task) = self.exchange.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthPhase, AuthorizationLifecycle};
    use crate::testing::{FakeAuthorizer, RecordingHost};
    use crate::BackendEvent;
    use audion_core::{MemorySecretStore, SecretStore, SpotifyConfig};
    use audion_spotify::{AuthEvent, SpotifyClient};
    use std::rc::Rc;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use url::Url;

    fn lifecycle(
        authorizer: Arc<FakeAuthorizer>,
        secrets: Arc<MemorySecretStore>,
        host: Rc<RecordingHost>,
    ) -> (AuthorizationLifecycle, mpsc::UnboundedReceiver<BackendEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            AuthorizationLifecycle::new(authorizer, secrets, host, tx, "auth"),
            rx,
        )
    }

    async fn next_auth(rx: &mut mpsc::UnboundedReceiver<BackendEvent>) -> AuthEvent {
        match rx.recv().await {
            Some(BackendEvent::Auth(event)) => event,
            other => panic!("expected auth event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stored_credential_restores_without_browser() {
        let authorizer = Arc::new(FakeAuthorizer::default());
        let secrets = Arc::new(MemorySecretStore::new());
        secrets.set(b"token", "auth").unwrap();
        let host = Rc::new(RecordingHost::default());
        let (mut life, mut rx) = lifecycle(authorizer.clone(), secrets, host.clone());

        assert!(life.start());
        assert_eq!(life.phase(), AuthPhase::Authenticated);
        assert!(host.opened.borrow().is_empty());
        assert_eq!(next_auth(&mut rx).await, AuthEvent::Changed);
        assert_eq!(authorizer.restored(), vec![b"token".to_vec()]);
    }

    #[tokio::test]
    async fn expired_credential_without_refresh_token_is_discarded() {
        let client = Arc::new(SpotifyClient::new(SpotifyConfig::default()).unwrap());
        let secrets = Arc::new(MemorySecretStore::new());
        secrets
            .set(
                br#"{"access_token":"old","refresh_token":null,"expires_at":0}"#,
                "auth",
            )
            .unwrap();
        let host = Rc::new(RecordingHost::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut life =
            AuthorizationLifecycle::new(client, secrets.clone(), host.clone(), tx, "auth");

        assert!(!life.start());
        assert!(!life.is_authorized());
        assert_eq!(life.phase(), AuthPhase::AwaitingCallback);
        assert_eq!(host.opened.borrow().len(), 1);
        assert!(!life.has_credential());
    }

    #[tokio::test]
    async fn missing_credential_opens_authorization_page() {
        let authorizer = Arc::new(FakeAuthorizer::default());
        let secrets = Arc::new(MemorySecretStore::new());
        let host = Rc::new(RecordingHost::default());
        let (mut life, _rx) = lifecycle(authorizer, secrets, host.clone());

        assert!(!life.start());
        assert_eq!(life.phase(), AuthPhase::AwaitingCallback);
        assert_eq!(host.opened.borrow().len(), 1);
    }

    #[tokio::test]
    async fn callback_exchange_persists_credential() {
        let authorizer = Arc::new(FakeAuthorizer::default());
        let secrets = Arc::new(MemorySecretStore::new());
        let host = Rc::new(RecordingHost::default());
        let (mut life, mut rx) = lifecycle(authorizer.clone(), secrets.clone(), host);
        life.start();

        let callback = Url::parse("http://127.0.0.1:8888/callback?code=abc&state=s").unwrap();
        assert!(life.is_redirect(&callback));
        life.complete(callback);

        let event = next_auth(&mut rx).await;
        assert_eq!(event, AuthEvent::Changed);
        assert_eq!(life.handle(&event), Some(true));
        assert_eq!(life.phase(), AuthPhase::Authenticated);
        assert!(secrets.get_data("auth").unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_exchange_reports_unauthorized() {
        let authorizer = Arc::new(FakeAuthorizer::default());
        authorizer.fail_exchange();
        let secrets = Arc::new(MemorySecretStore::new());
        let host = Rc::new(RecordingHost::default());
        let (mut life, mut rx) = lifecycle(authorizer, secrets.clone(), host);
        life.start();

        life.complete(Url::parse("http://127.0.0.1:8888/callback?error=access_denied").unwrap());
        let event = next_auth(&mut rx).await;
        assert!(matches!(event, AuthEvent::ExchangeFailed(_)));
        assert_eq!(life.handle(&event), Some(false));
        assert!(secrets.get_data("auth").unwrap().is_none());
    }

    #[tokio::test]
    async fn deauthorization_removes_stored_credential() {
        let authorizer = Arc::new(FakeAuthorizer::default());
        let secrets = Arc::new(MemorySecretStore::new());
        secrets.set(b"token", "auth").unwrap();
        let host = Rc::new(RecordingHost::default());
        let (mut life, mut rx) = lifecycle(authorizer.clone(), secrets.clone(), host);
        life.start();
        assert!(life.has_credential());

        authorizer.deauthorize_now();
        let mut event = next_auth(&mut rx).await;
        if event == AuthEvent::Changed {
            life.handle(&event);
            event = next_auth(&mut rx).await;
        }
        assert_eq!(event, AuthEvent::Deauthorized);
        assert_eq!(life.handle(&event), Some(false));
        assert_eq!(life.phase(), AuthPhase::Deauthenticated);
        assert!(!life.has_credential());
    }

    #[tokio::test]
    async fn refreshing_keeps_authorized_flag() {
        let authorizer = Arc::new(FakeAuthorizer::default());
        let secrets = Arc::new(MemorySecretStore::new());
        let host = Rc::new(RecordingHost::default());
        let (mut life, _rx) = lifecycle(authorizer, secrets, host);

        assert_eq!(life.handle(&AuthEvent::Changed), Some(true));
        assert_eq!(life.handle(&AuthEvent::Refreshing), None);
        assert_eq!(life.phase(), AuthPhase::Refreshing);
        assert_eq!(life.handle(&AuthEvent::Changed), Some(true));
        assert_eq!(
            life.handle(&AuthEvent::RefreshFailed("timeout".into())),
            Some(false)
        );
    }
}
