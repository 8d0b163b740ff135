use crate::auth::{self, now_epoch, OAuthErrorBody, TokenBundle, TokenResponse};
use crate::error::ApiError;
use crate::models::{track_id_from_uri, CurrentPlayback, TrackInfo};
use crate::{AuthEvent, Authorizer, RemotePlaybackApi};
use async_trait::async_trait;
use audion_core::SpotifyConfig;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Method, Response, StatusCode};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CAPACITY: usize = 16;

/// Spotify Web API client holding the authorization-code-flow tokens.
pub struct SpotifyClient {
    http: reqwest::Client,
    cfg: SpotifyConfig,
    redirect: Url,
    token: RwLock<Option<TokenBundle>>,
    pending_state: Mutex<Option<String>>,
    refresh_gate: tokio::sync::Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

impl SpotifyClient {
    pub fn new(cfg: SpotifyConfig) -> Result<Self, ApiError> {
        let redirect = Url::parse(&cfg.redirect_uri)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("audion/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            http,
            cfg,
            redirect,
            token: RwLock::new(None),
            pending_state: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(()),
            events,
        })
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect
    }

    pub fn token_snapshot(&self) -> Option<TokenBundle> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn store_token(&self, bundle: Option<TokenBundle>) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = bundle;
    }

    fn publish(&self, event: AuthEvent) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(event);
    }

    async fn access_token(&self) -> Result<String, ApiError> {
        {
            let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                None => return Err(ApiError::NotAuthorized),
                Some(t) if !t.needs_refresh(now_epoch()) => return Ok(t.access_token.clone()),
                Some(_) => {}
            }
        }
        self.refresh().await
    }

    async fn refresh(&self) -> Result<String, ApiError> {
        let _gate = self.refresh_gate.lock().await;

        let refresh_token = {
            let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
            match guard.as_ref() {
                None => return Err(ApiError::NotAuthorized),
                // Another caller refreshed while we waited on the gate.
                Some(t) if !t.needs_refresh(now_epoch()) => return Ok(t.access_token.clone()),
                Some(t) => t.refresh_token.clone(),
            }
        };
        let Some(refresh_token) = refresh_token else {
            warn!("access token expired and no refresh token is available");
            self.deauthorize();
            return Err(ApiError::NotAuthorized);
        };

        self.publish(AuthEvent::Refreshing);
        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
        ];
        match self.token_request(params).await {
            Ok(resp) => {
                let bundle = TokenBundle::from_response(resp, now_epoch(), Some(refresh_token));
                let access = bundle.access_token.clone();
                self.store_token(Some(bundle));
                debug!("access token refreshed");
                self.publish(AuthEvent::Changed);
                Ok(access)
            }
            Err(err) if err.is_invalid_grant() => {
                warn!(error=%err, "refresh token rejected; deauthorizing");
                self.deauthorize();
                Err(ApiError::NotAuthorized)
            }
            Err(err) => {
                warn!(error=%err, "token refresh failed");
                self.publish(AuthEvent::RefreshFailed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn token_request(
        &self,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<TokenResponse, ApiError> {
        let url = format!("{}/api/token", self.cfg.accounts_base.trim_end_matches('/'));
        let mut req = self.http.post(url);
        match &self.cfg.client_secret {
            Some(secret) => req = req.basic_auth(&self.cfg.client_id, Some(secret)),
            None => params.push(("client_id", self.cfg.client_id.clone())),
        }

        let resp = req.form(&params).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<TokenResponse>().await?);
        }

        let body = resp.text().await.unwrap_or_default();
        match serde_json::from_str::<OAuthErrorBody>(&body) {
            Ok(err) => Err(ApiError::OAuth {
                error: err.error,
                description: err.error_description,
            }),
            Err(_) => Err(ApiError::Status {
                status: status.as_u16(),
                message: body,
            }),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Response, ApiError> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.cfg.api_base.trim_end_matches('/'), path);
        let mut req = self
            .http
            .request(method.clone(), url)
            .bearer_auth(token)
            .query(query);
        if method != Method::GET {
            req = req.header(CONTENT_LENGTH, "0");
        }
        let resp = req.send().await?;
        check_status(resp).await
    }

    async fn command(&self, method: Method, path: &str, query: &[(&str, String)]) -> Result<(), ApiError> {
        self.send(method, path, query).await.map(|_| ())
    }
}

async fn check_status(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl RemotePlaybackApi for SpotifyClient {
    async fn current_playback(&self) -> Result<Option<CurrentPlayback>, ApiError> {
        let resp = self.send(Method::GET, "/me/player", &[]).await?;
        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn resume_playback(&self) -> Result<(), ApiError> {
        self.command(Method::PUT, "/me/player/play", &[]).await
    }

    async fn pause_playback(&self) -> Result<(), ApiError> {
        self.command(Method::PUT, "/me/player/pause", &[]).await
    }

    async fn seek_to_position(&self, position_ms: u64) -> Result<(), ApiError> {
        self.command(
            Method::PUT,
            "/me/player/seek",
            &[("position_ms", position_ms.to_string())],
        )
        .await
    }

    async fn set_volume(&self, percent: u8) -> Result<(), ApiError> {
        self.command(
            Method::PUT,
            "/me/player/volume",
            &[("volume_percent", percent.min(100).to_string())],
        )
        .await
    }

    async fn skip_to_next(&self) -> Result<(), ApiError> {
        self.command(Method::POST, "/me/player/next", &[]).await
    }

    async fn skip_to_previous(&self) -> Result<(), ApiError> {
        self.command(Method::POST, "/me/player/previous", &[]).await
    }

    async fn track(&self, uri: &str) -> Result<TrackInfo, ApiError> {
        let id = track_id_from_uri(uri).ok_or_else(|| ApiError::InvalidTrackUri(uri.to_string()))?;
        let resp = self.send(Method::GET, &format!("/tracks/{id}"), &[]).await?;
        Ok(resp.json::<TrackInfo>().await?)
    }
}

#[async_trait]
impl Authorizer for SpotifyClient {
    fn is_authorized(&self) -> bool {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .map(|t| t.is_usable(now_epoch()))
            .unwrap_or(false)
    }

    fn authorization_url(&self) -> Result<Url, ApiError> {
        let state = auth::state_nonce();
        let url = auth::authorization_url(
            &self.cfg.accounts_base,
            &self.cfg.client_id,
            self.redirect.as_str(),
            &self.cfg.scopes,
            &state,
        )?;
        *self.pending_state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state);
        Ok(url)
    }

    fn is_redirect(&self, url: &Url) -> bool {
        auth::matches_redirect(&self.redirect, url)
    }

    async fn request_tokens(&self, redirect: &Url) -> Result<(), ApiError> {
        let expected = self
            .pending_state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let code = auth::parse_callback(redirect, expected.as_deref())?;

        let params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code),
            ("redirect_uri", self.redirect.to_string()),
        ];
        let resp = self.token_request(params).await?;
        self.store_token(Some(TokenBundle::from_response(resp, now_epoch(), None)));
        *self.pending_state.lock().unwrap_or_else(|e| e.into_inner()) = None;
        info!("authorization code exchanged for tokens");
        self.publish(AuthEvent::Changed);
        Ok(())
    }

    fn credential(&self) -> Result<Option<Vec<u8>>, ApiError> {
        match self.token_snapshot() {
            Some(bundle) => Ok(Some(serde_json::to_vec(&bundle)?)),
            None => Ok(None),
        }
    }

    fn restore(&self, credential: &[u8]) -> Result<(), ApiError> {
        let bundle: TokenBundle = serde_json::from_slice(credential)?;
        if !bundle.is_usable(now_epoch()) {
            return Err(ApiError::NotAuthorized);
        }
        self.store_token(Some(bundle));
        self.publish(AuthEvent::Changed);
        Ok(())
    }

    fn deauthorize(&self) {
        self.store_token(None);
        self.publish(AuthEvent::Deauthorized);
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}
