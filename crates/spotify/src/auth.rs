use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

/// Refresh this long before the access token actually expires.
pub const REFRESH_LEEWAY_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds.
    pub expires_at: u64,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TokenBundle {
    pub fn needs_refresh(&self, now: u64) -> bool {
        self.expires_at <= now.saturating_add(REFRESH_LEEWAY_SECS)
    }

    /// Usable now, or recoverable without the user.
    pub fn is_usable(&self, now: u64) -> bool {
        !self.needs_refresh(now) || self.refresh_token.is_some()
    }

    pub(crate) fn from_response(
        resp: TokenResponse,
        now: u64,
        previous_refresh: Option<String>,
    ) -> Self {
        Self {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token.or(previous_refresh),
            expires_at: now.saturating_add(resp.expires_in),
            scopes: resp
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OAuthErrorBody {
    pub error: String,
    pub error_description: Option<String>,
}

pub fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) fn state_nonce() -> String {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{:x}{:x}", n, std::process::id())
}

pub fn authorization_url(
    accounts_base: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> Result<Url, ApiError> {
    let base = format!("{}/authorize", accounts_base.trim_end_matches('/'));
    let scope = scopes.join(" ");
    let url = Url::parse_with_params(
        &base,
        &[
            ("client_id", client_id),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("show_dialog", "false"),
            ("state", state),
        ],
    )?;
    Ok(url)
}

/// Same scheme, host, port and path; the query is ignored.
pub fn matches_redirect(redirect: &Url, candidate: &Url) -> bool {
    redirect.scheme() == candidate.scheme()
        && redirect.host_str() == candidate.host_str()
        && redirect.port_or_known_default() == candidate.port_or_known_default()
        && redirect.path().trim_end_matches('/') == candidate.path().trim_end_matches('/')
}

/// Pulls the authorization code out of a redirect, checking `state` when one was issued.
pub fn parse_callback(url: &Url, expected_state: Option<&str>) -> Result<String, ApiError> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    if let Some(err) = error {
        return Err(ApiError::OAuth {
            error: err,
            description: None,
        });
    }
    if let Some(expected) = expected_state {
        if state.as_deref() != Some(expected) {
            return Err(ApiError::StateMismatch);
        }
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::InvalidCallback(format!("no code in {url}")))
}
