use core::fmt;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::instrument;

use crate::constants::{DEFAULT_AUTH_PROVIDER, SUPABASE_AUTH_USER_PATH, UNKNOWN_NAME};
use crate::db::models::loose_string_opt;

/// Resolves bearer tokens to the user they were issued for.
#[async_trait]
pub trait IdentityProvider: Send + Sync + fmt::Debug {
    /// `Ok(None)` when the provider doesn't recognise the token's user.
    async fn get_user(&self, token: &str) -> IdentityResult<Option<IdentityUser>>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Map<String, Value>,
    #[serde(default)]
    pub app_metadata: Map<String, Value>,
    #[serde(default)]
    pub identities: Vec<LinkedIdentity>,

    /// Full profile exactly as the provider returned it.
    #[serde(skip)]
    pub raw: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LinkedIdentity {
    pub provider: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub id: Option<String>,
}

impl IdentityUser {
    pub fn from_payload(payload: Value) -> IdentityResult<Self> {
        let mut user = serde_json::from_value::<Self>(payload.clone())?;
        user.raw = payload;
        Ok(user)
    }

    pub fn display_name(&self) -> &str {
        ["full_name", "name"]
            .iter()
            .find_map(|key| {
                self.user_metadata
                    .get(*key)
                    .and_then(Value::as_str)
                    .filter(|name| !name.trim().is_empty())
            })
            .unwrap_or(UNKNOWN_NAME)
    }

    pub fn email(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }

    pub fn provider(&self) -> &str {
        self.app_metadata
            .get("provider")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_AUTH_PROVIDER)
    }

    /// The account id on the provider's side, falling back to our own id.
    pub fn provider_user_id(&self) -> &str {
        let provider = self.provider();
        self.identities
            .iter()
            .find(|identity| identity.provider == provider)
            .and_then(|identity| identity.id.as_deref())
            .unwrap_or(self.id.as_str())
    }
}

/// Supabase Auth: `GET /auth/v1/user` with the caller's access token.
#[derive(Debug, Clone)]
pub struct SupabaseAuth {
    client: reqwest::Client,
    user_url: String,
    api_key: HeaderValue,
}

impl SupabaseAuth {
    pub fn new(client: reqwest::Client, project_url: &str, api_key: &str) -> IdentityResult<Self> {
        Ok(Self {
            client,
            user_url: format!(
                "{}{}",
                project_url.trim_end_matches('/'),
                SUPABASE_AUTH_USER_PATH
            ),
            api_key: HeaderValue::from_str(api_key)?,
        })
    }

    fn headers(&self, token: &str) -> IdentityResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", self.api_key.clone());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))?,
        );

        Ok(headers)
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuth {
    #[instrument(skip(self, token))]
    async fn get_user(&self, token: &str) -> IdentityResult<Option<IdentityUser>> {
        let res = self
            .client
            .get(&self.user_url)
            .headers(self.headers(token)?)
            .send()
            .await?;

        let status = res.status();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                tracing::debug!(code = %status, "identity provider did not recognise token");
                return Ok(None);
            }
            s if !s.is_success() => {
                tracing::error!(code = %status, "non-2xx response from identity provider");
                return Err(match res.json::<Value>().await {
                    Ok(body) => IdentityErr::FetchErrWithBody { body },
                    Err(_) => IdentityErr::FetchErr(status.to_string()),
                });
            }
            _ => (),
        }

        let payload = res.json::<Value>().await?;
        if payload.get("id").is_none_or(Value::is_null) {
            tracing::warn!("identity provider returned a profile with no user id");
            return Ok(None);
        }

        let user = IdentityUser::from_payload(payload)?;
        tracing::debug!(user_id = %user.id, provider = user.provider(), "resolved bearer token");

        Ok(Some(user))
    }
}

pub type IdentityResult<T> = core::result::Result<T, IdentityErr>;

#[derive(Debug, Error)]
pub enum IdentityErr {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error("malformed user profile: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("error during identity fetch: {0}")]
    FetchErr(String),

    #[error("{}", upstream_message(.body))]
    FetchErrWithBody { body: Value },
}

fn upstream_message(body: &Value) -> &str {
    body.get("msg")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("identity provider error")
}
