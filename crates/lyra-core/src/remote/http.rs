//! HTTP implementation of the remote API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::Deserialize;

use super::{ChangeBatch, RemoteApi, RemoteChange, RemoteError};
use crate::config::{ConfigError, SyncConfig};
use crate::models::{
    ContentType, EntityKind, Like, LikedContent, SettingKey, UserSetting, ViewedContent,
};
use crate::util::compact_text;

/// Header carrying the pushed record's version
pub const MODIFIED_AT_HEADER: &str = "X-Modified-At";

#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: Url,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteApi {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteApi")
            .field("base_url", &self.base_url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteApi {
    pub fn new(config: &SyncConfig) -> Result<Self, ConfigError> {
        let base_url = config
            .api_base_url
            .as_deref()
            .ok_or(ConfigError::MissingVar("LYRA_API_BASE_URL"))?;
        let base_url = Url::parse(base_url)
            .map_err(|error| ConfigError::Invalid(format!("invalid API base URL: {error}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "API base URL cannot carry paths: {base_url}"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| ConfigError::Invalid(format!("failed to build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            auth_token: config.auth_token.clone(),
            client,
        })
    }

    /// Build an endpoint URL from path segments (each segment is percent-encoded)
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/json");
        match self.auth_token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, RemoteError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, retry_after))
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn push_liked_content(&self, record: &LikedContent) -> Result<(), RemoteError> {
        let like = &record.payload;
        let method = if like.is_liked {
            Method::POST
        } else {
            Method::DELETE
        };
        let url = self.endpoint(&[
            "v1",
            "user",
            "liked",
            like.content_type.as_str(),
            &like.content_id,
        ]);
        let request = self
            .request(method, url)
            .header(MODIFIED_AT_HEADER, record.modified_at.to_string());
        self.send(request).await?;
        Ok(())
    }

    async fn push_setting(
        &self,
        key: SettingKey,
        setting: Option<&UserSetting>,
        modified_at: i64,
    ) -> Result<(), RemoteError> {
        let request = match setting {
            Some(setting) => self
                .request(Method::PUT, self.endpoint(&["v1", "user", "settings"]))
                .json(&serde_json::json!({ "settings": [setting] })),
            None => self.request(
                Method::DELETE,
                self.endpoint(&["v1", "user", "settings", key.as_str()]),
            ),
        };
        self.send(request.header(MODIFIED_AT_HEADER, modified_at.to_string()))
            .await?;
        Ok(())
    }

    async fn push_viewed_content(&self, entry: &ViewedContent) -> Result<(), RemoteError> {
        let request = self
            .request(Method::POST, self.endpoint(&["v1", "user", "viewed"]))
            .json(&serde_json::json!({
                "content_id": entry.content_id,
                "content_type": entry.content_type,
                "created": entry.created,
            }));
        self.send(request).await?;
        Ok(())
    }

    async fn pull_changes_since(
        &self,
        kind: EntityKind,
        checkpoint: i64,
    ) -> Result<ChangeBatch, RemoteError> {
        let mut url = self.endpoint(&["v1", "sync", "events"]);
        url.query_pairs_mut()
            .append_pair("since", &checkpoint.to_string());

        let response = self.send(self.request(Method::GET, url)).await?;
        let body = response
            .json::<SyncEventsResponse>()
            .await
            .map_err(|error| RemoteError::Transient(format!("invalid sync events payload: {error}")))?;

        Ok(ChangeBatch {
            changes: decode_events(kind, &body.events),
            checkpoint: body.current_seq,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SyncEventsResponse {
    pub events: Vec<WireEvent>,
    pub current_seq: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireEvent {
    pub seq: i64,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Unix seconds
    #[serde(default)]
    pub server_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct LikePayload {
    content_type: String,
    content_id: String,
    modified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SettingPayload {
    setting: UserSetting,
    modified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SettingResetPayload {
    key: String,
    modified_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StaleWriteBody {
    server_modified_at: Option<i64>,
}

/// Map a non-success status to the remote error the synchronizer acts on
pub(crate) fn classify_status(
    status: StatusCode,
    body: &str,
    retry_after: Option<Duration>,
) -> RemoteError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            RemoteError::Authentication(format!("HTTP {}", status.as_u16()))
        }
        StatusCode::CONFLICT => {
            let server_modified_at = serde_json::from_str::<StaleWriteBody>(body)
                .ok()
                .and_then(|body| body.server_modified_at)
                .unwrap_or(0);
            RemoteError::StaleWrite { server_modified_at }
        }
        StatusCode::GONE => RemoteError::CheckpointExpired,
        StatusCode::TOO_MANY_REQUESTS => RemoteError::RateLimited { retry_after },
        status if status.is_server_error() => {
            RemoteError::Transient(format!("HTTP {}", status.as_u16()))
        }
        status => {
            tracing::warn!(
                "Unexpected remote response {}: {}",
                status.as_u16(),
                compact_text(body)
            );
            RemoteError::Transient(format!("HTTP {}", status.as_u16()))
        }
    }
}

fn transport_error(error: reqwest::Error) -> RemoteError {
    if error.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Transient(error.to_string())
    }
}

/// Decode the events relevant to `kind`, skipping unknown or malformed ones.
///
/// Events without an explicit `modified_at` use the server timestamp.
pub(crate) fn decode_events(kind: EntityKind, events: &[WireEvent]) -> Vec<RemoteChange> {
    events
        .iter()
        .filter_map(decode_event)
        .filter(|change| change.kind() == kind)
        .collect()
}

fn decode_event(event: &WireEvent) -> Option<RemoteChange> {
    let fallback = event.server_timestamp.saturating_mul(1000);
    let decoded = match event.event_type.as_str() {
        "content_liked" | "content_unliked" => {
            serde_json::from_value::<LikePayload>(event.payload.clone())
                .map_err(|error| error.to_string())
                .map(|payload| {
                    let content_type = payload
                        .content_type
                        .parse()
                        .unwrap_or_else(|_| ContentType::from_id(&payload.content_id));
                    RemoteChange::Like {
                        like: Like::new(
                            payload.content_id,
                            content_type,
                            event.event_type == "content_liked",
                        ),
                        modified_at: payload.modified_at.unwrap_or(fallback),
                    }
                })
        }
        "setting_changed" => serde_json::from_value::<SettingPayload>(event.payload.clone())
            .map_err(|error| error.to_string())
            .map(|payload| RemoteChange::Setting {
                setting: payload.setting,
                modified_at: payload.modified_at.unwrap_or(fallback),
            }),
        "setting_reset" => serde_json::from_value::<SettingResetPayload>(event.payload.clone())
            .map_err(|error| error.to_string())
            .and_then(|payload| {
                let key = payload
                    .key
                    .parse::<SettingKey>()
                    .map_err(|error| error.to_string())?;
                Ok(RemoteChange::SettingReset {
                    key,
                    modified_at: payload.modified_at.unwrap_or(fallback),
                })
            }),
        _ => return None,
    };

    match decoded {
        Ok(change) => Some(change),
        Err(error) => {
            tracing::debug!(
                "Skipping malformed {} event {}: {error}",
                event.event_type,
                event.seq
            );
            None
        }
    }
}
