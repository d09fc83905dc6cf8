use std::time;

use async_trait::async_trait;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;
use crate::models::{Member, RawMessage};

const ACCESS_TOKEN_HEADER: &str = "x-access-token";

/// The messaging provider capabilities a run needs.
///
/// Errors must tell rate limiting (`ProviderError::RateLimited`) apart from everything else, as only
/// the former is retried.
#[async_trait]
pub trait MessageProvider: Send + Sync {
    async fn list_group_members(&self, group_id: &str) -> Result<Vec<Member>, ProviderError>;

    /// Fetch the page of messages preceding `before_id`, or the newest page when `None`.
    /// Returns `None` once history is exhausted.
    async fn fetch_page(
        &self,
        group_id: &str,
        before_id: Option<&str>,
    ) -> Result<Option<Vec<RawMessage>>, ProviderError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Deserialize)]
struct GroupBody {
    #[serde(default)]
    members: Vec<Member>,
}

#[derive(Deserialize)]
struct MessagesBody {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

/// `MessageProvider` backed by the GroupMe v3 REST API.
pub struct GroupMeClient {
    /// API root, e.g. https://api.groupme.com/v3, without a trailing slash.
    base_url: String,
    /// How many messages to ask for per page. GroupMe caps this at 100.
    page_size: u32,
    /// The client used for HTTP requests. Carries the access token as a default header.
    client: reqwest::Client,
}

impl GroupMeClient {
    pub fn new(
        base_url: &str,
        token: &str,
        page_size: u32,
        request_timeout: time::Duration,
    ) -> Result<Self, ProviderError> {
        let mut token_value =
            header::HeaderValue::from_str(token).map_err(|_| ProviderError::InvalidToken)?;
        token_value.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(ACCESS_TOKEN_HEADER, token_value);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("leaderboard-worker")
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            page_size,
            client,
        })
    }
}

#[async_trait]
impl MessageProvider for GroupMeClient {
    async fn list_group_members(&self, group_id: &str) -> Result<Vec<Member>, ProviderError> {
        let url = format!("{}/groups/{}", self.base_url, group_id);

        let response = self.client.get(&url).send().await?;
        let response = error_for_status(response).await?;
        let envelope: Envelope<GroupBody> = response.json().await?;

        Ok(envelope.response.members)
    }

    async fn fetch_page(
        &self,
        group_id: &str,
        before_id: Option<&str>,
    ) -> Result<Option<Vec<RawMessage>>, ProviderError> {
        let url = format!("{}/groups/{}/messages", self.base_url, group_id);

        let mut request = self
            .client
            .get(&url)
            .query(&[("limit", self.page_size.to_string())]);
        if let Some(before_id) = before_id {
            request = request.query(&[("before_id", before_id)]);
        }

        let response = request.send().await?;

        // GroupMe answers 304 when there is nothing before `before_id`.
        if response.status() == StatusCode::NOT_MODIFIED {
            debug!("no messages before {:?}", before_id);
            return Ok(None);
        }

        let response = error_for_status(response).await?;
        let envelope: Envelope<MessagesBody> = response.json().await?;
        let messages = envelope.response.messages;

        if messages.is_empty() {
            return Ok(None);
        }

        Ok(Some(messages))
    }
}

async fn error_for_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::UnexpectedStatus { status, body });
    }

    Ok(response)
}
