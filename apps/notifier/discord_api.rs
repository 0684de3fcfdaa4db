use crate::{
    channel::{ChannelError, NotificationChannel},
    models::notifications::MessageRef,
    render::MessageContent,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Client, Method, Response, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, instrument, warn};
use utils::errors::HTTP_CLIENT_BUILD_FAILED;

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(60);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize, Debug)]
struct CreatedMessage {
    id: String,
}

#[derive(Deserialize, Debug)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Which request is being made; decides how a 404 is read.
#[derive(Debug, Clone, Copy)]
enum Operation<'a> {
    Post,
    Edit(&'a MessageRef),
    Delete(&'a MessageRef),
}

/// Posts proposal notifications as embeds to one Discord channel.
pub struct DiscordApi {
    client: Client,
    base_url: String,
    channel_id: String,
    max_retries: usize,
}

impl DiscordApi {
    pub fn new(token: &str, channel_id: &str) -> Result<Self> {
        Self::new_with_base_url(DISCORD_API_BASE, token, channel_id)
    }

    pub fn new_with_base_url(base_url: &str, token: &str, channel_id: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("DiscordBot (https://github.com/proposals-app, 0.1)"),
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bot {token}"))
                .context("DISCORD_TOKEN is not a valid header value")?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context(HTTP_CLIENT_BUILD_FAILED)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            channel_id: channel_id.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/channels/{}/messages", self.base_url, self.channel_id)
    }

    fn message_url(&self, message: &MessageRef) -> String {
        format!("{}/{}", self.messages_url(), message)
    }

    fn embed_payload(content: &MessageContent) -> Value {
        let fields: Vec<Value> = content
            .fields
            .iter()
            .map(|f| json!({ "name": f.name, "value": f.value, "inline": f.inline }))
            .collect();

        let mut embed = json!({
            "title": content.title,
            "url": content.url,
            "color": content.color,
            "fields": fields,
        });
        if let Some(footer) = &content.footer {
            embed["footer"] = json!({ "text": footer });
        }

        json!({ "embeds": [embed] })
    }

    /// Seconds to wait from a 429, preferring the body's float over the header.
    async fn rate_limit_wait(response: Response) -> Duration {
        let header_wait = response
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok());
        let body_wait = response
            .json::<RateLimitBody>()
            .await
            .ok()
            .and_then(|b| b.retry_after);

        body_wait
            .or(header_wait)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
            .unwrap_or(DEFAULT_RATE_LIMIT_WAIT)
            .min(MAX_RATE_LIMIT_WAIT)
    }

    #[instrument(skip(self, body), fields(channel_id = %self.channel_id))]
    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<&Value>,
        operation: Operation<'_>,
    ) -> Result<Response, ChannelError> {
        let mut attempt = 0;
        loop {
            let mut request = self.client.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ChannelError::Transient(format!("request failed: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        return Err(ChannelError::Transient(
                            "rate limited (HTTP 429), max retries reached".to_string(),
                        ));
                    }
                    let wait = Self::rate_limit_wait(response).await;
                    warn!(attempt, wait = ?wait, "Discord rate limit hit, retrying");
                    sleep(wait).await;
                }
                StatusCode::NOT_FOUND => {
                    return Err(match operation {
                        Operation::Edit(message) | Operation::Delete(message) => {
                            ChannelError::NotFound(message.clone())
                        }
                        Operation::Post => ChannelError::Fatal(format!(
                            "channel {} not found",
                            self.channel_id
                        )),
                    });
                }
                status if status.is_server_error() => {
                    return Err(ChannelError::Transient(format!(
                        "Discord returned HTTP {status}"
                    )));
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ChannelError::Fatal(format!(
                        "Discord rejected request with HTTP {status}: {body}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for DiscordApi {
    async fn post(&self, content: &MessageContent) -> Result<MessageRef, ChannelError> {
        let payload = Self::embed_payload(content);
        let response = self
            .send(Method::POST, self.messages_url(), Some(&payload), Operation::Post)
            .await?;

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| ChannelError::Fatal(format!("unexpected create response: {e}")))?;

        debug!(message_id = %created.id, "Posted message");
        Ok(MessageRef(created.id))
    }

    async fn edit(&self, message: &MessageRef, content: &MessageContent) -> Result<(), ChannelError> {
        let payload = Self::embed_payload(content);
        self.send(
            Method::PATCH,
            self.message_url(message),
            Some(&payload),
            Operation::Edit(message),
        )
        .await?;

        debug!(message_id = %message, "Edited message");
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<(), ChannelError> {
        self.send(
            Method::DELETE,
            self.message_url(message),
            None,
            Operation::Delete(message),
        )
        .await?;

        debug!(message_id = %message, "Deleted message");
        Ok(())
    }
}
