use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::commands::CommandSpec;
use crate::embeds::{InteractionResponse, OutboundMessage};

pub const API_BASE_URL: &str = "https://discord.com/api/v10";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("discord request failed: {0}")]
    Http(String),
    #[error("discord returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("discord response decode failed: {0}")]
    Decode(String),
}

/// The slice of the Discord REST API the bot talks to.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    /// Bulk-overwrites the global application commands.
    async fn register_commands(
        &self,
        application_id: &str,
        commands: &[CommandSpec],
    ) -> Result<(), ApiError>;

    /// Posts a message to a channel; returns the new message ID.
    async fn create_message(
        &self,
        channel_id: &str,
        message: &OutboundMessage,
    ) -> Result<String, ApiError>;

    /// Starts a thread attached to a message; returns the thread ID.
    async fn start_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        name: &str,
        auto_archive_minutes: u16,
    ) -> Result<String, ApiError>;

    async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ApiError>;

    /// Answers an interaction through the callback endpoint.
    async fn respond(
        &self,
        interaction_id: &str,
        token: &str,
        response: &InteractionResponse,
    ) -> Result<(), ApiError>;
}

pub struct HttpDiscordApi {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
}

impl HttpDiscordApi {
    pub fn new(token: SecretString) -> Result<Self, ApiError> {
        Self::with_base_url(token, API_BASE_URL)
    }

    pub fn with_base_url(token: SecretString, base_url: &str) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent("BroBot/1.0")
            .build()
            .map_err(|e| ApiError::Http(e.to_string()))?;
        Ok(Self { client, token, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    async fn send_json(
        &self,
        request: reqwest::RequestBuilder,
        body: &Value,
    ) -> Result<Value, ApiError> {
        let response = request
            .header("Authorization", self.auth_header())
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }
        response.json().await.map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DiscordApi for HttpDiscordApi {
    async fn register_commands(
        &self,
        application_id: &str,
        commands: &[CommandSpec],
    ) -> Result<(), ApiError> {
        let url = format!("{}/applications/{application_id}/commands", self.base_url);
        let body = serde_json::to_value(commands).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.send_json(self.client.put(&url), &body).await?;
        debug!(count = commands.len(), "registered application commands");
        Ok(())
    }

    async fn create_message(
        &self,
        channel_id: &str,
        message: &OutboundMessage,
    ) -> Result<String, ApiError> {
        let url = format!("{}/channels/{channel_id}/messages", self.base_url);
        let body = serde_json::to_value(message).map_err(|e| ApiError::Decode(e.to_string()))?;
        let created = self.send_json(self.client.post(&url), &body).await?;
        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ApiError::Decode("message response missing `id`".to_owned()))
    }

    async fn start_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        name: &str,
        auto_archive_minutes: u16,
    ) -> Result<String, ApiError> {
        let url =
            format!("{}/channels/{channel_id}/messages/{message_id}/threads", self.base_url);
        let body = json!({ "name": name, "auto_archive_duration": auto_archive_minutes });
        let created = self.send_json(self.client.post(&url), &body).await?;
        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| ApiError::Decode("thread response missing `id`".to_owned()))
    }

    async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ApiError> {
        let encoded: String = url::form_urlencoded::byte_serialize(emoji.as_bytes()).collect();
        let url = format!(
            "{}/channels/{channel_id}/messages/{message_id}/reactions/{encoded}/@me",
            self.base_url
        );
        // The reactions endpoint wants an empty body.
        let response = self
            .client
            .put(&url)
            .header("Authorization", self.auth_header())
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), body });
        }
        Ok(())
    }

    async fn respond(
        &self,
        interaction_id: &str,
        token: &str,
        response: &InteractionResponse,
    ) -> Result<(), ApiError> {
        let url =
            format!("{}/interactions/{interaction_id}/{token}/callback", self.base_url);
        self.send_json(self.client.post(&url), &response.to_payload()).await?;
        Ok(())
    }
}

/// In-memory fake that records every outbound call. Shared by the tests of
/// the crates that drive the API.
#[derive(Default)]
pub struct RecordingDiscordApi {
    state: tokio::sync::Mutex<RecordingState>,
    pub fail_threads: std::sync::atomic::AtomicBool,
    pub fail_reactions: std::sync::atomic::AtomicBool,
}

#[derive(Default)]
struct RecordingState {
    registered: Vec<CommandSpec>,
    messages: Vec<(String, OutboundMessage)>,
    threads: Vec<(String, String, String)>,
    reactions: Vec<(String, String, String)>,
    responses: Vec<(String, InteractionResponse)>,
}

impl RecordingDiscordApi {
    pub async fn messages(&self) -> Vec<(String, OutboundMessage)> {
        self.state.lock().await.messages.clone()
    }

    pub async fn threads(&self) -> Vec<(String, String, String)> {
        self.state.lock().await.threads.clone()
    }

    pub async fn reactions(&self) -> Vec<(String, String, String)> {
        self.state.lock().await.reactions.clone()
    }

    pub async fn responses(&self) -> Vec<(String, InteractionResponse)> {
        self.state.lock().await.responses.clone()
    }

    pub async fn registered(&self) -> Vec<CommandSpec> {
        self.state.lock().await.registered.clone()
    }
}

#[async_trait]
impl DiscordApi for RecordingDiscordApi {
    async fn register_commands(
        &self,
        _application_id: &str,
        commands: &[CommandSpec],
    ) -> Result<(), ApiError> {
        self.state.lock().await.registered = commands.to_vec();
        Ok(())
    }

    async fn create_message(
        &self,
        channel_id: &str,
        message: &OutboundMessage,
    ) -> Result<String, ApiError> {
        let mut state = self.state.lock().await;
        state.messages.push((channel_id.to_owned(), message.clone()));
        Ok(format!("msg-{}", state.messages.len()))
    }

    async fn start_thread(
        &self,
        channel_id: &str,
        message_id: &str,
        name: &str,
        _auto_archive_minutes: u16,
    ) -> Result<String, ApiError> {
        if self.fail_threads.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ApiError::Status { status: 403, body: "missing permission".to_owned() });
        }
        let mut state = self.state.lock().await;
        state.threads.push((channel_id.to_owned(), message_id.to_owned(), name.to_owned()));
        Ok(format!("thread-{}", state.threads.len()))
    }

    async fn create_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ApiError> {
        if self.fail_reactions.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ApiError::Status { status: 403, body: "missing permission".to_owned() });
        }
        let mut state = self.state.lock().await;
        state.reactions.push((channel_id.to_owned(), message_id.to_owned(), emoji.to_owned()));
        Ok(())
    }

    async fn respond(
        &self,
        interaction_id: &str,
        _token: &str,
        response: &InteractionResponse,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.responses.push((interaction_id.to_owned(), response.clone()));
        Ok(())
    }
}
