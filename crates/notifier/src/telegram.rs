//! Minimal Telegram Bot API client.
//!
//! Only the handful of methods the bot uses are covered. Every call is a JSON
//! `POST {api_url}/bot{token}/{method}` answered by an `ApiResponse` envelope.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use goldie_common::error::AppError;
use goldie_common::types::{ChatId, MessageId};
use goldie_engine::keyboard::Keyboard;
use goldie_engine::ports::DeliverySink;

const PARSE_MODE: &str = "HTML";

/// Extra time on top of the long-poll timeout before the HTTP request is abandoned.
const POLL_GRACE: Duration = Duration::from_secs(10);

// ============================================================
// Wire types
// ============================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: MessageId,
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Serialize)]
struct LinkPreviewOptions {
    is_disabled: bool,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: ChatId,
    text: &'a str,
    parse_mode: &'static str,
    link_preview_options: LinkPreviewOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

#[derive(Debug, Serialize)]
struct EditMessageTextRequest<'a> {
    chat_id: ChatId,
    message_id: MessageId,
    text: &'a str,
    parse_mode: &'static str,
    link_preview_options: LinkPreviewOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a Keyboard>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryRequest<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

// ============================================================
// Client
// ============================================================

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Delivery(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
        })
    }

    /// Long-poll for updates starting at `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, AppError> {
        let request = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message", "callback_query"],
        };

        self.call_with_timeout(
            "getUpdates",
            &request,
            Duration::from_secs(timeout_secs) + POLL_GRACE,
        )
        .await
    }

    async fn call<P, T>(&self, method: &str, params: &P) -> Result<T, AppError>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send(method, self.client.post(self.method_url(method)).json(params))
            .await
    }

    async fn call_with_timeout<P, T>(
        &self,
        method: &str,
        params: &P,
        timeout: Duration,
    ) -> Result<T, AppError>
    where
        P: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self
            .client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(params);
        self.send(method, request).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, AppError> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::Delivery(format!("{method} request failed: {e}")))?;

        // Bot API errors come back as non-2xx with the same JSON envelope.
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| AppError::Delivery(format!("Invalid {method} response: {e}")))?;

        if !envelope.ok {
            return Err(AppError::Delivery(format!(
                "{method} rejected: {}",
                envelope.description.unwrap_or_default()
            )));
        }

        envelope
            .result
            .ok_or_else(|| AppError::Delivery(format!("{method} returned no result")))
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }
}

#[async_trait]
impl DeliverySink for TelegramClient {
    async fn send_text(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, AppError> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: PARSE_MODE,
            link_preview_options: LinkPreviewOptions { is_disabled: true },
            reply_markup: keyboard,
        };

        let message: Message = self.call("sendMessage", &request).await?;
        Ok(message.message_id)
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), AppError> {
        let request = EditMessageTextRequest {
            chat_id,
            message_id,
            text,
            parse_mode: PARSE_MODE,
            link_preview_options: LinkPreviewOptions { is_disabled: true },
            reply_markup: keyboard,
        };

        // `result` is the edited Message, or `true` for inline messages.
        match self
            .call::<_, serde_json::Value>("editMessageText", &request)
            .await
        {
            Ok(_) => Ok(()),
            // Pressing the same page twice re-renders identical content.
            Err(AppError::Delivery(reason)) if reason.contains("message is not modified") => {
                tracing::debug!(chat_id, message_id, "Message unchanged, edit skipped");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn acknowledge(&self, interaction_id: &str, text: Option<&str>) -> Result<(), AppError> {
        let request = AnswerCallbackQueryRequest {
            callback_query_id: interaction_id,
            text,
        };

        let _: bool = self.call("answerCallbackQuery", &request).await?;
        Ok(())
    }
}
