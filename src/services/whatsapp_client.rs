use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::dto::whatsapp_dto::{
    GraphErrorEnvelope, OutgoingTemplateMessage, OutgoingTextMessage, SendMessageResponse,
};

/// Graph error codes for "outside the 24h customer service window".
const SESSION_EXPIRED_CODES: [i64; 2] = [131047, 470];

#[derive(Debug, Clone)]
pub struct ChannelCredentials {
    pub phone_number_id: String,
    pub access_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub provider_message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    pub status: Option<u16>,
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
        }
    }

    /// Whether the rejection means free-form text is no longer allowed and a template is required.
    /// Structured codes are checked first; free-text matching is the last resort.
    pub fn is_session_expired(&self) -> bool {
        if let Some(code) = self.code {
            if SESSION_EXPIRED_CODES.contains(&code) {
                return true;
            }
        }
        let lowered = self.message.to_lowercase();
        ["template", "24", "hours", "session"]
            .iter()
            .any(|needle| lowered.contains(needle))
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WhatsAppApi: Send + Sync {
    async fn send_text(
        &self,
        creds: &ChannelCredentials,
        to: &str,
        body: &str,
    ) -> Result<SendReceipt, ProviderError>;

    async fn send_template(
        &self,
        creds: &ChannelCredentials,
        to: &str,
        template: &str,
        language: &str,
    ) -> Result<SendReceipt, ProviderError>;
}

/// Cloud API client over `POST {base}/{phone_number_id}/messages`.
#[derive(Clone)]
pub struct GraphWhatsAppClient {
    client: Client,
    api_base: String,
}

impl GraphWhatsAppClient {
    pub fn new(api_base: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    async fn post_message<T: Serialize + Sync>(
        &self,
        creds: &ChannelCredentials,
        message: &T,
    ) -> Result<SendReceipt, ProviderError> {
        let url = format!("{}/{}/messages", self.api_base, creds.phone_number_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&creds.access_token)
            .json(message)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::transport(format!("WhatsApp API timed out: {}", e))
                } else {
                    ProviderError::transport(format!("WhatsApp API request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(parse_error(status.as_u16(), &body));
        }

        let parsed: SendMessageResponse = serde_json::from_str(&body).map_err(|e| ProviderError {
            status: Some(status.as_u16()),
            code: None,
            message: format!("Unreadable WhatsApp API response: {}", e),
        })?;
        let id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| ProviderError {
                status: Some(status.as_u16()),
                code: None,
                message: "WhatsApp API response carried no message id".to_string(),
            })?;
        Ok(SendReceipt {
            provider_message_id: id,
        })
    }
}

#[async_trait]
impl WhatsAppApi for GraphWhatsAppClient {
    async fn send_text(
        &self,
        creds: &ChannelCredentials,
        to: &str,
        body: &str,
    ) -> Result<SendReceipt, ProviderError> {
        self.post_message(creds, &OutgoingTextMessage::new(to, body))
            .await
    }

    async fn send_template(
        &self,
        creds: &ChannelCredentials,
        to: &str,
        template: &str,
        language: &str,
    ) -> Result<SendReceipt, ProviderError> {
        self.post_message(creds, &OutgoingTemplateMessage::new(to, template, language))
            .await
    }
}

fn parse_error(status: u16, body: &str) -> ProviderError {
    match serde_json::from_str::<GraphErrorEnvelope>(body) {
        Ok(envelope) => {
            let detail = envelope
                .error
                .error_data
                .as_ref()
                .and_then(|d| d.get("details"))
                .and_then(|d| d.as_str())
                .map(|d| format!(" ({})", d))
                .unwrap_or_default();
            ProviderError {
                status: Some(status),
                code: envelope.error.code.or(envelope.error.error_subcode),
                message: format!("{}{}", envelope.error.message, detail),
            }
        }
        Err(_) => ProviderError {
            status: Some(status),
            code: None,
            message: format!("WhatsApp API returned {}: {}", status, body),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_codes_mark_session_expiry() {
        let err = parse_error(
            400,
            r#"{"error":{"message":"Re-engagement message","code":131047,"error_data":{"details":"Message failed to send because more than 24 hours have passed"}}}"#,
        );
        assert_eq!(err.code, Some(131047));
        assert!(err.is_session_expired());
        assert!(err.message.contains("more than 24 hours"));
    }

    #[test]
    fn text_heuristic_applies_without_code() {
        assert!(ProviderError::transport("Session window closed").is_session_expired());
        assert!(ProviderError::transport("use a Template").is_session_expired());
        assert!(!ProviderError::transport("Invalid parameter").is_session_expired());
    }

    #[test]
    fn unknown_error_bodies_keep_raw_text() {
        let err = parse_error(502, "Bad Gateway");
        assert_eq!(err.status, Some(502));
        assert_eq!(err.code, None);
        assert!(err.message.contains("Bad Gateway"));
    }

    #[test]
    fn structured_code_outside_session_set_falls_back_to_text() {
        let err = parse_error(
            400,
            r#"{"error":{"message":"(#100) Invalid parameter","code":100}}"#,
        );
        assert!(!err.is_session_expired());
    }
}
