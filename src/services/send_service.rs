use std::sync::Arc;

use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::dto::inbox_dto::SendMessageResponse;
use crate::error::{Error, Result};
use crate::middleware::auth::RequestContext;
use crate::models::channel_account::PROVIDER_WHATSAPP;
use crate::models::outbox::OutboxMessage;
use crate::services::conversation_service::ConversationService;
use crate::services::message_service::MessageService;
use crate::services::outbox_service::OutboxService;
use crate::services::tenant_service::TenantService;
use crate::services::whatsapp_client::{ChannelCredentials, ProviderError, SendReceipt, WhatsAppApi};
use crate::utils::time::now;

pub const MAX_TEXT_CHARS: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct TemplateFallback<'a> {
    pub name: &'a str,
    pub language: &'a str,
}

#[derive(Debug)]
pub struct DeliveryOutcome {
    pub result: std::result::Result<SendReceipt, ProviderError>,
    pub used_template: bool,
    pub template: Option<String>,
}

impl DeliveryOutcome {
    fn send_meta(&self) -> JsonValue {
        json!({
            "usedTemplate": self.used_template,
            "send": { "usedTemplate": self.used_template, "template": self.template },
        })
    }

    fn failure_meta(&self, error: &str) -> JsonValue {
        json!({
            "usedTemplate": self.used_template,
            "failure": {
                "error": error,
                "at": now(),
                "usedTemplate": self.used_template,
                "template": self.template,
            },
        })
    }
}

/// Sends free-form text; when the provider says the customer-service window has lapsed,
/// retries exactly once with the approved template.
pub async fn deliver_with_fallback(
    api: &dyn WhatsAppApi,
    creds: &ChannelCredentials,
    to: &str,
    text: &str,
    fallback: TemplateFallback<'_>,
) -> DeliveryOutcome {
    match api.send_text(creds, to, text).await {
        Ok(receipt) => DeliveryOutcome {
            result: Ok(receipt),
            used_template: false,
            template: None,
        },
        Err(e) if e.is_session_expired() => {
            tracing::info!(to, template = fallback.name, error = %e, "session window closed, sending template");
            DeliveryOutcome {
                result: api
                    .send_template(creds, to, fallback.name, fallback.language)
                    .await,
                used_template: true,
                template: Some(fallback.name.to_string()),
            }
        }
        Err(e) => DeliveryOutcome {
            result: Err(e),
            used_template: false,
            template: None,
        },
    }
}

#[derive(Clone)]
pub struct SendService {
    tenants: TenantService,
    conversations: ConversationService,
    messages: MessageService,
    outbox: OutboxService,
    api: Arc<dyn WhatsAppApi>,
    fallback_template: String,
    template_lang: String,
}

impl SendService {
    pub fn new(
        tenants: TenantService,
        conversations: ConversationService,
        messages: MessageService,
        outbox: OutboxService,
        api: Arc<dyn WhatsAppApi>,
        fallback_template: String,
        template_lang: String,
    ) -> Self {
        Self {
            tenants,
            conversations,
            messages,
            outbox,
            api,
            fallback_template,
            template_lang,
        }
    }

    fn fallback(&self) -> TemplateFallback<'_> {
        TemplateFallback {
            name: &self.fallback_template,
            language: &self.template_lang,
        }
    }

    /// Queues and immediately attempts one outbound text. Provider rejections are reported
    /// through `ok: false`, never as an HTTP error.
    pub async fn send_text(
        &self,
        ctx: &RequestContext,
        conversation_id: Uuid,
        text: &str,
    ) -> Result<SendMessageResponse> {
        let business_id = ctx.business_id()?;
        let text = text.trim();
        if text.is_empty() || text.chars().count() > MAX_TEXT_CHARS {
            return Err(Error::BadRequest(format!(
                "text must be between 1 and {} characters",
                MAX_TEXT_CHARS
            )));
        }

        let conversation = self.conversations.get(business_id, conversation_id).await?;
        let to = conversation.dialable_phone().ok_or_else(|| {
            Error::BadRequest("conversation has no contact phone to send to".to_string())
        })?;
        let creds = self.tenants.credentials_for(business_id).await?;

        let (outbox, message) = self
            .outbox
            .enqueue(&conversation, PROVIDER_WHATSAPP, &to, text)
            .await?;

        let Some(claimed) = self.outbox.claim(outbox.id).await? else {
            tracing::info!(outbox_id = %outbox.id, "outbox row already claimed by worker");
            return Ok(SendMessageResponse {
                ok: true,
                message,
                outbox_id: outbox.id,
                used_template: false,
                error: None,
            });
        };

        let outcome =
            deliver_with_fallback(self.api.as_ref(), &creds, &to, text, self.fallback()).await;

        match &outcome.result {
            Ok(receipt) => {
                self.outbox.mark_sent(claimed.id).await?;
                let message = self
                    .messages
                    .mark_sent(message.id, &receipt.provider_message_id, outcome.send_meta())
                    .await?;
                tracing::info!(
                    %business_id,
                    outbox_id = %claimed.id,
                    provider_message_id = %receipt.provider_message_id,
                    used_template = outcome.used_template,
                    "message sent"
                );
                Ok(SendMessageResponse {
                    ok: true,
                    message,
                    outbox_id: claimed.id,
                    used_template: outcome.used_template,
                    error: None,
                })
            }
            Err(e) => {
                let error = e.to_string();
                self.outbox.mark_failed(claimed.id, &error).await?;
                let message = self
                    .messages
                    .mark_failed(message.id, outcome.failure_meta(&error))
                    .await?;
                tracing::warn!(
                    %business_id,
                    outbox_id = %claimed.id,
                    used_template = outcome.used_template,
                    error = %error,
                    "message send failed"
                );
                Ok(SendMessageResponse {
                    ok: false,
                    message,
                    outbox_id: claimed.id,
                    used_template: outcome.used_template,
                    error: Some(error),
                })
            }
        }
    }
}

/// Background sender for PENDING rows left by admin retries or interrupted requests.
#[derive(Clone)]
pub struct OutboxWorker {
    tenants: TenantService,
    messages: MessageService,
    outbox: OutboxService,
    api: Arc<dyn WhatsAppApi>,
    fallback_template: String,
    template_lang: String,
    max_attempts: i32,
    batch_size: i64,
}

impl OutboxWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: TenantService,
        messages: MessageService,
        outbox: OutboxService,
        api: Arc<dyn WhatsAppApi>,
        fallback_template: String,
        template_lang: String,
        max_attempts: i32,
    ) -> Self {
        Self {
            tenants,
            messages,
            outbox,
            api,
            fallback_template,
            template_lang,
            max_attempts: max_attempts.max(1),
            batch_size: 10,
        }
    }

    /// Claims due rows and attempts each once. Returns how many rows were handled.
    pub async fn run_once(&self) -> Result<usize> {
        let rows = self.outbox.claim_due(self.batch_size).await?;
        let handled = rows.len();
        for row in rows {
            if let Err(e) = self.deliver(&row).await {
                tracing::error!(outbox_id = %row.id, error = ?e, "outbox delivery bookkeeping failed");
            }
        }
        Ok(handled)
    }

    /// Attempts one already-claimed (SENDING) row and records the outcome.
    pub async fn deliver(&self, row: &OutboxMessage) -> Result<()> {
        let fallback = TemplateFallback {
            name: &self.fallback_template,
            language: &self.template_lang,
        };
        let outcome = match self.tenants.credentials_for(row.business_id).await {
            Ok(creds) => {
                deliver_with_fallback(self.api.as_ref(), &creds, &row.to_phone, &row.text, fallback)
                    .await
            }
            Err(e) => DeliveryOutcome {
                result: Err(ProviderError::transport(e.to_string())),
                used_template: false,
                template: None,
            },
        };

        match &outcome.result {
            Ok(receipt) => {
                self.outbox.mark_sent(row.id).await?;
                if let Some(message_id) = row.message_id {
                    self.messages
                        .mark_sent(message_id, &receipt.provider_message_id, outcome.send_meta())
                        .await?;
                }
                tracing::info!(outbox_id = %row.id, attempt = row.attempt_count, "outbox message delivered");
            }
            Err(e) if row.attempt_count < self.max_attempts => {
                self.outbox
                    .reschedule(row.id, row.attempt_count, &e.to_string())
                    .await?;
                tracing::warn!(outbox_id = %row.id, attempt = row.attempt_count, error = %e, "outbox delivery rescheduled");
            }
            Err(e) => {
                let error = e.to_string();
                self.outbox.mark_failed(row.id, &error).await?;
                if let Some(message_id) = row.message_id {
                    self.messages
                        .mark_failed(message_id, outcome.failure_meta(&error))
                        .await?;
                }
                tracing::error!(outbox_id = %row.id, attempts = row.attempt_count, error = %error, "outbox delivery gave up");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::whatsapp_client::MockWhatsAppApi;
    use tokio_test::{assert_err, assert_ok};

    const FALLBACK: TemplateFallback<'static> = TemplateFallback {
        name: "hello_world",
        language: "es_MX",
    };

    fn creds() -> ChannelCredentials {
        ChannelCredentials {
            phone_number_id: "1234567890".to_string(),
            access_token: "token".to_string(),
        }
    }

    fn session_expired() -> ProviderError {
        ProviderError {
            status: Some(400),
            code: Some(131047),
            message: "Re-engagement message".to_string(),
        }
    }

    #[tokio::test]
    async fn accepted_text_does_not_touch_templates() {
        let mut api = MockWhatsAppApi::new();
        api.expect_send_text().times(1).returning(|_, _, _| {
            Ok(SendReceipt {
                provider_message_id: "wamid.OUT".to_string(),
            })
        });
        api.expect_send_template().times(0);

        let outcome = deliver_with_fallback(&api, &creds(), "5215512345678", "hola", FALLBACK).await;
        let receipt = assert_ok!(outcome.result);
        assert_eq!(receipt.provider_message_id, "wamid.OUT");
        assert!(!outcome.used_template);
        assert_eq!(outcome.template, None);
    }

    #[tokio::test]
    async fn session_expiry_falls_back_to_template_exactly_once() {
        let mut api = MockWhatsAppApi::new();
        api.expect_send_text()
            .times(1)
            .returning(|_, _, _| Err(session_expired()));
        api.expect_send_template().times(1).returning(|_, _, name, lang| {
            assert_eq!(name, "hello_world");
            assert_eq!(lang, "es_MX");
            Ok(SendReceipt {
                provider_message_id: "wamid.TPL".to_string(),
            })
        });

        let outcome = deliver_with_fallback(&api, &creds(), "5215512345678", "hola", FALLBACK).await;
        assert_ok!(&outcome.result);
        assert!(outcome.used_template);
        assert_eq!(outcome.template.as_deref(), Some("hello_world"));
        assert_eq!(outcome.send_meta()["send"]["usedTemplate"], true);
    }

    #[tokio::test]
    async fn failed_template_is_reported_as_failure() {
        let mut api = MockWhatsAppApi::new();
        api.expect_send_text()
            .times(1)
            .returning(|_, _, _| Err(session_expired()));
        api.expect_send_template()
            .times(1)
            .returning(|_, _, _, _| Err(ProviderError::transport("template not approved")));

        let outcome = deliver_with_fallback(&api, &creds(), "5215512345678", "hola", FALLBACK).await;
        let err = assert_err!(&outcome.result);
        assert!(err.message.contains("template not approved"));
        assert!(outcome.used_template);

        let meta = outcome.failure_meta(&err.message);
        assert_eq!(meta["usedTemplate"], true);
        assert_eq!(meta["failure"]["template"], "hello_world");
        assert_eq!(meta["failure"]["error"], "template not approved");
    }

    #[tokio::test]
    async fn unrelated_rejection_skips_template() {
        let mut api = MockWhatsAppApi::new();
        api.expect_send_text().times(1).returning(|_, _, _| {
            Err(ProviderError {
                status: Some(400),
                code: Some(100),
                message: "(#100) Invalid parameter".to_string(),
            })
        });
        api.expect_send_template().times(0);

        let outcome = deliver_with_fallback(&api, &creds(), "5215512345678", "hola", FALLBACK).await;
        assert_err!(&outcome.result);
        assert!(!outcome.used_template);
    }
}
