//! WhatsApp Cloud API payload shapes.
//!
//! Incoming structs are lenient: every field defaults so that a callback for
//! an event type we do not model still deserializes and gets audited.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Entry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<JsonValue>,
    #[serde(default)]
    pub statuses: Vec<Status>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(default)]
    pub display_phone_number: String,
    #[serde(default)]
    pub phone_number_id: String,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Contact {
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub wa_id: String,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

/// Inbound message. Kept next to its raw JSON so the stored payload is exactly what the provider sent.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub button: Option<ButtonReply>,
    #[serde(default)]
    pub interactive: Option<Interactive>,
    #[serde(default)]
    pub image: Option<MediaBody>,
    #[serde(default)]
    pub video: Option<MediaBody>,
    #[serde(default)]
    pub document: Option<MediaBody>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ButtonReply {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Interactive {
    #[serde(default)]
    pub button_reply: Option<InteractiveReply>,
    #[serde(default)]
    pub list_reply: Option<InteractiveReply>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct InteractiveReply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct MediaBody {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
}

impl InboundMessage {
    /// Human-readable text for the inbox.
    pub fn display_text(&self) -> String {
        if let Some(text) = &self.text {
            return text.body.clone();
        }
        if let Some(button) = &self.button {
            return button.text.clone();
        }
        if let Some(interactive) = &self.interactive {
            if let Some(reply) = interactive
                .button_reply
                .as_ref()
                .or(interactive.list_reply.as_ref())
            {
                return reply.title.clone();
            }
        }
        let caption = [&self.image, &self.video, &self.document]
            .into_iter()
            .flatten()
            .find_map(|m| m.caption.clone());
        caption.unwrap_or_else(|| format!("[{}]", self.msg_type))
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Status {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub recipient_id: String,
    #[serde(default)]
    pub errors: Vec<JsonValue>,
}

impl WebhookPayload {
    pub fn changes(&self) -> impl Iterator<Item = &Change> {
        self.entry.iter().flat_map(|e| e.changes.iter())
    }

    /// First `metadata` block carrying a phone number id.
    pub fn metadata(&self) -> Option<&Metadata> {
        self.changes()
            .filter_map(|c| c.value.metadata.as_ref())
            .find(|m| !m.phone_number_id.trim().is_empty())
    }

    pub fn event_type(&self) -> String {
        self.changes()
            .map(|c| c.field.clone())
            .find(|f| !f.is_empty())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn statuses(&self) -> impl Iterator<Item = &Status> {
        self.changes().flat_map(|c| c.value.statuses.iter())
    }

    /// One inbound message per callback: the first one, with its raw JSON and sender name.
    pub fn first_message(&self) -> Option<(InboundMessage, JsonValue, Option<String>)> {
        self.changes().find_map(|change| {
            let raw = change.value.messages.first()?;
            let message: InboundMessage = serde_json::from_value(raw.clone()).ok()?;
            if message.id.is_empty() || message.from.is_empty() {
                return None;
            }
            let profile_name = change
                .value
                .contacts
                .iter()
                .find(|c| c.wa_id == message.from)
                .or(change.value.contacts.first())
                .and_then(|c| c.profile.as_ref())
                .map(|p| p.name.clone())
                .filter(|n| !n.trim().is_empty());
            Some((message, raw.clone(), profile_name))
        })
    }
}

#[derive(Debug, Serialize)]
pub struct OutgoingTextMessage {
    pub messaging_product: &'static str,
    pub recipient_type: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub text: OutgoingText,
}

#[derive(Debug, Serialize)]
pub struct OutgoingText {
    pub preview_url: bool,
    pub body: String,
}

impl OutgoingTextMessage {
    pub fn new(to: &str, body: &str) -> Self {
        Self {
            messaging_product: "whatsapp",
            recipient_type: "individual",
            to: to.to_string(),
            msg_type: "text",
            text: OutgoingText {
                preview_url: false,
                body: body.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OutgoingTemplateMessage {
    pub messaging_product: &'static str,
    pub to: String,
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub template: OutgoingTemplate,
}

#[derive(Debug, Serialize)]
pub struct OutgoingTemplate {
    pub name: String,
    pub language: TemplateLanguage,
}

#[derive(Debug, Serialize)]
pub struct TemplateLanguage {
    pub code: String,
}

impl OutgoingTemplateMessage {
    pub fn new(to: &str, name: &str, language: &str) -> Self {
        Self {
            messaging_product: "whatsapp",
            to: to.to_string(),
            msg_type: "template",
            template: OutgoingTemplate {
                name: name.to_string(),
                language: TemplateLanguage {
                    code: language.to_string(),
                },
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageResponse {
    #[serde(default)]
    pub messages: Vec<SentMessageId>,
}

#[derive(Debug, Deserialize)]
pub struct SentMessageId {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphErrorEnvelope {
    pub error: GraphError,
}

#[derive(Debug, Deserialize)]
pub struct GraphError {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub error_subcode: Option<i64>,
    #[serde(default)]
    pub error_data: Option<JsonValue>,
}
