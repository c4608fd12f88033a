pub mod collector;
pub mod completion;
pub mod extract;
pub mod pipeline;
pub mod rest;
pub mod webhook;

use http::HeaderMap;
use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};

/// Channel name reported to the pipeline when the request does not carry one.
pub const DEFAULT_CHANNEL_NAME: &str = "chat";

/// Model label reported in every completion.
pub const DEFAULT_MODEL: &str = "rasa";

/// Body of a `POST /webhook` call. Every field is optional, and a field of
/// an unexpected JSON type reads as absent instead of rejecting the body.
#[derive(serde::Deserialize, Debug, Clone, Default)]
pub struct InboundRequest {
    #[serde(default, deserialize_with = "lenient")]
    pub remote_addr: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_messages")]
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default, deserialize_with = "lenient")]
    pub input_channel: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// One turn of the conversation history carried by the request.
#[derive(serde::Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ChatMessage {
    #[serde(default, deserialize_with = "lenient")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub content: Option<MessageContent>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Turns that are not objects are kept as empty turns so the order survives.
fn lenient_messages<'de, D>(deserializer: D) -> Result<Option<Vec<ChatMessage>>, D::Error>
where
    D: Deserializer<'de>,
{
    let turns = match Value::deserialize(deserializer)? {
        Value::Array(turns) => turns,
        _ => return Ok(None),
    };

    Ok(Some(
        turns
            .into_iter()
            .map(|turn| serde_json::from_value(turn).unwrap_or_default())
            .collect(),
    ))
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(serde::Deserialize, Debug, Clone, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    /// Text of the turn. Content parts are joined line by line, non-text parts are skipped.
    pub fn into_text(self) -> Option<String> {
        match self {
            MessageContent::Text(text) => Some(text),
            MessageContent::Parts(parts) => {
                let texts: Vec<String> = parts
                    .into_iter()
                    .filter(|part| part.kind.as_deref().map_or(true, |kind| kind == "text"))
                    .filter_map(|part| part.text)
                    .collect();

                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join("\n"))
                }
            }
        }
    }
}

/// Normalized message handed to the pipeline.
#[derive(Debug, Clone)]
pub struct MessageEnvelope {
    pub text: Option<String>,
    pub sender_id: Option<String>,
    pub input_channel: String,
    pub metadata: Option<Value>,
    pub headers: HeaderMap,
}

/// Single output unit emitted by the pipeline.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default, PartialEq)]
pub struct ReplyEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Buttons, images, custom payloads. Carried along, never rendered.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReplyEvent {
    pub fn text(recipient_id: Option<String>, text: impl Into<String>) -> Self {
        Self {
            recipient_id,
            text: Some(text.into()),
            extra: Map::new(),
        }
    }
}
