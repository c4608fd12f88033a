//! Field extraction from the inbound webhook body.
//!
//! None of these fail: a missing field is just `None`.

use crate::{InboundRequest, MessageContent};
use serde_json::Value;

pub fn extract_remote_address(request: &InboundRequest) -> Option<String> {
    request.remote_addr.clone()
}

pub fn extract_sender(request: &InboundRequest) -> Option<String> {
    request.user.clone()
}

/// Returns the newest `user` turn of the conversation history.
///
/// The history is scanned from the end; earlier user turns and all assistant
/// or system turns are never forwarded.
pub fn extract_message(request: &InboundRequest) -> Option<String> {
    let messages = request.messages.as_ref()?;

    messages
        .iter()
        .rev()
        .find(|message| message.role.as_deref() == Some("user"))
        .and_then(|message| message.content.clone())
        .and_then(MessageContent::into_text)
}

pub fn extract_input_channel(request: &InboundRequest, default_channel: &str) -> String {
    match request.input_channel.as_deref() {
        Some(channel) if !channel.is_empty() => channel.to_string(),
        _ => default_channel.to_string(),
    }
}

pub fn extract_metadata(request: &InboundRequest) -> Option<Value> {
    request.metadata.clone()
}

/// Sender id used for the envelope: `user`, falling back to `remote_addr`.
pub fn resolve_sender(request: &InboundRequest) -> Option<String> {
    extract_sender(request).or_else(|| extract_remote_address(request))
}
