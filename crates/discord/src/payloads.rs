//! Interaction request bodies.
//!
//! Two shapes are sent: an application-command interaction (type 2) that
//! runs the generation slash command, and a message-component interaction
//! (type 3) that presses a button on a bot message.

use serde::Serialize;

/// Interaction type for application (slash) commands.
pub const APPLICATION_COMMAND: u8 = 2;

/// Interaction type for message components (buttons).
pub const MESSAGE_COMPONENT: u8 = 3;

/// Component type of a button.
const BUTTON: u8 = 2;

/// Option type of a string command option.
const STRING_OPTION: u8 = 3;

/// Identity fields shared by every interaction.
#[derive(Debug, Clone)]
pub struct InteractionContext<'a> {
    pub application_id: &'a str,
    pub guild_id: &'a str,
    pub channel_id: &'a str,
    pub session_id: &'a str,
    pub nonce: String,
}

/// Body of `POST /interactions`.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionPayload {
    #[serde(rename = "type")]
    pub kind: u8,
    pub application_id: String,
    pub guild_id: String,
    pub channel_id: String,
    pub session_id: String,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_flags: Option<u64>,
    pub data: serde_json::Value,
}

impl InteractionPayload {
    fn base(ctx: &InteractionContext<'_>, kind: u8, data: serde_json::Value) -> Self {
        Self {
            kind,
            application_id: ctx.application_id.to_string(),
            guild_id: ctx.guild_id.to_string(),
            channel_id: ctx.channel_id.to_string(),
            session_id: ctx.session_id.to_string(),
            nonce: ctx.nonce.clone(),
            message_id: None,
            message_flags: None,
            data,
        }
    }
}

/// Slash command metadata needed to invoke the generation command.
#[derive(Debug, Clone)]
pub struct CommandRef<'a> {
    pub id: &'a str,
    pub version: &'a str,
    pub name: &'a str,
}

/// Build the generation command interaction for `prompt`.
pub fn imagine_command(
    ctx: &InteractionContext<'_>,
    command: &CommandRef<'_>,
    prompt: &str,
) -> InteractionPayload {
    let data = serde_json::json!({
        "version": command.version,
        "id": command.id,
        "name": command.name,
        "type": 1,
        "options": [{ "type": STRING_OPTION, "name": "prompt", "value": prompt }],
        "application_command": {
            "id": command.id,
            "application_id": ctx.application_id,
            "version": command.version,
            "type": 1,
            "name": command.name,
        },
        "attachments": [],
    });
    InteractionPayload::base(ctx, APPLICATION_COMMAND, data)
}

/// Build a button press on `message_id` with the given custom id.
pub fn component_interaction(
    ctx: &InteractionContext<'_>,
    message_id: &str,
    message_flags: u64,
    custom_id: &str,
) -> InteractionPayload {
    let data = serde_json::json!({
        "component_type": BUTTON,
        "custom_id": custom_id,
    });
    let mut payload = InteractionPayload::base(ctx, MESSAGE_COMPONENT, data);
    payload.message_id = Some(message_id.to_string());
    payload.message_flags = Some(message_flags);
    payload
}
