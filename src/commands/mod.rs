//! Command implementations

pub mod ask;
pub mod chat;
pub mod check;
pub mod completions;
pub mod config;

use std::env;
use std::sync::Arc;

use anyhow::Result;

use crate::agent::ConversationAgent;
use crate::api::HassClient;
use crate::completion::OpenAiClient;
use crate::config::RuntimeContext;

/// Wire the agent to the configured OpenAI and Home Assistant endpoints
pub fn build_agent(ctx: &RuntimeContext) -> Result<ConversationAgent> {
    let completion = Arc::new(OpenAiClient::from_context(ctx)?);
    let hass = Arc::new(HassClient::new(ctx)?);

    Ok(ConversationAgent::new(
        completion,
        hass.clone(),
        hass,
        ctx.agent_options(),
    ))
}

/// The local user, passed along as the speaker's context
pub fn current_user() -> Option<String> {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|name| !name.is_empty())
}
