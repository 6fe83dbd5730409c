//! The conversation agent
//!
//! Turns one user utterance into one spoken reply: pick or seed the
//! conversation, ask the model, decode its reply, run the requested service
//! calls and wrap whatever should be said in a [`ConversationResult`].
//! Every failure along the way becomes speech; `process` itself cannot fail.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::completion::{CompletionClient, CompletionRequest};
use crate::config::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::dispatch::{self, ServiceBus};
use crate::history::{new_conversation_id, HistoryStore, Turn};
use crate::prompt::{self, StateQuery, DEFAULT_HOME_INFO_TEMPLATE, DEFAULT_PROMPT};
use crate::reply::{parse_reply, ParsedReply};

/// Model and prompt settings
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    pub model: String,
    pub max_tokens: u32,
    pub top_p: f64,
    pub temperature: f64,
    pub prompt: String,
    pub home_info_template: String,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            temperature: DEFAULT_TEMPERATURE,
            prompt: DEFAULT_PROMPT.to_string(),
            home_info_template: DEFAULT_HOME_INFO_TEMPLATE.to_string(),
        }
    }
}

/// One incoming utterance
#[derive(Debug, Clone)]
pub struct ConversationInput {
    pub text: String,
    /// Id of the conversation to continue; unknown ids start a new one
    pub conversation_id: Option<String>,
    pub language: String,
    /// Whoever is speaking, if the host knows
    pub user_id: Option<String>,
}

/// The reply to one utterance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationResult {
    pub language: String,
    pub speech: String,
    pub conversation_id: String,
}

impl ConversationResult {
    pub fn new(speech: impl Into<String>, conversation_id: &str, language: &str) -> Self {
        Self {
            language: language.to_string(),
            speech: speech.into(),
            conversation_id: conversation_id.to_string(),
        }
    }
}

pub struct ConversationAgent {
    completion: Arc<dyn CompletionClient>,
    states: Arc<dyn StateQuery>,
    bus: Arc<dyn ServiceBus>,
    options: AgentOptions,
    history: HistoryStore,
}

impl ConversationAgent {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        states: Arc<dyn StateQuery>,
        bus: Arc<dyn ServiceBus>,
        options: AgentOptions,
    ) -> Self {
        Self {
            completion,
            states,
            bus,
            options,
            history: HistoryStore::new(),
        }
    }

    #[cfg(test)]
    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Handle one utterance
    pub async fn process(&self, input: &ConversationInput) -> ConversationResult {
        log::debug!(
            "Processing utterance: text='{}', lang={}, conversation_id={:?}, user={:?}",
            input.text,
            input.language,
            input.conversation_id,
            input.user_id
        );

        let user_turn = prompt::user_turn(&input.text);

        if let Some(id) = input.conversation_id.as_deref() {
            if let Some(mut conversation) = self.history.lock(id).await {
                let mut messages = conversation.clone();
                messages.push(user_turn.clone());

                let speech = match self.complete(id, messages).await {
                    Ok(raw) => {
                        conversation.push(user_turn);
                        drop(conversation);
                        self.respond(&raw).await
                    }
                    Err(message) => message,
                };
                return ConversationResult::new(speech, id, &input.language);
            }

            log::debug!("Unknown conversation {id}, starting a new one");
        }

        let id = new_conversation_id();
        log::info!(
            "Starting conversation {id} ({} stored)",
            self.history.len()
        );

        let home_info = match self.home_info().await {
            Ok(text) => text,
            Err(err) => {
                log::warn!("Error rendering prompt: {err:#}");
                return ConversationResult::new(
                    format!("Sorry, I had a problem with my template: {err:#}"),
                    &id,
                    &input.language,
                );
            }
        };

        let messages = prompt::seed_messages(&self.options.prompt, &home_info, user_turn);
        let speech = match self.complete(&id, messages.clone()).await {
            Ok(raw) => {
                self.history.insert(&id, messages);
                self.respond(&raw).await
            }
            Err(message) => message,
        };

        ConversationResult::new(speech, &id, &input.language)
    }

    async fn home_info(&self) -> Result<String> {
        let location_name = self.states.location_name().await?;
        let areas = self.states.areas().await?;
        prompt::render_home_info(&self.options.home_info_template, &location_name, &areas)
    }

    /// Ask the model; a failure comes back as the message to speak
    async fn complete(&self, conversation_id: &str, messages: Vec<Turn>) -> Result<String, String> {
        let request = CompletionRequest {
            model: self.options.model.clone(),
            messages,
            max_tokens: self.options.max_tokens,
            top_p: self.options.top_p,
            temperature: self.options.temperature,
            user: conversation_id.to_string(),
        };

        self.completion.complete(&request).await.map_err(|err| {
            log::warn!("Completion request failed: {err:#}");
            format!("Sorry, I had a problem talking to OpenAI: {err:#}")
        })
    }

    /// Decode the model's reply and run its command
    async fn respond(&self, raw: &str) -> String {
        log::debug!("Model replied: {raw}");

        match parse_reply(raw) {
            ParsedReply::Comment(comment) => comment,
            ParsedReply::CommentWithCommand(comment, command) => {
                dispatch::execute(self.bus.as_ref(), &command)
                    .await
                    .unwrap_or(comment)
            }
            ParsedReply::Unparseable(message) => {
                log::warn!("Model reply was not valid: {raw}");
                message
            }
        }
    }
}
