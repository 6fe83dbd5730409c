//! Ask command - send one utterance to the agent
//!
//! History lives in memory, so every run starts a new conversation; use
//! `chat` to keep one going.

use anyhow::Result;

use crate::agent::ConversationInput;
use crate::cli::AskCommand;
use crate::commands::{build_agent, current_user};
use crate::config::RuntimeContext;
use crate::output::output_for_format;

pub async fn run(ctx: &RuntimeContext, cmd: AskCommand) -> Result<()> {
    let agent = build_agent(ctx)?;

    let input = ConversationInput {
        text: cmd.words.join(" "),
        conversation_id: None,
        language: cmd.lang,
        user_id: current_user(),
    };

    let result = agent.process(&input).await;

    output_for_format(ctx, &result, || {
        println!("{}", result.speech);
        log::debug!("Conversation ID: {}", result.conversation_id);
        Ok(())
    })
}
