//! Chat command - an interactive conversation on stdin
//!
//! Every line is one utterance; the conversation id returned by the first
//! reply is reused for the rest of the session.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::agent::ConversationInput;
use crate::commands::{build_agent, current_user};
use crate::config::RuntimeContext;
use crate::output::output_for_format;

pub async fn run(ctx: &RuntimeContext, lang: &str) -> Result<()> {
    let agent = build_agent(ctx)?;
    let user_id = current_user();
    let mut conversation_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush().context("flushing stdout")?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("reading from stdin")?,
            _ = tokio::signal::ctrl_c() => {
                log::debug!("Received Ctrl+C, ending chat");
                println!();
                break;
            }
        };

        let Some(line) = line else {
            println!();
            break;
        };

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        let input = ConversationInput {
            text: text.to_string(),
            conversation_id: conversation_id.clone(),
            language: lang.to_string(),
            user_id: user_id.clone(),
        };

        let result = agent.process(&input).await;
        output_for_format(ctx, &result, || {
            println!("{}", result.speech);
            Ok(())
        })?;

        conversation_id = Some(result.conversation_id);
    }

    Ok(())
}
