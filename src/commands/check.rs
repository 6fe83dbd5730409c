//! Check command - the startup health check
//!
//! A rejected API key is fatal; anything else means the service is not ready
//! yet and the check may be repeated later.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::api::HassClient;
use crate::completion::{OpenAiClient, SetupError};
use crate::config::RuntimeContext;
use crate::output::output_for_format;
use crate::prompt::StateQuery;

#[derive(Debug, Serialize)]
struct CheckReport {
    openai: String,
    model: String,
    location_name: String,
}

pub async fn run(ctx: &RuntimeContext) -> Result<()> {
    let client = OpenAiClient::from_context(ctx)?;

    match client.check().await {
        Ok(()) => log::info!("OpenAI credentials accepted"),
        Err(err @ SetupError::Authentication(_)) => {
            log::error!("{err}");
            return Err(anyhow!(err).context("OpenAI rejected the API key"));
        }
        Err(err @ SetupError::NotReady(_)) => {
            return Err(anyhow!(err).context("OpenAI is not reachable yet, try again later"));
        }
    }

    let hass = HassClient::new(ctx)?;
    let location_name = hass.location_name().await?;

    let report = CheckReport {
        openai: ctx.openai_base_url().to_string(),
        model: ctx.agent_options().model,
        location_name,
    };

    output_for_format(ctx, &report, || {
        println!("OpenAI:          ok ({})", report.openai);
        println!("Model:           {}", report.model);
        println!("Home Assistant:  ok ({})", report.location_name);
        Ok(())
    })
}
