//! Command dispatch to the Home Assistant service bus

use anyhow::Result;
use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde_json::Value;

use crate::reply::{Command, ServiceCall};

/// Executes named domain/service actions
#[async_trait]
pub trait ServiceBus: Send + Sync {
    async fn call_service(&self, domain: &str, service: &str, data: &Value) -> Result<()>;
}

/// Run a command against the bus.
///
/// Returns the message to speak instead of the model's comment when a call
/// fails, or `None` when the comment should be delivered as is. A batch is
/// issued concurrently and fails as a whole if any call fails.
pub async fn execute(bus: &dyn ServiceBus, command: &Command) -> Option<String> {
    let outcome = match command {
        Command::Single(call) => invoke(bus, call).await,
        Command::Batch(calls) => try_join_all(calls.iter().map(|call| invoke(bus, call)))
            .await
            .map(|_| ()),
        Command::Unrecognized(value) => {
            log::warn!("Ignoring command with unrecognized shape: {value}");
            Ok(())
        }
    };

    match outcome {
        Ok(()) => None,
        Err((call, err)) => {
            log::warn!("Service call {}.{} failed: {:#}", call.domain, call.service, err);
            Some(failure_message(call, &err))
        }
    }
}

async fn invoke<'a>(
    bus: &dyn ServiceBus,
    call: &'a ServiceCall,
) -> Result<(), (&'a ServiceCall, anyhow::Error)> {
    log::debug!("Calling {}.{} with data: {:?}", call.domain, call.service, call.data);

    let data = Value::Object(call.data.clone());
    bus.call_service(&call.domain, &call.service, &data)
        .await
        .map_err(|err| (call, err))
}

fn failure_message(call: &ServiceCall, err: &anyhow::Error) -> String {
    format!(
        "Unable to execute: ({}, {}, {}) \n Error: {:#}",
        call.domain,
        call.service,
        Value::Object(call.data.clone()),
        err
    )
}
