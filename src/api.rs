//! Home Assistant REST API client
//!
//! Provides the two Home Assistant capabilities the agent needs: reading the
//! home's areas and entity states, and calling services.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::config::RuntimeContext;
use crate::dispatch::ServiceBus;
use crate::prompt::{AreaState, StateQuery};

/// Server-side template that dumps every area with its entities and states
const AREA_STATES_TEMPLATE: &str = r#"
{%- set ns = namespace(areas=[]) -%}
{%- for area_id in areas() -%}
  {%- set inner = namespace(entities=[]) -%}
  {%- for entity_id in area_entities(area_id) -%}
    {%- set inner.entities = inner.entities + [{"entity_id": entity_id, "state": states(entity_id)}] -%}
  {%- endfor -%}
  {%- set ns.areas = ns.areas + [{"name": area_name(area_id), "entities": inner.entities}] -%}
{%- endfor -%}
{{ ns.areas | tojson }}
"#;

/// Home Assistant REST API client
pub struct HassClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HassClient {
    /// Create a new Home Assistant client from runtime context
    pub fn new(ctx: &RuntimeContext) -> Result<Self> {
        Self::connect(ctx.server_url()?, ctx.token()?, ctx.timeout(), ctx.insecure())
    }

    pub fn connect(server_url: &str, token: &str, timeout_secs: u64, insecure: bool) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(format!("mycroft/{}", env!("CARGO_PKG_VERSION")));

        if insecure {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().context("building HTTP client")?;

        Ok(Self {
            client,
            base_url: server_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Make a GET request to the API
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/api{}", self.base_url, path);
        log::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;

        self.handle_response(response).await
    }

    /// Make a POST request to the API
    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}/api{}", self.base_url, path);
        log::debug!("POST {} {:?}", url, body);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let url = response.url().to_string();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.status_to_error(status, &url, &error_text));
        }

        response
            .json()
            .await
            .with_context(|| format!("parsing response from {url}"))
    }

    fn status_to_error(&self, status: StatusCode, url: &str, body: &str) -> anyhow::Error {
        let hint = match status {
            StatusCode::UNAUTHORIZED => "Check your authentication token (HASS_TOKEN or --token)",
            StatusCode::FORBIDDEN => "Your token may not have sufficient permissions",
            StatusCode::NOT_FOUND => "The requested service or resource was not found",
            StatusCode::SERVICE_UNAVAILABLE => "Home Assistant may be starting up or restarting",
            StatusCode::BAD_REQUEST => "Invalid service data",
            _ => "",
        };

        let msg = if body.is_empty() {
            format!("HTTP {status} from {url}")
        } else {
            format!("HTTP {status} from {url}: {body}")
        };

        if hint.is_empty() {
            anyhow!(msg)
        } else {
            anyhow!("{msg}\nHint: {hint}")
        }
    }

    // --- API Methods ---

    /// Get the instance configuration
    pub async fn get_config(&self) -> Result<HassConfig> {
        self.get("/config").await
    }

    /// Render a template server-side
    pub async fn render_template(&self, template: &str) -> Result<String> {
        let body = serde_json::json!({ "template": template });
        let url = format!("{}/api/template", self.base_url);
        log::debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.status_to_error(status, &url, &error_text));
        }

        response.text().await.context("reading template response")
    }

    /// Call a service; returns the states that changed
    pub async fn call_service(&self, domain: &str, service: &str, data: &Value) -> Result<Value> {
        self.post(&format!("/services/{domain}/{service}"), data)
            .await
    }
}

#[async_trait]
impl StateQuery for HassClient {
    async fn location_name(&self) -> Result<String> {
        Ok(self.get_config().await?.location_name)
    }

    async fn areas(&self) -> Result<Vec<AreaState>> {
        let rendered = self.render_template(AREA_STATES_TEMPLATE).await?;
        serde_json::from_str(rendered.trim()).context("parsing area states")
    }
}

#[async_trait]
impl ServiceBus for HassClient {
    async fn call_service(&self, domain: &str, service: &str, data: &Value) -> Result<()> {
        HassClient::call_service(self, domain, service, data).await?;
        Ok(())
    }
}

// --- API Types ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HassConfig {
    pub location_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub time_zone: String,
}
