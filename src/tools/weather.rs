//! Weather tools backed by the OpenWeatherMap REST API.
//!
//! Results are returned as the API's JSON payload text; the model does the
//! summarising.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{Arguments, ToolDescriptor, ToolError, ToolSession};
use crate::auth::{AuthContext, AuthError};

/// Default OpenWeatherMap API root.
pub const DEFAULT_OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ─────────────────────────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────────────────────────

/// Thin client for the OpenWeatherMap data API.
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenWeatherClient {
    pub fn new(api_key: impl Into<String>, base_url: Option<&str>) -> Result<Self, ToolError> {
        Self::with_timeout(api_key, base_url, DEFAULT_TIMEOUT)
    }

    /// Like [`new`](Self::new) with a custom per-request timeout.
    pub fn with_timeout(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, ToolError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or(DEFAULT_OPENWEATHER_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// GET `{base}/{endpoint}` with metric units and return the JSON body.
    pub async fn fetch(&self, endpoint: &str, params: &[(&str, String)]) -> Result<Value, ToolError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!(endpoint, "calling OpenWeatherMap");

        let response = self
            .client
            .get(&url)
            .query(params)
            .query(&[("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Api { status, body });
        }

        Ok(response.json().await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
trait WeatherTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, args: &Arguments, api: &OpenWeatherClient) -> Result<String, ToolError>;
}

/// Current conditions for a city.
struct CurrentWeather;

#[async_trait]
impl WeatherTool for CurrentWeather {
    fn name(&self) -> &str {
        "get_current_weather"
    }

    fn description(&self) -> &str {
        "Get current weather conditions for a city"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name (e.g., 'San Francisco' or 'London,UK')"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, args: &Arguments, api: &OpenWeatherClient) -> Result<String, ToolError> {
        let city = required_str(args, "city")?;
        let data = api.fetch("weather", &[("q", city.to_string())]).await?;
        Ok(data.to_string())
    }
}

/// 5-day forecast in 3-hour steps.
struct Forecast;

#[async_trait]
impl WeatherTool for Forecast {
    fn name(&self) -> &str {
        "get_forecast"
    }

    fn description(&self) -> &str {
        "Get 5-day weather forecast for a city (data points every 3 hours)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City name (e.g., 'San Francisco' or 'Tokyo,JP')"
                }
            },
            "required": ["city"]
        })
    }

    async fn execute(&self, args: &Arguments, api: &OpenWeatherClient) -> Result<String, ToolError> {
        let city = required_str(args, "city")?;
        let data = api.fetch("forecast", &[("q", city.to_string())]).await?;
        Ok(data.to_string())
    }
}

/// Current conditions at a coordinate pair.
struct WeatherByCoordinates;

#[async_trait]
impl WeatherTool for WeatherByCoordinates {
    fn name(&self) -> &str {
        "get_weather_by_coordinates"
    }

    fn description(&self) -> &str {
        "Get current weather by geographic coordinates"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "latitude": {
                    "type": "number",
                    "description": "Latitude coordinate"
                },
                "longitude": {
                    "type": "number",
                    "description": "Longitude coordinate"
                }
            },
            "required": ["latitude", "longitude"]
        })
    }

    async fn execute(&self, args: &Arguments, api: &OpenWeatherClient) -> Result<String, ToolError> {
        let lat = required_f64(args, "latitude")?;
        let lon = required_f64(args, "longitude")?;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(ToolError::InvalidArguments(format!(
                "coordinates out of range: ({}, {})",
                lat, lon
            )));
        }
        let data = api
            .fetch("weather", &[("lat", lat.to_string()), ("lon", lon.to_string())])
            .await?;
        Ok(data.to_string())
    }
}

fn required_str<'a>(args: &'a Arguments, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{}' argument", key)))
}

fn required_f64(args: &Arguments, key: &str) -> Result<f64, ToolError> {
    args.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing numeric '{}' argument", key)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// In-process tool session serving the weather tools.
///
/// The presented client key is checked against the [`AuthContext`] once, on
/// the first tool call, and that decision holds for the session's lifetime.
pub struct WeatherToolSession {
    api: OpenWeatherClient,
    tools: Vec<Box<dyn WeatherTool>>,
    auth: Arc<AuthContext>,
    client_key: Option<String>,
    auth_decision: OnceLock<Result<(), AuthError>>,
}

impl WeatherToolSession {
    pub fn new(api: OpenWeatherClient, auth: Arc<AuthContext>, client_key: Option<String>) -> Self {
        if auth.is_enabled() {
            if client_key.as_deref().is_some_and(|k| !k.is_empty()) {
                info!(keys = auth.key_count(), "authentication enabled, client key provided");
            } else {
                warn!(keys = auth.key_count(), "authentication enabled, no client key provided");
            }
        } else {
            warn!("authentication disabled, all tool calls allowed (set MCP_SERVER_API_KEYS to enable)");
        }

        Self {
            api,
            tools: vec![
                Box::new(CurrentWeather),
                Box::new(Forecast),
                Box::new(WeatherByCoordinates),
            ],
            auth,
            client_key,
            auth_decision: OnceLock::new(),
        }
    }

    fn check_auth(&self) -> &Result<(), AuthError> {
        self.auth_decision.get_or_init(|| {
            let decision = self.auth.validate_request(self.client_key.as_deref());
            match &decision {
                Ok(()) => debug!("tool session authenticated"),
                Err(e) => warn!(reason = %e, "tool session authentication failed"),
            }
            decision
        })
    }
}

#[async_trait]
impl ToolSession for WeatherToolSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        self.tools
            .iter()
            .map(|t| ToolDescriptor::from_input_schema(t.name(), t.description(), &t.parameters_schema()))
            .collect()
    }

    async fn call_tool(&self, name: &str, arguments: &Arguments) -> Result<String, ToolError> {
        if let Err(e) = self.check_auth() {
            return Ok(format!("Authentication Error: {}", e));
        }

        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            return Ok(format!("Unknown tool: {}", name));
        };

        tool.execute(arguments, &self.api).await
    }
}
