//! Weather tool: a deterministic stub.
//!
//! The same city always yields the same report, so transcripts replay
//! identically in tests.

use async_trait::async_trait;
use codeloop_core::error::ToolError;
use codeloop_core::tool::{Tool, ToolEffect};

use crate::{GET_WEATHER_INFO, scalar_input};

pub struct WeatherTool;

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        GET_WEATHER_INFO
    }

    fn description(&self) -> &str {
        "Gets the current weather for a city."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cityName": {
                    "type": "string",
                    "description": "The city to look up"
                }
            },
            "required": ["cityName"]
        })
    }

    fn effect(&self) -> ToolEffect {
        ToolEffect::Pure
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, ToolError> {
        let city = scalar_input(&input, "cityName")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'cityName' argument".into()))?;

        Ok(report(&city))
    }
}

fn report(city: &str) -> String {
    let hash: u32 = city
        .to_lowercase()
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions = [
        "clear skies",
        "partly cloudy skies",
        "overcast skies",
        "light rain",
        "scattered showers",
        "fog",
    ];

    let temperature = 10 + (hash % 26) as i32;
    let sky = conditions[(hash as usize / 7) % conditions.len()];

    format!("The weather in {city} is {temperature}°C with {sky}.")
}
