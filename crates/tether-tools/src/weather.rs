//! get_weather tool: canned weather report for a location.

use serde::Deserialize;
use tether_types::{LocalTool, ToolDescriptor, ToolError};

const NAME: &str = "get_weather";

/// Reports the weather for a city. The report is fixed at 70 degrees.
pub struct GetWeatherTool;

#[derive(Deserialize)]
struct WeatherInput {
    location: String,
}

impl LocalTool for GetWeatherTool {
    fn name(&self) -> &str {
        NAME
    }

    fn definition(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            NAME,
            "Get the current weather in a given location",
            serde_json::json!({
                "type": "object",
                "required": ["location"],
                "properties": {
                    "location": {
                        "type": "string",
                        "description": "The city and state, e.g. San Francisco, CA"
                    }
                }
            }),
        )
    }

    fn execute(&self, input: &serde_json::Value) -> Result<String, ToolError> {
        let input = WeatherInput::deserialize(input).map_err(|e| ToolError::InvalidInput {
            tool: NAME.into(),
            message: e.to_string(),
        })?;
        Ok(format!("The weather for {} is 70 degrees.", input.location))
    }
}
