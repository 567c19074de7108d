//! Current-conditions weather tool backed by Open-Meteo.
//!
//! Two requests per call: geocode the place name, then fetch the current
//! conditions at the first match.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_arguments, Tool, ToolError};

/// Looks up current weather by place name
#[derive(Clone, Debug)]
pub struct Weather {
    http_client: reqwest::Client,
    geocoding_base_url: String,
    forecast_base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeatherArgs {
    location: String,
}

#[derive(Debug, Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<Place>,
}

#[derive(Debug, Deserialize)]
struct Place {
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    #[serde(default)]
    relative_humidity_2m: Option<f64>,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
    #[serde(default)]
    weather_code: Option<u16>,
}

impl Weather {
    /// Create the tool against the given Open-Meteo endpoints
    pub fn new(
        http_client: reqwest::Client,
        geocoding_base_url: &str,
        forecast_base_url: &str,
    ) -> Self {
        Self {
            http_client,
            geocoding_base_url: geocoding_base_url.trim_end_matches('/').to_string(),
            forecast_base_url: forecast_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn geocode(&self, location: &str) -> anyhow::Result<Place> {
        let url = format!("{}/v1/search", self.geocoding_base_url);
        let response: GeocodingResponse = self
            .http_client
            .get(&url)
            .query(&[("name", location), ("count", "1")])
            .send()
            .await
            .with_context(|| format!("geocoding request to {url} failed"))?
            .error_for_status()?
            .json()
            .await
            .context("invalid geocoding response")?;

        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("no place found for {location:?}"))
    }

    async fn current(&self, place: &Place) -> anyhow::Result<CurrentConditions> {
        let url = format!("{}/v1/forecast", self.forecast_base_url);
        let response: ForecastResponse = self
            .http_client
            .get(&url)
            .query(&[
                ("latitude", place.latitude.to_string()),
                ("longitude", place.longitude.to_string()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code".to_string(),
                ),
            ])
            .send()
            .await
            .with_context(|| format!("forecast request to {url} failed"))?
            .error_for_status()?
            .json()
            .await
            .context("invalid forecast response")?;

        Ok(response.current)
    }
}

#[async_trait]
impl Tool for Weather {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city or place"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or place name, e.g. Paris"
                }
            },
            "required": ["location"]
        })
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: WeatherArgs = parse_arguments(self.name(), arguments)?;
        let place = self.geocode(&args.location).await?;
        let current = self.current(&place).await?;

        Ok(json!({
            "location": place.name,
            "country": place.country,
            "temperature": current.temperature_2m,
            "humidity": current.relative_humidity_2m,
            "windSpeed": current.wind_speed_10m,
            "conditions": current.weather_code.map(describe_code),
        }))
    }
}

/// WMO weather interpretation code → short description
fn describe_code(code: u16) -> &'static str {
    match code {
        0 => "clear sky",
        1..=3 => "partly cloudy",
        45 | 48 => "fog",
        51..=57 => "drizzle",
        61..=67 => "rain",
        71..=77 => "snow",
        80..=82 => "rain showers",
        85 | 86 => "snow showers",
        95..=99 => "thunderstorm",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn tool_for(server: &MockServer) -> Weather {
        Weather::new(reqwest::Client::new(), &server.uri(), &server.uri())
    }

    #[tokio::test]
    async fn test_weather_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .and(query_param("name", "Oslo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{"name": "Oslo", "latitude": 59.91, "longitude": 10.75, "country": "Norway"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "current": {
                    "temperature_2m": 3.5,
                    "relative_humidity_2m": 80.0,
                    "wind_speed_10m": 12.0,
                    "weather_code": 61
                }
            })))
            .mount(&server)
            .await;

        let output = tool_for(&server)
            .await
            .call(json!({"location": "Oslo"}))
            .await
            .unwrap();

        assert_eq!(output["location"], "Oslo");
        assert_eq!(output["country"], "Norway");
        assert_eq!(output["temperature"], 3.5);
        assert_eq!(output["conditions"], "rain");
    }

    #[tokio::test]
    async fn test_unknown_place() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let err = tool_for(&server)
            .await
            .call(json!({"location": "Atlantis"}))
            .await
            .unwrap_err();

        assert!(matches!(err, ToolError::Execution(_)));
        assert!(err.to_string().contains("Atlantis"));
    }

    #[tokio::test]
    async fn test_missing_location_is_invalid() {
        let server = MockServer::start().await;
        let err = tool_for(&server)
            .await
            .call(json!({"city": "Oslo"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_describe_code() {
        assert_eq!(describe_code(0), "clear sky");
        assert_eq!(describe_code(95), "thunderstorm");
        assert_eq!(describe_code(1000), "unknown");
    }
}
