//! Flight search collaborator and its MCP tool wrapper

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use skyvoice_core::{EntityKind, PreservedEntities};

use crate::mcp::{InputSchema, PropertySchema, Tool, ToolError, ToolSchema};

pub const TOOL_NAME: &str = "search_flights";

/// IATA code; case is normalized when building `SearchParams`
const AIRPORT_CODE: &str = "^[A-Za-z]{3}$";

const CABIN_CLASSES: &[&str] = &["economy", "premium_economy", "business", "first"];

/// Validated search request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchParams {
    pub origin: String,
    pub destination: String,
    /// ISO `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cabin_class: Option<String>,
    #[serde(default)]
    pub nonstop: bool,
    pub passengers: u32,
}

impl SearchParams {
    /// Key identifying equivalent searches
    pub fn cache_key(&self) -> String {
        format!(
            "{}-{}|{}|{}|{}|{}",
            self.origin,
            self.destination,
            self.date.as_deref().unwrap_or("-"),
            self.cabin_class.as_deref().unwrap_or("-"),
            self.nonstop,
            self.passengers
        )
    }
}

/// Arguments as requested by the language model; any may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchArguments {
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub cabin_class: Option<String>,
    #[serde(default)]
    pub nonstop: Option<bool>,
    #[serde(default)]
    pub passengers: Option<u32>,
}

impl SearchArguments {
    pub fn from_value(value: &Value) -> Result<Self, ToolError> {
        serde_json::from_value(value.clone()).map_err(|e| ToolError::invalid_params(e.to_string()))
    }

    /// Fill unspecified fields from entities preserved across the conversation
    pub fn fill_from(&mut self, entities: &PreservedEntities) {
        let fill = |slot: &mut Option<String>, kind| {
            if slot.as_deref().map_or(true, |s| s.trim().is_empty()) {
                if let Some(value) = entities.get(kind) {
                    *slot = Some(value.to_string());
                }
            }
        };
        fill(&mut self.origin, EntityKind::Origin);
        fill(&mut self.destination, EntityKind::Destination);
        fill(&mut self.date, EntityKind::Date);
        fill(&mut self.cabin_class, EntityKind::CabinClass);

        if self.nonstop.is_none() {
            self.nonstop = entities.get(EntityKind::Nonstop).map(|v| v == "true");
        }
    }

    /// Required fields still missing
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.origin.as_deref().map_or(true, |s| s.trim().is_empty()) {
            missing.push("origin");
        }
        if self.destination.as_deref().map_or(true, |s| s.trim().is_empty()) {
            missing.push("destination");
        }
        missing
    }

    pub fn into_params(self) -> Result<SearchParams, ToolError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(ToolError::invalid_params(format!(
                "Missing required field(s): {}",
                missing.join(", ")
            )));
        }

        Ok(SearchParams {
            origin: self.origin.unwrap_or_default().trim().to_ascii_uppercase(),
            destination: self.destination.unwrap_or_default().trim().to_ascii_uppercase(),
            date: self.date,
            cabin_class: self.cabin_class,
            nonstop: self.nonstop.unwrap_or(false),
            passengers: self.passengers.unwrap_or(1).max(1),
        })
    }
}

/// One bookable option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightOption {
    pub carrier: String,
    pub flight_number: String,
    pub departure: String,
    pub arrival: String,
    pub stops: u32,
    pub price_usd: f64,
}

/// Result of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub options: Vec<FlightOption>,
    /// Served from an expired cache entry or otherwise not live
    #[serde(default)]
    pub approximate: bool,
    /// Served from cache
    #[serde(default)]
    pub cached: bool,
}

impl SearchOutcome {
    pub fn live(options: Vec<FlightOption>) -> Self {
        Self {
            options,
            approximate: false,
            cached: false,
        }
    }

    pub fn cheapest(&self) -> Option<&FlightOption> {
        self.options
            .iter()
            .min_by(|a, b| a.price_usd.total_cmp(&b.price_usd))
    }
}

/// Remote flight lookup
#[async_trait]
pub trait FlightSearch: Send + Sync {
    async fn search(&self, params: &SearchParams) -> Result<SearchOutcome, ToolError>;
}

/// In-process flight search with fixed results and latency
#[derive(Debug, Clone)]
pub struct StubFlightSearch {
    options: Vec<FlightOption>,
    latency: Duration,
    fail_with: Option<ToolError>,
}

impl StubFlightSearch {
    pub fn new(options: Vec<FlightOption>) -> Self {
        Self {
            options,
            latency: Duration::ZERO,
            fail_with: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing(mut self, error: ToolError) -> Self {
        self.fail_with = Some(error);
        self
    }

    /// A couple of plausible options for any route
    pub fn sample() -> Self {
        Self::new(Self::sample_options())
    }

    pub fn sample_options() -> Vec<FlightOption> {
        vec![
            FlightOption {
                carrier: "SkyAir".to_string(),
                flight_number: "SA101".to_string(),
                departure: "08:05".to_string(),
                arrival: "11:20".to_string(),
                stops: 0,
                price_usd: 289.0,
            },
            FlightOption {
                carrier: "Coastline".to_string(),
                flight_number: "CL442".to_string(),
                departure: "13:40".to_string(),
                arrival: "18:55".to_string(),
                stops: 1,
                price_usd: 214.0,
            },
        ]
    }
}

#[async_trait]
impl FlightSearch for StubFlightSearch {
    async fn search(&self, params: &SearchParams) -> Result<SearchOutcome, ToolError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }

        let options = self
            .options
            .iter()
            .filter(|o| !params.nonstop || o.stops == 0)
            .cloned()
            .collect();
        Ok(SearchOutcome::live(options))
    }
}

/// MCP wrapper exposing a `FlightSearch` to the language model
#[derive(Clone)]
pub struct FlightSearchTool {
    search: Arc<dyn FlightSearch>,
}

impl FlightSearchTool {
    pub fn new(search: Arc<dyn FlightSearch>) -> Self {
        Self { search }
    }

    pub async fn search(&self, params: &SearchParams) -> Result<SearchOutcome, ToolError> {
        self.search.search(params).await
    }
}

#[async_trait]
impl Tool for FlightSearchTool {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: TOOL_NAME.to_string(),
            description: "Search flights between two airports".to_string(),
            input_schema: InputSchema::object()
                .property(
                    "origin",
                    PropertySchema::string("Origin IATA airport code").with_pattern(AIRPORT_CODE),
                    true,
                )
                .property(
                    "destination",
                    PropertySchema::string("Destination IATA airport code").with_pattern(AIRPORT_CODE),
                    true,
                )
                .property(
                    "date",
                    PropertySchema::string("Departure date, YYYY-MM-DD"),
                    false,
                )
                .property(
                    "cabin_class",
                    PropertySchema::enum_type("Cabin class", CABIN_CLASSES),
                    false,
                )
                .property("nonstop", PropertySchema::boolean("Only nonstop flights"), false)
                .property(
                    "passengers",
                    PropertySchema::integer("Number of passengers").with_minimum(1.0),
                    false,
                ),
        }
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        self.validate(&input)?;
        let params = SearchArguments::from_value(&input)?.into_params()?;
        let outcome = self.search(&params).await?;
        serde_json::to_value(outcome).map_err(|e| ToolError::Upstream(e.to_string()))
    }
}
