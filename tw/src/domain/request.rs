//! The traveller's request that starts a session

use serde::{Deserialize, Serialize};

/// Placeholder for optional inputs the traveller skipped
pub const NOT_SPECIFIED: &str = "not specified";

/// Inputs to a new session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripRequest {
    /// Free-text trip description, e.g. "5 days in Lisbon in May"
    #[serde(alias = "query")]
    pub user_query: String,

    #[serde(default, alias = "origin")]
    pub origin_city: Option<String>,

    #[serde(default, alias = "date")]
    pub travel_date: Option<String>,

    #[serde(default, alias = "days", alias = "duration")]
    pub trip_duration: Option<String>,
}

impl TripRequest {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.travel_date = Some(date.into());
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.trip_duration = Some(duration.into());
        self
    }

    pub fn travel_date_or_default(&self) -> &str {
        or_not_specified(&self.travel_date)
    }

    pub fn trip_duration_or_default(&self) -> &str {
        or_not_specified(&self.trip_duration)
    }

    pub fn origin_city_or_default(&self) -> &str {
        or_not_specified(&self.origin_city)
    }
}

fn or_not_specified(value: &Option<String>) -> &str {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => NOT_SPECIFIED,
    }
}
