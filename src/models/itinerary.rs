use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compose::Shaped;
use crate::compose::schema::{array, integer, object, string};

pub const MIN_DAYS_PER_CITY: u32 = 1;
pub const MAX_DAYS_PER_CITY: u32 = 7;

/// One place to visit within a city.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityStop {
    pub name: String,
    /// landmark, author_site, museum, cafe...
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub time_of_day: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityPlan {
    pub name: String,
    pub country: String,
    pub days_suggested: u32,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub stops: Vec<CityStop>,
}

/// The final composed trip.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripItinerary {
    #[serde(default)]
    pub cities: Vec<CityPlan>,
    #[serde(default)]
    pub summary_text: String,
}

impl Shaped for TripItinerary {
    fn schema() -> Value {
        let stop = object(
            &[
                ("name", string()),
                ("type", string()),
                ("reason", string()),
                ("time_of_day", string()),
                ("notes", string()),
            ],
            &["name", "type", "reason", "time_of_day"],
        );
        let city = object(
            &[
                ("name", string()),
                ("country", string()),
                ("days_suggested", integer()),
                ("overview", string()),
                ("stops", array(stop)),
            ],
            &["name", "country", "days_suggested", "overview", "stops"],
        );
        object(
            &[("cities", array(city)), ("summary_text", string())],
            &["cities", "summary_text"],
        )
    }

    fn check(&self) -> Result<(), String> {
        for city in &self.cities {
            if !(MIN_DAYS_PER_CITY..=MAX_DAYS_PER_CITY).contains(&city.days_suggested) {
                return Err(format!(
                    "{} suggests {} days, expected {MIN_DAYS_PER_CITY}-{MAX_DAYS_PER_CITY}",
                    city.name, city.days_suggested
                ));
            }
        }
        Ok(())
    }
}

impl TripItinerary {
    pub fn total_days(&self) -> u32 {
        self.cities.iter().map(|c| c.days_suggested).sum()
    }

    pub fn total_stops(&self) -> usize {
        self.cities.iter().map(|c| c.stops.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cities.is_empty()
    }
}
