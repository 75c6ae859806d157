//! Discovery records: cities, landmarks, author sites and travel regions.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::checkpoint::Candidate;
use crate::compose::Shaped;
use crate::compose::schema::{array, integer, object, string};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CityInfo {
    pub name: String,
    pub country: String,
    #[serde(default)]
    pub relevance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CityDiscovery {
    pub cities: Vec<CityInfo>,
}

impl Shaped for CityDiscovery {
    fn schema() -> Value {
        let city = object(
            &[
                ("name", string()),
                ("country", string()),
                ("relevance", string()),
            ],
            &["name", "country", "relevance"],
        );
        object(&[("cities", array(city))], &["cities"])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LandmarkInfo {
    pub name: String,
    pub city: String,
    #[serde(default)]
    pub connection: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkDiscovery {
    pub landmarks: Vec<LandmarkInfo>,
}

impl Shaped for LandmarkDiscovery {
    fn schema() -> Value {
        let landmark = object(
            &[
                ("name", string()),
                ("city", string()),
                ("connection", string()),
            ],
            &["name", "city", "connection"],
        );
        object(&[("landmarks", array(landmark))], &["landmarks"])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorSiteInfo {
    pub name: String,
    /// birthplace, residence, museum, grave...
    #[serde(rename = "type")]
    pub kind: String,
    pub city: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorSites {
    pub author_sites: Vec<AuthorSiteInfo>,
}

impl Shaped for AuthorSites {
    fn schema() -> Value {
        let site = object(
            &[("name", string()), ("type", string()), ("city", string())],
            &["name", "type", "city"],
        );
        object(&[("author_sites", array(site))], &["author_sites"])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCity {
    pub name: String,
    pub country: String,
}

/// A geographic grouping of discovered cities, offered at the checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelRegion {
    pub region_id: u32,
    pub region_name: String,
    pub cities: Vec<RegionCity>,
    #[serde(default)]
    pub estimated_days: u32,
    #[serde(default)]
    pub travel_note: String,
    #[serde(default, deserialize_with = "string_or_list")]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionAnalysis {
    #[serde(default)]
    pub regions: Vec<TravelRegion>,
    #[serde(default)]
    pub analysis_note: String,
}

/// Highlights arrive either as a list or as one comma-separated string.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Highlights {
        List(Vec<String>),
        Text(String),
    }

    Ok(match Option::<Highlights>::deserialize(deserializer)? {
        Some(Highlights::List(items)) => items,
        Some(Highlights::Text(text)) => text
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    })
}

impl Shaped for RegionAnalysis {
    fn schema() -> Value {
        let city = object(&[("name", string()), ("country", string())], &["name", "country"]);
        let region = object(
            &[
                ("region_id", integer()),
                ("region_name", string()),
                ("cities", array(city)),
                ("estimated_days", integer()),
                ("travel_note", string()),
                ("highlights", array(string())),
            ],
            &["region_id", "region_name", "cities", "estimated_days"],
        );
        object(
            &[("regions", array(region)), ("analysis_note", string())],
            &["regions"],
        )
    }

    fn check(&self) -> Result<(), String> {
        let mut ids = HashSet::new();
        for region in &self.regions {
            if !ids.insert(region.region_id) {
                return Err(format!("duplicate region_id {}", region.region_id));
            }
            if region.cities.is_empty() {
                return Err(format!("region {} has no cities", region.region_id));
            }
        }
        Ok(())
    }
}

impl Candidate for TravelRegion {
    fn id(&self) -> u32 {
        self.region_id
    }

    fn label(&self) -> String {
        self.region_name.clone()
    }

    fn members(&self) -> Vec<String> {
        self.cities.iter().map(|c| c.name.clone()).collect()
    }

    fn details(&self) -> Vec<(String, String)> {
        let cities = self
            .cities
            .iter()
            .map(|c| format!("{}, {}", c.name, c.country))
            .collect::<Vec<_>>()
            .join(" | ");
        let mut details = vec![
            ("Cities".to_string(), cities),
            (
                "Duration".to_string(),
                format!("~{} days", self.estimated_days),
            ),
        ];
        if !self.travel_note.is_empty() {
            details.push(("Travel".to_string(), self.travel_note.clone()));
        }
        if !self.highlights.is_empty() {
            details.push(("Highlights".to_string(), self.highlights.join(", ")));
        }
        details
    }
}

/// Cities of the given regions, deduplicated by name and country, in order.
pub fn union_cities(regions: &[TravelRegion]) -> Vec<RegionCity> {
    let mut seen = HashSet::new();
    regions
        .iter()
        .flat_map(|r| r.cities.iter())
        .filter(|c| seen.insert((c.name.to_lowercase(), c.country.to_lowercase())))
        .cloned()
        .collect()
}
