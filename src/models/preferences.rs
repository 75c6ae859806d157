use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Budget {
    Budget,
    Moderate,
    Luxury,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Pace {
    Relaxed,
    Moderate,
    FastPaced,
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Budget::Budget => "budget",
            Budget::Moderate => "moderate",
            Budget::Luxury => "luxury",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Pace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Pace::Relaxed => "relaxed",
            Pace::Moderate => "moderate",
            Pace::FastPaced => "fast-paced",
        };
        f.write_str(s)
    }
}

/// Travel preferences supplied by the user.
///
/// Only the fields the user actually set are serialized, so the composer
/// can tell a stated preference from a default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelPreferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<Budget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_pace: Option<Pace>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefers_museums: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travels_with_kids: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessibility_needs: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub favorite_genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub favorite_authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dietary_restrictions: Vec<String>,
}

impl TravelPreferences {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// One-line human summary, e.g. "budget: luxury, pace: relaxed".
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(budget) = self.budget {
            parts.push(format!("budget: {budget}"));
        }
        if let Some(pace) = self.preferred_pace {
            parts.push(format!("pace: {pace}"));
        }
        if let Some(museums) = self.prefers_museums {
            parts.push(if museums { "museums: yes" } else { "museums: no" }.to_string());
        }
        if self.travels_with_kids == Some(true) {
            parts.push("with kids".to_string());
        }
        if self.accessibility_needs == Some(true) {
            parts.push("accessible".to_string());
        }
        parts.join(", ")
    }
}
