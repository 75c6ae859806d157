use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::compose::Shaped;
use crate::compose::schema::{array, nullable_string, object, string};

/// Identity of the book a run is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(alias = "book_title")]
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Shaped for BookMetadata {
    fn schema() -> Value {
        object(
            &[
                ("title", string()),
                ("author", string()),
                ("description", nullable_string()),
                ("published_date", nullable_string()),
                ("categories", array(string())),
                ("image_url", nullable_string()),
            ],
            &["title", "author"],
        )
    }
}

impl BookMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.trim().is_empty()
    }
}

/// Where and when a book is set, and what it is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookContext {
    pub primary_locations: Vec<String>,
    pub time_period: String,
    pub themes: Vec<String>,
}

impl Shaped for BookContext {
    fn schema() -> Value {
        object(
            &[
                ("primary_locations", array(string())),
                ("time_period", string()),
                ("themes", array(string())),
            ],
            &["primary_locations", "time_period", "themes"],
        )
    }
}

/// One Google Books search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookInfo {
    pub title: String,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub published_date: Option<String>,
    pub categories: Vec<String>,
    pub image_url: Option<String>,
}

impl BookInfo {
    /// Authors joined for display, or "Unknown".
    pub fn author_line(&self) -> String {
        if self.authors.is_empty() {
            "Unknown".to_string()
        } else {
            self.authors.join(", ")
        }
    }

    pub fn into_metadata(self) -> BookMetadata {
        BookMetadata {
            author: self.author_line(),
            title: self.title,
            description: self.description,
            published_date: self.published_date,
            categories: self.categories,
            image_url: self.image_url,
        }
    }
}
