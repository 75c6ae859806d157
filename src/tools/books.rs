//! Google Books lookup capability.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::capability::{Capability, CapabilityContext, ToolDeclaration};
use crate::errors::CapabilityError;
use crate::models::BookInfo;

pub const SEARCH_BOOK: &str = "search_book";
pub const GOOGLE_BOOKS_URL: &str = "https://www.googleapis.com/books/v1";
const MAX_RESULTS: u32 = 5;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Searches Google Books and returns the best match as book metadata.
pub struct GoogleBooksTool {
    client: reqwest::Client,
    base_url: String,
}

impl Default for GoogleBooksTool {
    fn default() -> Self {
        Self::new(GOOGLE_BOOKS_URL)
    }
}

impl GoogleBooksTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn search(&self, title: &str, author: Option<&str>) -> Result<Vec<BookInfo>, CapabilityError> {
        let query = build_query(title, author);
        info!(query = %query, "google_books_search");

        let max_results = MAX_RESULTS.to_string();
        let response = self
            .client
            .get(format!("{}/volumes", self.base_url))
            .query(&[
                ("q", query.as_str()),
                ("maxResults", max_results.as_str()),
                ("printType", "books"),
            ])
            .send()
            .await
            .map_err(|e| request_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(request_error(format!("HTTP {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|e| request_error(e.to_string()))?;
        let books = parse_volumes(&body);
        info!(count = books.len(), "google_books_results");
        Ok(books)
    }
}

fn request_error(message: String) -> CapabilityError {
    CapabilityError::Request {
        name: SEARCH_BOOK.to_string(),
        message,
    }
}

/// `intitle:<title>+inauthor:<author>`, omitting blank parts.
pub fn build_query(title: &str, author: Option<&str>) -> String {
    let mut parts = Vec::new();
    if !title.trim().is_empty() {
        parts.push(format!("intitle:{}", title.trim()));
    }
    if let Some(author) = author.map(str::trim).filter(|a| !a.is_empty()) {
        parts.push(format!("inauthor:{author}"));
    }
    parts.join("+")
}

/// Extract book records from a `volumes` response.
pub fn parse_volumes(body: &Value) -> Vec<BookInfo> {
    let Some(items) = body.get("items").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| item.get("volumeInfo"))
        .map(|vol| {
            let text = |key: &str| vol.get(key).and_then(Value::as_str).map(str::to_string);
            let list = |key: &str| -> Vec<String> {
                vol.get(key)
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                    .unwrap_or_default()
            };
            let links = vol.get("imageLinks");
            let image_url = ["large", "medium", "thumbnail", "smallThumbnail"]
                .iter()
                .find_map(|size| links.and_then(|l| l.get(*size)).and_then(Value::as_str))
                .map(str::to_string);

            BookInfo {
                title: text("title").unwrap_or_else(|| "Unknown".to_string()),
                authors: list("authors"),
                description: text("description"),
                published_date: text("publishedDate"),
                categories: list("categories"),
                image_url,
            }
        })
        .collect()
}

#[async_trait]
impl Capability for GoogleBooksTool {
    fn name(&self) -> &str {
        SEARCH_BOOK
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::Function {
            name: SEARCH_BOOK.to_string(),
            description: "Search Google Books and return metadata for the best matching book."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Book title, e.g. \"1984\""},
                    "author": {"type": "string", "description": "Optional author name"}
                },
                "required": ["title"]
            }),
        }
    }

    async fn call(&self, args: Value, _ctx: &CapabilityContext) -> Result<Value, CapabilityError> {
        let title = args
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CapabilityError::InvalidArguments {
                name: SEARCH_BOOK.to_string(),
                message: "missing 'title'".to_string(),
            })?;
        let author = args.get("author").and_then(Value::as_str);

        let books = self.search(title, author).await?;
        let Some(best) = books.into_iter().next() else {
            warn!(title, "google_books_no_match");
            return Ok(json!({
                "error": "No books found",
                "query": {"title": title, "author": author.unwrap_or_default()}
            }));
        };

        info!(title = %best.title, author = %best.author_line(), "google_books_selected");
        serde_json::to_value(best.into_metadata()).map_err(|e| request_error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query() {
        assert_eq!(build_query("1984", None), "intitle:1984");
        assert_eq!(
            build_query("The Nightingale", Some("Kristin Hannah")),
            "intitle:The Nightingale+inauthor:Kristin Hannah"
        );
        assert_eq!(build_query("Emma", Some("  ")), "intitle:Emma");
    }

    #[test]
    fn test_parse_volumes() {
        let body = json!({
            "items": [
                {
                    "volumeInfo": {
                        "title": "Nineteen Eighty-Four",
                        "authors": ["George Orwell"],
                        "publishedDate": "1949",
                        "categories": ["Fiction"],
                        "imageLinks": {"smallThumbnail": "small.jpg", "thumbnail": "thumb.jpg"}
                    }
                },
                {"volumeInfo": {}}
            ]
        });
        let books = parse_volumes(&body);
        assert_eq!(books.len(), 2);
        assert_eq!(books[0].title, "Nineteen Eighty-Four");
        assert_eq!(books[0].image_url.as_deref(), Some("thumb.jpg"));
        assert_eq!(books[0].categories, vec!["Fiction"]);
        assert_eq!(books[1].title, "Unknown");
        assert!(books[1].authors.is_empty());
    }

    #[test]
    fn test_parse_volumes_without_items() {
        assert!(parse_volumes(&json!({"totalItems": 0})).is_empty());
    }

    #[tokio::test]
    async fn test_call_requires_title() {
        let tool = GoogleBooksTool::new("http://127.0.0.1:9");
        let ctx = CapabilityContext {
            task: "book_metadata_researcher".into(),
            state: crate::state::RunState::new(),
            cancel: tokio_util::sync::CancellationToken::new(),
        };
        let err = tool.call(json!({"author": "Orwell"}), &ctx).await.unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArguments { .. }));
    }
}
