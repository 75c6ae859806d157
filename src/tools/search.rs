//! Web search, executed server-side by the generation backend.

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::{Capability, CapabilityContext, ToolDeclaration};
use crate::errors::CapabilityError;

pub const GOOGLE_SEARCH: &str = "google_search";

pub struct GoogleSearchTool;

#[async_trait]
impl Capability for GoogleSearchTool {
    fn name(&self) -> &str {
        GOOGLE_SEARCH
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::BuiltinSearch
    }

    async fn call(&self, _args: Value, _ctx: &CapabilityContext) -> Result<Value, CapabilityError> {
        Err(CapabilityError::Unsupported {
            name: GOOGLE_SEARCH.to_string(),
            message: "search runs inside the generation backend".to_string(),
        })
    }
}
