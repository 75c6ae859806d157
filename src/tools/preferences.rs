//! Read-only access to the user's travel preferences in run state.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::capability::{Capability, CapabilityContext, ToolDeclaration};
use crate::errors::CapabilityError;

pub const GET_USER_PREFERENCES: &str = "get_user_preferences";
pub const PREFERENCES_KEY: &str = "user:preferences";

pub struct PreferencesTool;

#[async_trait]
impl Capability for PreferencesTool {
    fn name(&self) -> &str {
        GET_USER_PREFERENCES
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::Function {
            name: GET_USER_PREFERENCES.to_string(),
            description: "Get the user's travel preferences (budget, pace, interests).".to_string(),
            parameters: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, _args: Value, ctx: &CapabilityContext) -> Result<Value, CapabilityError> {
        let preferences = ctx
            .state
            .get(PREFERENCES_KEY)
            .filter(|p| p.as_object().is_some_and(|o| !o.is_empty()));

        Ok(match preferences {
            Some(preferences) => json!({"found": true, "preferences": preferences}),
            None => json!({
                "found": false,
                "preferences": {},
                "message": "No user preferences found. Using defaults."
            }),
        })
    }
}
