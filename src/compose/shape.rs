//! Output shapes: the typed contract a task's result must satisfy.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::backend::GenerationOutput;
use crate::util::extract_json_object;

/// A record type a task can be asked to produce.
///
/// `schema` is the response schema sent to the backend so that decoding is
/// held to the shape. `check` adds constraints serde cannot express, such as
/// numeric ranges.
pub trait Shaped: DeserializeOwned + Serialize + Default {
    fn schema() -> Value;

    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

type Validator = fn(&Value) -> Result<Value, String>;
type EmptyValue = fn() -> Value;
type Schema = fn() -> Value;

/// Declared output shape of a task.
#[derive(Clone, Copy)]
pub struct OutputShape {
    name: &'static str,
    validate: Validator,
    empty: EmptyValue,
    schema: Schema,
}

/// Result of fitting raw model output to a shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Conformed {
    Valid(Value),
    /// The output did not fit; `value` is the shape's empty value.
    Defaulted { value: Value, reason: String },
}

impl Conformed {
    pub fn into_value(self) -> Value {
        match self {
            Self::Valid(value) | Self::Defaulted { value, .. } => value,
        }
    }
}

impl OutputShape {
    pub fn of<T: Shaped>(name: &'static str) -> Self {
        Self {
            name,
            validate: validate_as::<T>,
            empty: empty_of::<T>,
            schema: T::schema,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Validate and normalize a JSON value against the shape.
    pub fn validate(&self, value: &Value) -> Result<Value, String> {
        (self.validate)(value)
    }

    pub fn schema(&self) -> Value {
        (self.schema)()
    }

    /// The shape's empty value, stored when output cannot be validated.
    pub fn empty(&self) -> Value {
        (self.empty)()
    }

    /// Fit backend output to the shape.
    ///
    /// Structured output is preferred; otherwise the first JSON object found
    /// in the text is used. Anything that does not validate falls back to the
    /// empty value so that downstream tasks never see invented fields.
    pub fn conform(&self, output: &GenerationOutput) -> Conformed {
        let candidate = match &output.json {
            Some(value) => Ok(value.clone()),
            None => match extract_json_object(&output.text) {
                Some(raw) => serde_json::from_str::<Value>(raw).map_err(|e| e.to_string()),
                None => Err("no JSON object in output".to_string()),
            },
        };

        match candidate.and_then(|value| self.validate(&value)) {
            Ok(value) => Conformed::Valid(value),
            Err(reason) => Conformed::Defaulted {
                value: self.empty(),
                reason,
            },
        }
    }
}

impl fmt::Debug for OutputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OutputShape").field(&self.name).finish()
    }
}

fn validate_as<T: Shaped>(value: &Value) -> Result<Value, String> {
    let parsed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    parsed.check()?;
    serde_json::to_value(parsed).map_err(|e| e.to_string())
}

fn empty_of<T: Shaped>() -> Value {
    serde_json::to_value(T::default()).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::schema;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Rating {
        title: String,
        #[serde(default)]
        stars: u8,
    }

    impl Shaped for Rating {
        fn schema() -> Value {
            schema::object(
                &[
                    ("title", schema::string()),
                    ("stars", schema::integer()),
                ],
                &["title"],
            )
        }

        fn check(&self) -> Result<(), String> {
            if self.stars > 5 {
                return Err(format!("stars must be 0-5, got {}", self.stars));
            }
            Ok(())
        }
    }

    fn shape() -> OutputShape {
        OutputShape::of::<Rating>("Rating")
    }

    #[test]
    fn test_conform_structured_output() {
        let output = GenerationOutput::json(json!({"title": "Dune", "stars": 4}));
        assert_eq!(
            shape().conform(&output),
            Conformed::Valid(json!({"title": "Dune", "stars": 4}))
        );
    }

    #[test]
    fn test_conform_fills_serde_defaults() {
        let output = GenerationOutput::text("Result: {\"title\": \"Emma\"} done");
        assert_eq!(
            shape().conform(&output),
            Conformed::Valid(json!({"title": "Emma", "stars": 0}))
        );
    }

    #[test]
    fn test_conform_rejects_missing_required_field() {
        let output = GenerationOutput::json(json!({"stars": 3}));
        match shape().conform(&output) {
            Conformed::Defaulted { value, reason } => {
                assert_eq!(value, json!({"title": "", "stars": 0}));
                assert!(reason.contains("title"));
            }
            other => panic!("expected default, got {other:?}"),
        }
    }

    #[test]
    fn test_conform_applies_check() {
        let output = GenerationOutput::json(json!({"title": "Dune", "stars": 9}));
        assert!(matches!(shape().conform(&output), Conformed::Defaulted { .. }));
    }

    #[test]
    fn test_shape_carries_schema() {
        let schema = shape().schema();
        assert_eq!(schema["properties"]["stars"]["type"], "INTEGER");
        assert_eq!(schema["required"], json!(["title"]));
    }

    #[test]
    fn test_conform_plain_prose() {
        let output = GenerationOutput::text("I could not find anything.");
        let conformed = shape().conform(&output);
        assert!(matches!(conformed, Conformed::Defaulted { .. }));
        assert_eq!(conformed.into_value(), json!({"title": "", "stars": 0}));
    }
}
