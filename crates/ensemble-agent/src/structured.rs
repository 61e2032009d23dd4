//! Parsing and schema validation of structured backend replies.

use ensemble_core::{EnsembleError, EnsembleResult};
use jsonschema::JSONSchema;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

fn code_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```(?:json|JSON)?\s*([\s\S]*?)```").ok())
        .as_ref()
}

fn tagged_block_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[\w+-]*[ \t]*\n([\s\S]*?)```").ok())
        .as_ref()
}

/// Body of the first fenced code block in `text`, any language tag.
pub fn first_code_block(text: &str) -> Option<String> {
    let cap = tagged_block_regex()?.captures(text)?;
    let body = cap.get(1)?.as_str().trim();
    (!body.is_empty()).then(|| body.to_string())
}

/// Parse a backend reply as JSON.
///
/// Tries the whole text first, then every fenced code block, then the
/// widest `{...}` or `[...]` span. Returns the parse error of the whole text
/// when nothing parses.
pub fn parse_json_response(text: &str) -> Result<Value, String> {
    let trimmed = text.trim();
    let direct_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => return Ok(v),
        Err(e) => e.to_string(),
    };

    if let Some(re) = code_block_regex() {
        for cap in re.captures_iter(trimmed) {
            if let Some(m) = cap.get(1) {
                if let Ok(v) = serde_json::from_str::<Value>(m.as_str().trim()) {
                    return Ok(v);
                }
            }
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return Ok(v);
                }
            }
        }
    }

    Err(format!("response is not valid JSON: {direct_err}"))
}

/// A compiled JSON schema together with its source.
pub struct SchemaValidator {
    schema: Value,
    compiled: JSONSchema,
}

impl SchemaValidator {
    /// Compile `schema`. An uncompilable schema is a caller bug and is
    /// reported as [`EnsembleError::Config`].
    pub fn compile(schema: &Value) -> EnsembleResult<Self> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| EnsembleError::Config(format!("invalid JSON schema: {e}")))?;
        Ok(Self {
            schema: schema.clone(),
            compiled,
        })
    }

    /// Check `instance`, joining every violation into one message.
    pub fn validate(&self, instance: &Value) -> Result<(), String> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => {
                let messages: Vec<String> = errors
                    .map(|e| {
                        let path = e.instance_path.to_string();
                        if path.is_empty() {
                            e.to_string()
                        } else {
                            format!("{path}: {e}")
                        }
                    })
                    .collect();
                Err(format!("schema validation failed: {}", messages.join("; ")))
            }
        }
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }
}

/// Build the follow-up prompt sent after an invalid structured reply.
///
/// The caller's original prompt is embedded unchanged.
pub fn corrective_prompt(original: &str, invalid_response: &str, schema: &Value, error: &str) -> String {
    let schema_text =
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "{original}\n\n\
         Your previous response could not be used.\n\
         Previous response:\n{invalid_response}\n\n\
         Problem: {error}\n\n\
         Respond again with ONLY a JSON value matching this schema:\n{schema_text}"
    )
}

/// Well-formed failure value returned instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackError {
    /// Human-readable reason.
    pub error: String,
    /// `validation`, `transport`, `config`, ...
    pub kind: String,
    /// Backend attempts made before giving up.
    pub attempts: u32,
    /// Last raw reply, when one was received.
    pub last_response: Option<String>,
}

impl FallbackError {
    /// Exhausted structured attempts.
    pub fn validation(error: impl Into<String>, attempts: u32, last_response: Option<String>) -> Self {
        Self {
            error: error.into(),
            kind: "validation".to_string(),
            attempts,
            last_response,
        }
    }

    /// Any other error caught at the client boundary.
    pub fn from_error(err: &EnsembleError, attempts: u32) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
            attempts,
            last_response: None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "error": self.error,
            "kind": self.kind,
            "attempts": self.attempts,
            "last_response": self.last_response,
        })
    }
}

/// Outcome of a structured call: a validated value or the fallback error
/// sentinel. Callers must check which.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredReply {
    /// Parsed JSON that passed the schema.
    Valid(Value),
    /// Every attempt failed; carries the sentinel.
    Invalid(FallbackError),
}

impl StructuredReply {
    pub fn is_valid(&self) -> bool {
        matches!(self, StructuredReply::Valid(_))
    }

    pub fn as_valid(&self) -> Option<&Value> {
        match self {
            StructuredReply::Valid(v) => Some(v),
            StructuredReply::Invalid(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Value, FallbackError> {
        match self {
            StructuredReply::Valid(v) => Ok(v),
            StructuredReply::Invalid(e) => Err(e),
        }
    }

    /// The validated value, or the fallback error object.
    pub fn into_value(self) -> Value {
        match self {
            StructuredReply::Valid(v) => v,
            StructuredReply::Invalid(e) => e.to_value(),
        }
    }
}
