//! Job payload accepted by the handler and the result it hands back.
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

pub const MISSING_IMAGES: &str = "image1_b64 and image2_b64 required";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub image1_b64: Option<String>,
    #[serde(default)]
    pub image2_b64: Option<String>,
    /// Path to an API-format workflow JSON; the configured default is used
    /// when absent.
    #[serde(default)]
    pub workflow: Option<String>,
    /// Falsy values (`null`, `false`, `0`, `""`, `[]`) count as no params.
    #[serde(default, deserialize_with = "params_object")]
    pub params: Option<Map<String, Value>>,
}

fn params_object<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Map<String, Value>>, D::Error> {
    match Value::deserialize(d)? {
        Value::Object(map) => Ok(Some(map)),
        Value::Null | Value::Bool(false) => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::Array(a) if a.is_empty() => Ok(None),
        Value::Number(n) if n.as_f64() == Some(0.0) => Ok(None),
        other => Err(D::Error::custom(format!("params must be a JSON object, got {}", other))),
    }
}

impl JobRequest {
    /// Build a request from whatever the caller sent: an object, a JSON
    /// string holding an object, or either wrapped as `{"input": ...}`.
    pub fn from_event(event: Value) -> AppResult<Self> {
        let event = match event {
            Value::String(raw) => serde_json::from_str(&raw)?,
            other => other,
        };
        let event = match event {
            Value::Object(mut map)
                if !map.contains_key("image1_b64")
                    && !map.contains_key("image2_b64")
                    && map.contains_key("input") =>
            {
                match map.remove("input") {
                    Some(Value::String(raw)) => serde_json::from_str(&raw)?,
                    Some(inner) => inner,
                    None => Value::Object(map),
                }
            }
            other => other,
        };
        Ok(serde_json::from_value(event)?)
    }

    pub fn require_images(&self) -> AppResult<(&str, &str)> {
        match (non_empty(&self.image1_b64), non_empty(&self.image2_b64)) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(AppError::Validation(MISSING_IMAGES.to_string())),
        }
    }

    /// Params worth forwarding to the runner, if any.
    pub fn forwarded_params(&self) -> Option<&Map<String, Value>> {
        self.params.as_ref().filter(|p| !p.is_empty())
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_b64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,
}

impl JobResult {
    pub fn ok(output_b64: String, log: String, elapsed_s: f64) -> Self {
        JobResult {
            status: JobStatus::Ok,
            output_b64: Some(output_b64),
            log: Some(log),
            elapsed_s: Some(elapsed_s),
            message: None,
            returncode: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        JobResult {
            status: JobStatus::Error,
            output_b64: None,
            log: None,
            elapsed_s: None,
            message: Some(message.into()),
            returncode: None,
        }
    }

    pub fn with_log(mut self, log: String) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_returncode(mut self, code: i32) -> Self {
        self.returncode = Some(code);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == JobStatus::Ok
    }
}
