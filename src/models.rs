use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct Operation {
    pub action: String,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Operation {
    /// Returns a parameter only when it is present and non-empty.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Wire envelope for every reply on the operation endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: Status,
    pub data: Option<Value>,
    pub message: String,
}

impl ApiResponse {
    pub fn success(data: Value) -> Self {
        ApiResponse {
            status: Status::Success,
            data: Some(data),
            message: String::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ApiResponse {
            status: Status::Error,
            data: None,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Claims {
    pub exp: u64,
    #[serde(default)]
    pub sub: Option<String>,
}
