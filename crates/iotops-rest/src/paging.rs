//! `value` / `nextLink` paged responses

use iotops_core::ServiceError;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// One page of a paged listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub value: Vec<T>,
    pub next_link: Option<String>,
}

/// Parse a page body; a body without `value` is a response-shape error
pub fn parse_page<T: DeserializeOwned>(body: &str) -> Result<Page<T>, ServiceError> {
    let mut json: Value =
        serde_json::from_str(body).map_err(|e| ServiceError::Decode(e.to_string()))?;

    let value = json
        .get_mut("value")
        .map(Value::take)
        .ok_or_else(|| ServiceError::MissingValue(body.to_string()))?;

    let value = serde_json::from_value(value).map_err(|e| ServiceError::Decode(e.to_string()))?;
    let next_link = json
        .get("nextLink")
        .and_then(Value::as_str)
        .filter(|link| !link.is_empty())
        .map(str::to_string);

    Ok(Page { value, next_link })
}
