use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A selectable model as listed by a provider's catalog endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            pricing: None,
            context_length: None,
        }
    }
}

/// USD per token, as the routing service reports it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    #[serde(deserialize_with = "de_price")]
    pub prompt: f64,
    #[serde(deserialize_with = "de_price")]
    pub completion: f64,
}

/// Account usage for the configured cloud key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub usage: f64,
    #[serde(default)]
    pub limit: Option<f64>,
    #[serde(default)]
    pub is_free_tier: bool,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub requests: u64,
    pub interval: String,
}

/// The catalog sends prices as decimal strings ("0.000002"), some mirrors
/// send plain numbers.
fn de_price<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("price out of range")),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| serde::de::Error::custom(format!("invalid price {s:?}: {e}"))),
        Value::Null => Ok(0.0),
        other => Err(serde::de::Error::custom(format!(
            "unexpected price value {other}"
        ))),
    }
}

/// Per-entry pricing: an incomplete or malformed block drops the pricing of
/// that one model instead of failing the whole catalog.
pub(crate) fn de_lenient_pricing<'de, D>(deserializer: D) -> Result<Option<ModelPricing>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}
