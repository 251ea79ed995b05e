use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    #[default]
    Low,
}

impl Confidence {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

/// One oracle proposal, exactly as untrusted as it arrived. Absent fields stay `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateSpan {
    pub raw_category_label: Option<String>,
    pub value: Option<String>,
    pub start: Option<i64>,
    pub end: Option<i64>,
    #[serde(default)]
    pub confidence: Confidence,
}

impl CandidateSpan {
    /// Parse one oracle entity. Never fails: malformed fields become absent and the
    /// validator rejects the candidate later.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        Self {
            raw_category_label: text_field(object, &["category", "label", "type"]),
            value: text_field(object, &["value", "text"]),
            start: offset_field(object, &["start", "start_index"]),
            end: offset_field(object, &["end", "end_index"]),
            confidence: text_field(object, &["confidence"])
                .and_then(|raw| Confidence::parse(&raw))
                .unwrap_or_default(),
        }
    }
}

/// Read `{ "entities": [...] }`. Any other shape is zero candidates.
#[must_use]
pub fn candidates_from_response(response: &Value) -> Vec<CandidateSpan> {
    response
        .get("entities")
        .and_then(Value::as_array)
        .map(|entities| entities.iter().map(CandidateSpan::from_value).collect())
        .unwrap_or_default()
}

fn first_present<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|key| object.get(*key)).find(|value| !value.is_null())
}

fn text_field(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    match first_present(object, keys)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

// Offsets outside the `i64` range saturate, so the validator reports them as out of bounds.
fn offset_field(object: &Map<String, Value>, keys: &[&str]) -> Option<i64> {
    match first_present(object, keys)? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().map(|_| i64::MAX))
            .or_else(|| number.as_f64().and_then(integral_offset)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i128>()
                .ok()
                .map(saturating_offset)
                .or_else(|| text.parse::<f64>().ok().and_then(integral_offset))
        }
        _ => None,
    }
}

fn saturating_offset(offset: i128) -> i64 {
    i64::try_from(offset).unwrap_or(if offset < 0 { i64::MIN } else { i64::MAX })
}

#[allow(clippy::cast_possible_truncation)]
fn integral_offset(float: f64) -> Option<i64> {
    if !float.is_finite() || float.fract().abs() > f64::EPSILON {
        return None;
    }
    // Float-to-int `as` saturates at the `i64` bounds.
    Some(float as i64)
}
