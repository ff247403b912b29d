use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::analysis::{HeartRateEstimate, Quality};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed sample message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("field `{field}` is not a finite number")]
    NonFinite { field: &'static str },
    #[error("binary frames are not supported")]
    BinaryFrame,
}

/// One PPG reading from the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleMessage {
    #[serde(deserialize_with = "lenient_f64")]
    pub red_value: f64,
    #[serde(deserialize_with = "lenient_f64")]
    pub timestamp: f64,
}

/// Sent back only when the analyzer produced an estimate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EstimateMessage {
    pub heart_rate: f64,
    pub quality: Quality,
}

impl From<HeartRateEstimate> for EstimateMessage {
    fn from(est: HeartRateEstimate) -> Self {
        Self {
            heart_rate: est.bpm,
            quality: est.quality,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

// Clients built on loosely typed stacks send numbers as strings.
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match NumberOrString::deserialize(d)? {
        NumberOrString::Number(v) => Ok(v),
        NumberOrString::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

pub fn decode_sample(text: &str) -> Result<SampleMessage, ProtocolError> {
    let msg: SampleMessage = serde_json::from_str(text)?;
    if !msg.red_value.is_finite() {
        return Err(ProtocolError::NonFinite { field: "red_value" });
    }
    if !msg.timestamp.is_finite() {
        return Err(ProtocolError::NonFinite { field: "timestamp" });
    }
    Ok(msg)
}

pub fn encode_estimate(msg: &EstimateMessage) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}
