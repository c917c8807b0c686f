//! Request and response bodies

use serde::{Deserialize, Serialize};

use crate::service::StoreEntry;

/// `?realTime=true` bypasses the sampled value
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadQuery {
    pub real_time: bool,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WriteRequest {
    pub value: f64,
}

/// A single variable value; `null` when there is none
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueResponse {
    pub value: Option<f64>,
}

/// `/v2/getAllVariables` body
#[derive(Debug, Clone, Serialize)]
pub struct AllVariablesResponse {
    pub ret: Vec<StoreEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SetLogLevelRequest {
    pub level: String,
}
