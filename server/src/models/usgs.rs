//! USGS instantaneous-values JSON envelope
//!
//! Only the fields the bridge reads are modelled. Everything else in the
//! (large) response is ignored.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub struct UsgsEnvelope {
    pub value: UsgsBody,
}

#[derive(Debug, Deserialize)]
pub struct UsgsBody {
    #[serde(rename = "timeSeries", default)]
    pub time_series: Vec<UsgsTimeSeries>,
}

#[derive(Debug, Deserialize)]
pub struct UsgsTimeSeries {
    #[serde(rename = "sourceInfo", default)]
    pub source_info: Option<UsgsSourceInfo>,
    #[serde(default)]
    pub values: Vec<UsgsValues>,
}

#[derive(Debug, Deserialize)]
pub struct UsgsSourceInfo {
    #[serde(rename = "siteName", default)]
    pub site_name: Option<String>,
    #[serde(rename = "siteCode", default)]
    pub site_code: Vec<UsgsSiteCode>,
}

#[derive(Debug, Deserialize)]
pub struct UsgsSiteCode {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct UsgsValues {
    #[serde(default)]
    pub value: Vec<UsgsPoint>,
}

/// A single `(value, dateTime)` pair. USGS sends the value as a string.
#[derive(Debug, Deserialize)]
pub struct UsgsPoint {
    pub value: Value,
    #[serde(rename = "dateTime")]
    pub date_time: String,
}
