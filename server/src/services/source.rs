//! Time-series data source client

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::SourceError;
use crate::models::usgs::UsgsEnvelope;
use crate::models::Measurement;

/// Anything that can produce the latest gauge reading.
#[async_trait]
pub trait MeasurementSource: Send + Sync {
    async fn fetch_latest(&self) -> Result<Measurement, SourceError>;
}

/// Client for the USGS instantaneous-values service.
pub struct UsgsClient {
    url: String,
    site_id: String,
    http: Client,
}

impl UsgsClient {
    pub fn new(config: &SourceConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            url: config.url.clone(),
            site_id: config.site_id.clone(),
            http,
        })
    }
}

#[async_trait]
impl MeasurementSource for UsgsClient {
    async fn fetch_latest(&self) -> Result<Measurement, SourceError> {
        debug!(url = %self.url, "fetching gauge reading");

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| SourceError::SourceUnreachable(err.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|err| SourceError::SourceUnreachable(err.to_string()))?;

        let measurement = parse_measurement(&body, &self.site_id)?;
        info!(
            value_feet = measurement.value_feet,
            observed_at = %measurement.observed_at,
            site = %measurement.source_name,
            "latest gauge reading"
        );

        Ok(measurement)
    }
}

/// Extract the newest point from a USGS JSON body.
///
/// `fallback_site_id` is used when the envelope carries no site code.
pub fn parse_measurement(body: &[u8], fallback_site_id: &str) -> Result<Measurement, SourceError> {
    let envelope: UsgsEnvelope = serde_json::from_slice(body)
        .map_err(|err| SourceError::MalformedResponse(err.to_string()))?;

    let series = envelope
        .value
        .time_series
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::MalformedResponse("timeSeries is empty".to_string()))?;

    let point = series
        .values
        .into_iter()
        .next()
        .and_then(|values| values.value.into_iter().next())
        .ok_or_else(|| {
            SourceError::MalformedResponse("timeSeries[0].values[0].value[0] is missing".to_string())
        })?;

    let value_feet = parse_value(&point.value)?;
    let observed_at = DateTime::parse_from_rfc3339(point.date_time.trim())
        .map_err(|err| {
            SourceError::MalformedResponse(format!("bad dateTime {:?}: {err}", point.date_time))
        })?
        .with_timezone(&Utc);

    let (site_name, site_code) = match series.source_info {
        Some(info) => (
            info.site_name,
            info.site_code.into_iter().next().map(|code| code.value),
        ),
        None => (None, None),
    };

    Ok(Measurement {
        value_feet,
        observed_at,
        source_name: site_name.unwrap_or_default(),
        source_id: site_code.unwrap_or_else(|| fallback_site_id.to_string()),
    })
}

fn parse_value(raw: &Value) -> Result<f64, SourceError> {
    match raw {
        Value::String(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|_| SourceError::UnparsableValue(text.clone())),
        Value::Number(number) => number
            .as_f64()
            .ok_or_else(|| SourceError::UnparsableValue(number.to_string())),
        other => Err(SourceError::UnparsableValue(other.to_string())),
    }
}
