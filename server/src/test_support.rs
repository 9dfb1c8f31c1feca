//! Shared helpers for unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};

use crate::error::LedgerError;
use crate::models::WriteReceipt;
use crate::services::ledger::{LedgerBackend, LedgerConnection};

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().expect("stub local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });

    format!("http://{addr}")
}

/// A trimmed USGS response carrying one point.
pub fn usgs_body(value: Value, date_time: &str) -> Value {
    json!({
        "name": "ns1:timeSeriesResponseType",
        "value": {
            "timeSeries": [ {
                "sourceInfo": {
                    "siteName": "POTOMAC RIVER NEAR WASH, DC LITTLE FALLS PUMP STA",
                    "siteCode": [ { "value": "01646500", "network": "NWIS", "agencyCode": "USGS" } ]
                },
                "variable": { "variableCode": [ { "value": "00065" } ] },
                "values": [ {
                    "value": [ { "value": value, "qualifiers": ["P"], "dateTime": date_time } ]
                } ]
            } ]
        }
    })
}

/// In-memory ledger with switches for the failure modes the pipeline cares about.
#[derive(Clone, Default)]
pub struct FakeLedger {
    inner: Arc<FakeLedgerInner>,
}

#[derive(Default)]
struct FakeLedgerInner {
    unreachable: AtomicBool,
    connects: AtomicUsize,
    write_error: Mutex<Option<LedgerError>>,
    write_delay: Mutex<Duration>,
    connect_delay: Mutex<Duration>,
    writes: Mutex<Vec<i128>>,
    value: Mutex<Option<i128>>,
    threshold: Mutex<Option<i128>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(&self) -> FakeBackend {
        FakeBackend {
            inner: self.inner.clone(),
        }
    }

    pub fn connects(&self) -> usize {
        self.inner.connects.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<i128> {
        self.inner.writes.lock().unwrap().clone()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.inner.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn fail_writes_with(&self, error: Option<LedgerError>) {
        *self.inner.write_error.lock().unwrap() = error;
    }

    pub fn set_write_delay(&self, delay: Duration) {
        *self.inner.write_delay.lock().unwrap() = delay;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.inner.connect_delay.lock().unwrap() = delay;
    }

    pub fn set_threshold(&self, threshold: i128) {
        *self.inner.threshold.lock().unwrap() = Some(threshold);
    }
}

impl FakeLedgerInner {
    fn check_reachable(&self) -> Result<(), LedgerError> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(LedgerError::ConnectionUnavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

pub struct FakeBackend {
    inner: Arc<FakeLedgerInner>,
}

#[async_trait]
impl LedgerBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn connect(&self) -> Result<Arc<dyn LedgerConnection>, LedgerError> {
        let delay = *self.inner.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.check_reachable()?;
        self.inner.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeConnection {
            inner: self.inner.clone(),
        }))
    }
}

struct FakeConnection {
    inner: Arc<FakeLedgerInner>,
}

#[async_trait]
impl LedgerConnection for FakeConnection {
    async fn health_check(&self) -> Result<(), LedgerError> {
        self.inner.check_reachable()
    }

    async fn write_value(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        let delay = *self.inner.write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.inner.check_reachable()?;
        if let Some(err) = self.inner.write_error.lock().unwrap().clone() {
            return Err(err);
        }

        let mut writes = self.inner.writes.lock().unwrap();
        writes.push(scaled);
        *self.inner.value.lock().unwrap() = Some(scaled);
        Ok(WriteReceipt {
            reference: format!("0xfake{}", writes.len()),
            block: Some(writes.len() as u64),
        })
    }

    async fn read_value(&self) -> Result<i128, LedgerError> {
        self.inner.check_reachable()?;
        Ok(self.inner.value.lock().unwrap().unwrap_or_default())
    }

    async fn read_threshold(&self) -> Result<i128, LedgerError> {
        self.inner.check_reachable()?;
        self.inner
            .threshold
            .lock()
            .unwrap()
            .ok_or_else(|| LedgerError::InvalidResponse("threshold not set".to_string()))
    }

    async fn write_threshold(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        self.inner.check_reachable()?;
        *self.inner.threshold.lock().unwrap() = Some(scaled);
        Ok(WriteReceipt {
            reference: "0xthreshold".to_string(),
            block: None,
        })
    }
}
