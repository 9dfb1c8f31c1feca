//! HTTP transport for the replica's v2 endpoints

use std::sync::Arc;
use std::time::Duration;

use candid::Principal;
use chrono::Utc;
use ciborium::Value;
use reqwest::{Client, Response, StatusCode};
use tokio::time::sleep;
use tracing::debug;

use super::certificate::{RequestStatus, RootKey, VerifiedTree};
use super::envelope::{decode_cbor, map_get, Content};
use super::identity::Identity;
use crate::error::LedgerError;

const INGRESS_EXPIRY_SECS: i64 = 4 * 60;
const CBOR: &str = "application/cbor";

pub struct Agent {
    pub(super) host: String,
    pub(super) canister_id: Principal,
    pub(super) identity: Arc<Identity>,
    pub(super) http: Client,
    pub(super) poll_interval: Duration,
    /// Trust anchor for `read_state` certificates.
    pub(super) root_key: RootKey,
}

impl Agent {
    /// Root key advertised by the replica. Only trusted on local and test networks.
    pub async fn fetch_root_key(&self) -> Result<RootKey, LedgerError> {
        let response = self
            .http
            .get(format!("{}/api/v2/status", self.host))
            .send()
            .await?;
        let body = read_body(response).await?;
        let status = decode_cbor(&body)?;

        let der = map_get(&status, "root_key")
            .and_then(Value::as_bytes)
            .ok_or_else(|| LedgerError::InvalidResponse("status has no root_key".to_string()))?;
        RootKey::from_der(der)
    }

    pub async fn query(&self, method: &str, arg: Vec<u8>) -> Result<Vec<u8>, LedgerError> {
        let content = Content::query(
            &self.canister_id,
            method,
            arg,
            &self.identity.sender(),
            ingress_expiry(),
        );
        let response = self.post("query", content.seal(&self.identity)?).await?;
        let body = read_body(response).await?;
        let reply = decode_cbor(&body)?;

        match map_get(&reply, "status").and_then(Value::as_text) {
            Some("replied") => map_get(&reply, "reply")
                .and_then(|reply| map_get(reply, "arg"))
                .and_then(Value::as_bytes)
                .cloned()
                .ok_or_else(|| LedgerError::InvalidResponse(format!("{method} reply has no arg"))),
            Some("rejected") => Err(LedgerError::WriteRejected(reject_message(&reply))),
            other => Err(LedgerError::InvalidResponse(format!(
                "{method} query returned status {other:?}"
            ))),
        }
    }

    /// Submit an update call and poll `read_state` until it settles.
    ///
    /// The reply is `None` when the call executed but its reply was already
    /// pruned; the call is still confirmed.
    pub async fn update(
        &self,
        method: &str,
        arg: Vec<u8>,
    ) -> Result<([u8; 32], Option<Vec<u8>>), LedgerError> {
        let content = Content::call(
            &self.canister_id,
            method,
            arg,
            &self.identity.sender(),
            ingress_expiry(),
            rand::random::<[u8; 8]>().to_vec(),
        );
        let request_id = content.request_id();
        let response = self.post("call", content.seal(&self.identity)?).await?;
        read_body(response).await?;

        debug!(method, request_id = %hex::encode(request_id), "update call accepted");

        loop {
            match self.request_status(&request_id).await? {
                RequestStatus::Pending => sleep(self.poll_interval).await,
                RequestStatus::Replied(reply) => return Ok((request_id, Some(reply))),
                RequestStatus::Rejected(message) => return Err(LedgerError::WriteRejected(message)),
                RequestStatus::Done => {
                    debug!(method, "update executed, reply already pruned");
                    return Ok((request_id, None));
                }
            }
        }
    }

    async fn request_status(&self, request_id: &[u8; 32]) -> Result<RequestStatus, LedgerError> {
        let content = Content::read_state(
            vec![vec![b"request_status".to_vec(), request_id.to_vec()]],
            &self.identity.sender(),
            ingress_expiry(),
        );
        let response = self.post("read_state", content.seal(&self.identity)?).await?;
        let body = read_body(response).await?;
        let reply = decode_cbor(&body)?;

        let certificate = map_get(&reply, "certificate")
            .and_then(Value::as_bytes)
            .ok_or_else(|| LedgerError::InvalidResponse("read_state has no certificate".to_string()))?;
        VerifiedTree::verify(certificate, &self.root_key, &self.canister_id)?.request_status(request_id)
    }

    async fn post(&self, endpoint: &str, envelope: Vec<u8>) -> Result<Response, LedgerError> {
        let url = format!(
            "{}/api/v2/canister/{}/{endpoint}",
            self.host, self.canister_id
        );
        Ok(self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, CBOR)
            .body(envelope)
            .send()
            .await?)
    }
}

/// Client errors mean the replica refused the request; server errors mean it is unhealthy.
async fn read_body(response: Response) -> Result<Vec<u8>, LedgerError> {
    let status = response.status();
    let body = response.bytes().await?;

    if status.is_server_error() {
        return Err(LedgerError::ConnectionUnavailable(format!(
            "replica answered {status}"
        )));
    }
    if status.is_client_error() {
        let detail = String::from_utf8_lossy(&body);
        return Err(LedgerError::WriteRejected(format!(
            "replica answered {status}: {}",
            detail.trim()
        )));
    }
    if status != StatusCode::OK && status != StatusCode::ACCEPTED {
        return Err(LedgerError::InvalidResponse(format!("unexpected HTTP status {status}")));
    }

    Ok(body.to_vec())
}

fn reject_message(reply: &Value) -> String {
    let code = map_get(reply, "reject_code")
        .and_then(Value::as_integer)
        .and_then(|code| u64::try_from(code).ok());
    let message = map_get(reply, "reject_message")
        .and_then(Value::as_text)
        .unwrap_or("rejected without message");

    match code {
        Some(code) => format!("{message} (reject code {code})"),
        None => message.to_string(),
    }
}

fn ingress_expiry() -> u64 {
    let deadline = Utc::now() + chrono::Duration::seconds(INGRESS_EXPIRY_SECS);
    deadline
        .timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or(u64::MAX)
}
