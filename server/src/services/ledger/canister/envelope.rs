//! Request contents, representation-independent request ids and CBOR envelopes

use candid::Principal;
use ciborium::Value;
use sha2::{Digest, Sha256};

use super::identity::Identity;
use crate::error::LedgerError;

/// CBOR self-describe tag every envelope is wrapped in.
pub const SELF_DESCRIBE_TAG: u64 = 55799;

#[derive(Debug, Clone)]
pub enum Field {
    Text(String),
    Blob(Vec<u8>),
    Nat(u64),
    Paths(Vec<Vec<Vec<u8>>>),
}

impl Field {
    fn hash(&self) -> [u8; 32] {
        match self {
            Field::Text(text) => Sha256::digest(text.as_bytes()).into(),
            Field::Blob(bytes) => Sha256::digest(bytes).into(),
            Field::Nat(n) => Sha256::digest(leb128(*n)).into(),
            Field::Paths(paths) => {
                let mut outer = Sha256::new();
                for path in paths {
                    let mut inner = Sha256::new();
                    for label in path {
                        inner.update(Sha256::digest(label));
                    }
                    outer.update(inner.finalize());
                }
                outer.finalize().into()
            }
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Field::Text(text) => Value::Text(text.clone()),
            Field::Blob(bytes) => Value::Bytes(bytes.clone()),
            Field::Nat(n) => Value::Integer((*n).into()),
            Field::Paths(paths) => Value::Array(
                paths
                    .iter()
                    .map(|path| {
                        Value::Array(path.iter().map(|label| Value::Bytes(label.clone())).collect())
                    })
                    .collect(),
            ),
        }
    }
}

/// The `content` map of a query, call or read_state request.
#[derive(Debug, Clone)]
pub struct Content {
    fields: Vec<(&'static str, Field)>,
}

impl Content {
    pub fn query(
        canister_id: &Principal,
        method: &str,
        arg: Vec<u8>,
        sender: &Principal,
        ingress_expiry: u64,
    ) -> Self {
        Self::invocation("query", canister_id, method, arg, sender, ingress_expiry)
    }

    pub fn call(
        canister_id: &Principal,
        method: &str,
        arg: Vec<u8>,
        sender: &Principal,
        ingress_expiry: u64,
        nonce: Vec<u8>,
    ) -> Self {
        let mut content = Self::invocation("call", canister_id, method, arg, sender, ingress_expiry);
        content.fields.push(("nonce", Field::Blob(nonce)));
        content
    }

    pub fn read_state(paths: Vec<Vec<Vec<u8>>>, sender: &Principal, ingress_expiry: u64) -> Self {
        Self {
            fields: vec![
                ("request_type", Field::Text("read_state".to_string())),
                ("paths", Field::Paths(paths)),
                ("sender", Field::Blob(sender.as_slice().to_vec())),
                ("ingress_expiry", Field::Nat(ingress_expiry)),
            ],
        }
    }

    fn invocation(
        request_type: &str,
        canister_id: &Principal,
        method: &str,
        arg: Vec<u8>,
        sender: &Principal,
        ingress_expiry: u64,
    ) -> Self {
        Self {
            fields: vec![
                ("request_type", Field::Text(request_type.to_string())),
                ("canister_id", Field::Blob(canister_id.as_slice().to_vec())),
                ("method_name", Field::Text(method.to_string())),
                ("arg", Field::Blob(arg)),
                ("sender", Field::Blob(sender.as_slice().to_vec())),
                ("ingress_expiry", Field::Nat(ingress_expiry)),
            ],
        }
    }

    /// Hash of the sorted `(hash(key), hash(value))` pairs.
    pub fn request_id(&self) -> [u8; 32] {
        let mut pairs: Vec<[u8; 64]> = self
            .fields
            .iter()
            .map(|(key, value)| {
                let mut pair = [0u8; 64];
                pair[..32].copy_from_slice(&Sha256::digest(key.as_bytes()));
                pair[32..].copy_from_slice(&value.hash());
                pair
            })
            .collect();
        pairs.sort_unstable();

        let mut hasher = Sha256::new();
        for pair in &pairs {
            hasher.update(pair);
        }
        hasher.finalize().into()
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.fields
                .iter()
                .map(|(key, value)| (Value::Text(key.to_string()), value.to_value()))
                .collect(),
        )
    }

    /// Sign and serialize as a self-described CBOR envelope.
    pub fn seal(&self, identity: &Identity) -> Result<Vec<u8>, LedgerError> {
        let mut entries = vec![(Value::Text("content".to_string()), self.to_value())];
        if let Some((public_key, signature)) = identity.sign(&self.request_id()) {
            entries.push((Value::Text("sender_pubkey".to_string()), Value::Bytes(public_key)));
            entries.push((Value::Text("sender_sig".to_string()), Value::Bytes(signature)));
        }

        let envelope = Value::Tag(SELF_DESCRIBE_TAG, Box::new(Value::Map(entries)));
        let mut out = Vec::new();
        ciborium::into_writer(&envelope, &mut out)
            .map_err(|e| LedgerError::InvalidResponse(format!("cbor encode failed: {e}")))?;
        Ok(out)
    }
}

/// Decode a CBOR body, dropping the self-describe tag if present.
pub fn decode_cbor(body: &[u8]) -> Result<Value, LedgerError> {
    let value: Value = ciborium::from_reader(body)
        .map_err(|e| LedgerError::InvalidResponse(format!("cbor decode failed: {e}")))?;
    Ok(match value {
        Value::Tag(SELF_DESCRIBE_TAG, inner) => *inner,
        other => other,
    })
}

/// Look up a text key in a CBOR map.
pub fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_text() == Some(key))
        .map(|(_, v)| v)
}

fn leb128(mut n: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}
