//! The signing identity used for canister calls

use candid::Principal;
use ed25519_dalek::{Signer, SigningKey};

const ED25519_DER_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];
const REQUEST_DOMAIN: &[u8] = b"\x0Aic-request";

/// Either the anonymous sender or an Ed25519 key.
pub enum Identity {
    Anonymous,
    Ed25519(SigningKey),
}

impl Identity {
    pub fn new(key: Option<SigningKey>) -> Self {
        match key {
            Some(key) => Identity::Ed25519(key),
            None => Identity::Anonymous,
        }
    }

    pub fn sender(&self) -> Principal {
        match self {
            Identity::Anonymous => Principal::anonymous(),
            Identity::Ed25519(key) => Principal::self_authenticating(public_key_der(key)),
        }
    }

    /// DER public key and signature over `request_id`, absent for anonymous calls.
    pub fn sign(&self, request_id: &[u8; 32]) -> Option<(Vec<u8>, Vec<u8>)> {
        match self {
            Identity::Anonymous => None,
            Identity::Ed25519(key) => {
                let mut message = REQUEST_DOMAIN.to_vec();
                message.extend_from_slice(request_id);
                let signature = key.sign(&message);
                Some((public_key_der(key), signature.to_bytes().to_vec()))
            }
        }
    }
}

fn public_key_der(key: &SigningKey) -> Vec<u8> {
    let mut der = ED25519_DER_PREFIX.to_vec();
    der.extend_from_slice(key.verifying_key().as_bytes());
    der
}
