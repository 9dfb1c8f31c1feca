//! Certificate verification for `read_state` responses
//!
//! A certificate is only read after its BLS signature checks out against the
//! root key, either directly or through a subnet delegation the root key signed.

use candid::Principal;
use ciborium::Value;
use ic_certification::{Certificate, HashTree, LookupResult};
use ic_verify_bls_signature::verify_bls_signature;

use super::envelope::decode_cbor;
use crate::error::LedgerError;

/// DER header in front of a raw 96-byte BLS12-381 G2 public key.
pub(super) const BLS_DER_PREFIX: [u8; 37] = [
    0x30, 0x81, 0x82, 0x30, 0x1d, 0x06, 0x0d, 0x2b, 0x06, 0x01, 0x04, 0x01,
    0x82, 0xdc, 0x7c, 0x05, 0x03, 0x01, 0x02, 0x01, 0x06, 0x0c, 0x2b, 0x06,
    0x01, 0x04, 0x01, 0x82, 0xdc, 0x7c, 0x05, 0x03, 0x02, 0x01, 0x03, 0x61,
    0x00,
];

/// Raw public root key of the IC main network.
const MAINNET_ROOT_KEY: [u8; 96] = [
    0x81, 0x4c, 0x0e, 0x6e, 0xc7, 0x1f, 0xab, 0x58, 0x3b, 0x08, 0xbd, 0x81,
    0x37, 0x3c, 0x25, 0x5c, 0x3c, 0x37, 0x1b, 0x2e, 0x84, 0x86, 0x3c, 0x98,
    0xa4, 0xf1, 0xe0, 0x8b, 0x74, 0x23, 0x5d, 0x14, 0xfb, 0x5d, 0x9c, 0x0c,
    0xd5, 0x46, 0xd9, 0x68, 0x5f, 0x91, 0x3a, 0x0c, 0x0b, 0x2c, 0xc5, 0x34,
    0x15, 0x83, 0xbf, 0x4b, 0x43, 0x92, 0xe4, 0x67, 0xdb, 0x96, 0xd6, 0x5b,
    0x9b, 0xb4, 0xcb, 0x71, 0x71, 0x12, 0xf8, 0x47, 0x2e, 0x0d, 0x5a, 0x4d,
    0x14, 0x50, 0x5f, 0xfd, 0x74, 0x84, 0xb0, 0x12, 0x91, 0x09, 0x1c, 0x5f,
    0x87, 0xb9, 0x88, 0x83, 0x46, 0x3f, 0x98, 0x09, 0x1a, 0x0b, 0xaa, 0xae,
];

const STATE_ROOT_DOMAIN: &[u8] = b"\x0Dic-state-root";

const REQUEST_STATUS: &[u8] = b"request_status";
const STATUS: &[u8] = b"status";
const REPLY: &[u8] = b"reply";
const REJECT_MESSAGE: &[u8] = b"reject_message";

/// Key every certificate chain must end in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RootKey(Vec<u8>);

impl RootKey {
    pub fn mainnet() -> Self {
        Self(MAINNET_ROOT_KEY.to_vec())
    }

    /// Accept the DER form served by `/api/v2/status`.
    pub fn from_der(der: &[u8]) -> Result<Self, LedgerError> {
        match der.strip_prefix(&BLS_DER_PREFIX[..]) {
            Some(raw) if raw.len() == MAINNET_ROOT_KEY.len() => Ok(Self(raw.to_vec())),
            _ => Err(LedgerError::InvalidResponse(
                "root key is not a DER-encoded BLS12-381 key".to_string(),
            )),
        }
    }
}

/// Outcome of an update call as seen in the state tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Replied(Vec<u8>),
    Rejected(String),
    /// Executed, but the reply has already been pruned from the state.
    Done,
}

/// A state tree whose root hash was signed by a trusted key.
#[derive(Debug)]
pub struct VerifiedTree {
    tree: HashTree,
}

impl VerifiedTree {
    /// Parse `bytes` and check the signature chain for `canister_id`.
    pub fn verify(
        bytes: &[u8],
        root_key: &RootKey,
        canister_id: &Principal,
    ) -> Result<Self, LedgerError> {
        let certificate = parse(bytes)?;
        let signing_key = match &certificate.delegation {
            None => root_key.0.clone(),
            Some(delegation) => {
                delegated_key(&delegation.subnet_id, &delegation.certificate, root_key, canister_id)?
            }
        };
        check_signature(&certificate, &signing_key)?;

        Ok(Self {
            tree: certificate.tree,
        })
    }

    pub fn request_status(&self, request_id: &[u8]) -> Result<RequestStatus, LedgerError> {
        let status = match self.tree.lookup_path([REQUEST_STATUS, request_id, STATUS]) {
            LookupResult::Found(raw) => String::from_utf8_lossy(raw).into_owned(),
            LookupResult::Absent | LookupResult::Unknown => return Ok(RequestStatus::Pending),
            LookupResult::Error => return Err(malformed("request status")),
        };

        match status.as_str() {
            "received" | "processing" => Ok(RequestStatus::Pending),
            "replied" => match self.tree.lookup_path([REQUEST_STATUS, request_id, REPLY]) {
                LookupResult::Found(reply) => Ok(RequestStatus::Replied(reply.to_vec())),
                _ => Err(LedgerError::InvalidResponse("replied without reply".to_string())),
            },
            "rejected" => {
                let message = match self
                    .tree
                    .lookup_path([REQUEST_STATUS, request_id, REJECT_MESSAGE])
                {
                    LookupResult::Found(raw) => String::from_utf8_lossy(raw).into_owned(),
                    _ => "rejected without message".to_string(),
                };
                Ok(RequestStatus::Rejected(message))
            }
            "done" => Ok(RequestStatus::Done),
            other => Err(LedgerError::InvalidResponse(format!(
                "unknown request status {other:?}"
            ))),
        }
    }
}

fn parse(bytes: &[u8]) -> Result<Certificate, LedgerError> {
    ciborium::from_reader(bytes)
        .map_err(|e| LedgerError::InvalidResponse(format!("malformed certificate: {e}")))
}

fn check_signature(certificate: &Certificate, key: &[u8]) -> Result<(), LedgerError> {
    let mut message = STATE_ROOT_DOMAIN.to_vec();
    message.extend_from_slice(&certificate.tree.digest());

    verify_bls_signature(&certificate.signature, &message, key).map_err(|_| {
        LedgerError::InvalidResponse("certificate signature does not verify".to_string())
    })
}

/// Subnet key from a delegation, after checking the root key signed it and
/// that the subnet hosts `canister_id`.
fn delegated_key(
    subnet_id: &[u8],
    delegation: &[u8],
    root_key: &RootKey,
    canister_id: &Principal,
) -> Result<Vec<u8>, LedgerError> {
    let certificate = parse(delegation)?;
    if certificate.delegation.is_some() {
        return Err(LedgerError::InvalidResponse(
            "delegation certificates must not be delegated".to_string(),
        ));
    }
    check_signature(&certificate, &root_key.0)?;

    let ranges = match certificate
        .tree
        .lookup_path([b"subnet".as_slice(), subnet_id, b"canister_ranges".as_slice()])
    {
        LookupResult::Found(raw) => decode_cbor(raw)?,
        _ => return Err(malformed("delegation canister ranges")),
    };
    if !in_ranges(&ranges, canister_id.as_slice())? {
        return Err(LedgerError::InvalidResponse(format!(
            "subnet is not authorized to answer for canister {canister_id}"
        )));
    }

    match certificate
        .tree
        .lookup_path([b"subnet".as_slice(), subnet_id, b"public_key".as_slice()])
    {
        LookupResult::Found(der) => RootKey::from_der(der).map(|key| key.0),
        _ => Err(malformed("delegation public key")),
    }
}

/// `ranges` is a CBOR list of inclusive `[start, end]` principal pairs.
fn in_ranges(ranges: &Value, canister_id: &[u8]) -> Result<bool, LedgerError> {
    let ranges = ranges
        .as_array()
        .ok_or_else(|| malformed("delegation canister ranges"))?;

    for range in ranges {
        let bounds = range
            .as_array()
            .filter(|bounds| bounds.len() == 2)
            .ok_or_else(|| malformed("canister range"))?;
        let (Some(start), Some(end)) = (bounds[0].as_bytes(), bounds[1].as_bytes()) else {
            return Err(malformed("canister range"));
        };
        if start.as_slice() <= canister_id && canister_id <= end.as_slice() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn malformed(what: &str) -> LedgerError {
    LedgerError::InvalidResponse(format!("certificate has malformed {what}"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ic_certification::{fork, labeled, leaf};
    use ic_verify_bls_signature::PrivateKey;

    /// Test-side stand-in for the network's root of trust.
    pub struct Signer {
        key: PrivateKey,
    }

    impl Signer {
        pub fn random() -> Self {
            Self {
                key: PrivateKey::random(&mut rand::thread_rng()),
            }
        }

        pub fn root_key_der(&self) -> Vec<u8> {
            let mut der = BLS_DER_PREFIX.to_vec();
            der.extend_from_slice(&self.key.public_key().serialize());
            der
        }

        pub fn root_key(&self) -> RootKey {
            RootKey::from_der(&self.root_key_der()).unwrap()
        }

        pub fn certify(&self, tree: HashTree) -> Certificate {
            let mut message = STATE_ROOT_DOMAIN.to_vec();
            message.extend_from_slice(&tree.digest());
            Certificate {
                signature: self.key.sign(&message).serialize().to_vec(),
                tree,
                delegation: None,
            }
        }
    }

    pub fn encode(certificate: &Certificate) -> Vec<u8> {
        let mut out = Vec::new();
        ciborium::into_writer(certificate, &mut out).unwrap();
        out
    }

    /// Tree holding `request_status/<id>/...` entries.
    pub fn status_tree(request_id: &[u8], mut entries: Vec<(&str, Vec<u8>)>) -> HashTree {
        entries.sort_by(|a, b| a.0.cmp(b.0));
        let subtree = entries
            .into_iter()
            .map(|(label, value)| labeled(label, leaf(value)))
            .reduce(fork)
            .unwrap_or_else(ic_certification::empty);

        fork(
            labeled("request_status", labeled(request_id, subtree)),
            labeled("time", leaf(vec![1])),
        )
    }

    const CANISTER: Principal = Principal::from_slice(&[0, 0, 0, 0, 0, 0, 0, 1, 1, 1]);

    #[test]
    fn finds_replied_status() {
        let signer = Signer::random();
        let id = [9u8; 32];
        let bytes = encode(&signer.certify(status_tree(
            &id,
            vec![("status", b"replied".to_vec()), ("reply", b"DIDL\x00\x00".to_vec())],
        )));

        let tree = VerifiedTree::verify(&bytes, &signer.root_key(), &CANISTER).unwrap();
        assert_eq!(
            tree.request_status(&id).unwrap(),
            RequestStatus::Replied(b"DIDL\x00\x00".to_vec())
        );
    }

    #[test]
    fn reports_rejection_message() {
        let signer = Signer::random();
        let id = [3u8; 32];
        let bytes = encode(&signer.certify(status_tree(
            &id,
            vec![
                ("status", b"rejected".to_vec()),
                ("reject_message", b"caller is not the admin".to_vec()),
            ],
        )));

        let tree = VerifiedTree::verify(&bytes, &signer.root_key(), &CANISTER).unwrap();
        assert_eq!(
            tree.request_status(&id).unwrap(),
            RequestStatus::Rejected("caller is not the admin".to_string())
        );
    }

    #[test]
    fn missing_request_is_pending_and_done_is_reported() {
        let signer = Signer::random();
        let bytes = encode(&signer.certify(status_tree(&[1; 32], vec![("status", b"done".to_vec())])));
        let tree = VerifiedTree::verify(&bytes, &signer.root_key(), &CANISTER).unwrap();

        assert_eq!(tree.request_status(&[2; 32]).unwrap(), RequestStatus::Pending);
        assert_eq!(tree.request_status(&[1; 32]).unwrap(), RequestStatus::Done);
    }

    #[test]
    fn forged_certificate_is_rejected() {
        let signer = Signer::random();
        let id = [9u8; 32];
        let mut certificate = signer.certify(status_tree(&id, vec![("status", b"processing".to_vec())]));
        // swap in a tree the key never signed
        certificate.tree = status_tree(&id, vec![("status", b"replied".to_vec()), ("reply", vec![])]);

        let err = VerifiedTree::verify(&encode(&certificate), &signer.root_key(), &CANISTER).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidResponse(msg) if msg.contains("signature")));
    }

    #[test]
    fn certificate_from_another_network_is_rejected() {
        let bytes = encode(&Signer::random().certify(status_tree(&[1; 32], vec![])));
        assert!(VerifiedTree::verify(&bytes, &Signer::random().root_key(), &CANISTER).is_err());
        assert!(VerifiedTree::verify(&bytes, &RootKey::mainnet(), &CANISTER).is_err());
    }

    #[test]
    fn unsigned_certificate_is_rejected() {
        let mut certificate = Signer::random().certify(status_tree(&[1; 32], vec![]));
        certificate.signature = vec![0; 48];
        assert!(VerifiedTree::verify(&encode(&certificate), &RootKey::mainnet(), &CANISTER).is_err());
    }

    fn delegation_tree(subnet_id: &[u8], subnet_key_der: Vec<u8>, ranges: Vec<(Vec<u8>, Vec<u8>)>) -> HashTree {
        let ranges = Value::Array(
            ranges
                .into_iter()
                .map(|(start, end)| Value::Array(vec![Value::Bytes(start), Value::Bytes(end)]))
                .collect(),
        );
        let mut encoded = Vec::new();
        ciborium::into_writer(&ranges, &mut encoded).unwrap();

        labeled(
            "subnet",
            labeled(
                subnet_id,
                fork(
                    labeled("canister_ranges", leaf(encoded)),
                    labeled("public_key", leaf(subnet_key_der)),
                ),
            ),
        )
    }

    fn delegated_certificate(
        root: &Signer,
        subnet: &Signer,
        ranges: Vec<(Vec<u8>, Vec<u8>)>,
        tree: HashTree,
    ) -> Vec<u8> {
        let subnet_id = vec![7u8; 29];
        let delegation = root.certify(delegation_tree(&subnet_id, subnet.root_key_der(), ranges));

        let mut certificate = subnet.certify(tree);
        certificate.delegation = Some(ic_certification::Delegation {
            subnet_id,
            certificate: encode(&delegation),
        });
        encode(&certificate)
    }

    #[test]
    fn follows_subnet_delegation() {
        let root = Signer::random();
        let subnet = Signer::random();
        let id = [4u8; 32];
        let covering = vec![(vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1], vec![0, 0, 0, 0, 0, 0, 0, 2, 1, 1])];

        let bytes = delegated_certificate(
            &root,
            &subnet,
            covering,
            status_tree(&id, vec![("status", b"replied".to_vec()), ("reply", vec![1])]),
        );

        let tree = VerifiedTree::verify(&bytes, &root.root_key(), &CANISTER).unwrap();
        assert_eq!(tree.request_status(&id).unwrap(), RequestStatus::Replied(vec![1]));
    }

    #[test]
    fn delegation_must_cover_the_canister() {
        let root = Signer::random();
        let subnet = Signer::random();
        let elsewhere = vec![(vec![0, 0, 0, 0, 0, 0, 0, 9, 1, 1], vec![0, 0, 0, 0, 0, 0, 0, 9, 1, 2])];

        let bytes = delegated_certificate(&root, &subnet, elsewhere, status_tree(&[1; 32], vec![]));
        assert!(VerifiedTree::verify(&bytes, &root.root_key(), &CANISTER).is_err());
    }

    #[test]
    fn delegation_signed_by_unknown_root_is_rejected() {
        let subnet = Signer::random();
        let covering = vec![(vec![0], vec![0xff; 10])];
        let bytes = delegated_certificate(&Signer::random(), &subnet, covering, status_tree(&[1; 32], vec![]));

        assert!(VerifiedTree::verify(&bytes, &Signer::random().root_key(), &CANISTER).is_err());
    }

    #[test]
    fn mainnet_key_verifies_a_mainnet_signature() {
        let signature = hex::decode(
            "ace9fcdd9bc977e05d6328f889dc4e7c99114c737a494653cb27a1f55c06f4555e0f160980af5ead098acc195010b2f7",
        )
        .unwrap();
        let message = hex::decode(
            "0d69632d73746174652d726f6f74e6c01e909b4923345ce5970962bcfe3004bfd8474a21dae28f50692502f46d90",
        )
        .unwrap();

        assert!(verify_bls_signature(&signature, &message, &RootKey::mainnet().0).is_ok());
        assert!(RootKey::from_der(&[0u8; 133]).is_err());
    }
}
