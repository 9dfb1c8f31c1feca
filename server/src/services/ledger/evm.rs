//! EVM contract backend over JSON-RPC
//!
//! With `LEDGER_PRIVATE_KEY` set, transactions are signed in-process as
//! EIP-155 legacy transactions and submitted with `eth_sendRawTransaction`.
//! Otherwise they go through `eth_sendTransaction` from an account the node
//! manages (Hardhat/Anvil style).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k256::ecdsa::{SigningKey, VerifyingKey};
use reqwest::Client;
use rlp::RlpStream;
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use tokio::time::sleep;
use tracing::{debug, info};

use super::{LedgerBackend, LedgerConnection};
use crate::config::{ContractConfig, ContractSigner};
use crate::error::LedgerError;
use crate::models::WriteReceipt;

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// First four bytes of `keccak256(signature)`.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// ABI-encode a signed integer as a two's-complement 32-byte word.
pub fn encode_int256(value: i128) -> [u8; 32] {
    let fill = if value < 0 { 0xff } else { 0x00 };
    let mut word = [fill; 32];
    word[16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Decode the first 32-byte word of an ABI return value.
pub fn decode_int256(word: &[u8]) -> Result<i128, LedgerError> {
    if word.len() < 32 {
        return Err(LedgerError::InvalidResponse(format!(
            "expected a 32-byte word, got {} bytes",
            word.len()
        )));
    }

    let mut low = [0u8; 16];
    low.copy_from_slice(&word[16..32]);
    let value = i128::from_be_bytes(low);
    let expected_fill = if value < 0 { 0xff } else { 0x00 };
    if word[..16].iter().any(|byte| *byte != expected_fill) {
        return Err(LedgerError::InvalidResponse(
            "int256 value does not fit in 128 bits".to_string(),
        ));
    }

    Ok(value)
}

/// Checksum-free `0x` address of a secp256k1 key.
pub fn address_of(key: &VerifyingKey) -> String {
    let point = key.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    format!("0x{}", hex::encode(&digest[12..]))
}

/// Pre-EIP-1559 transaction, signed with EIP-155 replay protection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas: u64,
    pub to: Vec<u8>,
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

impl LegacyTransaction {
    fn append_body(&self, stream: &mut RlpStream) {
        stream.append(&self.nonce);
        stream.append(&self.gas_price);
        stream.append(&self.gas);
        stream.append(&self.to);
        stream.append(&self.value);
        stream.append(&self.data);
    }

    /// `keccak256(rlp([nonce, gasPrice, gas, to, value, data, chainId, 0, 0]))`
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&self.chain_id);
        stream.append(&0u8);
        stream.append(&0u8);

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&Keccak256::digest(stream.out()));
        hash
    }

    /// Raw signed transaction bytes for `eth_sendRawTransaction`.
    pub fn sign(&self, key: &SigningKey) -> Result<Vec<u8>, LedgerError> {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(&self.signing_hash())
            .map_err(|err| LedgerError::WriteRejected(format!("could not sign transaction: {err}")))?;
        let v = u64::from(u8::from(recovery_id)) + 35 + 2 * self.chain_id;
        let bytes = signature.to_bytes();

        let mut stream = RlpStream::new_list(9);
        self.append_body(&mut stream);
        stream.append(&v);
        stream.append(&trim_leading_zeros(&bytes[..32]));
        stream.append(&trim_leading_zeros(&bytes[32..]));
        Ok(stream.out().to_vec())
    }
}

fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|byte| *byte != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Who signs outgoing transactions.
#[derive(Clone)]
enum Sender {
    Node { from: String },
    Local { key: SigningKey, address: String },
}

impl Sender {
    fn new(signer: &ContractSigner) -> Self {
        match signer {
            ContractSigner::Node { from_address } => Sender::Node {
                from: from_address.clone(),
            },
            ContractSigner::Local(key) => Sender::Local {
                address: address_of(key.verifying_key()),
                key: key.clone(),
            },
        }
    }

    fn address(&self) -> &str {
        match self {
            Sender::Node { from } => from,
            Sender::Local { address, .. } => address,
        }
    }
}

#[derive(Clone, Copy)]
struct Selectors {
    write: [u8; 4],
    read: [u8; 4],
    threshold: [u8; 4],
    set_threshold: [u8; 4],
}

pub struct EvmBackend {
    config: ContractConfig,
    sender: Sender,
    selectors: Selectors,
    http: Client,
    receipt_poll_interval: Duration,
}

impl EvmBackend {
    pub fn new(
        config: ContractConfig,
        connect_timeout: Duration,
        write_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(write_timeout)
            .build()?;

        let selectors = Selectors {
            write: selector(&config.write_method),
            read: selector(&config.read_method),
            threshold: selector(&config.threshold_method),
            set_threshold: selector(&config.set_threshold_method),
        };

        Ok(Self {
            sender: Sender::new(&config.signer),
            config,
            selectors,
            http,
            receipt_poll_interval: RECEIPT_POLL_INTERVAL,
        })
    }

    pub fn with_receipt_poll_interval(mut self, interval: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self
    }
}

#[async_trait]
impl LedgerBackend for EvmBackend {
    fn name(&self) -> &'static str {
        "contract"
    }

    async fn connect(&self) -> Result<Arc<dyn LedgerConnection>, LedgerError> {
        let rpc = JsonRpc {
            url: self.config.rpc_url.clone(),
            http: self.http.clone(),
            next_id: AtomicU64::new(1),
        };
        let chain_id = rpc.chain_id().await?;

        let connection = EvmConnection {
            rpc,
            chain_id,
            config: self.config.clone(),
            sender: self.sender.clone(),
            selectors: self.selectors,
            receipt_poll_interval: self.receipt_poll_interval,
        };
        info!(
            chain_id,
            rpc_url = %self.config.rpc_url,
            sender = connection.sender.address(),
            local_signing = matches!(connection.sender, Sender::Local { .. }),
            "connected to EVM node"
        );

        Ok(Arc::new(connection))
    }
}

enum RpcFailure {
    Transport(LedgerError),
    Rpc { code: i64, message: String },
}

impl RpcFailure {
    /// Node-side errors (reverts, bad sender) become rejections.
    fn into_ledger_error(self) -> LedgerError {
        match self {
            RpcFailure::Transport(err) => err,
            RpcFailure::Rpc { code, message } => {
                LedgerError::WriteRejected(format!("{message} (code {code})"))
            }
        }
    }
}

struct JsonRpc {
    url: String,
    http: Client,
    next_id: AtomicU64,
}

impl JsonRpc {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .http
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| RpcFailure::Transport(err.into()))?
            .json::<Value>()
            .await
            .map_err(|err| {
                RpcFailure::Transport(LedgerError::InvalidResponse(format!(
                    "{method} returned non-JSON body: {err}"
                )))
            })?;

        if let Some(error) = response.get("error") {
            return Err(RpcFailure::Rpc {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown RPC error")
                    .to_string(),
            });
        }

        response.get("result").cloned().ok_or_else(|| {
            RpcFailure::Transport(LedgerError::InvalidResponse(format!(
                "{method} response has no result"
            )))
        })
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        let result = self
            .call("eth_chainId", json!([]))
            .await
            .map_err(|failure| match failure {
                // a node that answers at all is reachable, but one that rejects
                // eth_chainId is not one we can talk to
                RpcFailure::Rpc { message, .. } => LedgerError::ConnectionUnavailable(message),
                RpcFailure::Transport(err) => err,
            })?;
        parse_quantity(&result)
    }

    /// Call `method` and hand back the result; node-side errors become rejections.
    async fn request(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        self.call(method, params)
            .await
            .map_err(RpcFailure::into_ledger_error)
    }
}

struct EvmConnection {
    rpc: JsonRpc,
    chain_id: u64,
    config: ContractConfig,
    sender: Sender,
    selectors: Selectors,
    receipt_poll_interval: Duration,
}

impl EvmConnection {
    async fn eth_call(&self, to: &str, selector: [u8; 4]) -> Result<i128, LedgerError> {
        let result = self
            .rpc
            .request(
                "eth_call",
                json!([{ "to": to, "data": format!("0x{}", hex::encode(selector)) }, "latest"]),
            )
            .await?;

        let bytes = decode_hex(&result)?;
        decode_int256(&bytes)
    }

    async fn send_and_confirm(
        &self,
        to: &str,
        selector: [u8; 4],
        value: i128,
    ) -> Result<WriteReceipt, LedgerError> {
        let mut data = selector.to_vec();
        data.extend_from_slice(&encode_int256(value));

        let tx_hash = match &self.sender {
            Sender::Node { from } => {
                self.rpc
                    .request(
                        "eth_sendTransaction",
                        json!([{
                            "from": from,
                            "to": to,
                            "data": format!("0x{}", hex::encode(&data)),
                        }]),
                    )
                    .await?
            }
            Sender::Local { key, address } => {
                let raw = self.sign_locally(key, address, to, data).await?;
                self.rpc
                    .request("eth_sendRawTransaction", json!([format!("0x{}", hex::encode(raw))]))
                    .await?
            }
        };
        let tx_hash = tx_hash
            .as_str()
            .ok_or_else(|| LedgerError::InvalidResponse("transaction hash is not a string".into()))?
            .to_string();

        debug!(%tx_hash, "transaction submitted, waiting for receipt");

        loop {
            let receipt = self
                .rpc
                .request("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;

            if receipt.is_null() {
                sleep(self.receipt_poll_interval).await;
                continue;
            }

            let block = receipt
                .get("blockNumber")
                .map(parse_quantity)
                .transpose()?;
            let succeeded = receipt
                .get("status")
                .map(|status| parse_quantity(status).map(|code| code == 1))
                .transpose()?
                .unwrap_or(true);

            if !succeeded {
                return Err(LedgerError::WriteRejected(format!(
                    "transaction {tx_hash} reverted"
                )));
            }

            info!(%tx_hash, ?block, "transaction confirmed");
            return Ok(WriteReceipt {
                reference: tx_hash,
                block,
            });
        }
    }

    /// Fill nonce, gas price and gas limit from the node, then sign.
    async fn sign_locally(
        &self,
        key: &SigningKey,
        from: &str,
        to: &str,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, LedgerError> {
        let nonce = parse_quantity(
            &self
                .rpc
                .request("eth_getTransactionCount", json!([from, "pending"]))
                .await?,
        )?;
        let gas_price = parse_wei(&self.rpc.request("eth_gasPrice", json!([])).await?)?;
        let gas = parse_quantity(
            &self
                .rpc
                .request(
                    "eth_estimateGas",
                    json!([{ "from": from, "to": to, "data": format!("0x{}", hex::encode(&data)) }]),
                )
                .await?,
        )?;

        let transaction = LegacyTransaction {
            nonce,
            gas_price,
            gas,
            to: parse_address(to)?,
            value: 0,
            data,
            chain_id: self.chain_id,
        };
        debug!(nonce, gas_price, gas, chain_id = self.chain_id, "signing transaction");
        transaction.sign(key)
    }
}

#[async_trait]
impl LedgerConnection for EvmConnection {
    async fn health_check(&self) -> Result<(), LedgerError> {
        self.rpc.chain_id().await.map(|_| ())
    }

    async fn write_value(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        self.send_and_confirm(&self.config.oracle_address, self.selectors.write, scaled)
            .await
    }

    async fn read_value(&self) -> Result<i128, LedgerError> {
        self.eth_call(&self.config.oracle_address, self.selectors.read)
            .await
    }

    async fn read_threshold(&self) -> Result<i128, LedgerError> {
        self.eth_call(&self.config.threshold_address, self.selectors.threshold)
            .await
    }

    async fn write_threshold(&self, scaled: i128) -> Result<WriteReceipt, LedgerError> {
        self.send_and_confirm(
            &self.config.threshold_address,
            self.selectors.set_threshold,
            scaled,
        )
        .await
    }
}

fn decode_hex(value: &Value) -> Result<Vec<u8>, LedgerError> {
    let text = value
        .as_str()
        .ok_or_else(|| LedgerError::InvalidResponse(format!("expected hex string, got {value}")))?;
    hex::decode(text.trim_start_matches("0x"))
        .map_err(|err| LedgerError::InvalidResponse(format!("bad hex {text:?}: {err}")))
}

fn parse_quantity(value: &Value) -> Result<u64, LedgerError> {
    let text = value
        .as_str()
        .ok_or_else(|| LedgerError::InvalidResponse(format!("expected quantity, got {value}")))?;
    u64::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|err| LedgerError::InvalidResponse(format!("bad quantity {text:?}: {err}")))
}

/// Wei amounts can exceed `u64`.
fn parse_wei(value: &Value) -> Result<u128, LedgerError> {
    let text = value
        .as_str()
        .ok_or_else(|| LedgerError::InvalidResponse(format!("expected quantity, got {value}")))?;
    u128::from_str_radix(text.trim_start_matches("0x"), 16)
        .map_err(|err| LedgerError::InvalidResponse(format!("bad quantity {text:?}: {err}")))
}

fn parse_address(text: &str) -> Result<Vec<u8>, LedgerError> {
    match hex::decode(text.trim_start_matches("0x")) {
        Ok(bytes) if bytes.len() == 20 => Ok(bytes),
        _ => Err(LedgerError::WriteRejected(format!("{text:?} is not a 20-byte address"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_stub;
    use axum::{routing::post, Json, Router};
    use std::sync::Mutex;

    const ORACLE: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
    const PARAMIFY: &str = "0xe7f1725e7734ce288f8367e1bb143e90bb3f0512";
    const HARDHAT_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const HARDHAT_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";

    fn hardhat_key() -> SigningKey {
        SigningKey::from_slice(&hex::decode(HARDHAT_KEY).unwrap()).unwrap()
    }

    fn contract_config(rpc_url: String) -> ContractConfig {
        ContractConfig {
            rpc_url,
            oracle_address: ORACLE.to_string(),
            threshold_address: PARAMIFY.to_string(),
            signer: ContractSigner::Node {
                from_address: HARDHAT_ADDRESS.to_string(),
            },
            write_method: "updateAnswer(int256)".to_string(),
            read_method: "latestAnswer()".to_string(),
            threshold_method: "floodThreshold()".to_string(),
            set_threshold_method: "setThreshold(uint256)".to_string(),
        }
    }

    #[derive(Default)]
    struct Node {
        requests: Mutex<Vec<Value>>,
        receipt_polls: Mutex<u32>,
        revert: bool,
    }

    fn word_hex(value: i128) -> String {
        format!("0x{}", hex::encode(encode_int256(value)))
    }

    async fn spawn_node(node: Arc<Node>) -> String {
        let router = Router::new().route(
            "/",
            post(move |Json(request): Json<Value>| {
                let node = node.clone();
                async move {
                    node.requests.lock().unwrap().push(request.clone());
                    let id = request["id"].clone();
                    let method = request["method"].as_str().unwrap_or_default();
                    let result = match method {
                        "eth_chainId" => json!("0x7a69"),
                        "eth_sendTransaction" | "eth_sendRawTransaction" => json!("0xabc123"),
                        "eth_getTransactionCount" => json!("0x9"),
                        "eth_gasPrice" => json!("0x4a817c800"),
                        "eth_estimateGas" => json!("0xb411"),
                        "eth_getTransactionReceipt" => {
                            let mut polls = node.receipt_polls.lock().unwrap();
                            *polls += 1;
                            if *polls < 2 {
                                Value::Null
                            } else {
                                let status = if node.revert { "0x0" } else { "0x1" };
                                json!({ "status": status, "blockNumber": "0x2a" })
                            }
                        }
                        "eth_call" => {
                            let to = request["params"][0]["to"].as_str().unwrap_or_default();
                            if to == PARAMIFY {
                                json!(word_hex(1_200_000_000_000))
                            } else {
                                json!(word_hex(381_000_000_000))
                            }
                        }
                        _ => {
                            return Json(json!({
                                "jsonrpc": "2.0",
                                "id": id,
                                "error": { "code": -32601, "message": "method not found" }
                            }))
                        }
                    };
                    Json(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
                }
            }),
        );
        spawn_stub(router).await
    }

    async fn connect(url: String) -> Arc<dyn LedgerConnection> {
        connect_with(contract_config(url)).await
    }

    async fn connect_with(config: ContractConfig) -> Arc<dyn LedgerConnection> {
        EvmBackend::new(
            config,
            Duration::from_secs(2),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_receipt_poll_interval(Duration::from_millis(10))
        .connect()
        .await
        .unwrap()
    }

    #[test]
    fn computes_known_selectors() {
        assert_eq!(hex::encode(selector("latestAnswer()")), "50d25bcd");
        assert_eq!(hex::encode(selector("updateAnswer(int256)")), "a87a20ce");
    }

    #[test]
    fn int256_words_round_trip_sign() {
        assert_eq!(decode_int256(&encode_int256(381_000_000_000)), Ok(381_000_000_000));
        assert_eq!(decode_int256(&encode_int256(-5)), Ok(-5));
        assert_eq!(&encode_int256(-1)[..], &[0xff; 32][..]);
    }

    #[test]
    fn rejects_words_wider_than_i128() {
        let mut word = [0u8; 32];
        word[0] = 1;
        assert!(decode_int256(&word).is_err());
        assert!(decode_int256(&[0u8; 4]).is_err());
    }

    #[test]
    fn derives_address_from_private_key() {
        assert_eq!(address_of(hardhat_key().verifying_key()), HARDHAT_ADDRESS);
    }

    #[test]
    fn signs_eip155_reference_transaction() {
        let key = SigningKey::from_slice(&[0x46; 32]).unwrap();
        let transaction = LegacyTransaction {
            nonce: 9,
            gas_price: 20_000_000_000,
            gas: 21_000,
            to: vec![0x35; 20],
            value: 1_000_000_000_000_000_000,
            data: Vec::new(),
            chain_id: 1,
        };

        assert_eq!(
            hex::encode(transaction.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );
        assert_eq!(
            hex::encode(transaction.sign(&key).unwrap()),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a7640000\
             8025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f\
             761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    /// Rebuild the transaction from raw bytes and recover who signed it.
    fn decode_signed(raw: &[u8]) -> (LegacyTransaction, String) {
        let rlp = rlp::Rlp::new(raw);
        let v: u64 = rlp.val_at(6).unwrap();
        let chain_id = (v - 35) / 2;
        let transaction = LegacyTransaction {
            nonce: rlp.val_at(0).unwrap(),
            gas_price: rlp.val_at(1).unwrap(),
            gas: rlp.val_at(2).unwrap(),
            to: rlp.val_at(3).unwrap(),
            value: rlp.val_at(4).unwrap(),
            data: rlp.val_at(5).unwrap(),
            chain_id,
        };

        let mut rs = [0u8; 64];
        for (index, offset) in [(7usize, 0usize), (8, 32)] {
            let part: Vec<u8> = rlp.val_at(index).unwrap();
            rs[offset + 32 - part.len()..offset + 32].copy_from_slice(&part);
        }
        let signature = k256::ecdsa::Signature::from_slice(&rs).unwrap();
        let recovery_id = k256::ecdsa::RecoveryId::from_byte((v - 35 - 2 * chain_id) as u8).unwrap();
        let key = VerifyingKey::recover_from_prehash(&transaction.signing_hash(), &signature, recovery_id)
            .unwrap();
        (transaction, address_of(&key))
    }

    #[tokio::test]
    async fn local_key_signs_and_sends_raw_transaction() {
        let node = Arc::new(Node::default());
        let mut config = contract_config(spawn_node(node.clone()).await);
        config.signer = ContractSigner::Local(hardhat_key());
        let connection = connect_with(config).await;

        let receipt = connection.write_value(381_000_000_000).await.unwrap();
        assert_eq!(receipt.reference, "0xabc123");

        let requests = node.requests.lock().unwrap();
        assert!(!requests.iter().any(|req| req["method"] == "eth_sendTransaction"));
        let nonce_request = requests
            .iter()
            .find(|req| req["method"] == "eth_getTransactionCount")
            .unwrap();
        assert_eq!(nonce_request["params"], json!([HARDHAT_ADDRESS, "pending"]));

        let send = requests
            .iter()
            .find(|req| req["method"] == "eth_sendRawTransaction")
            .unwrap();
        let raw = hex::decode(send["params"][0].as_str().unwrap().trim_start_matches("0x")).unwrap();
        let (transaction, signer) = decode_signed(&raw);

        assert_eq!(signer, HARDHAT_ADDRESS);
        assert_eq!(transaction.chain_id, 31337);
        assert_eq!(transaction.nonce, 9);
        assert_eq!(transaction.gas_price, 20_000_000_000);
        assert_eq!(transaction.gas, 46_097);
        assert_eq!(hex::encode(&transaction.to), ORACLE.trim_start_matches("0x"));
        assert_eq!(transaction.value, 0);
        assert_eq!(&transaction.data[..4], &selector("updateAnswer(int256)"));
        assert_eq!(&transaction.data[4..], &encode_int256(381_000_000_000));
    }

    #[tokio::test]
    async fn writes_scaled_value_and_waits_for_receipt() {
        let node = Arc::new(Node::default());
        let connection = connect(spawn_node(node.clone()).await).await;

        let receipt = connection.write_value(381_000_000_000).await.unwrap();
        assert_eq!(receipt.reference, "0xabc123");
        assert_eq!(receipt.block, Some(42));

        let requests = node.requests.lock().unwrap();
        let send = requests
            .iter()
            .find(|req| req["method"] == "eth_sendTransaction")
            .unwrap();
        let data = send["params"][0]["data"].as_str().unwrap();
        assert!(data.starts_with("0xa87a20ce"));
        assert!(data.ends_with(&hex::encode(381_000_000_000i128.to_be_bytes())));
        assert_eq!(send["params"][0]["to"], ORACLE);
        assert_eq!(*node.receipt_polls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn reverted_receipt_is_rejected() {
        let node = Arc::new(Node {
            revert: true,
            ..Node::default()
        });
        let connection = connect(spawn_node(node).await).await;

        let err = connection.write_value(1).await.unwrap_err();
        assert!(matches!(err, LedgerError::WriteRejected(_)));
    }

    #[tokio::test]
    async fn reads_value_and_threshold_from_their_contracts() {
        let node = Arc::new(Node::default());
        let connection = connect(spawn_node(node).await).await;

        assert_eq!(connection.read_value().await.unwrap(), 381_000_000_000);
        assert_eq!(connection.read_threshold().await.unwrap(), 1_200_000_000_000);
    }

    #[tokio::test]
    async fn unreachable_node_fails_connect() {
        let backend = EvmBackend::new(
            contract_config("http://127.0.0.1:9".to_string()),
            Duration::from_millis(200),
            Duration::from_millis(500),
        )
        .unwrap();

        let err = match backend.connect().await {
            Ok(_) => panic!("connect should fail"),
            Err(err) => err,
        };
        assert!(err.is_connection());
    }
}
