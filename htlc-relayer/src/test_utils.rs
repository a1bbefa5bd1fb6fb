// Shared fixtures and the mock chain client used by unit and e2e tests.

use crate::data_structures::ExecutionData;
use crate::onchain::abi::{self, EventSignatures};
use crate::onchain::interface::{ChainClient, ChainClientError, TxHash};
use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, Log, H256, U256, U64};
use ethers::utils::keccak256;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// In-memory chain double. Logs, bytecode and view responses are staged by
/// the test; submitted transactions are recorded for assertions. Failure
/// switches simulate an unreachable endpoint or a reverting escrow.
#[derive(Default)]
pub struct MockChainState {
    pub block_number: u64,
    pub logs: Vec<Log>,
    pub code: HashMap<Address, Bytes>,
    pub call_responses: HashMap<(Address, [u8; 4]), Bytes>,
    pub fail_block_number: bool,
    pub fail_get_logs: bool,
    pub fail_sends_to: HashSet<Address>,
    /// When set, a second transaction to the same address is rejected the
    /// way an escrow rejects an already-completed withdrawal.
    pub reject_repeat_sends: bool,
    pub sent: Vec<(Address, Bytes)>,
    tx_counter: u64,
}

#[derive(Clone, Default)]
pub struct MockChainClient {
    state: Arc<Mutex<MockChainState>>,
}

impl MockChainClient {
    pub fn new() -> Self {
        MockChainClient::default()
    }

    pub fn set_block_number(&self, number: u64) {
        self.state.lock().block_number = number;
    }

    pub fn advance_blocks(&self, count: u64) {
        self.state.lock().block_number += count;
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().logs.push(log);
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.state.lock().code.insert(address, code);
    }

    /// Stages the return data for a view call, keyed by callee and selector.
    pub fn set_call_response(&self, to: Address, selector: [u8; 4], ret: Bytes) {
        self.state.lock().call_responses.insert((to, selector), ret);
    }

    /// Stages the factory's two address-derivation answers for any
    /// execution data.
    pub fn stage_address_predictions(&self, factory: Address, src: Address, dst: Address) {
        let data = ExecutionData::default();
        let src_sel = selector_of(&abi::address_of_escrow_src_call(&data));
        let dst_sel = selector_of(&abi::address_of_escrow_dst_call(&data));
        self.set_call_response(
            factory,
            src_sel,
            Bytes::from(ethers::abi::encode(&[Token::Address(src)])),
        );
        self.set_call_response(
            factory,
            dst_sel,
            Bytes::from(ethers::abi::encode(&[Token::Address(dst)])),
        );
    }

    /// Stages an escrow's `executionData()` answer.
    pub fn stage_execution_data(&self, escrow: Address, data: &ExecutionData) {
        let sel = selector_of(&abi::execution_data_call());
        let raw = abi::encode_execution_data(data);
        self.set_call_response(escrow, sel, raw);
    }

    pub fn set_fail_block_number(&self, fail: bool) {
        self.state.lock().fail_block_number = fail;
    }

    pub fn set_fail_get_logs(&self, fail: bool) {
        self.state.lock().fail_get_logs = fail;
    }

    /// Any transaction sent to `address` is rejected, like a reverting
    /// escrow.
    pub fn reject_sends_to(&self, address: Address) {
        self.state.lock().fail_sends_to.insert(address);
    }

    /// Emulates the escrows' own de-duplication: only the first send to a
    /// given address succeeds.
    pub fn set_reject_repeat_sends(&self, reject: bool) {
        self.state.lock().reject_repeat_sends = reject;
    }

    pub fn sent_transactions(&self) -> Vec<(Address, Bytes)> {
        self.state.lock().sent.clone()
    }
}

fn selector_of(calldata: &Bytes) -> [u8; 4] {
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&calldata[..4]);
    sel
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_number(&self) -> Result<u64, ChainClientError> {
        let state = self.state.lock();
        if state.fail_block_number {
            return Err(ChainClientError::Rpc("mock endpoint down".to_string()));
        }
        Ok(state.block_number)
    }

    async fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Log>, ChainClientError> {
        let state = self.state.lock();
        if state.fail_get_logs {
            return Err(ChainClientError::Rpc("mock log query failed".to_string()));
        }
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.address == address
                    && log
                        .block_number
                        .map(|n| {
                            let n = n.as_u64();
                            n >= from_block && n <= to_block
                        })
                        .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainClientError> {
        if data.len() < 4 {
            return Err(ChainClientError::Rpc("calldata too short".to_string()));
        }
        let state = self.state.lock();
        state
            .call_responses
            .get(&(to, selector_of(&data)))
            .cloned()
            .ok_or_else(|| ChainClientError::Rpc(format!("no mock response staged for {:#x}", to)))
    }

    async fn get_code(&self, address: Address) -> Result<Bytes, ChainClientError> {
        Ok(self
            .state
            .lock()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
    ) -> Result<TxHash, ChainClientError> {
        let mut state = self.state.lock();
        if state.fail_sends_to.contains(&to) {
            return Err(ChainClientError::TxRejected(
                "execution reverted".to_string(),
            ));
        }
        if state.reject_repeat_sends && state.sent.iter().any(|(addr, _)| *addr == to) {
            return Err(ChainClientError::TxRejected(
                "withdrawal already completed".to_string(),
            ));
        }
        state.tx_counter += 1;
        let mut preimage = to.as_bytes().to_vec();
        preimage.extend_from_slice(&data);
        preimage.extend_from_slice(&state.tx_counter.to_be_bytes());
        let hash = H256::from(keccak256(&preimage));
        state.sent.push((to, data));
        Ok(hash)
    }
}

/// Sample execution data between the two reference chains.
pub fn sample_execution_data(hashlock: H256, asker: Address) -> ExecutionData {
    ExecutionData {
        order_hash: H256::from_low_u64_be(0x0D0E),
        hashlock,
        asker,
        fulfiller: Address::zero(),
        src_token: Address::from_low_u64_be(0x1001),
        dst_token: Address::from_low_u64_be(0x2002),
        src_chain_id: U256::from(11155111u64),
        dst_chain_id: U256::from(84532u64),
        asker_amount: U256::from(1_000_000u64),
        fulfiller_amount: U256::from(2_000_000u64),
        platform_fee: U256::from(500u64),
        fee_collector: Address::from_low_u64_be(0xFEE),
        timelocks: U256::from(0u64),
        parameters: Bytes::new(),
    }
}

/// A secret and its keccak256 hashlock.
pub fn secret_pair(seed: u8) -> (H256, H256) {
    let secret = H256::from_slice(&[seed; 32]);
    let hashlock = H256::from(keccak256(secret.as_bytes()));
    (secret, hashlock)
}

/// Fabricates the factory's `SrcEscrowCreated` log.
pub fn src_escrow_created_log(factory: Address, data: &ExecutionData, block: u64) -> Log {
    let sigs = EventSignatures::new();
    Log {
        address: factory,
        topics: vec![sigs.src_escrow_created_topic()],
        data: abi::encode_execution_data(data),
        block_number: Some(U64::from(block)),
        ..Default::default()
    }
}

/// Fabricates the factory's `DstEscrowCreated` log.
pub fn dst_escrow_created_log(
    factory: Address,
    escrow: Address,
    hashlock: H256,
    asker: Address,
    block: u64,
) -> Log {
    let sigs = EventSignatures::new();
    Log {
        address: factory,
        topics: vec![sigs.dst_escrow_created_topic()],
        data: Bytes::from(ethers::abi::encode(&[
            Token::Address(escrow),
            Token::FixedBytes(hashlock.as_bytes().to_vec()),
            Token::Address(asker),
        ])),
        block_number: Some(U64::from(block)),
        ..Default::default()
    }
}

/// Fabricates an escrow's `DstSecretRevealed` log.
pub fn secret_revealed_log(escrow: Address, secret: H256, hashlock: H256, block: u64) -> Log {
    let sigs = EventSignatures::new();
    Log {
        address: escrow,
        topics: vec![sigs.dst_secret_revealed_topic()],
        data: Bytes::from(ethers::abi::encode(&[
            Token::FixedBytes(secret.as_bytes().to_vec()),
            Token::FixedBytes(hashlock.as_bytes().to_vec()),
        ])),
        block_number: Some(U64::from(block)),
        ..Default::default()
    }
}
