//! ABI fragments for the escrow factory and escrow contracts.
//!
//! Call data is assembled by hand from typed fields so the encoding the
//! factory uses for deterministic address derivation is reproduced
//! field-for-field; a stringly-typed amount can never slip into a call.
//! Event decoding matches topic0 against precomputed signatures before any
//! structured decode is attempted, so an unrelated log is a cheap skip, not
//! an error path.

use crate::data_structures::ExecutionData;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, Log, H256};
use ethers::utils::{id, keccak256};
use thiserror::Error;

/// Canonical type string of the ExecutionData tuple, as it appears in
/// function and event signatures.
pub const EXECUTION_DATA_TUPLE: &str = "(bytes32,bytes32,address,address,address,address,\
uint256,uint256,uint256,uint256,uint256,address,uint256,bytes)";

#[derive(Debug, Error)]
pub enum AbiCodecError {
    #[error("abi decode failed: {0}")]
    Decode(#[from] ethers::abi::Error),
    #[error("unexpected abi shape: {0}")]
    Shape(String),
}

fn execution_data_param() -> ParamType {
    ParamType::Tuple(vec![
        ParamType::FixedBytes(32), // orderHash
        ParamType::FixedBytes(32), // hashlock
        ParamType::Address,        // asker
        ParamType::Address,        // fulfiller
        ParamType::Address,        // srcToken
        ParamType::Address,        // dstToken
        ParamType::Uint(256),      // srcChainId
        ParamType::Uint(256),      // dstChainId
        ParamType::Uint(256),      // askerAmount
        ParamType::Uint(256),      // fulfillerAmount
        ParamType::Uint(256),      // platformFee
        ParamType::Address,        // feeCollector
        ParamType::Uint(256),      // timelocks
        ParamType::Bytes,          // parameters
    ])
}

fn execution_data_token(data: &ExecutionData) -> Token {
    Token::Tuple(vec![
        Token::FixedBytes(data.order_hash.as_bytes().to_vec()),
        Token::FixedBytes(data.hashlock.as_bytes().to_vec()),
        Token::Address(data.asker),
        Token::Address(data.fulfiller),
        Token::Address(data.src_token),
        Token::Address(data.dst_token),
        Token::Uint(data.src_chain_id),
        Token::Uint(data.dst_chain_id),
        Token::Uint(data.asker_amount),
        Token::Uint(data.fulfiller_amount),
        Token::Uint(data.platform_fee),
        Token::Address(data.fee_collector),
        Token::Uint(data.timelocks),
        Token::Bytes(data.parameters.to_vec()),
    ])
}

fn take_fixed32(
    it: &mut impl Iterator<Item = Token>,
    field: &'static str,
) -> Result<H256, AbiCodecError> {
    match it.next() {
        Some(Token::FixedBytes(b)) if b.len() == 32 => Ok(H256::from_slice(&b)),
        other => Err(AbiCodecError::Shape(format!(
            "field `{}`: expected bytes32, got {:?}",
            field, other
        ))),
    }
}

fn take_address(
    it: &mut impl Iterator<Item = Token>,
    field: &'static str,
) -> Result<Address, AbiCodecError> {
    match it.next() {
        Some(Token::Address(a)) => Ok(a),
        other => Err(AbiCodecError::Shape(format!(
            "field `{}`: expected address, got {:?}",
            field, other
        ))),
    }
}

fn take_uint(
    it: &mut impl Iterator<Item = Token>,
    field: &'static str,
) -> Result<ethers::types::U256, AbiCodecError> {
    match it.next() {
        Some(Token::Uint(u)) => Ok(u),
        other => Err(AbiCodecError::Shape(format!(
            "field `{}`: expected uint256, got {:?}",
            field, other
        ))),
    }
}

fn take_bytes(
    it: &mut impl Iterator<Item = Token>,
    field: &'static str,
) -> Result<Bytes, AbiCodecError> {
    match it.next() {
        Some(Token::Bytes(b)) => Ok(Bytes::from(b)),
        other => Err(AbiCodecError::Shape(format!(
            "field `{}`: expected bytes, got {:?}",
            field, other
        ))),
    }
}

fn execution_data_from_token(token: Token) -> Result<ExecutionData, AbiCodecError> {
    let fields = match token {
        Token::Tuple(fields) if fields.len() == 14 => fields,
        other => {
            return Err(AbiCodecError::Shape(format!(
                "expected 14-field execution data tuple, got {:?}",
                other
            )))
        }
    };
    let mut it = fields.into_iter();
    Ok(ExecutionData {
        order_hash: take_fixed32(&mut it, "orderHash")?,
        hashlock: take_fixed32(&mut it, "hashlock")?,
        asker: take_address(&mut it, "asker")?,
        fulfiller: take_address(&mut it, "fulfiller")?,
        src_token: take_address(&mut it, "srcToken")?,
        dst_token: take_address(&mut it, "dstToken")?,
        src_chain_id: take_uint(&mut it, "srcChainId")?,
        dst_chain_id: take_uint(&mut it, "dstChainId")?,
        asker_amount: take_uint(&mut it, "askerAmount")?,
        fulfiller_amount: take_uint(&mut it, "fulfillerAmount")?,
        platform_fee: take_uint(&mut it, "platformFee")?,
        fee_collector: take_address(&mut it, "feeCollector")?,
        timelocks: take_uint(&mut it, "timelocks")?,
        parameters: take_bytes(&mut it, "parameters")?,
    })
}

fn call_with_execution_data(name: &str, data: &ExecutionData) -> Bytes {
    let selector = id(format!("{}({})", name, EXECUTION_DATA_TUPLE));
    let mut buf = selector.to_vec();
    buf.extend(abi::encode(&[execution_data_token(data)]));
    Bytes::from(buf)
}

/// Call data for `addressOfEscrowSrc(ExecutionData)`.
pub fn address_of_escrow_src_call(data: &ExecutionData) -> Bytes {
    call_with_execution_data("addressOfEscrowSrc", data)
}

/// Call data for `addressOfEscrowDst(ExecutionData)`.
pub fn address_of_escrow_dst_call(data: &ExecutionData) -> Bytes {
    call_with_execution_data("addressOfEscrowDst", data)
}

/// Call data for the escrow's `executionData()` view.
pub fn execution_data_call() -> Bytes {
    Bytes::from(id("executionData()").to_vec())
}

/// Call data for `withdraw(bytes32 secret, ExecutionData data)`.
pub fn withdraw_call(secret: H256, data: &ExecutionData) -> Bytes {
    let selector = id(format!("withdraw(bytes32,{})", EXECUTION_DATA_TUPLE));
    let mut buf = selector.to_vec();
    buf.extend(abi::encode(&[
        Token::FixedBytes(secret.as_bytes().to_vec()),
        execution_data_token(data),
    ]));
    Bytes::from(buf)
}

/// ABI encoding of the bare ExecutionData tuple, as it appears in a view
/// return or an event payload. Mirror of `decode_execution_data`.
pub fn encode_execution_data(data: &ExecutionData) -> Bytes {
    Bytes::from(abi::encode(&[execution_data_token(data)]))
}

/// Decodes a view return holding a single address.
pub fn decode_address(data: &[u8]) -> Result<Address, AbiCodecError> {
    let tokens = abi::decode(&[ParamType::Address], data)?;
    match tokens.into_iter().next() {
        Some(Token::Address(a)) => Ok(a),
        other => Err(AbiCodecError::Shape(format!(
            "expected address return, got {:?}",
            other
        ))),
    }
}

/// Decodes the `executionData()` view return.
pub fn decode_execution_data(data: &[u8]) -> Result<ExecutionData, AbiCodecError> {
    let tokens = abi::decode(&[execution_data_param()], data)?;
    match tokens.into_iter().next() {
        Some(token) => execution_data_from_token(token),
        None => Err(AbiCodecError::Shape("empty execution data return".into())),
    }
}

/// A factory log, classified and decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FactoryEvent {
    /// `SrcEscrowCreated(ExecutionData)`.
    SrcEscrowCreated { execution_data: ExecutionData },
    /// `DstEscrowCreated(address escrow, bytes32 hashlock, address asker)`.
    /// The emitted escrow address is authoritative over the prediction.
    DstEscrowCreated {
        escrow: Address,
        hashlock: H256,
        asker: Address,
    },
}

/// `DstSecretRevealed(bytes32 secret, bytes32 hashlock)` from a destination
/// escrow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecretRevealed {
    pub secret: H256,
    pub hashlock: H256,
}

/// Precomputed topic0 hashes for the events the relayer consumes. Built once
/// per monitor so classification is a hash comparison per log.
#[derive(Clone, Debug)]
pub struct EventSignatures {
    src_escrow_created: H256,
    dst_escrow_created: H256,
    dst_secret_revealed: H256,
}

impl Default for EventSignatures {
    fn default() -> Self {
        EventSignatures::new()
    }
}

impl EventSignatures {
    pub fn new() -> Self {
        EventSignatures {
            src_escrow_created: H256::from(keccak256(format!(
                "SrcEscrowCreated({})",
                EXECUTION_DATA_TUPLE
            ))),
            dst_escrow_created: H256::from(keccak256(
                "DstEscrowCreated(address,bytes32,address)",
            )),
            dst_secret_revealed: H256::from(keccak256("DstSecretRevealed(bytes32,bytes32)")),
        }
    }

    pub fn src_escrow_created_topic(&self) -> H256 {
        self.src_escrow_created
    }

    pub fn dst_escrow_created_topic(&self) -> H256 {
        self.dst_escrow_created
    }

    pub fn dst_secret_revealed_topic(&self) -> H256 {
        self.dst_secret_revealed
    }

    /// Classifies a factory log by topic0. `None` means the log belongs to
    /// some other event or emitter and carries no information for us;
    /// `Some(Err(_))` means the topic matched but the payload is malformed.
    pub fn decode_factory(&self, log: &Log) -> Option<Result<FactoryEvent, AbiCodecError>> {
        let topic0 = log.topics.first()?;
        if *topic0 == self.src_escrow_created {
            Some(
                decode_tuple_event(log).map(|execution_data| FactoryEvent::SrcEscrowCreated {
                    execution_data,
                }),
            )
        } else if *topic0 == self.dst_escrow_created {
            Some(decode_dst_escrow_created(log))
        } else {
            None
        }
    }

    /// Classifies an escrow log, looking only for the secret reveal.
    pub fn decode_secret_revealed(
        &self,
        log: &Log,
    ) -> Option<Result<SecretRevealed, AbiCodecError>> {
        let topic0 = log.topics.first()?;
        if *topic0 != self.dst_secret_revealed {
            return None;
        }
        Some(decode_secret_revealed_data(log))
    }
}

fn decode_tuple_event(log: &Log) -> Result<ExecutionData, AbiCodecError> {
    decode_execution_data(log.data.as_ref())
}

fn decode_dst_escrow_created(log: &Log) -> Result<FactoryEvent, AbiCodecError> {
    let tokens = abi::decode(
        &[ParamType::Address, ParamType::FixedBytes(32), ParamType::Address],
        log.data.as_ref(),
    )?;
    let mut it = tokens.into_iter();
    Ok(FactoryEvent::DstEscrowCreated {
        escrow: take_address(&mut it, "escrow")?,
        hashlock: take_fixed32(&mut it, "hashlock")?,
        asker: take_address(&mut it, "asker")?,
    })
}

fn decode_secret_revealed_data(log: &Log) -> Result<SecretRevealed, AbiCodecError> {
    let tokens = abi::decode(
        &[ParamType::FixedBytes(32), ParamType::FixedBytes(32)],
        log.data.as_ref(),
    )?;
    let mut it = tokens.into_iter();
    Ok(SecretRevealed {
        secret: take_fixed32(&mut it, "secret")?,
        hashlock: take_fixed32(&mut it, "hashlock")?,
    })
}
