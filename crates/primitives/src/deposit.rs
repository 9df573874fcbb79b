//! Codec for the deposit OP_RETURN payload and the deposit transaction shape.
//!
//! A deposit transaction pays the bridge address at output 0 and carries a
//! null-data output at index 1 whose payload is the RLP list
//! `[chain_id (4 bytes, big-endian), receiver (20 bytes)]`.

use alloy_primitives::Address;
use alloy_rlp::{Encodable, Header};
use bitcoin::{Amount, ScriptBuf, Transaction};
use thiserror::Error;

use crate::scripts::{op_return_data, op_return_script};

/// Encoded length of the deposit payload: 1-byte list header, a 4-byte string
/// item and a 20-byte string item (each with a 1-byte string header).
pub const DEPOSIT_PAYLOAD_LEN: usize = 27;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DepositParseError {
    #[error("first output does not pay the bridge address")]
    NotToBridge,

    #[error("deposit value must be non-zero")]
    ZeroValue,

    #[error("missing or malformed null-data output")]
    NoOpReturn,

    #[error("payload is {0} bytes, expected {DEPOSIT_PAYLOAD_LEN}")]
    BadLength(usize),

    #[error("malformed rlp payload: {0}")]
    Rlp(&'static str),
}

/// The destination-chain routing information carried by a deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositPayload {
    /// Destination chain identifier, big-endian 4 bytes on the wire.
    pub chain_id: u32,

    /// Receiver of the wrapped token on the destination chain.
    pub receiver: Address,
}

impl DepositPayload {
    pub fn new(chain_id: u32, receiver: Address) -> Self {
        Self { chain_id, receiver }
    }

    /// RLP-encode the payload. The result is always [`DEPOSIT_PAYLOAD_LEN`]
    /// bytes long.
    pub fn encode(&self) -> Vec<u8> {
        let chain_id = self.chain_id.to_be_bytes();

        let mut items = Vec::with_capacity(DEPOSIT_PAYLOAD_LEN - 1);
        chain_id.as_slice().encode(&mut items);
        self.receiver.as_slice().encode(&mut items);

        let mut out = Vec::with_capacity(DEPOSIT_PAYLOAD_LEN);
        Header {
            list: true,
            payload_length: items.len(),
        }
        .encode(&mut out);
        out.extend_from_slice(&items);

        debug_assert_eq!(out.len(), DEPOSIT_PAYLOAD_LEN);

        out
    }

    pub fn decode(buf: &[u8]) -> Result<Self, DepositParseError> {
        if buf.len() != DEPOSIT_PAYLOAD_LEN {
            return Err(DepositParseError::BadLength(buf.len()));
        }

        let mut rest = buf;
        let list = Header::decode(&mut rest).map_err(|_| DepositParseError::Rlp("list header"))?;
        if !list.list || list.payload_length != rest.len() {
            return Err(DepositParseError::Rlp("not a well-formed list"));
        }

        let chain_id_bytes = decode_string(&mut rest, 4)?;
        let receiver_bytes = decode_string(&mut rest, 20)?;
        if !rest.is_empty() {
            return Err(DepositParseError::Rlp("trailing bytes"));
        }

        let chain_id = u32::from_be_bytes(
            chain_id_bytes
                .try_into()
                .expect("length checked by decode_string"),
        );
        let receiver = Address::from_slice(receiver_bytes);

        Ok(Self { chain_id, receiver })
    }

    /// The null-data script to embed in a deposit transaction.
    pub fn to_script(&self) -> ScriptBuf {
        op_return_script(&self.encode()).expect("27-byte payload fits in a push")
    }

    pub fn from_script(script: &bitcoin::Script) -> Result<Self, DepositParseError> {
        let data = op_return_data(script).ok_or(DepositParseError::NoOpReturn)?;
        Self::decode(&data)
    }
}

fn decode_string<'a>(
    buf: &mut &'a [u8],
    expected_len: usize,
) -> Result<&'a [u8], DepositParseError> {
    let header = Header::decode(buf).map_err(|_| DepositParseError::Rlp("string header"))?;
    if header.list {
        return Err(DepositParseError::Rlp("unexpected nested list"));
    }
    if header.payload_length != expected_len || buf.len() < expected_len {
        return Err(DepositParseError::Rlp("unexpected item length"));
    }

    let (data, rest) = buf.split_at(expected_len);
    *buf = rest;
    Ok(data)
}

/// A deposit recognized in a finalized BTC block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositObservation {
    /// Value locked at the bridge address (output 0).
    pub value: Amount,

    /// Decoded routing payload (output 1).
    pub payload: DepositPayload,

    /// Change given back to the depositor, if any (output 2).
    pub change: Option<(Amount, ScriptBuf)>,
}

/// Match a transaction against the deposit shape: output 0 pays
/// `bridge_script` with a non-zero value and output 1 carries a parseable
/// payload. Any third output is reported as depositor change.
pub fn extract_deposit(
    tx: &Transaction,
    bridge_script: &bitcoin::Script,
) -> Result<DepositObservation, DepositParseError> {
    let pay_out = tx.output.first().ok_or(DepositParseError::NotToBridge)?;
    if pay_out.script_pubkey.as_script() != bridge_script {
        return Err(DepositParseError::NotToBridge);
    }
    if pay_out.value == Amount::ZERO {
        return Err(DepositParseError::ZeroValue);
    }

    let data_out = tx.output.get(1).ok_or(DepositParseError::NoOpReturn)?;
    let payload = DepositPayload::from_script(&data_out.script_pubkey)?;

    let change = tx
        .output
        .get(2)
        .map(|out| (out.value, out.script_pubkey.clone()));

    Ok(DepositObservation {
        value: pay_out.value,
        payload,
        change,
    })
}
