//! The redeem-fulfillment transaction shape and the outpoint encoding shared
//! by the prepare-redeem signing payload and the redeem table.

use alloy_primitives::B256;
use bitcoin::{hashes::Hash, Amount, ScriptBuf, Transaction, Txid};
use borsh::{BorshDeserialize, BorshSerialize};
use thiserror::Error;

use crate::scripts::{op_return_data, op_return_script};

/// The fulfillment null-data output carries exactly the 32-byte request hash.
pub const FULFILLMENT_PAYLOAD_LEN: usize = 32;

/// A vault outpoint pledged to a prepared redeem.
///
/// Kept separate from [`bitcoin::OutPoint`] because the on-chain prepare call
/// and the persisted BLOB both index outputs with a `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
pub struct RedeemOutpoint {
    txid: [u8; 32],
    pub vout: u16,
}

impl RedeemOutpoint {
    pub fn new(txid: Txid, vout: u16) -> Self {
        Self {
            txid: txid.to_byte_array(),
            vout,
        }
    }

    pub fn txid(&self) -> Txid {
        Txid::from_byte_array(self.txid)
    }

    pub fn txid_bytes(&self) -> [u8; 32] {
        self.txid
    }
}

#[derive(Debug, Error)]
#[error("malformed outpoint blob: {0}")]
pub struct OutpointsDecodeError(#[from] std::io::Error);

/// Canonical byte encoding of an outpoint sequence. Used both for the
/// prepare-redeem signing payload and for the redeems table BLOB column, so
/// the signed bytes and the stored bytes can never disagree.
pub fn encode_outpoints(outpoints: &[RedeemOutpoint]) -> Vec<u8> {
    borsh::to_vec(&outpoints.to_vec()).expect("outpoint vector serialization is infallible")
}

pub fn decode_outpoints(blob: &[u8]) -> Result<Vec<RedeemOutpoint>, OutpointsDecodeError> {
    Ok(Vec::<RedeemOutpoint>::try_from_slice(blob)?)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FulfillmentParseError {
    #[error("transaction does not have the payout/null-data/change outputs")]
    WrongShape,

    #[error("null-data payload is {0} bytes, expected {FULFILLMENT_PAYLOAD_LEN}")]
    BadLength(usize),

    #[error("change output does not pay the bridge change address")]
    NotToBridgeChange,
}

/// A redeem fulfillment recognized in a finalized BTC block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FulfillmentObservation {
    /// The request hash of the destination-chain redeem being paid out.
    pub request_tx_hash: B256,

    /// Value paid to the user (output 0).
    pub payout_value: Amount,

    /// Bridge change returned at output 2.
    pub change_value: Amount,

    pub change_script: ScriptBuf,
}

/// The null-data script of a fulfillment transaction.
pub fn fulfillment_script(request_tx_hash: B256) -> ScriptBuf {
    op_return_script(request_tx_hash.as_slice()).expect("32-byte payload fits in a push")
}

/// Match a transaction against the fulfillment shape: output 1 is a 32-byte
/// null-data payload and output 2 pays the bridge change address. The caller
/// still has to check that the recovered hash names a known redeem.
pub fn extract_fulfillment(
    tx: &Transaction,
    bridge_change_script: &bitcoin::Script,
) -> Result<FulfillmentObservation, FulfillmentParseError> {
    let [payout, data_out, change] = match tx.output.as_slice() {
        [payout, data_out, change, ..] => [payout, data_out, change],
        _ => return Err(FulfillmentParseError::WrongShape),
    };

    let data = op_return_data(&data_out.script_pubkey).ok_or(FulfillmentParseError::WrongShape)?;
    if data.len() != FULFILLMENT_PAYLOAD_LEN {
        return Err(FulfillmentParseError::BadLength(data.len()));
    }

    if change.script_pubkey.as_script() != bridge_change_script || change.value == Amount::ZERO {
        return Err(FulfillmentParseError::NotToBridgeChange);
    }

    Ok(FulfillmentObservation {
        request_tx_hash: B256::from_slice(&data),
        payout_value: payout.value,
        change_value: change.value,
        change_script: change.script_pubkey.clone(),
    })
}

#[cfg(test)]
mod tests {
    use bitcoin::TxOut;

    use super::*;
    use crate::scripts::create_tx;

    fn fulfillment_tx(change_script: &ScriptBuf, request: B256) -> Transaction {
        create_tx(
            vec![],
            vec![
                TxOut {
                    value: Amount::from_sat(10_000_000),
                    script_pubkey: ScriptBuf::from_hex(
                        "76a914000000000000000000000000000000000000000088ac",
                    )
                    .unwrap(),
                },
                TxOut {
                    value: Amount::ZERO,
                    script_pubkey: fulfillment_script(request),
                },
                TxOut {
                    value: Amount::from_sat(9_990_000),
                    script_pubkey: change_script.clone(),
                },
            ],
        )
    }

    #[test]
    fn fulfillment_roundtrip() {
        let change_script =
            ScriptBuf::from_hex("00140000000000000000000000000000000000000003").unwrap();
        let request = B256::repeat_byte(0xab);

        let tx = fulfillment_tx(&change_script, request);
        let observed = extract_fulfillment(&tx, &change_script).expect("valid fulfillment shape");

        assert_eq!(observed.request_tx_hash, request);
        assert_eq!(observed.payout_value, Amount::from_sat(10_000_000));
        assert_eq!(observed.change_value, Amount::from_sat(9_990_000));
    }

    #[test]
    fn fulfillment_requires_bridge_change() {
        let change_script =
            ScriptBuf::from_hex("00140000000000000000000000000000000000000003").unwrap();
        let other_script =
            ScriptBuf::from_hex("00140000000000000000000000000000000000000004").unwrap();

        let tx = fulfillment_tx(&other_script, B256::repeat_byte(1));

        assert_eq!(
            extract_fulfillment(&tx, &change_script),
            Err(FulfillmentParseError::NotToBridgeChange)
        );
    }

    #[test]
    fn outpoints_roundtrip() {
        let outpoints = vec![
            RedeemOutpoint::new(Txid::from_byte_array([1u8; 32]), 0),
            RedeemOutpoint::new(Txid::from_byte_array([2u8; 32]), 7),
        ];

        let blob = encode_outpoints(&outpoints);
        let decoded = decode_outpoints(&blob).expect("self-encoded blob");

        assert_eq!(decoded, outpoints);
    }

    #[test]
    fn empty_outpoints_roundtrip() {
        let blob = encode_outpoints(&[]);
        assert_eq!(decode_outpoints(&blob).unwrap(), Vec::new());
    }
}
