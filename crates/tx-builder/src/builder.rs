//! The three transaction shapes the bridge issues. Constructors are pure:
//! they produce unsigned transactions, signing is a separate pass.

use alloy_primitives::{Address as EvmAddress, B256};
use bitcoin::{Amount, OutPoint, ScriptBuf, Transaction, TxOut};
use wbtc_bridge_primitives::{
    bitcoin::BitcoinAddress,
    deposit::DepositPayload,
    redeem::fulfillment_script,
    scripts::{create_tx, create_tx_ins, create_tx_outs},
};

use crate::error::{BuilderError, BuilderResult};

/// A vault output being spent, with everything signing needs later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpendableUtxo {
    pub outpoint: OutPoint,
    pub value: Amount,
    pub script_pubkey: ScriptBuf,
}

impl SpendableUtxo {
    pub fn prevout(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.script_pubkey.clone(),
        }
    }
}

fn change_amount(
    utxos: &[SpendableUtxo],
    amount: Amount,
    fee: Amount,
) -> BuilderResult<Amount> {
    let inputs = utxos.iter().map(|u| u.value).sum::<Amount>();

    inputs
        .checked_sub(amount)
        .and_then(|rest| rest.checked_sub(fee))
        .ok_or(BuilderError::ChangeNegative {
            inputs,
            amount,
            fee,
        })
}

/// A plain transfer: `[pay-to-dst, (change)]`.
pub fn make_transfer_tx(
    dst: &BitcoinAddress,
    amount: Amount,
    change_addr: &BitcoinAddress,
    fee: Amount,
    utxos: &[SpendableUtxo],
) -> BuilderResult<Transaction> {
    let change = change_amount(utxos, amount, fee)?;

    let mut outputs = vec![(dst.script_pubkey(), amount)];
    if change > Amount::ZERO {
        outputs.push((change_addr.script_pubkey(), change));
    }

    Ok(create_tx(
        create_tx_ins(utxos.iter().map(|u| u.outpoint)),
        create_tx_outs(outputs),
    ))
}

/// The redeem payout: `[pay-to-dst, OP_RETURN(request_tx_hash), pay-to-change]`
/// with the change output omitted when change is zero.
pub fn make_redeem_tx(
    dst: &BitcoinAddress,
    amount: Amount,
    request_tx_hash: B256,
    change_addr: &BitcoinAddress,
    fee: Amount,
    utxos: &[SpendableUtxo],
) -> BuilderResult<Transaction> {
    let change = change_amount(utxos, amount, fee)?;

    let mut outputs = vec![
        (dst.script_pubkey(), amount),
        (fulfillment_script(request_tx_hash), Amount::ZERO),
    ];
    if change > Amount::ZERO {
        outputs.push((change_addr.script_pubkey(), change));
    }

    Ok(create_tx(
        create_tx_ins(utxos.iter().map(|u| u.outpoint)),
        create_tx_outs(outputs),
    ))
}

/// The user-side deposit:
/// `[pay-to-bridge, OP_RETURN(rlp(chain_id, evm_addr)), (change)]`.
#[allow(clippy::too_many_arguments)]
pub fn make_deposit_tx(
    utxos: &[SpendableUtxo],
    bridge_addr: &BitcoinAddress,
    amount: Amount,
    fee: Amount,
    change_addr: &BitcoinAddress,
    evm_chain_id: u32,
    evm_addr: EvmAddress,
) -> BuilderResult<Transaction> {
    let change = change_amount(utxos, amount, fee)?;

    let payload = DepositPayload::new(evm_chain_id, evm_addr);
    let mut outputs = vec![
        (bridge_addr.script_pubkey(), amount),
        (payload.to_script(), Amount::ZERO),
    ];
    if change > Amount::ZERO {
        outputs.push((change_addr.script_pubkey(), change));
    }

    Ok(create_tx(
        create_tx_ins(utxos.iter().map(|u| u.outpoint)),
        create_tx_outs(outputs),
    ))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;
    use bitcoin::{hashes::Hash, CompressedPublicKey, Network, Txid};
    use secp256k1::{PublicKey, SecretKey, SECP256K1};
    use wbtc_bridge_primitives::{
        deposit::DEPOSIT_PAYLOAD_LEN,
        scripts::op_return_data,
    };

    use super::*;

    /// Deterministic p2wpkh address for tests.
    fn addr(seed: u8) -> BitcoinAddress {
        let secret_key = SecretKey::from_slice(&[seed; 32]).unwrap();
        let public_key = CompressedPublicKey(PublicKey::from_secret_key(SECP256K1, &secret_key));
        let address = bitcoin::Address::p2wpkh(&public_key, Network::Testnet);

        BitcoinAddress::parse(&address.to_string(), Network::Testnet).unwrap()
    }

    fn utxo(txid_byte: u8, value: u64) -> SpendableUtxo {
        SpendableUtxo {
            outpoint: OutPoint {
                txid: Txid::from_byte_array([txid_byte; 32]),
                vout: 0,
            },
            value: Amount::from_sat(value),
            script_pubkey: ScriptBuf::from_hex(
                "00140000000000000000000000000000000000000001",
            )
            .unwrap(),
        }
    }

    #[test]
    fn redeem_tx_has_ordered_outputs() {
        let dst = addr(0x11);
        let change = addr(0x22);
        let request = B256::repeat_byte(0xaa);

        let tx = make_redeem_tx(
            &dst,
            Amount::from_sat(10_000_000),
            request,
            &change,
            Amount::from_sat(10_000),
            &[utxo(1, 20_000_000)],
        )
        .unwrap();

        assert_eq!(tx.output.len(), 3);
        assert_eq!(tx.output[0].value, Amount::from_sat(10_000_000));
        assert_eq!(tx.output[0].script_pubkey, dst.script_pubkey());
        assert_eq!(
            op_return_data(&tx.output[1].script_pubkey),
            Some(request.as_slice().to_vec())
        );
        assert_eq!(tx.output[2].value, Amount::from_sat(9_990_000));
        assert_eq!(tx.output[2].script_pubkey, change.script_pubkey());
    }

    #[test]
    fn redeem_tx_omits_zero_change() {
        let dst = addr(0x11);
        let change = addr(0x22);

        let tx = make_redeem_tx(
            &dst,
            Amount::from_sat(9_000),
            B256::repeat_byte(1),
            &change,
            Amount::from_sat(1_000),
            &[utxo(1, 10_000)],
        )
        .unwrap();

        assert_eq!(tx.output.len(), 2);
    }

    #[test]
    fn change_negative_is_rejected() {
        let dst = addr(0x11);
        let change = addr(0x22);

        let err = make_redeem_tx(
            &dst,
            Amount::from_sat(10_000),
            B256::repeat_byte(1),
            &change,
            Amount::from_sat(1_000),
            &[utxo(1, 10_500)],
        )
        .unwrap_err();

        assert!(matches!(err, BuilderError::ChangeNegative { .. }));
    }

    #[test]
    fn deposit_tx_carries_rlp_payload() {
        let bridge = addr(0x11);
        let change = addr(0x22);
        let receiver = address!("dab18f11a915c12948e27f07a4be7e54e14f3940");

        let tx = make_deposit_tx(
            &[utxo(1, 30_000_000)],
            &bridge,
            Amount::from_sat(20_000_000),
            Amount::from_sat(10_000),
            &change,
            1337,
            receiver,
        )
        .unwrap();

        assert_eq!(tx.output.len(), 3);
        assert_eq!(tx.output[0].script_pubkey, bridge.script_pubkey());

        let data = op_return_data(&tx.output[1].script_pubkey).unwrap();
        assert_eq!(data.len(), DEPOSIT_PAYLOAD_LEN);

        let payload = DepositPayload::decode(&data).unwrap();
        assert_eq!(payload.chain_id, 1337);
        assert_eq!(payload.receiver, receiver);
    }

    #[test]
    fn transfer_tx_spends_all_inputs() {
        let dst = addr(0x11);
        let change = addr(0x22);

        let tx = make_transfer_tx(
            &dst,
            Amount::from_sat(1_500),
            &change,
            Amount::from_sat(100),
            &[utxo(1, 1_000), utxo(2, 1_000)],
        )
        .unwrap();

        assert_eq!(tx.input.len(), 2);
        assert_eq!(tx.output.len(), 2);
        assert_eq!(tx.output[1].value, Amount::from_sat(400));
    }
}
