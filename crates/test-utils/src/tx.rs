use alloy_primitives::{Address as EvmAddress, B256};
use bitcoin::{
    block::{Header, Version},
    hashes::Hash,
    Amount, Block, BlockHash, CompactTarget, OutPoint, ScriptBuf, Transaction, TxMerkleNode, TxOut,
    Txid,
};
use wbtc_bridge_primitives::{
    deposit::DepositPayload,
    redeem::fulfillment_script,
    scripts::{create_tx, create_tx_ins},
};

/// A deposit-shaped transaction: pay-to-bridge, payload, optional change.
pub fn deposit_tx(
    bridge_script: &ScriptBuf,
    value: Amount,
    chain_id: u32,
    receiver: EvmAddress,
    change: Option<(Amount, ScriptBuf)>,
) -> Transaction {
    let mut outputs = vec![
        TxOut {
            value,
            script_pubkey: bridge_script.clone(),
        },
        TxOut {
            value: Amount::ZERO,
            script_pubkey: DepositPayload::new(chain_id, receiver).to_script(),
        },
    ];
    if let Some((change_value, change_script)) = change {
        outputs.push(TxOut {
            value: change_value,
            script_pubkey: change_script,
        });
    }

    create_tx(
        create_tx_ins([OutPoint {
            txid: Txid::from_byte_array([0xfe; 32]),
            vout: 0,
        }]),
        outputs,
    )
}

/// A fulfillment-shaped transaction: payout, 32-byte payload, bridge change.
pub fn fulfillment_tx(
    user_script: &ScriptBuf,
    payout: Amount,
    request_tx_hash: B256,
    change_script: &ScriptBuf,
    change: Amount,
) -> Transaction {
    create_tx(
        create_tx_ins([OutPoint {
            txid: Txid::from_byte_array([0xfd; 32]),
            vout: 0,
        }]),
        vec![
            TxOut {
                value: payout,
                script_pubkey: user_script.clone(),
            },
            TxOut {
                value: Amount::ZERO,
                script_pubkey: fulfillment_script(request_tx_hash),
            },
            TxOut {
                value: change,
                script_pubkey: change_script.clone(),
            },
        ],
    )
}

/// A simple one-output transfer.
pub fn transfer_tx(dst_script: &ScriptBuf, value: Amount) -> Transaction {
    create_tx(
        create_tx_ins([OutPoint {
            txid: Txid::from_byte_array([0xfc; 32]),
            vout: 0,
        }]),
        vec![TxOut {
            value,
            script_pubkey: dst_script.clone(),
        }],
    )
}

/// Wrap transactions in a block with a synthetic header.
pub fn block_with_txs(height: u64, txs: Vec<Transaction>) -> Block {
    Block {
        header: Header {
            version: Version::TWO,
            prev_blockhash: BlockHash::from_byte_array([height as u8; 32]),
            merkle_root: TxMerkleNode::from_byte_array([0u8; 32]),
            time: 1_700_000_000 + height as u32,
            bits: CompactTarget::from_consensus(0x1d00_ffff),
            nonce: height as u32,
        },
        txdata: txs,
    }
}
