use std::str::FromStr;

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use bitcoin::{consensus, Amount, BlockHash, Txid};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::trace;
use wbtc_bridge_primitives::{
    actions::ObservedUtxo,
    redeem::{decode_outpoints, encode_outpoints, RedeemOutpoint},
    scripts::ScriptKind,
};

use crate::{
    actions::{ActionDb, DepositActionRecord, RedeemActionRecord},
    errors::{DbError, DbResult},
    monitored::{MonitoredTx, MonitoredTxDb, MonitoredTxStatus, TxKind},
    state::{MintRecord, RedeemRecord, RedeemStatus, StateDb},
    vault::{select_smallest_first, Utxo, UtxoState, VaultDb},
};

/// Sqlite-backed implementation of every database trait in this crate.
#[derive(Debug)]
pub struct SqliteDb {
    pool: SqlitePool,

    /// Serializes the vault's reserve/release/spend paths; reads go straight
    /// to the pool.
    vault_lock: Mutex<()>,
}

impl SqliteDb {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            vault_lock: Mutex::new(()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn txid_str(txid: &Txid) -> String {
    consensus::encode::serialize_hex(txid)
}

fn parse_txid(s: &str) -> DbResult<Txid> {
    consensus::encode::deserialize_hex(s)
        .map_err(|e| DbError::Corrupt(format!("txid {s}: {e}")))
}

fn block_hash_str(hash: &BlockHash) -> String {
    consensus::encode::serialize_hex(hash)
}

fn parse_block_hash(s: &str) -> DbResult<BlockHash> {
    consensus::encode::deserialize_hex(s)
        .map_err(|e| DbError::Corrupt(format!("block hash {s}: {e}")))
}

fn b256_str(value: &B256) -> String {
    hex::encode(value)
}

fn parse_b256(s: &str) -> DbResult<B256> {
    let bytes = hex::decode(s).map_err(|e| DbError::Corrupt(format!("hash {s}: {e}")))?;
    if bytes.len() != 32 {
        return Err(DbError::Corrupt(format!("hash {s}: wrong length")));
    }
    Ok(B256::from_slice(&bytes))
}

fn address_str(value: &Address) -> String {
    hex::encode(value)
}

fn parse_address(s: &str) -> DbResult<Address> {
    let bytes = hex::decode(s).map_err(|e| DbError::Corrupt(format!("address {s}: {e}")))?;
    if bytes.len() != 20 {
        return Err(DbError::Corrupt(format!("address {s}: wrong length")));
    }
    Ok(Address::from_slice(&bytes))
}

fn row_to_utxo(row: &SqliteRow) -> DbResult<Utxo> {
    let txid = parse_txid(&row.try_get::<String, _>("txid")?)?;
    let vout = row.try_get::<i64, _>("vout")? as u32;
    let amount = Amount::from_sat(row.try_get::<i64, _>("amount")? as u64);
    let pk_script = consensus::encode::deserialize_hex(&row.try_get::<String, _>("pk_script")?)
        .map_err(|e| DbError::Corrupt(format!("pk_script: {e}")))?;
    let kind = ScriptKind::from_str(&row.try_get::<String, _>("script_kind")?)
        .map_err(DbError::Corrupt)?;
    let block_height = row.try_get::<i64, _>("block_height")? as u64;
    let block_hash = parse_block_hash(&row.try_get::<String, _>("block_hash")?)?;

    let state = match row.try_get::<String, _>("state")?.as_str() {
        "available" => UtxoState::Available,
        "reserved" => {
            let reserved_for = row
                .try_get::<Option<String>, _>("reserved_for")?
                .ok_or_else(|| DbError::Corrupt("reserved row without reserved_for".into()))?;
            let reserved_until = row.try_get::<Option<i64>, _>("reserved_until")?.unwrap_or(0);
            UtxoState::Reserved {
                request_tx_hash: parse_b256(&reserved_for)?,
                reserved_until,
            }
        }
        "spent" => UtxoState::Spent,
        other => return Err(DbError::Corrupt(format!("unknown utxo state: {other}"))),
    };

    Ok(Utxo {
        txid,
        vout,
        amount,
        pk_script,
        kind,
        block_height,
        block_hash,
        state,
    })
}

#[async_trait]
impl VaultDb for SqliteDb {
    async fn add_utxo(&self, observed: &ObservedUtxo) -> DbResult<bool> {
        let _guard = self.vault_lock.lock().await;

        let txid = txid_str(&observed.txid);
        let pk_script = consensus::encode::serialize_hex(&observed.pk_script);
        let kind = observed.kind.to_string();
        let block_hash = block_hash_str(&observed.block_hash);

        let result = sqlx::query(
            "INSERT OR IGNORE INTO utxos
             (txid, vout, amount, pk_script, script_kind, block_height, block_hash, state)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'available')",
        )
        .bind(&txid)
        .bind(observed.vout as i64)
        .bind(observed.amount.to_sat() as i64)
        .bind(&pk_script)
        .bind(&kind)
        .bind(observed.block_height as i64)
        .bind(&block_hash)
        .execute(&self.pool)
        .await?;

        trace!(event = "utxo added", %txid, vout = observed.vout, new = result.rows_affected() > 0);

        Ok(result.rows_affected() > 0)
    }

    async fn reserve_utxos(
        &self,
        request_tx_hash: B256,
        amount: Amount,
        fee: Amount,
        reserved_until: i64,
    ) -> DbResult<Vec<Utxo>> {
        let _guard = self.vault_lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("SELECT * FROM utxos WHERE state = 'available'")
            .fetch_all(&mut *tx)
            .await?;

        let candidates = rows
            .iter()
            .map(row_to_utxo)
            .collect::<DbResult<Vec<_>>>()?;

        let target = amount + fee;
        let mut picked = select_smallest_first(candidates, target).map_err(|available| {
            DbError::InsufficientFunds {
                available,
                required: target.to_sat(),
            }
        })?;

        let reserved_for = b256_str(&request_tx_hash);
        for utxo in picked.iter_mut() {
            sqlx::query(
                "UPDATE utxos SET state = 'reserved', reserved_for = ?, reserved_until = ?
                 WHERE txid = ? AND vout = ?",
            )
            .bind(&reserved_for)
            .bind(reserved_until)
            .bind(txid_str(&utxo.txid))
            .bind(utxo.vout as i64)
            .execute(&mut *tx)
            .await?;

            utxo.state = UtxoState::Reserved {
                request_tx_hash,
                reserved_until,
            };
        }

        tx.commit().await?;

        Ok(picked)
    }

    async fn release_reservation(&self, request_tx_hash: B256) -> DbResult<u64> {
        let _guard = self.vault_lock.lock().await;

        let result = sqlx::query(
            "UPDATE utxos SET state = 'available', reserved_for = NULL, reserved_until = NULL
             WHERE state = 'reserved' AND reserved_for = ?",
        )
        .bind(b256_str(&request_tx_hash))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn release_expired(&self, now: i64) -> DbResult<u64> {
        let _guard = self.vault_lock.lock().await;

        let result = sqlx::query(
            "UPDATE utxos SET state = 'available', reserved_for = NULL, reserved_until = NULL
             WHERE state = 'reserved' AND reserved_until <= ?",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn reserved_for(&self, request_tx_hash: B256) -> DbResult<Vec<Utxo>> {
        let rows = sqlx::query(
            "SELECT * FROM utxos WHERE state = 'reserved' AND reserved_for = ?
             ORDER BY amount ASC, block_height ASC, txid ASC",
        )
        .bind(b256_str(&request_tx_hash))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_utxo).collect()
    }

    async fn get_utxo(&self, txid: Txid, vout: u32) -> DbResult<Option<Utxo>> {
        let row = sqlx::query("SELECT * FROM utxos WHERE txid = ? AND vout = ?")
            .bind(txid_str(&txid))
            .bind(vout as i64)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_utxo).transpose()
    }

    async fn mark_spent(&self, txid: Txid, vout: u32) -> DbResult<()> {
        let _guard = self.vault_lock.lock().await;

        sqlx::query(
            "UPDATE utxos SET state = 'spent', reserved_for = NULL, reserved_until = NULL
             WHERE txid = ? AND vout = ?",
        )
        .bind(txid_str(&txid))
        .bind(vout as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_mint(row: &SqliteRow) -> DbResult<MintRecord> {
    Ok(MintRecord {
        btc_tx_id: parse_txid(&row.try_get::<String, _>("btc_tx_id")?)?,
        receiver: parse_address(&row.try_get::<String, _>("receiver")?)?,
        amount: Amount::from_sat(row.try_get::<i64, _>("amount")? as u64),
        mint_tx_hash: row
            .try_get::<Option<String>, _>("mint_tx_hash")?
            .map(|s| parse_b256(&s))
            .transpose()?,
    })
}

fn row_to_redeem(row: &SqliteRow) -> DbResult<RedeemRecord> {
    let outpoints = match row.try_get::<Option<Vec<u8>>, _>("outpoints")? {
        Some(blob) => decode_outpoints(&blob).map_err(|e| DbError::Corrupt(e.to_string()))?,
        None => Vec::new(),
    };

    let status = RedeemStatus::from_str(&row.try_get::<String, _>("status")?)
        .map_err(DbError::Corrupt)?;

    Ok(RedeemRecord {
        request_tx_hash: parse_b256(&row.try_get::<String, _>("request_tx_hash")?)?,
        prepare_tx_hash: row
            .try_get::<Option<String>, _>("prepare_tx_hash")?
            .map(|s| parse_b256(&s))
            .transpose()?,
        btc_tx_id: row
            .try_get::<Option<String>, _>("btc_tx_id")?
            .map(|s| parse_txid(&s))
            .transpose()?,
        requester: parse_address(&row.try_get::<String, _>("requester")?)?,
        receiver: row.try_get::<String, _>("receiver")?,
        amount: Amount::from_sat(row.try_get::<i64, _>("amount")? as u64),
        outpoints,
        status,
    })
}

#[async_trait]
impl StateDb for SqliteDb {
    async fn insert_mint(
        &self,
        btc_tx_id: Txid,
        receiver: Address,
        amount: Amount,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO mints (btc_tx_id, receiver, amount) VALUES (?, ?, ?)",
        )
        .bind(txid_str(&btc_tx_id))
        .bind(address_str(&receiver))
        .bind(amount.to_sat() as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn confirm_mint(
        &self,
        btc_tx_id: Txid,
        receiver: Address,
        amount: Amount,
        mint_tx_hash: B256,
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO mints (btc_tx_id, receiver, amount) VALUES (?, ?, ?)")
            .bind(txid_str(&btc_tx_id))
            .bind(address_str(&receiver))
            .bind(amount.to_sat() as i64)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE mints SET mint_tx_hash = ? WHERE btc_tx_id = ?")
            .bind(b256_str(&mint_tx_hash))
            .bind(txid_str(&btc_tx_id))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn pending_mints(&self) -> DbResult<Vec<MintRecord>> {
        let rows = sqlx::query("SELECT * FROM mints WHERE mint_tx_hash IS NULL")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_mint).collect()
    }

    async fn get_mint(&self, btc_tx_id: Txid) -> DbResult<Option<MintRecord>> {
        let row = sqlx::query("SELECT * FROM mints WHERE btc_tx_id = ?")
            .bind(txid_str(&btc_tx_id))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_mint).transpose()
    }

    async fn insert_redeem(&self, record: &RedeemRecord) -> DbResult<bool> {
        let outpoints = if record.outpoints.is_empty() {
            None
        } else {
            Some(encode_outpoints(&record.outpoints))
        };

        let result = sqlx::query(
            "INSERT OR IGNORE INTO redeems
             (request_tx_hash, prepare_tx_hash, btc_tx_id, requester, receiver, amount, outpoints, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(b256_str(&record.request_tx_hash))
        .bind(record.prepare_tx_hash.as_ref().map(b256_str))
        .bind(record.btc_tx_id.as_ref().map(txid_str))
        .bind(address_str(&record.requester))
        .bind(&record.receiver)
        .bind(record.amount.to_sat() as i64)
        .bind(outpoints)
        .bind(record.status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_redeem_prepared(
        &self,
        request_tx_hash: B256,
        prepare_tx_hash: B256,
        outpoints: &[RedeemOutpoint],
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE redeems SET status = 'prepared', prepare_tx_hash = ?, outpoints = ?
             WHERE request_tx_hash = ? AND status = 'requested'",
        )
        .bind(b256_str(&prepare_tx_hash))
        .bind(encode_outpoints(outpoints))
        .bind(b256_str(&request_tx_hash))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_redeem_completed(&self, request_tx_hash: B256, btc_tx_id: Txid) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE redeems SET status = 'completed', btc_tx_id = ?
             WHERE request_tx_hash = ? AND status = 'prepared'",
        )
        .bind(txid_str(&btc_tx_id))
        .bind(b256_str(&request_tx_hash))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn requested_redeems(&self) -> DbResult<Vec<RedeemRecord>> {
        let rows = sqlx::query("SELECT * FROM redeems WHERE status = 'requested'")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_redeem).collect()
    }

    async fn prepared_redeems(&self) -> DbResult<Vec<RedeemRecord>> {
        let rows = sqlx::query("SELECT * FROM redeems WHERE status = 'prepared'")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_redeem).collect()
    }

    async fn get_redeem(&self, request_tx_hash: B256) -> DbResult<Option<RedeemRecord>> {
        let row = sqlx::query("SELECT * FROM redeems WHERE request_tx_hash = ?")
            .bind(b256_str(&request_tx_hash))
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_redeem).transpose()
    }

    async fn finalized_block_number(&self, chain: &str) -> DbResult<Option<u64>> {
        let row = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(chain)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.try_get::<i64, _>("value"))
            .transpose()?
            .map(|v| v as u64))
    }

    async fn set_finalized_block_number(&self, chain: &str, number: u64) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        let stored: Option<i64> = sqlx::query("SELECT value FROM kv WHERE key = ?")
            .bind(chain)
            .fetch_optional(&mut *tx)
            .await?
            .map(|r| r.try_get::<i64, _>("value"))
            .transpose()?;

        if let Some(stored) = stored {
            if (number as i64) < stored {
                return Err(DbError::FinalizedBlockRegress {
                    chain: chain.to_string(),
                    stored: stored as u64,
                    new: number,
                });
            }
        }

        sqlx::query("INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)")
            .bind(chain)
            .bind(number as i64)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}

fn row_to_monitored(row: &SqliteRow) -> DbResult<MonitoredTx> {
    Ok(MonitoredTx {
        tx_hash: parse_b256(&row.try_get::<String, _>("tx_hash")?)?,
        domain_id: parse_b256(&row.try_get::<String, _>("domain_id")?)?,
        kind: TxKind::from_str(&row.try_get::<String, _>("kind")?).map_err(DbError::Corrupt)?,
        sent_after_block: row.try_get::<i64, _>("sent_after_block")? as u64,
        sent_after_hash: parse_b256(&row.try_get::<String, _>("sent_after_hash")?)?,
        signing_hash: parse_b256(&row.try_get::<String, _>("signing_hash")?)?,
        rx: parse_b256(&row.try_get::<String, _>("rx")?)?,
        s: parse_b256(&row.try_get::<String, _>("s")?)?,
        mined_at_hash: row
            .try_get::<Option<String>, _>("mined_at_hash")?
            .map(|s| parse_b256(&s))
            .transpose()?,
        status: MonitoredTxStatus::from_str(&row.try_get::<String, _>("status")?)
            .map_err(DbError::Corrupt)?,
    })
}

#[async_trait]
impl MonitoredTxDb for SqliteDb {
    async fn insert_monitored_tx(&self, tx: &MonitoredTx) -> DbResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO monitored_txs
             (tx_hash, domain_id, kind, sent_after_block, sent_after_hash, signing_hash, rx, s, mined_at_hash, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(b256_str(&tx.tx_hash))
        .bind(b256_str(&tx.domain_id))
        .bind(tx.kind.to_string())
        .bind(tx.sent_after_block as i64)
        .bind(b256_str(&tx.sent_after_hash))
        .bind(b256_str(&tx.signing_hash))
        .bind(b256_str(&tx.rx))
        .bind(b256_str(&tx.s))
        .bind(tx.mined_at_hash.as_ref().map(b256_str))
        .bind(tx.status.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn pending_monitored_txs(&self) -> DbResult<Vec<MonitoredTx>> {
        let rows = sqlx::query("SELECT * FROM monitored_txs WHERE status = 'pending'")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_monitored).collect()
    }

    async fn set_monitored_tx_status(
        &self,
        tx_hash: B256,
        status: MonitoredTxStatus,
        mined_at_hash: Option<B256>,
    ) -> DbResult<()> {
        sqlx::query("UPDATE monitored_txs SET status = ?, mined_at_hash = ? WHERE tx_hash = ?")
            .bind(status.to_string())
            .bind(mined_at_hash.as_ref().map(b256_str))
            .bind(b256_str(&tx_hash))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn get_monitored_tx_for(
        &self,
        domain_id: B256,
        kind: TxKind,
    ) -> DbResult<Option<MonitoredTx>> {
        let row = sqlx::query(
            "SELECT * FROM monitored_txs WHERE domain_id = ? AND kind = ? ORDER BY rowid DESC",
        )
        .bind(b256_str(&domain_id))
        .bind(kind.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_monitored).transpose()
    }

    async fn record_reissue(&self, old_tx_hash: B256, new_tx: &MonitoredTx) -> DbResult<()> {
        // the old row keeps its terminal status; just track the new submission
        let _ = old_tx_hash;
        self.insert_monitored_tx(new_tx).await
    }
}

#[async_trait]
impl ActionDb for SqliteDb {
    async fn insert_deposit_action(&self, action: &DepositActionRecord) -> DbResult<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO btc_action_deposit
             (tx_hash, block_number, block_hash, deposit_value, deposit_receiver,
              change_value, change_receiver, evm_id, evm_addr)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(txid_str(&action.tx_hash))
        .bind(action.block_number as i64)
        .bind(block_hash_str(&action.block_hash))
        .bind(action.deposit_value.to_sat() as i64)
        .bind(&action.deposit_receiver)
        .bind(action.change_value.map(|v| v.to_sat() as i64))
        .bind(action.change_receiver.as_deref())
        .bind(action.evm_id as i64)
        .bind(address_str(&action.evm_addr))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_redeem_action(&self, action: &RedeemActionRecord) -> DbResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO btc_action_redeem
             (eth_request_tx_id, btc_hash, block_number, block_hash, sent, mined)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(b256_str(&action.eth_request_tx_id))
        .bind(txid_str(&action.btc_hash))
        .bind(action.block_number.map(|n| n as i64))
        .bind(action.block_hash.as_ref().map(block_hash_str))
        .bind(action.sent)
        .bind(action.mined)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_redeem_action(
        &self,
        eth_request_tx_id: B256,
    ) -> DbResult<Option<RedeemActionRecord>> {
        let row = sqlx::query("SELECT * FROM btc_action_redeem WHERE eth_request_tx_id = ?")
            .bind(b256_str(&eth_request_tx_id))
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(RedeemActionRecord {
                eth_request_tx_id: parse_b256(&row.try_get::<String, _>("eth_request_tx_id")?)?,
                btc_hash: parse_txid(&row.try_get::<String, _>("btc_hash")?)?,
                block_number: row
                    .try_get::<Option<i64>, _>("block_number")?
                    .map(|n| n as u64),
                block_hash: row
                    .try_get::<Option<String>, _>("block_hash")?
                    .map(|s| parse_block_hash(&s))
                    .transpose()?,
                sent: row.try_get::<bool, _>("sent")?,
                mined: row.try_get::<bool, _>("mined")?,
            })
        })
        .transpose()
    }

    async fn mark_redeem_action_mined(
        &self,
        eth_request_tx_id: B256,
        block_number: u64,
        block_hash: BlockHash,
    ) -> DbResult<()> {
        sqlx::query(
            "UPDATE btc_action_redeem SET mined = 1, block_number = ?, block_hash = ?
             WHERE eth_request_tx_id = ?",
        )
        .bind(block_number as i64)
        .bind(block_hash_str(&block_hash))
        .bind(b256_str(&eth_request_tx_id))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
