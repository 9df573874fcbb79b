use std::collections::BTreeMap;

use alloy_primitives::B256;
use async_trait::async_trait;
use bitcoin::{hashes::Hash, Amount, Txid};
use tokio::sync::RwLock;
use wbtc_bridge_primitives::actions::ObservedUtxo;

use crate::{
    errors::{DbError, DbResult},
    vault::{select_smallest_first, Utxo, UtxoState, VaultDb},
};

/// Keyed by `(txid bytes, vout)` so iteration order is stable.
type VaultKey = ([u8; 32], u32);

#[derive(Debug, Default)]
pub struct MemoryVault {
    utxos: RwLock<BTreeMap<VaultKey, Utxo>>,
}

fn key(txid: Txid, vout: u32) -> VaultKey {
    (txid.to_byte_array(), vout)
}

#[async_trait]
impl VaultDb for MemoryVault {
    async fn add_utxo(&self, observed: &ObservedUtxo) -> DbResult<bool> {
        let mut utxos = self.utxos.write().await;
        let k = key(observed.txid, observed.vout);

        if utxos.contains_key(&k) {
            return Ok(false);
        }

        utxos.insert(
            k,
            Utxo {
                txid: observed.txid,
                vout: observed.vout,
                amount: observed.amount,
                pk_script: observed.pk_script.clone(),
                kind: observed.kind,
                block_height: observed.block_height,
                block_hash: observed.block_hash,
                state: UtxoState::Available,
            },
        );

        Ok(true)
    }

    async fn reserve_utxos(
        &self,
        request_tx_hash: B256,
        amount: Amount,
        fee: Amount,
        reserved_until: i64,
    ) -> DbResult<Vec<Utxo>> {
        let mut utxos = self.utxos.write().await;

        let candidates = utxos
            .values()
            .filter(|u| u.state == UtxoState::Available)
            .cloned()
            .collect::<Vec<_>>();

        let target = amount + fee;
        let mut picked = select_smallest_first(candidates, target).map_err(|available| {
            DbError::InsufficientFunds {
                available,
                required: target.to_sat(),
            }
        })?;

        for utxo in picked.iter_mut() {
            utxo.state = UtxoState::Reserved {
                request_tx_hash,
                reserved_until,
            };
            utxos.insert(key(utxo.txid, utxo.vout), utxo.clone());
        }

        Ok(picked)
    }

    async fn release_reservation(&self, request_tx_hash: B256) -> DbResult<u64> {
        let mut utxos = self.utxos.write().await;

        let mut released = 0;
        for utxo in utxos.values_mut() {
            if matches!(utxo.state, UtxoState::Reserved { request_tx_hash: r, .. } if r == request_tx_hash)
            {
                utxo.state = UtxoState::Available;
                released += 1;
            }
        }

        Ok(released)
    }

    async fn release_expired(&self, now: i64) -> DbResult<u64> {
        let mut utxos = self.utxos.write().await;

        let mut released = 0;
        for utxo in utxos.values_mut() {
            if matches!(utxo.state, UtxoState::Reserved { reserved_until, .. } if reserved_until <= now)
            {
                utxo.state = UtxoState::Available;
                released += 1;
            }
        }

        Ok(released)
    }

    async fn reserved_for(&self, request_tx_hash: B256) -> DbResult<Vec<Utxo>> {
        let utxos = self.utxos.read().await;

        let mut reserved = utxos
            .values()
            .filter(|u| {
                matches!(u.state, UtxoState::Reserved { request_tx_hash: r, .. } if r == request_tx_hash)
            })
            .cloned()
            .collect::<Vec<_>>();
        reserved.sort_by_key(crate::vault::selection_key);

        Ok(reserved)
    }

    async fn get_utxo(&self, txid: Txid, vout: u32) -> DbResult<Option<Utxo>> {
        Ok(self.utxos.read().await.get(&key(txid, vout)).cloned())
    }

    async fn mark_spent(&self, txid: Txid, vout: u32) -> DbResult<()> {
        let mut utxos = self.utxos.write().await;

        if let Some(utxo) = utxos.get_mut(&key(txid, vout)) {
            utxo.state = UtxoState::Spent;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bitcoin::{BlockHash, ScriptBuf};
    use wbtc_bridge_primitives::scripts::ScriptKind;

    use super::*;

    fn observed(txid_byte: u8, vout: u32, amount: u64, height: u64) -> ObservedUtxo {
        ObservedUtxo {
            block_height: height,
            block_hash: BlockHash::from_byte_array([0u8; 32]),
            txid: Txid::from_byte_array([txid_byte; 32]),
            vout,
            amount: Amount::from_sat(amount),
            pk_script: ScriptBuf::new(),
            kind: ScriptKind::P2wpkh,
        }
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let vault = MemoryVault::default();
        let utxo = observed(1, 0, 1_000, 100);

        assert!(vault.add_utxo(&utxo).await.unwrap());
        assert!(!vault.add_utxo(&utxo).await.unwrap());
    }

    #[tokio::test]
    async fn reserve_picks_smallest_first_deterministically() {
        let vault = MemoryVault::default();
        vault.add_utxo(&observed(1, 0, 5_000, 100)).await.unwrap();
        vault.add_utxo(&observed(2, 0, 1_000, 100)).await.unwrap();
        vault.add_utxo(&observed(3, 0, 2_000, 100)).await.unwrap();

        let picked = vault
            .reserve_utxos(B256::repeat_byte(9), Amount::from_sat(2_500), Amount::from_sat(100), 0)
            .await
            .unwrap();

        let amounts: Vec<u64> = picked.iter().map(|u| u.amount.to_sat()).collect();
        assert_eq!(amounts, vec![1_000, 2_000]);

        // the picked outputs are no longer available
        let err = vault
            .reserve_utxos(B256::repeat_byte(8), Amount::from_sat(5_500), Amount::ZERO, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InsufficientFunds { available: 5_000, .. }));
    }

    #[tokio::test]
    async fn insufficient_funds_reserves_nothing() {
        let vault = MemoryVault::default();
        vault.add_utxo(&observed(1, 0, 1_000, 100)).await.unwrap();
        vault.add_utxo(&observed(2, 0, 1_000, 101)).await.unwrap();

        let err = vault
            .reserve_utxos(B256::repeat_byte(9), Amount::from_sat(5_000), Amount::from_sat(1_000), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InsufficientFunds { available: 2_000, required: 6_000 }));

        let utxo = vault
            .get_utxo(Txid::from_byte_array([1u8; 32]), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(utxo.state, UtxoState::Available);
    }

    #[tokio::test]
    async fn release_and_expiry_return_reservations() {
        let vault = MemoryVault::default();
        vault.add_utxo(&observed(1, 0, 1_000, 100)).await.unwrap();
        vault.add_utxo(&observed(2, 0, 1_000, 100)).await.unwrap();

        let request = B256::repeat_byte(7);
        vault
            .reserve_utxos(request, Amount::from_sat(1_500), Amount::ZERO, 50)
            .await
            .unwrap();

        assert_eq!(vault.release_expired(49).await.unwrap(), 0);
        assert_eq!(vault.release_expired(50).await.unwrap(), 2);
        assert_eq!(vault.release_reservation(request).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_spent_is_terminal() {
        let vault = MemoryVault::default();
        vault.add_utxo(&observed(1, 0, 1_000, 100)).await.unwrap();

        let txid = Txid::from_byte_array([1u8; 32]);
        vault.mark_spent(txid, 0).await.unwrap();

        let utxo = vault.get_utxo(txid, 0).await.unwrap().unwrap();
        assert_eq!(utxo.state, UtxoState::Spent);

        let err = vault
            .reserve_utxos(B256::repeat_byte(9), Amount::from_sat(500), Amount::ZERO, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InsufficientFunds { .. }));
    }
}
