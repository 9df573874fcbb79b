use std::collections::BTreeMap;

use alloy_primitives::B256;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    errors::DbResult,
    monitored::{MonitoredTx, MonitoredTxDb, MonitoredTxStatus, TxKind},
};

#[derive(Debug, Default)]
pub struct MemoryTracker {
    /// Insertion-ordered by an internal sequence so "most recent for a
    /// domain id" is well-defined.
    txs: RwLock<(u64, BTreeMap<u64, MonitoredTx>)>,
}

#[async_trait]
impl MonitoredTxDb for MemoryTracker {
    async fn insert_monitored_tx(&self, tx: &MonitoredTx) -> DbResult<()> {
        let mut guard = self.txs.write().await;
        let seq = guard.0;
        guard.0 += 1;
        guard.1.insert(seq, tx.clone());
        Ok(())
    }

    async fn pending_monitored_txs(&self) -> DbResult<Vec<MonitoredTx>> {
        Ok(self
            .txs
            .read()
            .await
            .1
            .values()
            .filter(|tx| tx.status == MonitoredTxStatus::Pending)
            .cloned()
            .collect())
    }

    async fn set_monitored_tx_status(
        &self,
        tx_hash: B256,
        status: MonitoredTxStatus,
        mined_at_hash: Option<B256>,
    ) -> DbResult<()> {
        let mut guard = self.txs.write().await;

        for tx in guard.1.values_mut() {
            if tx.tx_hash == tx_hash {
                tx.status = status;
                tx.mined_at_hash = mined_at_hash;
            }
        }

        Ok(())
    }

    async fn get_monitored_tx_for(
        &self,
        domain_id: B256,
        kind: TxKind,
    ) -> DbResult<Option<MonitoredTx>> {
        Ok(self
            .txs
            .read()
            .await
            .1
            .values()
            .rev()
            .find(|tx| tx.domain_id == domain_id && tx.kind == kind)
            .cloned())
    }

    async fn record_reissue(&self, old_tx_hash: B256, new_tx: &MonitoredTx) -> DbResult<()> {
        {
            let mut guard = self.txs.write().await;
            let seq = guard.0;
            guard.0 += 1;
            guard.1.insert(seq, new_tx.clone());
        }

        // the superseded row keeps whatever terminal status the monitor gave it
        let _ = old_tx_hash;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitored(tx_hash: B256, domain_id: B256, status: MonitoredTxStatus) -> MonitoredTx {
        MonitoredTx {
            tx_hash,
            domain_id,
            kind: TxKind::Mint,
            sent_after_block: 100,
            sent_after_hash: B256::repeat_byte(1),
            signing_hash: B256::repeat_byte(2),
            rx: B256::repeat_byte(3),
            s: B256::repeat_byte(4),
            mined_at_hash: None,
            status,
        }
    }

    #[tokio::test]
    async fn pending_filter_and_status_update() {
        let db = MemoryTracker::default();
        let tx = monitored(B256::repeat_byte(9), B256::repeat_byte(5), MonitoredTxStatus::Pending);

        db.insert_monitored_tx(&tx).await.unwrap();
        assert_eq!(db.pending_monitored_txs().await.unwrap().len(), 1);

        db.set_monitored_tx_status(
            tx.tx_hash,
            MonitoredTxStatus::Success,
            Some(B256::repeat_byte(6)),
        )
        .await
        .unwrap();

        assert!(db.pending_monitored_txs().await.unwrap().is_empty());
        let stored = db
            .get_monitored_tx_for(tx.domain_id, TxKind::Mint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, MonitoredTxStatus::Success);
        assert_eq!(stored.mined_at_hash, Some(B256::repeat_byte(6)));
    }

    #[tokio::test]
    async fn reissue_returns_latest_submission() {
        let db = MemoryTracker::default();
        let domain = B256::repeat_byte(5);

        let first = monitored(B256::repeat_byte(1), domain, MonitoredTxStatus::Timeout);
        db.insert_monitored_tx(&first).await.unwrap();

        let second = monitored(B256::repeat_byte(2), domain, MonitoredTxStatus::Pending);
        db.record_reissue(first.tx_hash, &second).await.unwrap();

        let latest = db
            .get_monitored_tx_for(domain, TxKind::Mint)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.tx_hash, second.tx_hash);

        // the reissued signature must be the stored one
        assert_eq!(latest.rx, first.rx);
        assert_eq!(latest.s, first.s);
    }
}
