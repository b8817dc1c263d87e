//! Periodic assemble → commit loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::{MeridianNode, ShutdownController};

/// Spawn the pipeline task. It runs one [`MeridianNode::run_cycle`] per
/// `pipeline_interval_ms` tick and exits on the shutdown broadcast.
///
/// A failed cycle is logged and the loop carries on; the failing
/// sub-block's transactions are already back in the pool.
pub fn spawn_pipeline(node: Arc<MeridianNode>, shutdown: &ShutdownController) -> JoinHandle<()> {
    let mut shutdown_rx = shutdown.subscribe();
    let period = Duration::from_millis(node.config().pipeline_interval_ms);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut committed: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!(committed, "pipeline task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match node.run_cycle() {
                        Ok(Some(receipt)) => {
                            committed += 1;
                            tracing::debug!(
                                sub_block = %receipt.sub_block.id(),
                                height = receipt.height,
                                "pipeline cycle committed"
                            );
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(code = %e.code(), error = %e, "pipeline cycle failed");
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenesisValidator, NodeConfig};
    use meridian_types::{Timestamp, Transaction, TxId, TxStatus};

    fn node() -> Arc<MeridianNode> {
        let config = NodeConfig {
            enforce_balances: false,
            pipeline_interval_ms: 10,
            default_batch_size: 2,
            validators: vec![GenesisValidator {
                id: "v1".into(),
                stake: 10,
                participation: 1.0,
            }],
            ..NodeConfig::default()
        };
        Arc::new(MeridianNode::in_memory(config).unwrap())
    }

    #[tokio::test]
    async fn loop_drains_pool_and_stops_on_shutdown() {
        let node = node();
        for i in 1..=5u64 {
            node.submit_transaction(Transaction::new(
                format!("t{i}"),
                "alice",
                "bob",
                1,
                i,
                Timestamp::from_millis(1),
            ))
            .unwrap();
        }

        let shutdown = ShutdownController::new();
        let handle = spawn_pipeline(node.clone(), &shutdown);

        for _ in 0..200 {
            if node.pool_size() == 0 && node.ledger_height().unwrap() == 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.shutdown();
        handle.await.unwrap();

        assert_eq!(node.pool_size(), 0);
        assert_eq!(node.ledger_height().unwrap(), 3);
        assert_eq!(
            node.transaction_status(&TxId::new("t5")).unwrap(),
            Some(TxStatus::Committed)
        );
    }

    #[tokio::test]
    async fn idle_loop_exits_promptly() {
        let node = node();
        let shutdown = ShutdownController::new();
        let handle = spawn_pipeline(node, &shutdown);
        shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("pipeline should stop")
            .unwrap();
    }
}
