//! Development beacon node.
//!
//! Runs a single-node network whose validators are all local. Configuration
//! comes from the devnet preset plus `QC_*` environment overrides; logging
//! follows `QC_LOG_LEVEL` or `RUST_LOG`.

use anyhow::Context;
use node_runtime::{NodeConfig, NodeRuntime, SlotClock};
use quantum_telemetry::{encode_metrics, init_telemetry, log_event, TelemetryConfig};
use tokio::runtime::Handle;
use tracing::debug;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("failed to initialise telemetry")?;

    let now = SlotClock::unix_now();
    let mut config = NodeConfig::devnet(now);
    config.apply_overrides(|key| std::env::var(key).ok());

    let mut node = NodeRuntime::new(config, Handle::current()).context("failed to build node")?;
    node.start(SlotClock::unix_now());
    log_event!(info, "node", "Node running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    node.shutdown().await;

    match encode_metrics() {
        Ok(metrics) => debug!(%metrics, "Final metrics"),
        Err(e) => log_event!(warn, "node", "Metrics unavailable", error = %e),
    }
    Ok(())
}
