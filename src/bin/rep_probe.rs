//! rep-probe: print each rep's total resources.
//!
//! Usage: rep-probe <rep-guid>...
//!
//! Configuration comes from rep-rpc.yaml, REP_RPC_CONFIG, and REP_RPC__*
//! environment variables.

use futures::future::join_all;
use rep_rpc::utils::bootstrap::init_tracing;
use rep_rpc::{ClientConfig, RepClient, TargetId};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing()?;

    let reps: Vec<TargetId> = std::env::args().skip(1).map(TargetId::from).collect();
    if reps.is_empty() {
        return Err("usage: rep-probe <rep-guid>...".into());
    }

    let config = ClientConfig::load(None)?;
    let client = RepClient::connect(&config).await?;

    let replies = join_all(reps.iter().map(|rep| client.total_resources(rep))).await;

    let mut failed = 0;
    for (rep, reply) in reps.iter().zip(replies) {
        match reply {
            Ok(resources) => info!(
                rep = %rep,
                memory_mb = resources.memory_mb,
                disk_mb = resources.disk_mb,
                containers = resources.containers,
                "Total resources"
            ),
            Err(e) => {
                failed += 1;
                error!(rep = %rep, error = %e, "Probe failed");
            }
        }
    }

    if failed > 0 {
        return Err(format!("{} of {} reps failed", failed, reps.len()).into());
    }
    Ok(())
}
