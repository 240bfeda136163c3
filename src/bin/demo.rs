//! tabsync demo
//!
//! Opens several replicas of one stylesheet on a shared hub, each driven by
//! its own task, and edits them in turn until they converge.
//!
//! Environment variables:
//! - TABSYNC_TABS: number of replicas (default 3)
//! - TABSYNC_DIR: persist into this directory instead of a session store
//! - TABSYNC_LOG_LEVEL: tracing filter (default "info,tabsync=debug")

use std::time::Duration;

use tabsync::prelude::*;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

const EDITS: [&str; 3] = [
    "body { color: red; }",
    "body { color: blue; }",
    "body { color: blue; background: #111; }",
];

struct Tab {
    replica: std::sync::Arc<PersistentReplica>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

fn spawn_tab(config: &SyncConfig, hub: &BroadcastHub, index: usize) -> Tab {
    let mut coordinator = SyncCoordinator::open(config, hub);
    let replica = coordinator.replica();
    let (stop, stopped) = oneshot::channel::<()>();

    tracing::info!(
        tab = index,
        origin = ?coordinator.replica_id(),
        value = %replica.get(),
        "tab opened"
    );
    let task = tokio::spawn(async move {
        coordinator
            .run(async {
                let _ = stopped.await;
            })
            .await;
    });

    Tab { replica, stop, task }
}

fn config_from_env() -> Result<SyncConfig, SyncError> {
    let builder = SyncConfigBuilder::new();
    match std::env::var("TABSYNC_DIR") {
        Ok(dir) => builder.durable_scope(dir).build(),
        Err(_) => builder.build(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = std::env::var("TABSYNC_LOG_LEVEL").unwrap_or_else(|_| "info,tabsync=debug".into());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let tabs: usize = std::env::var("TABSYNC_TABS")
        .ok()
        .and_then(|n| n.parse().ok())
        .unwrap_or(3)
        .max(1);

    let config = config_from_env()?;
    let hub = BroadcastHub::new();

    let mut open: Vec<Tab> = (0..tabs).map(|i| spawn_tab(&config, &hub, i)).collect();

    for (i, css) in EDITS.iter().enumerate() {
        let editor = i % open.len();
        tracing::info!(tab = editor, css, "editing");
        open[editor].replica.set(*css);
        tokio::time::sleep(Duration::from_millis(50)).await;

        for (j, tab) in open.iter().enumerate() {
            tracing::info!(tab = j, value = %tab.replica.get(), "observed");
        }
    }

    // A tab opened after the edits catches up through a sync request
    let late = spawn_tab(&config, &hub, open.len());
    tokio::time::sleep(Duration::from_millis(50)).await;
    tracing::info!(tab = open.len(), value = %late.replica.get(), "late tab caught up");
    open.push(late);

    for tab in open {
        let _ = tab.stop.send(());
        tab.task.await?;
    }
    tracing::info!(subscribers = hub.subscriber_count(&config.channel), "all tabs closed");
    Ok(())
}
