use crate::ApiClient;
use collab_core::{Agent, Task};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// One successfully refreshed feed. `cycle` is monotonic across the poller's
/// lifetime; consumers use it to discard responses that arrive after a newer
/// cycle has already been applied.
#[derive(Debug, Clone)]
pub enum PollEvent {
    Agents { cycle: u64, agents: Vec<Agent> },
    Tasks { cycle: u64, tasks: Vec<Task> },
}

impl PollEvent {
    pub fn cycle(&self) -> u64 {
        match self {
            PollEvent::Agents { cycle, .. } | PollEvent::Tasks { cycle, .. } => *cycle,
        }
    }
}

/// Start the refresh loop: one cycle immediately, then one per interval, plus
/// an extra cycle whenever `refresh` is notified.
///
/// Each cycle fires the two endpoint fetches as separate tasks, so a slow or
/// failing endpoint never delays or cancels the other. Failures are logged
/// and produce no event; the previous view state stays on screen. The loop
/// exits once the receiving side of `tx` is gone, so polling never outlives
/// the console.
pub fn spawn_poller(
    client: ApiClient,
    interval: Duration,
    refresh: Arc<Notify>,
    tx: mpsc::Sender<PollEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycle: u64 = 0;
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = refresh.notified() => {
                    ticker.reset();
                }
                _ = tx.closed() => {
                    break;
                }
            }
            if tx.is_closed() {
                break;
            }
            cycle += 1;
            debug!(event = "poll_cycle_start", cycle);

            let agents_client = client.clone();
            let agents_tx = tx.clone();
            tokio::spawn(async move {
                match agents_client.fetch_agents().await {
                    Ok(agents) => {
                        let _ = agents_tx.send(PollEvent::Agents { cycle, agents }).await;
                    }
                    Err(err) => {
                        warn!(event = "poll_fetch_failed", endpoint = "agents", cycle, error = %err);
                    }
                }
            });

            let tasks_client = client.clone();
            let tasks_tx = tx.clone();
            tokio::spawn(async move {
                match tasks_client.fetch_tasks().await {
                    Ok(tasks) => {
                        let _ = tasks_tx.send(PollEvent::Tasks { cycle, tasks }).await;
                    }
                    Err(err) => {
                        warn!(event = "poll_fetch_failed", endpoint = "tasks", cycle, error = %err);
                    }
                }
            });
        }
        debug!(event = "poll_loop_stopped", last_cycle = cycle);
    })
}
