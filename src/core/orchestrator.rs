use tracing::{debug, error, info};

use crate::api::client::TorrentClient;
use crate::core::config::Thresholds;
use crate::core::error::{RunError, TorrentError};
use crate::engine::decision::{decide, Decision, RemovalReason, WaitReason};
use crate::models::torrent::TorrentSnapshot;
use crate::stores::state_store::{StateStore, StateTable};
use crate::utils::time::elapsed_minutes;

/// What happened to one torrent during a run
#[derive(Debug)]
pub enum Action {
    Ignored,
    Waited(WaitReason),
    TimerStarted,
    TimerCleared,
    Removed(RemovalReason),
    Failed(TorrentError),
}

#[derive(Debug)]
pub struct TorrentOutcome {
    pub id: u32,
    pub name: String,
    pub action: Action,
}

/// Per-torrent outcomes of a run, in snapshot order
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<TorrentOutcome>,
}

impl RunReport {
    fn count(&self, predicate: impl Fn(&Action) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.action)).count()
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn removed(&self) -> usize {
        self.count(|a| matches!(a, Action::Removed(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|a| matches!(a, Action::Failed(_)))
    }

    pub fn timers_started(&self) -> usize {
        self.count(|a| matches!(a, Action::TimerStarted))
    }

    pub fn timers_cleared(&self) -> usize {
        self.count(|a| matches!(a, Action::TimerCleared))
    }

    pub fn ignored(&self) -> usize {
        self.count(|a| matches!(a, Action::Ignored))
    }

    pub fn waiting(&self) -> usize {
        self.count(|a| matches!(a, Action::Waited(_)))
    }

    #[cfg(test)]
    pub fn outcome(&self, id: u32) -> Option<&TorrentOutcome> {
        self.outcomes.iter().find(|o| o.id == id)
    }

    pub fn log_summary(&self) {
        info!(
            torrents = self.total(),
            removed = self.removed(),
            failed = self.failed(),
            timers_started = self.timers_started(),
            timers_cleared = self.timers_cleared(),
            ignored = self.ignored(),
            waiting = self.waiting(),
            "Run complete"
        );
    }
}

/// Fetch torrents, evaluate them against the persisted state and save it once.
///
/// Only a failure to list torrents or to load/save the state store aborts
/// the run. Rows for torrents the client no longer reports are kept as is.
pub async fn run_once<C, S>(
    client: &C,
    store: &S,
    thresholds: &Thresholds,
    now: i64,
) -> Result<RunReport, RunError>
where
    C: TorrentClient,
    S: StateStore,
{
    let snapshots = client.list_torrents().await.map_err(RunError::Connection)?;

    if snapshots.is_empty() {
        info!("No torrents found, nothing to do");
    }

    let mut table = store.load()?;
    debug!(rows = table.len(), "State loaded");

    let report = run(&snapshots, &mut table, now, thresholds, client).await;

    store.save(&table)?;

    Ok(report)
}

/// Evaluate every snapshot in order, applying decisions to `table` and the client
pub async fn run<C: TorrentClient>(
    snapshots: &[TorrentSnapshot],
    table: &mut StateTable,
    now: i64,
    thresholds: &Thresholds,
    client: &C,
) -> RunReport {
    let mut report = RunReport::default();

    for snapshot in snapshots {
        let action = process_torrent(snapshot, table, now, thresholds, client).await;
        report.outcomes.push(TorrentOutcome {
            id: snapshot.id,
            name: snapshot.name.clone(),
            action,
        });
    }

    report
}

async fn process_torrent<C: TorrentClient>(
    snapshot: &TorrentSnapshot,
    table: &mut StateTable,
    now: i64,
    thresholds: &Thresholds,
    client: &C,
) -> Action {
    let id = snapshot.id;
    let name = snapshot.name.as_str();

    let is_ignored = snapshot.has_any_label(&thresholds.ignore_labels);
    if is_ignored {
        info!(
            torrent_id = id,
            name,
            labels = ?snapshot.matching_labels(&thresholds.ignore_labels),
            "Torrent has ignore label(s); ignoring"
        );
    } else {
        log_snapshot(snapshot, now);
    }

    let evaluation = decide(snapshot, table.get(id), now, thresholds, is_ignored);

    match evaluation.decision {
        Decision::Wait(WaitReason::Ignored) => Action::Ignored,
        Decision::Wait(WaitReason::Anomaly(anomaly)) => {
            error!(torrent_id = id, name, error = %anomaly, "Cannot evaluate torrent; skipping");
            Action::Failed(TorrentError::Anomaly(anomaly))
        }
        Decision::Wait(reason) => {
            log_wait(snapshot, &reason, thresholds);
            Action::Waited(reason)
        }
        Decision::StartLowRateTimer => {
            info!(
                torrent_id = id,
                name,
                rate_kbps = snapshot.download_rate_kbps(),
                min_rate_kbps = thresholds.min_download_rate,
                "Download rate below threshold; starting low-rate timer"
            );
            table.put(id, evaluation.record);
            Action::TimerStarted
        }
        Decision::ClearLowRateTimer => {
            info!(
                torrent_id = id,
                name,
                rate_kbps = snapshot.download_rate_kbps(),
                "Download rate recovered; clearing low-rate timer"
            );
            table.put(id, evaluation.record);
            Action::TimerCleared
        }
        Decision::Remove(reason) => {
            info!(torrent_id = id, name, reason = %reason, "Removing torrent");

            match remove(snapshot, client).await {
                Ok(()) => {
                    table.remove(id);
                    info!(torrent_id = id, name, "Torrent removed successfully");
                    Action::Removed(reason)
                }
                Err(e) => {
                    error!(torrent_id = id, name, error = %e, "Error removing torrent");
                    Action::Failed(e)
                }
            }
        }
    }
}

async fn remove<C: TorrentClient>(snapshot: &TorrentSnapshot, client: &C) -> Result<(), TorrentError> {
    let key = snapshot
        .removal_key
        .as_deref()
        .ok_or(TorrentError::MissingRemovalKey)?;

    client
        .remove_torrent(key, false)
        .await
        .map_err(TorrentError::Removal)
}

fn log_snapshot(snapshot: &TorrentSnapshot, now: i64) {
    info!(
        torrent_id = snapshot.id,
        name = %snapshot.name,
        added_at = ?snapshot.added_at,
        completed_at = ?snapshot.completed_at,
        elapsed_minutes = snapshot.added_at.map(|added| elapsed_minutes(added, now)),
        percent_done = snapshot.completion_fraction * 100.0,
        rate_kbps = snapshot.download_rate_kbps(),
        peers = snapshot.connected_peers,
        "Torrent status"
    );
}

fn log_wait(snapshot: &TorrentSnapshot, reason: &WaitReason, thresholds: &Thresholds) {
    let id = snapshot.id;
    let name = snapshot.name.as_str();

    match *reason {
        WaitReason::AwaitingPostCompletion {
            complete_minutes,
            remaining_minutes,
        } => info!(
            torrent_id = id,
            name,
            complete_minutes,
            remaining_minutes,
            threshold_minutes = thresholds.post_completion_delay,
            "Torrent is complete; waiting before removal"
        ),
        WaitReason::Stabilizing { elapsed_minutes } => info!(
            torrent_id = id,
            name,
            elapsed_minutes,
            threshold_minutes = thresholds.stabilization_delay,
            "Torrent is within stabilization delay; waiting"
        ),
        WaitReason::LowRateTimerRunning {
            low_minutes,
            remaining_minutes,
        } => info!(
            torrent_id = id,
            name,
            low_minutes,
            remaining_minutes,
            "Torrent below rate threshold; waiting"
        ),
        WaitReason::Healthy => debug!(torrent_id = id, name, "Torrent is healthy"),
        WaitReason::Ignored | WaitReason::Anomaly(_) => {}
    }
}
