use crate::core::config::Thresholds;
use crate::core::error::Anomaly;
use crate::models::state::StateRecord;
use crate::models::torrent::TorrentSnapshot;
use crate::utils::time::elapsed_minutes;
use std::fmt;

/// Why a torrent is being removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    PostCompletionAge,
    NoPeers,
    SustainedLowRate,
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            RemovalReason::PostCompletionAge => "post-completion age",
            RemovalReason::NoPeers => "no peers",
            RemovalReason::SustainedLowRate => "sustained low rate",
        };
        f.write_str(reason)
    }
}

/// Why a torrent was left alone this run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitReason {
    Ignored,
    /// The torrent could not be evaluated
    Anomaly(Anomaly),
    AwaitingPostCompletion {
        complete_minutes: f64,
        remaining_minutes: f64,
    },
    Stabilizing {
        elapsed_minutes: f64,
    },
    LowRateTimerRunning {
        low_minutes: f64,
        remaining_minutes: f64,
    },
    Healthy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    Wait(WaitReason),
    StartLowRateTimer,
    ClearLowRateTimer,
    Remove(RemovalReason),
}

/// Decision plus the record to persist for the torrent
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    pub record: StateRecord,
}

impl Evaluation {
    fn wait(reason: WaitReason, record: StateRecord) -> Self {
        Self {
            decision: Decision::Wait(reason),
            record,
        }
    }

    fn remove(reason: RemovalReason) -> Self {
        Self {
            decision: Decision::Remove(reason),
            record: StateRecord::default(),
        }
    }

    pub fn anomaly(&self) -> Option<Anomaly> {
        match self.decision {
            Decision::Wait(WaitReason::Anomaly(anomaly)) => Some(anomaly),
            _ => None,
        }
    }
}

/// Decides what to do with one torrent. Pure: no I/O, no clock reads.
///
/// Rules are checked in order and the first match wins:
/// ignored, completed, stabilizing, zero peers, low rate.
pub fn decide(
    snapshot: &TorrentSnapshot,
    record: StateRecord,
    now: i64,
    thresholds: &Thresholds,
    is_ignored: bool,
) -> Evaluation {
    if is_ignored {
        return Evaluation::wait(WaitReason::Ignored, record);
    }

    if snapshot.is_complete() {
        return decide_completed(snapshot, record, now, thresholds);
    }

    let Some(added_at) = snapshot.added_at else {
        return Evaluation::wait(WaitReason::Anomaly(Anomaly::MissingAddedTime), record);
    };

    let elapsed = elapsed_minutes(added_at, now);
    if elapsed < f64::from(thresholds.stabilization_delay) {
        return Evaluation::wait(
            WaitReason::Stabilizing {
                elapsed_minutes: elapsed,
            },
            record,
        );
    }

    if snapshot.connected_peers == 0 {
        return Evaluation::remove(RemovalReason::NoPeers);
    }

    decide_rate(snapshot, record, now, thresholds)
}

fn decide_completed(
    snapshot: &TorrentSnapshot,
    record: StateRecord,
    now: i64,
    thresholds: &Thresholds,
) -> Evaluation {
    let Some(completed_at) = snapshot.completed_at else {
        return Evaluation::wait(WaitReason::Anomaly(Anomaly::MissingCompletionTime), record);
    };

    let delay = f64::from(thresholds.post_completion_delay);
    let complete_minutes = elapsed_minutes(completed_at, now);

    if complete_minutes >= delay {
        Evaluation::remove(RemovalReason::PostCompletionAge)
    } else {
        Evaluation::wait(
            WaitReason::AwaitingPostCompletion {
                complete_minutes,
                remaining_minutes: delay - complete_minutes,
            },
            record,
        )
    }
}

fn decide_rate(
    snapshot: &TorrentSnapshot,
    record: StateRecord,
    now: i64,
    thresholds: &Thresholds,
) -> Evaluation {
    let is_low = snapshot.download_rate_kbps() < thresholds.min_download_rate;

    // A start later than now cannot be measured from; treat it as no timer
    let low_rate_start = record.low_rate_start.filter(|start| *start <= now);

    match (is_low, low_rate_start) {
        (true, None) => Evaluation {
            decision: Decision::StartLowRateTimer,
            record: StateRecord::with_low_rate_start(now),
        },
        (true, Some(start)) => {
            let duration = f64::from(thresholds.min_rate_duration);
            let low_minutes = elapsed_minutes(start, now);

            if low_minutes >= duration {
                Evaluation::remove(RemovalReason::SustainedLowRate)
            } else {
                Evaluation::wait(
                    WaitReason::LowRateTimerRunning {
                        low_minutes,
                        remaining_minutes: duration - low_minutes,
                    },
                    record,
                )
            }
        }
        (false, Some(_)) => Evaluation {
            decision: Decision::ClearLowRateTimer,
            record: StateRecord::default(),
        },
        (false, None) => Evaluation::wait(WaitReason::Healthy, record),
    }
}
