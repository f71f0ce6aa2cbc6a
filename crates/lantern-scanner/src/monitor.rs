//! Progress, throughput and error statistics derived from pool counters.

use crate::cluster::PoolSnapshot;
use serde::Serialize;
use std::time::Duration;

/// `time_remaining` value when no estimate is possible yet.
pub const UNKNOWN_TIME_REMAINING: i64 = -1;

/// Overall state of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    /// Jobs are queued or running
    Working,
    /// Every submitted job has finished
    Completed,
}

/// Human-facing progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStats {
    pub status: ScanStatus,
    /// Milliseconds since the pool started
    pub time_running: u64,
    pub done_targets: u64,
    pub all_targets: u64,
    /// Done share as a whole percentage, e.g. `"42"`
    pub done_perc_str: String,
    /// Errors per done target as a percentage, e.g. `"3.50"`
    pub error_perc: String,
    /// Estimated milliseconds until completion, or [`UNKNOWN_TIME_REMAINING`]
    pub time_remaining: i64,
    pub pages_per_second: String,
    pub cpu_usage: String,
    pub memory_usage: String,
    pub workers: u64,
}

impl WorkerStats {
    /// Compute statistics from pool counters and the time the pool has been
    /// running.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn compute(snapshot: &PoolSnapshot, elapsed: Duration) -> Self {
        let all_targets = snapshot.all_target_count;
        let done_targets = all_targets
            .saturating_sub(snapshot.queue_size)
            .saturating_sub(snapshot.workers_busy);
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

        let done_percentage = if all_targets == 0 {
            1.0
        } else {
            done_targets as f64 / all_targets as f64
        };

        let error_perc = if done_targets == 0 {
            "0.00".to_string()
        } else {
            to_fixed(100.0 * snapshot.error_count as f64 / done_targets as f64, 2)
        };

        let time_remaining = if done_percentage == 0.0 {
            UNKNOWN_TIME_REMAINING
        } else {
            let elapsed = elapsed_ms as f64;
            (elapsed / done_percentage - elapsed).round() as i64
        };

        let pages_per_second = if done_targets == 0 {
            "0".to_string()
        } else {
            to_fixed(done_targets as f64 * 1000.0 / elapsed_ms.max(1) as f64, 2)
        };

        Self {
            status: if done_targets == all_targets {
                ScanStatus::Completed
            } else {
                ScanStatus::Working
            },
            time_running: elapsed_ms,
            done_targets,
            all_targets,
            done_perc_str: to_fixed(100.0 * done_percentage, 0),
            error_perc,
            time_remaining,
            pages_per_second,
            cpu_usage: format!("{}%", to_fixed(snapshot.cpu_usage, 1)),
            memory_usage: format!("{}%", to_fixed(snapshot.memory_usage, 1)),
            workers: snapshot.workers + snapshot.workers_starting,
        }
    }
}

/// Format with `digits` decimals, rounding halves away from zero.
fn to_fixed(value: f64, digits: i32) -> String {
    let scale = 10_f64.powi(digits);
    let precision = usize::try_from(digits).unwrap_or_default();
    format!("{:.*}", precision, (value * scale).round() / scale)
}
