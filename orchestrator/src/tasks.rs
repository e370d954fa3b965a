//! Background work scoped to a single turn.
//!
//! Each task owns its own `CancellationToken`; nothing here is process-wide.
//! Both tasks are joined (or aborted after a grace period) before the turn ends.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::best_effort;
use crate::robot::RobotRef;

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const DONE: u8 = 2;

/// Interval between idle antenna moves
pub const IDLE_MOTION_PERIOD: Duration = Duration::from_millis(400);
/// How long `IdleMotion::stop` waits before aborting the task
pub const IDLE_MOTION_GRACE: Duration = Duration::from_millis(300);

const IDLE_SWAY: [(f64, f64); 4] = [(0.15, -0.15), (0.0, 0.0), (-0.15, 0.15), (0.0, 0.0)];

/// Fires the robot's thinking indicator once if inference outlasts `threshold`.
///
/// Whichever of the watcher and [`SlowResponseWatcher::finish`] claims the
/// pending state first wins, so the indicator never fires after the call
/// returned and never fires twice.
pub struct SlowResponseWatcher {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SlowResponseWatcher {
    pub fn spawn(robot: RobotRef, threshold: Duration) -> Self {
        let state = Arc::new(AtomicU8::new(PENDING));
        let cancel = CancellationToken::new();

        let handle = tokio::spawn({
            let state = state.clone();
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(threshold) => {}
                }
                if state
                    .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    debug!(threshold_ms = threshold.as_millis() as u64, "Slow response, showing thinking pose");
                    best_effort("thinking_pose", robot.thinking_pose().await);
                }
            }
        });

        Self {
            state,
            cancel,
            handle,
        }
    }

    /// Call as soon as inference returns. Waits for an in-progress indicator
    /// to complete and reports whether it fired.
    pub async fn finish(mut self) -> bool {
        let fired = self
            .state
            .compare_exchange(PENDING, DONE, Ordering::AcqRel, Ordering::Acquire)
            .is_err();
        self.cancel.cancel();
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "Slow-response watcher task failed");
        }
        fired
    }
}

impl Drop for SlowResponseWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

/// Small antenna sway while the robot speaks. Head pose is never touched.
pub struct IdleMotion {
    cancel: CancellationToken,
    moves: Arc<AtomicU32>,
    handle: JoinHandle<()>,
}

impl IdleMotion {
    pub fn start(robot: RobotRef, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let moves = Arc::new(AtomicU32::new(0));

        let handle = tokio::spawn({
            let cancel = cancel.clone();
            let moves = moves.clone();
            async move {
                for (left, right) in IDLE_SWAY.iter().cycle() {
                    // Checked before every command so nothing is issued after stop
                    if cancel.is_cancelled() {
                        break;
                    }
                    best_effort("idle_antennas", robot.set_antennas(*left, *right, period).await);
                    moves.fetch_add(1, Ordering::Relaxed);

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(period) => {}
                    }
                }
            }
        });

        Self {
            cancel,
            moves,
            handle,
        }
    }

    /// Signal stop and wait up to `grace` for the task to exit; abort it otherwise.
    /// Returns the number of antenna commands issued.
    pub async fn stop(mut self, grace: Duration) -> u32 {
        self.cancel.cancel();
        match tokio::time::timeout(grace, &mut self.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Idle-motion task failed"),
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Idle motion did not stop in time, aborting");
                self.handle.abort();
                let _ = (&mut self.handle).await;
            }
        }
        self.moves.load(Ordering::Relaxed)
    }
}

// A turn abandoned mid-way (e.g. on Ctrl-C) must not leave tasks running
impl Drop for IdleMotion {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::SimRobot;

    fn robot() -> RobotRef {
        Arc::new(SimRobot::new(0.0))
    }

    #[tokio::test]
    async fn test_watcher_silent_when_fast() {
        let watcher = SlowResponseWatcher::spawn(robot(), Duration::from_millis(200));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!watcher.finish().await);
    }

    #[tokio::test]
    async fn test_watcher_fires_when_slow() {
        let robot = robot();
        let watcher = SlowResponseWatcher::spawn(robot.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(watcher.finish().await);
        assert!(robot.get_state().await.unwrap().head_pose.yaw > 0.0);
    }

    #[tokio::test]
    async fn test_idle_motion_stops_within_grace() {
        let robot = robot();
        let idle = IdleMotion::start(robot.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(55)).await;
        let moves = idle.stop(IDLE_MOTION_GRACE).await;
        assert!(moves >= 1);

        robot.reset().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(robot.get_state().await.unwrap().antennas_position, [0.0, 0.0]);
    }
}
