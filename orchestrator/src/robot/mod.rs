// Robot Adapter: the capability set the orchestrator drives, plus the
// simulated and daemon-backed implementations selected at startup.

mod daemon;
mod sim;

pub use daemon::DaemonRobot;
pub use sim::SimRobot;

use async_trait::async_trait;
use reachy_core::{RobotMode, RobotSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::RobotResult;
use crate::gesture::GestureTag;

/// Speech rate used to estimate utterance duration
pub const WORDS_PER_MINUTE: f64 = 150.0;

/// Head pose in meters (x, y, z) and radians (roll, pitch, yaw)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl HeadPose {
    pub fn offset(&self, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            roll: self.roll + roll,
            pitch: self.pitch + pitch,
            yaw: self.yaw + yaw,
            ..*self
        }
    }

    /// Largest absolute change of roll, pitch or yaw
    pub fn max_angle_delta(&self, other: &HeadPose) -> f64 {
        (self.roll - other.roll)
            .abs()
            .max((self.pitch - other.pitch).abs())
            .max((self.yaw - other.yaw).abs())
    }
}

/// Pose snapshot returned by `get_state`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotState {
    pub head_pose: HeadPose,
    pub antennas_position: [f64; 2],
    pub body_yaw: f64,
}

/// Capability set of an embodied robot backend.
///
/// Every operation returns an explicit result. Cosmetic operations (gestures,
/// resets, thinking hooks) are expected to be logged and discarded by the
/// caller through [`crate::errors::best_effort`].
#[async_trait]
pub trait RobotAdapter: Send + Sync {
    /// Short name for logs and status output
    fn backend_name(&self) -> &'static str;

    /// Liveness probe bounded by a short timeout
    async fn health(&self) -> bool;

    async fn get_state(&self) -> RobotResult<RobotState>;

    async fn gesture(&self, tag: &GestureTag) -> RobotResult<()>;

    /// Blocks for the utterance and returns its duration in seconds.
    /// Empty text returns 0 without side effects.
    async fn speak(&self, text: &str) -> RobotResult<f64>;

    /// Return to the calibrated neutral pose
    async fn reset(&self) -> RobotResult<()>;

    /// Capture the current pose as the neutral pose
    async fn calibrate_home(&self) -> RobotResult<()>;

    async fn thinking_pose(&self) -> RobotResult<()> {
        Ok(())
    }

    async fn return_from_thinking(&self) -> RobotResult<()> {
        Ok(())
    }

    /// Antenna-only move used by the idle-motion task
    async fn set_antennas(&self, left: f64, right: f64, duration: Duration) -> RobotResult<()>;
}

/// Shared handle type
pub type RobotRef = Arc<dyn RobotAdapter>;

/// Estimated spoken duration of `text` in seconds
pub fn estimate_speech_seconds(text: &str) -> f64 {
    let words = text.split_whitespace().count();
    if words == 0 {
        return 0.0;
    }
    words as f64 * 60.0 / WORDS_PER_MINUTE
}

/// Small head offset (roll, pitch, yaw) that stands in for a gesture's choreography
pub(crate) fn gesture_offset(tag: &GestureTag) -> (f64, f64, f64) {
    match tag.as_str() {
        "ack" => (0.0, -0.1, 0.0),
        "nod" | "nod_fast" => (0.0, -0.3, 0.0),
        "nod_tilt" => (0.15, -0.2, 0.0),
        "thinking" | "thinking_done" => (0.1, 0.0, 0.25),
        "error" | "confused" => (0.0, 0.0, 0.3),
        "excited" | "happy" | "greeting" => (0.0, 0.2, 0.0),
        "goto_sleep" => (0.0, 0.5, 0.0),
        _ => (0.0, -0.15, 0.0),
    }
}

/// Serializes utterances and stops the pacing of a previous one when a new one starts
#[derive(Debug, Default)]
pub(crate) struct SpeechPacer {
    current: Mutex<Option<CancellationToken>>,
    speaking: Mutex<()>,
}

impl SpeechPacer {
    /// Wait for `seconds`, or less if a newer utterance interrupts this one.
    /// Returns the seconds actually paced.
    pub(crate) async fn pace(&self, seconds: f64) -> f64 {
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().await.replace(token.clone()) {
            debug!("Stopping previous utterance");
            previous.cancel();
        }

        let _speaking = self.speaking.lock().await;
        let started = tokio::time::Instant::now();
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_secs_f64(seconds.max(0.0))) => {}
        }
        started.elapsed().as_secs_f64()
    }
}

/// Build the backend selected by `robot.mode`
pub fn create_robot(settings: &RobotSettings) -> RobotResult<RobotRef> {
    match settings.mode {
        RobotMode::Sim => {
            info!(time_scale = settings.sim_time_scale, "Creating simulated robot");
            Ok(Arc::new(SimRobot::new(settings.sim_time_scale)))
        }
        RobotMode::Daemon => {
            info!(url = %settings.daemon_url, "Creating daemon robot client");
            Ok(Arc::new(DaemonRobot::new(&settings.daemon_url)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_estimate() {
        assert_eq!(estimate_speech_seconds(""), 0.0);
        assert_eq!(estimate_speech_seconds("   "), 0.0);
        assert!((estimate_speech_seconds("one two three four five") - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_pose_delta() {
        let home = HeadPose::default();
        let moved = home.offset(0.1, -0.3, 0.05);
        assert!((moved.max_angle_delta(&home) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_state_decodes_partial_payload() {
        let state: RobotState =
            serde_json::from_str(r#"{"head_pose":{"pitch":0.2},"antennas_position":[0.1,-0.1]}"#).unwrap();
        assert_eq!(state.head_pose.pitch, 0.2);
        assert_eq!(state.antennas_position, [0.1, -0.1]);
        assert_eq!(state.body_yaw, 0.0);
    }

    #[tokio::test]
    async fn test_new_utterance_interrupts_previous() {
        let pacer = Arc::new(SpeechPacer::default());
        let first = {
            let pacer = pacer.clone();
            tokio::spawn(async move { pacer.pace(5.0).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = pacer.pace(0.05).await;

        let first = first.await.unwrap();
        assert!(first < 1.0);
        assert!(second < 1.0);
    }

    #[test]
    fn test_create_sim_robot() {
        let robot = create_robot(&RobotSettings::default()).unwrap();
        assert_eq!(robot.backend_name(), "sim");
    }
}
