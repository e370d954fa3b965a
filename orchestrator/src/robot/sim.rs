use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{estimate_speech_seconds, gesture_offset, HeadPose, RobotAdapter, RobotState, SpeechPacer};
use crate::errors::RobotResult;
use crate::gesture::GestureTag;

#[derive(Debug, Default)]
struct SimState {
    pose: RobotState,
    home: RobotState,
    before_thinking: Option<HeadPose>,
}

/// In-memory robot. Gestures leave a representative offset on the head pose
/// until the next reset; speech is paced by word count.
#[derive(Debug)]
pub struct SimRobot {
    state: Mutex<SimState>,
    pacer: SpeechPacer,
    time_scale: f64,
}

impl SimRobot {
    /// `time_scale` multiplies speech pacing; 0 returns immediately
    pub fn new(time_scale: f64) -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            pacer: SpeechPacer::default(),
            time_scale: time_scale.max(0.0),
        }
    }
}

#[async_trait]
impl RobotAdapter for SimRobot {
    fn backend_name(&self) -> &'static str {
        "sim"
    }

    async fn health(&self) -> bool {
        true
    }

    async fn get_state(&self) -> RobotResult<RobotState> {
        Ok(self.state.lock().await.pose)
    }

    async fn gesture(&self, tag: &GestureTag) -> RobotResult<()> {
        let (roll, pitch, yaw) = gesture_offset(tag);
        let mut state = self.state.lock().await;
        state.pose.head_pose = state.home.head_pose.offset(roll, pitch, yaw);
        debug!(gesture = %tag, "Simulated gesture");
        Ok(())
    }

    async fn speak(&self, text: &str) -> RobotResult<f64> {
        let seconds = estimate_speech_seconds(text);
        if seconds == 0.0 {
            return Ok(0.0);
        }
        debug!(seconds, time_scale = self.time_scale, "Simulated speech");
        Ok(self.pacer.pace(seconds * self.time_scale).await)
    }

    async fn reset(&self) -> RobotResult<()> {
        let mut state = self.state.lock().await;
        state.pose = state.home;
        state.before_thinking = None;
        Ok(())
    }

    async fn calibrate_home(&self) -> RobotResult<()> {
        let mut state = self.state.lock().await;
        state.home = state.pose;
        Ok(())
    }

    async fn thinking_pose(&self) -> RobotResult<()> {
        let (roll, pitch, yaw) = gesture_offset(&GestureTag::THINKING);
        let mut state = self.state.lock().await;
        state.before_thinking = Some(state.pose.head_pose);
        state.pose.head_pose = state.pose.head_pose.offset(roll, pitch, yaw);
        Ok(())
    }

    async fn return_from_thinking(&self) -> RobotResult<()> {
        let mut state = self.state.lock().await;
        if let Some(pose) = state.before_thinking.take() {
            state.pose.head_pose = pose;
        }
        Ok(())
    }

    async fn set_antennas(&self, left: f64, right: f64, _duration: Duration) -> RobotResult<()> {
        self.state.lock().await.pose.antennas_position = [left, right];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gesture_then_reset_returns_home() {
        let robot = SimRobot::new(0.0);
        robot.gesture(&GestureTag::NOD_FAST).await.unwrap();
        robot.set_antennas(0.3, -0.3, Duration::from_millis(10)).await.unwrap();
        assert_ne!(robot.get_state().await.unwrap(), RobotState::default());

        robot.reset().await.unwrap();
        assert_eq!(robot.get_state().await.unwrap(), RobotState::default());
    }

    #[tokio::test]
    async fn test_calibrate_home_moves_neutral_pose() {
        let robot = SimRobot::new(0.0);
        robot.set_antennas(0.2, 0.2, Duration::ZERO).await.unwrap();
        robot.calibrate_home().await.unwrap();
        robot.gesture(&GestureTag::ERROR).await.unwrap();
        robot.reset().await.unwrap();
        assert_eq!(robot.get_state().await.unwrap().antennas_position, [0.2, 0.2]);
    }

    #[tokio::test]
    async fn test_thinking_round_trip() {
        let robot = SimRobot::new(0.0);
        robot.thinking_pose().await.unwrap();
        assert!(robot.get_state().await.unwrap().head_pose.yaw > 0.0);
        robot.return_from_thinking().await.unwrap();
        assert_eq!(robot.get_state().await.unwrap().head_pose, HeadPose::default());
    }

    #[tokio::test]
    async fn test_speak_returns_paced_duration() {
        let robot = SimRobot::new(0.01);
        assert_eq!(robot.speak("").await.unwrap(), 0.0);
        // 5 words estimate 2 s, scaled to 20 ms
        let seconds = robot.speak("the quick brown fox jumps").await.unwrap();
        assert!(seconds >= 0.015 && seconds < 0.5, "paced {}", seconds);
    }

    #[tokio::test]
    async fn test_interrupted_speech_reports_time_spoken() {
        let robot = std::sync::Arc::new(SimRobot::new(1.0));
        let long = {
            let robot = robot.clone();
            tokio::spawn(async move { robot.speak(&"word ".repeat(50)).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        robot.speak("ok").await.unwrap();

        let first = long.await.unwrap();
        assert!(first < 1.0, "first utterance reported {}", first);
    }
}
