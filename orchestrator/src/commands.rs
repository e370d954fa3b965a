//! Direct robot-control commands typed after the command prefix (`cmd:` by default).
//! They bypass inference, the latency policy and metrics entirely.

use tracing::{info, warn};

use crate::gesture::GestureTag;
use crate::robot::{RobotAdapter, RobotState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectCommand {
    Gesture(Option<GestureTag>),
    Reset,
    Calibrate,
    State,
    Help,
    /// Prefix with nothing after it
    Empty,
    Unknown(String),
}

impl DirectCommand {
    /// `None` when the line does not start with `prefix` (case-insensitive)
    pub fn parse(line: &str, prefix: &str) -> Option<Self> {
        let line = line.trim();
        let head = line.get(..prefix.len())?;
        if prefix.is_empty() || !head.eq_ignore_ascii_case(prefix) {
            return None;
        }

        let rest = line[prefix.len()..].trim();
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        Some(match name.to_lowercase().as_str() {
            "" => DirectCommand::Empty,
            "gesture" => DirectCommand::Gesture((!args.is_empty()).then(|| GestureTag::named(args))),
            "reset" => DirectCommand::Reset,
            "calibrate" => DirectCommand::Calibrate,
            "state" => DirectCommand::State,
            "help" => DirectCommand::Help,
            other => DirectCommand::Unknown(other.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    GestureDone(GestureTag),
    GestureFailed { tag: GestureTag, error: String },
    MissingGestureName,
    /// Largest head-angle change caused by the reset (radians)
    ResetDone { moved: f64 },
    Calibrated,
    State(RobotState),
    Help,
    Usage,
    Unknown(String),
    Failed { command: &'static str, error: String },
}

/// Run a direct command. Robot errors are reported back instead of discarded,
/// since the user asked for the operation explicitly.
pub async fn execute(robot: &dyn RobotAdapter, command: DirectCommand) -> CommandOutcome {
    match command {
        DirectCommand::Gesture(None) => CommandOutcome::MissingGestureName,
        DirectCommand::Gesture(Some(tag)) => {
            info!(gesture = %tag, "Executing gesture command");
            match robot.gesture(&tag).await {
                Ok(()) => CommandOutcome::GestureDone(tag),
                Err(e) => {
                    warn!(gesture = %tag, error = %e, "Gesture command failed");
                    CommandOutcome::GestureFailed {
                        tag,
                        error: e.to_string(),
                    }
                }
            }
        }
        DirectCommand::Reset => {
            let before = robot.get_state().await.ok();
            if let Err(e) = robot.reset().await {
                return failed("reset", e);
            }
            let moved = match (before, robot.get_state().await.ok()) {
                (Some(before), Some(after)) => after.head_pose.max_angle_delta(&before.head_pose),
                _ => 0.0,
            };
            CommandOutcome::ResetDone { moved }
        }
        DirectCommand::Calibrate => match robot.calibrate_home().await {
            Ok(()) => CommandOutcome::Calibrated,
            Err(e) => failed("calibrate", e),
        },
        DirectCommand::State => match robot.get_state().await {
            Ok(state) => CommandOutcome::State(state),
            Err(e) => failed("state", e),
        },
        DirectCommand::Help => CommandOutcome::Help,
        DirectCommand::Empty => CommandOutcome::Usage,
        DirectCommand::Unknown(name) => CommandOutcome::Unknown(name),
    }
}

fn failed(command: &'static str, e: impl std::fmt::Display) -> CommandOutcome {
    warn!(command, error = %e, "Direct command failed");
    CommandOutcome::Failed {
        command,
        error: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::SimRobot;

    #[test]
    fn test_parse_commands() {
        assert_eq!(DirectCommand::parse("hello", "cmd:"), None);
        assert_eq!(DirectCommand::parse("cmd:", "cmd:"), Some(DirectCommand::Empty));
        assert_eq!(DirectCommand::parse("  CMD:Reset ", "cmd:"), Some(DirectCommand::Reset));
        assert_eq!(
            DirectCommand::parse("cmd:gesture   nod_tilt", "cmd:"),
            Some(DirectCommand::Gesture(Some(GestureTag::NOD_TILT)))
        );
        assert_eq!(
            DirectCommand::parse("cmd:gesture", "cmd:"),
            Some(DirectCommand::Gesture(None))
        );
        assert_eq!(
            DirectCommand::parse("cmd:dance now", "cmd:"),
            Some(DirectCommand::Unknown("dance".to_string()))
        );
        assert_eq!(DirectCommand::parse("cm", "cmd:"), None);
    }

    #[tokio::test]
    async fn test_reset_reports_movement() {
        let robot = SimRobot::new(0.0);
        robot.gesture(&GestureTag::NOD_FAST).await.unwrap();
        match execute(&robot, DirectCommand::Reset).await {
            CommandOutcome::ResetDone { moved } => assert!((moved - 0.3).abs() < 1e-9),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_state_and_missing_gesture() {
        let robot = SimRobot::new(0.0);
        assert!(matches!(
            execute(&robot, DirectCommand::State).await,
            CommandOutcome::State(_)
        ));
        assert_eq!(
            execute(&robot, DirectCommand::Gesture(None)).await,
            CommandOutcome::MissingGestureName
        );
    }
}
