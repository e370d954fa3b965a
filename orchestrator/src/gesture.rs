use serde::{Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;

/// Opaque gesture identifier understood by the Robot Adapter.
///
/// The orchestrator and latency policy only ever produce the constants below;
/// arbitrary names only enter through direct `gesture <name>` commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GestureTag(Cow<'static, str>);

impl GestureTag {
    pub const ACK: GestureTag = GestureTag(Cow::Borrowed("ack"));
    pub const NOD_FAST: GestureTag = GestureTag(Cow::Borrowed("nod_fast"));
    pub const NOD_TILT: GestureTag = GestureTag(Cow::Borrowed("nod_tilt"));
    pub const THINKING_DONE: GestureTag = GestureTag(Cow::Borrowed("thinking_done"));
    pub const ERROR: GestureTag = GestureTag(Cow::Borrowed("error"));
    pub const THINKING: GestureTag = GestureTag(Cow::Borrowed("thinking"));
    pub const WAKE_UP: GestureTag = GestureTag(Cow::Borrowed("wake_up"));
    pub const GOTO_SLEEP: GestureTag = GestureTag(Cow::Borrowed("goto_sleep"));

    /// Tag for a name typed by the user
    pub fn named(name: impl Into<String>) -> Self {
        GestureTag(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `recorded:<dataset>:<move>` tags address moves stored on the daemon
    pub fn recorded_move(&self) -> Option<(&str, &str)> {
        let rest = self.0.strip_prefix("recorded:")?;
        let (dataset, name) = rest.split_once(':')?;
        if dataset.is_empty() || name.is_empty() {
            return None;
        }
        Some((dataset, name))
    }
}

impl fmt::Display for GestureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for GestureTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Gestures listed by `cmd:help`
pub const AVAILABLE_GESTURES: &[&str] = &[
    "ack",
    "nod_fast",
    "nod_tilt",
    "thinking_done",
    "error",
    "nod",
    "excited",
    "thinking",
    "greeting",
    "happy",
    "confused",
    "wake_up",
    "goto_sleep",
    "recorded:<dataset>:<move>",
];
