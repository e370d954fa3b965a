// Request lifecycle for the voice/gesture assistant:
// - Latency policy and gesture tags
// - Response normalization
// - Robot adapters (simulated and daemon)
// - Metrics sink
// - Direct commands and the turn state machine

pub mod commands;
pub mod context;
pub mod coordinator;
pub mod errors;
pub mod gesture;
pub mod latency_policy;
pub mod metrics;
pub mod normalizer;
pub mod prompts;
pub mod robot;
pub mod tasks;

pub use commands::{CommandOutcome, DirectCommand};
pub use context::ConversationContext;
pub use coordinator::{FailureKind, LineOutcome, Orchestrator, TurnFailure, TurnReport, TurnSettings};
pub use errors::{best_effort, RobotError, RobotResult};
pub use gesture::{GestureTag, AVAILABLE_GESTURES};
pub use latency_policy::{LatencyMeasurement, LatencyPolicy, LatencyTier};
pub use metrics::{InMemoryMetrics, MetricsSink, MetricsSnapshot};
pub use normalizer::{NormalizedText, Normalization, ResponseNormalizer};
pub use robot::{create_robot, DaemonRobot, RobotAdapter, RobotRef, RobotState, SimRobot};
