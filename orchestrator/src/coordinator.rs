use chrono::{DateTime, Utc};
use reachy_core::{truncate_chars, ChatBackend, InferenceError, InferenceRequest, Settings};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::commands::{self, CommandOutcome, DirectCommand};
use crate::context::ConversationContext;
use crate::errors::best_effort;
use crate::gesture::GestureTag;
use crate::latency_policy::{LatencyPolicy, LatencyTier};
use crate::metrics::MetricsSink;
use crate::normalizer::ResponseNormalizer;
use crate::prompts::{BACKEND_UNAVAILABLE, SYSTEM_PROMPT};
use crate::robot::RobotRef;
use crate::tasks::{IdleMotion, SlowResponseWatcher, IDLE_MOTION_GRACE, IDLE_MOTION_PERIOD};

/// Pause after an automatic wake-up so the animation can start
pub const WAKE_DELAY: Duration = Duration::from_millis(500);

/// Per-turn knobs derived from [`Settings`]
#[derive(Debug, Clone)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub thinking_after: Duration,
    pub wake_delay: Duration,
    pub idle_motion_period: Duration,
    pub idle_motion_grace: Duration,
}

impl TurnSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model: settings.inference.model.clone(),
            temperature: settings.inference.temperature,
            max_tokens: settings.inference.max_tokens,
            thinking_after: Duration::from_millis(settings.orchestrator.thinking_after_ms),
            wake_delay: WAKE_DELAY,
            idle_motion_period: IDLE_MOTION_PERIOD,
            idle_motion_grace: IDLE_MOTION_GRACE,
        }
    }
}

/// User-facing classification of an inference failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    Timeout,
    NotFound,
    Authentication,
    Backend,
}

impl FailureKind {
    pub fn classify(err: &InferenceError) -> Self {
        match err {
            InferenceError::Timeout { .. } => FailureKind::Timeout,
            InferenceError::Transport(_) => FailureKind::Connection,
            InferenceError::Http { status_code: 404, .. } => FailureKind::NotFound,
            InferenceError::Http {
                status_code: 401 | 403,
                ..
            } => FailureKind::Authentication,
            InferenceError::Http { .. } | InferenceError::Config(_) => FailureKind::Backend,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnFailure {
    pub kind: FailureKind,
    /// Hint shown to the user
    pub message: String,
    /// Underlying error text
    pub detail: String,
}

impl TurnFailure {
    pub fn from_error(err: &InferenceError, endpoint: &str) -> Self {
        let kind = FailureKind::classify(err);
        let message = match kind {
            FailureKind::Connection => format!(
                "Connection error: cannot reach inference endpoint at {}. Check AIM_BASE_URL.",
                endpoint
            ),
            FailureKind::Timeout => format!(
                "Timeout: inference endpoint at {} did not respond in time. Try increasing AIM_TIMEOUT_MS.",
                endpoint
            ),
            FailureKind::NotFound => format!(
                "Endpoint not found: {} may not exist. Check AIM_BASE_URL and AIM_CHAT_PATH.",
                endpoint
            ),
            FailureKind::Authentication => "Authentication error: check AIM_API_KEY.".to_string(),
            FailureKind::Backend => {
                format!("Backend error: {}", truncate_chars(&err.to_string(), 100))
            }
        };
        Self {
            kind,
            message,
            detail: err.to_string(),
        }
    }
}

/// Everything that happened during one turn
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub turn_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub inference_ms: f64,
    pub e2e_ms: f64,
    /// Latency tier of a successful turn
    pub tier: Option<LatencyTier>,
    pub pre_gesture: GestureTag,
    pub post_gesture: GestureTag,
    pub woke_robot: bool,
    pub thinking_indicator: bool,
    pub reasoning_removed: bool,
    pub truncated: bool,
    pub attempts: u32,
    pub completion_tokens: Option<u32>,
    pub slo_missed: bool,
    pub spoken_text: String,
    pub spoken_seconds: f64,
    pub idle_moves: u32,
    pub failure: Option<TurnFailure>,
}

impl TurnReport {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of feeding one input line to the orchestrator
#[derive(Debug, Clone)]
pub enum LineOutcome {
    /// Blank line, nothing happened
    Idle,
    Command(CommandOutcome),
    Turn(Box<TurnReport>),
}

struct InferenceOutcome {
    text: String,
    failure: Option<TurnFailure>,
    reasoning_removed: bool,
    truncated: bool,
    attempts: u32,
    completion_tokens: Option<u32>,
}

/// Drives one turn at a time through
/// ACK -> INFERENCE (with slow-response watcher) -> NORMALIZE -> POST_GESTURE -> SPEAK (with idle motion) -> RESET.
pub struct Orchestrator {
    backend: Arc<dyn ChatBackend>,
    robot: RobotRef,
    metrics: Arc<dyn MetricsSink>,
    policy: LatencyPolicy,
    normalizer: ResponseNormalizer,
    context: ConversationContext,
    turn_settings: TurnSettings,
    command_prefix: String,
    robot_asleep: bool,
    thinking_model: bool,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        robot: RobotRef,
        metrics: Arc<dyn MetricsSink>,
        settings: &Settings,
    ) -> Self {
        let orchestrator = &settings.orchestrator;
        let system_prompt = orchestrator.system_prompt.as_deref().unwrap_or(SYSTEM_PROMPT);

        Self {
            backend,
            robot,
            metrics,
            policy: LatencyPolicy::new(
                orchestrator.fast_tier_ms as f64,
                orchestrator.e2e_slo_ms as f64,
            ),
            normalizer: ResponseNormalizer::new(
                orchestrator.max_speech_chars,
                orchestrator.truncation_ratio,
            ),
            context: ConversationContext::new(Some(system_prompt), orchestrator.context_turns),
            turn_settings: TurnSettings::from_settings(settings),
            command_prefix: orchestrator.command_prefix.clone(),
            robot_asleep: false,
            thinking_model: false,
        }
    }

    pub fn with_turn_settings(mut self, turn_settings: TurnSettings) -> Self {
        self.turn_settings = turn_settings;
        self
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn policy(&self) -> &LatencyPolicy {
        &self.policy
    }

    pub fn robot(&self) -> &RobotRef {
        &self.robot
    }

    pub fn backend_endpoint(&self) -> String {
        self.backend.endpoint()
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    pub fn is_robot_asleep(&self) -> bool {
        self.robot_asleep
    }

    /// Whether any response so far carried reasoning output
    pub fn thinking_model_detected(&self) -> bool {
        self.thinking_model
    }

    /// Dispatch one line of user input. Never fails; every phase error is
    /// recovered and reflected in the returned outcome.
    pub async fn handle_line(&mut self, line: &str) -> LineOutcome {
        let line = line.trim();
        if line.is_empty() {
            return LineOutcome::Idle;
        }

        if let Some(command) = DirectCommand::parse(line, &self.command_prefix) {
            return LineOutcome::Command(self.run_command(command).await);
        }

        LineOutcome::Turn(Box::new(self.run_turn(line).await))
    }

    /// Direct commands touch neither the latency policy nor metrics
    pub async fn run_command(&mut self, command: DirectCommand) -> CommandOutcome {
        let sleep_change = match &command {
            DirectCommand::Gesture(Some(tag)) if *tag == GestureTag::GOTO_SLEEP => Some(true),
            DirectCommand::Gesture(Some(tag)) if *tag == GestureTag::WAKE_UP => Some(false),
            _ => None,
        };

        let outcome = commands::execute(self.robot.as_ref(), command).await;
        if let (Some(asleep), CommandOutcome::GestureDone(_)) = (sleep_change, &outcome) {
            debug!(asleep, "Robot sleep state changed");
            self.robot_asleep = asleep;
        }
        outcome
    }

    /// Run one full turn for `user_text`
    pub async fn run_turn(&mut self, user_text: &str) -> TurnReport {
        let turn_id = Uuid::new_v4();
        let started_at = Utc::now();
        let woke_robot = self.wake_if_asleep().await;

        // ACK
        let started = Instant::now();
        self.metrics.record_request();
        let pre_gesture = self.policy.choose_pre_gesture();
        best_effort("pre_gesture", self.robot.gesture(&pre_gesture).await);
        self.metrics.record_gesture(&pre_gesture);

        self.context.push_user(user_text);
        let request = InferenceRequest::new(
            self.turn_settings.model.as_str(),
            self.context.window(),
            self.turn_settings.temperature,
            self.turn_settings.max_tokens,
        );
        debug!(%turn_id, messages = request.messages.len(), "Turn started");

        // INFERENCE, watched for slowness
        let watcher = SlowResponseWatcher::spawn(self.robot.clone(), self.turn_settings.thinking_after);
        let call_started = Instant::now();
        let result = self.backend.chat(request).await;
        let inference_ms = elapsed_ms(call_started);
        let thinking_indicator = watcher.finish().await;
        if thinking_indicator {
            best_effort("return_from_thinking", self.robot.return_from_thinking().await);
        }

        // NORMALIZE
        let outcome = self.settle_inference(result, inference_ms);

        // POST_GESTURE
        let e2e_ms = elapsed_ms(started);
        self.metrics.observe_e2e_ms(e2e_ms);
        let slo_missed = e2e_ms > self.policy.slo_ms();
        if slo_missed {
            self.metrics.record_slo_miss();
        }
        let success = outcome.failure.is_none();
        let post_gesture = self.policy.choose_post_gesture(inference_ms, e2e_ms, success);
        best_effort("post_gesture", self.robot.gesture(&post_gesture).await);
        self.metrics.record_gesture(&post_gesture);

        // SPEAK with idle motion
        let idle = IdleMotion::start(self.robot.clone(), self.turn_settings.idle_motion_period);
        let spoken_seconds = match self.robot.speak(&outcome.text).await {
            Ok(seconds) => seconds,
            Err(e) => {
                warn!(error = %e, "Speech failed, continuing");
                0.0
            }
        };
        let idle_moves = idle.stop(self.turn_settings.idle_motion_grace).await;

        // RESET
        best_effort("reset", self.robot.reset().await);

        info!(
            %turn_id,
            success,
            inference_ms,
            e2e_ms,
            gesture = %post_gesture,
            thinking_indicator,
            "Turn complete"
        );

        TurnReport {
            turn_id,
            started_at,
            inference_ms,
            e2e_ms,
            tier: success.then(|| self.policy.latency_tier(e2e_ms)),
            pre_gesture,
            post_gesture,
            woke_robot,
            thinking_indicator,
            reasoning_removed: outcome.reasoning_removed,
            truncated: outcome.truncated,
            attempts: outcome.attempts,
            completion_tokens: outcome.completion_tokens,
            slo_missed,
            spoken_text: outcome.text,
            spoken_seconds,
            idle_moves,
            failure: outcome.failure,
        }
    }

    /// Best-effort return to neutral, used on shutdown
    pub async fn shutdown(&self) {
        best_effort("reset", self.robot.reset().await);
    }

    fn settle_inference(
        &mut self,
        result: reachy_core::InferenceResult<reachy_core::InferenceResponse>,
        inference_ms: f64,
    ) -> InferenceOutcome {
        match result {
            Ok(response) => {
                self.metrics.observe_inference_ms(inference_ms);
                let normalized = self.normalizer.normalize_detailed(
                    &response.text,
                    response.completion_tokens,
                    self.turn_settings.max_tokens,
                );
                if normalized.reasoning_removed && !self.thinking_model {
                    info!("Reasoning output detected, treating backend as a thinking model");
                    self.thinking_model = true;
                }

                let text = normalized.text.into_string();
                self.context.push_assistant(&text);
                InferenceOutcome {
                    text,
                    failure: None,
                    reasoning_removed: normalized.reasoning_removed,
                    truncated: normalized.repaired_truncation || normalized.length_capped,
                    attempts: response.attempts,
                    completion_tokens: response.completion_tokens,
                }
            }
            Err(e) => {
                self.metrics.record_error();
                self.metrics.record_backend_failure();
                let failure = TurnFailure::from_error(&e, &self.backend.endpoint());
                error!(error = %e, kind = ?failure.kind, inference_ms, "Inference failed");
                InferenceOutcome {
                    text: BACKEND_UNAVAILABLE.to_string(),
                    attempts: match &e {
                        InferenceError::Timeout { attempts, .. } => *attempts,
                        _ => 0,
                    },
                    failure: Some(failure),
                    reasoning_removed: false,
                    truncated: false,
                    completion_tokens: None,
                }
            }
        }
    }

    async fn wake_if_asleep(&mut self) -> bool {
        if !self.robot_asleep {
            return false;
        }
        info!("Robot is asleep, waking up before the turn");
        best_effort("wake_up", self.robot.gesture(&GestureTag::WAKE_UP).await);
        self.robot_asleep = false;
        tokio::time::sleep(self.turn_settings.wake_delay).await;
        true
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
