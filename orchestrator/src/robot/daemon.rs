use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{estimate_speech_seconds, gesture_offset, HeadPose, RobotAdapter, RobotState, SpeechPacer};
use crate::errors::{RobotError, RobotResult};
use crate::gesture::GestureTag;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(1);
const MOVE_TIMEOUT: Duration = Duration::from_secs(5);
const GESTURE_MOVE_SECS: f64 = 0.3;
const GESTURE_RETURN_SECS: f64 = 0.2;
const RESET_SECS: f64 = 0.5;
const GESTURE_HOLD: Duration = Duration::from_millis(100);

/// Body of `POST /api/move/goto`
#[derive(Debug, Serialize)]
struct GotoRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    head_pose: Option<HeadPose>,
    #[serde(skip_serializing_if = "Option::is_none")]
    antennas: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body_yaw: Option<f64>,
    duration: f64,
    interpolation: &'static str,
}

impl GotoRequest {
    fn head(pose: HeadPose, duration: f64) -> Self {
        Self {
            head_pose: Some(pose),
            antennas: None,
            body_yaw: None,
            duration,
            interpolation: "minjerk",
        }
    }

    fn antennas(left: f64, right: f64, duration: f64) -> Self {
        Self {
            head_pose: None,
            antennas: Some([left, right]),
            body_yaw: None,
            duration,
            interpolation: "minjerk",
        }
    }

    fn full(state: &RobotState, duration: f64) -> Self {
        Self {
            head_pose: Some(state.head_pose),
            antennas: Some(state.antennas_position),
            body_yaw: Some(state.body_yaw),
            duration,
            interpolation: "minjerk",
        }
    }
}

#[derive(Debug, Default)]
struct PoseMemory {
    home: RobotState,
    before_thinking: Option<HeadPose>,
}

/// REST client of the robot daemon
#[derive(Debug)]
pub struct DaemonRobot {
    http_client: Client,
    base_url: String,
    poses: Mutex<PoseMemory>,
    pacer: SpeechPacer,
}

impl DaemonRobot {
    pub fn new(base_url: &str) -> RobotResult<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RobotError::Unavailable("daemon URL is empty".to_string()));
        }

        let http_client = Client::builder()
            .build()
            .map_err(|e| RobotError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            poses: Mutex::new(PoseMemory::default()),
            pacer: SpeechPacer::default(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: Option<&T>) -> RobotResult<()> {
        let mut request = self.http_client.post(self.url(path)).timeout(MOVE_TIMEOUT);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RobotError::Http {
                status_code: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }
        Ok(())
    }

    async fn goto(&self, request: &GotoRequest) -> RobotResult<()> {
        self.post("/api/move/goto", Some(request)).await
    }

    async fn play(&self, path: &str) -> RobotResult<()> {
        self.post::<()>(path, None).await
    }

    async fn keyframe_gesture(&self, tag: &GestureTag) -> RobotResult<()> {
        let current = self.get_state().await?.head_pose;
        let (roll, pitch, yaw) = gesture_offset(tag);

        self.goto(&GotoRequest::head(current.offset(roll, pitch, yaw), GESTURE_MOVE_SECS))
            .await?;
        tokio::time::sleep(GESTURE_HOLD).await;
        self.goto(&GotoRequest::head(current, GESTURE_RETURN_SECS)).await
    }
}

#[async_trait]
impl RobotAdapter for DaemonRobot {
    fn backend_name(&self) -> &'static str {
        "daemon"
    }

    async fn health(&self) -> bool {
        match self
            .http_client
            .get(self.url("/api/state/full"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Robot daemon health probe failed");
                false
            }
        }
    }

    async fn get_state(&self) -> RobotResult<RobotState> {
        let response = self
            .http_client
            .get(self.url("/api/state/full"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RobotError::Http {
                status_code: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json::<RobotState>()
            .await
            .map_err(|e| RobotError::Decode(e.to_string()))
    }

    async fn gesture(&self, tag: &GestureTag) -> RobotResult<()> {
        debug!(gesture = %tag, "Daemon gesture");
        if let Some((dataset, name)) = tag.recorded_move() {
            return self
                .play(&format!("/api/move/play/recorded-move-dataset/{}/{}", dataset, name))
                .await;
        }
        if tag.as_str().starts_with("recorded:") {
            return Err(RobotError::Unsupported(format!(
                "'{}' is not a recorded:<dataset>:<move> tag",
                tag
            )));
        }
        match tag.as_str() {
            "wake_up" => self.play("/api/move/play/wake_up").await,
            "goto_sleep" => self.play("/api/move/play/goto_sleep").await,
            _ => self.keyframe_gesture(tag).await,
        }
    }

    async fn speak(&self, text: &str) -> RobotResult<f64> {
        let seconds = estimate_speech_seconds(text);
        if seconds == 0.0 {
            return Ok(0.0);
        }
        Ok(self.pacer.pace(seconds).await)
    }

    async fn reset(&self) -> RobotResult<()> {
        let home = {
            let mut poses = self.poses.lock().await;
            poses.before_thinking = None;
            poses.home
        };
        self.goto(&GotoRequest::full(&home, RESET_SECS)).await
    }

    async fn calibrate_home(&self) -> RobotResult<()> {
        let current = self.get_state().await?;
        self.poses.lock().await.home = current;
        debug!(?current, "Calibrated home pose");
        Ok(())
    }

    async fn thinking_pose(&self) -> RobotResult<()> {
        let current = self.get_state().await?.head_pose;
        self.poses.lock().await.before_thinking = Some(current);
        let (roll, pitch, yaw) = gesture_offset(&GestureTag::THINKING);
        self.goto(&GotoRequest::head(current.offset(roll, pitch, yaw), GESTURE_MOVE_SECS))
            .await
    }

    async fn return_from_thinking(&self) -> RobotResult<()> {
        let saved = self.poses.lock().await.before_thinking.take();
        match saved {
            Some(pose) => self.goto(&GotoRequest::head(pose, GESTURE_RETURN_SECS)).await,
            None => {
                warn!("return_from_thinking called without a saved pose");
                Ok(())
            }
        }
    }

    async fn set_antennas(&self, left: f64, right: f64, duration: Duration) -> RobotResult<()> {
        self.goto(&GotoRequest::antennas(left, right, duration.as_secs_f64()))
            .await
    }
}
