//! Submit/poll client for the video generator.
//!
//! The generator renders asynchronously: a submission returns a task id,
//! and the task is polled until it produces a video URL or fails. Transient
//! submission failures are retried with exponential backoff; poll failures
//! are tolerated until the per-shot budget runs out, because the task may
//! still be rendering remotely.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use vforge_models::request::to_wire_size;
use vforge_models::{QualityMode, ShotRequest};

use crate::config::GenConfig;
use crate::error::{GenError, GenResult};

#[derive(Debug, Serialize)]
struct SubmitTaskRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    negative_prompt: &'a str,
    size: String,
    duration: u32,
    seed: i64,
    prompt_extend: bool,
    watermark: bool,
}

#[derive(Debug, Deserialize)]
struct SubmitTaskResponse {
    task_id: String,
}

/// Remote task lifecycle as reported by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskStatusResponse {
    pub status: TaskStatus,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A finished generation: the remote task and where its video lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub task_id: String,
    pub video_url: String,
}

/// Client for the video generator.
#[derive(Debug, Clone)]
pub struct GenClient {
    http: Client,
    config: GenConfig,
}

impl GenClient {
    /// Create a new client.
    pub fn new(config: GenConfig) -> GenResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("vforge-gen-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(GenError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> GenResult<Self> {
        Self::new(GenConfig::from_env()?)
    }

    /// Per-shot wall-clock budget for the given quality mode.
    pub fn poll_budget(&self, mode: QualityMode) -> Duration {
        self.config
            .poll_timeout
            .mul_f64(mode.profile().timeout_multiplier)
    }

    /// Submit one shot request, retrying transient failures, then poll the
    /// task until it finishes or `budget` elapses.
    pub async fn generate(
        &self,
        request: &ShotRequest,
        budget: Duration,
    ) -> GenResult<GenerationOutcome> {
        let task_id = self.submit_with_retry(request).await?;
        let video_url = self.wait(&task_id, budget).await?;
        Ok(GenerationOutcome { task_id, video_url })
    }

    /// Submit a shot request. Returns the remote task id.
    pub async fn submit(&self, request: &ShotRequest) -> GenResult<String> {
        let body = SubmitTaskRequest {
            model: &request.params.model,
            prompt: &request.compiled_prompt,
            negative_prompt: &request.compiled_negative_prompt,
            size: to_wire_size(&request.params.size),
            duration: request.params.duration,
            seed: request.params.seed,
            prompt_extend: request.params.prompt_extend,
            watermark: request.params.watermark,
        };

        debug!(
            shot_id = request.shot_id,
            seed = request.params.seed,
            size = %body.size,
            duration = body.duration,
            "submitting shot"
        );

        let url = format!("{}/v1/tasks", self.config.base_url);
        let mut req = self.http.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let submitted: SubmitTaskResponse = response
            .json()
            .await
            .map_err(|e| GenError::InvalidResponse(format!("malformed submit response: {e}")))?;

        if submitted.task_id.is_empty() {
            return Err(GenError::InvalidResponse(
                "submit response has an empty task id".to_string(),
            ));
        }

        info!(shot_id = request.shot_id, task_id = %submitted.task_id, "shot submitted");
        Ok(submitted.task_id)
    }

    /// Fetch the current status of a task.
    pub async fn poll(&self, task_id: &str) -> GenResult<TaskStatusResponse> {
        let url = format!("{}/v1/tasks/{}", self.config.base_url, task_id);
        let mut req = self.http.get(&url);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| GenError::InvalidResponse(format!("malformed status response: {e}")))
    }

    /// Poll `task_id` until it succeeds, fails, or `budget` elapses.
    ///
    /// There is no remote cancel; a timed-out task is simply abandoned.
    pub async fn wait(&self, task_id: &str, budget: Duration) -> GenResult<String> {
        let started = Instant::now();

        loop {
            match self.poll(task_id).await {
                Ok(TaskStatusResponse {
                    status: TaskStatus::Succeeded,
                    video_url,
                    ..
                }) => {
                    return video_url.filter(|u| !u.is_empty()).ok_or_else(|| {
                        GenError::InvalidResponse(format!(
                            "task {task_id} succeeded without a video url"
                        ))
                    });
                }
                Ok(TaskStatusResponse {
                    status: TaskStatus::Failed,
                    error,
                    ..
                }) => {
                    return Err(GenError::TaskFailed {
                        task_id: task_id.to_string(),
                        reason: error.unwrap_or_else(|| "no reason given".to_string()),
                    });
                }
                Ok(_) => {}
                Err(e) if e.is_retryable() => {
                    warn!(task_id, error = %e, "status poll failed, polling again");
                }
                Err(e) => return Err(e),
            }

            if started.elapsed() + self.config.poll_interval > budget {
                return Err(GenError::PollTimeout {
                    task_id: task_id.to_string(),
                    waited_s: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    async fn submit_with_retry(&self, request: &ShotRequest) -> GenResult<String> {
        let retry = &self.config.retry;

        for attempt in 0..retry.max_attempts {
            match self.submit(request).await {
                Ok(task_id) => return Ok(task_id),
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    let delay = retry.delay_for_attempt(attempt);
                    warn!(
                        shot_id = request.shot_id,
                        attempt = attempt + 1,
                        max_attempts = retry.max_attempts,
                        delay_s = delay.as_secs(),
                        error = %e,
                        "submit failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }

        // max_attempts is validated non-zero by construction; the loop
        // always returns before falling through.
        Err(GenError::config("retry policy allows no attempts"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vforge_models::request::GenerationParams;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_client(server: &MockServer) -> GenClient {
        let mut config = GenConfig::for_url(server.uri());
        config.poll_interval = Duration::from_millis(10);
        config.retry.base_delay = Duration::from_millis(1);
        GenClient::new(config).unwrap()
    }

    fn sample_request() -> ShotRequest {
        ShotRequest {
            shot_id: 1,
            compiled_prompt: "a dark bedroom, slow push-in".to_string(),
            compiled_negative_prompt: "blurry".to_string(),
            params: GenerationParams {
                model: "wan2.6-t2v".to_string(),
                size: "1280*720".to_string(),
                duration: 5,
                seed: 42,
                prompt_extend: false,
                watermark: false,
            },
        }
    }

    #[tokio::test]
    async fn test_submit_sends_wire_size_and_seed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tasks"))
            .and(body_partial_json(json!({"size": "1280*720", "seed": 42})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "task-9"})))
            .mount(&server)
            .await;

        let task_id = fast_client(&server).submit(&sample_request()).await.unwrap();
        assert_eq!(task_id, "task-9");
    }

    #[tokio::test]
    async fn test_generate_polls_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "task-1"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/task-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "running"})))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/task-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "succeeded",
                "video_url": "http://cdn/video.mp4"
            })))
            .mount(&server)
            .await;

        let outcome = fast_client(&server)
            .generate(&sample_request(), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.task_id, "task-1");
        assert_eq!(outcome.video_url, "http://cdn/video.mp4");
    }

    #[tokio::test]
    async fn test_generate_reports_task_failure_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "task-2"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/task-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "failed",
                "error": "content policy violation"
            })))
            .mount(&server)
            .await;

        let err = fast_client(&server)
            .generate(&sample_request(), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, GenError::TaskFailed { .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_submit_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tasks"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "task-3"})))
            .mount(&server)
            .await;

        let task_id = fast_client(&server)
            .submit_with_retry(&sample_request())
            .await
            .unwrap();
        assert_eq!(task_id, "task-3");
    }

    #[tokio::test]
    async fn test_submit_does_not_retry_bad_requests() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tasks"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid size"))
            .expect(1)
            .mount(&server)
            .await;

        let err = fast_client(&server)
            .submit_with_retry(&sample_request())
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_wait_times_out_on_stuck_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/tasks/stuck"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "pending"})))
            .mount(&server)
            .await;

        let err = fast_client(&server)
            .wait("stuck", Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(matches!(err, GenError::PollTimeout { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_poll_budget_scales_with_mode() {
        let config = GenConfig::for_url("http://localhost:9000");
        let client = GenClient::new(config).unwrap();
        assert_eq!(
            client.poll_budget(QualityMode::Balanced),
            Duration::from_secs(300)
        );
        assert_eq!(client.poll_budget(QualityMode::High), Duration::from_secs(450));
        assert_eq!(client.poll_budget(QualityMode::Fast), Duration::from_secs(240));
    }
}
