//! Workers: pull payloads, perform the HTTP request, classify the outcome

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::jobs::{JobProcessor, QueueService};
use crate::models::{JobPayload, JobResult};
use crate::repository::ExecutionRepositoryTrait;
use crate::Result;

/// Per-request timeout against job targets
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup stagger between workers in a pool
const SPAWN_STAGGER: Duration = Duration::from_millis(100);

/// How much response body lands in an error message
const BODY_EXCERPT_LEN: usize = 256;

/// Worker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// A single queue consumer with its own HTTP client
pub struct Worker {
    /// Short unique ID used in logs
    pub id: String,

    queue: Arc<QueueService>,
    executions: Arc<dyn ExecutionRepositoryTrait>,
    http: reqwest::Client,
    state: Arc<RwLock<WorkerState>>,
}

impl Worker {
    /// Create a new worker
    pub fn new(
        queue: Arc<QueueService>,
        executions: Arc<dyn ExecutionRepositoryTrait>,
    ) -> Result<Self> {
        let id = format!("worker-{}", &Uuid::new_v4().simple().to_string()[..8]);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            id,
            queue,
            executions,
            http,
            state: Arc::new(RwLock::new(WorkerState::Starting)),
        })
    }

    /// Consume payloads until stopped
    ///
    /// The queue's 5 s pop timeout bounds how long a stop request waits. An
    /// in-flight HTTP request is never cancelled; a crash mid-attempt leaves
    /// the execution row in `running` until the pending-marker TTL opens the
    /// job up again.
    pub async fn run(&self) {
        *self.state.write().await = WorkerState::Running;
        info!(worker = %self.id, "worker started");

        while *self.state.read().await == WorkerState::Running {
            self.queue.poll_once(&self.id, self).await;
        }

        *self.state.write().await = WorkerState::Stopped;
        info!(worker = %self.id, "worker stopped");
    }

    /// Request the worker to stop after its current poll
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if *state == WorkerState::Running {
            *state = WorkerState::Stopping;
        }
    }

    /// Whether the worker loop is active
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == WorkerState::Running
    }
}

#[async_trait]
impl JobProcessor for Worker {
    async fn process(&self, payload: &JobPayload) -> JobResult {
        info!(worker = %self.id, job = %payload.name, "executing job");

        // Bookkeeping failures must not stop the ping itself
        match self.executions.find_by_id(payload.execution_id).await {
            Ok(Some(mut execution)) => {
                execution.mark_running();
                if let Err(e) = self.executions.save(&execution).await {
                    warn!(worker = %self.id, error = %e, "failed to mark execution running");
                }
            }
            Ok(None) => {
                warn!(worker = %self.id, execution = %payload.execution_id, "execution row missing");
            }
            Err(e) => {
                warn!(worker = %self.id, error = %e, "failed to load execution row");
            }
        }

        execute_request(&self.http, &self.id, payload).await
    }
}

/// Perform the HTTP request for a payload and classify the outcome
///
/// - pre-dispatch failure (bad method/URL): failed, no response code
/// - transport error: failed, no response code, "HTTP request failed: ..."
/// - 2xx: success with the code
/// - anything else: failed with code and a body excerpt
async fn execute_request(
    client: &reqwest::Client,
    worker_id: &str,
    payload: &JobPayload,
) -> JobResult {
    let method = match reqwest::Method::from_bytes(payload.method.as_bytes()) {
        Ok(method) => method,
        Err(e) => {
            error!(worker = worker_id, job = %payload.name, error = %e, "invalid method");
            return JobResult::failure(
                payload.execution_id,
                None,
                format!("Failed to build request: invalid method {}: {}", payload.method, e),
            );
        }
    };

    let url = match reqwest::Url::parse(&payload.url) {
        Ok(url) => url,
        Err(e) => {
            error!(worker = worker_id, job = %payload.name, error = %e, "invalid url");
            return JobResult::failure(
                payload.execution_id,
                None,
                format!("Failed to build request: {}", e),
            );
        }
    };

    let mut request = client.request(method, url);

    if let Some(headers) = &payload.headers {
        for (name, value) in headers {
            request = request.header(name, value);
        }
    }

    if let Some(body) = &payload.body {
        request = request.body(body.clone());
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            error!(worker = worker_id, job = %payload.name, error = %e, "request failed");
            return JobResult::failure(
                payload.execution_id,
                None,
                format!("HTTP request failed: {}", e),
            );
        }
    };

    let code = response.status().as_u16() as i32;

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            error!(worker = worker_id, job = %payload.name, error = %e, "failed to read response");
            return JobResult::failure(
                payload.execution_id,
                Some(code),
                format!("Failed to read response: {}", e),
            );
        }
    };

    if (200..300).contains(&code) {
        info!(worker = worker_id, job = %payload.name, code, "job completed");
        JobResult::success(payload.execution_id, code)
    } else {
        warn!(worker = worker_id, job = %payload.name, code, "job failed");
        JobResult::failure(
            payload.execution_id,
            Some(code),
            format!("HTTP status {}: {}", code, body_excerpt(&body)),
        )
    }
}

/// Truncate a response body for error messages, on a char boundary
fn body_excerpt(body: &str) -> &str {
    match body.char_indices().nth(BODY_EXCERPT_LEN) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// A pool of concurrently running workers
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
}

impl WorkerPool {
    /// Spawn `count` workers (at least one), staggered at startup so they do
    /// not stampede the broker
    pub async fn start(
        count: usize,
        queue: Arc<QueueService>,
        executions: Arc<dyn ExecutionRepositoryTrait>,
    ) -> Result<Self> {
        let count = count.max(1);
        let mut workers = Vec::with_capacity(count);

        for _ in 0..count {
            let worker = Arc::new(Worker::new(queue.clone(), executions.clone())?);

            let runner = worker.clone();
            tokio::spawn(async move {
                runner.run().await;
            });

            workers.push(worker);
            tokio::time::sleep(SPAWN_STAGGER).await;
        }

        info!(count, "worker pool started");
        Ok(Self { workers })
    }

    /// Ask every worker to stop after its current poll
    pub async fn stop(&self) {
        for worker in &self.workers {
            worker.stop().await;
        }
    }

    /// Number of workers in the pool
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionStatus, Job};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    fn payload_for(url: &str) -> JobPayload {
        let job = Job::new("user-1", "ping", url, "* * * * *");
        JobPayload::for_job(&job, Uuid::new_v4(), 3)
    }

    #[tokio::test]
    async fn test_2xx_classifies_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let payload = payload_for(&format!("{}/health", server.uri()));
        let result = execute_request(&test_client(), "worker-test", &payload).await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.response_code, Some(200));
        assert!(result.error_message.is_none());
    }

    #[tokio::test]
    async fn test_non_2xx_classifies_as_failed_with_body_excerpt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let payload = payload_for(&format!("{}/health", server.uri()));
        let result = execute_request(&test_client(), "worker-test", &payload).await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.response_code, Some(500));
        let message = result.error_message.unwrap();
        assert!(message.contains("HTTP status 500"));
        assert!(message.contains("upstream exploded"));
    }

    #[tokio::test]
    async fn test_transport_error_has_no_response_code() {
        // Port 1 refuses connections
        let payload = payload_for("http://127.0.0.1:1/health");
        let result = execute_request(&test_client(), "worker-test", &payload).await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.response_code.is_none());
        assert!(result.error_message.unwrap().starts_with("HTTP request failed"));
    }

    #[tokio::test]
    async fn test_pre_dispatch_failure_on_bad_url() {
        let mut payload = payload_for("http://127.0.0.1/health");
        payload.url = "::not a url::".to_string();

        let result = execute_request(&test_client(), "worker-test", &payload).await;

        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.response_code.is_none());
        assert!(result.error_message.unwrap().starts_with("Failed to build request"));
    }

    #[tokio::test]
    async fn test_payload_headers_reach_the_target() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(wiremock::matchers::header("x-cronnect", "yes"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let mut payload = payload_for(&format!("{}/hook", server.uri()));
        payload.method = "POST".to_string();
        payload.headers = Some(
            [("x-cronnect".to_string(), "yes".to_string())]
                .into_iter()
                .collect(),
        );
        payload.body = Some("{}".to_string());

        let result = execute_request(&test_client(), "worker-test", &payload).await;

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.response_code, Some(204));
    }

    #[test]
    fn test_body_excerpt_truncates_on_char_boundary() {
        let short = "ok";
        assert_eq!(body_excerpt(short), "ok");

        let long = "é".repeat(BODY_EXCERPT_LEN + 50);
        let excerpt = body_excerpt(&long);
        assert_eq!(excerpt.chars().count(), BODY_EXCERPT_LEN);
    }
}
