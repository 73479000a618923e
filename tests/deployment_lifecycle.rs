//! Deployment lifecycle tests against an in-memory container runtime.
//!
//! The fake runtime plays the part of a template image: when a container starts, a
//! script runs against the bind-mounted state directory and decides how the container
//! ends. No Docker daemon is needed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use doozer::container::{
    CompletionStrategy, ContainerConfig, ContainerError, ContainerInspection, ContainerRuntime,
    ContainerStatus, ContainerSummary, ImageInfo, LabelFilter, RuntimeEvent,
};
use doozer::deployment::{
    DeployOutcome, Deployer, DeploymentError, DeploymentState, Parameters, StateDirectoryManager,
};
use doozer::template::{Template, TemplateCatalog};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const IMAGE: &str = "template/do-docker:latest";
const IMAGE_ID: &str = "sha256:5d1a2a0f";

/// How a fake container run ends.
struct Run {
    /// `None` keeps the container running forever
    exit_code: Option<i64>,
    /// Time between start and exit
    delay: Duration,
    log: String,
}

impl Run {
    fn exit(code: i64, log: &str) -> Self {
        Self {
            exit_code: Some(code),
            delay: Duration::ZERO,
            log: log.to_string(),
        }
    }

    fn forever() -> Self {
        Self {
            exit_code: None,
            delay: Duration::ZERO,
            log: "still provisioning\n".to_string(),
        }
    }
}

type Script = dyn Fn(&Path) -> Run + Send + Sync;

struct FakeContainer {
    config: ContainerConfig,
    started: bool,
    started_at: Option<DateTime<Utc>>,
    exit_code: Option<i64>,
    exits_at: Option<Instant>,
    log: String,
}

impl FakeContainer {
    fn status(&self) -> ContainerStatus {
        match (self.started, self.exits_at) {
            (false, _) => ContainerStatus::Created,
            (true, Some(at)) if Instant::now() >= at => ContainerStatus::Exited,
            (true, _) => ContainerStatus::Running,
        }
    }
}

struct FakeRuntime {
    images: Vec<ImageInfo>,
    script: Box<Script>,
    fail_start: bool,
    fail_remove: bool,
    fail_list: AtomicBool,
    /// Number of upcoming inspections that fail with a connection error
    inspect_failures: AtomicUsize,
    /// The event stream fails instead of reporting `die`
    fail_events: bool,
    next_id: AtomicUsize,
    containers: Mutex<BTreeMap<String, FakeContainer>>,
    created: Mutex<Vec<ContainerConfig>>,
    removed: Mutex<Vec<String>>,
    events_since: Mutex<Vec<DateTime<Utc>>>,
}

impl FakeRuntime {
    fn new<F>(script: F) -> Self
    where
        F: Fn(&Path) -> Run + Send + Sync + 'static,
    {
        Self {
            images: vec![ImageInfo {
                id: IMAGE_ID.to_string(),
                repo_tags: vec![IMAGE.to_string()],
                size: 1024,
                created: 0,
            }],
            script: Box::new(script),
            fail_start: false,
            fail_remove: false,
            fail_list: AtomicBool::new(false),
            inspect_failures: AtomicUsize::new(0),
            fail_events: false,
            next_id: AtomicUsize::new(1),
            containers: Mutex::new(BTreeMap::new()),
            created: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            events_since: Mutex::new(Vec::new()),
        }
    }

    fn created(&self) -> Vec<ContainerConfig> {
        self.created.lock().unwrap().clone()
    }

    fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    fn live_containers(&self) -> usize {
        self.containers.lock().unwrap().len()
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list_images(&self) -> Result<Vec<ImageInfo>, ContainerError> {
        Ok(self.images.clone())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String, ContainerError> {
        let mut containers = self.containers.lock().unwrap();
        if containers.values().any(|c| c.config.name == config.name) {
            return Err(ContainerError::Other(format!(
                "Conflict: name {:?} already in use",
                config.name
            )));
        }

        let id = format!("c{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        containers.insert(
            id.clone(),
            FakeContainer {
                config: config.clone(),
                started: false,
                started_at: None,
                exit_code: None,
                exits_at: None,
                log: String::new(),
            },
        );
        self.created.lock().unwrap().push(config.clone());
        Ok(id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), ContainerError> {
        if self.fail_start {
            return Err(ContainerError::Other("OCI runtime create failed".to_string()));
        }

        let state_dir = {
            let containers = self.containers.lock().unwrap();
            let container = containers
                .get(container_id)
                .ok_or_else(|| ContainerError::NotFound(container_id.to_string()))?;
            container
                .config
                .bind_sources()
                .next()
                .map(String::from)
                .unwrap_or_default()
        };

        let run = (self.script)(Path::new(&state_dir));

        let mut containers = self.containers.lock().unwrap();
        let container = containers
            .get_mut(container_id)
            .ok_or_else(|| ContainerError::NotFound(container_id.to_string()))?;
        container.started = true;
        container.started_at = Some(Utc::now());
        container.exit_code = run.exit_code;
        container.exits_at = run.exit_code.map(|_| Instant::now() + run.delay);
        container.log = run.log;
        Ok(())
    }

    async fn inspect_container(&self, container_id: &str) -> Result<ContainerInspection, ContainerError> {
        let failing = self
            .inspect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ContainerError::ConnectionError(
                "connection reset by peer".to_string(),
            ));
        }

        let containers = self.containers.lock().unwrap();
        let container = containers
            .get(container_id)
            .ok_or_else(|| ContainerError::NotFound(container_id.to_string()))?;

        let status = container.status();
        Ok(ContainerInspection {
            id: container_id.to_string(),
            exit_code: (status == ContainerStatus::Exited)
                .then_some(container.exit_code)
                .flatten(),
            status,
        })
    }

    async fn container_logs(&self, container_id: &str) -> Result<String, ContainerError> {
        self.containers
            .lock()
            .unwrap()
            .get(container_id)
            .map(|c| c.log.clone())
            .ok_or_else(|| ContainerError::NotFound(container_id.to_string()))
    }

    async fn remove_container(&self, container_id: &str, _force: bool) -> Result<(), ContainerError> {
        if self.fail_remove {
            return Err(ContainerError::Other("removal in progress".to_string()));
        }

        self.containers
            .lock()
            .unwrap()
            .remove(container_id)
            .ok_or_else(|| ContainerError::NotFound(container_id.to_string()))?;
        self.removed.lock().unwrap().push(container_id.to_string());
        Ok(())
    }

    async fn list_containers(&self, filter: &LabelFilter) -> Result<Vec<ContainerSummary>, ContainerError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ContainerError::ConnectionError("daemon unavailable".to_string()));
        }

        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|(_, c)| filter.matches(&c.config.labels))
            .map(|(id, c)| {
                let state = c.status();
                ContainerSummary {
                    id: id.clone(),
                    labels: c.config.labels.clone(),
                    state,
                    // Forces the repository to recover it through inspection.
                    exit_code: None,
                }
            })
            .collect())
    }

    fn container_events<'a>(
        &'a self,
        container_id: &str,
        since: DateTime<Utc>,
    ) -> BoxStream<'a, Result<RuntimeEvent, ContainerError>> {
        self.events_since.lock().unwrap().push(since);
        if self.fail_events {
            return stream::once(async {
                Err(ContainerError::ConnectionError("event stream reset".to_string()))
            })
            .boxed();
        }

        let exits_at = self
            .containers
            .lock()
            .unwrap()
            .get(container_id)
            .and_then(|c| c.exits_at);

        match exits_at {
            Some(at) => stream::once(async move {
                tokio::time::sleep_until(at).await;
                Ok(RuntimeEvent {
                    action: "die".to_string(),
                })
            })
            .boxed(),
            None => stream::pending().boxed(),
        }
    }
}

fn deployer(runtime: &Arc<FakeRuntime>, root: &TempDir, strategy: CompletionStrategy) -> Deployer {
    let state_dirs = StateDirectoryManager::new(root.path(), root.path()).unwrap();
    Deployer::new(runtime.clone(), state_dirs, strategy)
}

fn polling(timeout_secs: u64) -> CompletionStrategy {
    CompletionStrategy::Polling {
        poll_interval_secs: 1,
        timeout_secs,
    }
}

fn parameters(pairs: &[(&str, &str)]) -> Parameters {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Behaves like a template that echoes `app_name` back as an output.
fn write_outputs_from_parameters(state_dir: &Path) {
    let raw = fs::read_to_string(state_dir.join("tfvars.json")).unwrap();
    let params: Parameters = serde_json::from_str(&raw).unwrap();
    let app_name = params.get("app_name").cloned().unwrap_or_default();

    fs::create_dir_all(state_dir.join("logs")).unwrap();
    fs::write(
        state_dir.join("logs").join("apply.log"),
        format!("Applying {}\n", app_name),
    )
    .unwrap();
    fs::write(
        state_dir.join("terraform.output.json"),
        serde_json::json!({
            "app_name": { "sensitive": false, "type": "string", "value": app_name }
        })
        .to_string(),
    )
    .unwrap();
}

#[tokio::test]
async fn test_missing_image_creates_nothing() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::exit(0, "")));
    let deployer = deployer(&runtime, &root, polling(60));

    let result = deployer
        .deploy("missing-1", "missing:tag", &Parameters::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.outcome,
        DeployOutcome::ImageNotFound {
            image: "missing:tag".to_string()
        }
    );
    assert!(result.container_id.is_none());
    assert!(runtime.created().is_empty());
    assert!(!root.path().join("missing-1").join("logs").exists());
}

#[tokio::test]
async fn test_successful_deployment() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|state_dir| {
        write_outputs_from_parameters(state_dir);
        Run::exit(0, "Apply complete! Resources: 2 added.\n")
    }));
    let deployer = deployer(&runtime, &root, polling(60));

    let result = deployer
        .deploy("web-1", IMAGE, &parameters(&[("app_name", "demo")]))
        .await
        .unwrap();

    assert!(result.success, "unexpected outcome {:?}", result.outcome);
    assert_eq!(result.outcome, DeployOutcome::Succeeded);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.log, "Apply complete! Resources: 2 added.\n");
    assert_eq!(result.outputs.get("app_name").unwrap().value, "demo");
    assert_eq!(result.logs.len(), 1);
    assert_eq!(result.logs[0].name, "apply.log");
    assert_eq!(result.log_entries().last().unwrap().name, "container.log");

    let container_id = result.container_id.clone().unwrap();
    assert_eq!(runtime.removed(), vec![container_id]);
    assert!(deployer.get_deployment("web-1").await.is_none());
    assert!(deployer.list_deployments().await.is_empty());
}

#[tokio::test]
async fn test_container_configuration() {
    let local = TempDir::new().unwrap();
    let host = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::exit(0, "")));
    let state_dirs = StateDirectoryManager::new(local.path(), host.path()).unwrap();
    let deployer = Deployer::new(runtime.clone(), state_dirs, polling(60));

    deployer
        .deploy("bind-1", IMAGE, &parameters(&[("region", "nyc3")]))
        .await
        .unwrap();

    let created = runtime.created();
    assert_eq!(created.len(), 1);
    let config = &created[0];

    assert_eq!(config.name.as_deref(), Some("deploy-bind-1"));
    assert_eq!(config.image, IMAGE_ID);
    assert_eq!(
        config.binds,
        vec![format!("{}:/root/state", host.path().join("bind-1").display())]
    );
    assert_eq!(config.labels["deployment.id"], "bind-1");
    assert_eq!(config.labels["deployment.image.tag"], IMAGE);
    assert_eq!(config.labels["task.type"], "deployment");

    // Parameters are written through the local view, the runtime sees the host view.
    let raw = fs::read_to_string(local.path().join("bind-1").join("tfvars.json")).unwrap();
    assert_eq!(raw, r#"{"region":"nyc3"}"#);
    assert!(host.path().join("bind-1").is_dir());
}

#[tokio::test]
async fn test_failed_deployment_keeps_log() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| {
        Run::exit(1, "Error: No valid credential sources found\n")
    }));
    let deployer = deployer(&runtime, &root, polling(60));

    let result = deployer
        .deploy("broken-1", IMAGE, &Parameters::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.outcome, DeployOutcome::Failed { exit_code: Some(1) });
    assert!(result.log.contains("No valid credential sources"));
    assert!(result.outputs.is_empty());
    assert_eq!(runtime.removed().len(), 1);
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_timeout_leaves_container() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::forever()));
    let deployer = deployer(&runtime, &root, polling(0));

    let result = deployer
        .deploy("slow-1", IMAGE, &Parameters::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.outcome, DeployOutcome::TimedOut);
    assert_eq!(result.log, "still provisioning\n");
    assert!(runtime.removed().is_empty());

    let deployment = deployer.get_deployment("slow-1").await.unwrap();
    assert_eq!(deployment.state, DeploymentState::Running);
    assert_eq!(Some(deployment.container_id), result.container_id);
}

#[tokio::test]
async fn test_concurrent_deployments_are_isolated() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|state_dir| {
        write_outputs_from_parameters(state_dir);
        Run {
            exit_code: Some(0),
            delay: Duration::from_millis(100),
            log: String::new(),
        }
    }));
    let deployer = deployer(&runtime, &root, CompletionStrategy::Events);

    let first_params = parameters(&[("app_name", "first")]);
    let second_params = parameters(&[("app_name", "second")]);
    let (first, second) = tokio::join!(
        deployer.deploy("app-first", IMAGE, &first_params),
        deployer.deploy("app-second", IMAGE, &second_params),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(first.success && second.success);
    assert_eq!(first.outputs.get("app_name").unwrap().value, "first");
    assert_eq!(second.outputs.get("app_name").unwrap().value, "second");
    assert_eq!(first.logs[0].content, "Applying first\n");
    assert_eq!(second.logs[0].content, "Applying second\n");
    assert_ne!(first.container_id, second.container_id);
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_cancellation_removes_container() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::forever()));
    let deployer = deployer(&runtime, &root, polling(3600));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        deployer.deploy_with_cancellation("cancel-1", IMAGE, &Parameters::new(), cancel),
    )
    .await
    .expect("cancellation did not interrupt the wait")
    .unwrap();

    assert!(!result.success);
    assert_eq!(result.outcome, DeployOutcome::Cancelled);
    assert_eq!(result.log, "still provisioning\n");
    assert_eq!(runtime.removed(), vec![result.container_id.unwrap()]);
    assert!(deployer.get_deployment("cancel-1").await.is_none());
}

#[tokio::test]
async fn test_lookup_by_label() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::forever()));
    let deployer = deployer(&runtime, &root, polling(0));

    for id in ["alpha", "alpha-2", "beta"] {
        deployer.deploy(id, IMAGE, &Parameters::new()).await.unwrap();
    }

    let mut ids: Vec<_> = deployer
        .list_deployments()
        .await
        .into_iter()
        .map(|d| d.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["alpha", "alpha-2", "beta"]);

    let alpha = deployer.get_deployment("alpha").await.unwrap();
    assert_eq!(alpha.id, "alpha");
    assert_eq!(alpha.image_tag.as_deref(), Some(IMAGE));
    assert!(deployer.get_deployment("alph").await.is_none());
    assert!(deployer.get_deployment("gamma").await.is_none());
}

#[tokio::test]
async fn test_finished_deployment_lookup_reads_state() {
    let root = TempDir::new().unwrap();
    let mut fake = FakeRuntime::new(|state_dir| {
        write_outputs_from_parameters(state_dir);
        Run::exit(0, "done\n")
    });
    fake.fail_remove = true;
    let runtime = Arc::new(fake);
    let deployer = deployer(&runtime, &root, polling(60));

    let result = deployer
        .deploy("kept-1", IMAGE, &parameters(&[("app_name", "kept")]))
        .await
        .unwrap();
    // Removal failures are only logged.
    assert!(result.success);

    let deployment = deployer.get_deployment("kept-1").await.unwrap();
    assert_eq!(deployment.state, DeploymentState::Successful);
    assert_eq!(deployment.outputs.get("app_name").unwrap().value, "kept");

    let names: Vec<_> = deployment.logs.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["apply.log", "container.log"]);
    assert_eq!(deployment.logs[1].content, "done\n");

    // Listings skip the container log download.
    let listed = deployer.list_deployments().await;
    assert_eq!(listed.len(), 1);
    let names: Vec<_> = listed[0].logs.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["apply.log"]);
    assert_eq!(listed[0].outputs.get("app_name").unwrap().value, "kept");
}

#[tokio::test]
async fn test_start_failure_removes_created_container() {
    let root = TempDir::new().unwrap();
    let mut fake = FakeRuntime::new(|_| Run::exit(0, ""));
    fake.fail_start = true;
    let runtime = Arc::new(fake);
    let deployer = deployer(&runtime, &root, polling(60));

    let result = deployer
        .deploy("nostart-1", IMAGE, &Parameters::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(matches!(result.outcome, DeployOutcome::RuntimeError { .. }));
    assert_eq!(runtime.removed(), vec![result.container_id.unwrap()]);

    // The name is free again.
    assert!(
        !deployer
            .deploy("nostart-1", IMAGE, &Parameters::new())
            .await
            .unwrap()
            .success
    );
    assert_eq!(runtime.created().len(), 2);
}

#[tokio::test]
async fn test_malformed_outputs_fail_deployment() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|state_dir| {
        fs::write(state_dir.join("terraform.output.json"), "{\"truncated\": ").unwrap();
        Run::exit(0, "wrote outputs\n")
    }));
    let deployer = deployer(&runtime, &root, polling(60));

    let result = deployer
        .deploy("garbled-1", IMAGE, &Parameters::new())
        .await
        .unwrap();

    assert!(!result.success);
    assert!(matches!(result.outcome, DeployOutcome::Error { .. }));
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.log, "wrote outputs\n");
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::exit(0, "")));
    let deployer = deployer(&runtime, &root, polling(60));

    let result = deployer.deploy("../escape", IMAGE, &Parameters::new()).await;
    assert!(matches!(result, Err(DeploymentError::InvalidDeploymentId(_))));

    let result = deployer.deploy("ok-id", "  ", &Parameters::new()).await;
    assert!(matches!(result, Err(DeploymentError::InvalidImage)));

    assert!(runtime.created().is_empty());
    assert!(!root.path().join("ok-id").exists());
}

#[tokio::test]
async fn test_deploy_template() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::exit(0, "ok\n")));
    let deployer = deployer(&runtime, &root, polling(60));
    let catalog = TemplateCatalog::with_templates(vec![Template {
        id: 2,
        name: "DigitalOcean droplet".to_string(),
        image: IMAGE.to_string(),
        parameters: Vec::new(),
    }]);

    let result = deployer
        .deploy_template(&catalog, 2, "tpl-1", &Parameters::new(), CancellationToken::new())
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(runtime.created()[0].labels["deployment.image.tag"], IMAGE);

    let result = deployer
        .deploy_template(&catalog, 99, "tpl-2", &Parameters::new(), CancellationToken::new())
        .await
        .unwrap();
    assert!(!result.success);
    assert_eq!(result.outcome, DeployOutcome::TemplateNotFound { template_id: 99 });
    assert_eq!(runtime.created().len(), 1);
}

#[tokio::test]
async fn test_parameter_write_failure_creates_nothing() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::exit(0, "")));
    let deployer = deployer(&runtime, &root, polling(60));

    // A directory where the parameters file should go makes the write fail.
    fs::create_dir_all(root.path().join("params-1").join("tfvars.json")).unwrap();

    let result = deployer
        .deploy("params-1", IMAGE, &parameters(&[("app_name", "demo")]))
        .await
        .unwrap();

    assert!(!result.success);
    match &result.outcome {
        DeployOutcome::Error { message } => assert!(message.contains("tfvars.json")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(result.container_id.is_none());
    assert!(runtime.created().is_empty());
}

#[tokio::test]
async fn test_listing_failure_is_downgraded() {
    let root = TempDir::new().unwrap();
    let runtime = Arc::new(FakeRuntime::new(|_| Run::forever()));
    let deployer = deployer(&runtime, &root, polling(0));

    deployer.deploy("hidden-1", IMAGE, &Parameters::new()).await.unwrap();
    assert_eq!(deployer.list_deployments().await.len(), 1);

    runtime.fail_list.store(true, Ordering::SeqCst);

    assert!(deployer.list_deployments().await.is_empty());
    assert!(deployer.get_deployment("hidden-1").await.is_none());
}

#[tokio::test]
async fn test_transient_inspect_failure_is_retried() {
    let root = TempDir::new().unwrap();
    let fake = FakeRuntime::new(|_| Run::exit(0, "applied\n"));
    fake.inspect_failures.store(1, Ordering::SeqCst);
    let runtime = Arc::new(fake);
    let deployer = deployer(&runtime, &root, polling(60));

    let result = deployer
        .deploy("flaky-1", IMAGE, &Parameters::new())
        .await
        .unwrap();

    assert!(result.success, "unexpected outcome {:?}", result.outcome);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.log, "applied\n");
    assert_eq!(runtime.inspect_failures.load(Ordering::SeqCst), 0);
    assert_eq!(runtime.removed(), vec![result.container_id.unwrap()]);
}

#[tokio::test]
async fn test_watch_failure_collects_and_removes() {
    let root = TempDir::new().unwrap();
    let mut fake = FakeRuntime::new(|_| Run::forever());
    fake.fail_events = true;
    let runtime = Arc::new(fake);
    let deployer = deployer(&runtime, &root, CompletionStrategy::Events);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        deployer.deploy("lost-1", IMAGE, &Parameters::new()),
    )
    .await
    .expect("watch failure did not end the deployment")
    .unwrap();

    assert!(!result.success);
    match &result.outcome {
        DeployOutcome::RuntimeError { message } => assert!(message.contains("event stream reset")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(result.log, "still provisioning\n");
    assert_eq!(runtime.removed(), vec![result.container_id.unwrap()]);
    assert_eq!(runtime.live_containers(), 0);
}

#[tokio::test]
async fn test_event_replay_starts_before_container_start() {
    let root = TempDir::new().unwrap();
    let mut fake = FakeRuntime::new(|_| Run::exit(0, ""));
    fake.fail_remove = true;
    let runtime = Arc::new(fake);
    let deployer = deployer(&runtime, &root, CompletionStrategy::Events);

    let result = deployer
        .deploy("replay-1", IMAGE, &Parameters::new())
        .await
        .unwrap();
    assert!(result.success);

    let since = runtime.events_since.lock().unwrap().clone();
    let started_at = runtime
        .containers
        .lock()
        .unwrap()
        .values()
        .find_map(|c| c.started_at)
        .unwrap();
    assert_eq!(since.len(), 1);
    assert!(since[0] <= started_at);
}
