//! End-to-end pipeline scenario through the public API: a fresh session is
//! started, the plan stage succeeds, the preparation stage times out, and a
//! later status poll resumes the run to completion without regenerating the
//! plan.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use docflow::{
    AlertSink, ConcurrencyGuard, FailureReporter, GenerationError, GenerationService,
    MemoryStore, Orchestrator, ProgressStore, SessionId, Stage, StageGenerator, StageGenerators,
    StageTimeout,
};
use docflow_reporter::{ReporterError, StageFailureAlert};
use docflow_server::{SessionStatus, StartStatus};

enum Script {
    Succeed(&'static [u8]),
    Hang,
}

struct ScriptedGenerator {
    stage: Stage,
    script: Mutex<VecDeque<Script>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedGenerator {
    fn new(stage: Stage, script: Vec<Script>, calls: Arc<AtomicUsize>) -> Arc<Self> {
        Arc::new(Self {
            stage,
            script: Mutex::new(script.into()),
            calls,
        })
    }
}

#[async_trait]
impl StageGenerator for ScriptedGenerator {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn generate(&self, _session_id: &SessionId) -> Result<Vec<u8>, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Script::Succeed(bytes)) => Ok(bytes.to_vec()),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(600)).await;
                Ok(b"too late".to_vec())
            }
            None => panic!("generator for {} called more times than scripted", self.stage),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<StageFailureAlert>>,
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn deliver(&self, alert: &StageFailureAlert) -> Result<(), ReporterError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

async fn wait_until<F>(mut condition: F, what: &str)
where
    F: AsyncFnMut() -> bool,
{
    for _ in 0..400 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

#[tokio::test]
async fn stalled_pipeline_is_resumed_by_status_poll() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(RecordingSink::default());

    let plan_calls = Arc::new(AtomicUsize::new(0));
    let prep_calls = Arc::new(AtomicUsize::new(0));
    let summary_calls = Arc::new(AtomicUsize::new(0));

    // Preparation hangs past the stage deadline on its first call, then
    // succeeds when the run is resumed.
    let generators = StageGenerators::new(
        ScriptedGenerator::new(
            Stage::Plan,
            vec![Script::Succeed(b"plan-v1")],
            Arc::clone(&plan_calls),
        ),
        ScriptedGenerator::new(
            Stage::Preparation,
            vec![Script::Hang, Script::Succeed(b"prep-v1")],
            Arc::clone(&prep_calls),
        ),
        ScriptedGenerator::new(
            Stage::ClinicianSummary,
            vec![Script::Succeed(b"summary-v1")],
            Arc::clone(&summary_calls),
        ),
    );

    let orchestrator = Orchestrator::new(
        store.clone() as Arc<dyn ProgressStore>,
        generators,
        ConcurrencyGuard::new(),
        FailureReporter::new(sink.clone()),
        StageTimeout {
            duration: Duration::from_millis(100),
        },
    );
    let service = GenerationService::new(orchestrator);

    let session = SessionId::parse("sess-s1").unwrap();
    store.create(&session).await.unwrap();

    // Fresh session: start launches a detached run.
    let response = service.start(&session).await.unwrap();
    assert_eq!(response.status, StartStatus::Started);

    // The run generates the plan, then stalls out in preparation.
    wait_until(
        async || {
            store
                .fetch(&session)
                .await
                .unwrap()
                .failed_stage
                .is_some()
        },
        "first run to stop at preparation",
    )
    .await;

    let record = store.fetch(&session).await.unwrap();
    assert!(record.plan_generated);
    assert!(!record.preparation_generated);
    assert!(!record.completed);
    assert!(record.completed_at.is_none());
    assert_eq!(record.failed_stage, Some(Stage::Preparation));
    assert!(record.last_error.as_ref().unwrap().contains("timed out"));

    {
        let alerts = sink.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1, "exactly one alert for the failed run");
        assert_eq!(alerts[0].stage, Stage::Preparation);
    }

    // A status poll notices the stalled run and relaunches it.
    let status = service.status(&session).await.unwrap();
    assert_eq!(status.status, SessionStatus::InProgress);
    assert!(status.stages.plan);
    assert!(!status.stages.preparation);

    wait_until(
        async || store.fetch(&session).await.unwrap().completed,
        "resumed run to complete",
    )
    .await;

    // The plan was skipped, not regenerated; the artifact is untouched.
    assert_eq!(plan_calls.load(Ordering::SeqCst), 1);
    assert_eq!(prep_calls.load(Ordering::SeqCst), 2);
    assert_eq!(summary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        store
            .load_artifact(&session, Stage::Plan)
            .await
            .unwrap()
            .unwrap(),
        b"plan-v1"
    );

    // Terminal state: further polls and starts touch nothing.
    let response = service.start(&session).await.unwrap();
    assert_eq!(response.status, StartStatus::Completed);
    let status = service.status(&session).await.unwrap();
    assert_eq!(status.status, SessionStatus::Completed);
    assert!(status.completed_at.is_some());
    assert!(status.failed_stage.is_none());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(plan_calls.load(Ordering::SeqCst), 1);
    assert_eq!(prep_calls.load(Ordering::SeqCst), 2);
    assert_eq!(summary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.alerts.lock().unwrap().len(), 1);
}
