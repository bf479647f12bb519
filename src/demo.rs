//! One complete capture session against the synthetic camera and the
//! in-memory remote service

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::info;

use crate::config::Config;
use crate::device::{DeviceConfig, MediaDevices, SyntheticCamera};
use crate::host::{HostContext, LoggingShell};
use crate::notify::{LogNotifier, Notifier, RelayNotifier};
use crate::recording::TimedRecorder;
use crate::remote::InMemoryService;
use crate::still::StillCapture;
use crate::submission::{
    Collaborators, Step, SubjectIdentity, SubmissionOrchestrator, SubmissionRecord,
};

/// How long to wait for the background uploads after the photo
const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
pub struct DemoOutcome {
    pub step: Step,
    pub record: Option<SubmissionRecord>,
    pub close_requested: bool,
}

fn demo_subject() -> SubjectIdentity {
    SubjectIdentity {
        id: 100_200_300,
        first_name: "Demo".to_string(),
        last_name: Some("Subject".to_string()),
        username: Some("demo_subject".to_string()),
        language_code: Some("en".to_string()),
        is_premium: None,
    }
}

/// Record, photograph, submit and close
///
/// `hide_after` simulates the page losing visibility mid-recording.
pub async fn run_demo(config: &Config, hide_after: Option<Duration>) -> Result<DemoOutcome> {
    let devices = Arc::new(MediaDevices::new(
        Arc::new(SyntheticCamera::new()),
        DeviceConfig {
            frame_rate: config.capture.frame_rate,
            ..DeviceConfig::default()
        },
    ));
    let service = Arc::new(InMemoryService::new());
    let shell = Arc::new(LoggingShell::default());
    let notifier: Arc<dyn Notifier> = match config.notify.relay_url.as_deref() {
        Some(url) if !url.is_empty() => Arc::new(RelayNotifier::new(url)),
        _ => Arc::new(LogNotifier),
    };

    let host = HostContext::new(
        demo_subject(),
        json!({ "platform": "demo", "version": env!("CARGO_PKG_VERSION") }),
    );
    let orchestrator = SubmissionOrchestrator::start(
        host,
        config.submission(),
        Collaborators {
            store: service.clone(),
            storage: service.clone(),
            notifier,
            shell: shell.clone(),
        },
    );

    let (recorder, segments) = TimedRecorder::new(Arc::clone(&devices), config.recorder());
    let (mut still, images) = StillCapture::new(Arc::clone(&devices), recorder.recording_flag());
    let forwarding = orchestrator.attach(segments, images);

    recorder.start().await.context("Recording failed to start")?;

    if let Some(after) = hide_after {
        sleep(after).await;
        info!("Simulating page hidden after {:?}", after);
        recorder.page_hidden();
    }
    orchestrator.wait_for_step(Step::CapturingDocument).await;

    still.go_live().await.context("Document preview failed")?;
    still.capture().await.context("Document capture failed")?;

    let step = match timeout(SETTLE_TIMEOUT, orchestrator.wait_for_step(Step::Done)).await {
        Ok(step) => step,
        Err(_) => bail!("Submission did not complete within {:?}", SETTLE_TIMEOUT),
    };
    orchestrator.wait_idle().await;

    let close_requested = orchestrator.close();

    recorder.shutdown().await;
    still.shutdown();
    drop(recorder);
    drop(still);
    forwarding.await.context("Forwarding task failed")?;

    let record = orchestrator
        .record_id()
        .and_then(|id| service.record(&id));

    Ok(DemoOutcome {
        step,
        record,
        close_requested,
    })
}
