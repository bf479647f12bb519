mod common;

use anyhow::Result;
use common::{
    camera, collaborators, host, image, in_memory, segment, PendingService, RecordingNotifier,
    SlowBucket,
};
use kyc_capture::device::SyntheticBehavior;
use kyc_capture::host::{Locale, LoggingShell};
use kyc_capture::notify::TemplateKind;
use kyc_capture::recording::{RecorderConfig, TimedRecorder};
use kyc_capture::remote::InMemoryService;
use kyc_capture::still::StillCapture;
use kyc_capture::submission::{
    Step, SubmissionConfig, SubmissionOrchestrator, SubmissionStatus, UploadPhase,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

struct Harness {
    service: Arc<InMemoryService>,
    notifier: Arc<RecordingNotifier>,
    shell: Arc<LoggingShell>,
    orchestrator: SubmissionOrchestrator,
}

fn harness(
    service: InMemoryService,
    notifier: RecordingNotifier,
    config: SubmissionConfig,
) -> Harness {
    let service = Arc::new(service);
    let notifier = Arc::new(notifier);
    let shell = Arc::new(LoggingShell::default());
    let orchestrator =
        SubmissionOrchestrator::start(host(), config, in_memory(&service, &notifier, &shell));

    Harness {
        service,
        notifier,
        shell,
        orchestrator,
    }
}

/// Bounded wait; generous enough to cover a full recording under paused time
async fn reach(orchestrator: &SubmissionOrchestrator, step: Step) -> Step {
    timeout(Duration::from_secs(60), orchestrator.wait_for_step(step))
        .await
        .expect("step reached in time")
}

#[tokio::test]
async fn test_step_advances_before_network_settles() -> Result<()> {
    let pending = Arc::new(PendingService);
    let notifier = Arc::new(RecordingNotifier::default());
    let shell = Arc::new(LoggingShell::default());
    let orchestrator = SubmissionOrchestrator::start(
        host(),
        SubmissionConfig::default(),
        collaborators(pending.clone(), pending, notifier.clone(), shell),
    );
    assert_eq!(orchestrator.step(), Step::CapturingVideo);

    orchestrator.on_video_segment(segment());
    assert_eq!(orchestrator.step(), Step::CapturingDocument);

    orchestrator.on_document_image(image());
    let waited = timeout(
        Duration::from_millis(200),
        orchestrator.wait_for_step(Step::Done),
    )
    .await;
    assert!(waited.is_err(), "done must wait for the combined update");
    assert_eq!(orchestrator.step(), Step::CapturingDocument);
    assert!(orchestrator.record_id().is_none());
    assert!(notifier.sent().is_empty());

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_end_to_end_submission() -> Result<()> {
    let h = harness(
        InMemoryService::new(),
        RecordingNotifier::default(),
        SubmissionConfig::default(),
    );
    let (camera, devices) = camera(SyntheticBehavior::Grant);
    let (recorder, segments) = TimedRecorder::new(devices.clone(), RecorderConfig::default());
    let (mut still, images) = StillCapture::new(devices, recorder.recording_flag());
    h.orchestrator.attach(segments, images);

    recorder.start().await?;
    assert_eq!(
        reach(&h.orchestrator, Step::CapturingDocument).await,
        Step::CapturingDocument
    );

    still.go_live().await?;
    still.capture().await?;
    assert_eq!(reach(&h.orchestrator, Step::Done).await, Step::Done);
    h.orchestrator.wait_idle().await;

    let id = h.orchestrator.record_id().expect("record id");
    let record = h.service.record(&id).expect("stored record");
    assert_eq!(record.status, SubmissionStatus::Submitted);
    assert_eq!(record.subject_id, 5001);

    let video = record.video_url.expect("video reference");
    assert!(video.starts_with("memory://storage/object/public/videos/public/5001_"));
    assert!(video.ends_with(".webm"));
    let document = record.document_url.expect("document reference");
    assert!(document.starts_with("memory://storage/object/public/passports/public/5001_"));
    assert!(document.ends_with(".png"));

    assert_eq!(record.meta["platform"], "ios");
    assert!(record.meta["ts"].is_string());

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "5001");
    assert_eq!(sent[0].locale, Locale::Uk);
    assert_eq!(sent[0].text, TemplateKind::Submitted.text(Locale::Uk));
    assert!(h.notifier.media().is_empty());

    assert_eq!(h.orchestrator.phase(), UploadPhase::Idle);
    assert_eq!(camera.open_streams(), 0);

    assert!(h.orchestrator.close());
    assert_eq!(h.shell.close_requests(), 1);

    Ok(())
}

#[tokio::test]
async fn test_signed_url_fallback() -> Result<()> {
    let h = harness(
        InMemoryService::new().without_public_urls(),
        RecordingNotifier::default(),
        SubmissionConfig::default(),
    );

    h.orchestrator.on_video_segment(segment());
    h.orchestrator.on_document_image(image());
    reach(&h.orchestrator, Step::Done).await;
    h.orchestrator.wait_idle().await;

    let id = h.orchestrator.record_id().expect("record id");
    let record = h.service.record(&id).expect("stored record");

    let video = record.video_url.expect("video reference");
    assert!(video.contains("/object/sign/videos/public/5001_"));
    assert!(video.ends_with("expires_in=31536000"));
    let document = record.document_url.expect("document reference");
    assert!(document.contains("/object/sign/passports/public/5001_"));

    Ok(())
}

#[tokio::test]
async fn test_record_created_lazily_after_failed_start() -> Result<()> {
    let service = InMemoryService::new();
    service.fail_next_creates(1);
    let h = harness(service, RecordingNotifier::default(), SubmissionConfig::default());

    h.orchestrator.on_video_segment(segment());
    h.orchestrator.on_document_image(image());
    reach(&h.orchestrator, Step::Done).await;
    h.orchestrator.wait_idle().await;

    assert_eq!(h.service.create_attempts(), 2);
    let records = h.service.records();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(h.orchestrator.record_id().as_deref(), Some(record.id.as_str()));
    assert_eq!(record.meta["created_late"], json!(true));
    assert!(record.video_url.is_some());
    assert!(record.document_url.is_some());
    assert_eq!(record.status, SubmissionStatus::Submitted);
    assert_eq!(h.notifier.sent().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_unpersisted_submission_never_reaches_done() -> Result<()> {
    let service = InMemoryService::new();
    service.fail_next_creates(usize::MAX);
    let h = harness(service, RecordingNotifier::default(), SubmissionConfig::default());

    h.orchestrator.on_video_segment(segment());
    h.orchestrator.on_document_image(image());
    h.orchestrator.wait_idle().await;

    assert_eq!(h.orchestrator.step(), Step::CapturingDocument);
    assert!(h.orchestrator.record_id().is_none());
    // Initial insert plus one lazy attempt; no eager retries
    assert_eq!(h.service.create_attempts(), 2);
    assert_eq!(h.service.upload_count(), 0);
    assert!(h.notifier.sent().is_empty());
    assert!(!h.orchestrator.close());
    assert_eq!(h.shell.close_requests(), 0);

    Ok(())
}

#[tokio::test]
async fn test_status_never_regresses_and_notifies_once() -> Result<()> {
    let h = harness(
        InMemoryService::new(),
        RecordingNotifier::default(),
        SubmissionConfig::default(),
    );

    h.orchestrator.on_video_segment(segment());
    h.orchestrator.on_document_image(image());
    reach(&h.orchestrator, Step::Done).await;
    h.orchestrator.wait_idle().await;

    // A late duplicate of each event
    h.orchestrator.on_document_image(image());
    h.orchestrator.on_video_segment(segment());
    h.orchestrator.wait_idle().await;

    let id = h.orchestrator.record_id().expect("record id");
    let history = h.service.status_history(&id);
    assert_eq!(history.first(), Some(&SubmissionStatus::Partial));
    assert_eq!(history.last(), Some(&SubmissionStatus::Submitted));
    assert!(history.windows(2).all(|w| w[0] <= w[1]), "{:?}", history);

    assert_eq!(h.orchestrator.step(), Step::Done);
    assert_eq!(h.notifier.sent().len(), 1);

    // Every upload landed under its own key
    assert_eq!(h.service.object_keys("videos").len(), 2);
    assert_eq!(h.service.object_keys("passports").len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_notification_failure_does_not_block_done() -> Result<()> {
    let h = harness(
        InMemoryService::new(),
        RecordingNotifier::failing(),
        SubmissionConfig::default(),
    );

    h.orchestrator.on_video_segment(segment());
    h.orchestrator.on_document_image(image());
    assert_eq!(reach(&h.orchestrator, Step::Done).await, Step::Done);
    h.orchestrator.wait_idle().await;

    assert_eq!(h.notifier.sent().len(), 1);
    assert!(h.orchestrator.close());

    Ok(())
}

#[tokio::test]
async fn test_media_forwarded_to_admin() -> Result<()> {
    let h = harness(
        InMemoryService::new(),
        RecordingNotifier::default(),
        SubmissionConfig {
            admin_chat_id: Some("-100500".to_string()),
            ..SubmissionConfig::default()
        },
    );

    h.orchestrator.on_video_segment(segment());
    h.orchestrator.wait_idle().await;
    h.orchestrator.on_document_image(image());
    reach(&h.orchestrator, Step::Done).await;
    h.orchestrator.wait_idle().await;

    let record = h
        .service
        .record(&h.orchestrator.record_id().expect("record id"))
        .expect("stored record");

    let media = h.notifier.media();
    assert_eq!(media.len(), 1);
    let (recipient, forward) = &media[0];
    assert_eq!(recipient, "-100500");
    assert_eq!(forward.photo_url, record.document_url);
    assert_eq!(forward.video_url, record.video_url);
    assert_eq!(
        forward.caption.render(Locale::Ru),
        "Olena Koval (id 5001) @okoval"
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_admin_forward_waits_for_slow_video() -> Result<()> {
    let service = Arc::new(InMemoryService::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let shell = Arc::new(LoggingShell::default());
    let storage = Arc::new(SlowBucket {
        inner: service.clone(),
        bucket: "videos",
        delay: Duration::from_secs(20),
    });
    let orchestrator = SubmissionOrchestrator::start(
        host(),
        SubmissionConfig {
            admin_chat_id: Some("-100500".to_string()),
            ..SubmissionConfig::default()
        },
        collaborators(service.clone(), storage, notifier.clone(), shell),
    );

    orchestrator.on_video_segment(segment());
    orchestrator.on_document_image(image());
    reach(&orchestrator, Step::Done).await;
    orchestrator.wait_idle().await;

    let record = service
        .record(&orchestrator.record_id().expect("record id"))
        .expect("stored record");
    assert!(record.video_url.is_some());

    let media = notifier.media();
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].1.photo_url, record.document_url);
    assert_eq!(media[0].1.video_url, record.video_url);

    Ok(())
}

#[tokio::test]
async fn test_retaken_document_forwards_media_once() -> Result<()> {
    let h = harness(
        InMemoryService::new(),
        RecordingNotifier::default(),
        SubmissionConfig {
            admin_chat_id: Some("-100500".to_string()),
            ..SubmissionConfig::default()
        },
    );

    h.orchestrator.on_video_segment(segment());
    h.orchestrator.on_document_image(image());
    reach(&h.orchestrator, Step::Done).await;
    h.orchestrator.wait_idle().await;

    h.orchestrator.on_document_image(image());
    h.orchestrator.wait_idle().await;

    assert_eq!(h.service.object_keys("passports").len(), 2);
    assert_eq!(h.notifier.media().len(), 1);
    assert_eq!(h.notifier.sent().len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_amendment_before_record_lands_in_late_record() -> Result<()> {
    let service = InMemoryService::new();
    service.fail_next_creates(1);
    let h = harness(service, RecordingNotifier::default(), SubmissionConfig::default());

    h.orchestrator
        .amend_metadata("consent", json!({ "geo": false }));
    h.orchestrator.wait_idle().await;
    assert!(h.orchestrator.record_id().is_none());

    h.orchestrator.on_video_segment(segment());
    h.orchestrator.wait_idle().await;

    let record = h
        .service
        .record(&h.orchestrator.record_id().expect("record id"))
        .expect("stored record");
    assert_eq!(record.meta["created_late"], json!(true));
    assert_eq!(record.meta["consent"]["geo"], json!(false));
    assert!(record.video_url.is_some());

    Ok(())
}

#[tokio::test]
async fn test_amend_metadata_keeps_refs_and_status() -> Result<()> {
    let h = harness(
        InMemoryService::new(),
        RecordingNotifier::default(),
        SubmissionConfig::default(),
    );

    h.orchestrator
        .amend_metadata("consent", json!({ "geo": true, "device": "pixel" }));
    h.orchestrator.wait_idle().await;

    let record = h
        .service
        .record(&h.orchestrator.record_id().expect("record id"))
        .expect("stored record");
    assert_eq!(record.meta["consent"]["geo"], json!(true));
    assert_eq!(record.meta["platform"], "ios");
    assert_eq!(record.status, SubmissionStatus::Partial);
    assert!(record.video_url.is_none());
    assert!(record.document_url.is_none());

    Ok(())
}

#[tokio::test]
async fn test_close_before_done_is_ignored() -> Result<()> {
    let h = harness(
        InMemoryService::new(),
        RecordingNotifier::default(),
        SubmissionConfig::default(),
    );

    assert!(!h.orchestrator.close());
    h.orchestrator.on_video_segment(segment());
    assert!(!h.orchestrator.close());
    assert_eq!(h.shell.close_requests(), 0);

    Ok(())
}
