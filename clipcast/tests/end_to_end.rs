//! Full compose-and-broadcast run against fake collaborators.

use std::sync::Arc;

use clipcast::broadcast::BroadcastState;
use clipcast::commands::App;
use clipcast::config::AppConfig;
use clipcast::notification::StatusPhase;
use clipcast::pipeline::{PipelineStage, StreamInfo};
use clipcast::test_utils::{RecordingFetcher, RecordingNotifier, RecordingRunner};
use tempfile::TempDir;

const DOCUMENT: &str = r#"{
    "id": "job1",
    "principal_video": "ref1",
    "logo": "ref2",
    "footer": "ref3",
    "intro": "ref4",
    "mid": "ref5",
    "outro": "ref6",
    "stream_url": "rtmp://x"
}"#;

struct Harness {
    _dir: TempDir,
    work: std::path::PathBuf,
    document: std::path::PathBuf,
    runner: Arc<RecordingRunner>,
    fetcher: Arc<RecordingFetcher>,
    notifier: Arc<RecordingNotifier>,
    app: App,
}

async fn harness(document: &str) -> Harness {
    let dir = TempDir::new().unwrap();
    let work = dir.path().join("work");
    let path = dir.path().join("job1.json");
    tokio::fs::write(&path, document).await.unwrap();

    let runner = Arc::new(RecordingRunner::new());
    let fetcher = Arc::new(RecordingFetcher::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let config = AppConfig {
        work_dir: work.clone(),
        ..Default::default()
    };
    let app = App::new(config, runner.clone(), fetcher.clone(), notifier.clone());

    Harness {
        _dir: dir,
        work,
        document: path,
        runner,
        fetcher,
        notifier,
        app,
    }
}

#[tokio::test]
async fn compose_reaches_done_and_writes_stream_info() {
    let h = harness(DOCUMENT).await;

    let report = h.app.compose(&h.document).await.unwrap();

    assert_eq!(report.stages_completed.last(), Some(&PipelineStage::Done));
    assert_eq!(report.output, h.work.join("job1_final.mp4"));
    assert!(report.output.exists());

    let info = StreamInfo::load(&h.work.join("stream_info.json")).await.unwrap();
    assert_eq!(
        info,
        StreamInfo {
            stream_url: Some("rtmp://x".to_string()),
            video_id: "job1".to_string(),
        }
    );

    let text = tokio::fs::read_to_string(h.work.join("stream_info.json"))
        .await
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        value,
        serde_json::json!({"stream_url": "rtmp://x", "video_id": "job1"})
    );

    assert_eq!(h.fetcher.call_count(), 6);
    assert!(h.runner.calls().iter().all(|c| c.tool == "ffmpeg" || c.tool == "ffprobe"));
}

#[tokio::test]
async fn run_composes_then_broadcasts() {
    let h = harness(DOCUMENT).await;

    let (composition, broadcast) = h.app.run(&h.document).await.unwrap();

    assert_eq!(broadcast.state, BroadcastState::Finished);
    assert_eq!(broadcast.exit_code, Some(0));
    let phases: Vec<StatusPhase> = h.notifier.events().into_iter().map(|e| e.status).collect();
    assert_eq!(phases, [StatusPhase::Finished]);
    assert!(!composition.output.exists());

    let last = h.runner.calls().pop().unwrap();
    assert_eq!(last.args.last().map(String::as_str), Some("rtmp://x"));
}

#[tokio::test]
async fn invalid_document_never_fetches() {
    let h = harness(r#"{"id": "job1", "video": "ref1"}"#).await;

    let err = h.app.compose(&h.document).await.unwrap_err();

    assert!(matches!(err, clipcast::Error::Validation(_)));
    assert!(err.to_string().contains("logo"));
    assert_eq!(h.fetcher.call_count(), 0);
    assert!(h.runner.calls().is_empty());
    assert!(!h.work.exists());
}
