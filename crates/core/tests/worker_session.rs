use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use scanbridge_core::capture::infrastructure::synthetic_frame_source::SyntheticFrameSource;
use scanbridge_core::protocol::domain::envelope::InitSettings;
use scanbridge_core::protocol::domain::error::ErrorCode;
use scanbridge_core::protocol::domain::result_state::ResultState;
use scanbridge_core::protocol::infrastructure::event_router::MetadataCallbacks;
use scanbridge_core::proxy::engine_proxy::EngineProxy;
use scanbridge_core::proxy::recognizer_proxy::RecognizerProxy;
use scanbridge_core::proxy::runner_proxy::RunnerProxy;
use scanbridge_core::scanning::clock::ManualClock;
use scanbridge_core::scanning::recognize_image_use_case::RecognizeImageUseCase;
use scanbridge_core::scanning::recognition_runner::RecognitionRunner;
use scanbridge_core::scanning::scan_state::{RecognitionMode, ScanConfig, ScanError, ScanState};
use scanbridge_core::scanning::video_recognizer::VideoRecognizer;
use scanbridge_core::shared::constants::SCRIPTED_RECOGNIZER_CLASS;
use scanbridge_core::shared::frame::{CapturedFrame, Orientation};
use scanbridge_core::worker::infrastructure::development_license_checker::DevelopmentLicenseChecker;
use scanbridge_core::worker::infrastructure::scripted_engine::{
    parse_script, EngineStats, ScriptedModuleLoader,
};
use scanbridge_core::worker::infrastructure::worker_host::spawn_worker;

const WAIT: Duration = Duration::from_secs(10);

struct Session {
    engine: EngineProxy,
    recognizer: RecognizerProxy,
    runner: Arc<RunnerProxy>,
    stats: EngineStats,
}

fn session(script: &str, callbacks: MetadataCallbacks) -> Session {
    let loader = ScriptedModuleLoader::new(parse_script(script).unwrap());
    let stats = loader.stats();
    let (connection, _worker) =
        spawn_worker(Box::new(loader), Box::new(DevelopmentLicenseChecker::default())).unwrap();
    let engine = EngineProxy::new(connection);
    engine
        .initialize(
            InitSettings {
                engine_location: "scripted".into(),
                license_key: "integration".into(),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let recognizer = engine
        .create_recognizer(SCRIPTED_RECOGNIZER_CLASS, vec![])
        .unwrap();
    let runner = engine
        .create_runner(&[&recognizer], false, callbacks)
        .unwrap();
    Session {
        engine,
        recognizer,
        runner: Arc::new(runner),
        stats,
    }
}

fn config(timeout_ms: u64) -> ScanConfig {
    ScanConfig {
        target_fps: 10.0,
        timeout_ms,
        mode: RecognitionMode::Recognition,
    }
}

fn video(session: &Session, source: SyntheticFrameSource, config: ScanConfig) -> VideoRecognizer {
    let runner: Arc<dyn RecognitionRunner> = session.runner.clone();
    VideoRecognizer::new(Box::new(source), runner, config)
        .unwrap()
        .with_clock(Arc::new(ManualClock::new(0)))
}

fn start(recognizer: &mut VideoRecognizer) -> mpsc::Receiver<Result<ResultState, ScanError>> {
    let (tx, rx) = mpsc::channel();
    recognizer
        .start_recognition(move |result| {
            let _ = tx.send(result);
        })
        .unwrap();
    rx
}

#[test]
fn test_scan_until_valid_moves_frame_back_in_result() {
    let failures = Arc::new(AtomicUsize::new(0));
    let counted = failures.clone();
    let session = session(
        "empty*2 uncertain*2 valid",
        MetadataCallbacks {
            on_detection_failed: Some(Box::new(move || {
                counted.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        },
    );
    let source = SyntheticFrameSource::new(16, 16, Duration::from_millis(1));
    let mut scan = video(&session, source, config(5_000));

    let outcomes = start(&mut scan);
    assert_eq!(outcomes.recv_timeout(WAIT).unwrap().unwrap(), ResultState::Valid);
    scan.wait_for_completion();

    assert_eq!(session.stats.frames(), 5);
    // Events are routed before the response that follows them.
    assert_eq!(failures.load(Ordering::SeqCst), 2);

    let result = session.recognizer.get_result().unwrap();
    assert_eq!(result.get("resultState").and_then(|v| v.as_str()), Some("valid"));
    assert_eq!(result.get("width").and_then(|v| v.as_int()), Some(16));
    let image = result.get("image").and_then(|v| v.as_buffer()).unwrap();
    assert_eq!(image.len(), 16 * 16 * 4);
    assert!(image.chunks(4).all(|px| px[3] == u8::MAX));
}

#[test]
fn test_uncertain_scan_times_out() {
    let session = session("uncertain", MetadataCallbacks::default());
    let source = SyntheticFrameSource::new(4, 4, Duration::from_millis(1));
    let mut scan = video(&session, source, config(300));

    let outcomes = start(&mut scan);
    assert_eq!(
        outcomes.recv_timeout(WAIT).unwrap().unwrap(),
        ResultState::Uncertain
    );
    // One tick per 100 ms of virtual time: accrual starts at the first
    // result and reaches 300 ms on the fourth.
    assert_eq!(session.stats.frames(), 4);
    let result = session.recognizer.get_result().unwrap();
    assert_eq!(result.get("resultState").and_then(|v| v.as_str()), Some("empty"));
}

#[test]
fn test_cancel_is_silent_and_resets_engine_once() {
    let session = session("empty", MetadataCallbacks::default());
    let source = SyntheticFrameSource::new(4, 4, Duration::from_millis(1));
    let mut scan = video(&session, source, config(1_000));

    let outcomes = start(&mut scan);
    while session.stats.frames() < 5 {
        std::thread::yield_now();
    }
    scan.cancel_recognition();

    assert_eq!(scan.state(), ScanState::Idle);
    assert!(matches!(
        outcomes.recv_timeout(WAIT),
        Err(mpsc::RecvTimeoutError::Disconnected)
    ));
    assert_eq!(session.stats.hard_resets(), 1);
}

#[test]
fn test_clear_timeout_callback_reaches_controller() {
    let session = session("uncertain*2 stage_valid uncertain", MetadataCallbacks::default());
    let source = SyntheticFrameSource::new(4, 4, Duration::from_millis(1));
    let mut scan = video(&session, source, config(250));
    let controller = scan.controller();
    let cleared = Arc::new(AtomicUsize::new(0));
    let seen = cleared.clone();
    session
        .runner
        .set_clear_timeout_callback(Some(Arc::new(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            controller.clear_timeout();
        })))
        .unwrap();

    let outcomes = start(&mut scan);
    assert_eq!(
        outcomes.recv_timeout(WAIT).unwrap().unwrap(),
        ResultState::Uncertain
    );
    assert_eq!(cleared.load(Ordering::SeqCst), 1);
    // Ticks 1-2 accrue 100 ms, tick 3 clears, ticks 4-7 accrue 300 ms.
    assert_eq!(session.stats.frames(), 7);
}

#[test]
fn test_capture_end_reports_error_and_returns_to_idle() {
    let session = session("empty", MetadataCallbacks::default());
    let source = SyntheticFrameSource::new(4, 4, Duration::from_millis(1)).with_limit(3);
    let mut scan = video(&session, source, config(1_000));

    let outcomes = start(&mut scan);
    let result = outcomes.recv_timeout(WAIT).unwrap();
    assert!(matches!(result, Err(ScanError::Capture(_))));
    scan.wait_for_completion();
    assert_eq!(scan.state(), ScanState::Idle);
    assert_eq!(session.stats.frames(), 3);
}

#[test]
fn test_single_image_recognition_soft_resets_until_valid() {
    let session = session("uncertain valid", MetadataCallbacks::default());
    let runner: Arc<dyn RecognitionRunner> = session.runner.clone();
    let use_case = RecognizeImageUseCase::new(runner);
    let still = || CapturedFrame::new(vec![200; 8 * 8 * 4], 8, 8, Orientation::Rotated0, false);

    assert_eq!(use_case.recognize(still()).unwrap(), ResultState::Uncertain);
    assert_eq!(use_case.recognize(still()).unwrap(), ResultState::Valid);
    assert_eq!(session.stats.soft_resets(), 1);
    let result = session.recognizer.get_result().unwrap();
    assert_eq!(result.get("image").and_then(|v| v.as_buffer()).map(<[u8]>::len), Some(256));
}

#[test]
fn test_runner_singleton_and_worker_errors_survive_scans() {
    let session = session("valid", MetadataCallbacks::default());
    let err = session
        .engine
        .create_runner(&[&session.recognizer], true, MetadataCallbacks::default())
        .err()
        .unwrap();
    assert_eq!(err.code(), Some(ErrorCode::RunnerAlreadyExists));

    let source = SyntheticFrameSource::new(4, 4, Duration::from_millis(1));
    let mut scan = video(&session, source, config(1_000));
    let outcomes = start(&mut scan);
    assert_eq!(outcomes.recv_timeout(WAIT).unwrap().unwrap(), ResultState::Valid);
    scan.release();

    session.runner.delete().unwrap();
    let again = session
        .engine
        .create_runner(&[&session.recognizer], false, MetadataCallbacks::default());
    assert!(again.is_ok());
}

#[test]
fn test_worker_exits_once_every_proxy_is_dropped() {
    let loader = ScriptedModuleLoader::new(parse_script("valid").unwrap());
    let (connection, worker) =
        spawn_worker(Box::new(loader), Box::new(DevelopmentLicenseChecker::default())).unwrap();
    let engine = EngineProxy::new(connection);
    engine
        .initialize(
            InitSettings {
                engine_location: "scripted".into(),
                license_key: "integration".into(),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let recognizer = engine
        .create_recognizer(SCRIPTED_RECOGNIZER_CLASS, vec![])
        .unwrap();
    let runner = engine
        .create_runner(&[&recognizer], false, MetadataCallbacks::default())
        .unwrap();
    runner.delete().unwrap();

    drop(runner);
    drop(engine);
    // The recognizer still holds the connection, so the worker keeps serving.
    assert!(!worker.is_finished());
    drop(recognizer);

    let (joined_tx, joined_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let _ = joined_tx.send(worker.join().is_ok());
    });
    assert_eq!(joined_rx.recv_timeout(WAIT), Ok(true));
}
