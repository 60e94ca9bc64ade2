mod settings;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use clap::Parser;

use scanbridge_core::capture::domain::frame_source::FrameSource;
use scanbridge_core::capture::infrastructure::image_sequence_source::ImageSequenceSource;
use scanbridge_core::capture::infrastructure::synthetic_frame_source::SyntheticFrameSource;
use scanbridge_core::protocol::domain::envelope::InitSettings;
use scanbridge_core::protocol::domain::result_state::ResultState;
use scanbridge_core::protocol::infrastructure::event_router::MetadataCallbacks;
use scanbridge_core::proxy::engine_proxy::EngineProxy;
use scanbridge_core::proxy::runner_proxy::RunnerProxy;
use scanbridge_core::scanning::recognize_image_use_case::RecognizeImageUseCase;
use scanbridge_core::scanning::recognition_runner::RecognitionRunner;
use scanbridge_core::scanning::scan_logger::LogScanLogger;
use scanbridge_core::scanning::scan_state::{RecognitionMode, ScanError};
use scanbridge_core::scanning::video_recognizer::VideoRecognizer;
use scanbridge_core::shared::constants::{IMAGE_EXTENSIONS, SCRIPTED_RECOGNIZER_CLASS};
use scanbridge_core::shared::value::Value;
use scanbridge_core::worker::domain::engine::RecognitionEngine;
use scanbridge_core::worker::domain::module_loader::ModuleLoader;
use scanbridge_core::worker::infrastructure::development_license_checker::DevelopmentLicenseChecker;
use scanbridge_core::worker::infrastructure::resource_module_loader::ResourceModuleLoader;
use scanbridge_core::worker::infrastructure::resource_resolver::ResourceResolver;
use scanbridge_core::worker::infrastructure::scripted_engine::{
    parse_script, ScriptedEngine, ScriptedModuleLoader,
};
use scanbridge_core::worker::infrastructure::worker_host::spawn_worker;

use settings::Settings;

const DEFAULT_SCRIPT: &str = "empty*10 uncertain*5 stage_valid uncertain*5 valid";
const DEFAULT_TEST_DURATION_MS: u64 = 5_000;
const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 480;

/// Drive a recognition engine over live frames, an image directory or a
/// single still image.
#[derive(Parser)]
#[command(name = "scanbridge")]
struct Cli {
    /// Image file to recognize once, or a directory of frames to scan.
    /// Without input, synthetic camera frames are used.
    input: Option<PathBuf>,

    /// Settings file (default: platform config dir).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings back to the settings file.
    #[arg(long)]
    save_settings: bool,

    /// Engine resource: local path, cached file name or URL.
    #[arg(long)]
    engine: Option<String>,

    /// Result-state script for the built-in engine, e.g. "empty*3 valid".
    #[arg(long)]
    script: Option<String>,

    /// Target frame rate of the frame pump.
    #[arg(long)]
    fps: Option<f64>,

    /// How long the engine may stay uncertain before the scan ends.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Scan mode: recognition, recognition-test or detection-test.
    #[arg(long)]
    mode: Option<String>,

    /// Stop the scan after this long (defaults to 5000 in test modes).
    #[arg(long)]
    duration_ms: Option<u64>,

    #[arg(long)]
    license_key: Option<String>,

    #[arg(long)]
    user_id: Option<String>,

    /// Replay the frame directory endlessly.
    #[arg(long = "loop")]
    loop_frames: bool,

    /// Treat frames as coming from a mirrored (front-facing) camera.
    #[arg(long)]
    mirrored: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings_path = cli.config.clone().or_else(Settings::config_path);
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load(),
    };
    apply_overrides(&mut settings, &cli)?;
    settings.validate()?;
    validate(&cli)?;

    if cli.save_settings {
        let path = settings_path.ok_or("No config directory available")?;
        settings.save_to(&path)?;
        log::info!("Settings saved to {}", path.display());
    }

    let loader = build_loader(&cli, &settings)?;
    let (connection, worker) =
        spawn_worker(loader, Box::new(DevelopmentLicenseChecker::default()))?;

    // Every proxy is dropped when the session returns, which closes the
    // request channel and lets the worker loop end.
    let outcome = run_session(EngineProxy::new(connection), &cli, &settings);
    if worker.join().is_err() {
        log::error!("Worker thread panicked");
    }
    outcome.map(|_| ())
}

/// Initializes the engine, runs one recognition and tears the engine objects
/// down again. Returns the final state, or `None` when the scan was stopped
/// by the duration limit.
fn run_session(
    engine: EngineProxy,
    cli: &Cli,
    settings: &Settings,
) -> Result<Option<ResultState>, Box<dyn std::error::Error>> {
    let lease = engine.initialize(
        InitSettings {
            engine_location: settings
                .engine_location
                .clone()
                .unwrap_or_else(|| "scripted".into()),
            license_key: settings.license_key.clone(),
            user_id: settings.user_id.clone(),
            want_load_progress: true,
        },
        Some(Arc::new(load_progress)),
    )?;
    eprintln!();
    if lease.show_demo_overlay {
        log::warn!("Licensed to {} (demo overlay enabled)", lease.licensee);
    }

    let mut recognizer = engine.create_recognizer(SCRIPTED_RECOGNIZER_CLASS, vec![])?;
    let runner = Arc::new(engine.create_runner(&[&recognizer], false, metadata_callbacks())?);

    let outcome = match cli.input.as_deref() {
        Some(path) if path.is_file() => run_image(path, &runner).map(Some),
        input => run_video(input, cli, settings, &runner),
    };

    match &outcome {
        Ok(Some(ResultState::Valid)) => {
            let result = recognizer.get_result()?;
            println!("Recognition finished: {}", describe(&result));
        }
        Ok(Some(state)) => println!("Recognition ended without a result ({state})"),
        Ok(None) => println!("Scan stopped"),
        Err(_) => {}
    }

    runner.delete()?;
    recognizer.delete()?;
    outcome.map_err(Into::into)
}

fn run_image(path: &Path, runner: &Arc<RunnerProxy>) -> Result<ResultState, ScanError> {
    let runner: Arc<dyn RecognitionRunner> = runner.clone();
    let state = RecognizeImageUseCase::new(runner).execute(path)?;
    log::info!("{}: {state}", path.display());
    Ok(state)
}

/// Runs one scan. Returns `None` when the scan was stopped by the duration
/// limit instead of finishing on its own.
fn run_video(
    input: Option<&Path>,
    cli: &Cli,
    settings: &Settings,
    runner: &Arc<RunnerProxy>,
) -> Result<Option<ResultState>, ScanError> {
    let source = open_source(input, cli, settings)?;
    let pump_runner: Arc<dyn RecognitionRunner> = runner.clone();
    let mut video = VideoRecognizer::new(source, pump_runner, settings.scan)?
        .with_logger(Box::new(LogScanLogger::new(settings.log_every_ticks)));

    let controller = video.controller();
    runner.set_clear_timeout_callback(Some(Arc::new(move || controller.clear_timeout())))?;

    let (done_tx, done_rx) = mpsc::channel();
    video.start_recognition(move |result| {
        let _ = done_tx.send(result);
    })?;

    let limit = cli.duration_ms.or_else(|| {
        settings
            .scan
            .mode
            .is_test()
            .then_some(DEFAULT_TEST_DURATION_MS)
    });
    let outcome = match limit {
        Some(ms) => match done_rx.recv_timeout(Duration::from_millis(ms)) {
            Ok(result) => result.map(Some),
            Err(_) => {
                log::info!("Stopping scan after {ms} ms");
                video.cancel_recognition();
                Ok(None)
            }
        },
        None => match done_rx.recv() {
            Ok(result) => result.map(Some),
            Err(_) => Ok(None),
        },
    };

    video.release();
    runner.set_clear_timeout_callback(None)?;
    outcome
}

fn open_source(
    input: Option<&Path>,
    cli: &Cli,
    settings: &Settings,
) -> Result<Box<dyn FrameSource>, ScanError> {
    match input {
        Some(dir) => {
            let source = ImageSequenceSource::open(dir)?
                .looping(cli.loop_frames)
                .mirrored(cli.mirrored);
            log::info!("Scanning {} frames from {}", source.len(), dir.display());
            Ok(Box::new(source))
        }
        None => {
            let interval = Duration::from_secs_f64(1.0 / settings.scan.target_fps);
            log::info!("Scanning synthetic {SYNTHETIC_WIDTH}x{SYNTHETIC_HEIGHT} frames");
            Ok(Box::new(
                SyntheticFrameSource::new(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT, interval)
                    .mirrored(cli.mirrored),
            ))
        }
    }
}

fn build_loader(
    cli: &Cli,
    settings: &Settings,
) -> Result<Box<dyn ModuleLoader>, Box<dyn std::error::Error>> {
    if settings.engine_location.is_some() {
        let resolver = ResourceResolver::with_default_cache()?;
        log::info!("Engine cache: {}", resolver.cache_dir().display());
        return Ok(Box::new(ResourceModuleLoader::new(
            resolver,
            Box::new(|path: &Path| {
                ScriptedEngine::from_script_file(path)
                    .map(|engine| Box::new(engine) as Box<dyn RecognitionEngine>)
            }),
        )));
    }
    let script = parse_script(cli.script.as_deref().unwrap_or(DEFAULT_SCRIPT))?;
    Ok(Box::new(ScriptedModuleLoader::new(script)))
}

fn metadata_callbacks() -> MetadataCallbacks {
    MetadataCallbacks {
        on_debug_text: Some(Box::new(|text: &str| log::debug!("engine: {text}"))),
        on_first_side_result: Some(Box::new(|| log::info!("First side scanned"))),
        on_glare_detected: Some(Box::new(|glare: bool| {
            if glare {
                log::warn!("Glare detected");
            }
        })),
        ..Default::default()
    }
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(fps) = cli.fps {
        settings.scan.target_fps = fps;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        settings.scan.timeout_ms = timeout_ms;
    }
    if let Some(mode) = &cli.mode {
        settings.scan.mode = parse_mode(mode)?;
    }
    if let Some(engine) = &cli.engine {
        settings.engine_location = Some(engine.clone());
    }
    if let Some(key) = &cli.license_key {
        settings.license_key = key.clone();
    }
    if let Some(user_id) = &cli.user_id {
        settings.user_id = Some(user_id.clone());
    }
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(input) = &cli.input {
        if !input.exists() {
            return Err(format!("Input not found: {}", input.display()).into());
        }
        if input.is_file() && !is_image(input) {
            return Err(format!("Input is not a supported image: {}", input.display()).into());
        }
    }
    if cli.engine.is_some() && cli.script.is_some() {
        return Err("--engine and --script are mutually exclusive".into());
    }
    if cli.duration_ms == Some(0) {
        return Err("Duration must be at least 1 ms".into());
    }
    Ok(())
}

fn parse_mode(mode: &str) -> Result<RecognitionMode, String> {
    match mode {
        "recognition" => Ok(RecognitionMode::Recognition),
        "recognition-test" => Ok(RecognitionMode::RecognitionTest),
        "detection-test" => Ok(RecognitionMode::DetectionTest),
        other => Err(format!(
            "Mode must be one of: recognition, recognition-test, detection-test, got '{other}'"
        )),
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn load_progress(percent: u8) {
    eprint!("\rLoading engine... {percent}%");
}

/// One-line rendering of a result value; buffers show their size only.
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".into(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format!("{f:.3}"),
        Value::Str(s) => format!("{s:?}"),
        Value::Buffer(bytes) => format!("<{} bytes>", bytes.len()),
        Value::List(items) => {
            let items: Vec<_> = items.iter().map(describe).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(entries) => {
            let entries: Vec<_> = entries
                .iter()
                .map(|(k, v)| format!("{k}: {}", describe(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Remote(handle) => format!("remote {handle}"),
    }
}
