use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::protocol::domain::event::{DetectionStatus, Point, Quad, WorkerEvent};
use crate::protocol::domain::result_state::ResultState;
use crate::shared::constants::SCRIPTED_RECOGNIZER_CLASS;
use crate::shared::frame::CapturedFrame;
use crate::shared::value::Value;
use crate::worker::domain::engine::{
    lock_object, Argument, EngineError, EngineObject, EngineRunner, RecognitionEngine,
    SharedObject,
};
use crate::worker::domain::module_loader::{InitError, ModuleLoader};
use crate::worker::domain::runner_callbacks::RunnerCallbacks;

pub const SCRIPTED_ENGINE_VERSION: &str = "scripted-1";

/// Recognizer method that stores an extraction result. Internal to the
/// engine: not on the allow-list, so the control side cannot reach it.
const STORE_RESULT: &str = "storeResult";

/// Counters shared between a scripted engine and whoever inspects it.
#[derive(Clone, Debug, Default)]
pub struct EngineStats {
    frames: Arc<AtomicUsize>,
    soft_resets: Arc<AtomicUsize>,
    hard_resets: Arc<AtomicUsize>,
}

impl EngineStats {
    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn soft_resets(&self) -> usize {
        self.soft_resets.load(Ordering::SeqCst)
    }

    pub fn hard_resets(&self) -> usize {
        self.hard_resets.load(Ordering::SeqCst)
    }
}

/// Parses a result-state script.
///
/// Tokens are separated by whitespace or commas; `state*N` repeats a state
/// N times. Lines starting with `#` are ignored.
pub fn parse_script(text: &str) -> Result<Vec<ResultState>, EngineError> {
    let mut script = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        for token in line.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let (name, count) = match token.split_once('*') {
                Some((name, n)) => {
                    let count = n
                        .parse::<usize>()
                        .map_err(|_| EngineError::new(format!("bad repeat count in '{token}'")))?;
                    (name, count)
                }
                None => (token, 1),
            };
            let state = name
                .parse::<ResultState>()
                .map_err(|e| EngineError::new(e.to_string()))?;
            script.extend(std::iter::repeat(state).take(count));
        }
    }
    Ok(script)
}

/// Deterministic engine whose runner replays a fixed result-state script.
///
/// Once the script is exhausted the last state repeats; an empty script
/// always yields `Empty`.
pub struct ScriptedEngine {
    script: Vec<ResultState>,
    stats: EngineStats,
}

impl ScriptedEngine {
    pub fn new(script: Vec<ResultState>) -> Self {
        Self {
            script,
            stats: EngineStats::default(),
        }
    }

    pub fn with_stats(script: Vec<ResultState>, stats: EngineStats) -> Self {
        Self { script, stats }
    }

    pub fn from_script_file(path: &Path) -> Result<Self, EngineError> {
        let text = fs::read_to_string(path)
            .map_err(|e| EngineError::new(format!("cannot read {}: {e}", path.display())))?;
        Ok(Self::new(parse_script(&text)?))
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.clone()
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn invoke_function(&mut self, name: &str, _args: Vec<Argument>) -> Result<Value, EngineError> {
        match name {
            "getEngineVersion" => Ok(Value::from(SCRIPTED_ENGINE_VERSION)),
            "getScriptLength" => Ok(Value::Int(self.script.len() as i64)),
            other => Err(EngineError::new(format!("unknown function {other}"))),
        }
    }

    fn create_object(
        &mut self,
        class_name: &str,
        args: Vec<Argument>,
    ) -> Result<Box<dyn EngineObject>, EngineError> {
        if class_name != SCRIPTED_RECOGNIZER_CLASS {
            return Err(EngineError::new(format!("unknown class {class_name}")));
        }
        let settings = args
            .into_iter()
            .next()
            .and_then(Argument::into_value)
            .unwrap_or_else(|| Value::map(Vec::<(String, Value)>::new()));
        Ok(Box::new(ScriptedRecognizer::new(settings)))
    }

    fn create_runner(
        &mut self,
        recognizers: Vec<SharedObject>,
        allow_multiple_results: bool,
    ) -> Result<Box<dyn EngineRunner>, EngineError> {
        Ok(Box::new(ScriptedRunner {
            script: self.script.clone(),
            position: 0,
            recognizers,
            allow_multiple_results,
            stats: self.stats.clone(),
            callbacks: RunnerCallbacks::none(),
            detection_only: false,
            mirrored: false,
        }))
    }
}

/// Recognizer object exposing the usual result/settings methods.
pub struct ScriptedRecognizer {
    settings: Value,
    result: Value,
}

impl ScriptedRecognizer {
    pub fn new(settings: Value) -> Self {
        Self {
            settings,
            result: empty_result(),
        }
    }
}

fn empty_result() -> Value {
    Value::map([("resultState", Value::from(ResultState::Empty.as_str()))])
}

impl EngineObject for ScriptedRecognizer {
    fn class_name(&self) -> &str {
        SCRIPTED_RECOGNIZER_CLASS
    }

    fn methods(&self) -> &[&'static str] {
        &["getResult", "currentSettings", "updateSettings"]
    }

    fn invoke(&mut self, method: &str, args: Vec<Argument>) -> Result<Value, EngineError> {
        match method {
            "getResult" => Ok(self.result.clone()),
            "currentSettings" => Ok(self.settings.clone()),
            "updateSettings" => {
                let settings = args
                    .into_iter()
                    .next()
                    .and_then(Argument::into_value)
                    .ok_or_else(|| EngineError::new("updateSettings expects a settings value"))?;
                self.settings = settings;
                Ok(Value::Null)
            }
            STORE_RESULT => {
                self.result = args
                    .into_iter()
                    .next()
                    .and_then(Argument::into_value)
                    .unwrap_or_else(empty_result);
                Ok(Value::Null)
            }
            other => Err(EngineError::new(format!("unknown method {other}"))),
        }
    }
}

struct ScriptedRunner {
    script: Vec<ResultState>,
    position: usize,
    recognizers: Vec<SharedObject>,
    allow_multiple_results: bool,
    stats: EngineStats,
    callbacks: RunnerCallbacks,
    detection_only: bool,
    mirrored: bool,
}

impl ScriptedRunner {
    fn next_state(&mut self) -> ResultState {
        let state = match self.script.len() {
            0 => ResultState::Empty,
            n => self.script[self.position.min(n - 1)],
        };
        self.position += 1;
        state
    }

    fn store_results(&self, result: Value) -> Result<(), EngineError> {
        // Only the first recognizer reports unless multiple results are allowed.
        let take = if self.allow_multiple_results {
            self.recognizers.len()
        } else {
            1
        };
        for recognizer in self.recognizers.iter().take(take) {
            lock_object(recognizer).invoke(STORE_RESULT, vec![Argument::Plain(result.clone())])?;
        }
        Ok(())
    }

    fn clear_results(&self) -> Result<(), EngineError> {
        for recognizer in &self.recognizers {
            lock_object(recognizer).invoke(STORE_RESULT, vec![])?;
        }
        Ok(())
    }

    fn frame_quad(&self, frame: &CapturedFrame) -> Quad {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let (left, right) = if self.mirrored { (w, 0.0) } else { (0.0, w) };
        Quad {
            status: DetectionStatus::Success,
            corners: [
                Point::new(left, 0.0),
                Point::new(right, 0.0),
                Point::new(right, h),
                Point::new(left, h),
            ],
        }
    }
}

impl EngineRunner for ScriptedRunner {
    fn process_image(&mut self, frame: CapturedFrame) -> Result<ResultState, EngineError> {
        let index = self.stats.frames.fetch_add(1, Ordering::SeqCst);
        let state = self.next_state();
        self.callbacks
            .emit(WorkerEvent::DebugText(format!("frame {index}: {state}")));

        match state {
            ResultState::Empty => {
                self.callbacks.emit(WorkerEvent::DetectionFailed);
            }
            ResultState::Uncertain => {
                let quad = self.frame_quad(&frame);
                self.callbacks.emit(WorkerEvent::QuadDetected(quad));
                self.callbacks
                    .emit(WorkerEvent::PointsDetected(quad.corners.to_vec()));
            }
            ResultState::StageValid => {
                self.callbacks.emit(WorkerEvent::FirstSideResult);
                self.callbacks.emit(WorkerEvent::ClearTimeout);
            }
            ResultState::Valid if !self.detection_only => {
                let width = i64::from(frame.width());
                let height = i64::from(frame.height());
                let result = Value::map([
                    ("resultState", Value::from(state.as_str())),
                    ("frameIndex", Value::Int(index as i64)),
                    ("width", Value::Int(width)),
                    ("height", Value::Int(height)),
                    ("image", Value::Buffer(frame.into_pixels())),
                ]);
                self.store_results(result)?;
            }
            ResultState::Valid => {}
        }
        Ok(state)
    }

    fn reconfigure(
        &mut self,
        recognizers: Vec<SharedObject>,
        allow_multiple_results: bool,
    ) -> Result<(), EngineError> {
        self.recognizers = recognizers;
        self.allow_multiple_results = allow_multiple_results;
        Ok(())
    }

    fn reset(&mut self, hard_reset: bool) -> Result<(), EngineError> {
        if hard_reset {
            self.stats.hard_resets.fetch_add(1, Ordering::SeqCst);
            self.position = 0;
        } else {
            self.stats.soft_resets.fetch_add(1, Ordering::SeqCst);
        }
        self.clear_results()
    }

    fn set_detection_only(&mut self, detection_only: bool) {
        self.detection_only = detection_only;
    }

    fn set_camera_preview_mirrored(&mut self, mirrored: bool) {
        self.mirrored = mirrored;
    }

    fn set_callbacks(&mut self, callbacks: RunnerCallbacks) {
        self.callbacks = callbacks;
    }
}

/// Module loader that hands out scripted engines sharing one set of stats.
pub struct ScriptedModuleLoader {
    script: Vec<ResultState>,
    stats: EngineStats,
}

impl ScriptedModuleLoader {
    pub fn new(script: Vec<ResultState>) -> Self {
        Self {
            script,
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.clone()
    }
}

impl ModuleLoader for ScriptedModuleLoader {
    fn load(
        &self,
        location: &str,
        progress: &mut dyn FnMut(u8),
    ) -> Result<Box<dyn RecognitionEngine>, InitError> {
        if location.trim().is_empty() {
            return Err(InitError::ModuleLoad {
                location: location.to_string(),
                reason: "empty engine location".into(),
            });
        }
        progress(0);
        progress(50);
        let engine = ScriptedEngine::with_stats(self.script.clone(), self.stats.clone());
        progress(100);
        Ok(Box::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::domain::envelope::WorkerMessage;
    use crate::protocol::domain::event::CallbackFlags;
    use crate::shared::frame::Orientation;
    use crate::worker::domain::engine::share;
    use crate::worker::domain::runner_callbacks::EventEmitter;
    use rstest::rstest;

    fn frame() -> CapturedFrame {
        CapturedFrame::new(vec![7; 2 * 2 * 4], 2, 2, Orientation::Rotated0, true)
    }

    #[rstest]
    #[case("empty uncertain valid", vec![ResultState::Empty, ResultState::Uncertain, ResultState::Valid])]
    #[case("uncertain*3", vec![ResultState::Uncertain; 3])]
    #[case("# header\nempty,\n stage_valid", vec![ResultState::Empty, ResultState::StageValid])]
    #[case("", vec![])]
    fn test_parse_script(#[case] text: &str, #[case] expected: Vec<ResultState>) {
        assert_eq!(parse_script(text).unwrap(), expected);
    }

    #[rstest]
    #[case("maybe")]
    #[case("valid*x")]
    fn test_parse_script_rejects_garbage(#[case] text: &str) {
        assert!(parse_script(text).is_err());
    }

    #[test]
    fn test_from_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.script");
        fs::write(&path, "empty*2 valid\n").unwrap();
        let engine = ScriptedEngine::from_script_file(&path).unwrap();
        assert_eq!(engine.script.len(), 3);
        assert!(ScriptedEngine::from_script_file(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_runner_replays_script_and_repeats_last_state() {
        let mut engine = ScriptedEngine::new(vec![ResultState::Empty, ResultState::Valid]);
        let mut runner = engine.create_runner(vec![], false).unwrap();
        let states: Vec<_> = (0..4).map(|_| runner.process_image(frame()).unwrap()).collect();
        assert_eq!(
            states,
            vec![
                ResultState::Empty,
                ResultState::Valid,
                ResultState::Valid,
                ResultState::Valid
            ]
        );
        assert_eq!(engine.stats().frames(), 4);
    }

    #[test]
    fn test_empty_script_always_empty() {
        let mut engine = ScriptedEngine::new(vec![]);
        let mut runner = engine.create_runner(vec![], false).unwrap();
        assert_eq!(runner.process_image(frame()).unwrap(), ResultState::Empty);
    }

    #[test]
    fn test_valid_moves_pixels_into_recognizer_result() {
        let mut engine = ScriptedEngine::new(vec![ResultState::Valid]);
        let recognizer = share(
            engine
                .create_object(SCRIPTED_RECOGNIZER_CLASS, vec![])
                .unwrap(),
        );
        let mut runner = engine.create_runner(vec![recognizer.clone()], false).unwrap();
        runner.process_image(frame()).unwrap();

        let result = lock_object(&recognizer).invoke("getResult", vec![]).unwrap();
        assert_eq!(result.get("resultState").and_then(Value::as_str), Some("valid"));
        assert_eq!(result.get("image").and_then(Value::as_buffer).map(<[u8]>::len), Some(16));

        runner.reset(false).unwrap();
        let cleared = lock_object(&recognizer).invoke("getResult", vec![]).unwrap();
        assert_eq!(cleared.get("image"), None);
    }

    #[test]
    fn test_detection_only_skips_extraction() {
        let mut engine = ScriptedEngine::new(vec![ResultState::Valid]);
        let recognizer = share(
            engine
                .create_object(SCRIPTED_RECOGNIZER_CLASS, vec![])
                .unwrap(),
        );
        let mut runner = engine.create_runner(vec![recognizer.clone()], false).unwrap();
        runner.set_detection_only(true);
        runner.process_image(frame()).unwrap();
        let result = lock_object(&recognizer).invoke("getResult", vec![]).unwrap();
        assert_eq!(result.get("resultState").and_then(Value::as_str), Some("empty"));
    }

    #[test]
    fn test_hard_reset_rewinds_script() {
        let mut engine = ScriptedEngine::new(vec![ResultState::Empty, ResultState::Valid]);
        let mut runner = engine.create_runner(vec![], false).unwrap();
        runner.process_image(frame()).unwrap();
        runner.reset(true).unwrap();
        assert_eq!(runner.process_image(frame()).unwrap(), ResultState::Empty);
        assert_eq!(engine.stats().hard_resets(), 1);
        assert_eq!(engine.stats().soft_resets(), 0);
    }

    #[test]
    fn test_stage_valid_emits_first_side_and_clear_timeout() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut engine = ScriptedEngine::new(vec![ResultState::StageValid]);
        let mut runner = engine.create_runner(vec![], false).unwrap();
        runner.set_callbacks(RunnerCallbacks::new(
            EventEmitter::new(tx),
            CallbackFlags {
                first_side_result: true,
                ..Default::default()
            },
            true,
        ));
        runner.process_image(frame()).unwrap();

        let events: Vec<_> = rx
            .try_iter()
            .map(|m| match m {
                WorkerMessage::Event(e) => e.name(),
                WorkerMessage::Response(_) => "response",
            })
            .collect();
        assert_eq!(events, vec!["first_side_result", "clear_timeout"]);
    }

    #[test]
    fn test_unknown_class_and_function_fail() {
        let mut engine = ScriptedEngine::new(vec![]);
        assert!(engine.create_object("BlinkRecognizer", vec![]).is_err());
        assert!(engine.invoke_function("launchRockets", vec![]).is_err());
        assert_eq!(
            engine.invoke_function("getEngineVersion", vec![]).unwrap(),
            Value::from(SCRIPTED_ENGINE_VERSION)
        );
    }

    #[test]
    fn test_loader_reports_progress_and_rejects_empty_location() {
        let loader = ScriptedModuleLoader::new(vec![]);
        let mut seen = Vec::new();
        assert!(loader.load("scripted", &mut |p: u8| seen.push(p)).is_ok());
        assert_eq!(seen, vec![0, 50, 100]);
        assert!(matches!(
            loader.load("  ", &mut |_: u8| {}),
            Err(InitError::ModuleLoad { .. })
        ));
    }
}
