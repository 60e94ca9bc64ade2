use std::path::Path;
use std::sync::Arc;

use crate::capture::infrastructure::still_image::load_still_image;
use crate::protocol::domain::result_state::ResultState;
use crate::scanning::recognition_runner::RecognitionRunner;
use crate::scanning::scan_state::ScanError;
use crate::shared::frame::CapturedFrame;

/// Single-image recognition: decode → submit → soft reset unless valid.
///
/// A `Valid` result leaves the recognizers untouched so their results can
/// be read afterwards.
pub struct RecognizeImageUseCase {
    runner: Arc<dyn RecognitionRunner>,
}

impl RecognizeImageUseCase {
    pub fn new(runner: Arc<dyn RecognitionRunner>) -> Self {
        Self { runner }
    }

    /// Decodes the image at `path` and recognizes it.
    pub fn execute(&self, path: &Path) -> Result<ResultState, ScanError> {
        let frame = load_still_image(path)?;
        log::debug!(
            "Recognizing {} ({}x{})",
            path.display(),
            frame.width(),
            frame.height()
        );
        self.recognize(frame)
    }

    pub fn recognize(&self, frame: CapturedFrame) -> Result<ResultState, ScanError> {
        let state = self.runner.process_image(frame)?;
        if state != ResultState::Valid {
            self.runner.reset(false)?;
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::domain::frame_source::CaptureError;
    use crate::proxy::proxy_error::ProxyError;
    use crate::shared::frame::Orientation;
    use rstest::rstest;
    use std::sync::Mutex;

    struct StubRunner {
        answer: ResultState,
        resets: Arc<Mutex<Vec<bool>>>,
        video_flags: Arc<Mutex<Vec<bool>>>,
    }

    impl StubRunner {
        fn new(answer: ResultState) -> Self {
            Self {
                answer,
                resets: Arc::new(Mutex::new(Vec::new())),
                video_flags: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl RecognitionRunner for StubRunner {
        fn process_image(&self, frame: CapturedFrame) -> Result<ResultState, ProxyError> {
            self.video_flags.lock().unwrap().push(frame.is_video_frame());
            Ok(self.answer)
        }

        fn reset(&self, hard_reset: bool) -> Result<(), ProxyError> {
            self.resets.lock().unwrap().push(hard_reset);
            Ok(())
        }

        fn set_detection_only(&self, _detection_only: bool) -> Result<(), ProxyError> {
            Ok(())
        }

        fn set_camera_preview_mirrored(&self, _mirrored: bool) -> Result<(), ProxyError> {
            Ok(())
        }
    }

    fn frame() -> CapturedFrame {
        CapturedFrame::new(vec![9; 16], 2, 2, Orientation::Rotated0, false)
    }

    #[rstest]
    #[case(ResultState::Empty, vec![false])]
    #[case(ResultState::Uncertain, vec![false])]
    #[case(ResultState::StageValid, vec![false])]
    #[case(ResultState::Valid, vec![])]
    fn test_soft_reset_unless_valid(#[case] answer: ResultState, #[case] expected: Vec<bool>) {
        let runner = StubRunner::new(answer);
        let resets = runner.resets.clone();
        let use_case = RecognizeImageUseCase::new(Arc::new(runner));

        assert_eq!(use_case.recognize(frame()).unwrap(), answer);
        assert_eq!(*resets.lock().unwrap(), expected);
    }

    #[test]
    fn test_execute_decodes_still_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();
        let runner = StubRunner::new(ResultState::Valid);
        let flags = runner.video_flags.clone();
        let use_case = RecognizeImageUseCase::new(Arc::new(runner));

        assert_eq!(use_case.execute(&path).unwrap(), ResultState::Valid);
        assert_eq!(*flags.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_missing_file_is_capture_error() {
        let runner = StubRunner::new(ResultState::Valid);
        let use_case = RecognizeImageUseCase::new(Arc::new(runner));

        let err = use_case
            .execute(Path::new("/nonexistent/card.png"))
            .unwrap_err();
        assert!(matches!(err, ScanError::Capture(CaptureError::Io { .. })));
    }
}
