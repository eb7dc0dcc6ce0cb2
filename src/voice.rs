//! Reading the visible page aloud.

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::process::{Child, Command, Stdio};

use crate::error::ReaderError;
use crate::measure::FlowRect;
use crate::pagination::Pagination;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechParams {
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub language: Option<String>,
}

impl Default for SpeechParams {
    fn default() -> Self {
        Self {
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            language: None,
        }
    }
}

fn finite_or_one(value: f32) -> f32 {
    if value.is_finite() { value } else { 1.0 }
}

impl SpeechParams {
    pub fn sanitized(&self) -> Self {
        Self {
            rate: finite_or_one(self.rate).clamp(0.2, 4.0),
            pitch: finite_or_one(self.pitch).clamp(0.2, 2.0),
            volume: finite_or_one(self.volume).clamp(0.0, 1.0),
            language: self.language.clone().filter(|l| !l.trim().is_empty()),
        }
    }
}

pub trait SpeechEngine {
    fn speak(&mut self, text: &str, params: &SpeechParams) -> Result<()>;
    fn cancel(&mut self);
    fn is_speaking(&mut self) -> bool;
}

/// Engine that never makes a sound.
#[derive(Debug, Default)]
pub struct SilentSpeech;

impl SpeechEngine for SilentSpeech {
    fn speak(&mut self, text: &str, _params: &SpeechParams) -> Result<()> {
        debug!("Silent speech: {} chars", text.len());
        Ok(())
    }

    fn cancel(&mut self) {}

    fn is_speaking(&mut self) -> bool {
        false
    }
}

/// Spawns an external TTS program per utterance, e.g. `espeak-ng`.
///
/// Arguments may contain `{rate_wpm}`, `{pitch}`, `{volume}` and `{language}`
/// placeholders; the text itself is passed as the final argument.
#[derive(Debug)]
pub struct CommandSpeech {
    program: String,
    args: Vec<String>,
    child: Option<Child>,
}

impl CommandSpeech {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    pub fn expand_args(&self, params: &SpeechParams) -> Vec<String> {
        let rate_wpm = ((175.0 * params.rate).round() as u32).to_string();
        let pitch = ((params.pitch * 50.0).round().min(99.0) as u32).to_string();
        let volume = ((params.volume * 100.0).round() as u32).to_string();
        let language = params.language.clone().unwrap_or_default();
        self.args
            .iter()
            .filter(|arg| !(arg.contains("{language}") && language.is_empty()))
            .map(|arg| {
                arg.replace("{rate_wpm}", &rate_wpm)
                    .replace("{pitch}", &pitch)
                    .replace("{volume}", &volume)
                    .replace("{language}", &language)
            })
            .collect()
    }
}

impl SpeechEngine for CommandSpeech {
    fn speak(&mut self, text: &str, params: &SpeechParams) -> Result<()> {
        self.cancel();
        let child = Command::new(&self.program)
            .args(self.expand_args(params))
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;
        self.child = Some(child);
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("Speech process already gone: {e}");
            }
            if let Err(e) = child.wait() {
                debug!("Could not reap speech process: {e}");
            }
        }
    }

    fn is_speaking(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(_) => {
                self.child = None;
                false
            }
            None => false,
        }
    }
}

impl Drop for CommandSpeech {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// At most one utterance at a time.
pub struct VoiceOver {
    engine: Box<dyn SpeechEngine>,
    params: SpeechParams,
    speaking: bool,
}

impl VoiceOver {
    pub fn new(engine: Box<dyn SpeechEngine>, params: SpeechParams) -> Self {
        Self {
            engine,
            params: params.sanitized(),
            speaking: false,
        }
    }

    pub fn params(&self) -> &SpeechParams {
        &self.params
    }

    pub fn set_params(&mut self, params: SpeechParams) {
        self.params = params.sanitized();
    }

    pub fn speak(&mut self, text: &str) {
        self.stop();
        if text.trim().is_empty() {
            return;
        }
        match self.engine.speak(text, &self.params) {
            Ok(()) => self.speaking = true,
            Err(e) => {
                error!("{}", ReaderError::Speech(format!("{e:#}")));
                self.speaking = false;
            }
        }
    }

    pub fn stop(&mut self) {
        if self.speaking {
            debug!("Cancelling current utterance");
        }
        self.engine.cancel();
        self.speaking = false;
    }

    pub fn is_speaking(&mut self) -> bool {
        if self.speaking && !self.engine.is_speaking() {
            self.speaking = false;
        }
        self.speaking
    }
}

/// Rectangle of the page window in flow coordinates.
pub fn page_viewport(pagination: &Pagination, translate_x: f32) -> FlowRect {
    FlowRect {
        x: translate_x,
        y: 0.0,
        width: pagination.column_width,
        height: pagination.column_height,
    }
}

/// Text of every fragment touching the viewport, in document order,
/// separated by blank lines.
pub fn visible_page_text(pagination: &Pagination, viewport: &FlowRect) -> String {
    pagination
        .fragments
        .iter()
        .filter(|fragment| fragment.rect.intersects(viewport))
        .map(|fragment| fragment.text())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Chapter, Point, Section};
    use crate::flow::build_flow_parts;
    use crate::measure::WrapMeasure;
    use crate::metrics::ColumnMetrics;
    use crate::pagination::{PaginationTuning, build_pagination};
    use crate::style::ReaderStyle;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default, Clone)]
    struct Recorder {
        calls: Rc<RefCell<Vec<String>>>,
        fail: bool,
    }

    impl SpeechEngine for Recorder {
        fn speak(&mut self, text: &str, _params: &SpeechParams) -> Result<()> {
            if self.fail {
                return Err(anyhow!("no voices"));
            }
            self.calls.borrow_mut().push(format!("speak:{text}"));
            Ok(())
        }

        fn cancel(&mut self) {
            self.calls.borrow_mut().push("cancel".into());
        }

        fn is_speaking(&mut self) -> bool {
            true
        }
    }

    fn pagination() -> Pagination {
        let chapter = Chapter {
            id: "c1".into(),
            title: None,
            sections: vec![Section {
                id: "s1".into(),
                title: None,
                points: vec![Point {
                    id: "p1".into(),
                    title: None,
                    text: vec![vec!["abcd"; 60].join(" "), "second page".into()],
                }],
            }],
        };
        let style = ReaderStyle {
            font_id: "roboto".into(),
            font_size: 20,
            line_height: 1.5,
            font_weight: 400,
            theme_id: "sepia".into(),
        };
        build_pagination(
            "c1",
            &build_flow_parts(&chapter),
            &ColumnMetrics::new(300.0, 300.0, 240.0),
            &style,
            &WrapMeasure::default(),
            &PaginationTuning::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_sanitize_ranges() {
        let params = SpeechParams {
            rate: 10.0,
            pitch: f32::NAN,
            volume: -1.0,
            language: Some(" ".into()),
        }
        .sanitized();
        assert_eq!(params.rate, 4.0);
        assert_eq!(params.pitch, 1.0);
        assert_eq!(params.volume, 0.0);
        assert_eq!(params.language, None);
    }

    #[test]
    fn test_visible_text_follows_viewport() {
        let pagination = pagination();
        let first = visible_page_text(&pagination, &page_viewport(&pagination, 0.0));
        assert!(first.starts_with("abcd abcd"));
        assert!(!first.contains("second page"));

        let second = visible_page_text(&pagination, &page_viewport(&pagination, 540.0));
        assert_eq!(second, "second page");
    }

    #[test]
    fn test_visible_text_mid_slide_sees_both_pages() {
        let pagination = pagination();
        let text = visible_page_text(&pagination, &page_viewport(&pagination, 270.0));
        assert!(text.contains("abcd"));
        assert!(text.ends_with("\n\nsecond page"));
    }

    #[test]
    fn test_voice_cancels_before_speaking() {
        let recorder = Recorder::default();
        let calls = recorder.calls.clone();
        let mut voice = VoiceOver::new(Box::new(recorder), SpeechParams::default());

        voice.speak("one");
        voice.speak("two");
        assert!(voice.is_speaking());
        assert_eq!(
            *calls.borrow(),
            vec!["cancel", "speak:one", "cancel", "speak:two"]
        );
    }

    #[test]
    fn test_speech_failure_resets_flag() {
        let recorder = Recorder {
            fail: true,
            ..Default::default()
        };
        let mut voice = VoiceOver::new(Box::new(recorder), SpeechParams::default());
        voice.speak("hello");
        assert!(!voice.is_speaking());
    }

    #[test]
    fn test_command_args_expand_placeholders() {
        let speech = CommandSpeech::new(
            "espeak-ng",
            vec![
                "-s".into(),
                "{rate_wpm}".into(),
                "-p".into(),
                "{pitch}".into(),
                "-a".into(),
                "{volume}".into(),
                "-v{language}".into(),
            ],
        );
        let params = SpeechParams {
            rate: 2.0,
            ..Default::default()
        };
        assert_eq!(
            speech.expand_args(&params),
            vec!["-s", "350", "-p", "50", "-a", "100"]
        );
    }
}
