//! Shared test utilities
//!
//! In-memory stand-ins for the device protocol, the speech renderer and the
//! language model services.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use handset::device::{EscapeStyle, Pace};
use handset::pipeline::Dispatcher;
use handset::services::AnswerService;
use handset::voice::{SpeechCapture, SpeechRenderer, SpeechSink};
use handset::{
    Actuator, AppRegistry, ClassifierService, DeviceController, DeviceEntry, Error, KeyCode,
    LaunchStrategy, Result,
};

/// A protocol call recorded by [`FakeDevice`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListDevices,
    Tap(u32, u32),
    Text(String),
    Key(KeyCode),
    IsInstalled(String),
    ListPackages,
    Start(String, LaunchStrategy),
    Screenshot(PathBuf),
}

impl Call {
    /// Whether the call changes device state
    pub fn is_actuation(&self) -> bool {
        matches!(
            self,
            Self::Tap(..) | Self::Text(_) | Self::Key(_) | Self::Start(..) | Self::Screenshot(_)
        )
    }
}

/// Scriptable in-memory device
pub struct FakeDevice {
    devices: Mutex<Vec<DeviceEntry>>,
    installed: HashSet<String>,
    packages: Vec<String>,
    launch: HashMap<LaunchStrategy, bool>,
    failing_strategies: HashSet<LaunchStrategy>,
    panicking_packages: HashSet<String>,
    fail_batch_text: bool,
    calls: Mutex<Vec<Call>>,
}

impl FakeDevice {
    /// One online device, nothing installed, every launch strategy succeeds
    pub fn connected() -> Self {
        Self {
            devices: Mutex::new(vec![DeviceEntry::new("emulator-5554", "device")]),
            installed: HashSet::new(),
            packages: Vec::new(),
            launch: HashMap::new(),
            failing_strategies: HashSet::new(),
            panicking_packages: HashSet::new(),
            fail_batch_text: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// No devices attached
    pub fn disconnected() -> Self {
        let device = Self::connected();
        device.devices.lock().unwrap().clear();
        device
    }

    pub fn with_installed(mut self, package: &str) -> Self {
        self.installed.insert(package.to_string());
        self.packages.push(package.to_string());
        self
    }

    /// Listed by the package listing but not by the exact install query
    pub fn with_listed_package(mut self, package: &str) -> Self {
        self.packages.push(package.to_string());
        self
    }

    pub fn with_launch(mut self, strategy: LaunchStrategy, succeeds: bool) -> Self {
        self.launch.insert(strategy, succeeds);
        self
    }

    /// Strategy whose protocol call itself errors
    pub fn with_erroring_strategy(mut self, strategy: LaunchStrategy) -> Self {
        self.failing_strategies.insert(strategy);
        self
    }

    /// Launching this package panics inside the controller
    pub fn with_panicking_launch(mut self, package: &str) -> Self {
        self.panicking_packages.insert(package.to_string());
        self
    }

    /// Reject multi-character text batches
    pub fn with_failing_batch_text(mut self) -> Self {
        self.fail_batch_text = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actuation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_actuation).collect()
    }

    pub fn start_calls(&self) -> Vec<(String, LaunchStrategy)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Start(pkg, strategy) => Some((pkg, strategy)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl DeviceController for FakeDevice {
    async fn list_devices(&self) -> Result<Vec<DeviceEntry>> {
        self.record(Call::ListDevices);
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn tap(&self, x: u32, y: u32) -> Result<()> {
        self.record(Call::Tap(x, y));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        self.record(Call::Text(text.to_string()));
        let single = text == "%s" || text.trim_start_matches('\\').chars().count() == 1;
        if self.fail_batch_text && !single {
            return Err(Error::Actuation("input text rejected".into()));
        }
        Ok(())
    }

    async fn key_event(&self, key: KeyCode) -> Result<()> {
        self.record(Call::Key(key));
        Ok(())
    }

    async fn is_installed(&self, package: &str) -> Result<bool> {
        self.record(Call::IsInstalled(package.to_string()));
        Ok(self.installed.contains(package))
    }

    async fn list_packages(&self) -> Result<Vec<String>> {
        self.record(Call::ListPackages);
        Ok(self.packages.clone())
    }

    async fn start_app(&self, package: &str, strategy: LaunchStrategy) -> Result<bool> {
        self.record(Call::Start(package.to_string(), strategy));
        assert!(
            !self.panicking_packages.contains(package),
            "launcher crashed for {package}"
        );
        if self.failing_strategies.contains(&strategy) {
            return Err(Error::Actuation(format!("{strategy} crashed")));
        }
        Ok(self.launch.get(&strategy).copied().unwrap_or(true))
    }

    async fn screenshot(&self, destination: &Path) -> Result<()> {
        self.record(Call::Screenshot(destination.to_path_buf()));
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(destination, b"\x89PNG")?;
        Ok(())
    }
}

/// Records rendered utterances and when each render ran
pub struct RecordingRenderer {
    render_time: Duration,
    spoken: Mutex<Vec<String>>,
    windows: Mutex<Vec<(Instant, Instant)>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::with_render_time(Duration::ZERO)
    }

    pub fn with_render_time(render_time: Duration) -> Self {
        Self {
            render_time,
            spoken: Mutex::new(Vec::new()),
            windows: Mutex::new(Vec::new()),
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn windows(&self) -> Vec<(Instant, Instant)> {
        self.windows.lock().unwrap().clone()
    }

    pub fn heard(&self, text: &str) -> bool {
        self.spoken().iter().any(|s| s == text)
    }
}

#[async_trait]
impl SpeechRenderer for RecordingRenderer {
    async fn render(&self, text: &str) -> Result<()> {
        let start = Instant::now();
        if !self.render_time.is_zero() {
            tokio::time::sleep(self.render_time).await;
        }
        self.spoken.lock().unwrap().push(text.to_string());
        self.windows.lock().unwrap().push((start, Instant::now()));
        Ok(())
    }
}

/// Classifier returning canned replies in order; the last reply repeats
pub struct ScriptedClassifier {
    replies: Mutex<VecDeque<Result<String>>>,
    last: Mutex<Option<String>>,
    calls: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok((*r).to_string())).collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails
    pub fn failing() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClassifierService for ScriptedClassifier {
    async fn classify(&self, _text: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(Ok(reply)) => {
                *self.last.lock().unwrap() = Some(reply.clone());
                Ok(reply)
            }
            Some(Err(e)) => Err(e),
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .ok_or_else(|| Error::Classification("service unavailable".into())),
        }
    }
}

/// Answer service echoing a fixed answer, or failing
pub struct ScriptedAnswers {
    answer: Option<String>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedAnswers {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerService for ScriptedAnswers {
    async fn answer(&self, query: &str) -> Result<String> {
        self.questions.lock().unwrap().push(query.to_string());
        self.answer
            .clone()
            .ok_or_else(|| Error::Llm("model offline".into()))
    }
}

/// Capture yielding scripted utterances, then reporting closed input
pub struct ScriptedCapture {
    utterances: Mutex<VecDeque<Result<String>>>,
}

impl ScriptedCapture {
    pub fn new(utterances: Vec<Result<String>>) -> Self {
        Self {
            utterances: Mutex::new(utterances.into()),
        }
    }

    pub fn lines(lines: &[&str]) -> Self {
        Self::new(lines.iter().map(|l| Ok((*l).to_string())).collect())
    }
}

impl SpeechCapture for ScriptedCapture {
    fn listen(&self) -> Result<String> {
        self.utterances
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(Error::InputClosed))
    }
}

/// Actuator over `device` with no delays and POSIX escaping
pub fn actuator(
    device: Arc<FakeDevice>,
    registry: AppRegistry,
    speech: SpeechSink,
    screenshot_dir: &Path,
) -> Actuator {
    Actuator::new(device, Arc::new(registry), speech, screenshot_dir.to_path_buf())
        .with_pace(Pace::instant())
        .with_escape(EscapeStyle::Posix)
}

/// Everything needed to drive a dispatcher in tests
pub struct Harness {
    pub device: Arc<FakeDevice>,
    pub renderer: Arc<RecordingRenderer>,
    pub answers: Arc<ScriptedAnswers>,
    pub speech: SpeechSink,
    pub dispatcher: Dispatcher,
    pub exits: Arc<AtomicUsize>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(device: FakeDevice, registry: AppRegistry, answers: ScriptedAnswers) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let device = Arc::new(device);
        let renderer = Arc::new(RecordingRenderer::new());
        let answers = Arc::new(answers);
        let speech = SpeechSink::new(renderer.clone());
        let exits = Arc::new(AtomicUsize::new(0));

        let actuator = actuator(device.clone(), registry, speech.clone(), dir.path());
        let exit_count = exits.clone();
        let dispatcher = Dispatcher::new(Arc::new(actuator), answers.clone(), speech.clone())
            .with_exit_hook(Arc::new(move || {
                exit_count.fetch_add(1, Ordering::SeqCst);
            }));

        Self {
            device,
            renderer,
            answers,
            speech,
            dispatcher,
            exits,
            dir,
        }
    }

    /// Wait for every queued utterance, then return all of them
    pub async fn spoken(&self) -> Vec<String> {
        self.speech.wait_idle().await;
        self.renderer.spoken()
    }
}

pub fn camera_registry() -> AppRegistry {
    AppRegistry::new([("camera", "com.android.camera2")])
}
