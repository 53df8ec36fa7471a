#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use shadercap_capture_engine::{ExportOrchestrator, OrchestratorConfig};
use shadercap_common::error::{ShadercapError, ShadercapResult};
use shadercap_encoder::{remove_frames, EncodeJob, EncodeReport, EncoderBackend, FormatOutcome};
use shadercap_session_model::{ExportSettings, Notification, Notifier, OutputFormats};
use shadercap_surface_driver::{scripts, DriverConfig, RenderSurface, SurfaceDriver};
use tokio::sync::mpsc;

pub const TARGET: &str = "https://www.shadertoy.com/view/XsXXDn";
pub const TARGET_ID: &str = "XsXXDn";

#[derive(Default)]
pub struct SurfaceState {
    pub loaded_urls: Vec<String>,
    pub start_calls: usize,
    pub restore_calls: usize,
    /// When set, a start command makes the page post this many-pixel frames
    /// followed by `export_complete`.
    pub auto_frames: Option<(u32, u32)>,
}

/// In-memory page that answers the driver's scripts.
#[derive(Clone)]
pub struct FakeSurface {
    pub state: Arc<Mutex<SurfaceState>>,
    outbox: mpsc::UnboundedSender<String>,
}

impl FakeSurface {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(SurfaceState::default())),
                outbox,
            },
            inbox,
        )
    }

    pub fn post(&self, value: Value) {
        let _ = self.outbox.send(value.to_string());
    }

    pub fn post_raw(&self, raw: &str) {
        let _ = self.outbox.send(raw.to_string());
    }

    pub fn start_calls(&self) -> usize {
        self.state.lock().unwrap().start_calls
    }

    pub fn restore_calls(&self) -> usize {
        self.state.lock().unwrap().restore_calls
    }
}

#[async_trait::async_trait]
impl RenderSurface for FakeSurface {
    async fn load_url(&self, url: &str) -> ShadercapResult<()> {
        self.state.lock().unwrap().loaded_urls.push(url.to_string());
        Ok(())
    }

    async fn eval_script(&self, script: &str) -> ShadercapResult<Value> {
        if script == scripts::restore() {
            self.state.lock().unwrap().restore_calls += 1;
            return Ok(Value::Bool(true));
        }
        if script.contains("window.__shadercap.start(") {
            let auto = {
                let mut state = self.state.lock().unwrap();
                state.start_calls += 1;
                state.auto_frames
            };
            if let Some((width, height)) = auto {
                for i in 0..total_frames(script) {
                    self.post(frame_message(i as i64, width, height));
                }
                self.post(json!({ "type": "export_complete" }));
            }
            return Ok(Value::Bool(true));
        }
        Ok(Value::Bool(true))
    }

    async fn inject_deferred(&self, _script: &str) -> ShadercapResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

fn total_frames(script: &str) -> u64 {
    let key = "\"totalFrames\":";
    let start = script.find(key).expect("start command carries totalFrames") + key.len();
    script[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap()
}

/// Base64 of a `width`×`height` raw RGBA buffer.
pub fn rgba_payload(width: u32, height: u32) -> String {
    let bytes: Vec<u8> = (0..width * height * 4).map(|i| (i % 256) as u8).collect();
    STANDARD.encode(bytes)
}

pub fn frame_message(index: i64, width: u32, height: u32) -> Value {
    json!({
        "type": "frame_data",
        "frameNumber": index,
        "width": width,
        "height": height,
        "data": rgba_payload(width, height),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderMode {
    Succeed,
    FailFormats,
    FailJob,
}

/// Encoder double: records jobs, counts frames on disk, and cleans up like
/// the real backend.
pub struct RecordingEncoder {
    pub mode: EncoderMode,
    pub jobs: Mutex<Vec<EncodeJob>>,
    pub frames_seen: Mutex<Vec<usize>>,
}

impl RecordingEncoder {
    pub fn new(mode: EncoderMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            jobs: Mutex::new(Vec::new()),
            frames_seen: Mutex::new(Vec::new()),
        })
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl EncoderBackend for RecordingEncoder {
    async fn encode(&self, job: EncodeJob) -> ShadercapResult<EncodeReport> {
        self.jobs.lock().unwrap().push(job.clone());
        self.frames_seen
            .lock()
            .unwrap()
            .push(count_frames(&job.frames_dir));

        if self.mode == EncoderMode::FailJob {
            return Err(ShadercapError::Other(anyhow::anyhow!("encoder unavailable")));
        }

        let mut report = EncodeReport::default();
        for format in job.formats.requested() {
            let error = (self.mode == EncoderMode::FailFormats)
                .then(|| ShadercapError::subprocess(format.label(), "exit status: 1", "boom"));
            report.outcomes.push(FormatOutcome {
                format,
                output: job.output_path(format),
                error,
            });
        }
        if report.any_succeeded() && !job.keep_frames {
            report.frames_deleted = remove_frames(&job.frames_dir);
        }
        Ok(report)
    }

    fn name(&self) -> &str {
        "recording"
    }
}

pub fn count_frames(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.file_name().to_string_lossy().starts_with("frame_"))
                .count()
        })
        .unwrap_or(0)
}

pub fn settings(output_directory: &Path) -> ExportSettings {
    ExportSettings {
        width: 320,
        height: 240,
        fps: 10,
        start_time_secs: 0.0,
        duration_secs: 1.0,
        output_directory: output_directory.to_path_buf(),
        crf: 18,
        formats: OutputFormats {
            mp4: true,
            gif: false,
        },
        gif_max_width: 640,
        keep_frames: false,
    }
}

pub struct Harness {
    pub orchestrator: ExportOrchestrator<FakeSurface>,
    pub surface: FakeSurface,
    pub encoder: Arc<RecordingEncoder>,
    pub events: mpsc::UnboundedReceiver<Notification>,
}

impl Harness {
    pub fn new(settings: ExportSettings, encoder: Arc<RecordingEncoder>) -> Self {
        Self::with_backend(settings, encoder.clone(), encoder)
    }

    pub fn with_backend(
        settings: ExportSettings,
        encoder: Arc<RecordingEncoder>,
        backend: Arc<dyn EncoderBackend>,
    ) -> Self {
        let (surface, inbox) = FakeSurface::new();
        let (notifier, events) = Notifier::channel();
        let driver = SurfaceDriver::new(
            surface.clone(),
            inbox,
            notifier.clone(),
            DriverConfig::default(),
        );
        let orchestrator = ExportOrchestrator::new(
            driver,
            Arc::new(settings),
            backend,
            notifier,
            OrchestratorConfig::default(),
        );
        Self {
            orchestrator,
            surface,
            encoder,
            events,
        }
    }

    /// A harness with `TARGET` already loaded and its notifications consumed.
    pub async fn loaded(settings: ExportSettings, encoder: Arc<RecordingEncoder>) -> Self {
        let mut harness = Self::new(settings, encoder);
        harness.orchestrator.load_target(TARGET).await.unwrap();
        harness.drain_events();
        harness
    }

    pub fn drain_events(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }

    /// Notifications other than status lines.
    pub fn lifecycle_events(&mut self) -> Vec<Notification> {
        self.drain_events()
            .into_iter()
            .filter(|e| !matches!(e, Notification::StatusChanged { .. }))
            .collect()
    }

    pub fn target_dir(&self, output: &Path) -> PathBuf {
        output.join(TARGET_ID)
    }
}

pub fn statuses(events: &[Notification]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Notification::StatusChanged { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
