// Shared test doubles for driving the scheduler without ffmpeg/ffprobe.
#![allow(dead_code)]

use mediapress_core::error::command_start_error;
use mediapress_core::external::detach_process_group;
use mediapress_core::{
    Confirm, CoreResult, EncodeJob, EncoderEvents, EncoderProcess, EncoderSpawner, MediaProbe,
};

use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::log_parser::try_parse_progress;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// ============================================================================
// LATCH
// ============================================================================

/// One-shot gate shared between a test and a scripted encoder.
#[derive(Default)]
pub struct Latch {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Latch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }

    pub fn is_open(&self) -> bool {
        *self.open.lock().unwrap()
    }

    /// Waits until opened; `false` on timeout.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self.open.lock().unwrap();
        let (guard, _) = self.cv.wait_timeout_while(guard, timeout, |open| !*open).unwrap();
        *guard
    }

    /// Waits until opened or until `abort` is set. `true` if opened.
    fn wait_unless(&self, abort: &AtomicBool) -> bool {
        loop {
            if self.wait(Duration::from_millis(10)) {
                return true;
            }
            if abort.load(Ordering::SeqCst) {
                return false;
            }
        }
    }
}

/// Polls `condition` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ============================================================================
// SCRIPTED ENCODER
// ============================================================================

#[derive(Clone)]
pub enum Step {
    /// A progress event at this many seconds of output.
    Progress(f64),
    /// An error-level log line.
    Line(&'static str),
    /// Opens the latch (tells the test the encoder got here).
    Signal(Arc<Latch>),
    /// Blocks until the latch opens (or the process is killed).
    Hold(Arc<Latch>),
}

#[derive(Clone)]
pub struct Script {
    pub steps: Vec<Step>,
    pub exit_code: i32,
    pub output: Vec<u8>,
    /// Keep running after `kill`, like a hung encoder.
    pub ignore_kill: bool,
    /// Back the process with a detached `sleep` so it has a real pid.
    pub os_process: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            exit_code: 0,
            output: b"encoded output".to_vec(),
            ignore_kill: false,
            os_process: false,
        }
    }
}

impl Script {
    /// Progress lines every `step` seconds up to `duration`, then exit 0.
    pub fn progress_to(duration: f64, step: f64) -> Self {
        let mut steps = Vec::new();
        let mut t = step;
        while t < duration {
            steps.push(Step::Progress(t));
            t += step;
        }
        steps.push(Step::Progress(duration));
        Self {
            steps,
            ..Self::default()
        }
    }

    pub fn failing(code: i32, lines: &[&'static str]) -> Self {
        Self {
            steps: lines.iter().map(|l| Step::Line(*l)).collect(),
            exit_code: code,
            ..Self::default()
        }
    }
}

struct SpawnerInner {
    scripts: Mutex<HashMap<String, Script>>,
    launches: Mutex<Vec<String>>,
    os_processes: Mutex<Vec<Child>>,
    missing_binary: bool,
}

/// `EncoderSpawner` that replays a script per source file name.
#[derive(Clone)]
pub struct ScriptedSpawner(Arc<SpawnerInner>);

impl ScriptedSpawner {
    pub fn new() -> Self {
        Self(Arc::new(SpawnerInner {
            scripts: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            os_processes: Mutex::new(Vec::new()),
            missing_binary: false,
        }))
    }

    /// Every launch fails as if ffmpeg were not installed.
    pub fn missing_binary() -> Self {
        Self(Arc::new(SpawnerInner {
            scripts: Mutex::new(HashMap::new()),
            launches: Mutex::new(Vec::new()),
            os_processes: Mutex::new(Vec::new()),
            missing_binary: true,
        }))
    }

    pub fn script(self, name: &str, script: Script) -> Self {
        self.0.scripts.lock().unwrap().insert(name.to_string(), script);
        self
    }

    pub fn launches(&self) -> Vec<String> {
        self.0.launches.lock().unwrap().clone()
    }

    /// Waits until every backing OS process has exited.
    pub fn os_processes_exited(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut children = self.0.os_processes.lock().unwrap();
        loop {
            if children
                .iter_mut()
                .all(|child| matches!(child.try_wait(), Ok(Some(_))))
            {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

fn progress_event(seconds: f64) -> FfmpegEvent {
    let h = (seconds / 3600.0).floor();
    let m = ((seconds - h * 3600.0) / 60.0).floor();
    let s = seconds - h * 3600.0 - m * 60.0;
    let line = format!(
        "frame=  100 fps= 25 q=28.0 size=  256KiB time={:02}:{:02}:{:05.2} bitrate= 800.0kbits/s speed=1.0x",
        h as u64, m as u64, s
    );
    FfmpegEvent::Progress(try_parse_progress(&line).expect("valid stats line"))
}

impl EncoderSpawner for ScriptedSpawner {
    type Process = ScriptedProcess;

    fn spawn(&self, job: &EncodeJob<'_>) -> CoreResult<ScriptedProcess> {
        let name = file_name(job.input);
        self.0.launches.lock().unwrap().push(name.clone());
        if self.0.missing_binary {
            return Err(command_start_error(
                "ffmpeg",
                io::Error::from(io::ErrorKind::NotFound),
            ));
        }
        let script = self
            .0
            .scripts
            .lock()
            .unwrap()
            .get(&name)
            .cloned()
            .unwrap_or_default();

        std::fs::write(job.output, &script.output)?;

        let pid = if script.os_process {
            let mut cmd = Command::new("sleep");
            cmd.arg("30");
            detach_process_group(&mut cmd);
            let child = cmd.spawn()?;
            let pid = child.id();
            self.0.os_processes.lock().unwrap().push(child);
            Some(pid)
        } else {
            None
        };

        let (tx, rx) = mpsc::channel::<FfmpegEvent>();
        let killed = Arc::new(AtomicBool::new(false));
        let feeder = {
            let killed = Arc::clone(&killed);
            let script = script.clone();
            thread::spawn(move || feed(script, tx, killed))
        };

        Ok(ScriptedProcess {
            pid,
            events: Some(rx),
            killed,
            feeder: Some(feeder),
            exit_code: script.exit_code,
            ignore_kill: script.ignore_kill,
        })
    }
}

fn feed(script: Script, tx: Sender<FfmpegEvent>, killed: Arc<AtomicBool>) {
    let never = AtomicBool::new(false);
    let abort: &AtomicBool = if script.ignore_kill { &never } else { &*killed };
    for step in script.steps {
        if abort.load(Ordering::SeqCst) {
            return;
        }
        match step {
            Step::Progress(t) => {
                let _ = tx.send(progress_event(t));
            }
            Step::Line(line) => {
                let _ = tx.send(FfmpegEvent::Log(LogLevel::Error, line.to_string()));
            }
            Step::Signal(latch) => latch.open(),
            Step::Hold(latch) => {
                if !latch.wait_unless(abort) {
                    return;
                }
            }
        }
    }
}

pub struct ScriptedProcess {
    pid: Option<u32>,
    events: Option<Receiver<FfmpegEvent>>,
    killed: Arc<AtomicBool>,
    feeder: Option<JoinHandle<()>>,
    exit_code: i32,
    ignore_kill: bool,
}

impl EncoderProcess for ScriptedProcess {
    fn id(&mut self) -> Option<u32> {
        self.pid
    }

    fn take_events(&mut self) -> CoreResult<Option<EncoderEvents>> {
        Ok(self
            .events
            .take()
            .map(|rx| Box::new(rx.into_iter()) as EncoderEvents))
    }

    fn kill(&mut self) -> CoreResult<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn wait(&mut self) -> CoreResult<Option<i32>> {
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.join();
        }
        if self.killed.load(Ordering::SeqCst) && !self.ignore_kill {
            Ok(None)
        } else {
            Ok(Some(self.exit_code))
        }
    }
}

// ============================================================================
// PROBE AND CONFIRM
// ============================================================================

/// Probe answering from a table keyed by file name.
#[derive(Default)]
pub struct TableProbe {
    entries: HashMap<String, (Option<f64>, Option<String>)>,
    started: Option<Arc<Latch>>,
    hold: Option<Arc<Latch>>,
}

impl TableProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration lookups open `started`, then block until `hold` opens.
    pub fn holding(mut self, started: Arc<Latch>, hold: Arc<Latch>) -> Self {
        self.started = Some(started);
        self.hold = Some(hold);
        self
    }

    pub fn with(mut self, name: &str, duration: Option<f64>, codec: Option<&str>) -> Self {
        self.entries
            .insert(name.to_string(), (duration, codec.map(String::from)));
        self
    }
}

impl MediaProbe for TableProbe {
    fn duration(&self, path: &Path) -> Option<f64> {
        if let Some(started) = &self.started {
            started.open();
        }
        if let Some(hold) = &self.hold {
            hold.wait(Duration::from_secs(10));
        }
        self.entries.get(&file_name(path)).and_then(|e| e.0)
    }

    fn codec(&self, path: &Path) -> Option<String> {
        self.entries.get(&file_name(path)).and_then(|e| e.1.clone())
    }
}

type PromptHook = Box<dyn Fn(&str) + Send + Sync>;

/// Answers prompts from a queue (default: the prompt's default answer).
pub struct ScriptedConfirm {
    answers: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
    on_prompt: Option<PromptHook>,
}

impl ScriptedConfirm {
    pub fn answering(answers: &[bool]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            prompts: Mutex::new(Vec::new()),
            on_prompt: None,
        }
    }

    pub fn on_prompt(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_prompt = Some(Box::new(hook));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(hook) = &self.on_prompt {
            hook(prompt);
        }
        self.answers.lock().unwrap().pop_front().unwrap_or(default)
    }
}
