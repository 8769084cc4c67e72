pub mod figure;

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

pub use figure::confusion_image;

pub const EVENTS_FILE: &str = "events.jsonl";
pub const FIGURES_DIR: &str = "figures";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarEvent {
    pub name: String,
    pub value: f64,
    pub epoch: usize,
}

impl ScalarEvent {
    pub fn new(name: impl Into<String>, value: f64, epoch: usize) -> ScalarEvent {
        ScalarEvent { name: name.into(), value, epoch }
    }
}

/// One line of `events.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkEvent {
    Scalar(ScalarEvent),
    Figure { name: String, epoch: usize, file: String },
    Text { name: String, epoch: usize, body: String },
}

/// Write-only logger for metrics and figures. Errors are reported to the
/// caller, which logs them and carries on.
pub trait MetricsSink: Send {
    fn open_run(&mut self, run_dir: &Path) -> Result<()>;
    fn scalar(&mut self, event: &ScalarEvent) -> Result<()>;
    fn figure(&mut self, name: &str, epoch: usize, image: &GrayImage) -> Result<()>;
    fn text(&mut self, name: &str, epoch: usize, body: &str) -> Result<()>;
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn open_run(&mut self, _run_dir: &Path) -> Result<()> {
        Ok(())
    }
    fn scalar(&mut self, _event: &ScalarEvent) -> Result<()> {
        Ok(())
    }
    fn figure(&mut self, _name: &str, _epoch: usize, _image: &GrayImage) -> Result<()> {
        Ok(())
    }
    fn text(&mut self, _name: &str, _epoch: usize, _body: &str) -> Result<()> {
        Ok(())
    }
}

/// Appends events to `<run_dir>/events.jsonl`; figures become PNG files under
/// `<run_dir>/figures/`.
#[derive(Default)]
pub struct JsonlSink {
    run_dir: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    pub fn new() -> JsonlSink {
        JsonlSink::default()
    }

    fn append(&mut self, event: &SinkEvent) -> Result<()> {
        let (dir, writer) = match (&self.run_dir, &mut self.writer) {
            (Some(d), Some(w)) => (d, w),
            _ => return Err(TrainError::InvalidConfig("sink used before open_run".into())),
        };
        let path = dir.join(EVENTS_FILE);
        let line = serde_json::to_string(event).map_err(|e| TrainError::json(&path, e))?;
        writeln!(writer, "{}", line).map_err(|e| TrainError::io(&path, e))?;
        // The dashboard tails this file, so keep it current.
        writer.flush().map_err(|e| TrainError::io(&path, e))
    }
}

impl MetricsSink for JsonlSink {
    fn open_run(&mut self, run_dir: &Path) -> Result<()> {
        let figures = run_dir.join(FIGURES_DIR);
        fs::create_dir_all(&figures).map_err(|e| TrainError::io(&figures, e))?;
        let path = run_dir.join(EVENTS_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| TrainError::io(&path, e))?;
        self.run_dir = Some(run_dir.to_path_buf());
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    fn scalar(&mut self, event: &ScalarEvent) -> Result<()> {
        self.append(&SinkEvent::Scalar(event.clone()))
    }

    fn figure(&mut self, name: &str, epoch: usize, image: &GrayImage) -> Result<()> {
        let dir = self
            .run_dir
            .as_ref()
            .ok_or_else(|| TrainError::InvalidConfig("sink used before open_run".into()))?;
        let file = format!("{}_epoch{:03}.png", name.replace('/', "_"), epoch);
        let path = dir.join(FIGURES_DIR).join(&file);
        image
            .save(&path)
            .map_err(|source| TrainError::Image { path: path.clone(), source })?;
        self.append(&SinkEvent::Figure { name: name.to_string(), epoch, file })
    }

    fn text(&mut self, name: &str, epoch: usize, body: &str) -> Result<()> {
        self.append(&SinkEvent::Text { name: name.to_string(), epoch, body: body.to_string() })
    }

    fn flush(&mut self) -> Result<()> {
        if let (Some(dir), Some(w)) = (&self.run_dir, &mut self.writer) {
            w.flush().map_err(|e| TrainError::io(dir.join(EVENTS_FILE), e))?;
        }
        Ok(())
    }
}

/// Keeps events in memory. Clones share the same buffer, so a handle kept
/// by the caller sees what the trainer logged.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
    run_dir: Arc<Mutex<Option<PathBuf>>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Values of every scalar named `name`, in logging order.
    pub fn scalars(&self, name: &str) -> Vec<(usize, f64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Scalar(s) if s.name == name => Some((s.epoch, s.value)),
                _ => None,
            })
            .collect()
    }

    pub fn run_dir(&self) -> Option<PathBuf> {
        self.run_dir.lock().ok().and_then(|d| d.clone())
    }

    fn push(&self, event: SinkEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl MetricsSink for MemorySink {
    fn open_run(&mut self, run_dir: &Path) -> Result<()> {
        if let Ok(mut d) = self.run_dir.lock() {
            *d = Some(run_dir.to_path_buf());
        }
        Ok(())
    }

    fn scalar(&mut self, event: &ScalarEvent) -> Result<()> {
        self.push(SinkEvent::Scalar(event.clone()));
        Ok(())
    }

    fn figure(&mut self, name: &str, epoch: usize, image: &GrayImage) -> Result<()> {
        let file = format!("{}x{}", image.width(), image.height());
        self.push(SinkEvent::Figure { name: name.to_string(), epoch, file });
        Ok(())
    }

    fn text(&mut self, name: &str, epoch: usize, body: &str) -> Result<()> {
        self.push(SinkEvent::Text { name: name.to_string(), epoch, body: body.to_string() });
        Ok(())
    }
}
