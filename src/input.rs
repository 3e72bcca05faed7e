//! Observation source: the hand detector's JSON-lines output.
//!
//! One frame per line:
//! `{"t": 1.25, "hands": [{"score": 0.93, "landmarks": [[x, y, z], ...]}]}`
//! `t` (seconds, monotonic) and `score` are optional. Landmarks may also be
//! `{"x": .., "y": ..}` objects.

use anyhow::{Context, Result, anyhow};
use log::{info, warn};
use serde::Deserialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    process::{Child, Command, Stdio},
    sync::{Arc, Mutex},
};

use crate::landmarks::Landmark;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointJson {
    Array(Vec<f32>),
    Object { x: f32, y: f32 },
}

#[derive(Debug, Deserialize)]
struct HandJson {
    #[serde(default)]
    score: Option<f32>,
    landmarks: Vec<PointJson>,
}

#[derive(Debug, Deserialize)]
struct FrameJson {
    #[serde(default)]
    t: Option<f64>,
    #[serde(default)]
    hands: Vec<HandJson>,
}

/// One decoded frame: at most one hand, not yet validated for count.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub t: Option<f64>,
    pub hand: Option<Vec<Landmark>>,
}

/// Decodes a frame, dropping hands under `min_confidence` and keeping only
/// the first remaining one.
pub fn decode_frame(line: &str, min_confidence: f32) -> Result<Frame> {
    let frame: FrameJson = serde_json::from_str(line).context("invalid frame json")?;
    let hand = frame
        .hands
        .into_iter()
        .find(|h| h.score.is_none_or(|s| s >= min_confidence))
        .map(|h| {
            h.landmarks
                .into_iter()
                .enumerate()
                .map(|(i, p)| match p {
                    PointJson::Array(v) if v.len() >= 2 => Ok(Landmark::new(v[0], v[1])),
                    PointJson::Array(v) => {
                        Err(anyhow!("landmark {i} has {} coordinates", v.len()))
                    }
                    PointJson::Object { x, y } => Ok(Landmark::new(x, y)),
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;
    Ok(Frame { t: frame.t, hand })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Stdin,
    File(PathBuf),
    /// Shell command whose stdout is the frame stream.
    Command(String),
}

/// Shared handle to a spawned detector process.
#[derive(Debug, Clone)]
pub struct DetectorHandle(Arc<Mutex<Option<Child>>>);

impl DetectorHandle {
    fn new(child: Child) -> Self {
        Self(Arc::new(Mutex::new(Some(child))))
    }

    /// Kills and reaps the detector. Its stdout closes, so a reader blocked
    /// on it sees end of stream. Later calls do nothing.
    pub fn stop(&self) {
        let child = self.0.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(mut child) = child {
            let pid = child.id();
            if let Err(e) = child.kill() {
                warn!("failed to stop detector: {e}");
            }
            let _ = child.wait();
            info!("detector stopped (pid={pid})");
        }
    }
}

/// Non-empty lines from a [`Source`]. Kills a spawned detector on drop.
pub struct FrameReader {
    lines: Box<dyn Iterator<Item = io::Result<String>> + Send>,
    detector: Option<DetectorHandle>,
}

impl FrameReader {
    pub fn open(source: &Source) -> Result<Self> {
        match source {
            Source::Stdin => Ok(Self {
                lines: Box::new(BufReader::new(io::stdin()).lines()),
                detector: None,
            }),
            Source::File(path) => {
                let f = File::open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                Ok(Self {
                    lines: Box::new(BufReader::new(f).lines()),
                    detector: None,
                })
            }
            Source::Command(cmd) => {
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .with_context(|| format!("failed to spawn detector: {cmd}"))?;
                let stdout = child
                    .stdout
                    .take()
                    .ok_or_else(|| anyhow!("detector stdout unavailable"))?;
                info!("detector started (pid={}): {cmd}", child.id());
                Ok(Self {
                    lines: Box::new(BufReader::new(stdout).lines()),
                    detector: Some(DetectorHandle::new(child)),
                })
            }
        }
    }

    /// Handle for stopping the detector from another thread; `None` unless
    /// the source is a command.
    pub fn detector(&self) -> Option<DetectorHandle> {
        self.detector.clone()
    }
}

impl Iterator for FrameReader {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.lines.next()? {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(Ok(line)),
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        if let Some(d) = &self.detector {
            d.stop();
        }
    }
}
