//! Landmark feed: one JSON object per frame, one frame per line.
//!
//! ```text
//! {"t": 12.033, "hand": {"handedness": "Right", "points": [[x, y, z], ...21]}}
//! {"t": 12.066, "hand": null}
//! ```
//!
//! `t` (seconds, monotonic) is optional; frames without it are stamped on read.

use serde::Deserialize;
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
    time::Instant,
};
use thiserror::Error;

use crate::landmarks::{Handedness, LandmarkSet, Point3};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: not valid UTF-8")]
    Encoding { line: usize },
    #[error("line {line}: expected 21 landmarks, got {count}")]
    LandmarkCount { line: usize, count: usize },
    #[error("landmark feed read failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// seconds
    pub timestamp: f64,
    pub hand: Option<LandmarkSet>,
}

#[derive(Deserialize)]
struct RawHand {
    handedness: Handedness,
    points: Vec<Point3>,
}

#[derive(Deserialize)]
struct RawFrame {
    t: Option<f64>,
    hand: Option<RawHand>,
}

pub trait LandmarkSource {
    /// `Ok(None)` at end of stream. A malformed frame is an error for that
    /// frame only; the next call continues with the following line.
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError>;
}

pub struct JsonLinesSource<R> {
    reader: R,
    line_no: usize,
    clock: Instant,
    buf: Vec<u8>,
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_no: 0,
            clock: Instant::now(),
            buf: Vec::new(),
        }
    }

    fn parse(&self, line: &str) -> Result<Frame, SourceError> {
        let raw: RawFrame = serde_json::from_str(line).map_err(|source| SourceError::Json {
            line: self.line_no,
            source,
        })?;
        let hand = match raw.hand {
            None => None,
            Some(h) => Some(LandmarkSet::from_points(&h.points, h.handedness).ok_or(
                SourceError::LandmarkCount {
                    line: self.line_no,
                    count: h.points.len(),
                },
            )?),
        };
        Ok(Frame {
            timestamp: raw
                .t
                .unwrap_or_else(|| self.clock.elapsed().as_secs_f64()),
            hand,
        })
    }
}

impl<R: BufRead> LandmarkSource for JsonLinesSource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            let Ok(text) = std::str::from_utf8(&self.buf) else {
                return Err(SourceError::Encoding { line: self.line_no });
            };
            let line = text.trim();
            if line.is_empty() {
                continue;
            }
            return self.parse(line).map(Some);
        }
    }
}

pub type BoxedReader = Box<dyn BufRead + Send>;

/// Opens a feed by path; `-` is stdin.
pub fn open(path: &Path) -> io::Result<JsonLinesSource<BoxedReader>> {
    let reader: BoxedReader = if path.as_os_str() == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(path)?))
    };
    Ok(JsonLinesSource::new(reader))
}
