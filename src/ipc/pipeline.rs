use anyhow::Result;
use log::{error, info, warn};
use std::{
    sync::{
        Arc, Mutex,
        mpsc::{Receiver, RecvTimeoutError, TryRecvError},
    },
    time::{Duration, Instant},
};

use super::dispatch::{Dispatched, dispatch_gesture};
use crate::actions::{MouseSink, UinputSink};
use crate::config::{GestureSettings, Profile};
use crate::gestures::{Gesture, GestureDetector};
use crate::mapper::CursorMapper;
use crate::source::{self, Frame, LandmarkSource, SourceError};

/// Detector, mapper and enable switches for one tracked hand.
#[derive(Debug)]
pub struct Session {
    detector: GestureDetector,
    mapper: CursorMapper,
    settings: GestureSettings,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub gesture: Gesture,
    pub dispatched: Dispatched,
    pub fingers: Option<usize>,
}

impl Session {
    pub fn new(profile: &Profile) -> Self {
        Self {
            detector: GestureDetector::new(&profile.gestures),
            mapper: CursorMapper::new(profile),
            settings: profile.gestures.clone(),
        }
    }

    pub fn mapper(&self) -> &CursorMapper {
        &self.mapper
    }

    /// Live update; tracking history survives.
    pub fn apply(&mut self, profile: &Profile) {
        self.detector.configure(&profile.gestures);
        self.mapper.apply(profile);
        self.settings = profile.gestures.clone();
    }

    pub fn reset(&mut self) {
        self.detector.reset();
        self.mapper.reset_smoothing();
    }

    pub fn tick<S: MouseSink + ?Sized>(&mut self, frame: &Frame, sink: &mut S) -> Result<Tick> {
        let hand = frame.hand.as_ref();
        let gesture = self.detector.update(hand, frame.timestamp);
        if hand.is_none() {
            // the next sighting must not be pulled toward a stale seed
            self.mapper.reset_smoothing();
        }
        let dispatched = dispatch_gesture(
            &gesture,
            frame.timestamp,
            &self.settings,
            &mut self.mapper,
            sink,
        )?;
        Ok(Tick {
            gesture,
            dispatched,
            fingers: hand.map(|h| h.count_extended_fingers()),
        })
    }
}

/// Snapshot served by the `status` op.
#[derive(Debug, Clone, Default)]
pub struct PipelineStatus {
    pub running: bool,
    pub paused: bool,
    pub fps: f64,
    pub frames: u64,
    pub hand_detected: bool,
    pub fingers: Option<usize>,
    pub last_gesture: String,
}

impl PipelineStatus {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "running": self.running,
            "paused": self.paused,
            "fps": (self.fps * 10.0).round() / 10.0,
            "frames": self.frames,
            "hand_detected": self.hand_detected,
            "fingers": self.fingers,
            "last_gesture": self.last_gesture,
        })
    }
}

pub enum PipelineCtl {
    Profile(Box<Profile>),
    Pause,
    Resume,
    Reset,
}

/// Frames per second over windows of at least one second.
struct FpsCounter {
    frames: u32,
    window_start: Instant,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            window_start: Instant::now(),
        }
    }

    fn frame(&mut self) -> Option<f64> {
        self.frames += 1;
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return None;
        }
        let fps = f64::from(self.frames) / elapsed;
        self.frames = 0;
        self.window_start = Instant::now();
        Some(fps)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Drained {
    Ended,
    Reopen,
    Disconnected,
}

struct Pipeline {
    profile: Profile,
    session: Session,
    sink: UinputSink,
    status: Arc<Mutex<PipelineStatus>>,
    paused: bool,
}

impl Pipeline {
    fn set_status(&self, f: impl FnOnce(&mut PipelineStatus)) {
        if let Ok(mut st) = self.status.lock() {
            f(&mut st);
        }
    }

    /// Returns true when the landmark source should be reopened.
    fn handle_ctl(&mut self, msg: PipelineCtl) -> bool {
        match msg {
            PipelineCtl::Profile(p) => {
                let reopen = p.source.path != self.profile.source.path;
                if p.screen.width != self.profile.screen.width
                    || p.screen.height != self.profile.screen.height
                {
                    self.sink = UinputSink::new_or_noop(&p.screen);
                    self.sink.set_enabled(!self.paused);
                }
                self.session.apply(&p);
                self.profile = *p;
                info!("pipeline: profile applied");
                reopen
            }
            PipelineCtl::Pause => {
                self.paused = true;
                self.sink.set_enabled(false);
                self.set_status(|s| s.paused = true);
                info!("pipeline: paused");
                false
            }
            PipelineCtl::Resume => {
                self.paused = false;
                self.sink.set_enabled(true);
                self.session.reset();
                self.set_status(|s| s.paused = false);
                info!("pipeline: resumed");
                false
            }
            PipelineCtl::Reset => {
                self.session.reset();
                false
            }
        }
    }

    /// Feeds frames until the source ends, a profile moves it, or the control
    /// channel closes.
    fn drain(&mut self, src: &mut impl LandmarkSource, rx_ctl: &Receiver<PipelineCtl>) -> Drained {
        let mut fps = FpsCounter::new();
        loop {
            let mut reopen = false;
            loop {
                match rx_ctl.try_recv() {
                    Ok(msg) => reopen |= self.handle_ctl(msg),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return Drained::Disconnected,
                }
            }
            if reopen {
                self.feed_closed();
                return Drained::Reopen;
            }

            match src.next_frame() {
                Ok(Some(frame)) => self.on_frame(&frame, &mut fps),
                Ok(None) => {
                    info!("landmark feed ended");
                    self.feed_closed();
                    return Drained::Ended;
                }
                Err(SourceError::Io(e)) => {
                    warn!("landmark feed failed: {e}");
                    self.feed_closed();
                    return Drained::Ended;
                }
                Err(e) => warn!("skipping frame: {e}"),
            }
        }
    }

    /// The next feed stamps frames on its own clock, so no timing or
    /// position history may carry over.
    fn feed_closed(&mut self) {
        self.session.reset();
        self.set_status(|s| {
            s.hand_detected = false;
            s.fps = 0.0;
        });
    }

    fn on_frame(&mut self, frame: &Frame, fps: &mut FpsCounter) {
        let rate = fps.frame();
        if self.paused {
            return;
        }
        let label = match self.session.tick(frame, &mut self.sink) {
            Ok(t) => {
                let label = t.dispatched.label;
                let fingers = t.fingers;
                self.set_status(|s| s.fingers = fingers);
                label
            }
            Err(e) => {
                error!("dispatch failed: {e}");
                "None"
            }
        };
        let seen = frame.hand.is_some();
        self.set_status(|s| {
            s.frames += 1;
            s.hand_detected = seen;
            s.last_gesture = label.to_string();
            if let Some(r) = rate {
                s.fps = r;
            }
        });
    }
}

/// Drives the core from the configured landmark feed until the control
/// channel closes.
pub fn run_pipeline(
    profile: Profile,
    status: Arc<Mutex<PipelineStatus>>,
    rx_ctl: Receiver<PipelineCtl>,
) -> Result<()> {
    let sink = UinputSink::new_or_noop(&profile.screen);
    let mut p = Pipeline {
        session: Session::new(&profile),
        profile,
        sink,
        status,
        paused: false,
    };
    p.set_status(|s| s.running = true);

    loop {
        let opened = match p.profile.source.path.as_deref() {
            None => {
                warn!("no landmark source configured; pipeline idle");
                None
            }
            Some(path) => match source::open(path) {
                Ok(src) => {
                    info!("pipeline: reading landmarks from {}", path.display());
                    Some(src)
                }
                Err(e) => {
                    warn!("failed to open landmark source {}: {e}", path.display());
                    None
                }
            },
        };

        if let Some(mut src) = opened {
            match p.drain(&mut src, &rx_ctl) {
                Drained::Disconnected => return Ok(()),
                Drained::Reopen => continue,
                Drained::Ended => {}
            }
        }

        // no feed, or it ended: idle until a profile points somewhere else
        loop {
            match rx_ctl.recv_timeout(Duration::from_secs(1)) {
                Ok(msg) => {
                    // any profile push is a cue to retry the feed
                    let retry = matches!(msg, PipelineCtl::Profile(_));
                    if p.handle_ctl(msg) || retry {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
    }
}
