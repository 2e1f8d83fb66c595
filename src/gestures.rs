//! Per-tick gesture classification from one hand's landmarks.
//!
//! There is no stored mode tag: each tick re-derives the gesture from geometry
//! plus a small carried [`GestureState`], in fixed priority order
//! left click > right click > scroll > cursor move > none.

use log::{debug, info};

use crate::config::GestureSettings;
use crate::landmarks::{
    INDEX_FINGER_TIP, LandmarkSet, MIDDLE_FINGER_MCP, MIDDLE_FINGER_TIP, PINKY_TIP,
    RING_FINGER_TIP, THUMB_TIP, WRIST,
};

/// Normalized (x, y) in frame space.
pub type Position = (f64, f64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    None,
    CursorMove { position: Position, velocity: f64 },
    LeftClick { position: Position },
    RightClick { position: Position },
    /// `delta_y == 0.0` means scroll pose held without enough motion.
    Scroll { position: Position, delta_y: f64 },
    /// Reserved; never produced by the detector.
    Drag { position: Position },
}

impl Gesture {
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::CursorMove { .. } => "cursor_move",
            Self::LeftClick { .. } => "left_click",
            Self::RightClick { .. } => "right_click",
            Self::Scroll { .. } => "scroll",
            Self::Drag { .. } => "drag",
        }
    }

    pub fn position(&self) -> Option<Position> {
        match *self {
            Self::None => None,
            Self::CursorMove { position, .. }
            | Self::LeftClick { position }
            | Self::RightClick { position }
            | Self::Scroll { position, .. }
            | Self::Drag { position } => Some(position),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub pinch: f64,
    pub scroll: f64,
}

impl From<&GestureSettings> for Thresholds {
    fn from(s: &GestureSettings) -> Self {
        Self {
            pinch: s.pinch_threshold,
            scroll: s.scroll_threshold,
        }
    }
}

/// State carried between ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureState {
    /// Unset until the first click, so the first pinch is never debounced.
    pub last_trigger: Option<f64>,
    /// seconds; shared by both click kinds
    pub debounce: f64,
    pub pinched: bool,
    pub prev_index: Option<Position>,
    pub prev_scroll: Option<Position>,
}

impl GestureState {
    pub fn new(debounce: f64) -> Self {
        Self {
            last_trigger: None,
            debounce,
            pinched: false,
            prev_index: None,
            prev_scroll: None,
        }
    }

    pub fn can_trigger(&self, now: f64) -> bool {
        self.last_trigger
            .is_none_or(|last| now - last >= self.debounce)
    }

    fn trigger(&mut self, now: f64) {
        self.last_trigger = Some(now);
    }
}

fn xy(p: (f64, f64, f64)) -> Position {
    (p.0, p.1)
}

/// Thumb-to-finger distance relative to hand size (wrist to middle MCP).
/// A degenerate hand reads as 1.0, i.e. never pinched.
fn normalized_pinch(hand: &LandmarkSet, finger_tip: usize) -> f64 {
    let hand_size = hand.distance(WRIST, MIDDLE_FINGER_MCP);
    if hand_size > 0.0 {
        hand.distance(THUMB_TIP, finger_tip) / hand_size
    } else {
        1.0
    }
}

/// One tick of the detector as a pure function of thresholds, carried state,
/// this tick's observation and a monotonic timestamp in seconds.
pub fn transition(
    th: &Thresholds,
    mut st: GestureState,
    hand: Option<&LandmarkSet>,
    now: f64,
) -> (Gesture, GestureState) {
    let Some(hand) = hand else {
        st.prev_index = None;
        st.prev_scroll = None;
        return (Gesture::None, st);
    };

    let index_tip = xy(hand.landmark(INDEX_FINGER_TIP));
    let middle_tip = xy(hand.landmark(MIDDLE_FINGER_TIP));

    let index_pinched = normalized_pinch(hand, INDEX_FINGER_TIP) < th.pinch;
    let middle_pinched = normalized_pinch(hand, MIDDLE_FINGER_TIP) < th.pinch;

    // left click: latched, fires once per pinch
    if index_pinched && !st.pinched {
        if st.can_trigger(now) {
            st.pinched = true;
            st.trigger(now);
            debug!("left click at {index_tip:?}");
            return (Gesture::LeftClick { position: index_tip }, st);
        }
    } else if !index_pinched {
        st.pinched = false;
    }

    // right click: no latch, refires whenever the debounce window reopens
    if middle_pinched && st.can_trigger(now) {
        st.trigger(now);
        debug!("right click at {middle_tip:?}");
        return (Gesture::RightClick { position: middle_tip }, st);
    }

    let index_up = hand.is_extended(INDEX_FINGER_TIP);
    let middle_up = hand.is_extended(MIDDLE_FINGER_TIP);
    let ring_up = hand.is_extended(RING_FINGER_TIP);
    let pinky_up = hand.is_extended(PINKY_TIP);

    if index_up && middle_up && !ring_up && !pinky_up {
        let mid = (
            (index_tip.0 + middle_tip.0) / 2.0,
            (index_tip.1 + middle_tip.1) / 2.0,
        );
        let prev = st.prev_scroll.replace(mid);
        let delta_y = match prev {
            Some(p) if (mid.1 - p.1).abs() > th.scroll => {
                let d = mid.1 - p.1;
                debug!("scroll delta_y={d:.4}");
                d
            }
            _ => 0.0,
        };
        return (
            Gesture::Scroll {
                position: mid,
                delta_y,
            },
            st,
        );
    }
    st.prev_scroll = None;

    if index_up {
        let velocity = st.prev_index.map_or(0.0, |p| {
            let (dx, dy) = (index_tip.0 - p.0, index_tip.1 - p.1);
            (dx * dx + dy * dy).sqrt()
        });
        st.prev_index = Some(index_tip);
        return (
            Gesture::CursorMove {
                position: index_tip,
                velocity,
            },
            st,
        );
    }

    st.prev_index = None;
    (Gesture::None, st)
}

#[derive(Debug)]
pub struct GestureDetector {
    th: Thresholds,
    state: GestureState,
}

impl GestureDetector {
    pub fn new(settings: &GestureSettings) -> Self {
        info!(
            "gesture detector: pinch<{} scroll>{} debounce={}s",
            settings.pinch_threshold, settings.scroll_threshold, settings.click_debounce
        );
        Self {
            th: Thresholds::from(settings),
            state: GestureState::new(settings.click_debounce),
        }
    }

    /// Applies new thresholds without dropping latch or position history.
    pub fn configure(&mut self, settings: &GestureSettings) {
        self.th = Thresholds::from(settings);
        self.state.debounce = settings.click_debounce;
    }

    pub fn state(&self) -> &GestureState {
        &self.state
    }

    pub fn update(&mut self, hand: Option<&LandmarkSet>, now: f64) -> Gesture {
        let (gesture, next) = transition(&self.th, self.state, hand, now);
        self.state = next;
        gesture
    }

    /// Back to idle; the debounce interval survives.
    pub fn reset(&mut self) {
        self.state = GestureState::new(self.state.debounce);
        info!("gesture detector reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::fixtures::{pointing_hand, right, scroll_hand};
    use crate::landmarks::{INDEX_FINGER_PIP, MIDDLE_FINGER_PIP, Point3};

    fn detector() -> GestureDetector {
        GestureDetector::new(&GestureSettings::default())
    }

    fn detector_with_debounce(debounce: f64) -> GestureDetector {
        GestureDetector::new(&GestureSettings {
            click_debounce: debounce,
            ..Default::default()
        })
    }

    /// Thumb tip placed 0.003 from the index tip: 0.03 of a 0.1 hand.
    fn index_pinch() -> LandmarkSet {
        let mut p = pointing_hand();
        let (x, y, z) = p[INDEX_FINGER_TIP];
        p[THUMB_TIP] = (x + 0.003, y, z);
        right(p)
    }

    fn middle_pinch() -> LandmarkSet {
        let mut p = pointing_hand();
        p[THUMB_TIP] = p[MIDDLE_FINGER_TIP];
        right(p)
    }

    fn pointing_at(x: f64, y: f64) -> LandmarkSet {
        let mut p = pointing_hand();
        p[INDEX_FINGER_TIP] = (x, y, 0.0);
        right(p)
    }

    fn fist() -> LandmarkSet {
        let mut p = pointing_hand();
        p[INDEX_FINGER_TIP] = (0.48, 0.60, 0.0);
        right(p)
    }

    fn assert_scroll(g: Gesture, mid_y: f64, expected_delta: f64) {
        match g {
            Gesture::Scroll { position, delta_y } => {
                assert!((position.0 - 0.49).abs() < 1e-9, "{position:?}");
                assert!((position.1 - mid_y).abs() < 1e-9, "{position:?}");
                assert!((delta_y - expected_delta).abs() < 1e-9, "delta_y={delta_y}");
            }
            other => panic!("expected scroll, got {other:?}"),
        }
    }

    fn count(events: &[Gesture], name: &str) -> usize {
        events.iter().filter(|g| g.name() == name).count()
    }

    #[test]
    fn pinch_emits_left_click_and_latches() {
        let mut d = detector();
        let g = d.update(Some(&index_pinch()), 1.0);
        assert_eq!(
            g,
            Gesture::LeftClick {
                position: (0.48, 0.45)
            }
        );
        assert!(d.state().pinched);
        assert_eq!(d.state().last_trigger, Some(1.0));
    }

    #[test]
    fn sustained_pinch_clicks_once() {
        let mut d = detector();
        let hand = index_pinch();
        let events: Vec<_> = (0..60)
            .map(|i| d.update(Some(&hand), i as f64 / 30.0))
            .collect();
        assert_eq!(count(&events, "left_click"), 1);
        assert_eq!(events[0].name(), "left_click");
    }

    #[test]
    fn release_and_repinch_clicks_again() {
        let mut d = detector();
        let pinch = index_pinch();
        let open = pointing_at(0.48, 0.45);

        assert_eq!(d.update(Some(&pinch), 0.0).name(), "left_click");
        d.update(Some(&open), 0.5);
        assert!(!d.state().pinched);
        assert_eq!(d.update(Some(&pinch), 1.0).name(), "left_click");
    }

    #[test]
    fn debounce_blocks_quick_second_click() {
        let mut d = detector_with_debounce(0.3);
        let pinch = index_pinch();
        let open = pointing_at(0.48, 0.45);

        assert_eq!(d.update(Some(&pinch), 0.0).name(), "left_click");
        d.update(Some(&open), 0.1);
        let blocked = d.update(Some(&pinch), 0.2);
        assert_ne!(blocked.name(), "left_click");
        // blocked pinch does not latch
        assert!(!d.state().pinched);

        d.update(Some(&open), 0.35);
        assert_eq!(d.update(Some(&pinch), 0.4).name(), "left_click");
    }

    #[test]
    fn debounce_is_shared_between_buttons() {
        let mut d = detector_with_debounce(0.3);
        assert_eq!(d.update(Some(&index_pinch()), 0.0).name(), "left_click");
        assert_ne!(d.update(Some(&middle_pinch()), 0.1).name(), "right_click");
        assert_eq!(d.update(Some(&middle_pinch()), 0.5).name(), "right_click");
    }

    #[test]
    fn held_middle_pinch_repeats_right_click() {
        let mut d = detector_with_debounce(0.25);
        let hand = middle_pinch();
        let mut clicks = vec![];
        for i in 0..=8 {
            let t = i as f64 * 0.125;
            if let Gesture::RightClick { position } = d.update(Some(&hand), t) {
                assert_eq!(position, (0.5, 0.62));
                clicks.push(t);
            }
        }
        assert_eq!(clicks, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn zero_hand_size_never_pinches() {
        let mut p: [Point3; 21] = pointing_hand();
        p[MIDDLE_FINGER_MCP] = p[WRIST];
        let (x, y, z) = p[INDEX_FINGER_TIP];
        p[THUMB_TIP] = (x, y, z);
        let mut d = detector();
        let g = d.update(Some(&right(p)), 0.0);
        assert_eq!(g.name(), "cursor_move");
    }

    #[test]
    fn scroll_scenario() {
        let mut d = detector();
        let first = d.update(Some(&right(scroll_hand(0.40))), 0.0);
        assert_scroll(first, 0.40, 0.0);

        let second = d.update(Some(&right(scroll_hand(0.45))), 0.033);
        assert_scroll(second, 0.45, 0.05);
        assert_eq!(d.state().prev_scroll.map(|p| p.1), Some(0.45));
    }

    #[test]
    fn small_scroll_motion_moves_baseline() {
        let mut d = detector();
        for (i, y) in [0.40, 0.41, 0.42, 0.43].into_iter().enumerate() {
            let g = d.update(Some(&right(scroll_hand(y))), i as f64 * 0.033);
            assert_scroll(g, y, 0.0);
        }
    }

    #[test]
    fn upward_scroll_is_negative() {
        let mut d = detector();
        d.update(Some(&right(scroll_hand(0.40))), 0.0);
        match d.update(Some(&right(scroll_hand(0.30))), 0.033) {
            Gesture::Scroll { delta_y, .. } => assert!(delta_y < -0.02),
            other => panic!("expected scroll, got {other:?}"),
        }
    }

    #[test]
    fn leaving_scroll_pose_clears_baseline() {
        let mut d = detector();
        d.update(Some(&right(scroll_hand(0.40))), 0.0);
        d.update(Some(&pointing_at(0.5, 0.45)), 0.033);
        assert!(d.state().prev_scroll.is_none());
        let g = d.update(Some(&right(scroll_hand(0.45))), 0.066);
        assert_scroll(g, 0.45, 0.0);
    }

    #[test]
    fn cursor_velocity_tracks_index_tip() {
        let mut d = detector();
        match d.update(Some(&pointing_at(0.48, 0.45)), 0.0) {
            Gesture::CursorMove { velocity, .. } => assert_eq!(velocity, 0.0),
            other => panic!("expected cursor move, got {other:?}"),
        }
        match d.update(Some(&pointing_at(0.51, 0.49)), 0.033) {
            Gesture::CursorMove { position, velocity } => {
                assert_eq!(position, (0.51, 0.49));
                assert!((velocity - 0.05).abs() < 1e-9);
            }
            other => panic!("expected cursor move, got {other:?}"),
        }
    }

    #[test]
    fn gap_resets_velocity() {
        let mut d = detector();
        d.update(Some(&pointing_at(0.48, 0.45)), 0.0);
        assert_eq!(d.update(None, 0.033), Gesture::None);
        assert!(d.state().prev_index.is_none());
        match d.update(Some(&pointing_at(0.9, 0.3)), 0.066) {
            Gesture::CursorMove { velocity, .. } => assert_eq!(velocity, 0.0),
            other => panic!("expected cursor move, got {other:?}"),
        }
    }

    #[test]
    fn missing_hand_keeps_latch() {
        let mut d = detector();
        d.update(Some(&index_pinch()), 0.0);
        d.update(None, 0.5);
        assert!(d.state().pinched);
        // still latched: no second click without an observed release
        assert_ne!(d.update(Some(&index_pinch()), 1.0).name(), "left_click");
    }

    #[test]
    fn curled_index_is_none() {
        let mut d = detector();
        d.update(Some(&pointing_at(0.48, 0.45)), 0.0);
        assert_eq!(d.update(Some(&fist()), 0.033), Gesture::None);
        assert!(d.state().prev_index.is_none());
    }

    #[test]
    fn click_outranks_scroll_pose() {
        let mut p = scroll_hand(0.40);
        let (x, y, z) = p[INDEX_FINGER_TIP];
        p[THUMB_TIP] = (x + 0.002, y, z);
        let mut d = detector();
        assert_eq!(d.update(Some(&right(p)), 0.0).name(), "left_click");
    }

    #[test]
    fn ring_finger_up_is_not_scroll() {
        let mut p = scroll_hand(0.40);
        p[RING_FINGER_TIP] = (0.52, 0.40, 0.0);
        let mut d = detector();
        assert_eq!(d.update(Some(&right(p)), 0.0).name(), "cursor_move");
    }

    #[test]
    fn reset_keeps_debounce_interval() {
        let mut d = detector_with_debounce(0.7);
        d.update(Some(&index_pinch()), 0.0);
        d.update(Some(&right(scroll_hand(0.4))), 0.1);
        d.reset();
        assert_eq!(*d.state(), GestureState::new(0.7));
        // first click after reset is not debounced
        assert_eq!(d.update(Some(&index_pinch()), 0.2).name(), "left_click");
    }

    #[test]
    fn configure_keeps_history() {
        let mut d = detector();
        d.update(Some(&index_pinch()), 0.0);
        d.configure(&GestureSettings {
            click_debounce: 1.0,
            pinch_threshold: 0.08,
            ..Default::default()
        });
        assert!(d.state().pinched);
        assert_eq!(d.state().debounce, 1.0);
    }

    #[test]
    fn extension_uses_pip_two_below_tip() {
        // lowering the index PIP above the tip folds the finger
        let mut p = pointing_hand();
        p[INDEX_FINGER_PIP] = (0.48, 0.40, 0.0);
        p[MIDDLE_FINGER_PIP] = (0.5, 0.57, 0.0);
        let mut d = detector();
        assert_eq!(d.update(Some(&right(p)), 0.0), Gesture::None);
    }
}
