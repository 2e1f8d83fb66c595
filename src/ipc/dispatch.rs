use anyhow::Result;

use crate::actions::{Button, MouseSink};
use crate::config::GestureSettings;
use crate::gestures::Gesture;
use crate::mapper::CursorMapper;

/// What was sent to the sink for one gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    MoveTo(i32, i32),
    Click(Button),
    Scroll(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatched {
    pub label: &'static str,
    pub action: Option<Action>,
}

impl Dispatched {
    fn idle(label: &'static str) -> Self {
        Self {
            label,
            action: None,
        }
    }
}

/// Turns one gesture into pointer commands, honoring the per-gesture enable
/// switches. `t` is the frame time in seconds, used by time-aware smoothing.
pub fn dispatch_gesture<S: MouseSink + ?Sized>(
    g: &Gesture,
    t: f64,
    settings: &GestureSettings,
    mapper: &mut CursorMapper,
    sink: &mut S,
) -> Result<Dispatched> {
    let out = match *g {
        Gesture::CursorMove { position, .. } if settings.cursor_control_enabled => {
            let (x, y) = mapper.cursor(position.0, position.1, t);
            sink.move_to(x, y)?;
            Dispatched {
                label: "Cursor Move",
                action: Some(Action::MoveTo(x, y)),
            }
        }
        Gesture::LeftClick { .. } if settings.left_click_enabled => {
            sink.click(Button::Left)?;
            Dispatched {
                label: "Left Click",
                action: Some(Action::Click(Button::Left)),
            }
        }
        Gesture::RightClick { .. } if settings.right_click_enabled => {
            sink.click(Button::Right)?;
            Dispatched {
                label: "Right Click",
                action: Some(Action::Click(Button::Right)),
            }
        }
        Gesture::Scroll { delta_y, .. } if settings.scroll_enabled => {
            if delta_y == 0.0 {
                return Ok(Dispatched::idle("Scroll Mode"));
            }
            let units = mapper.scroll_units(delta_y);
            if units == 0 {
                return Ok(Dispatched::idle("Scrolling"));
            }
            sink.scroll(units)?;
            Dispatched {
                label: "Scrolling",
                action: Some(Action::Scroll(units)),
            }
        }
        _ => Dispatched::idle("None"),
    };
    Ok(out)
}
