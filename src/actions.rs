use anyhow::{Result, anyhow};
use log::{info, warn};
use std::str::FromStr;

use crate::config::ScreenSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Left,
    Right,
}

impl FromStr for Button {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(anyhow!("unknown mouse button: {other}")),
        }
    }
}

/// Where pointer commands end up. Calls are fire-and-forget from the
/// pipeline's point of view; errors are only logged.
pub trait MouseSink {
    /// Absolute screen position in pixels.
    fn move_to(&mut self, x: i32, y: i32) -> Result<()>;
    fn click(&mut self, button: Button) -> Result<()>;
    /// Wheel units; positive scrolls up.
    fn scroll(&mut self, units: i32) -> Result<()>;
}

pub struct UinputSink {
    enabled: bool,
    #[allow(dead_code)]
    linux: Option<Box<LinuxUinput>>,
}

impl UinputSink {
    pub fn new(screen: &ScreenSettings) -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            let dev = LinuxUinput::create(screen)?;
            return Ok(Self {
                enabled: true,
                linux: Some(Box::new(dev)),
            });
        }
        #[allow(unreachable_code)]
        {
            let _ = screen;
            warn!("uinput not available; running in NO-OP mode");
            Ok(Self::noop())
        }
    }

    /// Falls back to NO-OP mode when the virtual device cannot be created.
    pub fn new_or_noop(screen: &ScreenSettings) -> Self {
        Self::new(screen).unwrap_or_else(|e| {
            warn!("uinput unavailable ({e}); running in NO-OP mode");
            Self::noop()
        })
    }

    pub fn noop() -> Self {
        Self {
            enabled: true,
            linux: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, en: bool) {
        self.enabled = en;
    }
}

impl MouseSink for UinputSink {
    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.move_to(x, y)?;
        }
        let _ = (x, y);
        Ok(())
    }

    fn click(&mut self, button: Button) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.click(button)?;
        }
        let _ = button;
        Ok(())
    }

    fn scroll(&mut self, units: i32) -> Result<()> {
        if !self.enabled || units == 0 {
            return Ok(());
        }
        #[cfg(target_os = "linux")]
        if let Some(dev) = self.linux.as_mut() {
            dev.scroll_vertical(units)?;
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn mouse_button(button: Button) -> uinput::event::controller::Mouse {
    use uinput::event::controller::Mouse;
    match button {
        Button::Left => Mouse::Left,
        Button::Right => Mouse::Right,
    }
}

#[cfg(target_os = "linux")]
struct LinuxUinput {
    dev: uinput::device::Device,
}

#[cfg(target_os = "linux")]
impl LinuxUinput {
    fn create(screen: &ScreenSettings) -> Result<Self> {
        use uinput::event::{absolute, controller::Mouse, relative};

        let max_x = screen.width.saturating_sub(1) as i32;
        let max_y = screen.height.saturating_sub(1) as i32;

        let dev = uinput::default()?
            .name("Handctl Virtual Pointer")?
            // absolute pointer spanning the configured screen
            .event(absolute::Position::X)?
            .min(0)
            .max(max_x)
            .event(absolute::Position::Y)?
            .min(0)
            .max(max_y)
            // wheel
            .event(relative::Wheel::Vertical)?
            // mouse buttons
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .create()?;

        info!("uinput: created virtual pointer {}x{}", screen.width, screen.height);
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<()> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn move_to(&mut self, x: i32, y: i32) -> Result<()> {
        use uinput::event::absolute::Position;
        self.dev.send(Position::X, x)?;
        self.dev.send(Position::Y, y)?;
        self.sync()
    }

    fn click(&mut self, button: Button) -> Result<()> {
        self.dev.send(mouse_button(button), 1)?;
        self.sync()?;
        self.dev.send(mouse_button(button), 0)?;
        self.sync()
    }

    fn scroll_vertical(&mut self, steps: i32) -> Result<()> {
        use uinput::event::relative::Wheel;
        self.dev.send(Wheel::Vertical, steps)?;
        self.sync()
    }
}
