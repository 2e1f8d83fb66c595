use anyhow::{Result, anyhow};
use directories::UserDirs;
use log::{info, warn};
use serde::Deserialize;
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got {value}")]
    OutOfRange {
        key: &'static str,
        expected: &'static str,
        value: f64,
    },
    #[error("screen dimensions must be non-zero, got {width}x{height}")]
    EmptyScreen { width: u32, height: u32 },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Meta {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GestureSettings {
    pub cursor_control_enabled: bool,
    pub left_click_enabled: bool,
    pub right_click_enabled: bool,
    pub scroll_enabled: bool,
    pub pinch_threshold: f64,
    pub scroll_threshold: f64,
    /// seconds
    pub click_debounce: f64,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            cursor_control_enabled: true,
            left_click_enabled: true,
            right_click_enabled: true,
            scroll_enabled: true,
            pinch_threshold: 0.05,
            scroll_threshold: 0.02,
            click_debounce: 0.3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MouseSettings {
    pub sensitivity: f64,
    /// EMA alpha for the default smoother
    pub smoothing: f64,
    pub scroll_sensitivity: f64,
    pub margin: f64,
}

impl Default for MouseSettings {
    fn default() -> Self {
        Self {
            sensitivity: 1.5,
            smoothing: 0.3,
            scroll_sensitivity: 5.0,
            margin: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    None,
    Ema,
    MovingAverage,
    OneEuro,
    Kalman,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmoothingSettings {
    pub kind: FilterKind,
    pub window: usize,
    pub min_cutoff: f64,
    pub beta: f64,
    pub d_cutoff: f64,
    pub process_variance: f64,
    pub measurement_variance: f64,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            kind: FilterKind::Ema,
            window: 5,
            min_cutoff: 1.0,
            beta: 0.007,
            d_cutoff: 1.0,
            process_variance: 1e-5,
            measurement_variance: 1e-1,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ScreenSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub meta: Meta,
    pub gestures: GestureSettings,
    pub mouse: MouseSettings,
    pub smoothing: SmoothingSettings,
    pub screen: ScreenSettings,
    pub source: SourceSettings,
}

impl Profile {
    pub fn parse(txt: &str) -> Result<Self> {
        let profile: Profile = toml::from_str(txt)?;
        validate_profile(&profile)?;
        Ok(profile)
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfigState {
    pub active_name: String,
    pub profile: Profile,
    pub config_dir: PathBuf,
    pub profiles_dir: PathBuf,
    pub active_ptr: PathBuf,
}

fn config_dir() -> Result<PathBuf> {
    let dirs = UserDirs::new().ok_or_else(|| anyhow!("cannot resolve home directory"))?;
    Ok(dirs.home_dir().join(".config").join("handctl"))
}

fn default_profile_text() -> &'static str {
    include_str!("../profiles/default.toml")
}

impl DaemonConfigState {
    pub fn load_or_install_default() -> Result<Self> {
        Self::load_from(config_dir()?)
    }

    /// Loads the active profile under `cfgdir`, installing the built-in default
    /// profile and active pointer when missing.
    pub fn load_from(cfgdir: PathBuf) -> Result<Self> {
        let profdir = cfgdir.join("profiles");
        fs::create_dir_all(&profdir)?;

        let def_path = profdir.join("default.toml");
        if !def_path.exists() {
            fs::write(&def_path, default_profile_text())?;
            info!("installed default profile at {}", def_path.display());
        }

        let active_ptr = cfgdir.join("active");
        if !active_ptr.exists() {
            let mut f = fs::File::create(&active_ptr)?;
            f.write_all(b"default")?;
        }

        let active_name = fs::read_to_string(&active_ptr)?.trim().to_string();
        let profile = load_profile(&profdir, &active_name)?;

        Ok(Self {
            active_name,
            profile,
            config_dir: cfgdir,
            profiles_dir: profdir,
            active_ptr,
        })
    }

    pub fn active_path(&self) -> PathBuf {
        self.profiles_dir.join(format!("{}.toml", self.active_name))
    }

    /// Re-reads the active profile; on error the previous profile is kept.
    pub fn reload(&mut self) -> Result<()> {
        self.profile = load_profile(&self.profiles_dir, &self.active_name)?;
        Ok(())
    }

    pub fn set_active(&mut self, name: &str) -> Result<()> {
        let p = self.profiles_dir.join(format!("{name}.toml"));
        if !p.exists() {
            return Err(anyhow!("profile not found: {}", p.display()));
        }
        let profile = load_profile(&self.profiles_dir, name)?;
        fs::write(&self.active_ptr, name.as_bytes())?;
        self.active_name = name.to_string();
        self.profile = profile;
        Ok(())
    }

    pub fn list_profiles(&self) -> Vec<String> {
        let mut v = Vec::new();
        if let Ok(rd) = fs::read_dir(&self.profiles_dir) {
            for e in rd.flatten() {
                let path = e.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        v.push(stem.to_string());
                    }
                }
            }
        }
        v.sort();
        v
    }

    pub fn doctor_report(&self) -> serde_json::Value {
        let uinput_ok = Path::new("/dev/uinput").exists();
        let in_input_group = check_in_input_group();
        let source = self.profile.source.path.as_ref();
        let source_ok = source.is_some_and(|p| p.exists());
        if !uinput_ok {
            warn!("doctor: /dev/uinput missing; clicks and motion will be dropped");
        }
        serde_json::json!({
            "uinput_present": uinput_ok,
            "input_group_member": in_input_group,
            "profiles_dir": self.profiles_dir,
            "active_profile": self.active_name,
            "landmark_source": source,
            "landmark_source_present": source_ok,
            "screen": [self.profile.screen.width, self.profile.screen.height],
            "hints": {
                "udev_rule": "/etc/udev/rules.d/80-uinput.rules",
                "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input",
                "landmark_feed": "point [source].path at the hand tracker's JSON-lines output"
            }
        })
    }
}

fn load_profile(profiles_dir: &Path, name: &str) -> Result<Profile> {
    let path = profiles_dir.join(format!("{name}.toml"));
    let txt = fs::read_to_string(&path)
        .map_err(|e| anyhow!("failed to read {}: {e}", path.display()))?;
    Profile::parse(&txt).map_err(|e| anyhow!("failed to load {}: {e}", path.display()))
}

fn require(key: &'static str, expected: &'static str, value: f64, ok: bool) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            key,
            expected,
            value,
        })
    }
}

pub fn validate_profile(p: &Profile) -> Result<(), ConfigError> {
    let g = &p.gestures;
    require("gestures.pinch_threshold", "positive", g.pinch_threshold, g.pinch_threshold > 0.0)?;
    require("gestures.scroll_threshold", "non-negative", g.scroll_threshold, g.scroll_threshold >= 0.0)?;
    require("gestures.click_debounce", "non-negative", g.click_debounce, g.click_debounce >= 0.0)?;

    let m = &p.mouse;
    require("mouse.margin", "in [0, 0.5)", m.margin, (0.0..0.5).contains(&m.margin))?;
    require("mouse.smoothing", "in [0, 1]", m.smoothing, (0.0..=1.0).contains(&m.smoothing))?;
    require("mouse.sensitivity", "positive", m.sensitivity, m.sensitivity > 0.0)?;
    require(
        "mouse.scroll_sensitivity",
        "positive",
        m.scroll_sensitivity,
        m.scroll_sensitivity > 0.0,
    )?;

    let s = &p.smoothing;
    require("smoothing.min_cutoff", "positive", s.min_cutoff, s.min_cutoff > 0.0)?;
    require("smoothing.d_cutoff", "positive", s.d_cutoff, s.d_cutoff > 0.0)?;
    require("smoothing.beta", "non-negative", s.beta, s.beta >= 0.0)?;
    require(
        "smoothing.process_variance",
        "non-negative",
        s.process_variance,
        s.process_variance >= 0.0,
    )?;
    require(
        "smoothing.measurement_variance",
        "positive",
        s.measurement_variance,
        s.measurement_variance > 0.0,
    )?;

    if p.screen.width == 0 || p.screen.height == 0 {
        return Err(ConfigError::EmptyScreen {
            width: p.screen.width,
            height: p.screen.height,
        });
    }
    Ok(())
}

fn check_in_input_group() -> bool {
    let Ok(s) = fs::read_to_string("/etc/group") else {
        return false;
    };
    let user = whoami::username();
    s.lines()
        .filter(|line| line.starts_with("input:"))
        .any(|line| {
            line.split(':')
                .nth(3)
                .unwrap_or("")
                .split(',')
                .any(|u| u == user)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profile_parses() {
        let p = Profile::parse(default_profile_text()).unwrap();
        assert_eq!(p.meta.name.as_deref(), Some("default"));
        assert_eq!(p.gestures.pinch_threshold, 0.05);
        assert_eq!(p.smoothing.kind, FilterKind::Ema);
        assert_eq!((p.screen.width, p.screen.height), (1920, 1080));
        assert!(p.source.path.is_none());
    }

    #[test]
    fn missing_sections_take_defaults() {
        let p = Profile::parse("[mouse]\nsensitivity = 2.0\n").unwrap();
        assert_eq!(p.mouse.sensitivity, 2.0);
        assert_eq!(p.mouse.smoothing, 0.3);
        assert_eq!(p.gestures.click_debounce, 0.3);
        assert!(p.gestures.right_click_enabled);
    }

    #[test]
    fn filter_kind_names() {
        let p = Profile::parse("[smoothing]\nkind = \"one_euro\"\n").unwrap();
        assert_eq!(p.smoothing.kind, FilterKind::OneEuro);
        let p = Profile::parse("[smoothing]\nkind = \"moving_average\"\n").unwrap();
        assert_eq!(p.smoothing.kind, FilterKind::MovingAverage);
        assert!(Profile::parse("[smoothing]\nkind = \"median\"\n").is_err());
    }

    #[test]
    fn rejects_bad_ranges() {
        let mut p = Profile::default();
        p.mouse.margin = 0.5;
        assert!(matches!(
            validate_profile(&p),
            Err(ConfigError::OutOfRange { key: "mouse.margin", .. })
        ));

        let mut p = Profile::default();
        p.gestures.pinch_threshold = 0.0;
        assert!(validate_profile(&p).is_err());

        let mut p = Profile::default();
        p.smoothing.beta = -0.5;
        assert_eq!(
            validate_profile(&p),
            Err(ConfigError::OutOfRange {
                key: "smoothing.beta",
                expected: "non-negative",
                value: -0.5
            })
        );

        let mut p = Profile::default();
        p.smoothing.process_variance = -1e-5;
        assert!(matches!(
            validate_profile(&p),
            Err(ConfigError::OutOfRange { key: "smoothing.process_variance", .. })
        ));
        assert!(Profile::parse("[smoothing]\nbeta = 0.0\nprocess_variance = 0.0\n").is_ok());

        let mut p = Profile::default();
        p.screen.width = 0;
        assert_eq!(
            validate_profile(&p),
            Err(ConfigError::EmptyScreen {
                width: 0,
                height: 1080
            })
        );
    }

    #[test]
    fn installs_default_and_switches_profiles() {
        let tmp = tempfile::tempdir().unwrap();
        let mut st = DaemonConfigState::load_from(tmp.path().to_path_buf()).unwrap();
        assert_eq!(st.active_name, "default");
        assert!(st.active_path().exists());

        fs::write(
            st.profiles_dir.join("precise.toml"),
            "[mouse]\nsensitivity = 1.0\nsmoothing = 0.1\n",
        )
        .unwrap();
        assert_eq!(st.list_profiles(), vec!["default", "precise"]);

        st.set_active("precise").unwrap();
        assert_eq!(st.profile.mouse.smoothing, 0.1);
        assert_eq!(fs::read_to_string(&st.active_ptr).unwrap(), "precise");

        assert!(st.set_active("missing").is_err());
        assert_eq!(st.active_name, "precise");
    }

    #[test]
    fn failed_reload_keeps_last_good() {
        let tmp = tempfile::tempdir().unwrap();
        let mut st = DaemonConfigState::load_from(tmp.path().to_path_buf()).unwrap();
        fs::write(st.active_path(), "[mouse]\nmargin = 0.9\n").unwrap();
        assert!(st.reload().is_err());
        assert_eq!(st.profile.mouse.margin, 0.1);
    }
}
