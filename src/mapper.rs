//! Hand space to screen space.
//!
//! A margin is cropped from each edge of the camera frame so the central
//! region spans the whole screen; sensitivity above 1 reaches the edges
//! sooner and is clamped there. Mapped pixels then run through one smoothing
//! filter per axis.

use log::info;

use crate::config::{MouseSettings, Profile, ScreenSettings, SmoothingSettings};
use crate::filters::AxisFilters;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappingConfig {
    pub margin: f64,
    pub sensitivity: f64,
    pub scroll_sensitivity: f64,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl MappingConfig {
    pub fn new(mouse: &MouseSettings, screen: &ScreenSettings) -> Self {
        Self {
            margin: mouse.margin,
            sensitivity: mouse.sensitivity,
            scroll_sensitivity: mouse.scroll_sensitivity,
            screen_width: screen.width,
            screen_height: screen.height,
        }
    }

    fn axis(&self, v: f64, dim: u32) -> i32 {
        let cropped = ((v - self.margin) / (1.0 - 2.0 * self.margin)).clamp(0.0, 1.0);
        let max = f64::from(dim.saturating_sub(1));
        (cropped * f64::from(dim) * self.sensitivity)
            .round()
            .clamp(0.0, max) as i32
    }

    /// Normalized (x, y) to pixel coordinates inside the screen.
    pub fn map_to_screen(&self, x: f64, y: f64) -> (i32, i32) {
        (
            self.axis(x, self.screen_width),
            self.axis(y, self.screen_height),
        )
    }

    /// Wheel units for a normalized vertical delta. Downward hand motion
    /// (positive delta) gives negative units, i.e. scroll down.
    pub fn scroll_units(&self, delta_y: f64) -> i32 {
        (-delta_y * self.scroll_sensitivity * 100.0).round() as i32
    }
}

#[derive(Debug)]
pub struct CursorMapper {
    cfg: MappingConfig,
    smoothing: SmoothingSettings,
    alpha: f64,
    filters: Option<AxisFilters>,
}

impl CursorMapper {
    pub fn new(profile: &Profile) -> Self {
        let alpha = profile.mouse.smoothing.clamp(0.0, 1.0);
        let cfg = MappingConfig::new(&profile.mouse, &profile.screen);
        info!(
            "cursor mapper: screen {}x{} sensitivity={} margin={} smoothing={:?}",
            cfg.screen_width, cfg.screen_height, cfg.sensitivity, cfg.margin, profile.smoothing.kind
        );
        Self {
            cfg,
            smoothing: profile.smoothing.clone(),
            alpha,
            filters: AxisFilters::from_settings(&profile.smoothing, alpha),
        }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.cfg
    }

    pub fn map_to_screen(&self, x: f64, y: f64) -> (i32, i32) {
        self.cfg.map_to_screen(x, y)
    }

    pub fn scroll_units(&self, delta_y: f64) -> i32 {
        self.cfg.scroll_units(delta_y)
    }

    /// Maps and smooths one cursor sample taken at `t` seconds.
    pub fn cursor(&mut self, x: f64, y: f64, t: f64) -> (i32, i32) {
        let (sx, sy) = self.map_to_screen(x, y);
        let Some(filters) = self.filters.as_mut() else {
            return (sx, sy);
        };
        let (fx, fy) = filters.update((f64::from(sx), f64::from(sy)), t);
        let max_x = f64::from(self.cfg.screen_width.saturating_sub(1));
        let max_y = f64::from(self.cfg.screen_height.saturating_sub(1));
        (
            fx.round().clamp(0.0, max_x) as i32,
            fy.round().clamp(0.0, max_y) as i32,
        )
    }

    pub fn reset_smoothing(&mut self) {
        if let Some(f) = self.filters.as_mut() {
            f.reset();
        }
    }

    pub fn set_sensitivity(&mut self, sensitivity: f64) {
        self.cfg.sensitivity = sensitivity.clamp(0.1, 5.0);
        info!("sensitivity set to {}", self.cfg.sensitivity);
    }

    pub fn set_scroll_sensitivity(&mut self, sensitivity: f64) {
        self.cfg.scroll_sensitivity = sensitivity.clamp(0.1, 10.0);
        info!("scroll sensitivity set to {}", self.cfg.scroll_sensitivity);
    }

    /// New EMA alpha; smoothing history is kept.
    pub fn set_smoothing(&mut self, alpha: f64) {
        self.alpha = alpha.clamp(0.0, 1.0);
        if let Some(f) = self.filters.as_mut() {
            f.set_alpha(self.alpha);
        }
        info!("smoothing set to {}", self.alpha);
    }

    /// Live profile update. Filters are rebuilt only when the filter kind or
    /// its parameters change; an alpha change alone keeps their history.
    pub fn apply(&mut self, profile: &Profile) {
        self.set_sensitivity(profile.mouse.sensitivity);
        self.set_scroll_sensitivity(profile.mouse.scroll_sensitivity);
        self.cfg.margin = profile.mouse.margin;
        self.cfg.screen_width = profile.screen.width;
        self.cfg.screen_height = profile.screen.height;

        let alpha = profile.mouse.smoothing.clamp(0.0, 1.0);
        let same_filters = self.smoothing.kind == profile.smoothing.kind
            && self.smoothing.window == profile.smoothing.window
            && self.smoothing.min_cutoff == profile.smoothing.min_cutoff
            && self.smoothing.beta == profile.smoothing.beta
            && self.smoothing.d_cutoff == profile.smoothing.d_cutoff
            && self.smoothing.process_variance == profile.smoothing.process_variance
            && self.smoothing.measurement_variance == profile.smoothing.measurement_variance;
        if !same_filters {
            self.smoothing = profile.smoothing.clone();
            self.alpha = alpha;
            self.filters = AxisFilters::from_settings(&self.smoothing, self.alpha);
            info!("smoothing filters rebuilt: {:?}", self.smoothing.kind);
        } else if self.alpha != alpha {
            self.set_smoothing(alpha);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterKind;
    use proptest::prelude::*;

    fn cfg(sensitivity: f64) -> MappingConfig {
        MappingConfig {
            margin: 0.1,
            sensitivity,
            scroll_sensitivity: 5.0,
            screen_width: 1920,
            screen_height: 1080,
        }
    }

    fn profile_with(kind: FilterKind) -> Profile {
        let mut p = Profile::default();
        p.smoothing.kind = kind;
        p
    }

    #[test]
    fn margin_crop_and_scale() {
        let c = cfg(1.0);
        assert_eq!(c.map_to_screen(0.5, 0.5), (960, 540));
        assert_eq!(c.map_to_screen(0.1, 0.1), (0, 0));
        // far edge clamps to the last pixel
        assert_eq!(c.map_to_screen(0.9, 0.9), (1919, 1079));
        assert_eq!(c.map_to_screen(0.0, 1.0), (0, 1079));
    }

    #[test]
    fn sensitivity_extrapolates_then_clamps() {
        let c = cfg(1.5);
        // 0.5 crop -> 0.5 * 1920 * 1.5 = 1440
        assert_eq!(c.map_to_screen(0.5, 0.1).0, 1440);
        assert_eq!(c.map_to_screen(0.8, 0.8), (1919, 1079));
    }

    #[test]
    fn rounds_to_nearest_pixel() {
        let c = MappingConfig {
            margin: 0.0,
            sensitivity: 1.0,
            scroll_sensitivity: 1.0,
            screen_width: 10,
            screen_height: 10,
        };
        assert_eq!(c.map_to_screen(0.26, 0.24), (3, 2));
    }

    #[test]
    fn scroll_sign_is_inverted_and_scaled() {
        let c = cfg(1.0);
        assert_eq!(c.scroll_units(0.05), -25);
        assert_eq!(c.scroll_units(-0.03), 15);
        assert_eq!(c.scroll_units(0.0), 0);
        assert_eq!(c.scroll_units(0.0004), 0);
    }

    #[test]
    fn unsmoothed_cursor_is_raw_mapping() {
        let mut m = CursorMapper::new(&profile_with(FilterKind::None));
        let raw = m.map_to_screen(0.3, 0.7);
        assert_eq!(m.cursor(0.3, 0.7, 0.0), raw);
    }

    #[test]
    fn ema_smooths_toward_target() {
        let mut m = CursorMapper::new(&profile_with(FilterKind::Ema));
        let first = m.cursor(0.1, 0.1, 0.0);
        assert_eq!(first, (0, 0));
        let second = m.cursor(0.5, 0.5, 0.033);
        // alpha 0.3 of the way from 0 toward 1440/810 (sensitivity 1.5)
        assert_eq!(second, (432, 243));
    }

    #[test]
    fn reset_reseeds_filters() {
        let mut m = CursorMapper::new(&profile_with(FilterKind::OneEuro));
        m.cursor(0.1, 0.1, 0.0);
        m.cursor(0.2, 0.2, 0.033);
        m.reset_smoothing();
        let raw = m.map_to_screen(0.5, 0.5);
        assert_eq!(m.cursor(0.5, 0.5, 0.066), raw);
    }

    #[test]
    fn setters_clamp() {
        let mut m = CursorMapper::new(&Profile::default());
        m.set_sensitivity(9.0);
        m.set_scroll_sensitivity(0.0);
        assert_eq!(m.config().sensitivity, 5.0);
        assert_eq!(m.config().scroll_sensitivity, 0.1);
    }

    #[test]
    fn smoothing_change_keeps_history() {
        let mut p = Profile::default();
        p.mouse.sensitivity = 1.0;
        let mut m = CursorMapper::new(&p);
        assert_eq!(m.cursor(0.5, 0.5, 0.0), (960, 540));

        m.set_smoothing(0.5);
        // halfway from the old seed toward (0, 0), not a fresh seed
        assert_eq!(m.cursor(0.1, 0.1, 0.033), (480, 270));

        p.mouse.smoothing = 1.0;
        m.apply(&p);
        assert_eq!(m.cursor(0.1, 0.1, 0.066), (0, 0));
    }

    #[test]
    fn apply_updates_live_settings() {
        let mut p = Profile::default();
        p.mouse.sensitivity = 1.0;
        let mut m = CursorMapper::new(&p);
        assert_eq!(m.cursor(0.5, 0.5, 0.0), (960, 540));

        p.screen.width = 800;
        p.screen.height = 600;
        m.apply(&p);
        assert_eq!(m.config().screen_width, 800);
        assert_eq!(m.map_to_screen(0.5, 0.5), (400, 300));

        // smoothing unchanged -> history kept, so output lags the new target
        assert_eq!(m.cursor(0.1, 0.1, 0.033), (672, 378));

        p.smoothing.kind = FilterKind::Kalman;
        m.apply(&p);
        assert_eq!(m.cursor(0.9, 0.9, 0.066), (799, 599));
    }

    proptest! {
        #[test]
        fn mapping_stays_on_screen(
            x in 0.0f64..=1.0,
            y in 0.0f64..=1.0,
            sensitivity in 0.1f64..=5.0,
            margin in 0.0f64..0.49,
            w in 1u32..8000,
            h in 1u32..8000,
        ) {
            let c = MappingConfig {
                margin,
                sensitivity,
                scroll_sensitivity: 5.0,
                screen_width: w,
                screen_height: h,
            };
            let (sx, sy) = c.map_to_screen(x, y);
            prop_assert!(sx >= 0 && sx < w as i32);
            prop_assert!(sy >= 0 && sy < h as i32);
        }

        #[test]
        fn smoothed_cursor_stays_on_screen(
            pts in proptest::collection::vec((0.0f64..=1.0, 0.0f64..=1.0), 1..40),
        ) {
            for kind in [FilterKind::Ema, FilterKind::MovingAverage, FilterKind::OneEuro, FilterKind::Kalman] {
                let mut m = CursorMapper::new(&profile_with(kind));
                for (i, (x, y)) in pts.iter().enumerate() {
                    let (sx, sy) = m.cursor(*x, *y, i as f64 / 30.0);
                    prop_assert!((0..1920).contains(&sx));
                    prop_assert!((0..1080).contains(&sy));
                }
            }
        }
    }
}
