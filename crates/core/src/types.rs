use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rand::Rng;

use crate::error::ConfigError;

/// adb serial of a connected device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pixel coordinate on the device screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenPoint {
    pub x: u32,
    pub y: u32,
}

impl ScreenPoint {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for ScreenPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Minimum match confidence, in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold(f64);

impl Threshold {
    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::ThresholdOutOfRange(value))
        }
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// A score equal to the threshold is accepted.
    pub fn accepts(&self, score: f64) -> bool {
        score >= self.0
    }
}

/// Longest accepted inter-tap delay, in seconds.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Inclusive range of seconds to wait between taps
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingWindow {
    min: f64,
    max: f64,
}

impl TimingWindow {
    pub fn new(min: f64, max: f64) -> Result<Self, ConfigError> {
        if !(min >= 0.0 && min <= max && max <= MAX_DELAY_SECS) {
            return Err(ConfigError::InvalidDelays { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Uniform draw from the window. A degenerate window yields exactly `min`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min == self.max {
            return Duration::from_secs_f64(self.min);
        }
        Duration::from_secs_f64(rng.gen_range(self.min..=self.max))
    }
}

/// How the loop finds the point it taps
#[derive(Debug, Clone, PartialEq)]
pub enum ClickMode {
    /// Locate a reference image on screen.
    Template { path: PathBuf },
    /// Tap a fixed point; never re-derived.
    Coordinates(ScreenPoint),
}

impl ClickMode {
    pub fn name(&self) -> &'static str {
        match self {
            ClickMode::Template { .. } => "template",
            ClickMode::Coordinates(_) => "coordinates",
        }
    }
}

/// Encoded screenshot as returned by the device, plus the transient
/// local copy written while capturing (removed by housekeeping).
#[derive(Debug, Clone)]
pub struct Capture {
    pub data: Vec<u8>,
    pub artifact: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn threshold_accepts_exact_boundary() {
        let t = Threshold::new(0.8).unwrap();
        assert!(t.accepts(0.8));
        assert!(t.accepts(0.95));
        assert!(!t.accepts(0.799_999));
    }

    #[test]
    fn threshold_rejects_out_of_range() {
        assert!(Threshold::new(-0.01).is_err());
        assert!(Threshold::new(1.01).is_err());
        assert!(Threshold::new(f64::NAN).is_err());
        assert!(Threshold::new(0.0).is_ok());
        assert!(Threshold::new(1.0).is_ok());
    }

    #[test]
    fn timing_window_validation() {
        assert!(TimingWindow::new(0.2, 0.1).is_err());
        assert!(TimingWindow::new(-0.1, 0.1).is_err());
        assert!(TimingWindow::new(0.0, f64::INFINITY).is_err());
        assert!(TimingWindow::new(0.0, 0.0).is_ok());
        assert!(TimingWindow::new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn huge_delays_are_rejected_before_they_reach_duration() {
        assert!(TimingWindow::new(0.1, 1e20).is_err());
        assert!(TimingWindow::new(1e20, 1e20).is_err());
        let w = TimingWindow::new(MAX_DELAY_SECS, MAX_DELAY_SECS).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(w.sample(&mut rng), Duration::from_secs(3600));
    }

    #[test]
    fn timing_window_samples_stay_in_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let w = TimingWindow::new(0.1, 0.2).unwrap();
        for _ in 0..1000 {
            let d = w.sample(&mut rng).as_secs_f64();
            assert!((0.1..=0.2 + 1e-9).contains(&d), "{d}");
        }
    }

    #[test]
    fn degenerate_timing_window_is_exact() {
        let mut rng = StdRng::seed_from_u64(1);
        let w = TimingWindow::new(0.15, 0.15).unwrap();
        for _ in 0..10 {
            assert_eq!(w.sample(&mut rng), Duration::from_secs_f64(0.15));
        }
    }
}
