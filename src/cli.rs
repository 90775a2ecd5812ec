use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde_json::{json, Value};

use droidtap_core::error::ConfigError;
use droidtap_core::settings::ConfigStore;
use droidtap_core::types::{Threshold, TimingWindow};

const EXAMPLES: &str = "\
Examples:
  droidtap                                  # Use default template (images/default.png)
  droidtap /path/to/template.png            # Use custom template
  droidtap --debug                          # Enable debug logging
  droidtap --device 1                       # Select device by index
  droidtap --config /path/to/config.json    # Use custom config file
  droidtap --threshold 0.9                  # Override image matching threshold
  droidtap --click-speed 0.05 0.15          # Override click speed range
  droidtap --coordinates 500 300            # Click at specific coordinates
  droidtap --scan-interval 0                # Disable template rescanning
  droidtap --click-mode coordinates         # Use coordinate mode";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Template,
    Coordinates,
}

impl ModeArg {
    fn as_str(self) -> &'static str {
        match self {
            ModeArg::Template => "template",
            ModeArg::Coordinates => "coordinates",
        }
    }
}

/// Automated clicking agent for Android devices
#[derive(Debug, Parser)]
#[command(name = "droidtap", version, after_help = EXAMPLES)]
pub struct Cli {
    /// Template image to search for (default: paths.template_path from config)
    pub template_path: Option<PathBuf>,

    /// Enable debug logging on the console
    #[arg(long)]
    pub debug: bool,

    /// Device index to use when several are connected (0-based)
    #[arg(long, value_name = "INDEX")]
    pub device: Option<usize>,

    /// Configuration file (default: config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Image matching threshold, 0.0-1.0
    #[arg(long, allow_negative_numbers = true)]
    pub threshold: Option<f64>,

    /// Delay range between clicks in seconds
    #[arg(long, num_args = 2, value_names = ["MIN", "MAX"], allow_negative_numbers = true)]
    pub click_speed: Option<Vec<f64>>,

    /// Template rescan interval in seconds, 0 disables rescanning
    #[arg(long, value_name = "SECS", allow_negative_numbers = true)]
    pub scan_interval: Option<i64>,

    /// Click fixed coordinates (switches to coordinates mode)
    #[arg(long, num_args = 2, value_names = ["X", "Y"], allow_negative_numbers = true)]
    pub coordinates: Option<Vec<i64>>,

    /// Locate the target by template image or use fixed coordinates
    #[arg(long, value_enum)]
    pub click_mode: Option<ModeArg>,

    /// Drive a fake device instead of adb
    #[arg(long)]
    pub stub: bool,
}

/// Validate each command-line override and write it into the store.
pub fn apply_overrides(cli: &Cli, store: &mut ConfigStore) -> Result<(), ConfigError> {
    if let Some(t) = cli.threshold {
        store.set("image_matching.threshold", json!(Threshold::new(t)?.value()));
    }

    if let Some(speed) = &cli.click_speed {
        if let [min, max] = speed[..] {
            let window = TimingWindow::new(min, max)?;
            store.set("click_speed.min_delay", json!(window.min()));
            store.set("click_speed.max_delay", json!(window.max()));
        }
    }

    if let Some(secs) = cli.scan_interval {
        let value = match secs {
            s if s < 0 => return Err(ConfigError::InvalidScanInterval(s as f64)),
            0 => Value::Null,
            s => json!(s),
        };
        store.set("automation.scan_interval", value);
    }

    if let Some(coords) = &cli.coordinates {
        if let [x, y] = coords[..] {
            if x < 0 || y < 0 {
                return Err(ConfigError::NegativeCoordinates { x, y });
            }
            store.set("click_mode.mode", json!("coordinates"));
            store.set("coordinates.x", json!(x));
            store.set("coordinates.y", json!(y));
        }
    }

    if let Some(mode) = cli.click_mode {
        store.set("click_mode.mode", json!(mode.as_str()));
    }
    Ok(())
}
