mod cli;
mod signal;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::Parser;

use droidtap_core::automation::Clicker;
use droidtap_core::error::DeviceError;
use droidtap_core::logger;
use droidtap_core::platform::{create_gateway, select_device, GatewayOptions};
use droidtap_core::settings::ConfigStore;
use droidtap_core::sleep::{Cancel, SystemClock};

use cli::Cli;

const DEFAULT_LOG_MB: f64 = 10.0;

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            log::error!("Error: {:#}", e);
            // logger may not be installed yet
            if log::max_level() == log::LevelFilter::Off {
                eprintln!("Error: {:#}", e);
            }
            1
        }
    };
    log::logger().flush();
    process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();

    let mut store = ConfigStore::load(cli.config.as_deref());

    let logs_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("logs");
    let log_mb = store
        .get("logging.max_file_size_mb")
        .and_then(|v| v.as_f64())
        .filter(|mb| *mb > 0.0)
        .unwrap_or(DEFAULT_LOG_MB);
    logger::init(&logs_dir, cli.debug, (log_mb * 1024.0 * 1024.0) as u64)
        .context("failed to install logger")?;

    log::info!("starting droidtap v{}", env!("CARGO_PKG_VERSION"));
    log::info!("debug logging: {}", if cli.debug { "enabled" } else { "disabled" });
    store.log_origin();

    cli::apply_overrides(&cli, &mut store).context("invalid command-line override")?;
    let settings = store
        .resolve(cli.template_path.as_deref())
        .context("invalid configuration")?;
    settings.log_summary();

    std::fs::create_dir_all(&settings.tmp_dir)
        .with_context(|| format!("failed to create {}", settings.tmp_dir.display()))?;

    let options = GatewayOptions {
        tmp_dir: settings.tmp_dir.clone(),
        command_timeout: settings.command_timeout,
    };
    let gateway = match create_gateway(cli.stub, options) {
        Ok(g) => g,
        Err(DeviceError::NotInstalled) => {
            explain_missing_adb();
            return Ok(1);
        }
        Err(e) => return Err(e).context("failed to start device channel"),
    };

    let devices = gateway.list_devices().context("failed to list devices")?;
    let device = match select_device(&devices, cli.device) {
        Ok(d) => d,
        Err(DeviceError::NoDevices) => {
            explain_no_devices();
            return Ok(1);
        }
        Err(e) => return Err(e.into()),
    };
    log::info!("using device: {}", device);

    let cancel = Cancel::new();
    signal::install(cancel.clone())?;

    let clock = SystemClock::new(cancel.clone());
    let mut clicker = Clicker::new(gateway.as_ref(), device, &settings, clock, cancel);
    let end = clicker.run();
    log::info!("issued {} taps", clicker.taps());
    end.report();
    Ok(end.exit_code())
}

fn explain_missing_adb() {
    log::error!("adb (Android Debug Bridge) is not installed or not in PATH");
    log::error!("");
    log::error!("Please install adb:");
    log::error!("1. Download from: https://developer.android.com/studio/releases/platform-tools");
    log::error!("2. Extract the files");
    log::error!("3. Add the folder to your system PATH");
    log::error!("4. Restart your terminal");
    log::error!("5. Test by running: adb version");
}

fn explain_no_devices() {
    log::error!("no devices connected");
    log::error!("");
    log::error!("Please ensure:");
    log::error!("1. Your Android device is connected via USB");
    log::error!("2. USB debugging is enabled in Developer Options");
    log::error!("3. You've authorized this computer on the device");
    log::error!("4. Test by running: adb devices");
}
