//! Device gateway backed by the `adb` command-line tool.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::{DeviceGateway, GatewayOptions};
use crate::error::DeviceError;
use crate::types::*;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEVICE_SCREENSHOT_GLOB: &str = "/sdcard/screen*.png";

/// Captured output of a finished adb invocation.
struct Finished {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

pub struct AdbGateway {
    program: PathBuf,
    tmp_dir: PathBuf,
    timeout: Duration,
}

impl AdbGateway {
    pub fn new(options: GatewayOptions) -> Self {
        Self::with_program("adb", options)
    }

    pub fn with_program(program: impl Into<PathBuf>, options: GatewayOptions) -> Self {
        Self {
            program: program.into(),
            tmp_dir: options.tmp_dir,
            timeout: options.command_timeout,
        }
    }

    /// `adb version` succeeds.
    pub fn check_installed(&self) -> Result<(), DeviceError> {
        match self.run(&["version"]) {
            Ok(_) => {
                log::debug!("adb is installed and accessible");
                Ok(())
            }
            Err(DeviceError::Spawn { .. }) | Err(DeviceError::CommandFailed { .. }) => {
                Err(DeviceError::NotInstalled)
            }
            Err(e) => Err(e),
        }
    }

    fn describe(&self, args: &[&str]) -> String {
        let mut s = self.program.to_string_lossy().into_owned();
        for a in args {
            s.push(' ');
            s.push_str(a);
        }
        s
    }

    /// Run adb with `args`, killing it if it outlives the timeout.
    fn run(&self, args: &[&str]) -> Result<Finished, DeviceError> {
        let command = self.describe(args);
        log::debug!("running `{}`", command);

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DeviceError::Spawn { command: command.clone(), source })?;

        // Drain both pipes concurrently; a screencap is larger than the pipe buffer.
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    child.kill().ok();
                    child.wait().ok();
                    return Err(DeviceError::Timeout { command, timeout: self.timeout });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(DeviceError::Spawn { command, source }),
            }
        };

        let stdout = stdout.and_then(|h| h.join().ok()).unwrap_or_default();
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();

        if !status.success() {
            return Err(DeviceError::CommandFailed {
                command,
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(Finished { stdout, stderr })
    }

    fn screenshot_path(&self) -> PathBuf {
        self.tmp_dir.join(format!("screen_{}.png", Utc::now().timestamp()))
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf).ok();
        buf
    })
}

/// Parse `adb devices` output into ready serials. Entries in any other state
/// (unauthorized, offline) are reported and skipped.
pub fn parse_devices(output: &str) -> Vec<DeviceId> {
    let mut devices = Vec::new();
    for line in output.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let Some(serial) = fields.next() else { continue };
        match fields.next() {
            Some("device") => devices.push(DeviceId(serial.to_string())),
            Some(state) => log::warn!("device {} is {}, skipping it", serial, state),
            None => {}
        }
    }
    devices
}

/// Remove every regular file in `dir` except `.gitkeep`.
pub fn clear_tmp_dir(dir: &Path) -> Result<usize, DeviceError> {
    if !dir.exists() {
        return Ok(0);
    }
    let entries = fs::read_dir(dir).map_err(|source| DeviceError::Cleanup { path: dir.to_path_buf(), source })?;
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() || entry.file_name() == ".gitkeep" {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => {
                log::debug!("cleaned up file: {}", path.display());
                removed += 1;
            }
            Err(e) => log::error!("error deleting {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

impl DeviceGateway for AdbGateway {
    fn list_devices(&self) -> Result<Vec<DeviceId>, DeviceError> {
        let out = self.run(&["devices"])?;
        Ok(parse_devices(&String::from_utf8_lossy(&out.stdout)))
    }

    fn capture(&self, device: &DeviceId) -> Result<Capture, DeviceError> {
        let out = self
            .run(&["-s", device.as_str(), "exec-out", "screencap", "-p"])
            .map_err(|e| DeviceError::CaptureUnavailable(e.to_string()))?;
        if out.stdout.is_empty() {
            let detail = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(DeviceError::CaptureUnavailable(format!("empty screencap output {}", detail)));
        }

        let path = self.screenshot_path();
        let artifact = match fs::write(&path, &out.stdout) {
            Ok(()) => Some(path),
            Err(e) => {
                log::warn!("could not keep screenshot at {}: {}", path.display(), e);
                None
            }
        };
        Ok(Capture { data: out.stdout, artifact })
    }

    fn tap(&self, device: &DeviceId, point: ScreenPoint) -> Result<(), DeviceError> {
        let (x, y) = (point.x.to_string(), point.y.to_string());
        self.run(&["-s", device.as_str(), "shell", "input", "tap", &x, &y])?;
        Ok(())
    }

    fn cleanup(&self, device: &DeviceId) -> Result<(), DeviceError> {
        let local = clear_tmp_dir(&self.tmp_dir);
        if let Ok(n) = local {
            log::info!("temporary files cleanup complete ({} removed)", n);
        }
        let remote = self.run(&["-s", device.as_str(), "shell", "rm", "-f", DEVICE_SCREENSHOT_GLOB]);
        match (&local, &remote) {
            (_, Ok(_)) => log::debug!("cleaned up device screenshots"),
            (Err(_), Err(e)) => log::warn!("failed to clean device screenshots: {}", e),
            (Ok(_), Err(_)) => {}
        }
        local.and(remote).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ready_devices_only() {
        let out = "List of devices attached\n\
                   emulator-5554\tdevice\n\
                   R58M123ABC\tunauthorized\n\
                   0123456789\toffline\n\
                   192.168.1.7:5555\tdevice\n\n";
        let devices = parse_devices(out);
        assert_eq!(
            devices,
            vec![DeviceId("emulator-5554".into()), DeviceId("192.168.1.7:5555".into())]
        );
    }

    #[test]
    fn empty_listing_has_no_devices() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
        assert!(parse_devices("").is_empty());
    }

    #[test]
    fn clear_tmp_dir_keeps_gitkeep() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".gitkeep"), "").unwrap();
        fs::write(dir.path().join("screen_1.png"), b"x").unwrap();
        fs::write(dir.path().join("screen_2.png"), b"y").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();

        assert_eq!(clear_tmp_dir(dir.path()).unwrap(), 2);
        assert!(dir.path().join(".gitkeep").exists());
        assert!(dir.path().join("nested").exists());
        assert!(!dir.path().join("screen_1.png").exists());
    }

    #[test]
    fn clear_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(clear_tmp_dir(&dir.path().join("absent")).unwrap(), 0);
    }

    #[test]
    fn missing_program_means_not_installed() {
        let dir = tempfile::tempdir().unwrap();
        let gw = AdbGateway::with_program(
            dir.path().join("no-such-adb"),
            GatewayOptions { tmp_dir: dir.path().to_path_buf(), command_timeout: Duration::from_secs(1) },
        );
        assert!(matches!(gw.check_installed(), Err(DeviceError::NotInstalled)));
        assert!(matches!(
            gw.capture(&DeviceId("x".into())),
            Err(DeviceError::CaptureUnavailable(_))
        ));
    }
}
