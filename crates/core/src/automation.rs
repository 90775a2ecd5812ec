use std::fmt;
use std::time::{Duration, Instant};

use crate::error::LocateError;
use crate::locator::{Located, TemplateTarget};
use crate::platform::DeviceGateway;
use crate::settings::Settings;
use crate::sleep::{self, Cancel, Clock, Wake};
use crate::types::*;

/// Pause before re-locating so on-screen transitions can finish.
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Why a locate attempt yielded no target.
#[derive(Debug)]
pub enum LossCause {
    NotFound { best_score: Option<f64> },
    Error(LocateError),
}

impl fmt::Display for LossCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossCause::NotFound { best_score: Some(s) } => {
                write!(f, "template not found (best confidence {:.2})", s)
            }
            LossCause::NotFound { best_score: None } => f.write_str("template not found"),
            LossCause::Error(e) => write!(f, "{}", e),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug)]
pub enum Termination {
    InitialAcquisitionFailed(LossCause),
    TargetLost(LossCause),
    UserCancelled,
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::UserCancelled => 0,
            Termination::InitialAcquisitionFailed(_) | Termination::TargetLost(_) => 1,
        }
    }

    /// What the operator should do about it.
    pub fn remediation(&self) -> &'static str {
        match self {
            Termination::InitialAcquisitionFailed(LossCause::NotFound { .. }) => {
                "make sure the template image is visible on screen before starting"
            }
            Termination::TargetLost(LossCause::NotFound { .. }) => {
                "the template may have moved or disappeared; check the device screen and restart"
            }
            Termination::InitialAcquisitionFailed(LossCause::Error(_))
            | Termination::TargetLost(LossCause::Error(_)) => {
                "check the USB connection and that the device is unlocked, then run `adb devices`"
            }
            Termination::UserCancelled => "",
        }
    }

    /// Write the outcome to the log stream.
    pub fn report(&self) {
        match self {
            Termination::InitialAcquisitionFailed(cause) => {
                log::error!("initial scan failed: {}", cause);
                log::error!("{}", self.remediation());
            }
            Termination::TargetLost(cause) => {
                log::error!("stopping automation, periodic check failed: {}", cause);
                log::error!("{}", self.remediation());
            }
            Termination::UserCancelled => log::info!("cleanup complete, exiting"),
        }
    }
}

/// How the current location is (re)derived.
enum Target {
    Template(TemplateTarget),
    Fixed(ScreenPoint),
}

/// Mutable loop state; lives for one run.
struct LoopState {
    location: ScreenPoint,
    last_scan: Instant,
}

/// The tap loop for one device.
pub struct Clicker<'a, C: Clock> {
    gateway: &'a dyn DeviceGateway,
    device: DeviceId,
    settings: &'a Settings,
    clock: C,
    cancel: Cancel,
    taps: u64,
}

impl<'a, C: Clock> Clicker<'a, C> {
    pub fn new(
        gateway: &'a dyn DeviceGateway,
        device: DeviceId,
        settings: &'a Settings,
        clock: C,
        cancel: Cancel,
    ) -> Self {
        Self { gateway, device, settings, clock, cancel, taps: 0 }
    }

    /// Taps issued so far, including ones the device rejected.
    pub fn taps(&self) -> u64 {
        self.taps
    }

    /// Run until the target is lost or the run is cancelled.
    pub fn run(&mut self) -> Termination {
        let (target, location) = match self.acquire_initial() {
            Ok(pair) => pair,
            Err(cause) => return Termination::InitialAcquisitionFailed(cause),
        };
        log::info!("target found at initial location: {}", location);

        let mut state = LoopState { location, last_scan: self.clock.now() };
        let mut rng = rand::thread_rng();

        loop {
            if self.cancel.is_cancelled() {
                return self.shut_down();
            }

            if let Some(interval) = self.settings.scan_interval {
                if self.clock.now().duration_since(state.last_scan) > interval {
                    match self.revalidate(&target, &mut state) {
                        Ok(()) => {}
                        Err(Some(cause)) => return Termination::TargetLost(cause),
                        Err(None) => return self.shut_down(),
                    }
                }
            }

            let point = sleep::jitter(&mut rng, state.location, self.settings.random_offset);
            self.taps += 1;
            if let Err(e) = self.gateway.tap(&self.device, point) {
                log::warn!("tap at {} failed: {}", point, e);
            }

            let delay = self.settings.timing.sample(&mut rng);
            if self.clock.sleep(delay) == Wake::Cancelled {
                return self.shut_down();
            }
        }
    }

    fn acquire_initial(&self) -> Result<(Target, ScreenPoint), LossCause> {
        match &self.settings.click_mode {
            ClickMode::Coordinates(point) => Ok((Target::Fixed(*point), *point)),
            ClickMode::Template { path } => {
                let template = TemplateTarget::load(path, self.settings.threshold).map_err(LossCause::Error)?;
                log::info!("starting automation with template: {}", template.path().display());
                let point = self.locate(&template)?;
                Ok((Target::Template(template), point))
            }
        }
    }

    fn locate(&self, template: &TemplateTarget) -> Result<ScreenPoint, LossCause> {
        match template.acquire(self.gateway, &self.device) {
            Ok(Located::Found { point, .. }) => Ok(point),
            Ok(Located::NotFound { best_score }) => Err(LossCause::NotFound { best_score }),
            Err(e) => Err(LossCause::Error(e)),
        }
    }

    /// Periodic housekeeping and re-location. `Err(None)` means the settle
    /// delay was cancelled.
    fn revalidate(&self, target: &Target, state: &mut LoopState) -> Result<(), Option<LossCause>> {
        self.housekeeping();
        match target {
            Target::Fixed(_) => {
                state.last_scan = self.clock.now();
                Ok(())
            }
            Target::Template(template) => {
                if self.clock.sleep(SETTLE_DELAY) == Wake::Cancelled {
                    return Err(None);
                }
                match self.locate(template) {
                    Ok(point) => {
                        log::debug!("template relocated to: {}", point);
                        state.location = point;
                        state.last_scan = self.clock.now();
                        Ok(())
                    }
                    Err(cause) => {
                        self.housekeeping();
                        Err(Some(cause))
                    }
                }
            }
        }
    }

    fn housekeeping(&self) {
        if let Err(e) = self.gateway.cleanup(&self.device) {
            log::warn!("cleanup failed: {}", e);
        }
    }

    fn shut_down(&self) -> Termination {
        log::info!("received interrupt, cleaning up...");
        self.housekeeping();
        Termination::UserCancelled
    }
}
