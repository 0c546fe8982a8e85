//! Status indicator lights
//!
//! Three logical outputs reflect what the device is doing:
//!
//! | state            | ready | listening | processing |
//! |------------------|-------|-----------|------------|
//! | reset            | off   | off       | off        |
//! | ready / idle     | on    | off       | off        |
//! | activated        | on    | on        | off        |
//! | processing       | on    | off       | on         |
//!
//! While waiting for the network the ready light blinks, one toggle per
//! `connectivity_lost_pulse` call.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Deserialize;

use crate::{Error, Result};

/// Default sysfs GPIO root
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Physical indicator capability
///
/// Implementations only produce side effects; failures are logged, never
/// returned.
pub trait StatusIndicator: Send + Sync {
    /// Network is up and the device is ready
    fn ready(&self);

    /// Toggle the ready light once (blink while offline)
    fn connectivity_lost_pulse(&self);

    /// Waiting for the activation phrase
    fn idle_listening(&self);

    /// Activation phrase heard, listening for a question
    fn activated(&self);

    /// Looking up or speaking an answer
    fn processing(&self);

    /// All lights off
    fn reset(&self);
}

/// Indicator for hosts without status lights
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

impl StatusIndicator for NoopIndicator {
    fn ready(&self) {}
    fn connectivity_lost_pulse(&self) {}
    fn idle_listening(&self) {}
    fn activated(&self) {}
    fn processing(&self) {}
    fn reset(&self) {}
}

/// BCM pin numbers for the three lights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IndicatorPins {
    /// Green light
    pub ready: u8,
    /// White light
    pub listening: u8,
    /// Red light
    pub processing: u8,
}

impl Default for IndicatorPins {
    fn default() -> Self {
        Self {
            ready: 27,
            listening: 17,
            processing: 18,
        }
    }
}

/// Lights driven through the Linux sysfs GPIO interface
#[derive(Debug)]
pub struct SysfsIndicator {
    root: PathBuf,
    pins: IndicatorPins,
    ready_on: AtomicBool,
}

impl SysfsIndicator {
    /// Export and configure the pins under the default sysfs root
    ///
    /// # Errors
    ///
    /// Returns error if a pin cannot be exported or set as output
    pub fn new(pins: IndicatorPins) -> Result<Self> {
        Self::with_root(SYSFS_GPIO_ROOT, pins)
    }

    /// Export and configure the pins under `root`
    ///
    /// # Errors
    ///
    /// Returns error if a pin cannot be exported or set as output
    pub fn with_root(root: impl Into<PathBuf>, pins: IndicatorPins) -> Result<Self> {
        let root = root.into();

        for pin in [pins.ready, pins.listening, pins.processing] {
            let pin_dir = root.join(format!("gpio{pin}"));
            if !pin_dir.exists() {
                std::fs::write(root.join("export"), pin.to_string())
                    .map_err(|e| Error::Indicator(format!("export gpio{pin}: {e}")))?;
            }
            std::fs::write(pin_dir.join("direction"), "out")
                .map_err(|e| Error::Indicator(format!("configure gpio{pin}: {e}")))?;
            std::fs::write(pin_dir.join("value"), "0")
                .map_err(|e| Error::Indicator(format!("clear gpio{pin}: {e}")))?;
        }

        tracing::debug!(root = %root.display(), ?pins, "gpio indicator initialized");

        Ok(Self {
            root,
            pins,
            ready_on: AtomicBool::new(false),
        })
    }

    fn set(&self, pin: u8, high: bool) {
        if pin == self.pins.ready {
            self.ready_on.store(high, Ordering::Release);
        }
        let path = self.root.join(format!("gpio{pin}")).join("value");
        if let Err(e) = std::fs::write(&path, if high { "1" } else { "0" }) {
            tracing::warn!(pin, error = %e, "failed to write gpio value");
        }
    }

    fn show(&self, listening: bool, processing: bool) {
        self.set(self.pins.ready, true);
        self.set(self.pins.listening, listening);
        self.set(self.pins.processing, processing);
    }
}

impl StatusIndicator for SysfsIndicator {
    fn ready(&self) {
        self.set(self.pins.ready, true);
    }

    fn connectivity_lost_pulse(&self) {
        let was_on = self.ready_on.load(Ordering::Acquire);
        self.set(self.pins.ready, !was_on);
    }

    fn idle_listening(&self) {
        self.show(false, false);
    }

    fn activated(&self) {
        self.show(true, false);
    }

    fn processing(&self) {
        self.show(false, true);
    }

    fn reset(&self) {
        self.set(self.pins.ready, false);
        self.set(self.pins.listening, false);
        self.set(self.pins.processing, false);
    }
}

/// Whether this host looks like the target board
#[must_use]
pub fn is_target_hardware(gpio_root: &Path) -> bool {
    cfg!(target_os = "linux")
        && matches!(std::env::consts::ARCH, "arm" | "aarch64")
        && gpio_root.exists()
}

/// Pick the indicator implementation for this host
///
/// Falls back to [`NoopIndicator`] when disabled, off-target, or when the
/// pins cannot be claimed.
#[must_use]
pub fn detect(enabled: bool, pins: IndicatorPins) -> Arc<dyn StatusIndicator> {
    if !enabled || !is_target_hardware(Path::new(SYSFS_GPIO_ROOT)) {
        tracing::info!("status lights disabled");
        return Arc::new(NoopIndicator);
    }

    match SysfsIndicator::new(pins) {
        Ok(indicator) => {
            tracing::info!(?pins, "status lights enabled");
            Arc::new(indicator)
        }
        Err(e) => {
            tracing::warn!(error = %e, "status lights unavailable");
            Arc::new(NoopIndicator)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs() -> (tempfile::TempDir, SysfsIndicator) {
        let dir = tempfile::tempdir().unwrap();
        let pins = IndicatorPins::default();
        for pin in [pins.ready, pins.listening, pins.processing] {
            std::fs::create_dir(dir.path().join(format!("gpio{pin}"))).unwrap();
        }
        let indicator = SysfsIndicator::with_root(dir.path(), pins).unwrap();
        (dir, indicator)
    }

    fn levels(dir: &tempfile::TempDir) -> (String, String, String) {
        let read = |pin: u8| {
            std::fs::read_to_string(dir.path().join(format!("gpio{pin}/value"))).unwrap()
        };
        (read(27), read(17), read(18))
    }

    #[test]
    fn test_pins_configured_as_outputs() {
        let (dir, _indicator) = fake_sysfs();
        let direction = std::fs::read_to_string(dir.path().join("gpio17/direction")).unwrap();
        assert_eq!(direction, "out");
        assert_eq!(levels(&dir), ("0".into(), "0".into(), "0".into()));
    }

    #[test]
    fn test_state_patterns() {
        let (dir, indicator) = fake_sysfs();

        indicator.activated();
        assert_eq!(levels(&dir), ("1".into(), "1".into(), "0".into()));

        indicator.processing();
        assert_eq!(levels(&dir), ("1".into(), "0".into(), "1".into()));

        indicator.idle_listening();
        assert_eq!(levels(&dir), ("1".into(), "0".into(), "0".into()));

        indicator.reset();
        assert_eq!(levels(&dir), ("0".into(), "0".into(), "0".into()));
    }

    #[test]
    fn test_pulse_toggles_ready() {
        let (dir, indicator) = fake_sysfs();

        indicator.connectivity_lost_pulse();
        assert_eq!(levels(&dir).0, "1");
        indicator.connectivity_lost_pulse();
        assert_eq!(levels(&dir).0, "0");
        indicator.connectivity_lost_pulse();
        assert_eq!(levels(&dir).0, "1");
    }

    #[test]
    fn test_detect_disabled_is_noop() {
        // Must not touch the filesystem when disabled
        let indicator = detect(false, IndicatorPins::default());
        indicator.ready();
        indicator.reset();
    }
}
