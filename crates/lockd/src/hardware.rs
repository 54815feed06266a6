//! Hardware actuation for physical lock models.
//!
//! Every supported board exposes the same capability surface: a relay
//! line that throws the bolt, an LED line, and a momentary button whose
//! presses are delivered over a channel. One driver exists per physical
//! model; the model is selected by configuration at startup.

use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hardware access errors.
#[derive(Debug, Error)]
pub enum HardwareError {
    /// GPIO sysfs access failed.
    #[error("gpio access failed: {0}")]
    Gpio(#[from] std::io::Error),

    /// The configured model has no GPIO mapping.
    #[error("hardware model '{0}' has no gpio mapping")]
    Unsupported(HardwareModel),
}

/// Physical lock models the daemon can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HardwareModel {
    /// Orange Pi One board.
    OrangePiOne,
    /// Orange Pi Zero board.
    OrangePiZero,
    /// Raspberry Pi 3 board.
    #[serde(rename = "raspberry-pi-3")]
    RaspberryPi3,
    /// In-memory actuator for development and tests.
    #[default]
    Mock,
}

impl std::fmt::Display for HardwareModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HardwareModel::OrangePiOne => "orange-pi-one",
            HardwareModel::OrangePiZero => "orange-pi-zero",
            HardwareModel::RaspberryPi3 => "raspberry-pi-3",
            HardwareModel::Mock => "mock",
        };
        f.write_str(name)
    }
}

/// GPIO line assignments for one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinMap {
    /// Line driving the relay.
    pub relay: u32,
    /// Line driving the status LED.
    pub led: u32,
    /// Line reading the momentary button.
    pub button: u32,
}

impl HardwareModel {
    /// Returns the GPIO line assignments for this model, if any.
    pub fn pins(&self) -> Option<PinMap> {
        match self {
            HardwareModel::OrangePiOne => Some(PinMap {
                relay: 11,
                led: 12,
                button: 6,
            }),
            HardwareModel::OrangePiZero => Some(PinMap {
                relay: 12,
                led: 11,
                button: 6,
            }),
            HardwareModel::RaspberryPi3 => Some(PinMap {
                relay: 17,
                led: 27,
                button: 22,
            }),
            HardwareModel::Mock => None,
        }
    }
}

/// State of an actuator line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// Line driven low.
    Off,
    /// Line driven high.
    On,
}

/// A physical button press event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPress {
    /// When the press was observed.
    pub at: DateTime<Utc>,
}

impl ButtonPress {
    /// A press stamped now.
    pub fn now() -> Self {
        Self { at: Utc::now() }
    }
}

/// Capability surface of a lock's actuation hardware.
pub trait LockActuator: Send {
    /// Reads the current relay state.
    fn relay(&self) -> Result<RelayState, HardwareError>;

    /// Drives the relay line.
    fn set_relay(&mut self, state: RelayState) -> Result<(), HardwareError>;

    /// Registers a listener for physical button presses.
    ///
    /// The listener receives every press for the lifetime of the
    /// returned channel; dropping the receiver unsubscribes it.
    fn subscribe(&mut self) -> Receiver<ButtonPress>;
}

/// Builds the actuator for the configured model.
pub fn actuator_for(model: HardwareModel) -> Result<Box<dyn LockActuator>, HardwareError> {
    match model {
        HardwareModel::Mock => Ok(Box::new(MockActuator::new())),
        other => Ok(Box::new(GpioActuator::new(other)?)),
    }
}

/// Sysfs-backed GPIO actuator for real boards.
pub struct GpioActuator {
    pins: PinMap,
    base: PathBuf,
}

impl GpioActuator {
    /// Debounce interval for button polling.
    const POLL_INTERVAL: Duration = Duration::from_millis(50);

    /// Exports and configures the model's GPIO lines.
    pub fn new(model: HardwareModel) -> Result<Self, HardwareError> {
        let pins = model.pins().ok_or(HardwareError::Unsupported(model))?;
        let actuator = Self {
            pins,
            base: PathBuf::from("/sys/class/gpio"),
        };
        actuator.export(pins.relay, "out")?;
        actuator.export(pins.led, "out")?;
        actuator.export(pins.button, "in")?;
        Ok(actuator)
    }

    fn export(&self, pin: u32, direction: &str) -> Result<(), HardwareError> {
        let pin_dir = self.base.join(format!("gpio{}", pin));
        if !pin_dir.exists() {
            fs::write(self.base.join("export"), pin.to_string())?;
        }
        fs::write(pin_dir.join("direction"), direction)?;
        Ok(())
    }

    fn value_path(&self, pin: u32) -> PathBuf {
        self.base.join(format!("gpio{}", pin)).join("value")
    }

    fn read_pin(&self, pin: u32) -> Result<RelayState, HardwareError> {
        let raw = fs::read_to_string(self.value_path(pin))?;
        Ok(if raw.trim() == "1" {
            RelayState::On
        } else {
            RelayState::Off
        })
    }

    fn write_pin(&self, pin: u32, state: RelayState) -> Result<(), HardwareError> {
        let value = match state {
            RelayState::On => "1",
            RelayState::Off => "0",
        };
        fs::write(self.value_path(pin), value)?;
        Ok(())
    }
}

impl LockActuator for GpioActuator {
    fn relay(&self) -> Result<RelayState, HardwareError> {
        self.read_pin(self.pins.relay)
    }

    fn set_relay(&mut self, state: RelayState) -> Result<(), HardwareError> {
        // Mirror the relay on the status LED.
        self.write_pin(self.pins.led, state)?;
        self.write_pin(self.pins.relay, state)
    }

    fn subscribe(&mut self) -> Receiver<ButtonPress> {
        let (tx, rx) = mpsc::channel();
        let value_path = self.value_path(self.pins.button);
        thread::spawn(move || {
            let mut pressed = false;
            loop {
                let high = fs::read_to_string(&value_path)
                    .map(|raw| raw.trim() == "1")
                    .unwrap_or(false);
                if high && !pressed {
                    if tx.send(ButtonPress::now()).is_err() {
                        break;
                    }
                }
                pressed = high;
                thread::sleep(Self::POLL_INTERVAL);
            }
        });
        rx
    }
}

/// In-memory actuator for development and tests.
///
/// Tracks relay engagements and lets tests inject button presses via a
/// [`MockButton`] handle obtained before the actuator is boxed.
pub struct MockActuator {
    state: RelayState,
    engagements: Arc<Mutex<u32>>,
    listeners: Arc<Mutex<Vec<Sender<ButtonPress>>>>,
}

impl MockActuator {
    /// Creates a mock actuator with the relay off.
    pub fn new() -> Self {
        Self {
            state: RelayState::Off,
            engagements: Arc::new(Mutex::new(0)),
            listeners: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns a shared counter of relay engagements.
    pub fn engagement_counter(&self) -> Arc<Mutex<u32>> {
        Arc::clone(&self.engagements)
    }

    /// Returns a handle that injects button presses into subscribers.
    pub fn button_handle(&self) -> MockButton {
        MockButton {
            listeners: Arc::clone(&self.listeners),
        }
    }
}

impl Default for MockActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl LockActuator for MockActuator {
    fn relay(&self) -> Result<RelayState, HardwareError> {
        Ok(self.state)
    }

    fn set_relay(&mut self, state: RelayState) -> Result<(), HardwareError> {
        if self.state == RelayState::Off && state == RelayState::On {
            if let Ok(mut count) = self.engagements.lock() {
                *count += 1;
            }
        }
        self.state = state;
        Ok(())
    }

    fn subscribe(&mut self) -> Receiver<ButtonPress> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.push(tx);
        }
        rx
    }
}

/// Test handle injecting button presses into a [`MockActuator`].
#[derive(Clone)]
pub struct MockButton {
    listeners: Arc<Mutex<Vec<Sender<ButtonPress>>>>,
}

impl MockButton {
    /// Delivers a press to every live subscriber.
    pub fn press(&self) {
        if let Ok(mut listeners) = self.listeners.lock() {
            listeners.retain(|tx| tx.send(ButtonPress::now()).is_ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_real_model_has_pins() {
        for model in [
            HardwareModel::OrangePiOne,
            HardwareModel::OrangePiZero,
            HardwareModel::RaspberryPi3,
        ] {
            assert!(model.pins().is_some(), "{} has no pin map", model);
        }
        assert!(HardwareModel::Mock.pins().is_none());
    }

    #[test]
    fn test_mock_relay_state_tracking() {
        let mut actuator = MockActuator::new();
        assert_eq!(actuator.relay().unwrap(), RelayState::Off);

        actuator.set_relay(RelayState::On).unwrap();
        assert_eq!(actuator.relay().unwrap(), RelayState::On);

        actuator.set_relay(RelayState::Off).unwrap();
        assert_eq!(actuator.relay().unwrap(), RelayState::Off);
    }

    #[test]
    fn test_mock_counts_engagements() {
        let mut actuator = MockActuator::new();
        let counter = actuator.engagement_counter();

        actuator.set_relay(RelayState::On).unwrap();
        actuator.set_relay(RelayState::On).unwrap(); // still engaged, not counted
        actuator.set_relay(RelayState::Off).unwrap();
        actuator.set_relay(RelayState::On).unwrap();

        assert_eq!(*counter.lock().unwrap(), 2);
    }

    #[test]
    fn test_mock_button_delivers_to_subscribers() {
        let mut actuator = MockActuator::new();
        let button = actuator.button_handle();
        let rx = actuator.subscribe();

        button.press();
        button.press();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_mock_button_drops_dead_subscribers() {
        let mut actuator = MockActuator::new();
        let button = actuator.button_handle();
        drop(actuator.subscribe());

        // Pressing with no live subscriber is harmless.
        button.press();
    }

    #[test]
    fn test_model_serde_kebab_case() {
        let json = serde_json::to_string(&HardwareModel::OrangePiOne).unwrap();
        assert_eq!(json, "\"orange-pi-one\"");
        let model: HardwareModel = serde_json::from_str("\"raspberry-pi-3\"").unwrap();
        assert_eq!(model, HardwareModel::RaspberryPi3);
    }
}
