//! Key and engine state derived from Engine Speed broadcasts.

use std::fmt;
use std::time::Duration;

use j84_canbus::SpnValue;
use j84_canbus::packets::EngineSpeed;

/// Speeds above this are a running engine.
pub const RUNNING_RPM: f64 = 300.0;

/// How long the bus is sampled for Engine Speed.
pub const ENGINE_SPEED_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    KeyOnEngineOff,
    KeyOff,
    /// The engine broadcast speed as Not Available or Error.
    Unknown,
}

impl EngineState {
    /// State implied by the latest Engine Speed packet, `KeyOff` when none
    /// was heard. Only a valid speed decides between running and engine off.
    pub fn from_engine_speed(packet: Option<&EngineSpeed>) -> Self {
        match packet.map(EngineSpeed::engine_speed) {
            None => EngineState::KeyOff,
            Some(SpnValue::Value(rpm)) if rpm > RUNNING_RPM => EngineState::Running,
            Some(SpnValue::Value(_)) => EngineState::KeyOnEngineOff,
            Some(SpnValue::NotAvailable | SpnValue::Error) => EngineState::Unknown,
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Running => "Key ON/Engine RUNNING",
            EngineState::KeyOnEngineOff => "Key ON/Engine OFF",
            EngineState::KeyOff => "Key OFF",
            EngineState::Unknown => "Key ON/Engine state unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speed(value: SpnValue) -> EngineSpeed {
        EngineSpeed::create(0, value).unwrap()
    }

    #[test]
    fn nothing_heard_is_key_off() {
        assert_eq!(EngineState::from_engine_speed(None), EngineState::KeyOff);
    }

    #[test]
    fn idle_is_running() {
        let packet = speed(SpnValue::Value(650.0));
        assert_eq!(EngineState::from_engine_speed(Some(&packet)), EngineState::Running);
    }

    #[test]
    fn threshold_is_not_running() {
        let packet = speed(SpnValue::Value(300.0));
        assert_eq!(EngineState::from_engine_speed(Some(&packet)), EngineState::KeyOnEngineOff);
    }

    #[test]
    fn sentinel_speed_is_unknown() {
        for value in [SpnValue::NotAvailable, SpnValue::Error] {
            let packet = speed(value);
            let state = EngineState::from_engine_speed(Some(&packet));
            assert_eq!(state, EngineState::Unknown);
            assert_ne!(state, EngineState::KeyOnEngineOff);
        }
    }

    #[test]
    fn stopped_engine_is_key_on() {
        let packet = speed(SpnValue::Value(0.0));
        assert_eq!(EngineState::from_engine_speed(Some(&packet)), EngineState::KeyOnEngineOff);
    }

    #[test]
    fn display_form() {
        assert_eq!(EngineState::Running.to_string(), "Key ON/Engine RUNNING");
    }
}
