//! Light state — the discrete signal a light is showing.

use serde::{Deserialize, Serialize};

/// Discrete signal shown by a light.
///
/// [`StopThenGo`](Self::StopThenGo) is the safe idle state: every light starts
/// there and falls back to it when nothing refreshes its state in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightState {
    #[default]
    StopThenGo,
    Stop,
    Go,
    Transitioning,
}

impl LightState {
    /// The state a light opposing this one should show.
    ///
    /// `Go` and `Stop` swap, `Transitioning` stays put, and everything else
    /// maps to the safe state.
    #[must_use]
    pub fn polar(self) -> Self {
        match self {
            Self::Go => Self::Stop,
            Self::Stop => Self::Go,
            Self::Transitioning => Self::Transitioning,
            Self::StopThenGo => Self::StopThenGo,
        }
    }

    /// Whether this is the safe idle state, which never expires.
    #[must_use]
    pub fn is_safe(self) -> bool {
        matches!(self, Self::StopThenGo)
    }
}

impl std::fmt::Display for LightState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopThenGo => f.write_str("stop_then_go"),
            Self::Stop => f.write_str("stop"),
            Self::Go => f.write_str("go"),
            Self::Transitioning => f.write_str("transitioning"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_swap_go_and_stop() {
        assert_eq!(LightState::Go.polar(), LightState::Stop);
        assert_eq!(LightState::Stop.polar(), LightState::Go);
    }

    #[test]
    fn should_keep_transitioning_when_polarized() {
        assert_eq!(LightState::Transitioning.polar(), LightState::Transitioning);
    }

    #[test]
    fn should_map_safe_state_to_itself() {
        assert_eq!(LightState::StopThenGo.polar(), LightState::StopThenGo);
    }

    #[test]
    fn should_default_to_safe_state() {
        assert_eq!(LightState::default(), LightState::StopThenGo);
        assert!(LightState::default().is_safe());
        assert!(!LightState::Go.is_safe());
    }

    #[test]
    fn should_display_snake_case_variant_name() {
        assert_eq!(LightState::StopThenGo.to_string(), "stop_then_go");
        assert_eq!(LightState::Go.to_string(), "go");
    }

    #[test]
    fn should_serialize_as_snake_case_string() {
        let json = serde_json::to_string(&LightState::StopThenGo).unwrap();
        assert_eq!(json, "\"stop_then_go\"");
        let parsed: LightState = serde_json::from_str("\"transitioning\"").unwrap();
        assert_eq!(parsed, LightState::Transitioning);
    }
}
