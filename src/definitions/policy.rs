// Copyright (c) 2024 Decode Detroit
// Author: Patton Doyle
// Licence: GNU GPLv3
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! This module implements the playback policy and the user settings that
//! feed it. Settings use the wire names of the original storage keys.

// Import standard library features
use std::time::Duration;

// Define the built-in setting defaults
fn default_speed() -> f64 {
    2.0
}
fn default_max_speed() -> f64 {
    3.0
}
fn default_flag() -> bool {
    true
}

/// A structure to hold a complete settings snapshot. Any key missing from
/// the serialized form falls back to the built-in default.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsSnapshot {
    pub speed: f64,         // the preferred playback rate
    pub auto_apply: bool,   // whether to enforce the rate automatically
    pub smart_resume: bool, // whether to re-enforce after ads and buffering
    pub max_speed: f64,     // the upper bound on the enforced rate
}

// Implement the builtin defaults for the settings snapshot
impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            auto_apply: default_flag(),
            smart_resume: default_flag(),
            max_speed: default_max_speed(),
        }
    }
}

/// A structure to carry a partial settings update. Only the keys present
/// in the request are applied.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_apply: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smart_resume: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,
}

/// A structure to hold the current playback policy. The policy is only
/// mutated by the coordinator in response to settings changes.
///
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackPolicy {
    pub speed: f64,                // the preferred playback rate
    pub max_speed: f64,            // the upper bound on the enforced rate
    pub enforcement_enabled: bool, // whether enforcement is active
    pub resume_enabled: bool,      // whether the resume triggers are active
}

// Implement key features of the playback policy
impl PlaybackPolicy {
    /// A function to create a policy from a settings snapshot
    ///
    pub fn from_snapshot(snapshot: &SettingsSnapshot) -> Self {
        Self {
            speed: snapshot.speed,
            max_speed: snapshot.max_speed,
            enforcement_enabled: snapshot.auto_apply,
            resume_enabled: snapshot.smart_resume,
        }
    }

    /// A method to export the policy as a settings snapshot
    ///
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            speed: self.speed,
            auto_apply: self.enforcement_enabled,
            smart_resume: self.resume_enabled,
            max_speed: self.max_speed,
        }
    }

    /// A method to calculate the effective target rate, clamped to the
    /// maximum speed when one is set
    ///
    pub fn target_rate(&self) -> f64 {
        // Only clamp against a meaningful maximum
        if self.max_speed > 0.0 {
            return self.speed.min(self.max_speed);
        }
        self.speed
    }
}

// Implement the default playback policy
impl Default for PlaybackPolicy {
    fn default() -> Self {
        PlaybackPolicy::from_snapshot(&SettingsSnapshot::default())
    }
}

/// A structure to hold the timing tunables which bridge the host's
/// nondeterministic renegotiation windows. The mutation survey acts as a
/// fallback re-check behind both timers, so a stale timer is harmless.
///
#[derive(Debug, Clone)]
pub struct Tunables {
    pub resume_delay: Duration,     // the wait after a playback resume
    pub navigation_delay: Duration, // the wait after an in-app navigation
}

// Implement the default tunables
impl Default for Tunables {
    fn default() -> Self {
        Self {
            resume_delay: Duration::from_millis(200),
            navigation_delay: Duration::from_millis(500),
        }
    }
}

// Tests of the policy module
#[cfg(test)]
mod tests {
    use super::*;

    // Test the snapshot defaults and the wire names
    #[test]
    fn missing_keys_fall_back_to_defaults() {
        // Deserialize an empty and a partial snapshot
        let empty: SettingsSnapshot = serde_json::from_str("{}").unwrap();
        let partial: SettingsSnapshot = serde_json::from_str(r#"{"speed": 1.5}"#).unwrap();

        // Verify the defaults
        assert_eq!(empty, SettingsSnapshot::default());
        assert_eq!(partial.speed, 1.5);
        assert!(partial.auto_apply);
        assert!(partial.smart_resume);
        assert_eq!(partial.max_speed, 3.0);
    }

    // Test the maximum speed clamp
    #[test]
    fn target_rate_respects_max_speed() {
        // Start from the default policy
        let mut policy = PlaybackPolicy::default();
        assert_eq!(policy.target_rate(), 2.0);

        // Push the speed past the maximum
        policy.speed = 4.0;
        assert_eq!(policy.target_rate(), 3.0);

        // Disable the maximum
        policy.max_speed = 0.0;
        assert_eq!(policy.target_rate(), 4.0);
    }

    // Test the round trip through a snapshot
    #[test]
    fn snapshot_round_trip() {
        let snapshot = SettingsSnapshot {
            speed: 1.75,
            auto_apply: false,
            smart_resume: true,
            max_speed: 2.5,
        };
        let policy = PlaybackPolicy::from_snapshot(&snapshot);
        assert_eq!(policy.snapshot(), snapshot);
    }
}
