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

//! A module to re-enforce the playback rate after events that reset it
//! externally: instantaneous resets (ad insertion, player internals) and
//! resume-adjacent resets (recovery from a buffer stall).

// Import crate definitions
use crate::definitions::*;

// Import other enforcement structures
use super::rate_enforcer::RateEnforcer;

/// A structure to wire the reactive enforcement triggers onto a tracked
/// video. Double registration is prevented by the tracker, which attaches
/// at most once per source identity.
///
pub struct ResumeGuard;

// Implement key ResumeGuard functionality
impl ResumeGuard {
    /// A function to register the two reactive triggers on a video: the
    /// rate drift listener and the playback resume listener. Returns the
    /// listener handles, or none when smart resume is disabled.
    ///
    pub fn attach<V: MediaElement>(video: &V, policy: &PlaybackPolicy) -> Vec<ListenerHandle> {
        // Skip the wiring when smart resume is disabled
        if !policy.resume_enabled {
            return Vec::new();
        }

        // Register both triggers for the lifetime of the tracked video
        vec![
            video.add_listener(MediaEventKind::RateChange, false),
            video.add_listener(MediaEventKind::Playing, false),
        ]
    }

    /// A function to correct rate drift on the tracked video. A rate of
    /// exactly zero marks a pause-adjacent state, not drift, and is left
    /// alone.
    ///
    pub fn correct_drift<V: MediaElement>(video: &V, policy: &PlaybackPolicy) {
        // Respect the enforcement toggle
        if !policy.enforcement_enabled {
            return;
        }

        // Check the observed rate against the target
        let rate = video.playback_rate();
        if rate == 0.0 {
            return;
        }
        if rate != policy.target_rate() {
            RateEnforcer::apply(Some(video), policy.target_rate());
        }
    }
}
