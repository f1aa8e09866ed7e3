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

//! A module to apply the target playback rate to a media element.

// Import crate definitions
use crate::definitions::*;

// Import tracing features
use tracing::error;

/// A structure to apply the target rate to a media element. The operation
/// is pure and idempotent: it holds no state and writes only on divergence.
///
pub struct RateEnforcer;

// Implement key RateEnforcer functionality
impl RateEnforcer {
    /// A function to apply the target rate to the provided video, if any.
    ///
    /// Does nothing when there is no video or the target is not positive.
    /// The equality check prevents redundant writes and avoids retriggering
    /// the host's rate change listeners. A rejected write is logged and left
    /// for the next natural trigger; it is never retried in a loop.
    ///
    pub fn apply<V: MediaElement>(video: Option<&V>, target_rate: f64) {
        // Make sure there is a video to adjust
        let video = match video {
            Some(video) => video,
            None => return,
        };

        // Ignore invalid targets
        if target_rate <= 0.0 {
            return;
        }

        // Skip the write if the rate already matches
        if video.playback_rate() == target_rate {
            return;
        }

        // Try to set the new rate
        if let Err(error) = video.set_playback_rate(target_rate) {
            // Defer to the next trigger (navigation, resume event, settings change)
            error!("Unable to set playback rate: {}", error);
        }
    }
}
