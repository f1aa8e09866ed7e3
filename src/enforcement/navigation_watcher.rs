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

//! A module to detect in-app navigation by watching the ambient location.
//! The host replaces the document subtree wholesale on navigation, so
//! there is no page load to hook into; the location comparison piggybacks
//! on the same mutation signal the video tracker uses.

// Import tracing features
use tracing::info;

/// A structure to hold the last known location and detect changes to it
///
pub struct NavigationWatcher {
    last_known_location: String, // the location at the last check
}

// Implement key NavigationWatcher functionality
impl NavigationWatcher {
    /// A function to create a new navigation watcher at the given location
    ///
    pub fn new(initial_location: String) -> Self {
        Self {
            last_known_location: initial_location,
        }
    }

    /// A method to compare the ambient location against the stored value.
    /// Returns true exactly when a navigation was detected, updating the
    /// stored location as a side effect.
    ///
    pub fn check(&mut self, location: &str) -> bool {
        // Ignore a matching location
        if location == self.last_known_location {
            return false;
        }

        // Store the new location and report the navigation
        info!("Navigation detected: {}.", location);
        self.last_known_location = location.to_string();
        true
    }
}

// Tests of the navigation watcher module
#[cfg(test)]
mod tests {
    use super::*;

    // Test the location change detection
    #[test]
    fn detects_location_changes() {
        // Start at the first location
        let mut watcher = NavigationWatcher::new("https://example.com/watch?v=a".to_string());

        // The same location is not a navigation
        assert!(!watcher.check("https://example.com/watch?v=a"));

        // A new location is reported exactly once
        assert!(watcher.check("https://example.com/watch?v=b"));
        assert!(!watcher.check("https://example.com/watch?v=b"));

        // Returning to the first location is a navigation again
        assert!(watcher.check("https://example.com/watch?v=a"));
    }
}
