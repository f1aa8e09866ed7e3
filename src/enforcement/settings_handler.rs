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

//! This module persists the settings snapshot to a local file so the
//! preferred speed survives a restart. The module does nothing if no
//! settings file was specified, and every failure is logged and swallowed:
//! the coordinator falls back to the built-in defaults rather than
//! blocking initialization.

// Import crate definitions
use crate::definitions::*;

// Import standard library features
use std::fs;
use std::path::PathBuf;

// Import tracing features
use tracing::error;

// Import YAML processing library
use serde_yaml;

/// A structure which holds the location of the settings file (if one was
/// specified) and synchronizes the snapshot to and from it.
///
pub struct SettingsHandler {
    path: Option<PathBuf>, // the settings file location, if persistence is active
}

// Implement key features for the settings handler
impl SettingsHandler {
    /// A function to create a new settings handler. Passing no path
    /// disables persistence entirely.
    ///
    pub fn new(path: Option<String>) -> Self {
        Self {
            path: path.map(PathBuf::from),
        }
    }

    /// A method to load the settings snapshot from the file. Returns None
    /// when persistence is disabled, the file does not exist yet, or the
    /// contents could not be understood.
    ///
    pub fn load(&self) -> Option<SettingsSnapshot> {
        // Make sure persistence is active
        let path = match &self.path {
            Some(path) => path,
            None => return None,
        };

        // A missing file is the normal first run, not an error
        if !path.exists() {
            return None;
        }

        // Try to read the file
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) => {
                error!("Unable to read the settings file: {}", error);
                return None;
            }
        };

        // Try to parse the snapshot
        match serde_yaml::from_str(&text) {
            Ok(snapshot) => Some(snapshot),
            Err(error) => {
                error!("Unable to parse the settings file: {}", error);
                None
            }
        }
    }

    /// A method to save the settings snapshot to the file. This method
    /// fails silently beyond a log entry.
    ///
    pub fn save(&self, snapshot: &SettingsSnapshot) {
        // Make sure persistence is active
        let path = match &self.path {
            Some(path) => path,
            None => return,
        };

        // Try to serialize the snapshot
        let text = match serde_yaml::to_string(snapshot) {
            Ok(text) => text,
            Err(error) => {
                error!("Unable to serialize the settings: {}", error);
                return;
            }
        };

        // Try to write the file
        if let Err(error) = fs::write(path, text) {
            error!("Unable to write the settings file: {}", error);
        }
    }
}

// Tests of the settings handler module
#[cfg(test)]
mod tests {
    use super::*;

    // Test the fallback when no file exists yet
    #[test]
    fn missing_file_falls_back() {
        // Point the handler at a file which does not exist
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.yaml");
        let handler = SettingsHandler::new(Some(path.to_string_lossy().to_string()));

        // Loading returns nothing
        assert!(handler.load().is_none());
    }

    // Test the save and load round trip
    #[test]
    fn snapshot_round_trip() {
        // Save a custom snapshot
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.yaml");
        let handler = SettingsHandler::new(Some(path.to_string_lossy().to_string()));
        let snapshot = SettingsSnapshot {
            speed: 1.75,
            auto_apply: false,
            smart_resume: true,
            max_speed: 2.5,
        };
        handler.save(&snapshot);

        // Load it back
        assert_eq!(handler.load(), Some(snapshot));
    }

    // Test the graceful handling of an unreadable file
    #[test]
    fn invalid_file_is_ignored() {
        // Write something that is not a snapshot
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("settings.yaml");
        fs::write(&path, "][ not yaml ][").unwrap();
        let handler = SettingsHandler::new(Some(path.to_string_lossy().to_string()));

        // Loading returns nothing
        assert!(handler.load().is_none());
    }

    // Test that a missing path disables persistence
    #[test]
    fn no_path_disables_persistence() {
        // Create a handler without a path
        let handler = SettingsHandler::new(None);

        // Both directions are no-ops
        handler.save(&SettingsSnapshot::default());
        assert!(handler.load().is_none());
    }
}
