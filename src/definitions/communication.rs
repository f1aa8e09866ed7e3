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

//! This module implements shared communication structures for communicating
//! across the modules of the system.

// Import crate definitions
use crate::definitions::*;

// Import Tokio features
use tokio::sync::{broadcast, mpsc, oneshot};

/// The stucture and methods to send WebRequests to the coordinator
///
#[derive(Clone, Debug)]
pub struct WebSend {
    web_send: mpsc::Sender<WebRequest>, // the mpsc sending line to pass web requests
}

// Implement the key features of the web send struct
impl WebSend {
    /// A function to create a new WebSend
    ///
    /// The function returns the the Web Sent structure and the coordinator
    /// receive channel which will return the provided updates.
    ///
    pub fn new() -> (Self, mpsc::Receiver<WebRequest>) {
        // Create the new channel
        let (web_send, receive) = mpsc::channel(256);

        // Create and return both new items
        (WebSend { web_send }, receive)
    }

    /// A method to send a web request. This method fails silently.
    ///
    pub async fn send(&self, reply_to: oneshot::Sender<WebReply>, request: Request) {
        self.web_send
            .send(WebRequest { reply_to, request })
            .await
            .unwrap_or(());
    }
}

/// A structure for carrying requests from the web interface
///
pub struct WebRequest {
    pub reply_to: oneshot::Sender<WebReply>, // the handle for replying to the reqeust
    pub request: Request,                    // the request
}

/// An enum to carry requests
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// A variant to read the current settings snapshot
    ReadSettings,

    /// A variant to apply a partial settings update. A manual "apply now"
    /// from a user interface is expressed as a settings write.
    UpdateSettings { patch: SettingsPatch },

    /// A variant to close the program and unload all the data
    Close,
}

/// A type to cover all web replies
///
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WebReply {
    // A variant for replies with no specific content
    #[serde(rename_all = "camelCase")]
    Generic {
        is_valid: bool,  // a flag to indicate the result of the request
        message: String, // a message describing the success or failure
    },

    // A variant for replies carrying the settings snapshot
    #[serde(rename_all = "camelCase")]
    Settings {
        is_valid: bool,             // a flag to indicate the result of the request
        settings: SettingsSnapshot, // the current settings snapshot
    },
}

// Implement key features of the web reply
impl WebReply {
    /// A function to return a new, successful web reply
    ///
    pub fn success() -> WebReply {
        WebReply::Generic {
            is_valid: true,
            message: "Request completed.".to_string(),
        }
    }

    /// A function to return a new, failed web reply
    ///
    pub fn failure<S>(reason: S) -> WebReply
    where
        S: Into<String>,
    {
        WebReply::Generic {
            is_valid: false,
            message: reason.into(),
        }
    }

    /// A function to return a new web reply with the settings snapshot
    ///
    pub fn settings(settings: SettingsSnapshot) -> WebReply {
        WebReply::Settings {
            is_valid: true,
            settings,
        }
    }

    /// A method to check if the reply is a success
    ///
    pub fn is_success(&self) -> bool {
        match self {
            &WebReply::Generic { ref is_valid, .. } => is_valid.clone(),
            &WebReply::Settings { ref is_valid, .. } => is_valid.clone(),
        }
    }
}

/// An enum to carry enforcement commands from the core to the host-side
/// shim.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnforcementCommand {
    /// A variant to set the playback rate of a specific video element
    #[serde(rename_all = "camelCase")]
    SetRate {
        video_id: String, // the host-side element identifier
        rate: f64,        // the rate to apply
    },
}

/// The structure and methods to publish enforcement commands to any
/// number of listening shims.
///
#[derive(Clone, Debug)]
pub struct CommandSend {
    command_send: broadcast::Sender<EnforcementCommand>, // the broadcast line for outgoing commands
}

// Implement the key features of command send
impl CommandSend {
    /// A function to create a new CommandSend
    ///
    pub fn new() -> Self {
        // Create the broadcast channel (the receiver is recreated on subscribe)
        let (command_send, _) = broadcast::channel(64);

        // Return the new command send
        CommandSend { command_send }
    }

    /// A method to publish an enforcement command. This method fails
    /// silently when no shim is listening.
    ///
    pub fn send(&self, command: EnforcementCommand) {
        self.command_send.send(command).unwrap_or(0);
    }

    /// A method to subscribe to the stream of enforcement commands
    ///
    pub fn subscribe(&self) -> broadcast::Receiver<EnforcementCommand> {
        self.command_send.subscribe()
    }
}
