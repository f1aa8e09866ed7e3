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

//! The main module of the speedpilot program which pulls from the other
//! modules.

// Import JSON processing features
#[macro_use]
extern crate serde;

// Define program modules
mod definitions;
mod enforcement;
mod host_bridge;
mod web_interface;

// Import crate definitions
use crate::definitions::*;

// Import other structures into this module
use self::enforcement::Coordinator;
use self::host_bridge::BridgeDocument;
use self::web_interface::WebInterface;

// Import standard library features
use std::env;

// Import tracing features
use tracing::warn;
use tracing_subscriber;

// Import tokio features
use tokio::sync::mpsc;

/// The main function of the program, which wires the host bridge, the
/// enforcement coordinator and the web interface together.
///
#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Read the command line options
    let mut address = String::from(DEFAULT_ADDRESS);
    let mut settings_path = Some(String::from(DEFAULT_SETTINGS_FILE));
    let mut arguments = env::args().skip(1);
    while let Some(argument) = arguments.next() {
        match argument.as_str() {
            // An alternate listening address for the web interface
            "--address" | "-a" => {
                if let Some(value) = arguments.next() {
                    address = value;
                }
            }

            // An alternate location for the settings file
            "--settings" | "-s" => {
                settings_path = arguments.next();
            }

            // Disable settings persistence entirely
            "--ephemeral" => {
                settings_path = None;
            }

            // Warn about anything unrecognized
            _ => {
                warn!("Unrecognized command line argument: {}.", argument);
            }
        }
    }

    // Create the communication lines for the host bridge
    let (host_send, host_receive) = mpsc::channel(256);
    let command_send = CommandSend::new();

    // Create the bridge document, fed by the web interface
    let document = BridgeDocument::new(host_send, command_send.clone());

    // Create the enforcement coordinator and spawn it
    let (coordinator, web_send) = Coordinator::new(
        document.clone(),
        host_receive,
        settings_path,
        Tunables::default(),
    );
    tokio::spawn(async move {
        coordinator.run().await;
    });

    // Run the web interface until shutdown
    let mut web_interface = WebInterface::new(web_send, document, command_send, address);
    web_interface.run().await;
}
