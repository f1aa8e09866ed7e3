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

//! A module to create the web interface connecting the host-side shim and
//! any settings UI to the program. The shim posts document state and media
//! event reports, and listens for enforcement commands; a settings UI reads
//! and writes the settings snapshot.

// Import crate definitions
use crate::definitions::*;

// Import the host bridge structures
use crate::host_bridge::{BridgeDocument, MediaEventReport, StateReport};

// Import standard library features
use std::net::SocketAddr;

// Import Tokio and warp features
use tokio::sync::{broadcast, oneshot};
use warp::{http, Filter};

// Import serde feaures
use serde::de::DeserializeOwned;

// Import tracing features
use tracing::error;

// Define conversions from data types into a Request
impl From<SettingsPatch> for Request {
    fn from(patch: SettingsPatch) -> Self {
        Request::UpdateSettings { patch }
    }
}

/// A structure to contain the web interface and handle all requests to
/// the coordinator and the host bridge.
///
pub struct WebInterface {
    web_send: WebSend,         // send line to the coordinator
    document: BridgeDocument,  // the host bridge fed by the shim reports
    command_send: CommandSend, // the broadcast line of enforcement commands
    address: String,           // the listening address
}

// Implement key Web Interface functionality
impl WebInterface {
    /// A function to create a new web interface. The send channel should
    /// connect directly to the coordinator.
    ///
    pub fn new(
        web_send: WebSend,
        document: BridgeDocument,
        command_send: CommandSend,
        address: String,
    ) -> Self {
        // Return the new web interface
        WebInterface {
            web_send,
            document,
            command_send,
            address,
        }
    }

    /// A method to listen for connections from the shim and the settings UI
    ///
    pub async fn run(&mut self) {
        // Create the read settings filter
        let read_settings = warp::get()
            .and(warp::path("settings"))
            .and(warp::path::end())
            .and(WebInterface::with_clone(self.web_send.clone()))
            .and(WebInterface::with_clone(Request::ReadSettings))
            .and_then(WebInterface::handle_request);

        // Create the update settings filter
        let update_settings = warp::post()
            .and(warp::path("settings"))
            .and(warp::path::end())
            .and(WebInterface::with_clone(self.web_send.clone()))
            .and(WebInterface::with_json::<SettingsPatch>())
            .and_then(WebInterface::handle_request);

        // Create the state report filter
        let report_state = warp::post()
            .and(warp::path("reportState"))
            .and(warp::path::end())
            .and(WebInterface::with_clone(self.document.clone()))
            .and(WebInterface::with_json::<StateReport>())
            .and_then(WebInterface::handle_state_report);

        // Create the media event report filter
        let report_media_event = warp::post()
            .and(warp::path("reportMediaEvent"))
            .and(warp::path::end())
            .and(WebInterface::with_clone(self.document.clone()))
            .and(WebInterface::with_json::<MediaEventReport>())
            .and_then(WebInterface::handle_media_event);

        // Create the enforcement command listening filter
        let listen = warp::get()
            .and(warp::path("listen"))
            .and(warp::path::end())
            .and(WebInterface::with_clone(self.command_send.clone()))
            .map(WebInterface::handle_listen);

        // Create the close filter
        let close = warp::post()
            .and(warp::path("close"))
            .and(warp::path::end())
            .and(WebInterface::with_clone(self.web_send.clone()))
            .and(WebInterface::with_clone(Request::Close))
            .and_then(WebInterface::handle_request);

        // Combine the filters
        let routes = read_settings
            .or(update_settings)
            .or(report_state)
            .or(report_media_event)
            .or(listen)
            .or(close);

        // Try to parse the listening address
        let address = match self.address.parse::<SocketAddr>() {
            Ok(address) => address,
            Err(..) => {
                error!("Invalid listening address: {}.", self.address);
                return;
            }
        };

        // Handle incoming requests on the specified address
        warp::serve(routes).run(address).await;
    }

    /// A function to handle requests directed at the coordinator
    ///
    async fn handle_request<R>(
        web_send: WebSend,
        request: R,
    ) -> Result<impl warp::Reply, warp::Rejection>
    where
        R: Into<Request>,
    {
        // Send the message and wait for the reply
        let (reply_to, rx) = oneshot::channel();
        web_send.send(reply_to, request.into()).await;

        // Wait for the reply
        if let Ok(reply) = rx.await {
            // If the reply is a success
            if reply.is_success() {
                return Ok(warp::reply::with_status(
                    warp::reply::json(&reply),
                    http::StatusCode::OK,
                ));

            // Otherwise, note the error
            } else {
                return Ok(warp::reply::with_status(
                    warp::reply::json(&reply),
                    http::StatusCode::BAD_REQUEST,
                ));
            }

        // Otherwise, note the error
        } else {
            return Ok(warp::reply::with_status(
                warp::reply::json(&WebReply::failure("Unable to process request.")),
                http::StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
    }

    /// A function to handle a document state report from the shim
    ///
    async fn handle_state_report(
        document: BridgeDocument,
        report: StateReport,
    ) -> Result<impl warp::Reply, warp::Rejection> {
        // Fold the report into the mirrored document
        document.apply_state_report(report).await;

        // Indicate success
        Ok(warp::reply::with_status(
            warp::reply::json(&WebReply::success()),
            http::StatusCode::OK,
        ))
    }

    /// A function to handle a media event report from the shim
    ///
    async fn handle_media_event(
        document: BridgeDocument,
        report: MediaEventReport,
    ) -> Result<impl warp::Reply, warp::Rejection> {
        // Deliver the event through the listener registry
        document.deliver_media_event(report).await;

        // Indicate success
        Ok(warp::reply::with_status(
            warp::reply::json(&WebReply::success()),
            http::StatusCode::OK,
        ))
    }

    /// A function to stream the enforcement commands to a listening shim
    ///
    fn handle_listen(command_send: CommandSend) -> impl warp::Reply {
        // Subscribe to the command broadcast
        let mut receive = command_send.subscribe();

        // Repackage the commands as server-sent events
        let stream = async_stream::stream! {
            loop {
                match receive.recv().await {
                    // Serialize each command for the shim
                    Ok(command) => {
                        match warp::sse::Event::default().json_data(&command) {
                            Ok(event) => yield Ok::<_, std::convert::Infallible>(event),
                            Err(..) => continue, // drop a command that cannot serialize
                        }
                    }

                    // Skip past any commands lost to backpressure
                    Err(broadcast::error::RecvError::Lagged(..)) => continue,

                    // End the stream when the program closes
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        // Reply with the event stream
        warp::sse::reply(warp::sse::keep_alive().stream(stream))
    }

    // A function to extract a helper type from the body of the message
    fn with_json<T>() -> impl Filter<Extract = (T,), Error = warp::Rejection> + Clone
    where
        T: Send + DeserializeOwned,
    {
        // When accepting a body, we want a JSON body (reject large payloads)
        warp::body::content_length_limit(1024 * 16).and(warp::body::json())
    }

    // A function to add a cloneable item to the filter
    fn with_clone<T>(
        item: T,
    ) -> impl Filter<Extract = (T,), Error = std::convert::Infallible> + Clone
    where
        T: Send + Clone,
    {
        warp::any().map(move || item.clone())
    }
}
