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

//! A module to mirror the host document inside this process. The host-side
//! shim posts state and media event reports through the web interface; this
//! module turns them into host events for the coordinator and publishes the
//! resulting enforcement commands back to the shim.

// Import crate definitions
use crate::definitions::*;

// Import standard library features
use std::sync::{Arc, Mutex};

// Import anyhow features
use anyhow::{anyhow, Result};

// Import Tokio features
use tokio::sync::mpsc;

// Import FNV HashMap
use fnv::{FnvHashMap, FnvHashSet};

// Import tracing features
use tracing::{debug, warn};

/// A structure to describe one video element in a state report
///
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoReport {
    pub id: String,     // the host-side element identifier
    pub source: String, // the current media resource of the element
    pub rate: f64,      // the current playback rate of the element
    #[serde(default)]
    pub primary: bool, // whether the element matches the primary player selector
}

/// A structure to describe the full mirrored state of the document
///
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateReport {
    pub location: String, // the ambient location of the document
    #[serde(default)]
    pub videos: Vec<VideoReport>, // the matching video elements, in document order
}

/// A structure to describe a media event observed by the shim
///
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEventReport {
    pub video_id: String,     // the host-side element identifier
    pub kind: MediaEventKind, // the event which fired
    #[serde(default)]
    pub rate: Option<f64>, // the new playback rate, for rate change events
}

/// A helper structure to hold one listener registration
///
struct Registration {
    kind: MediaEventKind, // the event kind the listener matches
    once: bool,           // whether the listener is consumed on first delivery
}

/// A helper structure to hold the mirrored state of one video element
///
struct VideoState {
    source: String,                          // the current media resource
    rate: f64,                               // the mirrored playback rate
    primary: bool,                           // whether the primary selector matches
    detached: bool,                          // whether the element left the document
    next_listener: u64,                      // the next listener registration number
    listeners: FnvHashMap<u64, Registration>, // the active listener registrations
}

/// A helper structure to hold the mirrored state of the whole document
///
struct DocumentState {
    location: String,                               // the ambient location
    order: Vec<String>,                             // the element identifiers, in document order
    videos: FnvHashMap<String, Arc<Mutex<VideoState>>>, // the mirrored video elements
}

/// A structure to represent the host document, backed by the mirrored
/// state and connected to the coordinator by the host event line.
///
#[derive(Clone)]
pub struct BridgeDocument {
    state: Arc<Mutex<DocumentState>>,  // the mirrored document state
    host_send: mpsc::Sender<HostEvent>, // the sending line for host events
    command_send: CommandSend,          // the broadcast line for enforcement commands
}

// Implement key BridgeDocument functionality
impl BridgeDocument {
    /// A function to create a new, empty bridge document
    ///
    pub fn new(host_send: mpsc::Sender<HostEvent>, command_send: CommandSend) -> Self {
        Self {
            state: Arc::new(Mutex::new(DocumentState {
                location: String::new(),
                order: Vec::new(),
                videos: FnvHashMap::default(),
            })),
            host_send,
            command_send,
        }
    }

    /// A method to replace the mirrored state with a new report from the
    /// shim and notify the coordinator of the mutation
    ///
    pub async fn apply_state_report(&self, report: StateReport) {
        // Get a lock on the document state
        if let Ok(mut state) = self.state.lock() {
            // Update the ambient location
            state.location = report.location;

            // Mark any element missing from the report as detached
            let reported: FnvHashSet<String> =
                report.videos.iter().map(|video| video.id.clone()).collect();
            for (id, video) in state.videos.iter() {
                if !reported.contains(id) {
                    if let Ok(mut video_state) = video.lock() {
                        video_state.detached = true;
                    }
                }
            }
            state.videos.retain(|id, _| reported.contains(id));

            // Update or create every reported element, preserving document order
            state.order = report.videos.iter().map(|video| video.id.clone()).collect();
            for video in report.videos {
                // If the element is already mirrored, refresh it
                if let Some(existing) = state.videos.get(&video.id) {
                    if let Ok(mut video_state) = existing.lock() {
                        video_state.source = video.source;
                        video_state.rate = video.rate;
                        video_state.primary = video.primary;
                    }

                // Otherwise, mirror the new element
                } else {
                    state.videos.insert(
                        video.id,
                        Arc::new(Mutex::new(VideoState {
                            source: video.source,
                            rate: video.rate,
                            primary: video.primary,
                            detached: false,
                            next_listener: 1,
                            listeners: FnvHashMap::default(),
                        })),
                    );
                }
            }
        }

        // Notify the coordinator of the subtree change
        self.host_send.send(HostEvent::Mutation).await.unwrap_or(());
    }

    /// A method to deliver a media event from the shim. The event is
    /// forwarded only when a matching listener is registered; one-shot
    /// listeners are consumed by the delivery.
    ///
    pub async fn deliver_media_event(&self, report: MediaEventReport) {
        // Look for the element and check the listener registrations
        let mut matched = false;
        if let Ok(state) = self.state.lock() {
            // If the element is no longer mirrored, drop the event
            let video = match state.videos.get(&report.video_id) {
                Some(video) => video,
                None => {
                    debug!("Dropping media event for unknown video: {}.", report.video_id);
                    return;
                }
            };

            // Update the mirrored rate for rate change events
            if let Ok(mut video_state) = video.lock() {
                if report.kind == MediaEventKind::RateChange {
                    if let Some(rate) = report.rate {
                        video_state.rate = rate;
                    }
                }

                // Check for matching listeners and consume any one-shots
                let mut consumed = Vec::new();
                for (id, registration) in video_state.listeners.iter() {
                    if registration.kind == report.kind {
                        matched = true;
                        if registration.once {
                            consumed.push(*id);
                        }
                    }
                }
                for id in consumed.drain(..) {
                    video_state.listeners.remove(&id);
                }
            }
        }

        // Forward the event when a listener matched
        if matched {
            self.host_send
                .send(HostEvent::Media { kind: report.kind })
                .await
                .unwrap_or(());
        }
    }
}

// Implement the host document trait for the bridge
impl HostDocument for BridgeDocument {
    type Video = BridgeVideo;

    fn query_video(&self, selector: &str) -> Option<BridgeVideo> {
        // Get a lock on the document state
        let state = match self.state.lock() {
            Ok(state) => state,
            _ => return None,
        };

        // Walk the elements in document order
        for id in state.order.iter() {
            // Skip any identifier without mirrored state
            let video = match state.videos.get(id) {
                Some(video) => video,
                None => continue,
            };

            // Check the element against the selector
            let is_match = match selector {
                PRIMARY_PLAYER_SELECTOR => match video.lock() {
                    Ok(video_state) => video_state.primary,
                    _ => false,
                },
                GENERIC_VIDEO_SELECTOR => true,

                // Warn about any unrecognized selector
                _ => {
                    warn!("Unrecognized video selector: {}.", selector);
                    return None;
                }
            };

            // Return a handle to the first match
            if is_match {
                return Some(BridgeVideo {
                    id: id.clone(),
                    state: video.clone(),
                    command_send: self.command_send.clone(),
                });
            }
        }

        // Indicate no match
        None
    }

    fn location(&self) -> String {
        match self.state.lock() {
            Ok(state) => state.location.clone(),
            _ => String::new(),
        }
    }
}

/// A structure to represent a handle to one mirrored video element. The
/// handle remains readable after the element detaches, but writes fail.
///
#[derive(Clone)]
pub struct BridgeVideo {
    id: String,                   // the host-side element identifier
    state: Arc<Mutex<VideoState>>, // the mirrored element state
    command_send: CommandSend,     // the broadcast line for enforcement commands
}

// Implement the media element trait for the bridge video
impl MediaElement for BridgeVideo {
    fn playback_rate(&self) -> f64 {
        match self.state.lock() {
            Ok(state) => state.rate,
            _ => 0.0,
        }
    }

    fn set_playback_rate(&self, rate: f64) -> Result<()> {
        // Get a lock on the element state
        let mut state = match self.state.lock() {
            Ok(state) => state,
            _ => return Err(anyhow!("Unable to access mirrored element state.")),
        };

        // Refuse the write on a detached element
        if state.detached {
            return Err(anyhow!("Media element is detached from the document."));
        }

        // Update the mirror and publish the command for the shim
        state.rate = rate;
        self.command_send.send(EnforcementCommand::SetRate {
            video_id: self.id.clone(),
            rate,
        });

        // Indicate success
        Ok(())
    }

    fn source_identity(&self) -> String {
        match self.state.lock() {
            Ok(state) => state.source.clone(),
            _ => String::new(),
        }
    }

    fn same_element(&self, other: &Self) -> bool {
        self.id == other.id
    }

    fn add_listener(&self, kind: MediaEventKind, once: bool) -> ListenerHandle {
        // Get a lock on the element state
        if let Ok(mut state) = self.state.lock() {
            // Register the listener under the next number
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.insert(id, Registration { kind, once });
            return ListenerHandle { id };
        }

        // Return an inert handle if the state was unavailable
        ListenerHandle { id: 0 }
    }

    fn remove_listener(&self, handle: &ListenerHandle) {
        if let Ok(mut state) = self.state.lock() {
            state.listeners.remove(&handle.id);
        }
    }
}


// Tests of the host bridge module
#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    // Test the selector precedence within the mirrored document
    #[tokio::test]
    async fn query_follows_document_order() {
        // Mirror two videos, the second marked as the primary player
        let harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![
                    video_report("ad-1", "https://cdn.example.com/ad.mp4", 1.0, false),
                    video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true),
                ],
            ))
            .await;

        // The primary selector skips the ad element
        let primary = harness
            .document
            .query_video(PRIMARY_PLAYER_SELECTOR)
            .unwrap();
        assert_eq!(primary.source_identity(), "https://cdn.example.com/a.mp4");

        // The generic selector returns the first element in document order
        let generic = harness.document.query_video(GENERIC_VIDEO_SELECTOR).unwrap();
        assert_eq!(generic.source_identity(), "https://cdn.example.com/ad.mp4");
    }

    // Test that events without a matching listener are dropped
    #[tokio::test]
    async fn unmatched_events_are_dropped() {
        // Mirror one video without any listeners
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        let _ = harness.host_receive.recv().await; // consume the mutation

        // Deliver an event with no listener registered
        harness
            .document
            .deliver_media_event(MediaEventReport {
                video_id: "main-1".to_string(),
                kind: MediaEventKind::Playing,
                rate: None,
            })
            .await;

        // Nothing should be waiting on the host line
        assert!(harness.host_receive.try_recv().is_err());
    }

    // Test the one-shot listener consumption
    #[tokio::test]
    async fn one_shot_listeners_are_consumed() {
        // Mirror one video and register a one-shot listener
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        let _ = harness.host_receive.recv().await; // consume the mutation
        let video = harness
            .document
            .query_video(PRIMARY_PLAYER_SELECTOR)
            .unwrap();
        video.add_listener(MediaEventKind::CanPlay, true);

        // The first delivery is forwarded
        let report = MediaEventReport {
            video_id: "main-1".to_string(),
            kind: MediaEventKind::CanPlay,
            rate: None,
        };
        harness.document.deliver_media_event(report.clone()).await;
        assert!(harness.host_receive.try_recv().is_ok());

        // The second delivery finds no listener
        harness.document.deliver_media_event(report).await;
        assert!(harness.host_receive.try_recv().is_err());
    }

    // Test the detached element write failure
    #[tokio::test]
    async fn detached_elements_reject_writes() {
        // Mirror one video and keep a handle to it
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        let video = harness
            .document
            .query_video(PRIMARY_PLAYER_SELECTOR)
            .unwrap();

        // Remove the element from the document
        harness
            .document
            .apply_state_report(state_report("https://example.com/watch?v=a", Vec::new()))
            .await;

        // The held handle still reads, but refuses writes
        assert_eq!(video.playback_rate(), 1.0);
        assert!(video.set_playback_rate(2.0).is_err());
        assert!(drain_commands(&mut harness.commands).is_empty());
    }
}
