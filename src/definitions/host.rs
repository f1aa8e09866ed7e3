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

//! This module defines the abstraction over the host document: the
//! queryable video elements, the ambient location, and the media events
//! which drive enforcement.

// Import anyhow features
use anyhow::Result;

/// An enum to identify the media element events relevant to enforcement.
/// The serialized names match the host-side event names.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaEventKind {
    /// The playback rate of the element changed
    RateChange,

    /// Playback resumed after a start, seek, ad or buffer stall
    Playing,

    /// The element finished loading its metadata
    LoadedMetadata,

    /// The element reported it can begin playback
    CanPlay,

    /// The element finished loading its first frame of data
    LoadedData,
}

/// An enum to carry asynchronous notifications from the host document to
/// the coordinator.
///
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// The document subtree changed (batched, high frequency)
    Mutation,

    /// A registered listener on the tracked video fired
    Media { kind: MediaEventKind },
}

/// An opaque handle for a registered media event listener. Handles are
/// the capability to deregister the listener later.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerHandle {
    pub id: u64, // the registration number, unique per element
}

/// A trait to represent a single media element within the host document.
///
pub trait MediaElement: Clone + Send + 'static {
    /// A method to read the current playback rate of the element
    fn playback_rate(&self) -> f64;

    /// A method to set the playback rate. The host may reject the write,
    /// e.g. for an element detached from the document.
    fn set_playback_rate(&self, rate: f64) -> Result<()>;

    /// A method to identify the media resource currently loaded into the
    /// element (the source url or equivalent)
    fn source_identity(&self) -> String;

    /// A method to check whether two handles refer to the same element
    fn same_element(&self, other: &Self) -> bool;

    /// A method to register an event listener on the element. One-shot
    /// listeners are consumed on first delivery.
    fn add_listener(&self, kind: MediaEventKind, once: bool) -> ListenerHandle;

    /// A method to deregister an event listener from the element
    fn remove_listener(&self, handle: &ListenerHandle);
}

/// A trait to represent the host document consumed by the enforcement
/// core.
///
pub trait HostDocument: Clone + Send + Sync + 'static {
    /// The media element type exposed by this document
    type Video: MediaElement;

    /// A method to find the first video element matching the selector,
    /// in document order
    fn query_video(&self, selector: &str) -> Option<Self::Video>;

    /// A method to read the ambient location of the document
    fn location(&self) -> String;
}
