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

//! A module to track the primary video element through document mutations:
//! discovery, replacement, source changes and removal. The tracker drives
//! the initial enforcement and owns the listener handles wired onto the
//! tracked video.

// Import crate definitions
use crate::definitions::*;

// Import other enforcement structures
use super::rate_enforcer::RateEnforcer;
use super::resume_guard::ResumeGuard;

// Import tracing features
use tracing::info;

/// A helper structure for the video currently under enforcement. The
/// listener set is scoped to this tracked video and is deregistered in
/// full when the video is superseded.
///
struct TrackedVideo<V> {
    video: V,                        // the handle to the media element
    source_identity: String,         // the media resource when last wired
    seen: bool,                      // whether enforcement and listeners are wired
    listeners: Vec<ListenerHandle>,  // the active listener handles
}

/// A structure to watch the document for the tracked video appearing,
/// disappearing, or being replaced by a different media source.
///
pub struct VideoTracker<D: HostDocument> {
    document: D,                           // the host document to query
    tracked: Option<TrackedVideo<D::Video>>, // the video currently under enforcement
}

// Implement key VideoTracker functionality
impl<D: HostDocument> VideoTracker<D> {
    /// A function to create a new video tracker for the document
    ///
    pub fn new(document: D) -> Self {
        Self {
            document,
            tracked: None,
        }
    }

    /// A method to run one survey of the document. This is the mutation
    /// tick: it discovers a new video, rewires a replaced or reloaded one,
    /// and clears the tracking when no video matches.
    ///
    pub fn survey(&mut self, policy: &PlaybackPolicy) {
        // Look for a matching video, preferring the primary player
        let video = match self.select_video() {
            Some(video) => video,

            // Defensive transition back to no video
            None => {
                if self.tracked.is_some() {
                    info!("Tracked video removed from the document.");
                    self.clear();
                }
                return;
            }
        };

        // If the same video is already wired, there is nothing to do
        let identity = video.source_identity();
        if let Some(tracked) = &self.tracked {
            if tracked.seen
                && tracked.source_identity == identity
                && tracked.video.same_element(&video)
            {
                return;
            }
        }

        // Supersede any previous tracking, releasing its listeners
        self.clear();
        info!("Tracking video: {}.", identity);

        // Apply the rate immediately, if enforcement is enabled
        if policy.enforcement_enabled {
            RateEnforcer::apply(Some(&video), policy.target_rate());
        }

        // Wire the reactive triggers and the one-shot late-binding triggers
        // (duration and rate capability may still be negotiating)
        let mut listeners = ResumeGuard::attach(&video, policy);
        listeners.push(video.add_listener(MediaEventKind::LoadedMetadata, true));
        listeners.push(video.add_listener(MediaEventKind::CanPlay, true));
        listeners.push(video.add_listener(MediaEventKind::LoadedData, true));

        // Mark the video as seen for this source identity
        self.tracked = Some(TrackedVideo {
            video,
            source_identity: identity,
            seen: true,
            listeners,
        });
    }

    /// A method to clear the seen marking so the next survey rewires the
    /// video, used after an in-app navigation or a policy flag change
    ///
    pub fn invalidate(&mut self) {
        if let Some(tracked) = &mut self.tracked {
            tracked.seen = false;
        }
    }

    /// A method to borrow the currently tracked video. Timer callbacks
    /// re-fetch through this method rather than capturing a handle.
    ///
    pub fn current(&self) -> Option<&D::Video> {
        self.tracked.as_ref().map(|tracked| &tracked.video)
    }

    // A helper method to select the video element, with the primary player
    // selector taking precedence over the generic fallback
    fn select_video(&self) -> Option<D::Video> {
        self.document
            .query_video(PRIMARY_PLAYER_SELECTOR)
            .or_else(|| self.document.query_video(GENERIC_VIDEO_SELECTOR))
    }

    // A helper method to drop the tracking and deregister every listener
    // it owns
    fn clear(&mut self) {
        if let Some(tracked) = self.tracked.take() {
            for handle in tracked.listeners.iter() {
                tracked.video.remove_listener(handle);
            }
        }
    }
}

// Tests of the video tracker module
#[cfg(test)]
mod tests {
    use super::*;
    use crate::host_bridge::testing::*;
    use crate::host_bridge::BridgeDocument;

    // A helper function to create a tracker over a test document
    fn test_tracker(document: &BridgeDocument) -> VideoTracker<BridgeDocument> {
        VideoTracker::new(document.clone())
    }

    // Test the discovery path: enforcement plus listener wiring
    #[tokio::test]
    async fn discovery_enforces_and_wires() {
        // Mirror a single video at the native rate
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;

        // Survey the document
        let mut tracker = test_tracker(&harness.document);
        tracker.survey(&PlaybackPolicy::default());

        // The rate is applied and five listeners are wired
        // (drift, resume, and the three one-shot triggers)
        assert_eq!(
            drain_commands(&mut harness.commands),
            vec![EnforcementCommand::SetRate {
                video_id: "main-1".to_string(),
                rate: 2.0,
            }]
        );
        assert_eq!(listener_count(&harness.document, "main-1"), 5);

        // A repeat survey changes nothing
        tracker.survey(&PlaybackPolicy::default());
        assert!(drain_commands(&mut harness.commands).is_empty());
        assert_eq!(listener_count(&harness.document, "main-1"), 5);
    }

    // Test the primary selector precedence over the generic fallback
    #[tokio::test]
    async fn primary_player_takes_precedence() {
        // Mirror an ad element ahead of the primary player
        let mut harness = test_document();
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

        // Enforcement acts on the primary player, never the ad element
        let mut tracker = test_tracker(&harness.document);
        tracker.survey(&PlaybackPolicy::default());
        assert_eq!(
            drain_commands(&mut harness.commands),
            vec![EnforcementCommand::SetRate {
                video_id: "main-1".to_string(),
                rate: 2.0,
            }]
        );
        assert_eq!(listener_count(&harness.document, "ad-1"), 0);
    }

    // Test rewiring when a new source loads into the same element
    #[tokio::test]
    async fn source_change_rewires_the_element() {
        // Mirror and survey the first source
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        let mut tracker = test_tracker(&harness.document);
        tracker.survey(&PlaybackPolicy::default());
        let _ = drain_commands(&mut harness.commands);

        // Load a new source into the same element node
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=b",
                vec![video_report("main-1", "https://cdn.example.com/b.mp4", 1.0, true)],
            ))
            .await;
        tracker.survey(&PlaybackPolicy::default());

        // The rate is re-applied and the listeners are rewired, not doubled
        assert_eq!(
            drain_commands(&mut harness.commands),
            vec![EnforcementCommand::SetRate {
                video_id: "main-1".to_string(),
                rate: 2.0,
            }]
        );
        assert_eq!(listener_count(&harness.document, "main-1"), 5);
    }

    // Test that a replacement element does not inherit the seen marking
    #[tokio::test]
    async fn replacement_element_is_rediscovered() {
        // Mirror and survey the first element
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        let mut tracker = test_tracker(&harness.document);
        tracker.survey(&PlaybackPolicy::default());
        let _ = drain_commands(&mut harness.commands);

        // Replace the element wholesale, even with the same source
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-2", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        tracker.survey(&PlaybackPolicy::default());

        // The new element is wired from scratch
        assert_eq!(
            drain_commands(&mut harness.commands),
            vec![EnforcementCommand::SetRate {
                video_id: "main-2".to_string(),
                rate: 2.0,
            }]
        );
        assert_eq!(listener_count(&harness.document, "main-2"), 5);
    }

    // Test the defensive transition back to no video
    #[tokio::test]
    async fn removal_clears_the_tracking() {
        // Mirror and survey a video
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        let mut tracker = test_tracker(&harness.document);
        tracker.survey(&PlaybackPolicy::default());
        let _ = drain_commands(&mut harness.commands);

        // Remove every video from the document
        harness
            .document
            .apply_state_report(state_report("https://example.com/watch?v=a", Vec::new()))
            .await;
        tracker.survey(&PlaybackPolicy::default());

        // The tracking is cleared without issuing commands
        assert!(tracker.current().is_none());
        assert!(drain_commands(&mut harness.commands).is_empty());
    }

    // Test that invalidation forces a full rewire on the next survey
    #[tokio::test]
    async fn invalidation_forces_rediscovery() {
        // Mirror and survey a video
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        let mut tracker = test_tracker(&harness.document);
        tracker.survey(&PlaybackPolicy::default());
        let _ = drain_commands(&mut harness.commands);

        // Drift the mirrored rate, then invalidate and survey again
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        tracker.invalidate();
        tracker.survey(&PlaybackPolicy::default());

        // The rate is re-applied and the listener set stays bounded
        assert_eq!(
            drain_commands(&mut harness.commands),
            vec![EnforcementCommand::SetRate {
                video_id: "main-1".to_string(),
                rate: 2.0,
            }]
        );
        assert_eq!(listener_count(&harness.document, "main-1"), 5);
    }

    // Test that enforcement is skipped when disabled, but wiring proceeds
    #[tokio::test]
    async fn disabled_enforcement_still_wires() {
        // Mirror a video with enforcement disabled
        let mut harness = test_document();
        harness
            .document
            .apply_state_report(state_report(
                "https://example.com/watch?v=a",
                vec![video_report("main-1", "https://cdn.example.com/a.mp4", 1.0, true)],
            ))
            .await;
        let mut policy = PlaybackPolicy::default();
        policy.enforcement_enabled = false;

        // No command is issued, but the listeners are in place
        let mut tracker = test_tracker(&harness.document);
        tracker.survey(&policy);
        assert!(drain_commands(&mut harness.commands).is_empty());
        assert_eq!(listener_count(&harness.document, "main-1"), 5);
    }
}
