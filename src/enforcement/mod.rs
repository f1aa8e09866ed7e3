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

//! A module to monitor the host document and continuously enforce the
//! playback policy. This module owns the policy, the video tracker and
//! the navigation watcher, and reacts to settings changes from the web
//! interface.

// Define submodules
mod navigation_watcher;
mod rate_enforcer;
mod resume_guard;
mod settings_handler;
mod video_tracker;

// Import crate definitions
use crate::definitions::*;

// Import submodule definitions
use navigation_watcher::NavigationWatcher;
use rate_enforcer::RateEnforcer;
use resume_guard::ResumeGuard;
use settings_handler::SettingsHandler;
use video_tracker::VideoTracker;

// Import standard library features
use std::time::Duration;

// Import Tokio features
use tokio::sync::mpsc;
use tokio::time::sleep;

// Import tracing features
use tracing::info;

/// An enum to carry the delayed re-check reasons back into the event loop
///
#[derive(Debug)]
enum Recheck {
    /// A re-check after an in-app navigation, once the new page's video
    /// has had time to mount
    Navigation,

    /// A re-check after a playback resume, once the player has finished
    /// renegotiating its internal state
    Resume,
}

/// A structure to contain the enforcement coordinator and handle all
/// updates to the playback policy.
///
pub struct Coordinator<D: HostDocument> {
    document: D,                             // the host document to monitor
    policy: PlaybackPolicy,                  // the current playback policy
    tunables: Tunables,                      // the timing tunables
    settings_handler: SettingsHandler,       // the settings persistence handler
    video_tracker: VideoTracker<D>,          // the tracker for the primary video
    navigation_watcher: NavigationWatcher,   // the watcher for in-app navigation
    web_receive: mpsc::Receiver<WebRequest>, // the receiving line for web requests
    host_receive: mpsc::Receiver<HostEvent>, // the receiving line for host events
    recheck_send: mpsc::Sender<Recheck>,     // the sending line for delayed re-checks
    recheck_receive: mpsc::Receiver<Recheck>, // the receiving line for delayed re-checks
}

// Implement key Coordinator functionality
impl<D: HostDocument> Coordinator<D> {
    /// A function to create a new coordinator for the document. The
    /// settings snapshot is loaded immediately; if it is unavailable, the
    /// coordinator proceeds with the built-in defaults.
    ///
    pub fn new(
        document: D,
        host_receive: mpsc::Receiver<HostEvent>,
        settings_path: Option<String>,
        tunables: Tunables,
    ) -> (Self, WebSend) {
        // Create the web send for the web interface
        let (web_send, web_receive) = WebSend::new();

        // Create the internal re-check channel
        let (recheck_send, recheck_receive) = mpsc::channel(32);

        // Load the settings snapshot, falling back to the defaults
        let settings_handler = SettingsHandler::new(settings_path);
        let snapshot = settings_handler.load().unwrap_or_default();
        let policy = PlaybackPolicy::from_snapshot(&snapshot);
        info!(
            "Loaded playback policy: speed {}, enforcement {}, resume {}.",
            policy.speed, policy.enforcement_enabled, policy.resume_enabled
        );

        // Create the tracker and the watcher over the document
        let video_tracker = VideoTracker::new(document.clone());
        let navigation_watcher = NavigationWatcher::new(document.location());

        // Create the new coordinator instance
        let coordinator = Self {
            document,
            policy,
            tunables,
            settings_handler,
            video_tracker,
            navigation_watcher,
            web_receive,
            host_receive,
            recheck_send,
            recheck_receive,
        };

        // Return the new coordinator and the web send line
        (coordinator, web_send)
    }

    /// A method to run an infinite number of iterations of the coordinator
    /// to keep the playback policy enforced.
    ///
    /// At startup, the document is surveyed once: a video may already be
    /// mounted before the first mutation arrives.
    ///
    /// When this loop completes, it will consume the coordinator and drop
    /// all associated data.
    ///
    pub async fn run(mut self) {
        // A video may already be mounted at startup
        self.video_tracker.survey(&self.policy);

        // Loop the structure indefinitely
        loop {
            // Repeat endlessly until run_once reaches close
            if !self.run_once().await {
                break;
            }
        }
    }

    /// A method to run one iteration of the coordinator
    ///
    async fn run_once(&mut self) -> bool {
        // Check for updates on any line
        tokio::select! {
            // Requests from the web interface
            Some(request) = self.web_receive.recv() => {
                // Match the request subtype
                match request.request {
                    // If reading the settings snapshot
                    Request::ReadSettings => {
                        request.reply_to.send(WebReply::settings(self.policy.snapshot())).unwrap_or(());
                    }

                    // If applying a settings update
                    Request::UpdateSettings { patch } => {
                        self.update_settings(patch);
                        request.reply_to.send(WebReply::success()).unwrap_or(());
                    }

                    // If closing the program
                    Request::Close => {
                        request.reply_to.send(WebReply::success()).unwrap_or(());
                        return false;
                    }
                }
            }

            // Notifications from the host document
            Some(event) = self.host_receive.recv() => {
                self.handle_host_event(event);
            }

            // Delayed re-checks from our own timers
            Some(recheck) = self.recheck_receive.recv() => {
                self.handle_recheck(recheck);
            }
        }

        // In most cases, indicate to continue normally
        true
    }

    // A helper method to react to one notification from the host document
    fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            // On any subtree change, check for navigation and re-survey.
            // Handlers on this path must stay idempotent and cheap: the
            // host batches mutations but may still fire at high frequency.
            HostEvent::Mutation => {
                // Navigation invalidates the seen marking and schedules a
                // delayed re-check for the replacement video
                if self.navigation_watcher.check(&self.document.location()) {
                    self.video_tracker.invalidate();
                    self.schedule_recheck(Recheck::Navigation, self.tunables.navigation_delay);
                }

                // Re-survey the document for the tracked video
                self.video_tracker.survey(&self.policy);
            }

            // On a media event from the tracked video
            HostEvent::Media { kind } => match kind {
                // Correct rate drift (ads, explicit resets) immediately
                MediaEventKind::RateChange => {
                    if let Some(video) = self.video_tracker.current() {
                        ResumeGuard::correct_drift(video, &self.policy);
                    }
                }

                // Playback resumed: re-apply after a short delay, since an
                // immediate write may be overwritten by the player's own
                // resume logic
                MediaEventKind::Playing => {
                    self.schedule_recheck(Recheck::Resume, self.tunables.resume_delay);
                }

                // The one-shot late-binding triggers re-apply directly
                _ => {
                    if self.policy.enforcement_enabled {
                        RateEnforcer::apply(
                            self.video_tracker.current(),
                            self.policy.target_rate(),
                        );
                    }
                }
            },
        }
    }

    // A helper method to run one delayed re-check. The current tracked
    // video is re-fetched here rather than captured by the timer, so a
    // stale timer can never act on a superseded element.
    fn handle_recheck(&mut self, recheck: Recheck) {
        match recheck {
            // The replacement video may have mounted by now
            Recheck::Navigation => {
                self.video_tracker.survey(&self.policy);
            }

            // Re-apply to the current video after the resume window
            Recheck::Resume => {
                if self.policy.enforcement_enabled {
                    RateEnforcer::apply(self.video_tracker.current(), self.policy.target_rate());
                }
            }
        }
    }

    // A helper method to schedule a delayed re-check on the internal line
    fn schedule_recheck(&self, recheck: Recheck, delay: Duration) {
        // Post the re-check back to the event loop after the delay
        let recheck_send = self.recheck_send.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            recheck_send.send(recheck).await.unwrap_or(());
        });
    }

    // A helper method to apply a partial settings update. Every key is
    // compared before it is applied, so redelivering an identical update
    // changes nothing.
    fn update_settings(&mut self, patch: SettingsPatch) {
        // Apply each key which actually changed
        let mut changed = false;
        let mut rewire = false;
        if let Some(speed) = patch.speed {
            if speed != self.policy.speed {
                self.policy.speed = speed;
                changed = true;
            }
        }
        if let Some(max_speed) = patch.max_speed {
            if max_speed != self.policy.max_speed {
                self.policy.max_speed = max_speed;
                changed = true;
            }
        }
        if let Some(auto_apply) = patch.auto_apply {
            if auto_apply != self.policy.enforcement_enabled {
                self.policy.enforcement_enabled = auto_apply;
                changed = true;
            }
        }
        if let Some(smart_resume) = patch.smart_resume {
            if smart_resume != self.policy.resume_enabled {
                self.policy.resume_enabled = smart_resume;
                changed = true;
                rewire = true; // the listener set on the tracked video changes
            }
        }

        // Ignore a fully redundant update
        if !changed {
            return;
        }
        info!(
            "Updated playback policy: speed {}, enforcement {}, resume {}.",
            self.policy.speed, self.policy.enforcement_enabled, self.policy.resume_enabled
        );

        // Persist the new snapshot
        self.settings_handler.save(&self.policy.snapshot());

        // Rewire the tracked video when its listener set changed
        if rewire {
            self.video_tracker.invalidate();
        }
        self.video_tracker.survey(&self.policy);

        // Re-apply the policy immediately
        if self.policy.enforcement_enabled {
            RateEnforcer::apply(self.video_tracker.current(), self.policy.target_rate());
        }
    }
}
