// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Inbound result rendering
//!
//! Consumes messages from the transport channel and maintains the two display
//! slots: `processed` (last write wins, no expiry) and `cropped` (cleared
//! automatically if not refreshed within the decay window). Malformed
//! messages are logged and dropped; one bad message never interrupts the
//! next. Empty-string fields are treated as absent — the reference peer sends
//! `"cropped": ""` when it has no sub-frame to report.
//!
//! The cropped slot holds whatever the peer last sent; validation against the
//! encoded-image form happens at display time, exactly like the visibility
//! toggle. Toggling never touches the slots or the decay timer.

use crate::core::frame::is_image_data_uri;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Wire shape of one service result. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
struct InboundResult {
    processed: Option<String>,
    cropped: Option<String>,
}

/// Snapshot of the display outputs as a consumer should render them.
///
/// `processed_image` is always the latest processed frame. `cropped_image`
/// is present only while the underlying slot is fresh, the toggle is on, and
/// the value validates as an encoded image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub processed_image: Option<String>,
    pub cropped_image: Option<String>,
    pub show_cropped: bool,
}

struct RendererShared {
    processed: Mutex<Option<String>>,
    cropped: Mutex<Option<String>>,
    show_cropped: AtomicBool,
    /// Bumped on every cropped refresh; a decay task only clears the slot if
    /// its generation is still current (rapid updates reset, never stack).
    generation: AtomicU64,
    decay_task: Mutex<Option<JoinHandle<()>>>,
    decay_window: Duration,
    /// Latched by [`ResultRenderer::stop_decay`]; messages racing teardown
    /// must not re-arm the timer.
    stopped: AtomicBool,
}

/// Maintains display state from inbound service results.
///
/// Cheap to clone; clones share the same display state.
#[derive(Clone)]
pub struct ResultRenderer {
    shared: Arc<RendererShared>,
}

impl ResultRenderer {
    pub fn new(decay_window: Duration) -> Self {
        Self {
            shared: Arc::new(RendererShared {
                processed: Mutex::new(None),
                cropped: Mutex::new(None),
                show_cropped: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                decay_task: Mutex::new(None),
                decay_window,
                stopped: AtomicBool::new(false),
            }),
        }
    }

    /// Applies one raw inbound message to the display state.
    ///
    /// Must run inside a tokio runtime: a fresh cropped value arms the decay
    /// timer as a spawned task.
    pub fn on_message(&self, raw: &str) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            debug!("[Renderer] ignoring message after stop");
            return;
        }
        let result: InboundResult = match serde_json::from_str(raw) {
            Ok(result) => result,
            Err(e) => {
                warn!("[Renderer] dropping malformed message: {}", e);
                return;
            }
        };
        if let Some(processed) = result.processed.filter(|value| !value.is_empty()) {
            *self.shared.processed.lock() = Some(processed);
        }
        if let Some(cropped) = result.cropped.filter(|value| !value.is_empty()) {
            self.refresh_cropped(cropped);
        }
    }

    /// Stores a cropped value and re-arms the decay timer.
    fn refresh_cropped(&self, value: String) {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared.cropped.lock() = Some(value);

        let shared = Arc::clone(&self.shared);
        let decay = tokio::spawn(async move {
            tokio::time::sleep(shared.decay_window).await;
            // A newer refresh owns the slot now; leave it alone.
            if shared.generation.load(Ordering::SeqCst) == generation {
                shared.cropped.lock().take();
                debug!("[Renderer] cropped result expired");
            }
        });
        if let Some(stale) = self.shared.decay_task.lock().replace(decay) {
            stale.abort();
        }
    }

    /// Flips whether the cropped slot is rendered. Touches nothing else:
    /// the slots and the decay timer are unaffected.
    pub fn set_show_cropped(&self, show: bool) {
        self.shared.show_cropped.store(show, Ordering::Relaxed);
    }

    pub fn show_cropped(&self) -> bool {
        self.shared.show_cropped.load(Ordering::Relaxed)
    }

    /// Latest processed frame, independent of any toggle.
    pub fn processed_image(&self) -> Option<String> {
        self.shared.processed.lock().clone()
    }

    /// Current cropped slot value, ungated. Display gating applies only in
    /// [`display`](ResultRenderer::display).
    pub fn cropped_image(&self) -> Option<String> {
        self.shared.cropped.lock().clone()
    }

    /// Renders the current display state, applying the visibility toggle and
    /// the encoded-image validation to the cropped slot.
    pub fn display(&self) -> DisplayState {
        let show_cropped = self.show_cropped();
        DisplayState {
            processed_image: self.processed_image(),
            cropped_image: self
                .cropped_image()
                .filter(|value| show_cropped && is_image_data_uri(value)),
            show_cropped,
        }
    }

    /// Cancels the decay timer and stops applying further messages. Part of
    /// pipeline teardown; the slots keep their last values but nothing
    /// clears or refreshes them afterwards.
    pub fn stop_decay(&self) {
        self.shared.stopped.store(true, Ordering::SeqCst);
        if let Some(task) = self.shared.decay_task.lock().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CROPPED_URI: &str = "data:image/jpeg;base64,AAAA";
    const PROCESSED_URI: &str = "data:image/jpeg;base64,BBBB";

    fn renderer() -> ResultRenderer {
        ResultRenderer::new(Duration::from_millis(500))
    }

    fn cropped_message(value: &str) -> String {
        format!(r#"{{"cropped":"{}"}}"#, value)
    }

    #[tokio::test(start_paused = true)]
    async fn test_cropped_decays_after_window() {
        let renderer = renderer();
        renderer.on_message(&cropped_message(CROPPED_URI));
        assert_eq!(renderer.cropped_image().as_deref(), Some(CROPPED_URI));

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(renderer.cropped_image(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_updates_reset_the_decay_not_stack_it() {
        let renderer = renderer();
        renderer.on_message(&cropped_message(CROPPED_URI));
        tokio::time::sleep(Duration::from_millis(300)).await;
        renderer.on_message(&cropped_message(CROPPED_URI));

        // 600 ms after the first update but only 300 ms after the refresh.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(renderer.cropped_image().is_some(), "refresh must reset the window");

        // 550 ms after the refresh: decayed.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(renderer.cropped_image(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_processed_only_message_leaves_cropped_untouched() {
        let renderer = renderer();
        renderer.on_message(&cropped_message(CROPPED_URI));
        renderer.on_message(&format!(r#"{{"processed":"{}"}}"#, PROCESSED_URI));

        assert_eq!(renderer.processed_image().as_deref(), Some(PROCESSED_URI));
        assert_eq!(renderer.cropped_image().as_deref(), Some(CROPPED_URI));

        // The processed update must not have re-armed the cropped decay.
        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(renderer.cropped_image(), None);
        assert_eq!(renderer.processed_image().as_deref(), Some(PROCESSED_URI));
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_never_touches_slots_or_timer() {
        let renderer = renderer();
        renderer.on_message(&cropped_message(CROPPED_URI));

        renderer.set_show_cropped(true);
        renderer.set_show_cropped(false);
        renderer.set_show_cropped(true);
        assert_eq!(renderer.cropped_image().as_deref(), Some(CROPPED_URI));

        // 400 ms in: toggling must not have refreshed the window...
        tokio::time::sleep(Duration::from_millis(400)).await;
        renderer.set_show_cropped(false);
        assert!(renderer.cropped_image().is_some());

        // ...nor stopped it.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(renderer.cropped_image(), None);
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped_without_state_change() {
        let renderer = renderer();
        renderer.on_message("not json");
        assert_eq!(renderer.processed_image(), None);
        assert_eq!(renderer.cropped_image(), None);

        // One bad message never interrupts the next.
        renderer.on_message(&format!(r#"{{"processed":"{}"}}"#, PROCESSED_URI));
        assert_eq!(renderer.processed_image().as_deref(), Some(PROCESSED_URI));
    }

    #[tokio::test]
    async fn test_empty_string_fields_are_treated_as_absent() {
        let renderer = renderer();
        renderer.on_message(r#"{"processed":"","cropped":""}"#);
        assert_eq!(renderer.processed_image(), None);
        assert_eq!(renderer.cropped_image(), None);
    }

    #[tokio::test]
    async fn test_unknown_fields_are_ignored() {
        let renderer = renderer();
        renderer.on_message(&format!(
            r#"{{"processed":"{}","confidence":0.9,"boxes":[1,2]}}"#,
            PROCESSED_URI
        ));
        assert_eq!(renderer.processed_image().as_deref(), Some(PROCESSED_URI));
    }

    #[tokio::test]
    async fn test_display_gates_cropped_on_toggle_and_image_form() {
        let renderer = renderer();
        renderer.on_message(&cropped_message(CROPPED_URI));

        // Toggle off: slot populated, display suppressed.
        let display = renderer.display();
        assert_eq!(display.cropped_image, None);
        assert!(!display.show_cropped);

        renderer.set_show_cropped(true);
        let display = renderer.display();
        assert_eq!(display.cropped_image.as_deref(), Some(CROPPED_URI));

        // A malformed value reaches the slot but never the display.
        renderer.on_message(&cropped_message("totally-not-an-image"));
        assert_eq!(
            renderer.cropped_image().as_deref(),
            Some("totally-not-an-image")
        );
        assert_eq!(renderer.display().cropped_image, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_decay_cancels_the_pending_clear() {
        let renderer = renderer();
        renderer.on_message(&cropped_message(CROPPED_URI));
        renderer.stop_decay();

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(renderer.cropped_image().as_deref(), Some(CROPPED_URI));
    }

    #[tokio::test]
    async fn test_messages_after_stop_are_ignored() {
        let renderer = renderer();
        renderer.stop_decay();
        renderer.on_message(&cropped_message(CROPPED_URI));
        assert_eq!(renderer.cropped_image(), None);
    }
}
