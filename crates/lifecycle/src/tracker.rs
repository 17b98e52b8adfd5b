//! Page view lifecycle tracker.
//!
//! One tracker covers one page view. Transitions:
//!
//! ```text
//! loaded -> scrolling <-> hidden <-> visible -> ... -> exiting
//! ```
//!
//! `exiting` is terminal; every signal after it is ignored.

use chrono::{DateTime, Duration, Utc};
use delivery::EventPipeline;
use engine_core::{EventType, TrackedEvent};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Scroll-depth thresholds, in ascending order.
pub const SCROLL_MILESTONES: [u8; 4] = [25, 50, 75, 100];

const PAGE_CATEGORY: &str = "page";
const ENGAGEMENT_CATEGORY: &str = "engagement";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageState {
    Loaded,
    Scrolling,
    Hidden,
    Visible,
    Exiting,
}

#[derive(Debug)]
struct ViewState {
    phase: PageState,
    page_start: DateTime<Utc>,
    max_scroll_percent: f64,
    /// Number of leading milestones already fired
    milestones_fired: usize,
    hidden_since: Option<DateTime<Utc>>,
    hidden_total: Duration,
}

impl ViewState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            phase: PageState::Loaded,
            page_start: now,
            max_scroll_percent: 0.0,
            milestones_fired: 0,
            hidden_since: None,
            hidden_total: Duration::zero(),
        }
    }

    /// Hidden time so far, including an ongoing hidden stretch.
    fn hidden_until(&self, now: DateTime<Utc>) -> Duration {
        match self.hidden_since {
            Some(since) => self.hidden_total + (now - since).max(Duration::zero()),
            None => self.hidden_total,
        }
    }

    fn scroll_depth(&self) -> u32 {
        self.max_scroll_percent.round() as u32
    }
}

/// Tracks load, scroll depth, visibility and exit for the current page view.
pub struct PageLifecycleTracker {
    pipeline: EventPipeline,
    /// Fallback navigation start when the host does not report one
    created_at: DateTime<Utc>,
    state: Mutex<ViewState>,
}

impl PageLifecycleTracker {
    pub fn new(pipeline: EventPipeline) -> Self {
        let now = pipeline.clock().now();
        Self {
            pipeline,
            created_at: now,
            state: Mutex::new(ViewState::new(now)),
        }
    }

    pub fn state(&self) -> PageState {
        self.state.lock().phase
    }

    /// Deepest scroll seen on this page view, in percent.
    pub fn max_scroll_percent(&self) -> f64 {
        self.state.lock().max_scroll_percent
    }

    /// Time since the page view started.
    pub fn time_on_page(&self) -> Duration {
        let now = self.pipeline.clock().now();
        now - self.state.lock().page_start
    }

    /// Starts the page view and emits `page_view`.
    ///
    /// `navigation_start` is when the host began loading the page; the gap
    /// to now is reported as the load time. Without it the tracker's own
    /// creation time stands in.
    pub async fn on_load(&self, navigation_start: Option<DateTime<Utc>>) {
        let now = self.pipeline.clock().now();
        *self.state.lock() = ViewState::new(now);

        let started = navigation_start.unwrap_or(self.created_at);
        let load_ms = (now - started).num_milliseconds().max(0);

        let page = self.pipeline.page().current();
        let event = TrackedEvent::new(EventType::PageView)
            .category(PAGE_CATEGORY)
            .action("view")
            .label(page.title)
            .value(load_ms as f64)
            .property("pageLoadTime", load_ms);

        self.pipeline.track(event).await;
    }

    /// Records a scroll position in percent and emits newly crossed milestones.
    ///
    /// Returns the milestones fired by this call, ascending.
    pub async fn on_scroll(&self, percent: f64) -> Vec<u8> {
        let crossed = {
            let mut state = self.state.lock();
            if state.phase == PageState::Exiting {
                return Vec::new();
            }

            let percent = if percent.is_finite() {
                percent.clamp(0.0, 100.0)
            } else {
                0.0
            };
            if percent > state.max_scroll_percent {
                state.max_scroll_percent = percent;
            }
            if state.phase != PageState::Hidden {
                state.phase = PageState::Scrolling;
            }

            // Milestones follow the running maximum, never the raw value.
            let mut crossed = Vec::new();
            while let Some(&milestone) = SCROLL_MILESTONES.get(state.milestones_fired) {
                if state.max_scroll_percent < f64::from(milestone) {
                    break;
                }
                crossed.push(milestone);
                state.milestones_fired += 1;
            }
            crossed
        };

        for &milestone in &crossed {
            debug!(milestone, "Scroll milestone reached");
            let event = TrackedEvent::new(EventType::Scroll)
                .category(ENGAGEMENT_CATEGORY)
                .action("scroll")
                .label(format!("{}%", milestone))
                .value(f64::from(milestone))
                .property("scrollDepth", milestone);
            self.pipeline.track(event).await;
        }

        crossed
    }

    /// Handles the page becoming hidden or visible again.
    ///
    /// Repeated signals for the current visibility are ignored.
    pub async fn on_visibility_change(&self, hidden: bool) {
        let now = self.pipeline.clock().now();

        let event = {
            let mut state = self.state.lock();
            match (state.phase, hidden) {
                (PageState::Exiting, _) => return,
                (PageState::Hidden, true) => return,
                (PageState::Hidden, false) => {
                    let hidden_ms = state
                        .hidden_since
                        .take()
                        .map(|since| (now - since).max(Duration::zero()))
                        .unwrap_or_else(Duration::zero);
                    state.hidden_total = state.hidden_total + hidden_ms;
                    state.phase = PageState::Visible;

                    TrackedEvent::new(EventType::PageVisible)
                        .category(PAGE_CATEGORY)
                        .action("visible")
                        .property("hiddenMs", hidden_ms.num_milliseconds())
                }
                (_, false) => return,
                (_, true) => {
                    state.hidden_since = Some(now);
                    state.phase = PageState::Hidden;

                    TrackedEvent::new(EventType::PageHidden)
                        .category(PAGE_CATEGORY)
                        .action("hidden")
                        .property("timeOnPage", (now - state.page_start).num_milliseconds())
                }
            }
        };

        self.pipeline.track(event).await;
    }

    /// Ends the page view and sends `page_exit` through the unload path.
    ///
    /// Only the first call sends anything. Returns whether this call did.
    pub fn on_exit(&self) -> bool {
        let now = self.pipeline.clock().now();

        let event = {
            let mut state = self.state.lock();
            if state.phase == PageState::Exiting {
                return false;
            }
            state.phase = PageState::Exiting;

            let time_on_page = (now - state.page_start).max(Duration::zero());
            let visible = (time_on_page - state.hidden_until(now)).max(Duration::zero());

            TrackedEvent::new(EventType::PageExit)
                .category(PAGE_CATEGORY)
                .action("exit")
                .value(time_on_page.num_milliseconds() as f64)
                .property("scrollDepth", state.scroll_depth())
                .property("timeOnPage", time_on_page.num_milliseconds())
                .property("visibleTimeMs", visible.num_milliseconds())
        };

        self.pipeline.track_on_unload(event);
        true
    }
}
