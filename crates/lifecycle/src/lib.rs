//! Page view lifecycle: load, scroll milestones, visibility and exit.

pub mod scroll;
pub mod tracker;

pub use scroll::ScrollPosition;
pub use tracker::{PageLifecycleTracker, PageState, SCROLL_MILESTONES};
