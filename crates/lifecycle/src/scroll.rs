use serde::{Deserialize, Serialize};

/// Raw scroll metrics as a host page reports them, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollPosition {
    pub scroll_top: f64,
    pub viewport_height: f64,
    pub document_height: f64,
}

impl ScrollPosition {
    pub fn new(scroll_top: f64, viewport_height: f64, document_height: f64) -> Self {
        Self {
            scroll_top,
            viewport_height,
            document_height,
        }
    }

    /// Share of the document seen so far, clamped to `[0, 100]`.
    ///
    /// A document that fits in the viewport counts as fully seen.
    pub fn percent(&self) -> f64 {
        if self.document_height <= 0.0 || self.document_height <= self.viewport_height {
            return 100.0;
        }
        let seen = (self.scroll_top.max(0.0) + self.viewport_height.max(0.0)) / self.document_height;
        (seen * 100.0).clamp(0.0, 100.0)
    }
}
