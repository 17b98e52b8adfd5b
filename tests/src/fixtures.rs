//! Test fixtures: experiments, pages and device signals.

use engine_core::{DeviceSignals, Experiment, ExperimentStatus, PageSnapshot, Variant};
use std::collections::HashMap;

pub const CHROME_MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Build a variant of `experiment_id`.
pub fn variant(experiment_id: &str, name: &str, weight: f64, is_control: bool) -> Variant {
    Variant {
        id: format!("{}-{}", experiment_id, name),
        experiment_id: experiment_id.to_string(),
        name: name.to_string(),
        is_control,
        traffic_weight: weight,
        config: HashMap::from([("headline".to_string(), serde_json::json!(format!("{} copy", name)))]),
    }
}

/// Running experiment with full allocation and no targeting. The first
/// variant is the control.
pub fn experiment(id: &str, name: &str, weights: &[(&str, f64)]) -> Experiment {
    Experiment {
        id: id.to_string(),
        name: name.to_string(),
        description: None,
        status: ExperimentStatus::Running,
        traffic_allocation_percent: 100.0,
        target_pages: Vec::new(),
        variants: weights
            .iter()
            .enumerate()
            .map(|(i, (variant_name, weight))| variant(id, variant_name, *weight, i == 0))
            .collect(),
    }
}

/// The 50/50 "hero-cta" experiment.
pub fn hero_cta() -> Experiment {
    experiment("exp-hero", "hero-cta", &[("control", 50.0), ("variant-b", 50.0)])
}

/// Three-way pricing test, only on pages under `/pricing`.
pub fn pricing_page_test() -> Experiment {
    let mut exp = experiment(
        "exp-pricing",
        "pricing-layout",
        &[("control", 10.0), ("grid", 30.0), ("table", 60.0)],
    );
    exp.target_pages = vec!["/pricing".to_string()];
    exp
}

/// Page on example.com at `path`.
pub fn page(path: &str) -> PageSnapshot {
    PageSnapshot::new(format!("https://shop.example.com{}", path), "Shop")
        .with_referrer("https://www.google.com/")
        .with_locale("en-US")
}

/// Desktop Chrome device signals with a distinguishing canvas value.
pub fn device(canvas: &str) -> DeviceSignals {
    DeviceSignals {
        user_agent: Some(CHROME_MAC_UA.to_string()),
        language: Some("en-US".to_string()),
        screen_width: Some(1920),
        screen_height: Some(1080),
        color_depth: Some(24),
        timezone: Some("America/New_York".to_string()),
        timezone_offset_minutes: Some(300),
        connection_type: Some("4g".to_string()),
        canvas_signature: Some(canvas.to_string()),
    }
}
