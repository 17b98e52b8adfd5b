//! Deterministic bucketing of visitors into variants.
//!
//! A visitor's bucket is a pure function of fingerprint and experiment id.
//! Variants own consecutive ranges of the bucket space sized by weight, in
//! the order the experiment defines them.

use engine_core::hash::bucket_of;
use engine_core::{Experiment, Variant};

/// Size of the bucket space.
pub const BUCKETS: u32 = 100;

/// Bucket in `[0, 100)` for a visitor and experiment.
pub fn bucket_value(fingerprint: &str, experiment_id: &str) -> u32 {
    bucket_of(&format!("{}-{}", fingerprint, experiment_id), BUCKETS)
}

/// Picks the variant whose cumulative weight range contains `bucket`.
///
/// Zero-weight variants are skipped. When the weights do not reach the
/// bucket, the first eligible variant is used, or the first defined variant
/// if none carries weight.
pub fn select_variant(experiment: &Experiment, bucket: u32) -> Option<&Variant> {
    let bucket = f64::from(bucket);
    let mut cumulative = 0.0;

    for variant in experiment.eligible_variants() {
        cumulative += variant.traffic_weight;
        if cumulative > bucket {
            return Some(variant);
        }
    }

    experiment
        .eligible_variants()
        .next()
        .or_else(|| experiment.variants.first())
}

/// Variant a visitor lands in.
pub fn assign_variant<'a>(experiment: &'a Experiment, fingerprint: &str) -> Option<&'a Variant> {
    select_variant(experiment, bucket_value(fingerprint, &experiment.id))
}
