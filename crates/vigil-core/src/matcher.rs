//! Gallery matching for averaged descriptors.

use crate::types::Descriptor;
use serde::{Deserialize, Serialize};

/// Default maximum Euclidean distance for a positive match.
pub const DEFAULT_DISTANCE_THRESHOLD: f32 = 0.4;

/// An enrolled identity. Where the gallery comes from is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub id: String,
    pub label: String,
    pub descriptor: Descriptor,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the closest comparable gallery entry.
    pub distance: Option<f32>,
    pub entry_id: Option<String>,
    pub entry_label: Option<String>,
}

impl MatchResult {
    fn no_match(distance: Option<f32>) -> Self {
        Self {
            matched: false,
            distance,
            entry_id: None,
            entry_label: None,
        }
    }
}

pub trait Matcher {
    fn compare(&self, probe: &Descriptor, gallery: &[GalleryEntry], threshold: f32) -> MatchResult;
}

/// Nearest-neighbour matcher over L2 distance.
///
/// The closest entry wins when its distance is strictly below the
/// threshold. Entries whose descriptor length differs from the probe are
/// skipped.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Descriptor, gallery: &[GalleryEntry], threshold: f32) -> MatchResult {
        let mut best: Option<(&GalleryEntry, f32)> = None;

        for entry in gallery {
            let Some(distance) = probe.euclidean_distance(&entry.descriptor) else {
                tracing::debug!(
                    id = %entry.id,
                    expected = probe.len(),
                    got = entry.descriptor.len(),
                    "skipping gallery entry with mismatched descriptor length"
                );
                continue;
            };
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((entry, distance));
            }
        }

        match best {
            Some((entry, distance)) if distance < threshold => MatchResult {
                matched: true,
                distance: Some(distance),
                entry_id: Some(entry.id.clone()),
                entry_label: Some(entry.label.clone()),
            },
            Some((_, distance)) => MatchResult::no_match(Some(distance)),
            None => MatchResult::no_match(None),
        }
    }
}
