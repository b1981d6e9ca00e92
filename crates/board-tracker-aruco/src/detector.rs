//! Square-marker detection in grayscale images.

use crate::components::label_components;
use crate::decode::{reorder_corners, DecodeParams, MarkerReader};
use crate::quad::{fit_quad, QuadParams};
use crate::refine::RefineParams;
use crate::threshold::{adaptive_threshold, AdaptiveThresholdParams};
use crate::{Dictionary, Matcher};
use board_tracker_core::GrayImageView;
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Configuration for [`MarkerDetector`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Local-mean binarisation used to find dark marker borders.
    pub threshold: AdaptiveThresholdParams,
    /// Outline acceptance limits.
    pub quad: QuadParams,
    /// Bit reading.
    pub decode: DecodeParams,
    /// Maximum Hamming distance for dictionary matching.
    ///
    /// `None` uses the dictionary's `max_correction_bits`.
    pub max_hamming: Option<u8>,
    /// Board-guided recovery of rejected candidates.
    pub refine: RefineParams,
}

/// One identified marker.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub id: u32,
    /// Image corners: canonical top-left first, then clockwise.
    pub corners: [Point2<f32>; 4],
    /// Bit errors corrected while matching.
    pub hamming: u8,
    /// Confidence in `[0, 1]` from border quality and bit errors.
    pub score: f32,
}

/// Per-frame detection result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectedMarkers {
    /// Identified markers, sorted by id, unique ids.
    pub markers: Vec<Marker>,
    /// Quad outlines that could not be identified.
    pub rejected: Vec<[Point2<f32>; 4]>,
}

impl DetectedMarkers {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.markers.iter().map(|m| m.id).collect()
    }

    pub fn get(&self, id: u32) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }
}

/// Detector for one dictionary.
#[derive(Clone, Debug)]
pub struct MarkerDetector {
    params: DetectorParams,
    matcher: Matcher,
}

impl MarkerDetector {
    pub fn new(dictionary: Dictionary, params: DetectorParams) -> Self {
        let max_hamming = params
            .max_hamming
            .unwrap_or(dictionary.max_correction_bits);
        Self {
            params,
            matcher: Matcher::new(dictionary, max_hamming),
        }
    }

    #[inline]
    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.matcher.dictionary()
    }

    #[inline]
    pub(crate) fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    /// Find and identify markers. Never fails; an empty result means nothing
    /// was found.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, image), fields(width = image.width, height = image.height))
    )]
    pub fn detect(&self, image: &GrayImageView<'_>) -> DetectedMarkers {
        let mut out = DetectedMarkers::default();
        if image.is_empty() || image.data.len() != image.width * image.height {
            return out;
        }
        let Some(mut reader) =
            MarkerReader::new(self.params.decode, self.dictionary().marker_size)
        else {
            return out;
        };

        let binary = adaptive_threshold(image, &self.params.threshold);
        let components = label_components(&binary, image.width, image.height);

        let max_extent = self.params.quad.max_size_rel * image.width.max(image.height) as f32;
        let mut accepted: Vec<Marker> = Vec::new();
        let mut quads = 0usize;

        for comp in &components {
            if comp.width() as f32 > max_extent || comp.height() as f32 > max_extent {
                continue;
            }
            let Some(quad) = fit_quad(comp, &self.params.quad) else {
                continue;
            };
            quads += 1;

            let identified = reader.read(image, &quad).and_then(|obs| {
                let m = self.matcher.match_code(obs.code)?;
                let bits = self.dictionary().bit_count().max(1) as f32;
                let score = obs.border_score * (1.0 - m.hamming as f32 / bits);
                Some(Marker {
                    id: m.id,
                    corners: reorder_corners(&quad, m.rotation),
                    hamming: m.hamming,
                    score: score.clamp(0.0, 1.0),
                })
            });

            match identified {
                Some(marker) => accepted.push(marker),
                None => out.rejected.push(quad),
            }
        }

        out.markers = dedup_by_id_keep_best(accepted);
        debug!(
            "markers: {} components, {} quads, {} identified, {} rejected",
            components.len(),
            quads,
            out.markers.len(),
            out.rejected.len()
        );
        out
    }
}

fn dedup_by_id_keep_best(markers: Vec<Marker>) -> Vec<Marker> {
    let mut best: HashMap<u32, Marker> = HashMap::new();
    for m in markers {
        match best.get(&m.id) {
            Some(prev) if prev.score >= m.score => {}
            _ => {
                best.insert(m.id, m);
            }
        }
    }
    let mut out: Vec<Marker> = best.into_values().collect();
    out.sort_by_key(|m| m.id);
    out
}
