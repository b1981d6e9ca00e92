//! Dictionary matching and rotation helpers.

use crate::Dictionary;

/// A dictionary match for an observed marker code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Match {
    /// Marker id in the dictionary.
    pub id: u32,
    /// Rotation `0..=3` such that `observed_code == rotate(dict_code, rotation)`.
    pub rotation: u8,
    /// Hamming distance between observed and dictionary code (after rotation).
    pub hamming: u8,
}

/// Matcher for a fixed dictionary.
///
/// Brute-force search over all ids and the four rotations; all rotated codes
/// are precomputed once.
#[derive(Clone, Debug)]
pub struct Matcher {
    dict: Dictionary,
    max_hamming: u8,
    rotated: Vec<[u64; 4]>,
}

impl Matcher {
    /// Build a matcher for the given dictionary and Hamming threshold.
    ///
    /// Dictionaries with more than 64 bits per marker cannot be packed into a
    /// `u64` and yield a matcher that never matches.
    pub fn new(dict: Dictionary, max_hamming: u8) -> Self {
        let rotated = if dict.bit_count() <= 64 {
            dict.codes
                .iter()
                .map(|&base| [0u8, 1, 2, 3].map(|rot| rotate_code_u64(base, dict.marker_size, rot)))
                .collect()
        } else {
            Vec::new()
        };

        Self {
            dict,
            max_hamming,
            rotated,
        }
    }

    /// Dictionary used by this matcher.
    #[inline]
    pub fn dictionary(&self) -> Dictionary {
        self.dict
    }

    /// Maximum Hamming distance allowed for matches.
    #[inline]
    pub fn max_hamming(&self) -> u8 {
        self.max_hamming
    }

    /// Find the best match within `max_hamming`; ties keep the lowest id.
    pub fn match_code(&self, observed: u64) -> Option<Match> {
        let mut best: Option<Match> = None;

        for (id, rots) in self.rotated.iter().enumerate() {
            for (rot, &cand) in rots.iter().enumerate() {
                let hamming = (observed ^ cand).count_ones() as u8;
                if hamming > self.max_hamming {
                    continue;
                }
                if best.is_some_and(|b| b.hamming <= hamming) {
                    continue;
                }
                best = Some(Match {
                    id: id as u32,
                    rotation: rot as u8,
                    hamming,
                });
                if hamming == 0 {
                    return best;
                }
            }
        }

        best
    }

    /// Hamming distance between `observed` and marker `id` seen with `rotation`.
    pub fn distance_to(&self, id: u32, rotation: u8, observed: u64) -> Option<u8> {
        let rots = self.rotated.get(id as usize)?;
        Some((observed ^ rots[(rotation & 3) as usize]).count_ones() as u8)
    }
}

/// Rotate a code stored in row-major bits: `idx = y * N + x`.
///
/// Each step turns the marker image by 90° clockwise.
pub fn rotate_code_u64(code: u64, n: usize, rot: u8) -> u64 {
    let rot = rot & 3;
    if rot == 0 {
        return code;
    }

    let mut out = 0u64;
    for y in 0..n {
        for x in 0..n {
            let (sx, sy) = match rot {
                1 => (y, n - 1 - x),
                2 => (n - 1 - x, n - 1 - y),
                _ => (n - 1 - y, x),
            };
            let bit = (code >> (sy * n + sx)) & 1;
            out |= bit << (y * n + x);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::DICT_4X4_50;

    #[test]
    fn rotate_four_times_is_identity() {
        let code = 0x0123_4567_89ab_cdef_u64;
        let mut r = code;
        for _ in 0..4 {
            r = rotate_code_u64(r, 8, 1);
        }
        assert_eq!(code, r);
    }

    #[test]
    fn single_rotation_moves_top_left_to_top_right() {
        // Only the top-left bit set.
        let rotated = rotate_code_u64(1, 4, 1);
        assert_eq!(rotated, 1 << 3);
    }

    #[test]
    fn matcher_finds_rotated_code() {
        let matcher = Matcher::new(DICT_4X4_50, 0);
        let observed = rotate_code_u64(DICT_4X4_50.codes[7], 4, 3);
        let m = matcher.match_code(observed).expect("match");
        assert_eq!(
            m,
            Match {
                id: 7,
                rotation: 3,
                hamming: 0
            }
        );
    }

    #[test]
    fn matcher_corrects_single_bit_error() {
        let matcher = Matcher::new(DICT_4X4_50, DICT_4X4_50.max_correction_bits);
        let observed = DICT_4X4_50.codes[12] ^ (1 << 5);
        let m = matcher.match_code(observed).expect("match");
        assert_eq!((m.id, m.rotation, m.hamming), (12, 0, 1));

        let strict = Matcher::new(DICT_4X4_50, 0);
        assert!(strict.match_code(observed).is_none());
    }

    #[test]
    fn distance_to_expected_id() {
        let matcher = Matcher::new(DICT_4X4_50, 0);
        let observed = rotate_code_u64(DICT_4X4_50.codes[3], 4, 2) ^ 0b101;
        assert_eq!(matcher.distance_to(3, 2, observed), Some(2));
        assert_eq!(matcher.distance_to(99, 0, observed), None);
    }
}
