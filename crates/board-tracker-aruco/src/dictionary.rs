//! Dictionary metadata and packed marker codes.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// A fixed ArUco-style dictionary.
///
/// Serialized as its name (for example `"DICT_4X4_50"`); deserialization
/// resolves the name against the built-in tables.
#[derive(Clone, Copy, Debug)]
pub struct Dictionary {
    /// Name used in configuration files and logs.
    pub name: &'static str,
    /// Marker side length (number of inner bits per side).
    pub marker_size: usize,
    /// Maximum error-correcting Hamming distance supported by the dictionary.
    pub max_correction_bits: u8,
    /// One `u64` per marker id, encoding the inner `marker_size × marker_size` bits.
    ///
    /// Bits are stored in row-major order, bit 0 = top-left, with **white = 1**
    /// (the OpenCV convention).
    pub codes: &'static [u64],
}

impl Dictionary {
    /// Total number of inner bits per marker.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.marker_size * self.marker_size
    }

    /// Number of marker ids.
    #[inline]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Code for `id` in its canonical orientation.
    #[inline]
    pub fn code(&self, id: u32) -> Option<u64> {
        self.codes.get(id as usize).copied()
    }

    /// Bit at cell `(x, y)` of the inner grid (`true` = white).
    #[inline]
    pub fn bit(&self, id: u32, x: usize, y: usize) -> Option<bool> {
        if x >= self.marker_size || y >= self.marker_size {
            return None;
        }
        self.code(id)
            .map(|c| (c >> (y * self.marker_size + x)) & 1 == 1)
    }
}

impl PartialEq for Dictionary {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.marker_size == other.marker_size
            && self.codes == other.codes
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name)
    }
}

impl<'de> Deserialize<'de> for Dictionary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        crate::builtins::builtin_dictionary(&name).ok_or_else(|| {
            de::Error::custom(format!(
                "unknown dictionary {name:?} (known: {})",
                crate::builtins::BUILTIN_DICTIONARY_NAMES.join(", ")
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::builtins::{builtin_dictionary, DICT_4X4_50};
    use crate::Dictionary;

    #[test]
    fn first_marker_row_matches_opencv_bytes() {
        // OpenCV stores marker 0 of DICT_4X4_50 as bytes 181, 50: rows 1011 0101 0011 0010.
        let rows: Vec<Vec<bool>> = (0..4)
            .map(|y| {
                (0..4)
                    .map(|x| DICT_4X4_50.bit(0, x, y).expect("bit"))
                    .collect()
            })
            .collect();
        assert_eq!(rows[0], [true, false, true, true]);
        assert_eq!(rows[1], [false, true, false, true]);
        assert_eq!(rows[2], [false, false, true, true]);
        assert_eq!(rows[3], [false, false, true, false]);
    }

    #[test]
    fn serializes_by_name() {
        let json = serde_json::to_string(&DICT_4X4_50).expect("serialize");
        assert_eq!(json, "\"DICT_4X4_50\"");
        let back: Dictionary = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, DICT_4X4_50);
        assert_eq!(builtin_dictionary("DICT_4X4_50"), Some(DICT_4X4_50));
    }

    #[test]
    fn unknown_name_fails_to_deserialize() {
        let err = serde_json::from_str::<Dictionary>("\"DICT_9X9_1\"").unwrap_err();
        assert!(err.to_string().contains("unknown dictionary"));
    }
}
