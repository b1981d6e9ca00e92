//! Embedded built-in dictionaries.
//!
//! Codes are OpenCV-compatible (`cv::aruco::DICT_4X4_*`): row-major inner bits,
//! bit 0 at the top-left, white = 1. `DICT_4X4_50` is a prefix of
//! `DICT_4X4_100`.

#![allow(clippy::unreadable_literal)]

use crate::Dictionary;

#[rustfmt::skip]
static CODES_4X4_100: [u64; 100] = [
    0x4cad, 0x59f0, 0xb4cc, 0x6299, 0x792a, 0xb39e, 0x7479, 0x4f23,
    0x5b7f, 0x6af3, 0x899f, 0xe588, 0xed70, 0xf054, 0x8d24, 0x7c64,
    0xa662, 0x0066, 0x7a36, 0xf56e, 0xd161, 0xd40d, 0xab33, 0x41bb,
    0xe27f, 0x8e29, 0x2735, 0x2aa5, 0xc484, 0xf62c, 0xa822, 0x4dea,
    0xf379, 0xd30f, 0x7510, 0x9490, 0xae18, 0xff20, 0x6fb0, 0x5a38,
    0x18e8, 0x1454, 0x314c, 0x4d1c, 0x1724, 0xd774, 0xfcb4, 0x26d2,
    0x740a, 0xc80a, 0x298a, 0x16aa, 0x82ba, 0xe9fa, 0x8016, 0xe616,
    0x2486, 0x9786, 0x48d6, 0xa7f6, 0xfbe6, 0xd87e, 0x0501, 0x22c1,
    0x45d1, 0x5ec9, 0x3621, 0x54a1, 0x39a1, 0x9139, 0x85f9, 0x3edd,
    0x203d, 0xda6d, 0x13fd, 0xd5ed, 0xf853, 0x4693, 0x1a9b, 0xabcb,
    0x1933, 0x05e3, 0xeca3, 0xba97, 0xa49f, 0xdddf, 0x5477, 0xb2ef,
    0xaeac, 0xb551, 0xe86e, 0xf350, 0xd260, 0x83b4, 0x1b92, 0x2fc2,
    0x6cf2, 0xcbf2, 0x2796, 0xe30e,
];

/// `cv::aruco::DICT_4X4_50`.
pub static DICT_4X4_50: Dictionary = Dictionary {
    name: "DICT_4X4_50",
    marker_size: 4,
    max_correction_bits: 1,
    codes: CODES_4X4_100.split_at(50).0,
};

/// `cv::aruco::DICT_4X4_100`.
pub static DICT_4X4_100: Dictionary = Dictionary {
    name: "DICT_4X4_100",
    marker_size: 4,
    max_correction_bits: 1,
    codes: &CODES_4X4_100,
};

/// Names accepted by [`builtin_dictionary`].
pub const BUILTIN_DICTIONARY_NAMES: &[&str] = &["DICT_4X4_50", "DICT_4X4_100"];

/// Look up a built-in dictionary by name (case-insensitive, `DICT_` prefix optional).
pub fn builtin_dictionary(name: &str) -> Option<Dictionary> {
    let upper = name.trim().to_ascii_uppercase();
    let key = upper.strip_prefix("DICT_").unwrap_or(&upper);
    match key {
        "4X4_50" => Some(DICT_4X4_50),
        "4X4_100" => Some(DICT_4X4_100),
        _ => None,
    }
}
