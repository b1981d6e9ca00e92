//! Camera calibration files: OpenCV FileStorage YAML or JSON.
//!
//! Both encodings carry a 3×3 `camera_matrix` and a `dist_coeff` vector of
//! 4, 5 or 8 coefficients. Matrices may be written as an OpenCV
//! `{rows, cols, dt, data}` map, as nested rows, or as a flat list.

use crate::core::{CameraError, CameraIntrinsics};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use yaml_rust::{Yaml, YamlLoader};

pub const CAMERA_MATRIX_KEY: &str = "camera_matrix";
pub const DIST_COEFF_KEY: &str = "dist_coeff";

#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("failed to read calibration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Yaml(#[from] yaml_rust::ScanError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("calibration is missing `{0}`")]
    MissingKey(&'static str),
    #[error("invalid `{key}`: {reason}")]
    InvalidMatrix { key: &'static str, reason: String },
    #[error(transparent)]
    Camera(#[from] CameraError),
}

/// Row-major matrix as read from a file.
#[derive(Clone, Debug, PartialEq)]
struct RawMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl RawMatrix {
    fn from_rows(rows: Vec<Vec<f64>>, key: &'static str) -> Result<Self, CalibrationError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(invalid(key, "rows have different lengths"));
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    fn checked(rows: usize, cols: usize, data: Vec<f64>, key: &'static str) -> Result<Self, CalibrationError> {
        if rows * cols != data.len() {
            return Err(invalid(
                key,
                format!("{rows}x{cols} matrix with {} values", data.len()),
            ));
        }
        Ok(Self { rows, cols, data })
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> CalibrationError {
    CalibrationError::InvalidMatrix {
        key,
        reason: reason.into(),
    }
}

/// Load intrinsics from disk; `.json` files are read as JSON, anything else
/// as OpenCV YAML.
pub fn load_calibration(path: impl AsRef<Path>) -> Result<CameraIntrinsics, CalibrationError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| CalibrationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let camera = if is_json {
        parse_json_calibration(&raw)?
    } else {
        parse_opencv_yaml(&raw)?
    };
    log::info!(
        "calibration {}: fx={:.1} fy={:.1} cx={:.1} cy={:.1}, {} distortion coeffs",
        path.display(),
        camera.fx(),
        camera.fy(),
        camera.cx(),
        camera.cy(),
        camera.distortion.to_coeffs().len()
    );
    Ok(camera)
}

/// Parse an OpenCV FileStorage YAML document.
pub fn parse_opencv_yaml(text: &str) -> Result<CameraIntrinsics, CalibrationError> {
    // The `%YAML:1.0` directive and the `!!opencv-matrix` tag are OpenCV
    // extensions a plain YAML parser rejects or mislabels.
    let cleaned: String = text
        .lines()
        .filter(|l| !l.trim_start().starts_with('%'))
        .map(|l| l.replace("!!opencv-matrix", ""))
        .collect::<Vec<_>>()
        .join("\n");
    let docs = YamlLoader::load_from_str(&cleaned)?;
    let doc = docs.first().ok_or(CalibrationError::MissingKey(CAMERA_MATRIX_KEY))?;

    let k = yaml_matrix(&doc[CAMERA_MATRIX_KEY], CAMERA_MATRIX_KEY)?;
    let d = yaml_matrix(&doc[DIST_COEFF_KEY], DIST_COEFF_KEY)?;
    build_intrinsics(k, d)
}

/// Parse a JSON calibration document.
pub fn parse_json_calibration(text: &str) -> Result<CameraIntrinsics, CalibrationError> {
    let doc: Value = serde_json::from_str(text)?;
    let k = json_matrix(doc.get(CAMERA_MATRIX_KEY), CAMERA_MATRIX_KEY)?;
    let d = json_matrix(doc.get(DIST_COEFF_KEY), DIST_COEFF_KEY)?;
    build_intrinsics(k, d)
}

/// Serialize intrinsics in the OpenCV FileStorage YAML layout.
pub fn to_opencv_yaml(camera: &CameraIntrinsics) -> String {
    let k: Vec<String> = camera
        .matrix
        .transpose()
        .iter()
        .map(|v| format!("{v:?}"))
        .collect();
    let d: Vec<String> = camera
        .distortion
        .to_coeffs()
        .iter()
        .map(|v| format!("{v:?}"))
        .collect();
    format!(
        "%YAML:1.0\n---\n{CAMERA_MATRIX_KEY}: !!opencv-matrix\n   rows: 3\n   cols: 3\n   dt: d\n   data: [ {} ]\n{DIST_COEFF_KEY}: !!opencv-matrix\n   rows: 1\n   cols: {}\n   dt: d\n   data: [ {} ]\n",
        k.join(", "),
        d.len(),
        d.join(", ")
    )
}

fn build_intrinsics(k: RawMatrix, d: RawMatrix) -> Result<CameraIntrinsics, CalibrationError> {
    if k.rows != 3 || k.cols != 3 {
        return Err(invalid(
            CAMERA_MATRIX_KEY,
            format!("expected 3x3, got {}x{}", k.rows, k.cols),
        ));
    }
    if d.rows != 1 && d.cols != 1 {
        return Err(invalid(
            DIST_COEFF_KEY,
            format!("expected a vector, got {}x{}", d.rows, d.cols),
        ));
    }
    let rows = [
        [k.data[0], k.data[1], k.data[2]],
        [k.data[3], k.data[4], k.data[5]],
        [k.data[6], k.data[7], k.data[8]],
    ];
    Ok(CameraIntrinsics::from_parts(rows, &d.data)?)
}

fn yaml_number(node: &Yaml) -> Option<f64> {
    match node {
        Yaml::Real(_) => node.as_f64(),
        Yaml::Integer(i) => Some(*i as f64),
        Yaml::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn yaml_numbers(items: &[Yaml], key: &'static str) -> Result<Vec<f64>, CalibrationError> {
    items
        .iter()
        .map(|v| yaml_number(v).ok_or_else(|| invalid(key, format!("not a number: {v:?}"))))
        .collect()
}

fn yaml_matrix(node: &Yaml, key: &'static str) -> Result<RawMatrix, CalibrationError> {
    match node {
        Yaml::BadValue | Yaml::Null => Err(CalibrationError::MissingKey(key)),
        Yaml::Hash(_) => {
            let data = node["data"]
                .as_vec()
                .ok_or_else(|| invalid(key, "missing `data` list"))?;
            let data = yaml_numbers(data, key)?;
            let dim = |name: &str| -> Result<usize, CalibrationError> {
                node[name]
                    .as_i64()
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| invalid(key, format!("missing or invalid `{name}`")))
            };
            RawMatrix::checked(dim("rows")?, dim("cols")?, data, key)
        }
        Yaml::Array(items) => {
            if items.iter().all(|i| matches!(i, Yaml::Array(_))) && !items.is_empty() {
                let rows = items
                    .iter()
                    .map(|r| yaml_numbers(r.as_vec().map_or(&[][..], Vec::as_slice), key))
                    .collect::<Result<Vec<_>, _>>()?;
                RawMatrix::from_rows(rows, key)
            } else {
                flat_matrix(yaml_numbers(items, key)?, key)
            }
        }
        other => Err(invalid(key, format!("unexpected value {other:?}"))),
    }
}

fn json_numbers(items: &[Value], key: &'static str) -> Result<Vec<f64>, CalibrationError> {
    items
        .iter()
        .map(|v| v.as_f64().ok_or_else(|| invalid(key, format!("not a number: {v}"))))
        .collect()
}

fn json_matrix(node: Option<&Value>, key: &'static str) -> Result<RawMatrix, CalibrationError> {
    match node {
        None | Some(Value::Null) => Err(CalibrationError::MissingKey(key)),
        Some(Value::Object(map)) => {
            let data = map
                .get("data")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid(key, "missing `data` list"))?;
            let data = json_numbers(data, key)?;
            let dim = |name: &str| -> Result<usize, CalibrationError> {
                map.get(name)
                    .and_then(Value::as_u64)
                    .map(|v| v as usize)
                    .ok_or_else(|| invalid(key, format!("missing or invalid `{name}`")))
            };
            RawMatrix::checked(dim("rows")?, dim("cols")?, data, key)
        }
        Some(Value::Array(items)) => {
            if !items.is_empty() && items.iter().all(Value::is_array) {
                let rows = items
                    .iter()
                    .map(|r| json_numbers(r.as_array().map_or(&[][..], Vec::as_slice), key))
                    .collect::<Result<Vec<_>, _>>()?;
                RawMatrix::from_rows(rows, key)
            } else {
                flat_matrix(json_numbers(items, key)?, key)
            }
        }
        Some(other) => Err(invalid(key, format!("unexpected value {other}"))),
    }
}

/// A flat list is a row vector, except that nine values form a 3×3 matrix.
fn flat_matrix(data: Vec<f64>, key: &'static str) -> Result<RawMatrix, CalibrationError> {
    if data.is_empty() {
        return Err(invalid(key, "empty list"));
    }
    let (rows, cols) = if key == CAMERA_MATRIX_KEY && data.len() == 9 {
        (3, 3)
    } else {
        (1, data.len())
    };
    RawMatrix::checked(rows, cols, data, key)
}
