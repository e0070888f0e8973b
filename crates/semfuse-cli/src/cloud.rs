//! Labelled point cloud reader.
//!
//! One point per line: `x y z e1 … eN`, whitespace separated, where the last
//! extra column `eN` is the semantic class index of the point.  Blank lines
//! and lines starting with `#` are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// A 3-D point with its extra attribute columns.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelledPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub extra: Vec<f32>,
}

impl LabelledPoint {
    /// Class index stored in the last extra column.
    ///
    /// `None` when the value is negative, fractional or not finite.
    pub fn class(&self) -> Option<usize> {
        let v = *self.extra.last()?;
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 {
            Some(v as usize)
        } else {
            None
        }
    }
}

/// Read every point of the file at `path`.
pub fn read_cloud(path: &Path, extra_columns: usize) -> Result<Vec<LabelledPoint>, CloudError> {
    let file = File::open(path).map_err(|source| CloudError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_cloud(BufReader::new(file), extra_columns).map_err(|e| match e {
        CloudError::Io { source, .. } => CloudError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parse points from any buffered reader.
pub fn parse_cloud<R: BufRead>(
    reader: R,
    extra_columns: usize,
) -> Result<Vec<LabelledPoint>, CloudError> {
    let expected = 3 + extra_columns;
    let mut points = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.map_err(|source| CloudError::Io {
            path: PathBuf::new(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() != expected {
            return Err(CloudError::Malformed {
                line: line_no,
                reason: format!("expected {expected} columns, found {}", fields.len()),
            });
        }

        let parse = |s: &str| {
            s.parse::<f64>().map_err(|e| CloudError::Malformed {
                line: line_no,
                reason: format!("'{s}': {e}"),
            })
        };
        let x = parse(fields[0])?;
        let y = parse(fields[1])?;
        let z = parse(fields[2])?;
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return Err(CloudError::Malformed {
                line: line_no,
                reason: format!("non-finite coordinate ({x} {y} {z})"),
            });
        }
        let extra = fields[3..]
            .iter()
            .map(|&s| parse(s).map(|v| v as f32))
            .collect::<Result<Vec<_>, _>>()?;

        points.push(LabelledPoint { x, y, z, extra });
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_points_and_skips_comments() {
        let input = "# x y z r g b label\n0.1 0.2 0.3 10 20 30 2\n\n1 1 1 0 0 0 0\n";
        let points = parse_cloud(Cursor::new(input), 4).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].x, 0.1);
        assert_eq!(points[0].class(), Some(2));
        assert_eq!(points[1].class(), Some(0));
    }

    #[test]
    fn wrong_column_count_is_malformed() {
        let err = parse_cloud(Cursor::new("0 0 0 1\n"), 4).unwrap_err();
        assert!(matches!(err, CloudError::Malformed { line: 1, .. }));
    }

    #[test]
    fn non_numeric_field_reports_line() {
        let err = parse_cloud(Cursor::new("0 0 0 1\n0 zero 0 1\n"), 1).unwrap_err();
        match err {
            CloudError::Malformed { line, reason } => {
                assert_eq!(line, 2);
                assert!(reason.contains("zero"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn non_finite_coordinates_are_malformed() {
        for (input, bad_line) in [
            ("NaN nan nan 0 0 0 2\n", 1),
            ("0.05 0.05 0.05 0 0 0 1\n0 inf 0 0 0 0 1\n", 2),
            ("0 0 -infinity 0 0 0 1\n", 1),
        ] {
            match parse_cloud(Cursor::new(input), 4).unwrap_err() {
                CloudError::Malformed { line, reason } => {
                    assert_eq!(line, bad_line, "{input:?}");
                    assert!(reason.contains("non-finite"), "{reason}");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn huge_but_finite_coordinates_still_parse() {
        let points = parse_cloud(Cursor::new("1e300 0 0 0 0 0 1\n"), 4).unwrap();
        assert_eq!(points[0].x, 1e300);
    }

    #[test]
    fn fractional_or_negative_class_is_rejected() {
        let p = LabelledPoint { x: 0.0, y: 0.0, z: 0.0, extra: vec![1.5] };
        assert_eq!(p.class(), None);
        let p = LabelledPoint { x: 0.0, y: 0.0, z: 0.0, extra: vec![-1.0] };
        assert_eq!(p.class(), None);
    }

    #[test]
    fn read_cloud_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_cloud(&dir.path().join("nope.txt"), 4).unwrap_err();
        assert!(matches!(err, CloudError::Io { .. }));
        assert!(err.to_string().contains("nope.txt"));
    }

    #[test]
    fn read_cloud_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.txt");
        std::fs::write(&path, "0.05 0.05 0.05 1\n0.15 0.05 0.05 2\n").unwrap();
        let points = read_cloud(&path, 1).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].class(), Some(2));
    }
}
