//! Shooting parameters read from EXIF.

use exif::{Exif, In, Tag, Value};
use std::fmt;
use std::fs;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExposureTime {
    pub num: u32,
    pub denom: u32,
}

impl ExposureTime {
    pub fn seconds(&self) -> f64 {
        self.num as f64 / self.denom as f64
    }
}

impl fmt::Display for ExposureTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.num)
        } else if self.num > 0 && self.denom % self.num == 0 {
            write!(f, "1/{}", self.denom / self.num)
        } else if self.num >= self.denom {
            write!(f, "{:.1}", self.seconds())
        } else {
            write!(f, "{}/{}", self.num, self.denom)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// F-number.
    pub aperture: Option<f64>,
    pub exposure_time: Option<ExposureTime>,
    pub iso: Option<u32>,
    /// Millimetres.
    pub focal_length: Option<f64>,
}

impl Metadata {
    pub fn from_exif(exif: &Exif) -> Self {
        Self {
            aperture: field(exif, Tag::FNumber).and_then(rational_value),
            exposure_time: field(exif, Tag::ExposureTime).and_then(exposure_value),
            iso: field(exif, Tag::PhotographicSensitivity).and_then(|v| v.get_uint(0)),
            focal_length: field(exif, Tag::FocalLength).and_then(rational_value),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Metadata::default()
    }

    /// One-line summary, e.g. `f2.8 1/250s iso200 35.00mm`. Missing values
    /// are left out.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(a) = self.aperture {
            parts.push(format!("f{:.1}", a));
        }
        if let Some(t) = self.exposure_time {
            parts.push(format!("{}s", t));
        }
        if let Some(iso) = self.iso {
            parts.push(format!("iso{}", iso));
        }
        if let Some(fl) = self.focal_length {
            parts.push(format!("{:.2}mm", fl));
        }
        parts.join(" ")
    }
}

/// Read EXIF from any container kamadak-exif understands. Files without
/// EXIF, or with a damaged block, give empty metadata.
pub fn read_metadata(path: &Path) -> Metadata {
    let Ok(file) = fs::File::open(path) else {
        return Metadata::default();
    };
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(exif) => Metadata::from_exif(&exif),
        Err(e) => {
            log::debug!("No EXIF in {}: {}", path.display(), e);
            Metadata::default()
        }
    }
}

fn field(exif: &Exif, tag: Tag) -> Option<&Value> {
    exif.get_field(tag, In::PRIMARY).map(|f| &f.value)
}

fn rational_value(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(v) => v.first().filter(|r| r.denom != 0).map(|r| r.to_f64()),
        Value::SRational(v) => v.first().filter(|r| r.denom != 0).map(|r| r.to_f64()),
        _ => value.get_uint(0).map(|n| n as f64),
    }
}

fn exposure_value(value: &Value) -> Option<ExposureTime> {
    match value {
        Value::Rational(v) => v
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| ExposureTime {
                num: r.num,
                denom: r.denom,
            }),
        _ => None,
    }
}
