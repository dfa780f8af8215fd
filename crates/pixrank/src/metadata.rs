//! Capture time from EXIF metadata.

use chrono::NaiveDate;
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid EXIF data in {}: {source}", path.display())]
    Exif {
        path: PathBuf,
        #[source]
        source: exif::Error,
    },

    #[error("invalid capture time '{value}' in {}", path.display())]
    InvalidDate { path: PathBuf, value: String },
}

/// Date part of the `DateTimeOriginal` tag.
///
/// Returns `Ok(None)` when the file has no EXIF block, the container does
/// not carry EXIF, or the tag is absent.
pub fn capture_date(path: &Path) -> Result<Option<NaiveDate>, MetadataError> {
    let file = File::open(path).map_err(|source| MetadataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let exif = match Reader::new().read_from_container(&mut reader) {
        Ok(exif) => exif,
        Err(
            exif::Error::NotFound(_)
            | exif::Error::NotSupported(_)
            | exif::Error::BlankValue(_)
            | exif::Error::InvalidFormat(_),
        ) => {
            tracing::debug!("No EXIF metadata found in {}", path.display());
            return Ok(None);
        },
        Err(exif::Error::Io(source)) => {
            return Err(MetadataError::Io {
                path: path.to_path_buf(),
                source,
            })
        },
        Err(source) => {
            return Err(MetadataError::Exif {
                path: path.to_path_buf(),
                source,
            })
        },
    };

    let Some(field) = exif.get_field(Tag::DateTimeOriginal, In::PRIMARY) else {
        tracing::debug!("No capture time in EXIF metadata of {}", path.display());
        return Ok(None);
    };

    let raw = match &field.value {
        Value::Ascii(parts) if !parts.is_empty() => parts[0].as_slice(),
        _ => return Ok(None),
    };

    parse_exif_date(raw).map(Some).ok_or_else(|| MetadataError::InvalidDate {
        path: path.to_path_buf(),
        value: String::from_utf8_lossy(raw).into_owned(),
    })
}

/// Parse an EXIF `YYYY:MM:DD HH:MM:SS` value down to its date
fn parse_exif_date(raw: &[u8]) -> Option<NaiveDate> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)
}
