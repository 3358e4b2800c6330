//! Grouping of split recordings.
//!
//! Long recordings are often exported as several EDF files. Before conversion
//! they are checked to belong to one recording (same channels) and put in
//! chronological order.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::error::{EdfError, Result};
use crate::reader::EdfReader;
use crate::types::EdfHeader;

/// Overview of one file, as shown before conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSummary {
    pub file_name: String,
    pub channel_count: usize,
    /// Highest sampling frequency over all channels, in Hz.
    pub sampling_frequency: f64,
    /// Recording length in seconds.
    pub duration: f64,
    pub start: NaiveDateTime,
    pub subject_id: String,
    pub recording_id: String,
}

impl FileSummary {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let header = EdfReader::open(path)?.into_header();
        Ok(Self::from_header(path, &header))
    }

    pub fn from_header(path: &Path, header: &EdfHeader) -> Self {
        FileSummary {
            file_name: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            channel_count: header.signal_count(),
            sampling_frequency: header
                .sampling_frequencies()
                .into_iter()
                .fold(0.0, f64::max),
            duration: header.duration(),
            start: header.start_datetime(),
            subject_id: header.subject_id.clone(),
            recording_id: header.recording_id.clone(),
        }
    }
}

/// Reads the headers of `paths` and returns them in chronological order.
///
/// All files must have the same set of channel labels, otherwise they are
/// not parts of one recording and `EdfError::MultipleRecordings` is
/// returned. Files with the same start keep their input order.
///
/// ```rust
/// # let dir = tempfile::tempdir()?;
/// # let path = dir.path().join("part1.edf");
/// # edfcodec::doctest_utils::create_test_file(&path)?;
/// let parts = edfcodec::collate(&[&path])?;
/// assert_eq!(parts[0].0, path);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn collate<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<(PathBuf, EdfHeader)>> {
    let mut parts = paths
        .iter()
        .map(|path| -> Result<(PathBuf, EdfHeader)> {
            let path = path.as_ref().to_path_buf();
            let header = EdfReader::open(&path)?.into_header();
            Ok((path, header))
        })
        .collect::<Result<Vec<_>>>()?;

    let label_set = |header: &EdfHeader| -> BTreeSet<String> {
        header.signals.iter().map(|s| s.label.trim().to_string()).collect()
    };
    if let Some((first, rest)) = parts.split_first() {
        let expected = label_set(&first.1);
        if let Some((path, _)) = rest.iter().find(|(_, header)| label_set(header) != expected) {
            log::warn!(
                "{} has different channels than {}",
                path.display(),
                first.0.display()
            );
            return Err(EdfError::MultipleRecordings);
        }
    }

    parts.sort_by_key(|(_, header)| header.start_datetime());
    Ok(parts)
}
