use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{EdfError, Result};
use crate::header;
use crate::layout::{MainField, RECORD_COUNT_OFFSET};
use crate::types::{EdfHeader, EdfSignal, HeaderWarning, Subtype};
use crate::utils::pad_or_truncate;

/// EDF file writer
///
/// # File Creation Workflow
///
/// 1. Create the file with `EdfWriter::create()`
/// 2. Write the header once with `write_header()`
/// 3. Append data records with `write_block()` (physical values) or
///    `write_digital_block()` (stored values)
/// 4. Call `close()` to patch the record count into the header
///
/// The header is written with a record count of `-1` because the number of
/// records is unknown until the last one has been appended. `close()` seeks
/// back to byte 236 and overwrites the count, so a writer that is dropped
/// without closing leaves a file whose record count must be estimated.
///
/// # Examples
///
/// ```rust
/// use edfcodec::{EdfHeader, EdfSignal, EdfWriter, EdfReader};
///
/// # let dir = tempfile::tempdir()?;
/// # let path = dir.path().join("output.edf");
/// let header = EdfHeader {
///     subject_id: "P001 M 01-JAN-1990 X".to_string(),
///     signals: vec![EdfSignal {
///         label: "EEG Fp1".to_string(),
///         physical_dimension: "uV".to_string(),
///         physical_min: -200.0,
///         physical_max: 200.0,
///         digital_min: -32768,
///         digital_max: 32767,
///         samples_per_record: 256,
///         ..Default::default()
///     }],
///     ..Default::default()
/// };
///
/// let mut writer = EdfWriter::create(&path)?;
/// writer.write_header(&header)?;
/// for second in 0..10 {
///     let samples: Vec<f64> = (0..256)
///         .map(|i| 50.0 * (2.0 * std::f64::consts::PI * 10.0 * (second * 256 + i) as f64 / 256.0).sin())
///         .collect();
///     writer.write_block(&[samples])?;
/// }
/// writer.close()?;
///
/// assert_eq!(EdfReader::open(&path)?.header().record_count, 10);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct EdfWriter {
    file: BufWriter<File>,
    path: PathBuf,
    header: Option<EdfHeader>,
    header_bytes: u64,
    record_bytes: usize,
    records_written: usize,
    warnings: Vec<HeaderWarning>,
}

impl EdfWriter {
    /// Creates (or truncates) the target file.
    ///
    /// # Errors
    ///
    /// * `EdfError::Write` - the file cannot be created (permission denied,
    ///   missing directory, ...)
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| EdfError::write(&path, e))?;
        log::debug!("created {}", path.display());

        Ok(EdfWriter {
            file: BufWriter::new(file),
            path,
            header: None,
            header_bytes: 0,
            record_bytes: 0,
            records_written: 0,
            warnings: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of data records appended so far.
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Out-of-range values seen while writing.
    pub fn warnings(&self) -> &[HeaderWarning] {
        &self.warnings
    }

    /// Writes the header. Must be called exactly once, before any block.
    ///
    /// Empty labels are replaced with the signal index. The record count is
    /// always written as `-1` and patched by [`close`](EdfWriter::close).
    ///
    /// # Errors
    ///
    /// * `EdfError::InvalidState` - the header was already written
    /// * `EdfError::IdentityTooLong` - subject or recording id exceeds 80 bytes
    /// * `EdfError::InvalidField` - a calibration range is empty or does not
    ///   fit the sample width, or a number does not fit its field
    pub fn write_header(&mut self, header: &EdfHeader) -> Result<()> {
        if self.header.is_some() {
            return Err(EdfError::InvalidState("header already written"));
        }
        if header.signals.is_empty() {
            return Err(EdfError::InvalidField {
                field: MainField::SignalCount.name(),
                value: "0".to_string(),
            });
        }

        check_subtype(header, self.path.extension().and_then(|e| e.to_str()))?;

        let mut header = header.clone();
        header.version = "0".to_string();
        header.record_count = -1;
        for (i, signal) in header.signals.iter_mut().enumerate() {
            if signal.label.trim().is_empty() {
                signal.label = i.to_string();
            }
            validate_signal(signal, header.subtype.sample_range())?;
        }

        let record_bytes = header.record_bytes();
        if record_bytes == 0 {
            return Err(EdfError::InvalidField {
                field: "samples per record",
                value: "0".to_string(),
            });
        }

        let bytes = header::encode(&header)?;
        self.file.write_all(&bytes).map_err(|e| EdfError::write(&self.path, e))?;

        self.header_bytes = bytes.len() as u64;
        self.record_bytes = record_bytes;
        self.header = Some(header);
        Ok(())
    }

    fn header_for_block(&self) -> Result<&EdfHeader> {
        self.header
            .as_ref()
            .ok_or(EdfError::InvalidState("header must be written before data records"))
    }

    /// Appends one data record given in physical units.
    ///
    /// `samples` holds one vector per signal, each with exactly
    /// `samples_per_record` values. A length mismatch is an error and nothing
    /// is written, since a short channel would shift every later sample.
    /// Values outside the physical range are clamped and reported as
    /// warnings. NaN or infinite values are an error.
    pub fn write_block(&mut self, samples: &[Vec<f64>]) -> Result<()> {
        let header = self.header_for_block()?;
        check_layout(header, samples.iter().map(Vec::len))?;

        let bytes_per_sample = header.subtype.bytes_per_sample();
        let mut record = Vec::with_capacity(self.record_bytes);
        let mut warnings = Vec::new();
        for (i, (signal, values)) in header.signals.iter().zip(samples).enumerate() {
            if let Some(value) = values.iter().find(|v| !v.is_finite()) {
                return Err(EdfError::InvalidField {
                    field: "physical sample",
                    value: format!("{} in signal {}", value, i),
                });
            }
            let (min, max) = values
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            if min < signal.physical_min {
                warnings.push(HeaderWarning::PhysicalOutOfRange { signal: i, value: min });
            }
            if max > signal.physical_max {
                warnings.push(HeaderWarning::PhysicalOutOfRange { signal: i, value: max });
            }
            for &value in values {
                encode_sample(signal.phys_to_dig(value), bytes_per_sample, &mut record);
            }
        }

        for warning in &warnings {
            log::warn!("{}: {} (label {:?})", self.path.display(), warning, label_of(header, warning));
        }
        self.warnings.extend(warnings);
        self.append_record(&record)
    }

    /// Appends one data record of stored values, written unchanged.
    pub fn write_digital_block(&mut self, samples: &[Vec<i32>]) -> Result<()> {
        let header = self.header_for_block()?;
        check_layout(header, samples.iter().map(Vec::len))?;

        let bytes_per_sample = header.subtype.bytes_per_sample();
        let (lo, hi) = header.subtype.sample_range();
        let mut record = Vec::with_capacity(self.record_bytes);
        for values in samples {
            for &value in values {
                if value < lo || value > hi {
                    return Err(EdfError::InvalidField {
                        field: "digital sample",
                        value: value.to_string(),
                    });
                }
                encode_sample(value, bytes_per_sample, &mut record);
            }
        }
        self.append_record(&record)
    }

    fn append_record(&mut self, record: &[u8]) -> Result<()> {
        debug_assert_eq!(record.len(), self.record_bytes);
        self.file.write_all(record).map_err(|e| EdfError::write(&self.path, e))?;
        self.records_written += 1;
        Ok(())
    }

    /// Finalizes the file.
    ///
    /// Flushes buffered records, overwrites the record count field (bytes
    /// 236..244) with the number of records written and truncates anything
    /// past the last complete record.
    pub fn close(self) -> Result<()> {
        if self.header.is_none() {
            return Err(EdfError::InvalidState("closing a writer without a header"));
        }
        let path = self.path;
        let count = self.records_written;
        let length = self.header_bytes + count as u64 * self.record_bytes as u64;

        let patch = |file: BufWriter<File>| -> std::io::Result<()> {
            let mut file = file.into_inner().map_err(|e| e.into_error())?;
            file.seek(SeekFrom::Start(RECORD_COUNT_OFFSET as u64))?;
            file.write_all(&pad_or_truncate(&count.to_string(), MainField::RecordCount.width()))?;
            file.set_len(length)?;
            file.sync_all()
        };
        patch(self.file).map_err(|e| EdfError::write(&path, e))?;

        log::debug!("closed {} after {} records", path.display(), count);
        Ok(())
    }
}

/// The reader derives the sample width from the version bytes, the reserved
/// field and the file extension, so those have to agree with `subtype`.
fn check_subtype(header: &EdfHeader, extension: Option<&str>) -> Result<()> {
    if header.subtype == Subtype::Bdf {
        return Ok(());
    }
    let reserved = if header.reserved.is_empty() {
        header.subtype.reserved_token()
    } else {
        header.reserved.as_str()
    };
    let detected = Subtype::detect(reserved, extension);
    if detected != header.subtype {
        return Err(EdfError::InvalidField {
            field: MainField::Reserved.name(),
            value: format!(
                "{:?} with extension {:?} reads back as {:?}, not {:?}",
                reserved,
                extension.unwrap_or_default(),
                detected,
                header.subtype
            ),
        });
    }
    Ok(())
}

fn validate_signal(signal: &EdfSignal, (lo, hi): (i32, i32)) -> Result<()> {
    let range = |s: &EdfSignal| format!("{}..{}", s.digital_min, s.digital_max);
    if signal.digital_min >= signal.digital_max
        || signal.digital_min < lo
        || signal.digital_max > hi
    {
        return Err(EdfError::InvalidField {
            field: "digital range",
            value: range(signal),
        });
    }
    if signal.is_calibrated() && signal.physical_min == signal.physical_max {
        return Err(EdfError::InvalidField {
            field: "physical range",
            value: format!("{}..{}", signal.physical_min, signal.physical_max),
        });
    }
    Ok(())
}

fn check_layout(header: &EdfHeader, lengths: impl ExactSizeIterator<Item = usize>) -> Result<()> {
    if lengths.len() != header.signals.len() {
        return Err(EdfError::SignalCountMismatch {
            expected: header.signals.len(),
            actual: lengths.len(),
        });
    }
    for (signal, (expected, actual)) in header
        .signals
        .iter()
        .map(|s| s.samples_per_record)
        .zip(lengths)
        .enumerate()
    {
        if expected != actual {
            return Err(EdfError::SampleCountMismatch {
                signal,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

fn label_of<'a>(header: &'a EdfHeader, warning: &HeaderWarning) -> &'a str {
    match warning {
        HeaderWarning::PhysicalOutOfRange { signal, .. } => header.signals[*signal].label.as_str(),
        _ => "",
    }
}

fn encode_sample(value: i32, bytes_per_sample: usize, out: &mut Vec<u8>) {
    out.extend_from_slice(&value.to_le_bytes()[..bytes_per_sample]);
}
