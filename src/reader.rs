use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::ops::{Bound, RangeBounds};
use std::path::{Path, PathBuf};

use crate::error::{EdfError, Result};
use crate::header;
use crate::layout::MAIN_HEADER_BYTES;
use crate::types::{EdfHeader, FilterSettings, HeaderWarning};

/// Options for an [`EdfReader`] session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadOptions {
    /// Reject block indices at or past the record count instead of
    /// attempting the read.
    pub strict: bool,
    /// Highpass reported when no channel declares one.
    pub default_highpass: f64,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            strict: true,
            default_highpass: 0.0,
        }
    }
}

/// EDF file reader
///
/// Opening a file parses its header once; data records are then read on
/// demand, either whole (`read_block`) or as a sample range of one channel
/// (`read_samples`). Closing consumes the reader, so a closed reader cannot
/// be used again without reopening the file.
///
/// # Examples
///
/// ```rust
/// use edfcodec::EdfReader;
///
/// # let dir = tempfile::tempdir()?;
/// # let path = dir.path().join("recording.edf");
/// # edfcodec::doctest_utils::create_test_file(&path)?;
/// let mut reader = EdfReader::open(&path)?;
///
/// println!("Signals: {:?}", reader.signal_labels());
/// println!("Duration: {:.1} seconds", reader.header().duration());
///
/// // Physical samples of every channel in the first data record
/// let block = reader.read_block(0)?;
/// assert_eq!(block.len(), reader.signal_count());
///
/// // The first 10 samples of channel 0
/// let samples = reader.read_samples(0, 0..10)?;
/// assert_eq!(samples.len(), 10);
///
/// reader.close();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct EdfReader {
    file: BufReader<File>,
    path: PathBuf,
    header: EdfHeader,
    filters: FilterSettings,
    warnings: Vec<HeaderWarning>,
    record_bytes: usize,
    options: ReadOptions,
}

impl EdfReader {
    /// Opens an EDF file and parses its header with default options.
    ///
    /// # Errors
    ///
    /// * `EdfError::Read` - the file does not exist or cannot be read
    /// * `EdfError::InvalidHeader` - the header is structurally corrupt
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, ReadOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| EdfError::read(&path, e))?;
        let file_size = file.metadata().map_err(|e| EdfError::read(&path, e))?.len();
        let mut file = BufReader::new(file);

        if file_size < MAIN_HEADER_BYTES as u64 {
            return Err(EdfError::InvalidHeader(format!(
                "file is {} bytes, shorter than the main header",
                file_size
            )));
        }

        let mut bytes = vec![0u8; MAIN_HEADER_BYTES];
        file.read_exact(&mut bytes).map_err(|e| EdfError::read(&path, e))?;

        let header_bytes = crate::layout::header_bytes(header::signal_count(&bytes)?);
        if file_size < header_bytes as u64 {
            return Err(EdfError::InvalidHeader(format!(
                "file is {} bytes, shorter than its {} byte header",
                file_size, header_bytes
            )));
        }
        bytes.resize(header_bytes, 0);
        file.read_exact(&mut bytes[MAIN_HEADER_BYTES..])
            .map_err(|e| EdfError::read(&path, e))?;

        let extension = path.extension().and_then(|e| e.to_str());
        let (mut header, mut warnings) = header::decode(&bytes, extension)?;

        let record_bytes = header.record_bytes();
        if record_bytes == 0 {
            return Err(EdfError::InvalidHeader("data records are empty".to_string()));
        }

        if header.record_count == -1 {
            let data_bytes = file_size - header_bytes as u64;
            let count = (data_bytes / record_bytes as u64) as i64;
            let warning = HeaderWarning::EstimatedRecordCount {
                count,
                trailing_bytes: data_bytes % record_bytes as u64,
            };
            log::warn!("{}: {}", path.display(), warning);
            warnings.push(warning);
            header.record_count = count;
        }

        let (filters, filter_warnings) = header::filter_settings(&header.signals, options.default_highpass);
        warnings.extend(filter_warnings);

        log::debug!(
            "opened {}: {} signals, {} records of {} s",
            path.display(),
            header.signals.len(),
            header.record_count,
            header.record_duration
        );

        Ok(EdfReader {
            file,
            path,
            header,
            filters,
            warnings,
            record_bytes,
            options,
        })
    }

    /// The parsed header, with the record count estimated if the file did not
    /// declare one.
    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    pub fn into_header(self) -> EdfHeader {
        self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filter settings recovered from the prefiltering fields.
    pub fn filters(&self) -> FilterSettings {
        self.filters
    }

    /// Recoverable anomalies found while parsing the header.
    pub fn warnings(&self) -> &[HeaderWarning] {
        &self.warnings
    }

    pub fn signal_count(&self) -> usize {
        self.header.signals.len()
    }

    pub fn signal_labels(&self) -> Vec<&str> {
        self.header.labels()
    }

    pub fn sampling_frequencies(&self) -> Vec<f64> {
        self.header.sampling_frequencies()
    }

    /// Number of samples per channel in the whole file.
    pub fn sample_counts(&self) -> Vec<usize> {
        self.header
            .signals
            .iter()
            .map(|s| s.samples_per_record * self.record_count())
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.header.record_count.max(0) as usize
    }

    /// Size of one data record in bytes.
    pub fn record_bytes(&self) -> usize {
        self.record_bytes
    }

    /// Reads data record `index` and returns the stored samples of every
    /// channel.
    pub fn read_digital_block(&mut self, index: usize) -> Result<Vec<Vec<i32>>> {
        if self.options.strict && index >= self.record_count() {
            return Err(EdfError::RecordOutOfRange {
                index,
                count: self.record_count(),
            });
        }

        let offset = self.header.header_bytes() as u64 + index as u64 * self.record_bytes as u64;
        let mut buf = vec![0u8; self.record_bytes];
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(&mut buf))
            .map_err(|e| EdfError::read(&self.path, e))?;

        let bytes_per_sample = self.header.subtype.bytes_per_sample();
        let mut chunks = buf.as_slice();
        let block: Vec<Vec<i32>> = self
            .header
            .signals
            .iter()
            .map(|signal| {
                let (channel, rest) = chunks.split_at(signal.samples_per_record * bytes_per_sample);
                chunks = rest;
                channel
                    .chunks_exact(bytes_per_sample)
                    .map(decode_sample)
                    .collect()
            })
            .collect();
        Ok(block)
    }

    /// Reads data record `index` and returns every channel in physical units.
    pub fn read_block(&mut self, index: usize) -> Result<Vec<Vec<f64>>> {
        let digital = self.read_digital_block(index)?;
        let block: Vec<Vec<f64>> = digital
            .into_iter()
            .zip(&self.header.signals)
            .map(|(samples, signal)| samples.into_iter().map(|d| signal.dig_to_phys(d)).collect())
            .collect();
        Ok(block)
    }

    /// Reads a range of samples of one channel in physical units.
    ///
    /// The range is mapped onto the data records containing it; those
    /// records are read whole and in order, then sliced.
    ///
    /// ```rust
    /// # let dir = tempfile::tempdir()?;
    /// # let path = dir.path().join("range.edf");
    /// # edfcodec::doctest_utils::create_test_file(&path)?;
    /// let mut reader = edfcodec::EdfReader::open(&path)?;
    /// let n = reader.header().signals[0].samples_per_record;
    ///
    /// // crosses the boundary between the first two records
    /// let samples = reader.read_samples(0, n - 5..=n + 4)?;
    /// assert_eq!(samples.len(), 10);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn read_samples<R: RangeBounds<usize>>(&mut self, channel: usize, range: R) -> Result<Vec<f64>> {
        let samples_per_record = self
            .header
            .signals
            .get(channel)
            .ok_or(EdfError::InvalidSignalIndex(channel))?
            .samples_per_record;
        let available = samples_per_record * self.record_count();

        let out_of_range = || EdfError::SampleOutOfRange {
            start: usize::MAX,
            end: usize::MAX,
            available,
        };
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.checked_add(1).ok_or_else(out_of_range)?,
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.checked_add(1).ok_or_else(out_of_range)?,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => available,
        };
        if start > end || end > available {
            return Err(EdfError::SampleOutOfRange { start, end, available });
        }
        if start == end {
            return Ok(Vec::new());
        }

        let first = start / samples_per_record;
        let last = (end - 1) / samples_per_record;
        let mut digital = Vec::with_capacity((last - first + 1) * samples_per_record);
        for index in first..=last {
            let mut block = self.read_digital_block(index)?;
            digital.append(&mut block[channel]);
        }

        let signal = &self.header.signals[channel];
        let offset = first * samples_per_record;
        Ok(digital[start - offset..end - offset]
            .iter()
            .map(|&d| signal.dig_to_phys(d))
            .collect())
    }

    /// Reads every sample of one channel in physical units.
    pub fn read_signal(&mut self, channel: usize) -> Result<Vec<f64>> {
        self.read_samples(channel, ..)
    }

    /// Releases the file handle.
    pub fn close(self) {
        log::debug!("closed {}", self.path.display());
    }
}

/// Decodes one little-endian sample of 2 or 3 bytes, sign-extending 24-bit
/// values.
fn decode_sample(bytes: &[u8]) -> i32 {
    match *bytes {
        [b0, b1] => i16::from_le_bytes([b0, b1]) as i32,
        [b0, b1, b2] => i32::from_le_bytes([0, b0, b1, b2]) >> 8,
        _ => unreachable!("samples are 2 or 3 bytes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sample() {
        assert_eq!(decode_sample(&[0x00, 0x04]), 1024);
        assert_eq!(decode_sample(&[0xff, 0xff]), -1);
        assert_eq!(decode_sample(&[0x00, 0x80]), -32768);
        assert_eq!(decode_sample(&[0xff, 0xff, 0x7f]), 8_388_607);
        assert_eq!(decode_sample(&[0x00, 0x00, 0x80]), -8_388_608);
        assert_eq!(decode_sample(&[0xfe, 0xff, 0xff]), -2);
    }

    #[test]
    fn test_open_missing_file() {
        let err = EdfReader::open("/nonexistent/dir/missing.edf").unwrap_err();
        assert!(matches!(err, EdfError::Read { .. }));
    }

    #[test]
    fn test_open_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.edf");
        std::fs::write(&path, b"0       ").unwrap();
        assert!(matches!(EdfReader::open(&path), Err(EdfError::InvalidHeader(_))));
    }
}
