use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{EdfError, Result};
use crate::layout::MainField;
use crate::reader::EdfReader;
use crate::types::{EdfHeader, HeaderField};
use crate::utils::pad_or_truncate;
use crate::writer::EdfWriter;

/// Subject id written by [`scrub_subject_id`]: every subfield unknown.
pub const SCRUBBED_SUBJECT_ID: &str = "X X X X";

/// Copies an EDF file with rewritten identity fields.
///
/// The header is read once and kept in memory; identity fields are changed
/// with [`set_header_field`](Anonymizer::set_header_field) and
/// [`copy_to`](Anonymizer::copy_to) writes the new file. Data records are
/// copied as stored samples, so the data section of the copy is
/// byte-identical to the source.
///
/// # Examples
///
/// ```rust
/// use edfcodec::{Anonymizer, HeaderField};
///
/// # let dir = tempfile::tempdir()?;
/// # let source = dir.path().join("raw.edf");
/// # let target = dir.path().join("anon.edf");
/// # edfcodec::doctest_utils::create_test_file(&source)?;
/// let mut anonymizer = Anonymizer::open(&source)?;
/// anonymizer.set_header_field(HeaderField::PatientName, "X")?;
/// anonymizer.set_header_field("birthdate".parse()?, "X")?;
/// anonymizer.copy_to(&target)?;
///
/// let copy = edfcodec::EdfReader::open(&target)?;
/// assert_eq!(copy.header().subject().name, "X");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct Anonymizer {
    path: PathBuf,
    header: EdfHeader,
}

impl Anonymizer {
    /// Reads the header of `path`. The file is not kept open.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = EdfReader::open(&path)?;
        let header = reader.into_header();
        Ok(Anonymizer { path, header })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &EdfHeader {
        &self.header
    }

    /// Changes one identity field of the retained header.
    ///
    /// Subfield edits keep any free text after the fourth subject subfield.
    /// Use [`HeaderField::SubjectId`] to drop the subject identity entirely.
    ///
    /// # Errors
    ///
    /// * `EdfError::IdentityTooLong` - the resulting field exceeds 80 bytes
    /// * `EdfError::InvalidField` - an invalid sex or birthdate
    pub fn set_header_field(&mut self, field: HeaderField, value: &str) -> Result<()> {
        self.header.set_field(field, value)?;
        log::debug!("{}: set {:?}", self.path.display(), field);
        Ok(())
    }

    /// Writes the modified header and every data record to `new_path`.
    ///
    /// Failures while writing are reported as `EdfError::Write` and failures
    /// reading the source as `EdfError::Read`. A partially written target is
    /// left in place.
    pub fn copy_to<P: AsRef<Path>>(&self, new_path: P) -> Result<()> {
        let new_path = new_path.as_ref();
        let as_write = |e: EdfError| match e {
            EdfError::Io(source) => EdfError::write(new_path, source),
            other => other,
        };
        let as_read = |e: EdfError| match e {
            EdfError::Io(source) => EdfError::read(&self.path, source),
            other => other,
        };

        let mut reader = EdfReader::open(&self.path).map_err(as_read)?;
        let mut writer = EdfWriter::create(new_path).map_err(as_write)?;
        writer.write_header(&self.header).map_err(as_write)?;

        for index in 0..reader.record_count() {
            let block = reader.read_digital_block(index).map_err(as_read)?;
            writer.write_digital_block(&block).map_err(as_write)?;
        }
        let copied = writer.records_written();
        writer.close().map_err(as_write)?;
        reader.close();

        log::info!(
            "copied {} records from {} to {}",
            copied,
            self.path.display(),
            new_path.display()
        );
        Ok(())
    }
}

/// Overwrites the subject id of an existing file in place with `X X X X`.
///
/// Only bytes 8..88 are touched; the rest of the file is left as is.
pub fn scrub_subject_id<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    let field = MainField::SubjectId;

    let scrub = || -> std::io::Result<()> {
        let mut file = OpenOptions::new().write(true).open(path)?;
        file.seek(SeekFrom::Start(field.offset() as u64))?;
        file.write_all(&pad_or_truncate(SCRUBBED_SUBJECT_ID, field.width()))?;
        file.sync_all()
    };
    scrub().map_err(|e| EdfError::write(path, e))?;

    log::info!("scrubbed subject id of {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doctest_utils::create_test_file;

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            Anonymizer::open("/nonexistent/raw.edf"),
            Err(EdfError::Read { .. })
        ));
    }

    #[test]
    fn test_set_header_field_keeps_other_subfields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.edf");
        create_test_file(&path).unwrap();

        let mut anonymizer = Anonymizer::open(&path).unwrap();
        let before = anonymizer.header().subject();
        anonymizer.set_header_field(HeaderField::PatientName, "X").unwrap();

        let after = anonymizer.header().subject();
        assert_eq!(after.name, "X");
        assert_eq!(after.code, before.code);
        assert_eq!(after.birthdate, before.birthdate);
    }

    #[test]
    fn test_scrub_missing_file() {
        assert!(matches!(
            scrub_subject_id("/nonexistent/raw.edf"),
            Err(EdfError::Write { .. })
        ));
    }

    #[test]
    fn test_copy_to_unwritable_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.edf");
        create_test_file(&path).unwrap();

        let anonymizer = Anonymizer::open(&path).unwrap();
        let err = anonymizer
            .copy_to(dir.path().join("missing").join("anon.edf"))
            .unwrap_err();
        assert!(matches!(err, EdfError::Write { .. }));
    }
}
