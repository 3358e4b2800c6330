//! # EDF codec for Rust
//!
//! Reads and writes EDF (European Data Format) files: the fixed-width ASCII
//! header, the data records of 16-bit (or 24-bit) samples, and the
//! conversion between stored and physical values. An [`Anonymizer`] copies a
//! recording with rewritten identity fields, leaving the sample data
//! untouched.
//!
//! ## Quick Start
//!
//! ### Reading an EDF file
//!
//! ```rust
//! use edfcodec::{EdfReader, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir()?;
//!     # let path = dir.path().join("test_data.edf");
//!     # edfcodec::doctest_utils::create_test_file(&path)?;
//!     let mut reader = EdfReader::open(&path)?;
//!
//!     let header = reader.header();
//!     println!("Number of signals: {}", header.signals.len());
//!     println!("File duration: {:.2} seconds", header.duration());
//!     println!("Subject: {}", header.subject_id);
//!
//!     // All samples of the first channel, in physical units
//!     let samples = reader.read_signal(0)?;
//!     println!("Read {} samples", samples.len());
//!
//!     // Recoverable header problems are reported, not raised
//!     for warning in reader.warnings() {
//!         println!("warning: {}", warning);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Creating an EDF file
//!
//! ```rust
//! use edfcodec::{EdfHeader, EdfSignal, EdfWriter, SubjectId, Result};
//!
//! fn main() -> Result<()> {
//!     # let dir = tempfile::tempdir()?;
//!     # let path = dir.path().join("test_output.edf");
//!     let mut header = EdfHeader::default();
//!     header.set_subject(&SubjectId {
//!         code: "P001".to_string(),
//!         sex: "M".to_string(),
//!         birthdate: "01-JAN-1990".to_string(),
//!         name: "Patient Name".to_string(),
//!         ..Default::default()
//!     })?;
//!     assert_eq!(header.subject_id, "P001 M 01-JAN-1990 Patient_Name");
//!
//!     header.signals.push(EdfSignal {
//!         label: "EEG Fp1".to_string(),
//!         transducer_type: "AgAgCl cup electrodes".to_string(),
//!         physical_dimension: "uV".to_string(),
//!         physical_min: -200.0,
//!         physical_max: 200.0,
//!         digital_min: -32768,
//!         digital_max: 32767,
//!         prefiltering: "HP:0.1Hz LP:70Hz".to_string(),
//!         samples_per_record: 256,
//!         ..Default::default()
//!     });
//!
//!     let mut writer = EdfWriter::create(&path)?;
//!     writer.write_header(&header)?;
//!
//!     let samples: Vec<f64> = (0..256)
//!         .map(|i| 50.0 * (2.0 * std::f64::consts::PI * 10.0 * i as f64 / 256.0).sin())
//!         .collect();
//!     writer.write_block(&[samples])?;
//!
//!     // Writes the final record count into the header
//!     writer.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Removing identity
//!
//! ```rust
//! use edfcodec::{scrub_subject_id, Anonymizer, HeaderField};
//!
//! # let dir = tempfile::tempdir()?;
//! # let source = dir.path().join("raw.edf");
//! # let target = dir.path().join("anonymous.edf");
//! # edfcodec::doctest_utils::create_test_file(&source)?;
//! // Copy with selected fields replaced
//! let mut anonymizer = Anonymizer::open(&source)?;
//! anonymizer.set_header_field(HeaderField::PatientName, "X")?;
//! anonymizer.copy_to(&target)?;
//!
//! // Or blank the whole subject id of an existing file in place
//! scrub_subject_id(&target)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Working with Signal Data
//!
//! ### Physical vs Digital Values
//!
//! Samples are stored as integers in `[digital_min, digital_max]`, which maps
//! linearly onto `[physical_min, physical_max]`:
//!
//! ```rust
//! use edfcodec::EdfSignal;
//!
//! let signal = EdfSignal {
//!     label: "Test Signal".to_string(),
//!     physical_dimension: "uV".to_string(),
//!     physical_min: -200.0,
//!     physical_max: 200.0,
//!     digital_min: -2048,
//!     digital_max: 2047,
//!     samples_per_record: 256,
//!     ..Default::default()
//! };
//!
//! // Physical units per digital step
//! assert!((signal.gain() - 0.0977).abs() < 1e-4);
//!
//! let physical = signal.dig_to_phys(1024);
//! assert!((physical - 100.0).abs() < 0.1);
//!
//! // Back to the nearest representable sample
//! assert_eq!(signal.phys_to_dig(physical), 1024);
//! ```
//!
//! A signal without a physical dimension is uncalibrated: its stored values
//! are returned as they are.

pub mod error;
pub mod utils;
pub mod layout;
pub mod types;
pub mod header;
pub mod reader;
pub mod writer;
pub mod anonymize;
pub mod collate;

#[doc(hidden)]
pub mod doctest_utils; // For internal doctest support

// Re-export main types for convenience
pub use error::{EdfError, Result};
pub use types::{
    EdfHeader, EdfSignal, FilterSettings, HeaderField, HeaderWarning, RecordingId, SubjectId, Subtype,
};
pub use reader::{EdfReader, ReadOptions};
pub use writer::EdfWriter;
pub use anonymize::{scrub_subject_id, Anonymizer};
pub use collate::{collate, FileSummary};

/// Library version
///
/// Returns the current version of the edfcodec library.
///
/// # Examples
///
/// ```rust
/// let version = edfcodec::version();
/// assert!(!version.is_empty());
/// assert!(version.contains('.'));
/// ```
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
