use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{EdfError, Result};
use crate::layout;
use crate::utils::{fits, format_identity_date, normalize_identity_date, to_ascii};

/// Width of the subject and recording identification fields.
pub const IDENTITY_FIELD_BYTES: usize = 80;

/// Label used by EDF+ for annotation channels.
pub const ANNOTATION_LABEL: &str = "EDF Annotations";

/// Sample encoding variant of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Subtype {
    #[default]
    Edf,
    EdfPlusContinuous,
    EdfPlusDiscontinuous,
    /// 24-bit EDF, marked `24BIT` in the reserved field.
    Bit24,
    /// BioSemi BDF.
    Bdf,
}

impl Subtype {
    /// Derives the subtype from the 5-character token at the start of the
    /// reserved header field, falling back to the file extension.
    pub fn detect(reserved: &str, extension: Option<&str>) -> Self {
        let token: String = reserved.trim().chars().take(5).collect();
        match token.as_str() {
            "EDF+C" => Subtype::EdfPlusContinuous,
            "EDF+D" => Subtype::EdfPlusDiscontinuous,
            "24BIT" => Subtype::Bit24,
            "" => match extension.map(|e| e.to_ascii_lowercase()).as_deref() {
                Some("bdf") => Subtype::Bdf,
                _ => Subtype::Edf,
            },
            _ => Subtype::Edf,
        }
    }

    /// Bytes used by one sample in a data record.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Subtype::Bit24 | Subtype::Bdf => 3,
            _ => 2,
        }
    }

    /// Token written to the reserved field when none is set explicitly.
    pub fn reserved_token(self) -> &'static str {
        match self {
            Subtype::Edf | Subtype::Bdf => "",
            Subtype::EdfPlusContinuous => "EDF+C",
            Subtype::EdfPlusDiscontinuous => "EDF+D",
            Subtype::Bit24 => "24BIT",
        }
    }

    /// Representable range of a stored sample.
    pub fn sample_range(self) -> (i32, i32) {
        match self.bytes_per_sample() {
            3 => (-(1 << 23), (1 << 23) - 1),
            _ => (i16::MIN as i32, i16::MAX as i32),
        }
    }
}

/// Metadata of one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct EdfSignal {
    pub label: String,
    pub transducer_type: String,
    /// Physical unit, e.g. `uV`. Empty means the signal is uncalibrated.
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub prefiltering: String,
    pub samples_per_record: usize,
    pub reserved: String,
}

impl Default for EdfSignal {
    fn default() -> Self {
        EdfSignal {
            label: String::new(),
            transducer_type: String::new(),
            physical_dimension: String::new(),
            physical_min: -1.0,
            physical_max: 1.0,
            digital_min: -32768,
            digital_max: 32767,
            prefiltering: String::new(),
            samples_per_record: 0,
            reserved: String::new(),
        }
    }
}

impl EdfSignal {
    /// Physical units per digital step. Derived from the current bounds on
    /// every call, so it follows any change to them.
    pub fn gain(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min) as f64
    }

    pub fn is_calibrated(&self) -> bool {
        !self.physical_dimension.is_empty()
    }

    pub fn is_annotation(&self) -> bool {
        self.label.trim() == ANNOTATION_LABEL
    }

    /// Converts a stored sample to physical units.
    pub fn dig_to_phys(&self, digital: i32) -> f64 {
        if !self.is_calibrated() {
            return digital as f64;
        }
        self.gain() * (digital - self.digital_min) as f64 + self.physical_min
    }

    /// Converts a physical value to the nearest stored sample, clamped to the
    /// digital range.
    pub fn phys_to_dig(&self, physical: f64) -> i32 {
        let digital = if self.is_calibrated() {
            ((physical - self.physical_min) / self.gain()).round() + self.digital_min as f64
        } else {
            physical.round()
        };
        digital.clamp(self.digital_min as f64, self.digital_max as f64) as i32
    }

    pub fn sampling_frequency(&self, record_duration: f64) -> f64 {
        self.samples_per_record as f64 / record_duration
    }
}

/// A decoded EDF header: main fields plus the per-signal metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EdfHeader {
    pub version: String,
    pub subject_id: String,
    pub recording_id: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub reserved: String,
    /// `-1` while the number of records is unknown.
    pub record_count: i64,
    /// Duration of one data record in seconds.
    pub record_duration: f64,
    pub signals: Vec<EdfSignal>,
    pub subtype: Subtype,
}

impl Default for EdfHeader {
    fn default() -> Self {
        EdfHeader {
            version: "0".to_string(),
            subject_id: String::new(),
            recording_id: String::new(),
            start_date: NaiveDate::from_ymd_opt(1985, 1, 1).unwrap_or_default(),
            start_time: NaiveTime::default(),
            reserved: String::new(),
            record_count: -1,
            record_duration: 1.0,
            signals: Vec::new(),
            subtype: Subtype::Edf,
        }
    }
}

impl EdfHeader {
    pub fn signal_count(&self) -> usize {
        self.signals.len()
    }

    /// Header length, always `256 + 256 * signal_count`.
    pub fn header_bytes(&self) -> usize {
        layout::header_bytes(self.signals.len())
    }

    /// Size in bytes of one data record.
    pub fn record_bytes(&self) -> usize {
        self.signals.iter().map(|s| s.samples_per_record).sum::<usize>()
            * self.subtype.bytes_per_sample()
    }

    pub fn start_datetime(&self) -> NaiveDateTime {
        self.start_date.and_time(self.start_time)
    }

    /// Recording length in seconds, zero while the record count is unknown.
    pub fn duration(&self) -> f64 {
        self.record_count.max(0) as f64 * self.record_duration
    }

    pub fn sampling_frequencies(&self) -> Vec<f64> {
        self.signals
            .iter()
            .map(|s| s.sampling_frequency(self.record_duration))
            .collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.signals.iter().map(|s| s.label.as_str()).collect()
    }

    /// Structured view of the subject identification field.
    pub fn subject(&self) -> SubjectId {
        SubjectId::parse(&self.subject_id)
    }

    /// Replaces the subject identification, rejecting values that would not
    /// fit the 80-byte field.
    pub fn set_subject(&mut self, subject: &SubjectId) -> Result<()> {
        self.subject_id = subject.to_field()?;
        Ok(())
    }

    /// Structured view of the recording identification field.
    pub fn recording(&self) -> RecordingId {
        RecordingId::parse(&self.recording_id)
    }

    pub fn set_recording(&mut self, recording: &RecordingId) -> Result<()> {
        self.recording_id = recording.to_field()?;
        Ok(())
    }

    /// Mutates one identity field. Whole-field values must fit 80 bytes.
    pub fn set_field(&mut self, field: HeaderField, value: &str) -> Result<()> {
        match field {
            HeaderField::SubjectId => {
                self.subject_id = checked_identity("subject id", value)?;
            }
            HeaderField::RecordingId => {
                self.recording_id = checked_identity("recording id", value)?;
            }
            HeaderField::PatientCode
            | HeaderField::Sex
            | HeaderField::Birthdate
            | HeaderField::PatientName => {
                let mut subject = self.subject();
                if !subject.additional.is_empty() {
                    log::warn!(
                        "subject id has text after the four standard subfields, kept as is: {:?}",
                        subject.additional
                    );
                }
                match field {
                    HeaderField::PatientCode => subject.code = value.to_string(),
                    HeaderField::Sex => subject.set_sex(value)?,
                    HeaderField::Birthdate => subject.set_birthdate(value)?,
                    _ => subject.name = value.to_string(),
                }
                self.set_subject(&subject)?;
            }
            HeaderField::Startdate => {
                let mut recording = self.recording();
                recording.startdate = normalize_identity_date("startdate", value)?;
                self.set_recording(&recording)?;
            }
            HeaderField::ExperimentId | HeaderField::InvestigatorId | HeaderField::EquipmentCode => {
                let mut recording = self.recording();
                match field {
                    HeaderField::ExperimentId => recording.experiment_id = value.to_string(),
                    HeaderField::InvestigatorId => recording.investigator_id = value.to_string(),
                    _ => recording.equipment_code = value.to_string(),
                }
                self.set_recording(&recording)?;
            }
        }
        Ok(())
    }
}

fn checked_identity(field: &'static str, value: &str) -> Result<String> {
    let value = to_ascii(value.trim_end());
    if !fits(&value, IDENTITY_FIELD_BYTES) {
        return Err(EdfError::IdentityTooLong {
            field,
            len: value.len(),
        });
    }
    Ok(value)
}

/// Subfields are space separated, so spaces inside a value become `_`.
fn subfield(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        "X".to_string()
    } else {
        value.replace(' ', "_")
    }
}

/// Patient identification: `code sex birthdate name [additional]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectId {
    pub code: String,
    pub sex: String,
    pub birthdate: String,
    pub name: String,
    /// Anything after the four standard subfields, kept verbatim.
    pub additional: String,
}

impl SubjectId {
    /// Splits a subject id field into its subfields. Free text that does not
    /// follow the EDF+ convention is split the same way, so missing trailing
    /// subfields come back as `X` from [`to_field`].
    ///
    /// [`to_field`]: SubjectId::to_field
    pub fn parse(field: &str) -> Self {
        let mut parts = field.split_whitespace();
        let mut next = || parts.next().unwrap_or_default().to_string();
        let code = next();
        let sex = next();
        let birthdate = next();
        let name = next();
        let additional = parts.collect::<Vec<_>>().join(" ");
        SubjectId {
            code,
            sex,
            birthdate,
            name,
            additional,
        }
    }

    pub fn set_sex(&mut self, sex: &str) -> Result<()> {
        let sex = sex.trim();
        match sex {
            "" => self.sex = "X".to_string(),
            "M" | "F" | "X" => self.sex = sex.to_string(),
            _ => {
                return Err(EdfError::InvalidField {
                    field: "sex",
                    value: sex.to_string(),
                })
            }
        }
        Ok(())
    }

    pub fn set_birthdate(&mut self, birthdate: &str) -> Result<()> {
        self.birthdate = normalize_identity_date("birthdate", birthdate)?;
        Ok(())
    }

    pub fn set_birthdate_from(&mut self, birthdate: NaiveDate) {
        self.birthdate = format_identity_date(birthdate);
    }

    fn is_empty(&self) -> bool {
        [&self.code, &self.sex, &self.birthdate, &self.name, &self.additional]
            .iter()
            .all(|s| s.trim().is_empty())
    }

    /// Serializes the id, failing if it exceeds the 80-byte field. Silently
    /// truncating would scramble patient identity, unlike a cosmetic label.
    pub fn to_field(&self) -> Result<String> {
        if self.is_empty() {
            return Ok(String::new());
        }
        let mut field = [&self.code, &self.sex, &self.birthdate, &self.name]
            .iter()
            .map(|s| subfield(s))
            .collect::<Vec<_>>()
            .join(" ");
        if !self.additional.trim().is_empty() {
            field.push(' ');
            field.push_str(self.additional.trim());
        }
        checked_identity("subject id", &field)
    }
}

/// Recording identification:
/// `Startdate dd-MMM-yyyy experiment investigator equipment [additional]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingId {
    pub startdate: String,
    pub experiment_id: String,
    pub investigator_id: String,
    pub equipment_code: String,
    pub additional: String,
    /// Text of a plain-EDF recording field that does not start with
    /// `Startdate`. It is written back unchanged unless a subfield is set.
    pub free_text: Option<String>,
}

impl RecordingId {
    pub fn parse(field: &str) -> Self {
        let mut parts = field.split_whitespace();
        if parts.next() != Some("Startdate") {
            let free_text = field.trim();
            return RecordingId {
                free_text: (!free_text.is_empty()).then(|| free_text.to_string()),
                ..Default::default()
            };
        }
        let mut next = || parts.next().unwrap_or_default().to_string();
        let startdate = next();
        let experiment_id = next();
        let investigator_id = next();
        let equipment_code = next();
        let additional = parts.collect::<Vec<_>>().join(" ");
        RecordingId {
            startdate,
            experiment_id,
            investigator_id,
            equipment_code,
            additional,
            free_text: None,
        }
    }

    fn has_subfields(&self) -> bool {
        [
            &self.startdate,
            &self.experiment_id,
            &self.investigator_id,
            &self.equipment_code,
            &self.additional,
        ]
        .iter()
        .any(|s| !s.trim().is_empty())
    }

    pub fn to_field(&self) -> Result<String> {
        if !self.has_subfields() {
            let text = self.free_text.clone().unwrap_or_default();
            return checked_identity("recording id", &text);
        }
        let mut field = format!(
            "Startdate {} {} {} {}",
            subfield(&self.startdate),
            subfield(&self.experiment_id),
            subfield(&self.investigator_id),
            subfield(&self.equipment_code),
        );
        if !self.additional.trim().is_empty() {
            field.push(' ');
            field.push_str(self.additional.trim());
        }
        checked_identity("recording id", &field)
    }
}

/// Identity fields that can be changed through [`EdfHeader::set_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    /// The whole subject id. Setting it to `X` (or an empty string) is the
    /// reliable way to remove identity: subfield edits keep any text after
    /// the fourth subfield, such as the surname of a free-text `John Doe`.
    SubjectId,
    RecordingId,
    PatientCode,
    Sex,
    Birthdate,
    PatientName,
    Startdate,
    ExperimentId,
    InvestigatorId,
    EquipmentCode,
}

impl FromStr for HeaderField {
    type Err = EdfError;

    fn from_str(s: &str) -> Result<Self> {
        let field = match s {
            "subject_id" => HeaderField::SubjectId,
            "recording_id" => HeaderField::RecordingId,
            "code" | "patient_code" => HeaderField::PatientCode,
            "sex" => HeaderField::Sex,
            "birthdate" | "dob" => HeaderField::Birthdate,
            "name" => HeaderField::PatientName,
            "startdate" => HeaderField::Startdate,
            "experiment_id" => HeaderField::ExperimentId,
            "investigator_id" => HeaderField::InvestigatorId,
            "equipment_code" => HeaderField::EquipmentCode,
            _ => return Err(EdfError::UnknownHeaderField(s.to_string())),
        };
        Ok(field)
    }
}

/// Filter settings recovered from the `prefiltering` fields.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterSettings {
    pub highpass: f64,
    pub lowpass: Option<f64>,
}

/// Recoverable header anomalies. They are logged and reported, never raised.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderWarning {
    /// Record duration was 0 and has been replaced by 1 second.
    ZeroRecordDuration,
    /// Record count was `-1` and has been estimated from the file size.
    EstimatedRecordCount { count: i64, trailing_bytes: u64 },
    /// Channels disagree on highpass; the highest value was kept.
    HighpassMismatch { kept: f64 },
    /// Channels disagree on lowpass; the lowest value was kept.
    LowpassMismatch { kept: f64 },
    /// A written physical value fell outside the signal's physical range.
    PhysicalOutOfRange { signal: usize, value: f64 },
}

impl fmt::Display for HeaderWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderWarning::ZeroRecordDuration => {
                write!(f, "incorrect record duration in header, defaulting to 1 second")
            }
            HeaderWarning::EstimatedRecordCount {
                count,
                trailing_bytes,
            } => write!(
                f,
                "record count unknown, estimated {} records ({} trailing bytes)",
                count, trailing_bytes
            ),
            HeaderWarning::HighpassMismatch { kept } => write!(
                f,
                "channels have different highpass filters, highest setting {} Hz kept",
                kept
            ),
            HeaderWarning::LowpassMismatch { kept } => write!(
                f,
                "channels have different lowpass filters, lowest setting {} Hz kept",
                kept
            ),
            HeaderWarning::PhysicalOutOfRange { signal, value } => write!(
                f,
                "value {} outside the physical range of signal {}",
                value, signal
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibrated(pmin: f64, pmax: f64, dmin: i32, dmax: i32) -> EdfSignal {
        EdfSignal {
            label: "EEG".to_string(),
            physical_dimension: "uV".to_string(),
            physical_min: pmin,
            physical_max: pmax,
            digital_min: dmin,
            digital_max: dmax,
            samples_per_record: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_gain_and_affine_map() {
        let signal = calibrated(-200.0, 200.0, -2048, 2047);
        assert!((signal.gain() - 0.0977).abs() < 1e-4);

        let physical = signal.dig_to_phys(1024);
        let expected = signal.gain() * (1024.0 + 2048.0) - 200.0;
        assert!((physical - expected).abs() < 1e-9);
        assert!((physical - 99.96).abs() < 0.2);

        assert!((signal.dig_to_phys(-2048) - -200.0).abs() < 1e-9);
        assert!((signal.dig_to_phys(2047) - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_gain_follows_bounds() {
        let mut signal = calibrated(-100.0, 100.0, -32768, 32767);
        let before = signal.gain();
        signal.physical_max = 300.0;
        assert!(signal.gain() > before);
    }

    #[test]
    fn test_phys_dig_within_one_step() {
        let signal = calibrated(-200.0, 200.0, -2048, 2047);
        let mut x = -200.0;
        while x <= 200.0 {
            let back = signal.dig_to_phys(signal.phys_to_dig(x));
            assert!((back - x).abs() <= signal.gain(), "{} -> {}", x, back);
            x += 0.37;
        }
    }

    #[test]
    fn test_uncalibrated_passthrough() {
        let signal = EdfSignal {
            samples_per_record: 10,
            ..Default::default()
        };
        assert_eq!(signal.dig_to_phys(123), 123.0);
        assert_eq!(signal.phys_to_dig(-45.0), -45);
    }

    #[test]
    fn test_phys_to_dig_clamps() {
        let signal = calibrated(-200.0, 200.0, -2048, 2047);
        assert_eq!(signal.phys_to_dig(1000.0), 2047);
        assert_eq!(signal.phys_to_dig(-1000.0), -2048);
    }

    #[test]
    fn test_record_layout_sizes() {
        let header = EdfHeader {
            signals: [100, 100, 50]
                .iter()
                .map(|&n| EdfSignal {
                    samples_per_record: n,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };
        assert_eq!(header.header_bytes(), 1024);
        assert_eq!(header.record_bytes(), 500);
    }

    #[test]
    fn test_subject_id_set_name() {
        let mut header = EdfHeader {
            subject_id: "P001 M 01-JAN-1990 John_Doe".to_string(),
            ..Default::default()
        };
        header.set_field("name".parse().unwrap(), "X").unwrap();
        assert_eq!(header.subject_id, "P001 M 01-JAN-1990 X");
    }

    #[test]
    fn test_subject_id_rules() {
        let mut subject = SubjectId::default();
        assert_eq!(subject.to_field().unwrap(), "");

        subject.code = "MCH 0234567".to_string();
        subject.name = "Haagse Harry".to_string();
        assert_eq!(subject.to_field().unwrap(), "MCH_0234567 X X Haagse_Harry");

        assert!(subject.set_sex("male").is_err());
        subject.set_sex("F").unwrap();
        subject.set_birthdate("1951-05-02").unwrap();
        assert_eq!(subject.to_field().unwrap(), "MCH_0234567 F 02-MAY-1951 Haagse_Harry");

        subject.name = "N".repeat(80);
        assert!(matches!(
            subject.to_field(),
            Err(EdfError::IdentityTooLong { .. })
        ));
    }

    #[test]
    fn test_birthdate_from_date() {
        let mut subject = SubjectId::parse("P001 M X John_Doe");
        subject.set_birthdate_from(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        assert_eq!(subject.to_field().unwrap(), "P001 M 01-JAN-1990 John_Doe");
    }

    #[test]
    fn test_free_text_identity() {
        let subject = SubjectId::parse("John Smith");
        assert_eq!(subject.to_field().unwrap(), "John Smith X X");

        let recording = RecordingId::parse("Recorded on ward 3");
        assert_eq!(recording.to_field().unwrap(), "Recorded on ward 3");
    }

    #[test]
    fn test_free_text_name_survives_subfield_edit() {
        let mut header = EdfHeader {
            subject_id: "P001 M 01-JAN-1990 John Doe".to_string(),
            ..Default::default()
        };
        header.set_field(HeaderField::PatientName, "X").unwrap();
        assert_eq!(header.subject_id, "P001 M 01-JAN-1990 X Doe");
        assert_eq!(header.subject().additional, "Doe");

        // 整体替换字段会清除全部内容
        header.set_field(HeaderField::SubjectId, "X").unwrap();
        assert_eq!(header.subject_id, "X");
        assert_eq!(header.subject().additional, "");
    }

    #[test]
    fn test_recording_id() {
        let mut recording = RecordingId::parse("Startdate 02-MAR-2002 PSG-1234/2002 NN Telemetry03");
        assert_eq!(recording.startdate, "02-MAR-2002");
        assert_eq!(recording.equipment_code, "Telemetry03");

        recording.investigator_id = String::new();
        assert_eq!(
            recording.to_field().unwrap(),
            "Startdate 02-MAR-2002 PSG-1234/2002 X Telemetry03"
        );
    }

    #[test]
    fn test_unknown_header_field() {
        assert!(matches!(
            "shoe_size".parse::<HeaderField>(),
            Err(EdfError::UnknownHeaderField(_))
        ));
    }

    #[test]
    fn test_subtype_detection() {
        assert_eq!(Subtype::detect("EDF+C", Some("edf")), Subtype::EdfPlusContinuous);
        assert_eq!(Subtype::detect("24BIT", None), Subtype::Bit24);
        assert_eq!(Subtype::detect("", Some("BDF")), Subtype::Bdf);
        assert_eq!(Subtype::detect("", Some("edf")), Subtype::Edf);
        assert_eq!(Subtype::Bit24.bytes_per_sample(), 3);
        assert_eq!(Subtype::EdfPlusDiscontinuous.bytes_per_sample(), 2);
    }
}
