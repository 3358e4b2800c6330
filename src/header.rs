//! Header decoding and encoding, driven by the tables in [`crate::layout`].

use crate::error::{EdfError, Result};
use crate::layout::{self, MainField, SignalField, MAIN_HEADER_BYTES};
use crate::types::{EdfHeader, EdfSignal, FilterSettings, HeaderWarning, Subtype, IDENTITY_FIELD_BYTES};
use crate::utils::{
    decode_text, fits, format_edf_date, format_edf_time, format_number, pad_or_truncate,
    parse_edf_date, parse_edf_time, parse_float, parse_int,
};

const BDF_VERSION: &[u8] = b"\xffBIOSEMI";

fn main_field(bytes: &[u8], field: MainField) -> &[u8] {
    &bytes[field.range()]
}

fn signal_field(bytes: &[u8], field: SignalField, signal_count: usize, signal: usize) -> &[u8] {
    let offset = field.offset(signal_count, signal);
    &bytes[offset..offset + field.width()]
}

/// Reads the signal count from a main header block and checks it against the
/// declared header size. A mismatch means the input is corrupt or not EDF.
pub fn signal_count(main: &[u8]) -> Result<usize> {
    if main.len() < MAIN_HEADER_BYTES {
        return Err(EdfError::InvalidHeader(format!(
            "main header is {} bytes, expected {}",
            main.len(),
            MAIN_HEADER_BYTES
        )));
    }

    let count = parse_int(MainField::SignalCount.name(), main_field(main, MainField::SignalCount))?;
    if count < 1 {
        return Err(EdfError::InvalidHeader(format!("invalid number of signals: {}", count)));
    }
    let count = count as usize;

    let declared = parse_int(MainField::HeaderBytes.name(), main_field(main, MainField::HeaderBytes))?;
    let expected = layout::header_bytes(count);
    if declared != expected as i64 {
        return Err(EdfError::InvalidHeader(format!(
            "header size mismatch: header declares {} bytes, {} signals need {}",
            declared, count, expected
        )));
    }
    Ok(count)
}

/// Decodes a complete header (main block plus signal blocks).
///
/// Recoverable anomalies are returned as warnings next to the header. The
/// record count is left as stored, including the `-1` sentinel.
pub fn decode(bytes: &[u8], extension: Option<&str>) -> Result<(EdfHeader, Vec<HeaderWarning>)> {
    let ns = signal_count(bytes)?;
    if bytes.len() < layout::header_bytes(ns) {
        return Err(EdfError::InvalidHeader(format!(
            "header is {} bytes, {} signals need {}",
            bytes.len(),
            ns,
            layout::header_bytes(ns)
        )));
    }
    let mut warnings = Vec::new();

    let version_bytes = main_field(bytes, MainField::Version);
    let is_bdf = version_bytes == BDF_VERSION;
    let version = decode_text(version_bytes);
    if !is_bdf && version.trim() != "0" {
        return Err(EdfError::InvalidHeader(format!("not an EDF file, version {:?}", version)));
    }

    let reserved = decode_text(main_field(bytes, MainField::Reserved));
    let subtype = if is_bdf {
        Subtype::Bdf
    } else {
        Subtype::detect(&reserved, extension)
    };

    let start_date = parse_edf_date(&decode_text(main_field(bytes, MainField::StartDate)))?;
    let start_time = parse_edf_time(&decode_text(main_field(bytes, MainField::StartTime)))?;

    let record_count = parse_int(MainField::RecordCount.name(), main_field(bytes, MainField::RecordCount))?;
    if record_count < -1 {
        return Err(EdfError::InvalidHeader(format!("invalid record count: {}", record_count)));
    }

    let mut record_duration = parse_float(
        MainField::RecordDuration.name(),
        main_field(bytes, MainField::RecordDuration),
    )?;
    if record_duration < 0.0 {
        return Err(EdfError::InvalidHeader(format!(
            "negative record duration: {}",
            record_duration
        )));
    }
    if record_duration == 0.0 {
        log::warn!("{}", HeaderWarning::ZeroRecordDuration);
        warnings.push(HeaderWarning::ZeroRecordDuration);
        record_duration = 1.0;
    }

    let signals = (0..ns)
        .map(|i| decode_signal(bytes, ns, i))
        .collect::<Result<Vec<_>>>()?;

    let header = EdfHeader {
        version: if is_bdf { "BIOSEMI".to_string() } else { version },
        subject_id: decode_text(main_field(bytes, MainField::SubjectId)),
        recording_id: decode_text(main_field(bytes, MainField::RecordingId)),
        start_date,
        start_time,
        reserved,
        record_count,
        record_duration,
        signals,
        subtype,
    };
    Ok((header, warnings))
}

fn decode_signal(bytes: &[u8], ns: usize, i: usize) -> Result<EdfSignal> {
    let text = |field| decode_text(signal_field(bytes, field, ns, i));
    let float = |field: SignalField| parse_float(field.name(), signal_field(bytes, field, ns, i));
    let int = |field: SignalField| parse_int(field.name(), signal_field(bytes, field, ns, i));
    let to_i32 = |field: SignalField, value: i64| {
        i32::try_from(value)
            .map_err(|_| EdfError::InvalidHeader(format!("{} of signal {} out of range: {}", field.name(), i, value)))
    };

    let digital_min = to_i32(SignalField::DigitalMin, int(SignalField::DigitalMin)?)?;
    let digital_max = to_i32(SignalField::DigitalMax, int(SignalField::DigitalMax)?)?;
    if digital_min == digital_max {
        return Err(EdfError::InvalidHeader(format!(
            "signal {} has equal digital minimum and maximum ({})",
            i, digital_min
        )));
    }

    let samples_per_record = int(SignalField::SamplesPerRecord)?;
    let samples_per_record = usize::try_from(samples_per_record).map_err(|_| {
        EdfError::InvalidHeader(format!(
            "signal {} has a negative sample count: {}",
            i, samples_per_record
        ))
    })?;

    Ok(EdfSignal {
        label: text(SignalField::Label),
        transducer_type: text(SignalField::TransducerType),
        physical_dimension: text(SignalField::PhysicalDimension),
        physical_min: float(SignalField::PhysicalMin)?,
        physical_max: float(SignalField::PhysicalMax)?,
        digital_min,
        digital_max,
        prefiltering: text(SignalField::Prefiltering),
        samples_per_record,
        reserved: text(SignalField::Reserved),
    })
}

fn text_field(out: &mut Vec<u8>, name: &str, signal: Option<usize>, text: &str, width: usize) {
    if !fits(text, width) {
        match signal {
            Some(i) => log::warn!("{} of signal {} truncated to {} bytes: {:?}", name, i, width, text),
            None => log::warn!("{} truncated to {} bytes: {:?}", name, width, text),
        }
    }
    out.extend_from_slice(&pad_or_truncate(text, width));
}

fn identity_field<'a>(field: &'static str, text: &'a str) -> Result<&'a str> {
    if !fits(text, IDENTITY_FIELD_BYTES) {
        return Err(EdfError::IdentityTooLong {
            field,
            len: text.len(),
        });
    }
    Ok(text)
}

fn int_field(name: &'static str, value: i64, width: usize) -> Result<String> {
    let text = value.to_string();
    if text.len() > width {
        return Err(EdfError::InvalidField { field: name, value: text });
    }
    Ok(text)
}

/// Serializes a header to exactly `header.header_bytes()` bytes.
///
/// Labels and other free text are truncated to their width with a warning.
/// Identity strings that do not fit are an error, as are numbers that cannot
/// be represented in their field.
pub fn encode(header: &EdfHeader) -> Result<Vec<u8>> {
    let ns = header.signals.len();
    let mut out = Vec::with_capacity(header.header_bytes());

    for field in MainField::ALL {
        let width = field.width();
        match field {
            MainField::Version if header.subtype == Subtype::Bdf => out.extend_from_slice(BDF_VERSION),
            MainField::Version => text_field(&mut out, field.name(), None, "0", width),
            MainField::SubjectId => {
                let text = identity_field("subject id", &header.subject_id)?;
                text_field(&mut out, field.name(), None, text, width)
            }
            MainField::RecordingId => {
                let text = identity_field("recording id", &header.recording_id)?;
                text_field(&mut out, field.name(), None, text, width)
            }
            MainField::StartDate => {
                text_field(&mut out, field.name(), None, &format_edf_date(header.start_date), width)
            }
            MainField::StartTime => {
                text_field(&mut out, field.name(), None, &format_edf_time(header.start_time), width)
            }
            MainField::HeaderBytes => {
                let text = int_field(field.name(), header.header_bytes() as i64, width)?;
                text_field(&mut out, field.name(), None, &text, width)
            }
            MainField::Reserved => {
                let reserved = if header.reserved.is_empty() {
                    header.subtype.reserved_token()
                } else {
                    header.reserved.as_str()
                };
                text_field(&mut out, field.name(), None, reserved, width)
            }
            MainField::RecordCount => {
                let text = int_field(field.name(), header.record_count, width)?;
                text_field(&mut out, field.name(), None, &text, width)
            }
            MainField::RecordDuration => {
                let text = format_number(field.name(), header.record_duration, width)?;
                text_field(&mut out, field.name(), None, &text, width)
            }
            MainField::SignalCount => {
                let text = int_field(field.name(), ns as i64, width)?;
                text_field(&mut out, field.name(), None, &text, width)
            }
        }
    }

    for field in SignalField::ALL {
        let width = field.width();
        for (i, signal) in header.signals.iter().enumerate() {
            let text = match field {
                SignalField::Label => signal.label.clone(),
                SignalField::TransducerType => signal.transducer_type.clone(),
                SignalField::PhysicalDimension => signal.physical_dimension.clone(),
                SignalField::PhysicalMin => format_number(field.name(), signal.physical_min, width)?,
                SignalField::PhysicalMax => format_number(field.name(), signal.physical_max, width)?,
                SignalField::DigitalMin => int_field(field.name(), signal.digital_min as i64, width)?,
                SignalField::DigitalMax => int_field(field.name(), signal.digital_max as i64, width)?,
                SignalField::Prefiltering => signal.prefiltering.clone(),
                SignalField::SamplesPerRecord => {
                    int_field(field.name(), signal.samples_per_record as i64, width)?
                }
                SignalField::Reserved => signal.reserved.clone(),
            };
            text_field(&mut out, field.name(), Some(i), &text, width);
        }
    }

    debug_assert_eq!(out.len(), header.header_bytes());
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FilterToken {
    Hz(f64),
    Dc,
    NaN,
}

/// Finds `key` (`HP:` or `LP:`) in a prefiltering string and parses the value
/// after it. Units such as `Hz` are ignored.
fn filter_token(prefiltering: &str, key: &str) -> Option<FilterToken> {
    let start = prefiltering.find(key)? + key.len();
    let rest = prefiltering[start..].trim_start();
    if rest.starts_with("DC") {
        return Some(FilterToken::Dc);
    }
    if rest.starts_with("NaN") {
        return Some(FilterToken::NaN);
    }
    let number: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    number.parse().ok().map(FilterToken::Hz)
}

/// Extracts highpass/lowpass settings from the signals' prefiltering text.
///
/// Annotation channels are ignored. When channels disagree the most
/// restrictive setting is kept (highest highpass, lowest lowpass) and a
/// warning is returned instead of an error.
pub fn filter_settings(signals: &[EdfSignal], default_highpass: f64) -> (FilterSettings, Vec<HeaderWarning>) {
    let mut warnings = Vec::new();
    let channels: Vec<&EdfSignal> = signals.iter().filter(|s| !s.is_annotation()).collect();

    let highpass: Vec<f64> = channels
        .iter()
        .filter_map(|s| filter_token(&s.prefiltering, "HP:"))
        .map(|token| match token {
            FilterToken::Hz(v) => v,
            FilterToken::Dc => 0.0,
            FilterToken::NaN => default_highpass,
        })
        .collect();
    let highpass = match highpass.first() {
        None => default_highpass,
        Some(&first) if highpass.iter().all(|&v| v == first) => first,
        Some(_) => {
            let kept = highpass.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let warning = HeaderWarning::HighpassMismatch { kept };
            log::warn!("{}", warning);
            warnings.push(warning);
            kept
        }
    };

    let lowpass: Vec<Option<f64>> = channels
        .iter()
        .filter_map(|s| filter_token(&s.prefiltering, "LP:"))
        .map(|token| match token {
            FilterToken::Hz(v) => Some(v),
            FilterToken::Dc | FilterToken::NaN => None,
        })
        .collect();
    let lowpass = match lowpass.first() {
        None => None,
        Some(&first) if lowpass.iter().all(|&v| v == first) => first,
        Some(_) => {
            let kept = lowpass
                .iter()
                .flatten()
                .cloned()
                .fold(f64::INFINITY, f64::min);
            let kept = kept.is_finite().then_some(kept);
            if let Some(kept) = kept {
                let warning = HeaderWarning::LowpassMismatch { kept };
                log::warn!("{}", warning);
                warnings.push(warning);
            }
            kept
        }
    };

    (FilterSettings { highpass, lowpass }, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_header() -> EdfHeader {
        let signal = |label: &str, n: usize, filter: &str| EdfSignal {
            label: label.to_string(),
            transducer_type: "AgAgCl electrode".to_string(),
            physical_dimension: "uV".to_string(),
            physical_min: -200.0,
            physical_max: 200.0,
            digital_min: -2048,
            digital_max: 2047,
            prefiltering: filter.to_string(),
            samples_per_record: n,
            reserved: String::new(),
        };
        EdfHeader {
            subject_id: "P001 M 01-JAN-1990 John_Doe".to_string(),
            recording_id: "Startdate 01-MAR-2021 EEG_42 NN Nihon".to_string(),
            start_date: NaiveDate::from_ymd_opt(2021, 3, 1).unwrap(),
            record_count: 12,
            signals: vec![
                signal("Fp1", 100, "HP:0.1Hz LP:70Hz"),
                signal("Fp2", 100, "HP:0.1Hz LP:70Hz"),
                signal("ECG", 50, "HP:0.5Hz LP:40Hz"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let header = sample_header();
        let bytes = encode(&header).unwrap();
        assert_eq!(bytes.len(), 1024);

        let (decoded, warnings) = decode(&bytes, Some("edf")).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_encoded_field_positions() {
        let bytes = encode(&sample_header()).unwrap();
        assert_eq!(&bytes[0..8], b"0       ");
        assert_eq!(&bytes[184..192], b"1024    ");
        assert_eq!(&bytes[236..244], b"12      ");
        assert_eq!(&bytes[244..252], b"1       ");
        assert_eq!(&bytes[252..256], b"3   ");
        // 所有标签在传感器类型之前
        assert_eq!(&bytes[256..272], b"Fp1             ");
        assert_eq!(&bytes[272..288], b"Fp2             ");
        assert_eq!(&bytes[288..304], b"ECG             ");
        assert_eq!(&bytes[304..320], b"AgAgCl electrode");
    }

    #[test]
    fn test_long_label_is_truncated() {
        let mut header = sample_header();
        header.signals[0].label = "EEG Fp1-Reference-Long".to_string();
        let bytes = encode(&header).unwrap();
        assert_eq!(bytes.len(), 1024);
        let (decoded, _) = decode(&bytes, None).unwrap();
        assert_eq!(decoded.signals[0].label, "EEG Fp1-Referenc");
        assert_eq!(decoded.signals[1].label, "Fp2");

        // 再次编码已截断的头部不再改变
        let again = encode(&decoded).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn test_long_identity_is_rejected() {
        let mut header = sample_header();
        header.subject_id = "P".repeat(81);
        assert!(matches!(encode(&header), Err(EdfError::IdentityTooLong { .. })));
    }

    #[test]
    fn test_header_size_mismatch_is_fatal() {
        let mut bytes = encode(&sample_header()).unwrap();
        bytes[184..192].copy_from_slice(b"768     ");
        assert!(matches!(decode(&bytes, None), Err(EdfError::InvalidHeader(_))));
    }

    #[test]
    fn test_zero_record_duration_is_recovered() {
        let mut bytes = encode(&sample_header()).unwrap();
        bytes[244..252].copy_from_slice(b"0       ");
        let (decoded, warnings) = decode(&bytes, None).unwrap();
        assert_eq!(decoded.record_duration, 1.0);
        assert_eq!(warnings, vec![HeaderWarning::ZeroRecordDuration]);
    }

    #[test]
    fn test_bad_version_is_fatal() {
        let mut bytes = encode(&sample_header()).unwrap();
        bytes[0..8].copy_from_slice(b"1       ");
        assert!(matches!(decode(&bytes, None), Err(EdfError::InvalidHeader(_))));
    }

    #[test]
    fn test_filter_settings_agree() {
        let mut header = sample_header();
        header.signals[2].prefiltering = "HP:0.1Hz LP:70Hz".to_string();
        let (filters, warnings) = filter_settings(&header.signals, 0.0);
        assert_eq!(filters.highpass, 0.1);
        assert_eq!(filters.lowpass, Some(70.0));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_filter_settings_disagree() {
        let (filters, warnings) = filter_settings(&sample_header().signals, 0.0);
        assert_eq!(filters.highpass, 0.5);
        assert_eq!(filters.lowpass, Some(40.0));
        assert_eq!(
            warnings,
            vec![
                HeaderWarning::HighpassMismatch { kept: 0.5 },
                HeaderWarning::LowpassMismatch { kept: 40.0 },
            ]
        );
    }

    #[test]
    fn test_filter_tokens() {
        assert_eq!(filter_token("HP: DC LP: NaN", "HP:"), Some(FilterToken::Dc));
        assert_eq!(filter_token("HP: DC LP: NaN", "LP:"), Some(FilterToken::NaN));
        assert_eq!(filter_token("HP:0.16Hz", "HP:"), Some(FilterToken::Hz(0.16)));
        assert_eq!(filter_token("notch 50Hz", "HP:"), None);

        let signals = vec![EdfSignal {
            prefiltering: "HP: DC".to_string(),
            ..Default::default()
        }];
        let (filters, _) = filter_settings(&signals, 0.3);
        assert_eq!(filters.highpass, 0.0);
        assert_eq!(filters.lowpass, None);
    }
}
