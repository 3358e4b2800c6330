//! Fixed-width field primitives shared by the header codec.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::error::{EdfError, Result};

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Pads `text` with trailing spaces or hard-truncates it to exactly `width`
/// bytes. Non-ASCII characters are replaced with `_` so that truncation can
/// never split a multi-byte character.
pub fn pad_or_truncate(text: &str, width: usize) -> Vec<u8> {
    let mut bytes: Vec<u8> = to_ascii(text).into_bytes();
    bytes.resize(width, b' ');
    bytes
}

/// Whether `text` fits into a field of `width` bytes without truncation.
pub fn fits(text: &str, width: usize) -> bool {
    to_ascii(text).len() <= width
}

/// Converts a string to 7-bit printable ASCII, non-ASCII becomes `_`.
pub fn to_ascii(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect()
}

/// Decodes a raw field as ASCII text with trailing padding removed.
pub fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c: char| c == ' ' || c == '\0')
        .to_string()
}

/// Parses an integer field. Values written as floats with a zero fraction
/// (`"-32768.0"`) are accepted since some writers emit them.
pub fn parse_int(field: &'static str, bytes: &[u8]) -> Result<i64> {
    let text = decode_text(bytes);
    let s = text.trim();
    if let Ok(value) = s.parse::<i64>() {
        return Ok(value);
    }
    match s.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 && value.is_finite() => Ok(value as i64),
        _ => Err(EdfError::InvalidHeader(format!("{} is not an integer: {:?}", field, s))),
    }
}

/// Parses a floating point field.
pub fn parse_float(field: &'static str, bytes: &[u8]) -> Result<f64> {
    let text = decode_text(bytes);
    let s = text.trim();
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| EdfError::InvalidHeader(format!("{} is not a number: {:?}", field, s)))
}

/// Formats a number with the shortest decimal representation that fits into
/// `width` characters, dropping fractional digits as needed. Integral values
/// are written without a decimal point.
pub fn format_number(field: &'static str, value: f64, width: usize) -> Result<String> {
    if !value.is_finite() {
        return Err(EdfError::InvalidField {
            field,
            value: value.to_string(),
        });
    }

    let plain = format!("{}", value);
    if plain.len() <= width {
        return Ok(plain);
    }

    for precision in (0..width).rev() {
        let candidate = format!("{:.*}", precision, value);
        let candidate = if candidate.contains('.') {
            candidate.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            candidate
        };
        if candidate.len() <= width {
            return Ok(candidate);
        }
    }

    Err(EdfError::InvalidField {
        field,
        value: plain,
    })
}

fn date_parts(s: &str) -> Vec<u32> {
    s.split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse().ok())
        .collect()
}

/// Expands a two-digit EDF year: 85-99 belong to the 1900s, 00-84 to the 2000s.
pub fn expand_year(year: u32) -> i32 {
    match year {
        0..=84 => 2000 + year as i32,
        85..=99 => 1900 + year as i32,
        _ => year as i32,
    }
}

/// Parses the `dd.mm.yy` start date field.
pub fn parse_edf_date(s: &str) -> Result<NaiveDate> {
    let parts = date_parts(s);
    let invalid = || EdfError::InvalidHeader(format!("invalid start date: {:?}", s.trim()));
    if parts.len() != 3 {
        return Err(invalid());
    }
    NaiveDate::from_ymd_opt(expand_year(parts[2]), parts[1], parts[0]).ok_or_else(invalid)
}

/// Parses the `hh.mm.ss` start time field.
pub fn parse_edf_time(s: &str) -> Result<NaiveTime> {
    let parts = date_parts(s);
    let invalid = || EdfError::InvalidHeader(format!("invalid start time: {:?}", s.trim()));
    if parts.len() != 3 {
        return Err(invalid());
    }
    NaiveTime::from_hms_opt(parts[0], parts[1], parts[2]).ok_or_else(invalid)
}

pub fn format_edf_date(date: NaiveDate) -> String {
    format!("{:02}.{:02}.{:02}", date.day(), date.month(), date.year().rem_euclid(100))
}

pub fn format_edf_time(time: NaiveTime) -> String {
    format!("{:02}.{:02}.{:02}", time.hour(), time.minute(), time.second())
}

/// Formats a date the way EDF+ identity subfields expect it: `02-MAY-1951`.
pub fn format_identity_date(date: NaiveDate) -> String {
    format!("{:02}-{}-{:04}", date.day(), MONTHS[date.month0() as usize], date.year())
}

/// Normalizes an identity date given as `X`, `dd-MMM-yyyy` or ISO
/// `yyyy-mm-dd` into `dd-MMM-yyyy`. An empty value means unknown (`X`).
pub fn normalize_identity_date(field: &'static str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() || value == "X" {
        return Ok("X".to_string());
    }

    let invalid = || EdfError::InvalidField {
        field,
        value: value.to_string(),
    };

    let parts: Vec<&str> = value.split('-').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let date = if parts[0].len() == 4 {
        // 年-月-日
        let year: i32 = parts[0].parse().map_err(|_| invalid())?;
        let month: u32 = parts[1].parse().map_err(|_| invalid())?;
        let day: u32 = parts[2].parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, day)
    } else {
        // 日-月份缩写-年
        let day: u32 = parts[0].parse().map_err(|_| invalid())?;
        let month = parse_month(parts[1]).ok_or_else(invalid)?;
        let year: u32 = parts[2].parse().map_err(|_| invalid())?;
        let year = if parts[2].len() == 2 { expand_year(year) } else { year as i32 };
        NaiveDate::from_ymd_opt(year, month, day)
    };

    date.map(format_identity_date).ok_or_else(invalid)
}

fn parse_month(s: &str) -> Option<u32> {
    let upper = s.to_ascii_uppercase();
    MONTHS.iter().position(|m| *m == upper).map(|i| i as u32 + 1)
}
