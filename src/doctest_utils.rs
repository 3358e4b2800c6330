// Internal utilities for documentation tests
// 生成文档示例使用的小型EDF文件

use crate::{EdfHeader, EdfSignal, EdfWriter, Result};
use chrono::{NaiveDate, NaiveTime};
use std::path::Path;

/// Creates a two-channel EDF file of three one-second records.
///
/// Channel 0 is a 10 Hz sine at 256 Hz, channel 1 a slow ECG-like wave at
/// 128 Hz. The subject id is `DOC001 M 01-JAN-1990 Test_Patient`.
pub fn create_test_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let signal = |label: &str, unit: &str, range: f64, n: usize, filter: &str| EdfSignal {
        label: label.to_string(),
        transducer_type: "AgAgCl electrode".to_string(),
        physical_dimension: unit.to_string(),
        physical_min: -range,
        physical_max: range,
        digital_min: -32768,
        digital_max: 32767,
        prefiltering: filter.to_string(),
        samples_per_record: n,
        reserved: String::new(),
    };

    let header = EdfHeader {
        subject_id: "DOC001 M 01-JAN-1990 Test_Patient".to_string(),
        recording_id: "Startdate 02-MAR-2021 DOC_EEG X Doctest".to_string(),
        start_date: NaiveDate::from_ymd_opt(2021, 3, 2).unwrap_or_default(),
        start_time: NaiveTime::from_hms_opt(10, 30, 0).unwrap_or_default(),
        signals: vec![
            signal("EEG Fp1", "uV", 200.0, 256, "HP:0.1Hz LP:70Hz"),
            signal("ECG", "mV", 5.0, 128, "HP:0.1Hz LP:70Hz"),
        ],
        ..Default::default()
    };

    let mut writer = EdfWriter::create(&path)?;
    writer.write_header(&header)?;
    for record in 0..3 {
        let wave = |n: usize, freq: f64, amplitude: f64| -> Vec<f64> {
            (0..n)
                .map(|i| {
                    let t = record as f64 + i as f64 / n as f64;
                    amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()
                })
                .collect()
        };
        writer.write_block(&[wave(256, 10.0, 50.0), wave(128, 1.0, 2.0)])?;
    }
    writer.close()
}
