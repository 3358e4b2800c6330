use edfcodec::{scrub_subject_id, Anonymizer, EdfError, EdfHeader, EdfReader, EdfSignal, EdfWriter, HeaderField};
use std::fs;
use std::path::Path;

const SUBJECT: &str = "P001 M 01-JAN-1990 John_Doe";
const RECORDING: &str = "Startdate 02-MAR-2021 PSG-1234/2021 NN Telemetry03";

// 创建带已知身份字段的测试文件（3个信号，5个数据记录）
fn create_source_file(path: &Path) {
    let signal = |label: &str, n: usize| EdfSignal {
        label: label.to_string(),
        physical_dimension: "uV".to_string(),
        physical_min: -500.0,
        physical_max: 500.0,
        digital_min: -2048,
        digital_max: 2047,
        samples_per_record: n,
        ..Default::default()
    };
    let header = EdfHeader {
        subject_id: SUBJECT.to_string(),
        recording_id: RECORDING.to_string(),
        signals: vec![signal("Fp1", 100), signal("Fp2", 100), signal("ECG", 50)],
        ..Default::default()
    };

    let mut writer = EdfWriter::create(path).unwrap();
    writer.write_header(&header).unwrap();
    for record in 0..5 {
        let block: Vec<Vec<i32>> = header
            .signals
            .iter()
            .enumerate()
            .map(|(channel, s)| {
                (0..s.samples_per_record as i32)
                    .map(|i| (record * 397 + channel as i32 * 131 + i * 17) % 4096 - 2048)
                    .collect()
            })
            .collect();
        writer.write_digital_block(&block).unwrap();
    }
    writer.close().unwrap();
}

#[test]
fn test_anonymize_name_keeps_data() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.edf");
    let target = dir.path().join("anonymous.edf");
    create_source_file(&source);

    let mut anonymizer = Anonymizer::open(&source).unwrap();
    anonymizer.set_header_field("name".parse().unwrap(), "X").unwrap();
    anonymizer.copy_to(&target).unwrap();

    let reader = EdfReader::open(&target).unwrap();
    assert_eq!(reader.header().subject_id, "P001 M 01-JAN-1990 X");
    assert_eq!(reader.header().recording_id, RECORDING);
    assert_eq!(reader.record_count(), 5);

    // 只有受试者字段不同，数据区逐字节相同
    let original = fs::read(&source).unwrap();
    let copy = fs::read(&target).unwrap();
    assert_eq!(original.len(), copy.len());
    assert_eq!(&original[..8], &copy[..8]);
    assert_eq!(&copy[8..88], format!("{:<80}", "P001 M 01-JAN-1990 X").as_bytes());
    assert_eq!(&original[88..1024], &copy[88..1024]);
    assert_eq!(&original[1024..], &copy[1024..]);
}

#[test]
fn test_anonymize_records_match() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.edf");
    let target = dir.path().join("target.edf");
    create_source_file(&source);

    let mut anonymizer = Anonymizer::open(&source).unwrap();
    anonymizer.set_header_field(HeaderField::Birthdate, "X").unwrap();
    anonymizer.set_header_field(HeaderField::Sex, "X").unwrap();
    anonymizer.set_header_field(HeaderField::InvestigatorId, "Dr Who").unwrap();
    anonymizer.copy_to(&target).unwrap();

    let mut original = EdfReader::open(&source).unwrap();
    let mut copy = EdfReader::open(&target).unwrap();
    assert_eq!(copy.header().subject_id, "P001 X X John_Doe");
    assert_eq!(
        copy.header().recording_id,
        "Startdate 02-MAR-2021 PSG-1234/2021 Dr_Who Telemetry03"
    );
    assert_eq!(copy.header().signals, original.header().signals);

    for index in 0..original.record_count() {
        assert_eq!(
            original.read_digital_block(index).unwrap(),
            copy.read_digital_block(index).unwrap()
        );
    }
}

#[test]
fn test_whole_field_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("source.edf");
    let target = dir.path().join("target.edf");
    create_source_file(&source);

    let mut anonymizer = Anonymizer::open(&source).unwrap();
    anonymizer.set_header_field(HeaderField::SubjectId, "sub-01").unwrap();
    anonymizer.set_header_field(HeaderField::RecordingId, "").unwrap();

    let too_long = "x".repeat(81);
    assert!(matches!(
        anonymizer.set_header_field(HeaderField::PatientName, &too_long),
        Err(EdfError::IdentityTooLong { .. })
    ));
    assert!(matches!(
        anonymizer.set_header_field(HeaderField::Sex, "unknown"),
        Err(EdfError::InvalidField { .. })
    ));
    assert!(matches!(
        "height".parse::<HeaderField>(),
        Err(EdfError::UnknownHeaderField(_))
    ));

    // 失败的修改不影响头部
    assert_eq!(anonymizer.header().subject_id, "sub-01");

    anonymizer.copy_to(&target).unwrap();
    let reader = EdfReader::open(&target).unwrap();
    assert_eq!(reader.header().subject_id, "sub-01");
    assert_eq!(reader.header().recording_id, "");
}

#[test]
fn test_scrub_subject_id_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scrub.edf");
    create_source_file(&path);
    let before = fs::read(&path).unwrap();

    scrub_subject_id(&path).unwrap();

    let after = fs::read(&path).unwrap();
    assert_eq!(before.len(), after.len());
    assert_eq!(&after[8..88], format!("{:<80}", "X X X X").as_bytes());
    assert_eq!(&before[..8], &after[..8]);
    assert_eq!(&before[88..], &after[88..]);

    let reader = EdfReader::open(&path).unwrap();
    assert_eq!(reader.header().subject_id, "X X X X");
    assert_eq!(reader.header().subject().name, "X");
}
