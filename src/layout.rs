//! Byte layout of the EDF header.
//!
//! The main header is a fixed 256-byte block. It is followed by one 256-byte
//! block per signal, but those bytes are grouped by field rather than by
//! signal: all labels first, then all transducer types, and so on. Both the
//! parser and the serializer walk these tables, so offsets are defined once.

/// Size of the main header block.
pub const MAIN_HEADER_BYTES: usize = 256;

/// Header bytes contributed by every signal.
pub const SIGNAL_HEADER_BYTES: usize = 256;

/// Fields of the main header in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainField {
    Version,
    SubjectId,
    RecordingId,
    StartDate,
    StartTime,
    HeaderBytes,
    Reserved,
    RecordCount,
    RecordDuration,
    SignalCount,
}

impl MainField {
    pub const ALL: [MainField; 10] = [
        MainField::Version,
        MainField::SubjectId,
        MainField::RecordingId,
        MainField::StartDate,
        MainField::StartTime,
        MainField::HeaderBytes,
        MainField::Reserved,
        MainField::RecordCount,
        MainField::RecordDuration,
        MainField::SignalCount,
    ];

    pub const fn width(self) -> usize {
        match self {
            MainField::Version => 8,
            MainField::SubjectId => 80,
            MainField::RecordingId => 80,
            MainField::StartDate => 8,
            MainField::StartTime => 8,
            MainField::HeaderBytes => 8,
            MainField::Reserved => 44,
            MainField::RecordCount => 8,
            MainField::RecordDuration => 8,
            MainField::SignalCount => 4,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            MainField::Version => "version",
            MainField::SubjectId => "subject id",
            MainField::RecordingId => "recording id",
            MainField::StartDate => "start date",
            MainField::StartTime => "start time",
            MainField::HeaderBytes => "header byte count",
            MainField::Reserved => "reserved",
            MainField::RecordCount => "record count",
            MainField::RecordDuration => "record duration",
            MainField::SignalCount => "signal count",
        }
    }

    /// Byte offset of the field from the start of the file.
    pub const fn offset(self) -> usize {
        let mut offset = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            if Self::ALL[i] as usize == self as usize {
                break;
            }
            offset += Self::ALL[i].width();
            i += 1;
        }
        offset
    }

    pub fn range(self) -> std::ops::Range<usize> {
        self.offset()..self.offset() + self.width()
    }
}

/// Per-signal fields in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalField {
    Label,
    TransducerType,
    PhysicalDimension,
    PhysicalMin,
    PhysicalMax,
    DigitalMin,
    DigitalMax,
    Prefiltering,
    SamplesPerRecord,
    Reserved,
}

impl SignalField {
    pub const ALL: [SignalField; 10] = [
        SignalField::Label,
        SignalField::TransducerType,
        SignalField::PhysicalDimension,
        SignalField::PhysicalMin,
        SignalField::PhysicalMax,
        SignalField::DigitalMin,
        SignalField::DigitalMax,
        SignalField::Prefiltering,
        SignalField::SamplesPerRecord,
        SignalField::Reserved,
    ];

    pub const fn width(self) -> usize {
        match self {
            SignalField::Label => 16,
            SignalField::TransducerType => 80,
            SignalField::PhysicalDimension => 8,
            SignalField::PhysicalMin => 8,
            SignalField::PhysicalMax => 8,
            SignalField::DigitalMin => 8,
            SignalField::DigitalMax => 8,
            SignalField::Prefiltering => 80,
            SignalField::SamplesPerRecord => 8,
            SignalField::Reserved => 32,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SignalField::Label => "label",
            SignalField::TransducerType => "transducer type",
            SignalField::PhysicalDimension => "physical dimension",
            SignalField::PhysicalMin => "physical minimum",
            SignalField::PhysicalMax => "physical maximum",
            SignalField::DigitalMin => "digital minimum",
            SignalField::DigitalMax => "digital maximum",
            SignalField::Prefiltering => "prefiltering",
            SignalField::SamplesPerRecord => "samples per record",
            SignalField::Reserved => "signal reserved",
        }
    }

    /// Byte offset of this field for `signal` in a file with `signal_count`
    /// signals.
    pub fn offset(self, signal_count: usize, signal: usize) -> usize {
        let preceding: usize = Self::ALL
            .iter()
            .take_while(|field| **field != self)
            .map(|field| field.width() * signal_count)
            .sum();
        MAIN_HEADER_BYTES + preceding + self.width() * signal
    }
}

/// Total header length for a file with `signal_count` signals.
pub const fn header_bytes(signal_count: usize) -> usize {
    MAIN_HEADER_BYTES + SIGNAL_HEADER_BYTES * signal_count
}

/// Offset of the 8-byte record count patched when a writer closes.
pub const RECORD_COUNT_OFFSET: usize = MainField::RecordCount.offset();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_header_is_256_bytes() {
        let total: usize = MainField::ALL.iter().map(|f| f.width()).sum();
        assert_eq!(total, MAIN_HEADER_BYTES);
        assert_eq!(MainField::SignalCount.range().end, MAIN_HEADER_BYTES);
    }

    #[test]
    fn test_signal_header_is_256_bytes() {
        let total: usize = SignalField::ALL.iter().map(|f| f.width()).sum();
        assert_eq!(total, SIGNAL_HEADER_BYTES);
    }

    #[test]
    fn test_known_offsets() {
        assert_eq!(MainField::SubjectId.offset(), 8);
        assert_eq!(MainField::RecordingId.offset(), 88);
        assert_eq!(MainField::StartDate.offset(), 168);
        assert_eq!(MainField::HeaderBytes.offset(), 184);
        assert_eq!(MainField::Reserved.offset(), 192);
        assert_eq!(RECORD_COUNT_OFFSET, 236);
        assert_eq!(MainField::RecordDuration.offset(), 244);
        assert_eq!(MainField::SignalCount.offset(), 252);
    }

    #[test]
    fn test_signal_fields_grouped_by_field() {
        // 3个信号：先是3个标签，再是3个传感器类型
        assert_eq!(SignalField::Label.offset(3, 0), 256);
        assert_eq!(SignalField::Label.offset(3, 2), 256 + 32);
        assert_eq!(SignalField::TransducerType.offset(3, 0), 256 + 48);
        assert_eq!(SignalField::PhysicalDimension.offset(3, 1), 256 + 48 + 240 + 8);
        assert_eq!(SignalField::Reserved.offset(3, 2) + 32, header_bytes(3));
        assert_eq!(header_bytes(3), 1024);
    }
}
