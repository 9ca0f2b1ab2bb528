//! Record extraction from a raw byte stream.
//!
//! TCP hands us arbitrary slices of the stream, so a record may arrive in
//! pieces:
//!
//! ```text
//! read 1: "DRAGO"            -> nothing yet, "DRAGO" carried
//! read 2: "N:1:0\0LOKI\0"    -> DRAGON:1:0, LOKI
//! ```
//!
//! A record ends at NUL or LF. A record whose first byte is below 0x20 is
//! skipped whole. Trailing bytes below 0x20 are stripped, which also removes
//! the CR of a CR/LF pair. A carried fragment may not grow beyond the
//! decoder's limit (twice the read buffer); past that it is reported as
//! [`ProtocolError::RecordTooLong`] and everything up to the next terminator
//! is dropped, so no tail of the over-long record is ever parsed.

use std::mem;

use super::ProtocolError;
use crate::constants::FIELD_SEPARATOR;

/// Number of payload fields a record may carry after the name.
pub const MAX_FIELDS: usize = 4;

/// One complete record split into name and fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Sending effect's name.
    pub name: String,
    /// Up to four payload fields. Absent and empty fields are `None`.
    pub fields: [Option<String>; MAX_FIELDS],
}

impl Record {
    /// Split a record body on `:`.
    ///
    /// The last field keeps any further separators unsplit.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let mut parts = text.splitn(MAX_FIELDS + 1, FIELD_SEPARATOR);
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(ProtocolError::EmptyName);
        }

        let mut fields: [Option<String>; MAX_FIELDS] = Default::default();
        for (slot, part) in fields.iter_mut().zip(parts) {
            if !part.is_empty() {
                *slot = Some(part.to_string());
            }
        }

        Ok(Self {
            name: name.to_string(),
            fields,
        })
    }

    /// Field by zero-based position.
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index)?.as_deref()
    }
}

fn is_terminator(byte: u8) -> bool {
    byte == 0 || byte == b'\n'
}

fn is_control(byte: u8) -> bool {
    byte < 0x20
}

fn trim_trailing_control(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|b| !is_control(*b)).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Incremental record decoder for one connection.
///
/// Feed each raw read via [`RecordDecoder::feed`]. Complete records come
/// back in stream order; an unterminated tail is kept for the next call.
#[derive(Debug)]
pub struct RecordDecoder {
    partial: Vec<u8>,
    max_record_len: usize,
    /// Set after an overflow; cleared at the next terminator.
    discarding: bool,
}

impl RecordDecoder {
    /// Create a decoder that carries at most `max_record_len` bytes.
    pub fn new(max_record_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_record_len,
            discarding: false,
        }
    }

    /// Consume one read and return every record it completes.
    ///
    /// Malformed records are reported in place as errors; later records in
    /// the same read are still decoded.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Record, ProtocolError>> {
        let mut out = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|b| is_terminator(*b)) {
            let segment = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                self.discarding = false;
            } else if self.partial.is_empty() {
                Self::emit(segment, &mut out);
            } else {
                self.partial.extend_from_slice(segment);
                let whole = mem::take(&mut self.partial);
                if whole.len() > self.max_record_len {
                    out.push(Err(ProtocolError::RecordTooLong {
                        len: whole.len(),
                        max: self.max_record_len,
                    }));
                } else {
                    Self::emit(&whole, &mut out);
                }
            }
        }

        if !rest.is_empty() && !self.discarding {
            self.partial.extend_from_slice(rest);
            if self.partial.len() > self.max_record_len {
                out.push(Err(ProtocolError::RecordTooLong {
                    len: self.partial.len(),
                    max: self.max_record_len,
                }));
                self.partial.clear();
                self.discarding = true;
            }
        }

        out
    }

    /// Returns true if an unterminated fragment is buffered.
    pub fn has_partial(&self) -> bool {
        !self.partial.is_empty()
    }

    /// Returns true while the rest of an over-long record is being dropped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Drop any buffered fragment and end any discard in progress.
    pub fn reset(&mut self) {
        self.partial.clear();
        self.discarding = false;
    }

    fn emit(segment: &[u8], out: &mut Vec<Result<Record, ProtocolError>>) {
        if segment.first().is_some_and(|b| is_control(*b)) {
            return;
        }
        let body = trim_trailing_control(segment);
        if body.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(body);
        out.push(Record::parse(&text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut RecordDecoder, bytes: &[u8]) -> Vec<Record> {
        decoder
            .feed(bytes)
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_parse_fields() {
        let r = Record::parse("B:1:0").unwrap();
        assert_eq!(r.name, "B");
        assert_eq!(r.field(0), Some("1"));
        assert_eq!(r.field(1), Some("0"));
        assert_eq!(r.field(2), None);
        assert_eq!(r.field(9), None);
    }

    #[test]
    fn test_parse_name_only_and_trailing_separator() {
        let r = Record::parse("DRAGON").unwrap();
        assert_eq!(r.name, "DRAGON");
        assert!(r.fields.iter().all(Option::is_none));

        let r = Record::parse("SKEEBALL:725:").unwrap();
        assert_eq!(r.field(0), Some("725"));
        assert_eq!(r.field(1), None);
    }

    #[test]
    fn test_parse_empty_fields_are_absent() {
        let r = Record::parse("X::b").unwrap();
        assert_eq!(r.field(0), None);
        assert_eq!(r.field(1), Some("b"));
    }

    #[test]
    fn test_parse_fourth_field_keeps_remainder() {
        let r = Record::parse("X:1:2:3:4:5:6").unwrap();
        assert_eq!(r.field(3), Some("4:5:6"));
    }

    #[test]
    fn test_parse_empty_name_rejected() {
        assert_eq!(Record::parse(":1:0"), Err(ProtocolError::EmptyName));
    }

    #[test]
    fn test_split_record_matches_whole() {
        let mut whole = RecordDecoder::new(2048);
        let expected = decode_all(&mut whole, b"DRAGON:1:0\0");

        let mut split = RecordDecoder::new(2048);
        assert!(decode_all(&mut split, b"DRAGO").is_empty());
        assert!(split.has_partial());
        let got = decode_all(&mut split, b"N:1:0\0");
        assert!(!split.has_partial());

        assert_eq!(got, expected);
        assert_eq!(got[0].name, "DRAGON");
    }

    #[test]
    fn test_multiple_records_in_one_read() {
        let mut d = RecordDecoder::new(2048);
        let records = decode_all(&mut d, b"LOKI\0B:1:1\0ORGAN:fire\0");
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["LOKI", "B", "ORGAN"]);
    }

    #[test]
    fn test_crlf_and_lf_terminators() {
        let mut d = RecordDecoder::new(2048);
        let records = decode_all(&mut d, b"LOKI\r\nDRAGON\nB:1:0\r\n");
        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["LOKI", "DRAGON", "B"]);
        assert!(!d.has_partial());
    }

    #[test]
    fn test_crlf_split_across_reads() {
        let mut d = RecordDecoder::new(2048);
        assert!(decode_all(&mut d, b"LOKI\r").is_empty());
        let records = decode_all(&mut d, b"\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "LOKI");
    }

    #[test]
    fn test_trailing_control_bytes_stripped() {
        let mut d = RecordDecoder::new(2048);
        let records = decode_all(&mut d, b"LOKI:KA\x03\x04\0");
        assert_eq!(records[0].name, "LOKI");
        assert_eq!(records[0].field(0), Some("KA"));
    }

    #[test]
    fn test_leading_control_byte_skips_record() {
        let mut d = RecordDecoder::new(2048);
        assert!(d.feed(b"\x01LOKI\0").is_empty());
        let records = decode_all(&mut d, b"\x02\x03DRAGON:1\0ORGAN\0");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ORGAN");
    }

    #[test]
    fn test_control_only_segments_skipped() {
        let mut d = RecordDecoder::new(2048);
        assert!(d.feed(b"\0\r\n\x07\0\0").is_empty());
        assert!(!d.has_partial());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut d = RecordDecoder::new(2048);
        let input = b"ORGAN:*:CC:LULU,BIGBETTY\0";
        let mut records = Vec::new();
        for byte in input {
            records.extend(decode_all(&mut d, &[*byte]));
        }
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].field(2), Some("LULU,BIGBETTY"));
    }

    #[test]
    fn test_malformed_record_does_not_poison_rest() {
        let mut d = RecordDecoder::new(2048);
        let results = d.feed(b":oops\0LOKI\0");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Err(ProtocolError::EmptyName));
        assert_eq!(results[1].as_ref().unwrap().name, "LOKI");
    }

    #[test]
    fn test_overlong_partial_rejected() {
        let mut d = RecordDecoder::new(8);
        assert!(d.feed(b"ABCDEF").is_empty());
        let results = d.feed(b"GHIJK");
        assert_eq!(
            results,
            vec![Err(ProtocolError::RecordTooLong { len: 11, max: 8 })]
        );
        assert!(!d.has_partial());
        assert!(d.is_discarding());

        // The stream recovers at the next terminator.
        let records = decode_all(&mut d, b"\0LOKI\0");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "LOKI");
    }

    #[test]
    fn test_overlong_tail_is_never_parsed() {
        let mut d = RecordDecoder::new(8);
        assert_eq!(
            d.feed(b"ABCDEFGHIJ"),
            vec![Err(ProtocolError::RecordTooLong { len: 10, max: 8 })]
        );

        // Remainder of the same record, terminator included.
        assert!(d.feed(b"KL:fire\0").is_empty());
        assert!(!d.is_discarding());

        let records = decode_all(&mut d, b"LOKI\0");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "LOKI");
    }

    #[test]
    fn test_overlong_tail_spanning_reads_and_recovery_in_same_read() {
        let mut d = RecordDecoder::new(4);
        assert_eq!(d.feed(b"ABCDEF").len(), 1);
        assert!(d.feed(b"GHIJKLMNOP").is_empty());
        let records = decode_all(&mut d, b"QR\0B:1:1\0");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "B");
    }

    #[test]
    fn test_reset_ends_discard() {
        let mut d = RecordDecoder::new(4);
        d.feed(b"TOOLONG");
        d.reset();
        let records = decode_all(&mut d, b"LOKI\0");
        assert_eq!(records[0].name, "LOKI");
    }

    #[test]
    fn test_overlong_record_completed_in_second_read() {
        let mut d = RecordDecoder::new(8);
        assert!(d.feed(b"ABCDEF").is_empty());
        let results = d.feed(b"GHI\0");
        assert_eq!(
            results,
            vec![Err(ProtocolError::RecordTooLong { len: 9, max: 8 })]
        );
    }

    #[test]
    fn test_reset_drops_partial() {
        let mut d = RecordDecoder::new(2048);
        d.feed(b"HALF");
        d.reset();
        let records = decode_all(&mut d, b"LOKI\0");
        assert_eq!(records[0].name, "LOKI");
    }
}
