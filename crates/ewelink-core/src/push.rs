// ── Push metadata decoding ──
//
// Devices publish their state in TXT properties: `encrypt`, `iv` and the
// payload split across `data1`..`data4`. Each TXT value is capped at 249
// bytes, so an encrypted payload continues into the next segment only while
// the current one is exactly full.

use crate::service::ServiceRecord;

/// Maximum length of a single TXT data segment.
pub const SEGMENT_LEN: usize = 249;

const DATA_KEYS: [&str; 4] = ["data1", "data2", "data3", "data4"];

/// A state push extracted from service metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushMessage {
    /// JSON parameters in clear text.
    Plain(Vec<u8>),
    /// Base64 ciphertext and IV, still to be decrypted.
    Encrypted { data: Vec<u8>, iv: Vec<u8> },
}

impl PushMessage {
    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted { .. })
    }

    /// Decode the push carried by `record`, if any.
    ///
    /// Returns `None` when the record has no `data1` property, or is flagged
    /// encrypted but carries no IV.
    pub fn from_record(record: &ServiceRecord) -> Option<Self> {
        let encrypted = record.property("encrypt").is_some_and(is_truthy);

        if encrypted {
            let iv = record.property("iv")?.to_vec();
            let data = reassemble(|key| record.property(key))?;
            Some(Self::Encrypted { data, iv })
        } else {
            record
                .property("data1")
                .map(|data| Self::Plain(data.to_vec()))
        }
    }
}

/// Stitch `data1`..`data4` together.
///
/// Concatenation continues to the next segment only while the current one is
/// exactly [`SEGMENT_LEN`] bytes, and stops early if the next key is absent.
pub fn reassemble<'a>(lookup: impl Fn(&str) -> Option<&'a [u8]>) -> Option<Vec<u8>> {
    let mut segments = DATA_KEYS.iter().map(|key| lookup(key));

    let first = segments.next().flatten()?;
    let mut payload = first.to_vec();
    let mut last_len = first.len();

    for segment in segments {
        if last_len != SEGMENT_LEN {
            break;
        }
        let Some(segment) = segment else { break };
        payload.extend_from_slice(segment);
        last_len = segment.len();
    }

    Some(payload)
}

/// A TXT flag is set only when it carries a value other than `false`/`0`.
/// A bare or empty key counts as unset.
fn is_truthy(value: &[u8]) -> bool {
    !matches!(
        value.trim_ascii().to_ascii_lowercase().as_slice(),
        b"" | b"false" | b"0"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn segment(byte: u8, len: usize) -> Vec<u8> {
        vec![byte; len]
    }

    fn lookup_in<'a>(map: &'a HashMap<String, Vec<u8>>) -> impl Fn(&str) -> Option<&'a [u8]> {
        move |key| map.get(key).map(Vec::as_slice)
    }

    fn segments(lens: &[usize]) -> HashMap<String, Vec<u8>> {
        lens.iter()
            .zip(DATA_KEYS)
            .zip(b'a'..)
            .map(|((len, key), byte)| (key.to_owned(), segment(byte, *len)))
            .collect()
    }

    #[test]
    fn four_segments_are_stitched() {
        let map = segments(&[249, 249, 249, 10]);
        let payload = reassemble(lookup_in(&map)).unwrap();

        let mut expected = segment(b'a', 249);
        expected.extend(segment(b'b', 249));
        expected.extend(segment(b'c', 249));
        expected.extend(segment(b'd', 10));
        assert_eq!(payload, expected);
    }

    #[test]
    fn short_second_segment_ends_payload() {
        let mut map = segments(&[249, 100]);
        map.insert("data3".into(), segment(b'z', 50));
        let payload = reassemble(lookup_in(&map)).unwrap();

        assert_eq!(payload.len(), 349);
        assert!(!payload.contains(&b'z'));
    }

    #[test]
    fn short_first_segment_is_whole_payload() {
        let mut map = segments(&[5]);
        map.insert("data2".into(), segment(b'z', 249));
        assert_eq!(reassemble(lookup_in(&map)).unwrap(), segment(b'a', 5));
    }

    #[test]
    fn missing_continuation_stops_stitching() {
        let mut map = segments(&[249]);
        map.insert("data3".into(), segment(b'z', 10));
        assert_eq!(reassemble(lookup_in(&map)).unwrap().len(), 249);
    }

    #[test]
    fn no_first_segment_no_payload() {
        let map = HashMap::new();
        assert_eq!(reassemble(lookup_in(&map)), None);
    }

    fn record(props: Vec<(&str, Vec<u8>)>) -> ServiceRecord {
        ServiceRecord {
            name: "eWeLink_1000abcdef._ewelink._tcp.local.".into(),
            addresses: Vec::new(),
            port: 8081,
            properties: props
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
        }
    }

    #[test]
    fn plain_push_reads_data1_only() {
        let long = segment(b'x', 249);
        let rec = record(vec![
            ("encrypt", b"false".to_vec()),
            ("data1", long.clone()),
            ("data2", b"tail".to_vec()),
        ]);
        assert_eq!(PushMessage::from_record(&rec), Some(PushMessage::Plain(long)));
    }

    #[test]
    fn encrypted_push_carries_iv() {
        let rec = record(vec![
            ("encrypt", b"true".to_vec()),
            ("iv", b"aXY=".to_vec()),
            ("data1", b"Y2lwaGVy".to_vec()),
        ]);
        let msg = PushMessage::from_record(&rec).unwrap();
        assert!(msg.is_encrypted());
        assert_eq!(
            msg,
            PushMessage::Encrypted {
                data: b"Y2lwaGVy".to_vec(),
                iv: b"aXY=".to_vec(),
            }
        );
    }

    #[test]
    fn encrypted_without_iv_is_dropped() {
        let rec = record(vec![("encrypt", b"true".to_vec()), ("data1", b"Y2lwaGVy".to_vec())]);
        assert_eq!(PushMessage::from_record(&rec), None);
    }

    #[test]
    fn empty_encrypt_flag_means_plaintext() {
        let rec = record(vec![
            ("encrypt", Vec::new()),
            ("iv", b"aXY=".to_vec()),
            ("data1", br#"{"switch":"on"}"#.to_vec()),
        ]);
        assert_eq!(
            PushMessage::from_record(&rec),
            Some(PushMessage::Plain(br#"{"switch":"on"}"#.to_vec()))
        );
    }

    #[test]
    fn record_without_data_has_no_push() {
        let rec = record(vec![("txtvers", b"1".to_vec())]);
        assert_eq!(PushMessage::from_record(&rec), None);
    }
}
