//! `Upload-Metadata` header encode/decode (§4.4 step 2, §8 round-trip law).
//!
//! Wire form is a comma-separated list of `key base64(value)` pairs. Bare
//! keys (no value) are allowed and round-trip to an empty string. Entries
//! whose value fails to base64-decode are dropped silently rather than
//! failing the whole parse — the source protocol treats one bad pair as
//! noise, not a reason to reject the upload.

use base64::Engine;

use crate::model::MetaData;

const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

pub fn parse_upload_metadata(header: &str) -> MetaData {
    let mut out = MetaData::new();
    for pair in header.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let mut parts = pair.splitn(2, ' ');
        let key = match parts.next() {
            Some(k) if !k.is_empty() => k,
            _ => continue,
        };
        let value = match parts.next() {
            None => String::new(),
            Some(encoded) => match ENGINE.decode(encoded) {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(s) => s,
                    Err(_) => continue,
                },
                Err(_) => continue,
            },
        };
        out.insert(key.to_string(), value);
    }
    out
}

pub fn encode_upload_metadata(metadata: &MetaData) -> String {
    let mut keys: Vec<&String> = metadata.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|key| {
            let value = &metadata[key];
            if value.is_empty() {
                key.clone()
            } else {
                format!("{} {}", key, ENGINE.encode(value.as_bytes()))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_and_parse() {
        let mut md = MetaData::new();
        md.insert("filename".to_string(), "world_domination_plan.pdf".to_string());
        md.insert("is_confidential".to_string(), String::new());

        let encoded = encode_upload_metadata(&md);
        let parsed = parse_upload_metadata(&encoded);
        assert_eq!(parsed, md);
    }

    #[test]
    fn bare_key_has_empty_value() {
        let parsed = parse_upload_metadata("is_confidential");
        assert_eq!(parsed.get("is_confidential"), Some(&String::new()));
    }

    #[test]
    fn invalid_base64_entry_is_dropped_not_fatal() {
        let parsed = parse_upload_metadata("filename not-valid-base64!!!,ok d29ybGQ=");
        assert!(!parsed.contains_key("filename"));
        assert_eq!(parsed.get("ok"), Some(&"world".to_string()));
    }

    #[test]
    fn ignores_blank_segments() {
        let parsed = parse_upload_metadata("a aGk=,,b Yg==,");
        assert_eq!(parsed.len(), 2);
    }
}
