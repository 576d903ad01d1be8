//! `Upload-Concat` header parsing (§4.4 step 3).
//!
//! `partial` marks this upload as a fragment destined for later
//! concatenation. `final; <url> <url> …` marks it as the concatenation
//! target and lists, in assembly order, the partials it is made from —
//! resolved here to bare IDs by taking each URL's last path segment.

use crate::error::TusError;
use crate::model::UploadId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadConcat {
    Partial,
    Final(Vec<UploadId>),
}

pub fn parse_upload_concat(header: &str) -> Result<UploadConcat, TusError> {
    let header = header.trim();
    if header == "partial" {
        return Ok(UploadConcat::Partial);
    }

    let rest = header.strip_prefix("final;").ok_or_else(|| {
        TusError::InvalidConcatHeader(format!("unrecognized Upload-Concat value: {header}"))
    })?;

    let ids: Vec<UploadId> = rest
        .split_whitespace()
        .map(|url| {
            url.rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .ok_or_else(|| {
                    TusError::InvalidConcatHeader(format!("cannot extract an ID from {url:?}"))
                })
        })
        .collect::<Result<_, _>>()?;

    if ids.is_empty() {
        return Err(TusError::InvalidConcatHeader(
            "final upload must reference at least one partial".to_string(),
        ));
    }

    Ok(UploadConcat::Final(ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_partial() {
        assert_eq!(parse_upload_concat("partial").unwrap(), UploadConcat::Partial);
    }

    #[test]
    fn parses_final_with_multiple_urls() {
        let parsed = parse_upload_concat("final; /files/A /files/B").unwrap();
        assert_eq!(
            parsed,
            UploadConcat::Final(vec!["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn rejects_unrecognized_value() {
        assert!(parse_upload_concat("something-else").is_err());
    }

    #[test]
    fn rejects_final_with_no_partials() {
        assert!(parse_upload_concat("final;").is_err());
    }
}
