//! Upload body construction.
//!
//! A body is `prefix + join(records, separator) + suffix`, optionally
//! compressed:
//!
//! ```text
//! records: {"a":1}  {"b":2}
//! json array:    [{"a":1},{"b":2}]
//! newline:       {"a":1}\n{"b":2}
//! ```

use std::io::Write;

use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, UploadError};
use crate::transport::UploadRequest;

/// Framing of records inside one request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFormat {
    pub prefix: Vec<u8>,
    pub separator: Vec<u8>,
    pub suffix: Vec<u8>,
}

impl DataFormat {
    pub fn new(
        prefix: impl Into<Vec<u8>>,
        separator: impl Into<Vec<u8>>,
        suffix: impl Into<Vec<u8>>,
    ) -> Self {
        DataFormat {
            prefix: prefix.into(),
            separator: separator.into(),
            suffix: suffix.into(),
        }
    }

    /// `[r1,r2,...]`
    pub fn json_array() -> Self {
        DataFormat::new("[", ",", "]")
    }

    /// One record per line, no enclosing brackets.
    pub fn new_line_separated() -> Self {
        DataFormat::new("", "\n", "")
    }

    pub fn format<R: AsRef<[u8]>>(&self, records: &[R]) -> Vec<u8> {
        let payload: usize = records.iter().map(|r| r.as_ref().len()).sum();
        let mut body = Vec::with_capacity(
            self.prefix.len()
                + payload
                + self.separator.len() * records.len().saturating_sub(1)
                + self.suffix.len(),
        );
        body.extend_from_slice(&self.prefix);
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                body.extend_from_slice(&self.separator);
            }
            body.extend_from_slice(record.as_ref());
        }
        body.extend_from_slice(&self.suffix);
        body
    }
}

impl Default for DataFormat {
    fn default() -> Self {
        DataFormat::json_array()
    }
}

/// Body compression applied after formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    /// zlib-wrapped deflate, sent as `Content-Encoding: deflate`.
    Deflate,
}

impl Compression {
    pub fn content_encoding(&self) -> Option<&'static str> {
        match self {
            Compression::None => None,
            Compression::Deflate => Some("deflate"),
        }
    }

    pub fn compress(&self, body: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(body),
            Compression::Deflate => {
                let mut encoder = ZlibEncoder::new(
                    Vec::with_capacity(body.len() / 2),
                    flate2::Compression::default(),
                );
                encoder.write_all(&body)?;
                Ok(encoder.finish()?)
            }
        }
    }
}

/// Stateless builder turning a batch into an [`UploadRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchFormatter {
    format: DataFormat,
    compression: Compression,
}

impl BatchFormatter {
    pub fn new(format: DataFormat, compression: Compression) -> Self {
        BatchFormatter {
            format,
            compression,
        }
    }

    pub fn data_format(&self) -> &DataFormat {
        &self.format
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn build_request<R: AsRef<[u8]>>(&self, records: &[R]) -> Result<UploadRequest> {
        if records.is_empty() {
            return Err(UploadError::InvalidRequest("batch has no records".into()));
        }
        let body = self.compression.compress(self.format.format(records))?;
        Ok(UploadRequest {
            body,
            content_encoding: self.compression.content_encoding(),
            record_count: records.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    fn records() -> Vec<Vec<u8>> {
        vec![br#"{"a":1}"#.to_vec(), br#"{"b":2}"#.to_vec()]
    }

    #[test]
    fn test_json_array_format() {
        let body = DataFormat::json_array().format(&records());
        assert_eq!(body, br#"[{"a":1},{"b":2}]"#);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_new_line_format() {
        let body = DataFormat::new_line_separated().format(&records());
        assert_eq!(body, b"{\"a\":1}\n{\"b\":2}");
    }

    #[test]
    fn test_single_record_has_no_separator() {
        let body = DataFormat::new("<", "|", ">").format(&[b"x"]);
        assert_eq!(body, b"<x>");
    }

    #[test]
    fn test_no_records_yields_prefix_and_suffix() {
        let empty: [&[u8]; 0] = [];
        assert_eq!(DataFormat::json_array().format(&empty), b"[]");
    }

    #[test]
    fn test_deflate_roundtrips_through_zlib() {
        let formatter = BatchFormatter::new(DataFormat::json_array(), Compression::Deflate);
        let request = formatter.build_request(&records()).unwrap();
        assert_eq!(request.content_encoding, Some("deflate"));
        assert_eq!(request.record_count, 2);

        let mut decoded = Vec::new();
        ZlibDecoder::new(request.body.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, br#"[{"a":1},{"b":2}]"#);
    }

    #[test]
    fn test_uncompressed_request_has_no_encoding() {
        let request = BatchFormatter::default().build_request(&records()).unwrap();
        assert_eq!(request.content_encoding, None);
        assert_eq!(request.body, br#"[{"a":1},{"b":2}]"#);
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let empty: Vec<Vec<u8>> = Vec::new();
        let err = BatchFormatter::default().build_request(&empty).unwrap_err();
        assert!(matches!(err, UploadError::InvalidRequest(_)));
    }

    #[test]
    fn test_compression_serde_names() {
        assert_eq!(
            serde_json::to_string(&Compression::Deflate).unwrap(),
            "\"deflate\""
        );
    }
}
