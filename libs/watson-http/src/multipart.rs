//! `multipart/form-data` body encoding.

use crate::error::BuildError;
use bytes::Bytes;
use rand::random;
use std::fmt;
use std::io::Read;

/// Owned, sendable byte stream used for streamed bodies and form parts.
pub type BodyStream = Box<dyn Read + Send>;

/// Contents of one multipart form part.
pub enum FormContents {
    /// Textual value, sent as UTF-8
    Text(String),
    /// Byte stream, drained when the request is built
    Stream(BodyStream),
}

impl fmt::Debug for FormContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for FormContents {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for FormContents {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<BodyStream> for FormContents {
    fn from(value: BodyStream) -> Self {
        Self::Stream(value)
    }
}

/// One registered form field: optional file name and content type plus contents.
#[derive(Debug)]
pub struct FormData {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub contents: FormContents,
}

const DEFAULT_FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// Incremental writer for a `multipart/form-data` payload.
pub struct MultipartWriter {
    boundary: String,
    buf: Vec<u8>,
    parts: usize,
}

impl MultipartWriter {
    pub fn new() -> Self {
        Self::with_boundary(gen_boundary())
    }

    pub fn with_boundary(boundary: String) -> Self {
        Self {
            boundary,
            buf: Vec::new(),
            parts: 0,
        }
    }

    /// Value for the request `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn write_part(&mut self, field_name: &str, data: FormData) -> Result<(), BuildError> {
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self.buf
            .extend_from_slice(encode_headers(field_name, &data).as_bytes());
        self.buf.extend_from_slice(b"\r\n\r\n");

        match data.contents {
            FormContents::Text(text) => self.buf.extend_from_slice(text.as_bytes()),
            FormContents::Stream(mut reader) => {
                reader.read_to_end(&mut self.buf)?;
            }
        }

        self.buf.extend_from_slice(b"\r\n");
        self.parts += 1;
        Ok(())
    }

    /// Writes the closing boundary and returns the encoded payload.
    pub fn finish(mut self) -> Bytes {
        self.buf.extend_from_slice(b"--");
        self.buf.extend_from_slice(self.boundary.as_bytes());
        self.buf.extend_from_slice(b"--\r\n");
        tracing::trace!(parts = self.parts, bytes = self.buf.len(), "multipart body encoded");
        Bytes::from(self.buf)
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn gen_boundary() -> String {
    format!("{:016x}{:016x}", random::<u64>(), random::<u64>())
}

fn encode_headers(field_name: &str, data: &FormData) -> String {
    let mut headers = format!(
        "Content-Disposition: form-data; name=\"{}\"",
        escape_quoted(field_name)
    );
    if let Some(file_name) = data.file_name.as_deref() {
        headers.push_str("; filename=\"");
        headers.push_str(&escape_quoted(file_name));
        headers.push('"');
    }

    let content_type = match (data.content_type.as_deref(), data.file_name.is_some()) {
        (Some(content_type), _) if !content_type.is_empty() => Some(content_type),
        (_, true) => Some(DEFAULT_FILE_CONTENT_TYPE),
        _ => None,
    };
    if let Some(content_type) = content_type {
        headers.push_str("\r\nContent-Type: ");
        headers.push_str(&strip_line_breaks(content_type));
    }
    headers
}

/// Escapes `\` and `"` for a quoted header parameter and drops CR/LF.
fn escape_quoted(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\r' | '\n' => {}
            other => escaped.push(other),
        }
    }
    escaped
}

fn strip_line_breaks(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn text_part(value: &str) -> FormData {
        FormData {
            file_name: None,
            content_type: None,
            contents: FormContents::from(value),
        }
    }

    #[test]
    fn boundary_is_32_hex_chars() {
        let boundary = gen_boundary();
        assert_eq!(boundary.len(), 32);
        assert!(boundary.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn encodes_text_and_file_parts() {
        let mut writer = MultipartWriter::with_boundary("XYZ".to_owned());
        writer.write_part("greeting", text_part("Hello")).unwrap();
        writer
            .write_part(
                "file",
                FormData {
                    file_name: Some("notes.txt".to_owned()),
                    content_type: Some("text/plain".to_owned()),
                    contents: FormContents::Stream(Box::new(Cursor::new(b"file body".to_vec()))),
                },
            )
            .unwrap();
        let body = writer.finish();

        let expected = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"greeting\"\r\n\r\n\
            Hello\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"notes.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file body\r\n\
            --XYZ--\r\n";
        assert_eq!(String::from_utf8(body.to_vec()).unwrap(), expected);
    }

    #[test]
    fn file_part_defaults_to_octet_stream() {
        let data = FormData {
            file_name: Some("a.bin".to_owned()),
            content_type: None,
            contents: FormContents::from(""),
        };
        let headers = encode_headers("upload", &data);
        assert!(headers.ends_with("Content-Type: application/octet-stream"));
    }

    #[test]
    fn quotes_and_line_breaks_are_neutralized() {
        let data = FormData {
            file_name: Some("evil\"\r\nX-Injected: 1.txt".to_owned()),
            content_type: None,
            contents: FormContents::from(""),
        };
        let headers = encode_headers("na\\me", &data);
        assert!(headers.contains("name=\"na\\\\me\""));
        assert!(headers.contains("filename=\"evil\\\"X-Injected: 1.txt\""));
        assert_eq!(headers.matches("\r\n").count(), 1);
    }

    #[test]
    fn content_type_uses_boundary() {
        let writer = MultipartWriter::with_boundary("abc123".to_owned());
        assert_eq!(
            writer.content_type(),
            "multipart/form-data; boundary=abc123"
        );
    }
}
