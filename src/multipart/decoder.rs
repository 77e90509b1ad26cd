//! Lazy multipart decoder.

use std::io::{self, Read, Seek, SeekFrom};

use super::headers::{boundary, HeaderValue};
use super::scanner::Scanner;
use super::MultipartError;

/// Longest accepted part header line.
const MAX_HEADER_LINE: usize = 8 * 1024;

/// Most header lines accepted for one part.
const MAX_PART_HEADERS: usize = 32;

/// One decoded part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartField {
    pub name: String,
    pub headers: Vec<(String, String)>,
    pub kind: PartKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartKind {
    /// Inline field, decoded eagerly.
    Field(String),
    /// File upload; only its byte range is recorded.
    File(FilePart),
}

impl MultipartField {
    pub fn value(&self) -> Option<&str> {
        match &self.kind {
            PartKind::Field(value) => Some(value),
            PartKind::File(_) => None,
        }
    }

    pub fn file(&self) -> Option<&FilePart> {
        match &self.kind {
            PartKind::File(file) => Some(file),
            PartKind::Field(_) => None,
        }
    }
}

/// Byte range of an uploaded file inside the body stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    /// Absolute offset of the first content byte.
    pub start: u64,
    /// Exclusive end offset.
    pub end: u64,
}

impl FilePart {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }

    /// Read the file's bytes from `source`, restoring its position afterwards.
    pub fn read_from<S: Read + Seek>(&self, source: &mut S) -> io::Result<Vec<u8>> {
        let saved = source.stream_position()?;
        source.seek(SeekFrom::Start(self.start))?;
        let mut out = vec![0u8; self.size() as usize];
        let result = source.read_exact(&mut out);
        source.seek(SeekFrom::Start(saved))?;
        result.map(|_| out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Before the first boundary; the preamble is skipped.
    Preamble,
    /// Cursor sits on a boundary marker.
    AtBoundary,
    Done,
}

/// Single-pass, non-restartable iterator over the parts of a multipart body.
///
/// A malformed body ends the iteration early; whatever was decoded up to
/// that point stays valid and the cause is available from [`error`].
///
/// [`error`]: MultipartDecoder::error
pub struct MultipartDecoder<R> {
    scanner: Scanner<R>,
    /// `--BOUNDARY`
    open: Vec<u8>,
    /// `--BOUNDARY--`
    close: Vec<u8>,
    /// `\r\n--BOUNDARY`, the end of every part's content.
    delimiter: Vec<u8>,
    state: State,
    error: Option<MultipartError>,
}

impl<R: Read> MultipartDecoder<R> {
    /// Prepare to decode `reader` using the boundary from `content_type`.
    pub fn new(reader: R, content_type: &str) -> Result<Self, MultipartError> {
        let token = boundary(content_type)?;
        let open = format!("--{}", token).into_bytes();
        let close = format!("--{}--", token).into_bytes();
        let delimiter = format!("\r\n--{}", token).into_bytes();
        Ok(Self {
            scanner: Scanner::new(reader),
            open,
            close,
            delimiter,
            state: State::Preamble,
            error: None,
        })
    }

    /// Why decoding stopped early, if it did.
    pub fn error(&self) -> Option<&MultipartError> {
        self.error.as_ref()
    }

    fn fail(&mut self, error: MultipartError) -> Option<MultipartField> {
        tracing::debug!(error = %error, "Multipart decoding stopped");
        self.error = Some(error);
        self.state = State::Done;
        None
    }

    fn next_part(&mut self) -> Result<Option<MultipartField>, MultipartError> {
        if self.state == State::Preamble {
            let open = self.open.clone();
            if self.scanner.find_delimiter(&open, None)?.is_none() {
                return Err(malformed("no opening boundary"));
            }
            self.state = State::AtBoundary;
        }

        // `--B--` and `--B\r\n` have the same length.
        let marker = self
            .scanner
            .read_exact_bytes(self.close.len())?
            .ok_or_else(|| malformed("truncated boundary"))?;
        if marker == self.close {
            self.state = State::Done;
            return Ok(None);
        }
        if !(marker.starts_with(&self.open) && &marker[self.open.len()..] == b"\r\n") {
            return Err(malformed("expected boundary marker"));
        }

        let headers = self.read_part_headers()?;
        let disposition = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-disposition"))
            .map(|(_, v)| HeaderValue::parse(v))
            .ok_or_else(|| malformed("part without Content-Disposition"))?;
        let name = disposition
            .param("name")
            .ok_or_else(|| malformed("part without a name"))?
            .to_string();

        let start = self.scanner.position();
        let delimiter = self.delimiter.clone();
        let kind = match disposition.param("filename") {
            Some(filename) => {
                let end = self
                    .scanner
                    .find_delimiter(&delimiter, None)?
                    .ok_or_else(|| malformed("unterminated file part"))?;
                let content_type = headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                PartKind::File(FilePart {
                    filename: filename.to_string(),
                    content_type,
                    start,
                    end,
                })
            }
            None => {
                let mut value = Vec::new();
                self.scanner
                    .find_delimiter(&delimiter, Some(&mut value))?
                    .ok_or_else(|| malformed("unterminated field part"))?;
                PartKind::Field(String::from_utf8_lossy(&value).into_owned())
            }
        };

        // Step over the CRLF so the cursor lands on the next `--B`.
        self.scanner.advance(2);

        Ok(Some(MultipartField { name, headers, kind }))
    }

    fn read_part_headers(&mut self) -> Result<Vec<(String, String)>, MultipartError> {
        let mut headers = Vec::new();
        loop {
            let line = self
                .scanner
                .read_line(MAX_HEADER_LINE)?
                .ok_or_else(|| malformed("unterminated part headers"))?;
            if line.is_empty() {
                return Ok(headers);
            }
            if headers.len() == MAX_PART_HEADERS {
                return Err(malformed("too many part headers"));
            }
            let line = String::from_utf8_lossy(&line);
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| malformed("part header without ':'"))?;
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }
}

impl<R: Read> Iterator for MultipartDecoder<R> {
    type Item = MultipartField;

    fn next(&mut self) -> Option<MultipartField> {
        if self.state == State::Done {
            return None;
        }
        match self.next_part() {
            Ok(part) => part,
            Err(e) => self.fail(e),
        }
    }
}

fn malformed(reason: &str) -> MultipartError {
    MultipartError::MalformedMultipart(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::scanner::CHUNK_SIZE;
    use std::io::Cursor;

    const CT: &str = "multipart/form-data; boundary=XyZ";

    fn body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, filename, content) in parts {
            out.extend_from_slice(b"--XyZ\r\n");
            match filename {
                Some(f) => out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                        name, f
                    )
                    .as_bytes(),
                ),
                None => out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                ),
            }
            out.extend_from_slice(content);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--XyZ--\r\n");
        out
    }

    #[test]
    fn decodes_fields_and_files_in_order() {
        let data = body(&[
            ("title", None, b"hello world"),
            ("avatar", Some("me.png"), b"\x89PNG\r\n binary"),
            ("empty", None, b""),
        ]);
        let fields: Vec<_> = MultipartDecoder::new(data.as_slice(), CT).unwrap().collect();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0].name, "title");
        assert_eq!(fields[0].value(), Some("hello world"));
        assert_eq!(fields[1].name, "avatar");
        let file = fields[1].file().unwrap();
        assert_eq!(file.filename, "me.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(&data[file.start as usize..file.end as usize], b"\x89PNG\r\n binary");
        assert_eq!(fields[2].value(), Some(""));
    }

    #[test]
    fn file_ranges_do_not_overlap() {
        let data = body(&[
            ("a", Some("a.bin"), &[1u8; 100]),
            ("b", Some("b.bin"), &[2u8; 20_000]),
            ("c", Some("c.bin"), &[3u8; 7]),
        ]);
        let files: Vec<FilePart> = MultipartDecoder::new(data.as_slice(), CT)
            .unwrap()
            .filter_map(|f| f.file().cloned())
            .collect();

        assert_eq!(files.len(), 3);
        let total: u64 = files.iter().map(FilePart::size).sum();
        assert_eq!(total, 20_107);
        assert!(total <= data.len() as u64);
        for pair in files.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        assert!(files.iter().all(|f| f.end <= data.len() as u64));
    }

    const FILE_HEADER: &[u8] =
        b"--XyZ\r\nContent-Disposition: form-data; name=\"f\"; filename=\"x\"\r\nContent-Type: image/png\r\n\r\n";

    #[test]
    fn boundary_split_across_chunk_edge() {
        // The file's closing delimiter straddles the first 8 KiB read.
        let content_len = CHUNK_SIZE - FILE_HEADER.len() - 4;
        let content = vec![b'q'; content_len];
        let data = body(&[("f", Some("x"), &content), ("after", None, b"ok")]);
        assert_eq!(&data[..FILE_HEADER.len()], FILE_HEADER);

        let fields: Vec<_> = MultipartDecoder::new(data.as_slice(), CT).unwrap().collect();
        assert_eq!(fields.len(), 2);
        let file = fields[0].file().unwrap();
        assert_eq!(file.size(), content_len as u64);
        assert_eq!(fields[1].value(), Some("ok"));
    }

    #[test]
    fn every_split_offset_near_chunk_edge() {
        for shift in 0..12 {
            let content = vec![b'z'; CHUNK_SIZE - FILE_HEADER.len() - 10 + shift];
            let data = body(&[("f", Some("x"), &content)]);
            let fields: Vec<_> = MultipartDecoder::new(data.as_slice(), CT).unwrap().collect();
            assert_eq!(fields.len(), 1, "shift {}", shift);
            assert_eq!(fields[0].file().unwrap().size(), content.len() as u64);
        }
    }

    #[test]
    fn file_bytes_read_lazily_and_position_restored() {
        let data = body(&[("doc", Some("d.txt"), b"file body")]);
        let fields: Vec<_> = MultipartDecoder::new(data.as_slice(), CT).unwrap().collect();
        let file = fields[0].file().unwrap();

        let mut source = Cursor::new(data.clone());
        source.set_position(3);
        assert_eq!(file.read_from(&mut source).unwrap(), b"file body");
        assert_eq!(source.position(), 3);
    }

    #[test]
    fn skips_preamble() {
        let mut data = b"this is a preamble\r\n".to_vec();
        data.extend(body(&[("a", None, b"1")]));
        let fields: Vec<_> = MultipartDecoder::new(data.as_slice(), CT).unwrap().collect();
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn malformed_body_yields_partial_result() {
        let mut data = body(&[("a", None, b"1")]);
        data.truncate(data.len() - "--XyZ--\r\n".len());
        data.extend_from_slice(b"--XyZ\r\nContent-Disposition: form-data; name=\"b\"\r\n\r\nno end");

        let mut decoder = MultipartDecoder::new(data.as_slice(), CT).unwrap();
        let first = decoder.next().unwrap();
        assert_eq!(first.value(), Some("1"));
        assert!(decoder.next().is_none());
        assert!(matches!(decoder.error(), Some(MultipartError::MalformedMultipart(_))));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn garbage_after_part_stops_decoding() {
        let data = b"--XyZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nv\r\n--XyZjunk\r\n".to_vec();
        let fields: Vec<_> = MultipartDecoder::new(data.as_slice(), CT).unwrap().collect();
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn rejects_non_multipart_content_type() {
        let err = MultipartDecoder::new(&b""[..], "text/plain").err().unwrap();
        assert!(matches!(err, MultipartError::InvalidContentType(_)));
    }
}
