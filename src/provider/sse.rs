//! Server-sent-event decoding for provider streams
//!
//! A push-based decoder: the HTTP layer feeds raw body bytes in as they
//! arrive and takes back any completed `data:` payloads. Events are
//! delimited by blank lines; consecutive `data:` lines within one event are
//! joined with newlines per the SSE framing rules.

use crate::provider::ProviderError;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<Vec<u8>>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning every event payload completed
    /// by this chunk in arrival order.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(line) = Self::drain_line(&mut self.buffer) {
            if line.is_empty() {
                if let Some(payload) = self.flush_event()? {
                    payloads.push(payload);
                }
            } else {
                self.handle_line(line);
            }
        }
        Ok(payloads)
    }

    /// Flush once the body stream ends; a final event need not be followed
    /// by a blank line.
    pub fn finish(&mut self) -> Result<Option<String>, ProviderError> {
        if !self.buffer.is_empty() {
            let line: Vec<u8> = self.buffer.drain(..).collect();
            self.handle_line(line);
        }
        self.flush_event()
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        // Non-data fields (event:, id:, retry:, comments) carry nothing the
        // provider protocol needs; only data lines accumulate.
        if let Some(rest) = line.strip_prefix(b"data:") {
            let data = match rest.first() {
                Some(b' ') => rest[1..].to_vec(),
                _ => rest.to_vec(),
            };
            self.data_lines.push(data);
        }
    }

    fn flush_event(&mut self) -> Result<Option<String>, ProviderError> {
        if self.data_lines.is_empty() {
            return Ok(None);
        }

        let mut joined = Vec::new();
        for (idx, mut segment) in self.data_lines.drain(..).enumerate() {
            if idx > 0 {
                joined.push(b'\n');
            }
            joined.append(&mut segment);
        }

        if joined.is_empty() {
            return Ok(None);
        }

        let payload = String::from_utf8(joined).map_err(|err| ProviderError::Decode {
            message: format!("invalid UTF-8 in stream event: {err}"),
        })?;
        Ok(Some(payload))
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_single_event() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: {\"text\":\"hi\"}\n\n").unwrap();
        assert_eq!(payloads, vec!["{\"text\":\"hi\"}".to_string()]);
    }

    #[test]
    fn test_joins_multiline_payloads() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: line one\ndata: line two\n\n").unwrap();
        assert_eq!(payloads, vec!["line one\nline two".to_string()]);
    }

    #[test]
    fn test_handles_chunks_split_mid_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: par").unwrap().is_empty());
        assert!(decoder.push(b"tial\n").unwrap().is_empty());
        let payloads = decoder.push(b"\n").unwrap();
        assert_eq!(payloads, vec!["partial".to_string()]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: hello\r\n\r\n").unwrap();
        assert_eq!(payloads, vec!["hello".to_string()]);
    }

    #[test]
    fn test_ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder
            .push(b": keepalive\nevent: message\ndata: x\n\n")
            .unwrap();
        assert_eq!(payloads, vec!["x".to_string()]);
    }

    #[test]
    fn test_finish_flushes_trailing_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").unwrap().is_empty());
        assert_eq!(decoder.finish().unwrap(), Some("tail".to_string()));
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_is_a_decode_error() {
        let mut decoder = SseDecoder::new();
        let err = decoder.push(b"data: \xff\n\n").unwrap_err();
        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[test]
    fn test_multiple_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.push(b"data: a\n\ndata: b\n\n").unwrap();
        assert_eq!(payloads, vec!["a".to_string(), "b".to_string()]);
    }
}
