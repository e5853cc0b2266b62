//! Line protocol codec: one JSON object per `\n`-terminated line.
//!
//! Requests travel parent → child as [`RequestFrame`]s and replies come back
//! as [`ResponseFrame`]s. There is no batching and no multiplexing: one line
//! out, one line in.

use std::io::{self, BufRead};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, AssistantResult};

/// Maximum size of a single frame (10 MiB).
pub const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// JSON-RPC version tag written on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request sent to a child tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    pub jsonrpc: String,
    /// Caller-assigned; never matched against replies.
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl RequestFrame {
    pub fn new(id: u64, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A reply read back from a child tool server.
///
/// Either side may be absent; the bridge does not interpret them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
}

/// Serialize `frame` to a single line terminated by exactly one `\n`.
pub fn encode(frame: &impl Serialize) -> AssistantResult<String> {
    let mut line = serde_json::to_string(frame).map_err(|e| AssistantError::Encode {
        reason: e.to_string(),
    })?;
    if line.contains('\n') || line.contains('\r') {
        return Err(AssistantError::Encode {
            reason: "serialized frame contains a line break".to_owned(),
        });
    }
    line.push('\n');
    Ok(line)
}

/// Parse one line into a frame.
///
/// A blank line is an error here: callers treat it as "no data", never as an
/// empty result.
pub fn decode<T: DeserializeOwned>(line: &str) -> AssistantResult<T> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(AssistantError::Decode {
            reason: "empty line".to_owned(),
        });
    }
    serde_json::from_str(trimmed).map_err(|e| AssistantError::Decode {
        reason: e.to_string(),
    })
}

/// Read a line from `reader` into `buf`, stopping at newline or `max_bytes`.
///
/// Returns the number of bytes read (0 = EOF). An oversized line is consumed
/// up to and including its newline and reported as `InvalidData`.
pub fn read_line_limited(
    reader: &mut impl BufRead,
    buf: &mut String,
    max_bytes: usize,
) -> io::Result<usize> {
    let mut bytes = Vec::new();
    loop {
        let available = reader.fill_buf()?;
        if available.is_empty() {
            break;
        }
        let (consumed, found_newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        if bytes.len() + consumed > max_bytes {
            reader.consume(consumed);
            if !found_newline {
                skip_through_newline(reader)?;
            }
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds maximum size ({max_bytes} bytes)"),
            ));
        }
        bytes.extend_from_slice(&available[..consumed]);
        reader.consume(consumed);
        if found_newline {
            break;
        }
    }

    let total = bytes.len();
    let text = String::from_utf8(bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    buf.push_str(&text);
    Ok(total)
}

fn skip_through_newline(reader: &mut impl BufRead) -> io::Result<()> {
    loop {
        let rest = reader.fill_buf()?;
        if rest.is_empty() {
            return Ok(());
        }
        if let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = rest.len();
        reader.consume(len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_terminates_with_single_newline() {
        let frame = RequestFrame::new(1, "resources/read", json!({"uri": "standards://summary"}));
        let line = encode(&frame).expect("encode");
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("\"jsonrpc\":\"2.0\""));
    }

    #[test]
    fn escaped_newlines_in_params_stay_on_one_line() {
        let frame = RequestFrame::new(7, "tools/call", json!({"text": "a\nb\r\nc"}));
        let line = encode(&frame).expect("encode");
        assert_eq!(line.matches('\n').count(), 1);

        let back: RequestFrame = decode(&line).expect("decode");
        assert_eq!(back, frame);
    }

    #[test]
    fn varied_frames_survive_a_line_trip() {
        let frames = [
            RequestFrame::new(0, "ping", json!({})),
            RequestFrame::new(1, "notifications/initialized", serde_json::Value::Null),
            RequestFrame::new(
                42,
                "tools/call",
                json!({
                    "name": "resolve-library-id",
                    "arguments": {
                        "libraryName": "tokio",
                        "nested": {"depth": [1, [2, {"three": null}]]}
                    }
                }),
            ),
            RequestFrame::new(
                3,
                "resources/read",
                json!({"uri": "standards://checklist/日本語 ✓ ünïcödé"}),
            ),
            RequestFrame::new(u64::MAX, "tools/list", json!([true, false, 1.5, "tab\there"])),
        ];

        for frame in frames {
            let line = encode(&frame).expect("encode");
            assert_eq!(line.matches('\n').count(), 1, "{line}");
            let back: RequestFrame = decode(&line).expect("decode");
            assert_eq!(back, frame);
        }

        let reply = ResponseFrame {
            jsonrpc: Some(JSONRPC_VERSION.to_owned()),
            id: Some(json!("abc")),
            result: None,
            error: Some(json!({"code": -32002, "message": "not found"})),
        };
        let back: ResponseFrame = decode(&encode(&reply).expect("encode")).expect("decode");
        assert_eq!(back, reply);
    }

    #[test]
    fn decode_rejects_blank_line() {
        let err = decode::<ResponseFrame>("   \n").expect_err("blank line is rejected");
        assert!(matches!(err, AssistantError::Decode { .. }));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode::<ResponseFrame>("not json\n").expect_err("malformed line is rejected");
        assert!(matches!(err, AssistantError::Decode { .. }));
    }

    #[test]
    fn empty_result_is_not_no_result() {
        let frame: ResponseFrame =
            decode("{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}").expect("decode");
        assert_eq!(frame.result, Some(json!({})));
        assert!(frame.error.is_none());
    }

    #[test]
    fn read_line_limited_reads_one_line_at_a_time() {
        let mut reader = io::Cursor::new(b"first\nsecond\n".to_vec());
        let mut buf = String::new();
        assert_eq!(read_line_limited(&mut reader, &mut buf, 64).expect("read"), 6);
        assert_eq!(buf, "first\n");
        buf.clear();
        read_line_limited(&mut reader, &mut buf, 64).expect("read");
        assert_eq!(buf, "second\n");
        buf.clear();
        assert_eq!(read_line_limited(&mut reader, &mut buf, 64).expect("read"), 0);
    }

    #[test]
    fn read_line_limited_skips_oversized_line() {
        let input = io::Cursor::new(b"0123456789\nok\n".to_vec());
        let mut reader = io::BufReader::with_capacity(4, input);
        let mut buf = String::new();
        let err = read_line_limited(&mut reader, &mut buf, 5)
            .expect_err("oversized line is rejected");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        buf.clear();
        read_line_limited(&mut reader, &mut buf, 5).expect("next line");
        assert_eq!(buf, "ok\n");
    }
}
