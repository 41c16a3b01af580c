//! Decoding of raw inbound frames.
//!
//! Frames are UTF-8 JSON objects. Text and binary transport messages are
//! decoded the same way; the transport hands this module raw bytes.

use thiserror::Error;

use crate::event::InboundEvent;

/// Default maximum frame size (64 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Errors raised while decoding a frame.
///
/// A decode error only ever affects the frame that produced it.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Frame exceeds the configured maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Frame bytes are not valid UTF-8.
    #[error("Frame is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// Frame is not a JSON object with a string `type`.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode a frame using the default size limit.
///
/// # Errors
///
/// Returns an error if the frame is too large, not UTF-8, or malformed.
pub fn decode(data: &[u8]) -> Result<InboundEvent, DecodeError> {
    FrameDecoder::new().decode(data)
}

/// Decode a text frame using the default size limit.
///
/// # Errors
///
/// Returns an error if the frame is too large or malformed.
pub fn decode_str(text: &str) -> Result<InboundEvent, DecodeError> {
    FrameDecoder::new().decode(text.as_bytes())
}

/// Encode an event as a text frame.
///
/// The client never sends events; this exists for test servers and tooling.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized.
pub fn encode(event: &InboundEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

/// Frame decoder with a size limit.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    max_frame_size: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default size limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a decoder with a specific size limit.
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Decode a single frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large, not UTF-8, or malformed.
    pub fn decode(&self, data: &[u8]) -> Result<InboundEvent, DecodeError> {
        if data.len() > self.max_frame_size {
            return Err(DecodeError::FrameTooLarge {
                size: data.len(),
                max: self.max_frame_size,
            });
        }

        let text = std::str::from_utf8(data)?;
        let event = serde_json::from_str(text)?;
        Ok(event)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_decode_known_event() {
        let event = decode_str(r#"{"type":"job_update","payload":{}}"#).unwrap();
        assert_eq!(event.kind, EventKind::JobUpdate);
    }

    #[test]
    fn test_decode_unknown_event_is_not_an_error() {
        let event = decode_str(r#"{"type":"timesheet_locked","payload":null}"#).unwrap();
        assert_eq!(event.kind, EventKind::Unknown("timesheet_locked".into()));
    }

    #[test]
    fn test_decode_not_json() {
        match decode_str("not json") {
            Err(DecodeError::Malformed(_)) => {}
            other => panic!("Expected Malformed error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_non_object_json() {
        assert!(decode_str(r#""job_update""#).is_err());
        assert!(decode_str("[1,2,3]").is_err());
        assert!(decode_str("").is_err());
    }

    #[test]
    fn test_decode_invalid_utf8() {
        match decode(&[0xff, 0xfe, b'{']) {
            Err(DecodeError::Utf8(_)) => {}
            other => panic!("Expected Utf8 error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let decoder = FrameDecoder::with_max_frame_size(16);
        let frame = br#"{"type":"job_update","payload":{"note":"long"}}"#;

        match decoder.decode(frame) {
            Err(DecodeError::FrameTooLarge { size, max }) => {
                assert_eq!(size, frame.len());
                assert_eq!(max, 16);
            }
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_matches_wire_format() {
        let event = decode_str(r#"{"type":"client_message","payload":{"threadId":"t-9"}}"#).unwrap();
        let text = encode(&event).unwrap();
        assert_eq!(decode_str(&text).unwrap(), event);
    }
}
