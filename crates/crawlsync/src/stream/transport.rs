//! Transport seam for the push channel.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{DecodeError, StreamError};

/// Close code and reason sent by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

/// One inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    /// The peer closed the channel.
    Close(Option<CloseInfo>),
}

/// An open push channel.
#[async_trait]
pub trait EventChannel: Send {
    /// Waits for the next frame. `None` means the channel ended without a
    /// close frame.
    async fn recv(&mut self) -> Option<Result<Frame, StreamError>>;

    /// Closes the channel from our side.
    async fn close(&mut self);
}

/// Opens push channels.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn EventChannel>, StreamError>;
}

/// Decodes a data frame into a raw JSON payload. Close frames carry no
/// payload and are reported as `Ok(None)`.
pub fn decode_frame(frame: &Frame) -> Result<Option<Value>, DecodeError> {
    let text = match frame {
        Frame::Text(text) => text.as_str(),
        Frame::Binary(bytes) => std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?,
        Frame::Close(_) => return Ok(None),
    };
    Ok(Some(serde_json::from_str(text)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_text() {
        let frame = Frame::Text(r#"{"ID": 1, "status": "PENDING"}"#.to_string());
        assert_eq!(
            decode_frame(&frame).unwrap(),
            Some(json!({"ID": 1, "status": "PENDING"}))
        );
    }

    #[test]
    fn test_decode_binary() {
        let frame = Frame::Binary(br#"{"id": 2}"#.to_vec());
        assert_eq!(decode_frame(&frame).unwrap(), Some(json!({"id": 2})));
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_frame(&Frame::Text("{not json".to_string())),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            decode_frame(&Frame::Binary(vec![0xff, 0xfe])),
            Err(DecodeError::NotUtf8)
        ));
    }

    #[test]
    fn test_close_has_no_payload() {
        let frame = Frame::Close(Some(CloseInfo {
            code: 1000,
            reason: String::new(),
        }));
        assert_eq!(decode_frame(&frame).unwrap(), None);
    }
}
