//! Tokio codec for framed protocol messages
//!
//! Frames that cannot be understood (unknown type byte, malformed JSON, or a
//! payload whose `type` disagrees with the header) are dropped and decoding
//! continues with the next frame.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::{FrameHeader, MAX_PAYLOAD_SIZE};
use crate::message::Message;

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
    /// Payload bytes still to discard from a skipped frame
    discard: usize,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.discard > 0 {
                let n = self.discard.min(src.len());
                src.advance(n);
                self.discard -= n;
                if self.discard > 0 {
                    return Ok(None);
                }
            }

            let header = match self.pending_header.take() {
                Some(h) => h,
                None => match FrameHeader::decode(src) {
                    Ok(Some(h)) => h,
                    Ok(None) => return Ok(None),
                    Err(ProtocolError::UnknownMessageType {
                        message_type,
                        payload_length,
                    }) => {
                        tracing::debug!(message_type, payload_length, "Skipping unknown frame");
                        self.discard = payload_length as usize;
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            let payload_len = header.payload_length as usize;
            if src.len() < payload_len {
                self.pending_header = Some(header);
                src.reserve(payload_len - src.len());
                return Ok(None);
            }

            let payload = src.split_to(payload_len).freeze();

            match serde_json::from_slice::<Message>(&payload) {
                Ok(message) if message.message_type() == header.message_type => {
                    return Ok(Some(message));
                }
                Ok(message) => {
                    tracing::debug!(
                        header = %header.message_type,
                        payload = %message.message_type(),
                        "Skipping frame with mismatched type"
                    );
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping undecodable frame");
                }
            }
        }
    }
}

impl Encoder<Message> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&message)?;
        let payload_len = payload.len();

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_len,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        let header = FrameHeader::new(message.message_type(), payload_len as u32);
        header.encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::CorrelationId;
    use crate::frame::HEADER_SIZE;
    use crate::message::MessageType;
    use bytes::BufMut;

    fn raw_frame(type_byte: u8, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u8(type_byte);
        buf.put_u8((payload.len() >> 16) as u8);
        buf.put_u16(payload.len() as u16);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn test_codec_health_reply() {
        let mut codec = FrameCodec::new();
        let message = Message::HealthCheck {
            id: CorrelationId::from("1"),
            is_healthy: Some(true),
        };

        let mut buf = BytesMut::new();
        codec.encode(message.clone(), &mut buf).unwrap();
        assert_eq!(buf[0], MessageType::HealthCheck.as_u8());

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, message);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_partial_read() {
        let mut codec = FrameCodec::new();

        let mut full_buf = BytesMut::new();
        codec
            .encode(Message::Ready { id: None }, &mut full_buf)
            .unwrap();

        let mut partial = full_buf.split_to(HEADER_SIZE + 2);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        partial.extend_from_slice(&full_buf);
        let decoded = codec.decode(&mut partial).unwrap().unwrap();
        assert_eq!(decoded, Message::Ready { id: None });
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let mut codec = FrameCodec::new();
        let mut buf = raw_frame(0x7E, b"{\"type\":\"WHATEVER\"}");
        buf.extend_from_slice(&raw_frame(0x02, b"{\"type\":\"READY\"}"));

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Message::Ready { id: None });
    }

    #[test]
    fn test_unknown_type_skipped_across_reads() {
        let mut codec = FrameCodec::new();
        let junk = raw_frame(0x7E, &[b'x'; 32]);
        let mut buf = BytesMut::from(&junk[..10]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&junk[10..]);
        buf.extend_from_slice(&raw_frame(0x02, b"{\"type\":\"READY\"}"));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::Ready { id: None })
        );
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        let mut codec = FrameCodec::new();
        let mut buf = raw_frame(0x01, b"{not json");
        buf.extend_from_slice(&raw_frame(
            0x01,
            b"{\"type\":\"HEALTH_CHECK\",\"id\":\"7\",\"isHealthy\":true}",
        ));

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.correlation_id().unwrap().as_str(), "7");
    }

    #[test]
    fn test_mismatched_header_type_is_skipped() {
        let mut codec = FrameCodec::new();
        let mut buf = raw_frame(0x01, b"{\"type\":\"READY\"}");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }
}
