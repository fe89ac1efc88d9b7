// Datagram wire format.
//
// Request:  [0..4) opcode, u32 big-endian | [4..) encoded image bytes
// Reply:    ASCII acknowledgement, optionally followed by a space and the request id.
//
// One datagram is one request; there is no fragmentation, retry or ordering.

use crate::error::ProtocolError;
use crate::pipeline::PipelineStep;
use crate::registry::{Opcode, Operation};

/// Largest UDP payload over IPv4 (65535 - 8 byte UDP header - 20 byte IP header).
pub const MAX_DATAGRAM_SIZE: usize = 65507;
pub const HEADER_LEN: usize = 4;
pub const MAX_PAYLOAD_SIZE: usize = MAX_DATAGRAM_SIZE - HEADER_LEN;
pub const ACK_TEXT: &str = "Image processed successfully";

/// A framed request, borrowing its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramRequest<'a> {
    pub opcode: Opcode,
    pub payload: &'a [u8],
}

impl<'a> DatagramRequest<'a> {
    pub fn decode(datagram: &'a [u8]) -> Result<Self, ProtocolError> {
        if datagram.len() > MAX_DATAGRAM_SIZE {
            return Err(ProtocolError::Oversized {
                len: datagram.len(),
                max: MAX_DATAGRAM_SIZE,
            });
        }
        let Some((header, payload)) = datagram.split_first_chunk::<HEADER_LEN>() else {
            return Err(ProtocolError::TooShort { len: datagram.len() });
        };
        Ok(Self {
            opcode: Opcode::from_be_bytes(*header),
            payload,
        })
    }

    pub fn operation(&self) -> Option<Operation> {
        Operation::from_opcode(self.opcode)
    }

    /// The single pipeline step this request asks for. Rotations use the default angle.
    pub fn step(&self) -> PipelineStep {
        PipelineStep::from_opcode(self.opcode)
    }
}

/// Frames `opcode` and `payload` into one datagram.
pub fn encode_request(opcode: Opcode, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = HEADER_LEN + payload.len();
    if len > MAX_DATAGRAM_SIZE {
        return Err(ProtocolError::Oversized {
            len,
            max: MAX_DATAGRAM_SIZE,
        });
    }
    let mut datagram = Vec::with_capacity(len);
    datagram.extend_from_slice(&opcode.to_be_bytes());
    datagram.extend_from_slice(payload);
    Ok(datagram)
}

/// Builds the reply text. `request_id` is appended when results are stored per request.
pub fn acknowledgement(request_id: Option<&str>) -> String {
    match request_id {
        Some(id) => format!("{ACK_TEXT} {id}"),
        None => ACK_TEXT.to_string(),
    }
}

/// A parsed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub text: String,
    pub request_id: Option<String>,
}

impl Acknowledgement {
    pub fn parse(reply: &[u8]) -> Result<Self, ProtocolError> {
        let text = String::from_utf8_lossy(reply).into_owned();
        let Some(rest) = text.strip_prefix(ACK_TEXT) else {
            return Err(ProtocolError::UnexpectedReply(text));
        };
        let request_id = match rest.strip_prefix(' ') {
            Some(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
            _ if rest.trim().is_empty() => None,
            _ => return Err(ProtocolError::UnexpectedReply(text)),
        };
        Ok(Self { text, request_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_big_endian_opcode_and_payload() {
        let datagram = [0, 0, 0, 14, 0xFF, 0xD8, 0xFF];
        let request = DatagramRequest::decode(&datagram).expect("valid datagram");
        assert_eq!(request.opcode, 14);
        assert_eq!(request.payload, &[0xFF, 0xD8, 0xFF]);
        assert_eq!(request.operation(), Some(Operation::Achromatopsia));
    }

    #[test]
    fn short_datagrams_are_malformed() {
        for len in 0..HEADER_LEN {
            let datagram = vec![1u8; len];
            let err = DatagramRequest::decode(&datagram).unwrap_err();
            assert!(matches!(err, ProtocolError::TooShort { len: l } if l == len));
            assert!(err.is_malformed_request());
        }
    }

    #[test]
    fn header_only_datagram_has_empty_payload() {
        let request = DatagramRequest::decode(&[0, 0, 1, 0]).expect("valid datagram");
        assert_eq!(request.opcode, 256);
        assert!(request.payload.is_empty());
        assert!(request.operation().is_none());
        assert!(request.step().is_identity());
    }

    #[test]
    fn oversized_datagrams_are_malformed() {
        let datagram = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        let err = DatagramRequest::decode(&datagram).unwrap_err();
        assert!(matches!(err, ProtocolError::Oversized { len, .. } if len == MAX_DATAGRAM_SIZE + 1));
        assert!(err.is_malformed_request());

        let largest = vec![0u8; MAX_DATAGRAM_SIZE];
        assert!(DatagramRequest::decode(&largest).is_ok());
    }

    #[test]
    fn encode_refuses_payloads_over_the_limit() {
        assert!(encode_request(1, &vec![0u8; MAX_PAYLOAD_SIZE]).is_ok());
        assert!(matches!(
            encode_request(1, &vec![0u8; MAX_PAYLOAD_SIZE + 1]),
            Err(ProtocolError::Oversized { .. })
        ));
    }

    #[test]
    fn encoded_request_decodes_back() {
        let datagram = encode_request(Operation::Daltonize.opcode(), b"image").expect("fits");
        assert_eq!(&datagram[..4], &[0, 0, 0, 16]);
        let request = DatagramRequest::decode(&datagram).expect("valid datagram");
        assert_eq!(request.operation(), Some(Operation::Daltonize));
        assert_eq!(request.payload, b"image");
    }

    #[test]
    fn acknowledgement_carries_optional_request_id() {
        assert_eq!(acknowledgement(None), "Image processed successfully");
        let ack = acknowledgement(Some("18c2f-7"));
        assert_eq!(ack, "Image processed successfully 18c2f-7");

        let parsed = Acknowledgement::parse(ack.as_bytes()).expect("ack");
        assert_eq!(parsed.request_id.as_deref(), Some("18c2f-7"));
        let bare = Acknowledgement::parse(ACK_TEXT.as_bytes()).expect("ack");
        assert_eq!(bare.request_id, None);
    }

    #[test]
    fn foreign_replies_are_rejected() {
        assert!(matches!(
            Acknowledgement::parse(b"hello"),
            Err(ProtocolError::UnexpectedReply(_))
        ));
        assert!(matches!(
            Acknowledgement::parse(b"Image processed successfullyX"),
            Err(ProtocolError::UnexpectedReply(_))
        ));
    }
}
