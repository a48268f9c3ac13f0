//! Peer wire protocol messages.
//!
//! Grounded on `peer/message/message.rs`'s `MessageId`/`Message` pair; the
//! difference is that payloads for `Request`/`Piece`/`Have` are parsed into
//! their fields here rather than left as raw bytes, since every caller needs
//! them decoded.

use crate::byte_tools::{bytes_to_u32, u32_to_bytes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageId {
    Choke = 0,
    Unchoke = 1,
    Interested = 2,
    NotInterested = 3,
    Have = 4,
    Bitfield = 5,
    Request = 6,
    Piece = 7,
    Cancel = 8,
    Port = 9,
}

impl MessageId {
    fn from_u8(value: u8) -> Result<Self, WireError> {
        match value {
            0 => Ok(MessageId::Choke),
            1 => Ok(MessageId::Unchoke),
            2 => Ok(MessageId::Interested),
            3 => Ok(MessageId::NotInterested),
            4 => Ok(MessageId::Have),
            5 => Ok(MessageId::Bitfield),
            6 => Ok(MessageId::Request),
            7 => Ok(MessageId::Piece),
            8 => Ok(MessageId::Cancel),
            9 => Ok(MessageId::Port),
            other => Err(WireError::UnknownMessageId(other)),
        }
    }
}

#[derive(Debug)]
pub enum WireError {
    UnknownMessageId(u8),
    TruncatedPayload,
}

/// A decoded block request or cancellation: `index | offset | length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub piece_index: u32,
    pub offset: u32,
    pub length: u32,
}

/// A decoded `Piece` message carrying the block bytes for one request.
#[derive(Debug, Clone)]
pub struct BlockPayload {
    pub piece_index: u32,
    pub offset: u32,
    pub data: Vec<u8>,
}

/// One parsed peer-wire message, or a keep-alive.
#[derive(Debug, Clone)]
pub enum Message {
    KeepAlive,
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield(Vec<u8>),
    Request(BlockRequest),
    Piece(BlockPayload),
    Cancel(BlockRequest),
    Port(u16),
}

impl Message {
    /// Parses a message body (everything after the 4-byte length prefix).
    /// An empty body is a keep-alive.
    pub fn decode(body: &[u8]) -> Result<Self, WireError> {
        if body.is_empty() {
            return Ok(Message::KeepAlive);
        }
        let id = MessageId::from_u8(body[0])?;
        let payload = &body[1..];
        match id {
            MessageId::Choke => Ok(Message::Choke),
            MessageId::Unchoke => Ok(Message::Unchoke),
            MessageId::Interested => Ok(Message::Interested),
            MessageId::NotInterested => Ok(Message::NotInterested),
            MessageId::Have => Ok(Message::Have {
                piece_index: bytes_to_u32(payload).ok_or(WireError::TruncatedPayload)?,
            }),
            MessageId::Bitfield => Ok(Message::Bitfield(payload.to_vec())),
            MessageId::Request => Ok(Message::Request(decode_block_request(payload)?)),
            MessageId::Cancel => Ok(Message::Cancel(decode_block_request(payload)?)),
            MessageId::Piece => Ok(Message::Piece(decode_block_payload(payload)?)),
            MessageId::Port => {
                let bytes = payload.get(0..2).ok_or(WireError::TruncatedPayload)?;
                Ok(Message::Port(u16::from_be_bytes([bytes[0], bytes[1]])))
            }
        }
    }

    /// Encodes this message as a full frame, including the 4-byte length
    /// prefix (id byte included in the length, as the wire format requires).
    pub fn encode(&self) -> Vec<u8> {
        let (id, payload) = match self {
            Message::KeepAlive => return u32_to_bytes(0).to_vec(),
            Message::Choke => (MessageId::Choke, Vec::new()),
            Message::Unchoke => (MessageId::Unchoke, Vec::new()),
            Message::Interested => (MessageId::Interested, Vec::new()),
            Message::NotInterested => (MessageId::NotInterested, Vec::new()),
            Message::Have { piece_index } => {
                (MessageId::Have, u32_to_bytes(*piece_index).to_vec())
            }
            Message::Bitfield(bits) => (MessageId::Bitfield, bits.clone()),
            Message::Request(req) => (MessageId::Request, encode_block_request(req)),
            Message::Cancel(req) => (MessageId::Cancel, encode_block_request(req)),
            Message::Piece(payload) => (MessageId::Piece, encode_block_payload(payload)),
            Message::Port(port) => (MessageId::Port, port.to_be_bytes().to_vec()),
        };

        let len = (payload.len() + 1) as u32;
        let mut frame = Vec::with_capacity(4 + len as usize);
        frame.extend_from_slice(&u32_to_bytes(len));
        frame.push(id as u8);
        frame.extend_from_slice(&payload);
        frame
    }
}

fn decode_block_request(payload: &[u8]) -> Result<BlockRequest, WireError> {
    if payload.len() < 12 {
        return Err(WireError::TruncatedPayload);
    }
    Ok(BlockRequest {
        piece_index: bytes_to_u32(&payload[0..4]).ok_or(WireError::TruncatedPayload)?,
        offset: bytes_to_u32(&payload[4..8]).ok_or(WireError::TruncatedPayload)?,
        length: bytes_to_u32(&payload[8..12]).ok_or(WireError::TruncatedPayload)?,
    })
}

fn encode_block_request(req: &BlockRequest) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(12);
    bytes.extend_from_slice(&u32_to_bytes(req.piece_index));
    bytes.extend_from_slice(&u32_to_bytes(req.offset));
    bytes.extend_from_slice(&u32_to_bytes(req.length));
    bytes
}

fn decode_block_payload(payload: &[u8]) -> Result<BlockPayload, WireError> {
    if payload.len() < 8 {
        return Err(WireError::TruncatedPayload);
    }
    Ok(BlockPayload {
        piece_index: bytes_to_u32(&payload[0..4]).ok_or(WireError::TruncatedPayload)?,
        offset: bytes_to_u32(&payload[4..8]).ok_or(WireError::TruncatedPayload)?,
        data: payload[8..].to_vec(),
    })
}

fn encode_block_payload(payload: &BlockPayload) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + payload.data.len());
    bytes.extend_from_slice(&u32_to_bytes(payload.piece_index));
    bytes.extend_from_slice(&u32_to_bytes(payload.offset));
    bytes.extend_from_slice(&payload.data);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keep_alive_round_trips() {
        let frame = Message::KeepAlive.encode();
        assert_eq!(frame, vec![0, 0, 0, 0]);
        // Body after the length prefix is empty.
        assert!(matches!(Message::decode(&[]).unwrap(), Message::KeepAlive));
    }

    #[test]
    fn choke_has_no_payload() {
        let frame = Message::Choke.encode();
        assert_eq!(frame, vec![0, 0, 0, 1, 0]);
    }

    #[test]
    fn request_round_trips() {
        let request = BlockRequest {
            piece_index: 3,
            offset: 16384,
            length: 16384,
        };
        let frame = Message::Request(request).encode();
        let body = &frame[4..];
        let decoded = Message::decode(body).unwrap();
        match decoded {
            Message::Request(req) => assert_eq!(req, request),
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn piece_round_trips_with_block_data() {
        let payload = BlockPayload {
            piece_index: 1,
            offset: 0,
            data: vec![1, 2, 3, 4],
        };
        let frame = Message::Piece(payload.clone()).encode();
        let body = &frame[4..];
        match Message::decode(body).unwrap() {
            Message::Piece(decoded) => {
                assert_eq!(decoded.piece_index, payload.piece_index);
                assert_eq!(decoded.offset, payload.offset);
                assert_eq!(decoded.data, payload.data);
            }
            other => panic!("expected Piece, got {other:?}"),
        }
    }

    #[test]
    fn unknown_message_id_is_rejected() {
        let result = Message::decode(&[200]);
        assert!(matches!(result, Err(WireError::UnknownMessageId(200))));
    }

    #[test]
    fn truncated_request_payload_is_rejected() {
        let result = Message::decode(&[MessageId::Request as u8, 0, 0]);
        assert!(matches!(result, Err(WireError::TruncatedPayload)));
    }
}
