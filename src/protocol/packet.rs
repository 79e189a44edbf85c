//! Wire codec for the length-prefixed binary frame format
//!
//! Frame layout, little-endian throughout:
//! ```text
//! +--------------+------------+--------------+-----------+-------------+
//! | size         | id         | type         | payload   | trailer     |
//! | (4 bytes)    | (4 bytes)  | (4 bytes)    | (variable)| 0x00 0x00   |
//! +--------------+------------+--------------+-----------+-------------+
//! ```
//! `size` counts everything after itself: `id + type + payload + trailer`,
//! i.e. `10 + payload_len`. The trailer is a framing marker, not payload.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ChatRelayError, Result};

/// Bytes in a frame body that are not payload: id + type + trailer.
pub const FRAME_OVERHEAD: usize = 10;

/// Upper bound on a single frame body, guarding against hostile size prefixes.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Packet types shared by requests and responses
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    // Server-scoped (0x01 - 0x0F)
    SvrConnect = 0x01,
    SvrDisconnect = 0x02,
    SvrMessage = 0x03,
    SvrBanned = 0x04,
    SvrShutdown = 0x05,

    // Channel lifecycle and traffic (0x10 - 0x1F)
    ChJoin = 0x10,
    ChLeave = 0x11,
    ChMessage = 0x12,
    ChUpdate = 0x13,
    ChDelete = 0x14,
    ChCreate = 0x15,
    ChList = 0x16,

    // Channel moderation (0x20 - 0x2F)
    ChInvite = 0x20,
    ChKick = 0x21,
    ChBan = 0x22,
    ChUnban = 0x23,

    // Server -> client outcomes (0xF0 - 0xFF)
    RequestRejected = 0xF0,
    PermissionDenied = 0xF1,
    NotFound = 0xF2,
    Heartbeat = 0xFE,
    Error = 0xFF,
}

impl PacketType {
    /// Convert from the wire value, returns None for unknown types
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x01 => Some(PacketType::SvrConnect),
            0x02 => Some(PacketType::SvrDisconnect),
            0x03 => Some(PacketType::SvrMessage),
            0x04 => Some(PacketType::SvrBanned),
            0x05 => Some(PacketType::SvrShutdown),

            0x10 => Some(PacketType::ChJoin),
            0x11 => Some(PacketType::ChLeave),
            0x12 => Some(PacketType::ChMessage),
            0x13 => Some(PacketType::ChUpdate),
            0x14 => Some(PacketType::ChDelete),
            0x15 => Some(PacketType::ChCreate),
            0x16 => Some(PacketType::ChList),

            0x20 => Some(PacketType::ChInvite),
            0x21 => Some(PacketType::ChKick),
            0x22 => Some(PacketType::ChBan),
            0x23 => Some(PacketType::ChUnban),

            0xF0 => Some(PacketType::RequestRejected),
            0xF1 => Some(PacketType::PermissionDenied),
            0xF2 => Some(PacketType::NotFound),
            0xFE => Some(PacketType::Heartbeat),
            0xFF => Some(PacketType::Error),
            _ => None,
        }
    }
}

/// Read a little-endian u32 from the start of a slice.
pub fn u32_le(bytes: &[u8]) -> Option<u32> {
    let chunk: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(u32::from_le_bytes(chunk))
}

/// Read a little-endian i32 from the start of a slice.
pub fn i32_le(bytes: &[u8]) -> Option<i32> {
    let chunk: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
    Some(i32::from_le_bytes(chunk))
}

/// A decoded client request.
///
/// `kind` stays a raw u32 so the router can answer unknown types instead of
/// the decoder rejecting them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: i32,
    pub kind: u32,
    pub payload: Vec<u8>,
}

impl Request {
    /// Decode a frame body (everything after the size prefix).
    ///
    /// Rejects bodies shorter than the header plus trailer; the payload is
    /// the slice between them.
    pub fn decode(body: &[u8]) -> Result<Self> {
        if body.len() < FRAME_OVERHEAD {
            return Err(ChatRelayError::FrameTooShort(body.len()));
        }

        let id = i32_le(&body[0..4]).ok_or(ChatRelayError::FrameTooShort(body.len()))?;
        let kind = u32_le(&body[4..8]).ok_or(ChatRelayError::FrameTooShort(body.len()))?;
        let payload = body[8..body.len() - 2].to_vec();

        Ok(Self { id, kind, payload })
    }

    /// Decode a complete frame including its 4-byte size prefix.
    pub fn decode_framed(buf: &[u8]) -> Result<Self> {
        let size = u32_le(buf).ok_or(ChatRelayError::FrameTooShort(buf.len()))? as usize;
        if size > MAX_FRAME_SIZE {
            return Err(ChatRelayError::FrameTooLarge(size));
        }
        let body = buf
            .get(4..4 + size)
            .ok_or(ChatRelayError::FrameTooShort(buf.len()))?;
        Self::decode(body)
    }
}

/// A fully framed server response, ready for the wire.
///
/// `id = -1` marks server-initiated or failure responses; `size <= 0` is the
/// do-not-transmit sentinel.
#[derive(Debug, Clone)]
pub struct Response {
    pub id: i32,
    pub size: i32,
    pub kind: PacketType,
    data: Bytes,
}

impl Response {
    /// Build a framed response from id, type and payload.
    ///
    /// The emitted buffer is `4 + size` bytes with `size = 10 + payload_len`.
    pub fn new(id: i32, kind: PacketType, payload: impl AsRef<[u8]>) -> Self {
        let payload = payload.as_ref();
        let size = (FRAME_OVERHEAD + payload.len()) as u32;

        let mut buf = BytesMut::with_capacity(4 + size as usize);
        buf.put_u32_le(size);
        buf.put_i32_le(id);
        buf.put_u32_le(kind as u32);
        buf.put_slice(payload);
        buf.put_slice(&[0x00, 0x00]);

        Self {
            id,
            size: size as i32,
            kind,
            data: buf.freeze(),
        }
    }

    /// A payload-less response.
    pub fn empty(id: i32, kind: PacketType) -> Self {
        Self::new(id, kind, [])
    }

    /// The do-not-transmit sentinel.
    pub fn skip() -> Self {
        Self {
            id: -1,
            size: -1,
            kind: PacketType::Error,
            data: Bytes::new(),
        }
    }

    pub fn should_send(&self) -> bool {
        self.size > 0
    }

    /// The complete framed bytes, size prefix included.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_roundtrip() {
        let types = [
            PacketType::SvrConnect,
            PacketType::SvrShutdown,
            PacketType::ChJoin,
            PacketType::ChMessage,
            PacketType::ChList,
            PacketType::ChUnban,
            PacketType::Heartbeat,
            PacketType::Error,
        ];

        for kind in types {
            let value = kind as u32;
            assert_eq!(PacketType::from_u32(value), Some(kind));
        }
        assert_eq!(PacketType::from_u32(0x99), None);
    }

    #[test]
    fn test_encode_exact_bytes() {
        let response = Response::new(1, PacketType::ChList, [0xAA, 0xBB]);
        assert_eq!(response.size, 12);
        assert_eq!(
            response.bytes(),
            &[
                0x0C, 0x00, 0x00, 0x00, // size = 12
                0x01, 0x00, 0x00, 0x00, // id = 1
                0x16, 0x00, 0x00, 0x00, // type = CH_LIST
                0xAA, 0xBB, // payload
                0x00, 0x00, // trailer
            ]
        );
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let response = Response::new(7, PacketType::ChMessage, b"hello there");
        let request = Request::decode_framed(response.bytes()).unwrap();

        assert_eq!(request.id, 7);
        assert_eq!(request.kind, PacketType::ChMessage as u32);
        assert_eq!(request.payload, b"hello there");
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let response = Response::empty(3, PacketType::Heartbeat);
        assert_eq!(response.size, 10);
        assert_eq!(response.bytes().len(), 14);

        let request = Request::decode_framed(response.bytes()).unwrap();
        assert_eq!(request.id, 3);
        assert!(request.payload.is_empty());
    }

    #[test]
    fn test_decode_body() {
        let body = [
            0x01, 0x00, 0x00, 0x00, // id = 1
            0x16, 0x00, 0x00, 0x00, // type = 22
            b'b', b'n', 0x00, 0x00, // payload + trailer
        ];
        let request = Request::decode(&body).unwrap();
        assert_eq!(request.id, 1);
        assert_eq!(request.kind, 22);
        assert_eq!(request.payload, b"bn");
    }

    #[test]
    fn test_short_frame_rejected() {
        assert!(Request::decode(&[0x01, 0x00, 0x00]).is_err());
        assert!(Request::decode(&[0u8; 9]).is_err());
        assert!(Request::decode(&[0u8; 10]).is_ok());
    }

    #[test]
    fn test_truncated_framed_buffer_rejected() {
        let response = Response::new(1, PacketType::ChJoin, b"payload");
        let bytes = response.bytes();
        assert!(Request::decode_framed(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            Request::decode_framed(&buf),
            Err(ChatRelayError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_skip_sentinel() {
        let skip = Response::skip();
        assert!(!skip.should_send());
        assert!(Response::empty(-1, PacketType::Error).should_send());
    }

    #[test]
    fn test_le_helpers() {
        assert_eq!(u32_le(&[0x10, 0x00, 0x00, 0x00]), Some(0x10));
        assert_eq!(i32_le(&[0xFF, 0xFF, 0xFF, 0xFF]), Some(-1));
        assert_eq!(u32_le(&[0x01, 0x02]), None);
    }
}
