//! HDHomeRun packet encoder/decoder.
//!
//! Every request and reply, on both the TCP control connection and the UDP
//! discovery socket, is one packet. This module is pure byte-level code with
//! no I/O.
//!
//! # Packet format
//!
//! ```text
//! [type: u16 BE][payload length: u16 BE][tag]*[CRC-32: u32 LE]
//! ```
//!
//! The payload length counts tag bytes only. The CRC-32 (IEEE) covers every
//! byte before the trailer and is the only little-endian field.
//!
//! # Tag format
//!
//! ```text
//! [type: u8][length: 1 or 2 bytes][data]
//! ```
//!
//! Lengths below 128 take one byte. Longer lengths take two: the low seven
//! bits with the high bit set, then the remaining bits (`length >> 7`).

use bytes::{BufMut, BytesMut};
use hdhr_core::FrameError;

use crate::consts::{CHECKSUM_SIZE, HEADER_SIZE, MIN_PACKET_SIZE};

/// Data lengths at or above this need a two-byte length field.
pub const LARGE_TAG_LENGTH: usize = 128;

/// Largest data length a two-byte length field can carry.
pub const MAX_TAG_LENGTH: usize = 0x7FFF;

/// A typed attribute carried in a packet's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag type code, e.g. [`TAG_GETSET_NAME`](crate::consts::TAG_GETSET_NAME).
    pub tag_type: u8,
    /// Arbitrary tag payload.
    pub data: Vec<u8>,
}

impl Tag {
    pub fn new(tag_type: u8, data: impl Into<Vec<u8>>) -> Self {
        Tag {
            tag_type,
            data: data.into(),
        }
    }

    /// Bytes this tag occupies on the wire.
    fn encoded_len(&self) -> usize {
        let len_field = if self.data.len() < LARGE_TAG_LENGTH { 1 } else { 2 };
        1 + len_field + self.data.len()
    }
}

/// One unit of wire exchange with a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// Packet type code, e.g. [`TYPE_GETSET_REQ`](crate::consts::TYPE_GETSET_REQ).
    pub packet_type: u16,
    /// Zero or more tags, in wire order.
    pub tags: Vec<Tag>,
}

impl Packet {
    /// Create a packet with no tags.
    pub fn new(packet_type: u16) -> Self {
        Packet {
            packet_type,
            tags: Vec::new(),
        }
    }

    /// Append a tag, builder style.
    pub fn with_tag(mut self, tag_type: u8, data: impl Into<Vec<u8>>) -> Self {
        self.tags.push(Tag::new(tag_type, data));
        self
    }

    /// Data of the first tag with the given type, if any.
    pub fn find_tag(&self, tag_type: u8) -> Option<&[u8]> {
        self.tags
            .iter()
            .find(|t| t.tag_type == tag_type)
            .map(|t| t.data.as_slice())
    }

    /// Encode this packet into its wire form.
    ///
    /// Fails only if a tag or the whole payload is too long for its length
    /// field.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let payload_len: usize = self.tags.iter().map(Tag::encoded_len).sum();
        let payload_len_field =
            u16::try_from(payload_len).map_err(|_| FrameError::PayloadTooLong(payload_len))?;

        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload_len + CHECKSUM_SIZE);
        buf.put_u16(self.packet_type);
        buf.put_u16(payload_len_field);

        let mut len_field = [0u8; 2];
        for tag in &self.tags {
            buf.put_u8(tag.tag_type);
            let n = write_tag_length(tag.data.len(), &mut len_field)?;
            buf.put_slice(&len_field[..n]);
            buf.put_slice(&tag.data);
        }

        let crc = checksum(&buf);
        buf.put_u32_le(crc);

        Ok(buf.to_vec())
    }

    /// Decode a packet from exactly the bytes of one packet.
    ///
    /// Tag data is copied out of `data`, so the caller may reuse its buffer.
    pub fn decode(data: &[u8]) -> Result<Packet, FrameError> {
        if data.len() < MIN_PACKET_SIZE {
            return Err(FrameError::Truncated);
        }

        let end = data.len() - CHECKSUM_SIZE;
        let expected = u32::from_le_bytes([data[end], data[end + 1], data[end + 2], data[end + 3]]);
        let actual = checksum(&data[..end]);
        if expected != actual {
            return Err(FrameError::ChecksumMismatch { expected, actual });
        }

        let packet_type = u16::from_be_bytes([data[0], data[1]]);
        let payload_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if payload_len != data.len() - MIN_PACKET_SIZE {
            return Err(FrameError::Truncated);
        }

        let mut tags = Vec::new();
        let mut i = HEADER_SIZE;
        while i < end {
            let tag_type = data[i];
            i += 1;

            // The length field must start inside the payload. Reading two
            // bytes is always in bounds because the trailer follows.
            if i >= end {
                return Err(FrameError::Truncated);
            }
            let (len, consumed) = read_tag_length(&data[i..i + 2])?;
            i += consumed;

            if i > end || end - i < len {
                return Err(FrameError::Truncated);
            }

            tags.push(Tag::new(tag_type, &data[i..i + len]));
            i += len;
        }

        Ok(Packet { packet_type, tags })
    }
}

/// CRC-32 (IEEE) over `data`, as used in the packet trailer.
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Write `len` into `buf` using the variable tag length encoding.
///
/// `buf` must be exactly two bytes even when only one is used. Returns the
/// number of bytes written.
pub fn write_tag_length(len: usize, buf: &mut [u8]) -> Result<usize, FrameError> {
    if buf.len() != 2 {
        return Err(FrameError::TagLengthBuffer(buf.len()));
    }

    if len < LARGE_TAG_LENGTH {
        buf[0] = len as u8;
        return Ok(1);
    }

    if len > MAX_TAG_LENGTH {
        return Err(FrameError::TagTooLong(len));
    }

    buf[0] = 0x80 | (len & 0x7F) as u8;
    buf[1] = (len >> 7) as u8;
    Ok(2)
}

/// Read a variable tag length from `buf`.
///
/// `buf` must be exactly two bytes even when only one is consumed. Returns
/// `(length, bytes_consumed)`.
pub fn read_tag_length(buf: &[u8]) -> Result<(usize, usize), FrameError> {
    if buf.len() != 2 {
        return Err(FrameError::TagLengthBuffer(buf.len()));
    }

    if buf[0] & 0x80 == 0 {
        return Ok((buf[0] as usize, 1));
    }

    let len = (buf[0] & 0x7F) as usize | (buf[1] as usize) << 7;
    Ok((len, 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{TAG_DEVICE_ID, TAG_DEVICE_TYPE, TAG_GETSET_NAME, TYPE_DISCOVER_REQ};

    fn discover_request() -> Packet {
        Packet::new(TYPE_DISCOVER_REQ)
            .with_tag(TAG_DEVICE_TYPE, [0x00, 0x00, 0x00, 0x01])
            .with_tag(TAG_DEVICE_ID, [0xFF, 0xFF, 0xFF, 0xFF])
    }

    // ---------------------------------------------------------------
    // Encoding
    // ---------------------------------------------------------------

    #[test]
    fn encode_discover_request_layout() {
        let b = discover_request().encode().unwrap();

        assert_eq!(b.len(), 20);
        assert_eq!(&b[0..2], &[0x00, 0x02]);
        assert_eq!(&b[2..4], &[0x00, 12]);
        assert_eq!(
            &b[4..16],
            &[
                0x01, 0x04, 0x00, 0x00, 0x00, 0x01, // device type
                0x02, 0x04, 0xFF, 0xFF, 0xFF, 0xFF, // device id
            ]
        );

        let crc = checksum(&b[..16]);
        assert_eq!(&b[16..], &crc.to_le_bytes());
    }

    #[test]
    fn encode_empty_packet() {
        let b = Packet::new(0x0004).encode().unwrap();
        assert_eq!(b.len(), 8);
        assert_eq!(&b[..4], &[0x00, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn encode_rejects_oversized_tag() {
        let p = Packet::new(0x0004).with_tag(TAG_GETSET_NAME, vec![0u8; MAX_TAG_LENGTH + 1]);
        assert_eq!(
            p.encode(),
            Err(FrameError::TagTooLong(MAX_TAG_LENGTH + 1))
        );
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let p = Packet::new(0x0004)
            .with_tag(0x01, vec![0u8; MAX_TAG_LENGTH])
            .with_tag(0x02, vec![0u8; MAX_TAG_LENGTH])
            .with_tag(0x03, vec![0u8; 10]);
        assert!(matches!(p.encode(), Err(FrameError::PayloadTooLong(_))));
    }

    // ---------------------------------------------------------------
    // Tag length helpers
    // ---------------------------------------------------------------

    #[test]
    fn tag_length_127_is_one_byte() {
        let mut buf = [0u8; 2];
        assert_eq!(write_tag_length(127, &mut buf), Ok(1));
        assert_eq!(buf[0], 0x7F);
        assert_eq!(read_tag_length(&buf), Ok((127, 1)));
    }

    #[test]
    fn tag_length_128_is_two_bytes() {
        let mut buf = [0u8; 2];
        assert_eq!(write_tag_length(128, &mut buf), Ok(2));
        assert_eq!(buf, [0x80, 0x01]);
        assert_ne!(buf[0] & 0x80, 0);
        assert_eq!(read_tag_length(&buf), Ok((128, 2)));
    }

    #[test]
    fn tag_length_large_values() {
        for len in [129usize, 255, 1452, 4096, MAX_TAG_LENGTH] {
            let mut buf = [0u8; 2];
            assert_eq!(write_tag_length(len, &mut buf), Ok(2));
            assert_eq!(read_tag_length(&buf), Ok((len, 2)), "length {len}");
        }
    }

    #[test]
    fn tag_length_helpers_require_two_byte_buffer() {
        let mut short = [0u8; 1];
        assert_eq!(
            write_tag_length(5, &mut short),
            Err(FrameError::TagLengthBuffer(1))
        );
        assert_eq!(read_tag_length(&[0x05]), Err(FrameError::TagLengthBuffer(1)));
        assert_eq!(
            read_tag_length(&[0x05, 0x00, 0x00]),
            Err(FrameError::TagLengthBuffer(3))
        );
    }

    // ---------------------------------------------------------------
    // Decoding
    // ---------------------------------------------------------------

    #[test]
    fn decode_discover_request() {
        let b = discover_request().encode().unwrap();
        let p = Packet::decode(&b).unwrap();
        assert_eq!(p, discover_request());
        assert_eq!(p.find_tag(TAG_DEVICE_ID), Some(&[0xFF, 0xFF, 0xFF, 0xFF][..]));
        assert_eq!(p.find_tag(TAG_GETSET_NAME), None);
    }

    #[test]
    fn decode_empty_payload() {
        let b = Packet::new(0x0005).encode().unwrap();
        let p = Packet::decode(&b).unwrap();
        assert_eq!(p.packet_type, 0x0005);
        assert!(p.tags.is_empty());
    }

    #[test]
    fn decode_too_short() {
        for len in 0..MIN_PACKET_SIZE {
            let b = vec![0u8; len];
            assert_eq!(Packet::decode(&b), Err(FrameError::Truncated), "len {len}");
        }
    }

    #[test]
    fn decode_bad_checksum() {
        let mut b = discover_request().encode().unwrap();
        let last = b.len() - 1;
        b[last] ^= 0xFF;
        assert!(matches!(
            Packet::decode(&b),
            Err(FrameError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn any_single_bit_flip_fails_checksum() {
        let b = discover_request().encode().unwrap();
        let body_len = b.len() - CHECKSUM_SIZE;
        for byte in 0..body_len {
            for bit in 0..8 {
                let mut corrupt = b.clone();
                corrupt[byte] ^= 1 << bit;
                assert!(
                    matches!(
                        Packet::decode(&corrupt),
                        Err(FrameError::ChecksumMismatch { .. })
                    ),
                    "flip byte {byte} bit {bit}"
                );
            }
        }
    }

    /// Re-seal a hand-built body with a valid checksum.
    fn seal(mut body: Vec<u8>) -> Vec<u8> {
        let crc = checksum(&body);
        body.extend_from_slice(&crc.to_le_bytes());
        body
    }

    #[test]
    fn decode_declared_length_mismatch() {
        // Declares 5 payload bytes but carries 6.
        let b = seal(vec![0x00, 0x05, 0x00, 0x05, 0x03, 0x04, b'a', b'b', b'c', 0x00]);
        assert_eq!(Packet::decode(&b), Err(FrameError::Truncated));

        // Declares 7 payload bytes but carries 6.
        let b = seal(vec![0x00, 0x05, 0x00, 0x07, 0x03, 0x04, b'a', b'b', b'c', 0x00]);
        assert_eq!(Packet::decode(&b), Err(FrameError::Truncated));
    }

    #[test]
    fn decode_tag_length_past_payload() {
        // Tag claims 10 data bytes, only 4 present before the checksum.
        let b = seal(vec![0x00, 0x05, 0x00, 0x06, 0x03, 0x0A, b'a', b'b', b'c', 0x00]);
        assert_eq!(Packet::decode(&b), Err(FrameError::Truncated));
    }

    #[test]
    fn decode_tag_type_without_length() {
        // Payload is a lone tag type byte; its length would sit in the checksum.
        let b = seal(vec![0x00, 0x05, 0x00, 0x01, 0x03]);
        assert_eq!(Packet::decode(&b), Err(FrameError::Truncated));
    }

    #[test]
    fn decode_two_byte_length_split_by_checksum() {
        // High bit set on the last payload byte: the second length byte
        // would come from the checksum.
        let b = seal(vec![0x00, 0x05, 0x00, 0x02, 0x03, 0x80]);
        assert_eq!(Packet::decode(&b), Err(FrameError::Truncated));
    }

    #[test]
    fn decode_copies_tag_data() {
        let mut b = Packet::new(0x0005)
            .with_tag(TAG_GETSET_NAME, b"/sys/model\0".to_vec())
            .encode()
            .unwrap();
        let p = Packet::decode(&b).unwrap();
        b.iter_mut().for_each(|x| *x = 0);
        assert_eq!(p.tags[0].data, b"/sys/model\0");
    }

    #[test]
    fn round_trip_large_tag() {
        let data: Vec<u8> = (0..300).map(|i| (i % 251) as u8).collect();
        let p = Packet::new(0x0005)
            .with_tag(0x04, data.clone())
            .with_tag(0x03, b"x\0".to_vec());
        let b = p.encode().unwrap();
        assert_eq!(b.len(), 4 + (1 + 2 + 300) + (1 + 1 + 2) + 4);

        let decoded = Packet::decode(&b).unwrap();
        assert_eq!(decoded, p);
        assert_eq!(decoded.encode().unwrap(), b);
    }

    #[test]
    fn find_tag_returns_first_occurrence() {
        let p = Packet::new(0x0005)
            .with_tag(TAG_GETSET_NAME, b"first".to_vec())
            .with_tag(TAG_GETSET_NAME, b"second".to_vec());
        assert_eq!(p.find_tag(TAG_GETSET_NAME), Some(&b"first"[..]));
    }
}
