use std::ops::{Deref, DerefMut};

use anyhow::anyhow;
use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::connection::Connection;

/// Turns buffered bytes into messages and messages into frames for one kind of connection.
///
/// `decode` must not block: it returns `Ok(None)` until `src` holds a complete frame and
/// consumes exactly the bytes of the frame it returns.
pub trait Codec: Send + Sync + Sized + 'static {
    type Message: Send + 'static;

    fn decode(&self, src: &mut BytesMut, connection: &Connection<Self>) -> anyhow::Result<Option<Self::Message>>;

    fn encode(&self, message: Self::Message, connection: &Connection<Self>) -> anyhow::Result<Bytes>;
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Packet {
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into()
        }
    }
}

impl Deref for Packet {
    type Target = Vec<u8>;

    fn deref(&self) -> &Self::Target {
        &self.body
    }
}

impl DerefMut for Packet {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.body
    }
}

/// `u32` big-endian length prefix followed by the body.
#[derive(Debug, Copy, Clone)]
pub struct PacketCodec {
    max_frame_length: usize,
}

impl PacketCodec {
    pub const HEADER_LEN: usize = 4;

    pub fn new(max_frame_length: usize) -> Self {
        Self { max_frame_length }
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(16 * 1024 * 1024)
    }
}

#[derive(Debug, Error)]
pub enum PacketCodecError {
    #[error("frame of {0} bytes exceeds max frame length {1}")]
    FrameTooLarge(usize, usize),
    #[error("codec packet error io")]
    Io(#[from] std::io::Error),
}

impl Encoder<Packet> for PacketCodec {
    type Error = PacketCodecError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.len();
        if len > self.max_frame_length || len > u32::MAX as usize {
            return Err(PacketCodecError::FrameTooLarge(len, self.max_frame_length));
        }
        dst.reserve(Self::HEADER_LEN + len);
        dst.put_u32(len as u32);
        dst.put_slice(&item);
        Ok(())
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = PacketCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let buf_len = src.len();
        if buf_len < Self::HEADER_LEN {
            return Ok(None);
        }
        let mut len_bytes = [0u8; Self::HEADER_LEN];
        len_bytes.copy_from_slice(&src[..Self::HEADER_LEN]);
        let body_len = u32::from_be_bytes(len_bytes) as usize;
        if body_len > self.max_frame_length {
            return Err(PacketCodecError::FrameTooLarge(body_len, self.max_frame_length));
        }
        if body_len > buf_len - Self::HEADER_LEN {
            src.reserve(Self::HEADER_LEN + body_len - buf_len);
            Ok(None)
        } else {
            let frame = src.split_to(Self::HEADER_LEN + body_len);
            Ok(Some(Packet::new(&frame[Self::HEADER_LEN..])))
        }
    }
}

impl Codec for PacketCodec {
    type Message = Packet;

    fn decode(&self, src: &mut BytesMut, _connection: &Connection<Self>) -> anyhow::Result<Option<Self::Message>> {
        let mut codec = *self;
        Decoder::decode(&mut codec, src).map_err(|error| anyhow!(error))
    }

    fn encode(&self, message: Self::Message, _connection: &Connection<Self>) -> anyhow::Result<Bytes> {
        let mut codec = *self;
        let mut dst = BytesMut::new();
        Encoder::encode(&mut codec, message, &mut dst)?;
        Ok(dst.freeze())
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use crate::codec::{Packet, PacketCodec, PacketCodecError};

    #[test]
    fn test_partial_frame_waits() -> anyhow::Result<()> {
        let mut codec = PacketCodec::default();
        let mut encoded = BytesMut::new();
        codec.encode(Packet::new(b"hello world".to_vec()), &mut encoded)?;
        let mut src = BytesMut::from(&encoded[..6]);
        assert_eq!(codec.decode(&mut src)?, None);
        assert_eq!(src.len(), 6);
        src.extend_from_slice(&encoded[6..]);
        assert_eq!(codec.decode(&mut src)?, Some(Packet::new(b"hello world".to_vec())));
        assert!(src.is_empty());
        Ok(())
    }

    #[test]
    fn test_two_frames_in_one_buffer() -> anyhow::Result<()> {
        let mut codec = PacketCodec::default();
        let mut src = BytesMut::new();
        codec.encode(Packet::new(vec![1]), &mut src)?;
        codec.encode(Packet::new(vec![]), &mut src)?;
        assert_eq!(codec.decode(&mut src)?, Some(Packet::new(vec![1])));
        assert_eq!(codec.decode(&mut src)?, Some(Packet::new(vec![])));
        assert_eq!(codec.decode(&mut src)?, None);
        Ok(())
    }

    #[test]
    fn test_frame_too_large() {
        let mut codec = PacketCodec::new(8);
        let mut src = BytesMut::from(&[0u8, 0, 0, 9][..]);
        assert!(matches!(codec.decode(&mut src), Err(PacketCodecError::FrameTooLarge(9, 8))));
        let mut dst = BytesMut::new();
        assert!(codec.encode(Packet::new(vec![0; 9]), &mut dst).is_err());
    }
}
