// src/wire/codec.rs

use super::header::{MessageHeader, HEADER_LEN};
use super::message::Message;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Maximum accepted message size, guarding against a hostile or corrupt
/// `total_length` field driving an unbounded allocation.
const MAX_MESSAGE_LEN: i32 = 48 * 1024 * 1024;

/// Hand-written frame codec for the wire protocol, in the same style as
/// the teacher's `RespFrameCodec`: decode directly off `BytesMut`, never
/// route through an intermediate serialization crate.
#[derive(Debug, Default)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let total_length = (&src[..4]).get_i32_le();
        if total_length < HEADER_LEN as i32 || total_length > MAX_MESSAGE_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("invalid message length {total_length}"),
            ));
        }
        if (src.len() as i32) < total_length {
            src.reserve((total_length as usize) - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(total_length as usize);
        let header = MessageHeader::decode(&mut frame);
        let body = frame.freeze();
        Ok(Some(Message { header, body }))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = std::io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.header.total_length as usize);
        item.encode_to(dst);
        Ok(())
    }
}
