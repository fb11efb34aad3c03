// src/wire/header.rs

use super::Opcode;
use bytes::{Buf, BufMut};

pub const HEADER_LEN: usize = 16;

/// The fixed 16-byte message header: four little-endian `i32` fields.
#[derive(Debug, Clone, Copy)]
pub struct MessageHeader {
    pub total_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub opcode: i32,
}

impl MessageHeader {
    pub fn decode(src: &mut impl Buf) -> Self {
        MessageHeader {
            total_length: src.get_i32_le(),
            request_id: src.get_i32_le(),
            response_to: src.get_i32_le(),
            opcode: src.get_i32_le(),
        }
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_i32_le(self.total_length);
        dst.put_i32_le(self.request_id);
        dst.put_i32_le(self.response_to);
        dst.put_i32_le(self.opcode);
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::from_i32(self.opcode)
    }
}
