// src/wire/message.rs

use super::header::{MessageHeader, HEADER_LEN};
use bytes::{BufMut, Bytes, BytesMut};

/// A full wire message: header plus opaque body. Handlers parse the body
/// into a typed payload view on demand rather than up front, mirroring the
/// original dispatch core's habit of treating the body as a lazily-parsed
/// `BufReader` until a handler actually needs a field.
#[derive(Debug, Clone)]
pub struct Message {
    pub header: MessageHeader,
    pub body: Bytes,
}

impl Message {
    pub fn new(request_id: i32, response_to: i32, opcode: super::Opcode, body: Bytes) -> Self {
        let total_length = (HEADER_LEN + body.len()) as i32;
        Message {
            header: MessageHeader {
                total_length,
                request_id,
                response_to,
                opcode: opcode.to_i32(),
            },
            body,
        }
    }

    pub fn opcode(&self) -> Option<super::Opcode> {
        self.header.opcode()
    }

    pub fn encode_to(&self, dst: &mut BytesMut) {
        self.header.encode(dst);
        dst.put_slice(&self.body);
    }

    /// Concatenates a run of chained messages (used only by the direct
    /// client when a handler strung together more than one reply buffer)
    /// into a single contiguous message, keeping the first header.
    pub fn concat(mut messages: Vec<Message>) -> Option<Message> {
        if messages.is_empty() {
            return None;
        }
        let first = messages.remove(0);
        if messages.is_empty() {
            return Some(first);
        }
        let mut body = BytesMut::from(&first.body[..]);
        for m in messages {
            body.put_slice(&m.body);
        }
        let body = body.freeze();
        let total_length = (HEADER_LEN + body.len()) as i32;
        Some(Message {
            header: MessageHeader {
                total_length,
                ..first.header
            },
            body,
        })
    }
}
