// src/response.rs

use crate::document::Document;
use crate::wire::{response_flags, Message, Opcode};
use bytes::{BufMut, BytesMut};

/// The dispatcher's output: zero or one reply message, plus the exhaust
/// namespace a connection handler should keep streaming from without
/// waiting for another request.
#[derive(Debug, Clone, Default)]
pub struct DbResponse {
    pub message: Option<Message>,
    pub exhaust_namespace: Option<String>,
}

impl DbResponse {
    /// Writes never produce a reply message, per spec.
    pub fn none() -> Self {
        DbResponse::default()
    }

    pub fn reply(
        request_id: i32,
        cursor_id: i64,
        starting_from: i32,
        documents: &[Document],
        flags: i32,
    ) -> Self {
        let mut body = BytesMut::new();
        body.put_i32_le(flags);
        body.put_i64_le(cursor_id);
        body.put_i32_le(starting_from);
        body.put_i32_le(documents.len() as i32);
        for doc in documents {
            let encoded = serde_json::to_vec(&**doc).unwrap_or_default();
            body.put_i32_le(encoded.len() as i32);
            body.put_slice(&encoded);
        }
        let message = Message::new(request_id, request_id, Opcode::Reply, body.freeze());
        DbResponse {
            message: Some(message),
            exhaust_namespace: None,
        }
    }

    pub fn single_document(request_id: i32, doc: &Document) -> Self {
        Self::reply(request_id, 0, 0, std::slice::from_ref(doc), 0)
    }

    pub fn error(request_id: i32, doc: &Document, extra_flags: i32) -> Self {
        Self::reply(
            request_id,
            0,
            0,
            std::slice::from_ref(doc),
            response_flags::ERR_SET | extra_flags,
        )
    }

    pub fn cursor_not_found(request_id: i32) -> Self {
        Self::reply(request_id, 0, 0, &[], response_flags::CURSOR_NOT_FOUND)
    }

    pub fn with_exhaust(mut self, ns: impl Into<String>) -> Self {
        self.exhaust_namespace = Some(ns.into());
        self
    }
}
