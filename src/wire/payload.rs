// src/wire/payload.rs

use crate::document::Document;
use crate::errors::DispatchError;
use bytes::Buf;

fn read_cstring(buf: &mut &[u8]) -> Result<String, DispatchError> {
    let nul = buf
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| DispatchError::assertion(10061, "truncated cstring in message body"))?;
    let s = std::str::from_utf8(&buf[..nul])
        .map_err(|_| DispatchError::assertion(10062, "cstring is not valid utf-8"))?
        .to_string();
    buf.advance(nul + 1);
    Ok(s)
}

fn read_document(buf: &mut &[u8]) -> Result<Document, DispatchError> {
    if buf.len() < 4 {
        return Err(DispatchError::assertion(10063, "truncated document length"));
    }
    let len = (&buf[..4]).get_i32_le();
    if len < 4 || (len as usize) > buf.len() {
        return Err(DispatchError::assertion(10064, "invalid document length"));
    }
    let len = len as usize;
    let slice = &buf[..len];
    let value: serde_json::Value = serde_json::from_slice(slice)
        .map_err(|e| DispatchError::assertion(10065, format!("malformed document: {e}")))?;
    buf.advance(len);
    Ok(Document::new(value))
}

fn read_optional_document(buf: &mut &[u8]) -> Result<Option<Document>, DispatchError> {
    if buf.is_empty() {
        return Ok(None);
    }
    Ok(Some(read_document(buf)?))
}

#[derive(Debug, Clone)]
pub struct QueryPayload {
    pub flags: i32,
    pub full_collection_name: String,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub query: Document,
    pub return_fields_selector: Option<Document>,
}

impl QueryPayload {
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        let mut buf = body;
        let flags = buf.get_i32_le();
        let full_collection_name = read_cstring(&mut buf)?;
        let number_to_skip = buf.get_i32_le();
        let number_to_return = buf.get_i32_le();
        let query = read_document(&mut buf)?;
        let return_fields_selector = read_optional_document(&mut buf)?;
        Ok(QueryPayload {
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_fields_selector,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GetMorePayload {
    pub full_collection_name: String,
    pub number_to_return: i32,
    pub cursor_id: i64,
}

impl GetMorePayload {
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        let mut buf = body;
        let _reserved = buf.get_i32_le();
        let full_collection_name = read_cstring(&mut buf)?;
        let number_to_return = buf.get_i32_le();
        let cursor_id = buf.get_i64_le();
        Ok(GetMorePayload {
            full_collection_name,
            number_to_return,
            cursor_id,
        })
    }
}

#[derive(Debug, Clone)]
pub struct KillCursorsPayload {
    pub cursor_ids: Vec<i64>,
}

impl KillCursorsPayload {
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        let mut buf = body;
        let _reserved = buf.get_i32_le();
        let n = buf.get_i32_le();
        let mut cursor_ids = Vec::new();
        for _ in 0..n.max(0) {
            if buf.len() < 8 {
                return Err(DispatchError::assertion(
                    10066,
                    "truncated cursor id list",
                ));
            }
            cursor_ids.push(buf.get_i64_le());
        }
        Ok(KillCursorsPayload { cursor_ids })
    }

    pub fn declared_count(body: &[u8]) -> Result<i32, DispatchError> {
        if body.len() < 8 {
            return Err(DispatchError::assertion(10067, "truncated killCursors header"));
        }
        Ok((&body[4..8]).get_i32_le())
    }
}

#[derive(Debug, Clone)]
pub struct InsertPayload {
    pub flags: i32,
    pub full_collection_name: String,
    pub documents: Vec<Document>,
}

impl InsertPayload {
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        let mut buf = body;
        let flags = buf.get_i32_le();
        let full_collection_name = read_cstring(&mut buf)?;
        let mut documents = Vec::new();
        while !buf.is_empty() {
            documents.push(read_document(&mut buf)?);
        }
        Ok(InsertPayload {
            flags,
            full_collection_name,
            documents,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UpdatePayload {
    pub full_collection_name: String,
    pub flags: i32,
    pub selector: Document,
    pub update: Document,
}

impl UpdatePayload {
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        let mut buf = body;
        let _reserved = buf.get_i32_le();
        let full_collection_name = read_cstring(&mut buf)?;
        let flags = buf.get_i32_le();
        let selector = read_document(&mut buf)?;
        let update = read_document(&mut buf)?;
        Ok(UpdatePayload {
            full_collection_name,
            flags,
            selector,
            update,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeletePayload {
    pub full_collection_name: String,
    pub flags: i32,
    pub selector: Document,
}

impl DeletePayload {
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        let mut buf = body;
        let _reserved = buf.get_i32_le();
        let full_collection_name = read_cstring(&mut buf)?;
        let flags = buf.get_i32_le();
        let selector = read_document(&mut buf)?;
        Ok(DeletePayload {
            full_collection_name,
            flags,
            selector,
        })
    }
}
