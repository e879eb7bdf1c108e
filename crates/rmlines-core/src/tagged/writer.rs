//! Writer side of the tagged block codec.

use std::mem;

use rmlines_buffers::Writer;

use super::{TagType, FILE_HEADER_V6};
use crate::crdt_id::{CrdtId, LwwValue};
use crate::error::SceneError;

/// Writes tags, typed fields, sub-blocks and block envelopes.
///
/// Block payloads are buffered in a scratch writer so the envelope can
/// carry the final length; sub-block lengths are backpatched in place.
/// Blocks do not nest.
pub struct TaggedBlockWriter {
    /// The underlying write buffer. Inside [`TaggedBlockWriter::block`]
    /// this is the scratch buffer for the current payload.
    pub data: Writer,
    in_block: bool,
}

impl Default for TaggedBlockWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TaggedBlockWriter {
    pub fn new() -> Self {
        Self {
            data: Writer::new(),
            in_block: false,
        }
    }

    /// Writes the 43-byte file header.
    pub fn write_header(&mut self) {
        self.data.bytes(FILE_HEADER_V6);
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.into_bytes()
    }

    // ------------------------------------------------------------------
    // Block envelopes
    // ------------------------------------------------------------------

    /// Writes one block: buffers the payload produced by `content`
    /// into a scratch stream, then emits the envelope followed by the
    /// payload. Starting a block inside a block is
    /// [`SceneError::UnexpectedBlock`].
    pub fn block(
        &mut self,
        block_type: u8,
        min_version: u8,
        current_version: u8,
        content: impl FnOnce(&mut Self) -> Result<(), SceneError>,
    ) -> Result<(), SceneError> {
        if self.in_block {
            return Err(SceneError::UnexpectedBlock("block started inside a block"));
        }
        let outer = mem::take(&mut self.data);
        self.in_block = true;
        let result = content(self);
        let payload = mem::replace(&mut self.data, outer);
        self.in_block = false;
        result?;
        self.write_envelope(block_type, min_version, current_version, payload.as_slice());
        Ok(())
    }

    /// Writes a block envelope around pre-encoded payload bytes.
    pub fn raw_block(
        &mut self,
        block_type: u8,
        min_version: u8,
        current_version: u8,
        payload: &[u8],
    ) -> Result<(), SceneError> {
        if self.in_block {
            return Err(SceneError::UnexpectedBlock("block started inside a block"));
        }
        self.write_envelope(block_type, min_version, current_version, payload);
        Ok(())
    }

    fn write_envelope(&mut self, block_type: u8, min_version: u8, current_version: u8, payload: &[u8]) {
        self.data.u32(payload.len() as u32);
        self.data.u8(0);
        self.data.u8(min_version);
        self.data.u8(current_version);
        self.data.u8(block_type);
        self.data.bytes(payload);
    }

    // ------------------------------------------------------------------
    // Tags and typed fields
    // ------------------------------------------------------------------

    pub fn write_tag(&mut self, index: u8, tag_type: TagType) {
        self.data.varuint(((index as u64) << 4) | tag_type as u64);
    }

    /// Writes an untagged CRDT id: author byte, then varuint counter.
    pub fn write_id_raw(&mut self, id: CrdtId) {
        self.data.u8(id.author);
        self.data.varuint(id.counter);
    }

    pub fn write_id(&mut self, index: u8, id: CrdtId) {
        self.write_tag(index, TagType::Id);
        self.write_id_raw(id);
    }

    pub fn write_bool(&mut self, index: u8, value: bool) {
        self.write_tag(index, TagType::Byte1);
        self.data.boolean(value);
    }

    pub fn write_u8(&mut self, index: u8, value: u8) {
        self.write_tag(index, TagType::Byte1);
        self.data.u8(value);
    }

    pub fn write_u32(&mut self, index: u8, value: u32) {
        self.write_tag(index, TagType::Byte4);
        self.data.u32(value);
    }

    pub fn write_f32(&mut self, index: u8, value: f32) {
        self.write_tag(index, TagType::Byte4);
        self.data.f32(value);
    }

    pub fn write_f64(&mut self, index: u8, value: f64) {
        self.write_tag(index, TagType::Byte8);
        self.data.f64(value);
    }

    // ------------------------------------------------------------------
    // Sub-blocks
    // ------------------------------------------------------------------

    /// Writes a sub-block at the given index: tag, length prefix
    /// backpatched once `content` has run, then the content itself.
    pub fn subblock(
        &mut self,
        index: u8,
        content: impl FnOnce(&mut Self) -> Result<(), SceneError>,
    ) -> Result<(), SceneError> {
        self.write_tag(index, TagType::Length4);
        let length_pos = self.data.tell();
        self.data.u32(0);
        let start = self.data.tell();
        content(self)?;
        let end = self.data.tell();
        self.data.seek(length_pos)?;
        self.data.u32((end - start) as u32);
        self.data.seek(end)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    pub fn write_string(&mut self, index: u8, value: &str) -> Result<(), SceneError> {
        self.subblock(index, |w| {
            w.write_string_body(value);
            Ok(())
        })
    }

    pub fn write_string_with_format(
        &mut self,
        index: u8,
        value: &str,
        format: Option<u32>,
    ) -> Result<(), SceneError> {
        self.subblock(index, |w| {
            w.write_string_body(value);
            if let Some(code) = format {
                w.write_u32(2, code);
            }
            Ok(())
        })
    }

    fn write_string_body(&mut self, value: &str) {
        self.data.varuint(value.len() as u64);
        self.data.boolean(true);
        self.data.bytes(value.as_bytes());
    }

    // ------------------------------------------------------------------
    // Last-writer-wins registers
    // ------------------------------------------------------------------

    fn write_lww(
        &mut self,
        index: u8,
        timestamp: CrdtId,
        value: impl FnOnce(&mut Self) -> Result<(), SceneError>,
    ) -> Result<(), SceneError> {
        self.subblock(index, |w| {
            w.write_id(1, timestamp);
            value(w)
        })
    }

    pub fn write_lww_id(&mut self, index: u8, lww: LwwValue<CrdtId>) -> Result<(), SceneError> {
        self.write_lww(index, lww.timestamp, |w| {
            w.write_id(2, lww.value);
            Ok(())
        })
    }

    pub fn write_lww_bool(&mut self, index: u8, lww: LwwValue<bool>) -> Result<(), SceneError> {
        self.write_lww(index, lww.timestamp, |w| {
            w.write_bool(2, lww.value);
            Ok(())
        })
    }

    pub fn write_lww_u8(&mut self, index: u8, lww: LwwValue<u8>) -> Result<(), SceneError> {
        self.write_lww(index, lww.timestamp, |w| {
            w.write_u8(2, lww.value);
            Ok(())
        })
    }

    pub fn write_lww_f32(&mut self, index: u8, lww: LwwValue<f32>) -> Result<(), SceneError> {
        self.write_lww(index, lww.timestamp, |w| {
            w.write_f32(2, lww.value);
            Ok(())
        })
    }

    pub fn write_lww_string(&mut self, index: u8, lww: LwwValue<String>) -> Result<(), SceneError> {
        self.write_lww(index, lww.timestamp, |w| w.write_string(2, &lww.value))
    }
}
