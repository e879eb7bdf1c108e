//! Reader side of the tagged block codec.

use rmlines_buffers::Reader;

use super::{TagType, FILE_HEADER_V6};
use crate::crdt_id::{CrdtId, LwwValue};
use crate::error::SceneError;

/// Envelope of the block currently being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub block_type: u8,
    pub min_version: u8,
    pub current_version: u8,
    /// Offset of the payload within the input.
    pub offset: usize,
    /// Declared payload length.
    pub length: usize,
}

impl BlockHeader {
    /// Offset just past the declared payload.
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Scope of an open sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubBlock {
    pub offset: usize,
    pub length: usize,
}

impl SubBlock {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Reads tags, typed fields, sub-blocks and block envelopes from a
/// scene file byte slice.
///
/// Position discipline: a failed tag read restores the cursor, so the
/// grammar can probe for optional fields; sub-block scopes nest LIFO
/// and are checked on [`TaggedBlockReader::end_subblock`].
pub struct TaggedBlockReader<'a> {
    /// The underlying cursor.
    pub data: Reader<'a>,
    current_block: Option<BlockHeader>,
    warned_extra_data: bool,
}

impl<'a> TaggedBlockReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self {
            data: Reader::new(input),
            current_block: None,
            warned_extra_data: false,
        }
    }

    /// Checks the 43-byte file header. Any deviation is
    /// [`SceneError::BadHeader`].
    pub fn read_header(&mut self) -> Result<(), SceneError> {
        let header = self.data.bytes(FILE_HEADER_V6.len()).map_err(|_| SceneError::BadHeader)?;
        if header != FILE_HEADER_V6 {
            return Err(SceneError::BadHeader);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Block envelopes
    // ------------------------------------------------------------------

    /// Reads the next block envelope and makes it the active frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream. A truncated
    /// envelope or a nonzero reserved byte aborts the stream.
    pub fn read_block_header(&mut self) -> Result<Option<BlockHeader>, SceneError> {
        if self.current_block.is_some() {
            return Err(SceneError::UnexpectedBlock(
                "block header read while a block is open",
            ));
        }
        if self.data.remaining() == 0 {
            return Ok(None);
        }
        let length = self.data.u32()? as usize;
        let reserved = self.data.u8()?;
        if reserved != 0 {
            return Err(SceneError::InvalidEncoding(format!(
                "nonzero reserved byte {reserved:#04x} in block envelope"
            )));
        }
        let min_version = self.data.u8()?;
        let current_version = self.data.u8()?;
        let block_type = self.data.u8()?;
        if length > self.data.remaining() {
            return Err(SceneError::EndOfInput);
        }
        let header = BlockHeader {
            block_type,
            min_version,
            current_version,
            offset: self.data.tell(),
            length,
        };
        self.current_block = Some(header);
        Ok(Some(header))
    }

    /// Bytes left before the end of the active block, or 0 when no
    /// block is open.
    pub fn remaining_in_block(&self) -> usize {
        match &self.current_block {
            Some(block) => block.end().saturating_sub(self.data.tell()),
            None => 0,
        }
    }

    /// Closes the active block, returning any unconsumed payload bytes.
    ///
    /// Under-read is tolerated (the extra bytes are returned and a
    /// warning is emitted once per reader); over-read is
    /// [`SceneError::BlockOverflow`].
    pub fn end_block(&mut self) -> Result<Vec<u8>, SceneError> {
        let block = self
            .current_block
            .take()
            .ok_or(SceneError::UnexpectedBlock("end_block without an open block"))?;
        self.capture_trailing(block.end())
    }

    /// Abandons the active block after a payload error: rewinds to the
    /// payload start and returns all of its bytes.
    pub fn capture_block(&mut self) -> Result<Vec<u8>, SceneError> {
        let block = self
            .current_block
            .take()
            .ok_or(SceneError::UnexpectedBlock("no open block to capture"))?;
        self.data.seek(block.offset)?;
        Ok(self.data.bytes(block.length)?.to_vec())
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    fn read_tag_value(&mut self) -> Result<(u8, u8), SceneError> {
        let tag = self.data.varuint()?;
        Ok(((tag >> 4) as u8, (tag & 0xf) as u8))
    }

    /// Consumes a tag, requiring the given index and wire type. On
    /// mismatch the cursor is restored and
    /// [`SceneError::UnexpectedTag`] returned.
    pub fn read_tag(&mut self, index: u8, tag_type: TagType) -> Result<(), SceneError> {
        let pos = self.data.tell();
        let (found_index, found_type) = self.read_tag_value()?;
        if found_index != index || found_type != tag_type as u8 {
            self.data.seek(pos)?;
            return Err(SceneError::UnexpectedTag {
                expected_index: index,
                expected_type: tag_type as u8,
                found_index,
                found_type,
            });
        }
        Ok(())
    }

    /// Tests for a tag without advancing, regardless of outcome.
    pub fn peek_tag(&mut self, index: u8, tag_type: TagType) -> bool {
        let pos = self.data.tell();
        let matched = matches!(
            self.read_tag_value(),
            Ok((found_index, found_type))
                if found_index == index && found_type == tag_type as u8
        );
        // pos is always a valid seek target.
        let _ = self.data.seek(pos);
        matched
    }

    /// Runs a read, turning [`SceneError::UnexpectedTag`] and
    /// [`SceneError::EndOfInput`] into `None` with the cursor restored.
    /// Inside a block, a probe never crosses the block's end into the
    /// next envelope.
    pub fn optional<T>(
        &mut self,
        read: impl FnOnce(&mut Self) -> Result<T, SceneError>,
    ) -> Result<Option<T>, SceneError> {
        if self.current_block.is_some() && self.remaining_in_block() == 0 {
            return Ok(None);
        }
        let pos = self.data.tell();
        match read(self) {
            Ok(value) => Ok(Some(value)),
            Err(SceneError::UnexpectedTag { .. }) | Err(SceneError::EndOfInput) => {
                self.data.seek(pos)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    // ------------------------------------------------------------------
    // Typed fields
    // ------------------------------------------------------------------

    /// Reads an untagged CRDT id: author byte, then varuint counter.
    pub fn read_id_raw(&mut self) -> Result<CrdtId, SceneError> {
        let author = self.data.u8()?;
        let counter = self.data.varuint()?;
        Ok(CrdtId::new(author, counter))
    }

    pub fn read_id(&mut self, index: u8) -> Result<CrdtId, SceneError> {
        self.read_tag(index, TagType::Id)?;
        self.read_id_raw()
    }

    pub fn read_bool(&mut self, index: u8) -> Result<bool, SceneError> {
        self.read_tag(index, TagType::Byte1)?;
        Ok(self.data.boolean()?)
    }

    pub fn read_u8(&mut self, index: u8) -> Result<u8, SceneError> {
        self.read_tag(index, TagType::Byte1)?;
        Ok(self.data.u8()?)
    }

    pub fn read_u32(&mut self, index: u8) -> Result<u32, SceneError> {
        self.read_tag(index, TagType::Byte4)?;
        Ok(self.data.u32()?)
    }

    pub fn read_f32(&mut self, index: u8) -> Result<f32, SceneError> {
        self.read_tag(index, TagType::Byte4)?;
        Ok(self.data.f32()?)
    }

    pub fn read_f64(&mut self, index: u8) -> Result<f64, SceneError> {
        self.read_tag(index, TagType::Byte8)?;
        Ok(self.data.f64()?)
    }

    // ------------------------------------------------------------------
    // Sub-blocks
    // ------------------------------------------------------------------

    /// Opens a sub-block at the given index and returns its scope.
    pub fn subblock(&mut self, index: u8) -> Result<SubBlock, SceneError> {
        self.read_tag(index, TagType::Length4)?;
        let length = self.data.u32()? as usize;
        Ok(SubBlock {
            offset: self.data.tell(),
            length,
        })
    }

    /// Closes a sub-block scope, returning unconsumed bytes as extra
    /// data. Reading past the declared length is fatal.
    pub fn end_subblock(&mut self, scope: &SubBlock) -> Result<Vec<u8>, SceneError> {
        self.capture_trailing(scope.end())
    }

    /// `true` when the next tag opens a sub-block at `index` and the
    /// active block has bytes left.
    pub fn has_subblock(&mut self, index: u8) -> bool {
        self.remaining_in_block() > 0 && self.peek_tag(index, TagType::Length4)
    }

    fn capture_trailing(&mut self, end: usize) -> Result<Vec<u8>, SceneError> {
        let pos = self.data.tell();
        if pos > end {
            return Err(SceneError::BlockOverflow { end, pos });
        }
        if pos == end {
            return Ok(Vec::new());
        }
        let extra = self.data.bytes(end - pos)?.to_vec();
        if !self.warned_extra_data {
            self.warned_extra_data = true;
            tracing::warn!(
                bytes = extra.len(),
                "unconsumed extra data in stream; further occurrences not reported"
            );
        }
        Ok(extra)
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    /// Reads a string sub-block: varuint byte length, ascii flag
    /// (required), then UTF-8 bytes.
    pub fn read_string(&mut self, index: u8) -> Result<String, SceneError> {
        let scope = self.subblock(index)?;
        let value = self.read_string_body()?;
        self.end_subblock(&scope)?;
        Ok(value)
    }

    /// Reads a string sub-block that may carry a trailing format code
    /// at index 2 within the same scope.
    pub fn read_string_with_format(&mut self, index: u8) -> Result<(String, Option<u32>), SceneError> {
        let scope = self.subblock(index)?;
        let value = self.read_string_body()?;
        let format = if self.data.tell() < scope.end() {
            self.optional(|r| r.read_u32(2))?
        } else {
            None
        };
        self.end_subblock(&scope)?;
        Ok((value, format))
    }

    fn read_string_body(&mut self) -> Result<String, SceneError> {
        let length = self.data.varuint()? as usize;
        let is_ascii = self.data.boolean()?;
        if !is_ascii {
            return Err(SceneError::InvalidEncoding(
                "string sub-block missing ascii flag".into(),
            ));
        }
        Ok(self.data.utf8(length)?.to_owned())
    }

    // ------------------------------------------------------------------
    // Last-writer-wins registers
    // ------------------------------------------------------------------

    fn read_lww<T>(
        &mut self,
        index: u8,
        value: impl FnOnce(&mut Self) -> Result<T, SceneError>,
    ) -> Result<LwwValue<T>, SceneError> {
        let scope = self.subblock(index)?;
        let timestamp = self.read_id(1)?;
        let value = value(self)?;
        self.end_subblock(&scope)?;
        Ok(LwwValue::new(timestamp, value))
    }

    pub fn read_lww_id(&mut self, index: u8) -> Result<LwwValue<CrdtId>, SceneError> {
        self.read_lww(index, |r| r.read_id(2))
    }

    pub fn read_lww_bool(&mut self, index: u8) -> Result<LwwValue<bool>, SceneError> {
        self.read_lww(index, |r| r.read_bool(2))
    }

    pub fn read_lww_u8(&mut self, index: u8) -> Result<LwwValue<u8>, SceneError> {
        self.read_lww(index, |r| r.read_u8(2))
    }

    pub fn read_lww_f32(&mut self, index: u8) -> Result<LwwValue<f32>, SceneError> {
        self.read_lww(index, |r| r.read_f32(2))
    }

    pub fn read_lww_string(&mut self, index: u8) -> Result<LwwValue<String>, SceneError> {
        self.read_lww(index, |r| r.read_string(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tagged::TaggedBlockWriter;

    #[test]
    fn test_read_header_good() {
        let mut reader = TaggedBlockReader::new(FILE_HEADER_V6);
        assert!(reader.read_header().is_ok());
    }

    #[test]
    fn test_read_header_bad() {
        let mut corrupted = *FILE_HEADER_V6;
        corrupted[42] = b'x';
        let mut reader = TaggedBlockReader::new(&corrupted);
        assert_eq!(reader.read_header(), Err(SceneError::BadHeader));

        let mut reader = TaggedBlockReader::new(&corrupted[..10]);
        assert_eq!(reader.read_header(), Err(SceneError::BadHeader));
    }

    #[test]
    fn test_tag_mismatch_restores_position() {
        let mut writer = TaggedBlockWriter::new();
        writer.write_u32(3, 99);
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        let err = reader.read_id(3).unwrap_err();
        assert!(matches!(err, SceneError::UnexpectedTag { .. }));
        assert_eq!(reader.data.tell(), 0);
        assert_eq!(reader.read_u32(3).unwrap(), 99);
    }

    #[test]
    fn test_peek_tag_never_advances() {
        let mut writer = TaggedBlockWriter::new();
        writer.write_bool(2, true);
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        assert!(reader.peek_tag(2, TagType::Byte1));
        assert_eq!(reader.data.tell(), 0);
        assert!(!reader.peek_tag(2, TagType::Byte4));
        assert_eq!(reader.data.tell(), 0);
        assert!(reader.read_bool(2).unwrap());
    }

    #[test]
    fn test_optional_missing_field() {
        let mut writer = TaggedBlockWriter::new();
        writer.write_u32(5, 7);
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        assert_eq!(reader.optional(|r| r.read_u32(4)).unwrap(), None);
        assert_eq!(reader.optional(|r| r.read_u32(5)).unwrap(), Some(7));
        // At end of input every optional read is None.
        assert_eq!(reader.optional(|r| r.read_u32(5)).unwrap(), None);
    }

    #[test]
    fn test_id_round_trip() {
        let mut writer = TaggedBlockWriter::new();
        writer.write_id(1, CrdtId::new(200, 1_000_000));
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        assert_eq!(reader.read_id(1).unwrap(), CrdtId::new(200, 1_000_000));
    }

    #[test]
    fn test_string_round_trip() {
        let mut writer = TaggedBlockWriter::new();
        writer.write_string(2, "hello").unwrap();
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        assert_eq!(reader.read_string(2).unwrap(), "hello");
    }

    #[test]
    fn test_string_with_format_round_trip() {
        let mut writer = TaggedBlockWriter::new();
        writer.write_string_with_format(6, "\n", Some(2)).unwrap();
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        assert_eq!(
            reader.read_string_with_format(6).unwrap(),
            ("\n".to_owned(), Some(2))
        );
    }

    #[test]
    fn test_lww_round_trip() {
        let mut writer = TaggedBlockWriter::new();
        writer
            .write_lww_string(2, LwwValue::new(CrdtId::new(1, 3), "Layer 1".to_owned()))
            .unwrap();
        writer
            .write_lww_bool(3, LwwValue::new(CrdtId::new(1, 4), false))
            .unwrap();
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        let label = reader.read_lww_string(2).unwrap();
        assert_eq!(label.timestamp, CrdtId::new(1, 3));
        assert_eq!(label.value, "Layer 1");
        let visible = reader.read_lww_bool(3).unwrap();
        assert_eq!(visible.timestamp, CrdtId::new(1, 4));
        assert!(!visible.value);
    }

    #[test]
    fn test_subblock_overflow_is_fatal() {
        // A sub-block declaring 2 bytes whose content reads 4.
        let mut writer = TaggedBlockWriter::new();
        writer.write_tag(4, TagType::Length4);
        writer.data.u32(2);
        writer.data.u32(0xdead_beef);
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        let scope = reader.subblock(4).unwrap();
        reader.data.u32().unwrap();
        let err = reader.end_subblock(&scope).unwrap_err();
        assert!(matches!(err, SceneError::BlockOverflow { .. }));
    }

    #[test]
    fn test_subblock_extra_data_captured() {
        let mut writer = TaggedBlockWriter::new();
        writer
            .subblock(4, |w| {
                w.data.u8(1);
                w.data.u8(2);
                w.data.u8(3);
                Ok(())
            })
            .unwrap();
        let data = writer.into_bytes();

        let mut reader = TaggedBlockReader::new(&data);
        let scope = reader.subblock(4).unwrap();
        reader.data.u8().unwrap();
        let extra = reader.end_subblock(&scope).unwrap();
        assert_eq!(extra, vec![2, 3]);
    }
}
