use crate::cursor::Cursor;
use crate::error::{Error, Result};

/// Magic bytes for the FORM container.
pub(crate) const FORM_MAGIC: [u8; 4] = *b"FORM";

/// A single chunk entry in the file.
#[derive(Debug, Clone, Copy)]
pub struct ChunkEntry {
    /// 4-byte ASCII magic identifying the chunk type.
    pub magic: [u8; 4],
    /// Absolute byte offset of the chunk header (magic field) in the file.
    pub offset: usize,
    /// Size of the chunk's content (excluding the 8-byte header).
    pub size: usize,
}

impl ChunkEntry {
    /// Absolute offset where chunk content begins (after magic + size fields).
    pub fn data_offset(&self) -> usize {
        self.offset + 8
    }

    /// Absolute offset one past the chunk content.
    pub fn end_offset(&self) -> usize {
        self.data_offset() + self.size
    }

    /// Magic as a string (for display).
    pub fn magic_str(&self) -> &str {
        std::str::from_utf8(&self.magic).unwrap_or("????")
    }

    /// Cursor bounded to this chunk's content.
    pub fn cursor<'a>(&self, data: &'a [u8]) -> Cursor<'a> {
        Cursor::section(data, self.magic, self.data_offset(), self.end_offset())
    }
}

/// Index of all top-level chunks in a FORM file.
///
/// It only knows about the FORM envelope and chunk boundaries and does not
/// parse any chunk internals.
pub struct ChunkIndex {
    /// Ordered list of chunks as they appear in the file.
    chunks: Vec<ChunkEntry>,
}

impl ChunkIndex {
    /// Parse the FORM envelope and build a chunk index.
    ///
    /// The `data` slice must be the entire file contents.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(data);

        // Read FORM header
        let magic = cursor.read_magic()?;
        if magic != FORM_MAGIC {
            return Err(Error::InvalidMagic {
                expected: FORM_MAGIC,
                found: magic,
            });
        }
        let form_size = cursor.read_u32()? as usize;
        let form_end = 8 + form_size;

        // Iterate over chunks
        let mut chunks = Vec::new();
        while cursor.position() < form_end {
            let chunk_offset = cursor.position();

            let chunk_magic = cursor.read_magic()?;
            // Validate chunk magic is ASCII
            if !chunk_magic.iter().all(|&b| b.is_ascii_alphanumeric()) {
                return Err(Error::InvalidChunkMagic {
                    offset: chunk_offset,
                    magic: chunk_magic,
                });
            }

            let chunk_size = cursor.read_u32()? as usize;
            if cursor.remaining() < chunk_size {
                return Err(Error::UnexpectedEof {
                    offset: cursor.position(),
                    need: chunk_size,
                    have: cursor.remaining(),
                });
            }
            chunks.push(ChunkEntry {
                magic: chunk_magic,
                offset: chunk_offset,
                size: chunk_size,
            });

            // Skip to next chunk
            cursor.seek(chunk_offset + 8 + chunk_size);
        }

        Ok(Self { chunks })
    }

    /// All chunks in file order.
    pub fn chunks(&self) -> &[ChunkEntry] {
        &self.chunks
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Find a chunk by its 4-byte magic. Returns the first match.
    pub fn find(&self, magic: &[u8; 4]) -> Option<&ChunkEntry> {
        self.chunks.iter().find(|c| &c.magic == magic)
    }

    /// Get the raw content bytes for a chunk from the file data.
    pub fn chunk_data<'a>(&self, data: &'a [u8], magic: &[u8; 4]) -> Result<&'a [u8]> {
        let entry = self.find(magic).ok_or(Error::ChunkNotFound { magic: *magic })?;
        let start = entry.data_offset();
        let end = entry.end_offset();
        if end > data.len() {
            return Err(Error::UnexpectedEof {
                offset: start,
                need: entry.size,
                have: data.len().saturating_sub(start),
            });
        }
        Ok(&data[start..end])
    }
}

/// Scan `data` (a Windows PE executable) for an embedded GameMaker FORM blob.
///
/// Searches every `FORM` occurrence and validates that the declared FORM size fits
/// within the remaining file. Returns the byte offset of the first valid FORM header,
/// or `None` if no valid FORM is found.
///
/// A PE file may contain false-positive `FORM` byte sequences (e.g. inside the
/// import table or resource section), so each candidate is validated before accepting.
pub fn find_embedded_form(data: &[u8]) -> Option<usize> {
    // The PE prefix is typically several MB; a linear scan is fine for a one-off.
    for offset in 0..data.len().saturating_sub(7) {
        if data[offset..offset + 4] != FORM_MAGIC {
            continue;
        }
        let size_bytes: [u8; 4] = data[offset + 4..offset + 8].try_into().ok()?;
        let form_size = u32::from_le_bytes(size_bytes) as usize;
        // 8-byte header + content must fit within the file.
        if offset + 8 + form_size <= data.len() {
            return Some(offset);
        }
    }
    None
}
