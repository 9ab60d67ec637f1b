use crate::error::{Error, Result};

/// Read cursor over a byte slice. All reads are little-endian.
///
/// Positions are absolute offsets into `data`. A section cursor additionally
/// confines reads to its chunk: reading before its start or past its end
/// fails with [`Error::SectionOverrun`] instead of [`Error::UnexpectedEof`].
#[derive(Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    start: usize,
    end: usize,
    furthest: usize,
    section: Option<[u8; 4]>,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            start: 0,
            end: data.len(),
            furthest: 0,
            section: None,
        }
    }

    /// Cursor over the content of one chunk, `start..end` in absolute offsets.
    pub fn section(data: &'a [u8], magic: [u8; 4], start: usize, end: usize) -> Self {
        Self {
            data,
            pos: start,
            start,
            end: end.min(data.len()),
            furthest: start,
            section: Some(magic),
        }
    }

    /// Current byte position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Absolute offset one past the last readable byte.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Furthest position any read has reached so far.
    ///
    /// Decoders that follow pointer lists jump around; this is what tells the
    /// container how much of a section was actually consumed.
    pub fn furthest(&self) -> usize {
        self.furthest.max(self.pos)
    }

    /// Whether we've reached the end.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.end
    }

    /// Remaining bytes from current position.
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    /// Seek to an absolute position. Seeking outside a section is allowed;
    /// the next read reports it.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Skip `n` bytes forward.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.advance(n);
        Ok(())
    }

    /// Read a slice of `n` bytes without copying.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.advance(n);
        Ok(slice)
    }

    /// Read a 4-byte magic/tag.
    pub fn read_magic(&mut self) -> Result<[u8; 4]> {
        self.read_array()
    }

    /// Read a fixed-size byte array (GUIDs, hashes).
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.read_bytes(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    /// Read a GameMaker string at the current position: u32 length + bytes + null terminator.
    pub fn read_gm_string(&mut self) -> Result<String> {
        let offset = self.pos;
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        // Skip null terminator
        self.skip(1)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::InvalidString {
            offset,
            source: e,
        })
    }

    /// Read a pointer list: u32 count, then count × u32 absolute offsets.
    pub fn read_pointer_list(&mut self) -> Result<Vec<u32>> {
        let count = self.read_u32()? as usize;
        // A corrupt count must not turn into a huge allocation.
        let mut offsets = Vec::with_capacity(count.min(self.remaining() / 4));
        for _ in 0..count {
            offsets.push(self.read_u32()?);
        }
        Ok(offsets)
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.furthest = self.furthest.max(self.pos);
    }

    fn ensure(&self, n: usize) -> Result<()> {
        let before_start = self.pos < self.start;
        if before_start || self.pos.checked_add(n).map_or(true, |end| end > self.end) {
            let have = if before_start { 0 } else { self.remaining() };
            return Err(match self.section {
                Some(magic) => Error::SectionOverrun {
                    magic,
                    offset: self.pos,
                    need: n,
                    have,
                },
                None => Error::UnexpectedEof {
                    offset: self.pos,
                    need: n,
                    have,
                },
            });
        }
        Ok(())
    }
}

/// Writer that builds a byte buffer. All writes are little-endian.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_magic(&mut self, magic: &[u8; 4]) {
        self.buf.extend_from_slice(magic);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a GameMaker string: u32 length + bytes + null terminator.
    pub fn write_gm_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Read back a u32 previously written at `pos`.
    pub fn u32_at(&self, pos: usize) -> u32 {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buf[pos..pos + 4]);
        u32::from_le_bytes(bytes)
    }

    /// Patch a u32 at a specific position (for backpatching sizes and pointers).
    pub fn patch_u32(&mut self, pos: usize, v: u32) {
        let bytes = v.to_le_bytes();
        self.buf[pos..pos + 4].copy_from_slice(&bytes);
    }

    /// Pad with zeros to a multiple of `alignment`.
    pub fn align(&mut self, alignment: usize) {
        if alignment == 0 {
            return;
        }
        while self.buf.len() % alignment != 0 {
            self.buf.push(0);
        }
    }

    /// Start a `magic + size` framed chunk. Returns the header position for
    /// [`Writer::end_chunk`].
    pub fn begin_chunk(&mut self, magic: &[u8; 4]) -> usize {
        let start = self.position();
        self.write_magic(magic);
        self.write_u32(0);
        start
    }

    /// Backpatch the size of the chunk started at `start`.
    pub fn end_chunk(&mut self, start: usize) {
        let size = self.position() - start - 8;
        self.patch_u32(start + 4, size as u32);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_cursor_reports_overrun() {
        let data = [1u8, 0, 0, 0, 2, 0, 0, 0, 3, 0];
        let mut c = Cursor::section(&data, *b"TEST", 4, 8);
        assert_eq!(c.read_u32().unwrap(), 2);
        let err = c.read_u16().unwrap_err();
        assert!(matches!(
            err,
            Error::SectionOverrun {
                magic: [b'T', b'E', b'S', b'T'],
                offset: 8,
                need: 2,
                have: 0,
            }
        ));
    }

    #[test]
    fn section_cursor_rejects_bytes_before_start() {
        let data = [7u8, 0, 0, 0, 2, 0, 0, 0];
        let mut c = Cursor::section(&data, *b"TEST", 4, 8);
        c.seek(0);
        assert!(matches!(
            c.read_u32(),
            Err(Error::SectionOverrun {
                offset: 0,
                need: 4,
                have: 0,
                ..
            })
        ));
        // A read straddling the start is rejected too.
        c.seek(2);
        assert!(matches!(c.read_u32(), Err(Error::SectionOverrun { offset: 2, .. })));
        c.seek(4);
        assert_eq!(c.read_u32().unwrap(), 2);
    }

    #[test]
    fn plain_cursor_reports_eof() {
        let mut c = Cursor::new(&[0u8; 3]);
        assert!(matches!(c.read_u32(), Err(Error::UnexpectedEof { need: 4, have: 3, .. })));
    }

    #[test]
    fn furthest_tracks_jumps() {
        let data = [0u8; 16];
        let mut c = Cursor::new(&data);
        c.seek(12);
        c.read_u32().unwrap();
        c.seek(0);
        c.read_u8().unwrap();
        assert_eq!(c.position(), 1);
        assert_eq!(c.furthest(), 16);
    }

    #[test]
    fn gm_string_round_trip() {
        let mut w = Writer::new();
        w.write_gm_string("hello");
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 4 + 5 + 1);
        let mut c = Cursor::new(&bytes);
        assert_eq!(c.read_gm_string().unwrap(), "hello");
        assert!(c.is_empty());
    }

    #[test]
    fn chunk_framing_patches_size() {
        let mut w = Writer::new();
        let start = w.begin_chunk(b"TEST");
        w.write_u32(7);
        w.write_u8(1);
        w.align(4);
        w.end_chunk(start);
        let bytes = w.into_bytes();
        assert_eq!(&bytes[..4], b"TEST");
        assert_eq!(u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]), 8);
        assert_eq!(bytes.len(), 16);
    }
}
