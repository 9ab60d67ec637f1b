use crate::context::WriteCtx;
use crate::error::Result;
use crate::reader::FORM_MAGIC;
use crate::version::FormatVersion;

/// Emits the FORM envelope around chunks written in order.
pub struct FormWriter {
    ctx: WriteCtx,
    form_start: usize,
    alignment: usize,
}

impl FormWriter {
    /// With `alignment`, every chunk is zero-padded so the next one starts at
    /// a multiple of that many bytes.
    pub fn new(version: FormatVersion, alignment: Option<u32>) -> Self {
        let mut ctx = WriteCtx::new(version);
        let form_start = ctx.begin_chunk(&FORM_MAGIC);
        Self {
            ctx,
            form_start,
            alignment: alignment.unwrap_or(0) as usize,
        }
    }

    /// Write one `magic + size` chunk whose content `body` produces.
    pub fn chunk(
        &mut self,
        magic: &[u8; 4],
        body: impl FnOnce(&mut WriteCtx) -> Result<()>,
    ) -> Result<()> {
        let start = self.ctx.begin_chunk(magic);
        body(&mut self.ctx)?;
        self.ctx.align(self.alignment);
        self.ctx.end_chunk(start);
        tracing::debug!(
            chunk = %String::from_utf8_lossy(magic),
            offset = start,
            size = self.ctx.position() - start - 8,
            "encoded chunk"
        );
        Ok(())
    }

    pub fn ctx_mut(&mut self) -> &mut WriteCtx {
        &mut self.ctx
    }

    /// Close the envelope and apply queued pointer patches.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        self.ctx.end_chunk(self.form_start);
        self.ctx.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ChunkIndex;

    #[test]
    fn test_envelope() {
        let mut form = FormWriter::new(FormatVersion::default(), Some(8));
        form.chunk(b"AAAA", |w| {
            w.write_u8(1);
            Ok(())
        })
        .unwrap();
        form.chunk(b"BBBB", |_| Ok(())).unwrap();
        let bytes = form.finish().unwrap();

        let index = ChunkIndex::parse(&bytes).unwrap();
        let sizes: Vec<_> = index.chunks().iter().map(|c| (c.magic, c.size)).collect();
        assert_eq!(sizes, vec![(*b"AAAA", 8), (*b"BBBB", 0)]);
        assert_eq!(bytes.len(), 8 + 16 + 8);
    }
}
