//! Packed little-endian record codec.
//!
//! Host and command records are stored in NVS as fixed-layout blobs: every
//! string occupies a zero-padded field of fixed width (its last byte is
//! always NUL), integers are little-endian. The layout must stay stable
//! across firmware versions so existing deployments keep their catalogs.

/// Sequential writer into a zero-filled buffer of exact record size.
pub struct RecordWriter {
    buf: Vec<u8>,
}

impl RecordWriter {
    pub fn with_size(size: usize) -> Self {
        Self {
            buf: Vec::with_capacity(size),
        }
    }

    /// Write `s` into a `width`-byte field, cut to `width - 1` bytes on a
    /// character boundary so the field stays NUL-terminated.
    pub fn str(&mut self, s: &str, width: usize) -> &mut Self {
        let s = crate::bounded::truncate_str(s, width.saturating_sub(1));
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.resize(self.buf.len() + (width - s.len()), 0);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(u8::from(v))
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Sequential reader over a record blob. Reads past the end yield zeros.
pub struct RecordReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RecordReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let start = self.pos.min(self.data.len());
        let end = (self.pos + n).min(self.data.len());
        self.pos += n;
        &self.data[start..end]
    }

    /// Field text up to the first NUL. Invalid UTF-8 is replaced.
    pub fn str(&mut self, width: usize) -> String {
        let field = self.take(width);
        let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8_lossy(&field[..len]).into_owned()
    }

    pub fn u8(&mut self) -> u8 {
        self.take(1).first().copied().unwrap_or(0)
    }

    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    pub fn u16(&mut self) -> u16 {
        let mut b = [0u8; 2];
        let src = self.take(2);
        b[..src.len()].copy_from_slice(src);
        u16::from_le_bytes(b)
    }

    pub fn u32(&mut self) -> u32 {
        let mut b = [0u8; 4];
        let src = self.take(4);
        b[..src.len()].copy_from_slice(src);
        u32::from_le_bytes(b)
    }
}
