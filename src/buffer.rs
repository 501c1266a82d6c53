use memmap2::Mmap;

use crate::error::{CographError, Result};
use crate::schema::{FixedRecord, Header, HEADER_SIZE};

#[derive(Debug)]
enum ImageData {
    Owned(Vec<u8>),
    Mapped(Mmap),
}

impl ImageData {
    fn bytes(&self) -> &[u8] {
        match self {
            ImageData::Owned(vec) => vec,
            ImageData::Mapped(map) => map,
        }
    }
}

/// Owns (or maps read-only) a complete byte image and hands out bounded
/// borrows into it. All reads are pure; concurrent readers share one
/// buffer freely.
#[derive(Debug)]
pub struct ImageBuffer {
    data: ImageData,
    header: Header,
}

impl ImageBuffer {
    /// Validates the magic tag and format version, then takes ownership of
    /// the image bytes.
    pub fn open(bytes: Vec<u8>) -> Result<Self> {
        let header = Self::validate(&bytes)?;
        Ok(Self {
            data: ImageData::Owned(bytes),
            header,
        })
    }

    /// Same contract as [`ImageBuffer::open`] over a read-only mapping held
    /// for the buffer's lifetime.
    pub(crate) fn from_mmap(map: Mmap) -> Result<Self> {
        let header = Self::validate(&map)?;
        Ok(Self {
            data: ImageData::Mapped(map),
            header,
        })
    }

    fn validate(bytes: &[u8]) -> Result<Header> {
        if bytes.len() < HEADER_SIZE {
            return Err(CographError::Truncated(format!(
                "image of {} bytes is smaller than the {HEADER_SIZE}-byte header",
                bytes.len()
            )));
        }
        Header::from_bytes(&bytes[..HEADER_SIZE])
    }

    pub fn len(&self) -> usize {
        self.data.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.bytes().is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.bytes()
    }

    pub fn header(&self) -> Header {
        self.header
    }

    /// Borrows exactly `length` bytes starting at `offset`.
    pub fn slice(&self, offset: u32, length: usize) -> Result<&[u8]> {
        let start = offset as usize;
        let end = start
            .checked_add(length)
            .ok_or_else(|| CographError::OutOfRange(format!("slice at {offset} overflows")))?;
        let bytes = self.data.bytes();
        if end > bytes.len() {
            return Err(CographError::OutOfRange(format!(
                "slice {start}..{end} exceeds image length {}",
                bytes.len()
            )));
        }
        Ok(&bytes[start..end])
    }

    /// Decodes a fixed record at `offset` into a copy.
    pub fn read<T: FixedRecord>(&self, offset: u32) -> Result<T> {
        let bytes = self.slice(offset, T::SIZE).map_err(|_| {
            CographError::OutOfRange(format!(
                "{} record at offset {offset} exceeds image length {}",
                T::NAME,
                self.len()
            ))
        })?;
        T::from_bytes(bytes)
    }

    /// Borrows the null-terminated UTF-8 string starting at `offset`,
    /// exclusive of the terminator.
    pub fn read_cstring(&self, offset: u32) -> Result<&str> {
        let bytes = self.data.bytes();
        let start = offset as usize;
        if start >= bytes.len() {
            return Err(CographError::OutOfRange(format!(
                "string offset {offset} exceeds image length {}",
                bytes.len()
            )));
        }
        let tail = &bytes[start..];
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(CographError::Unterminated(offset))?;
        std::str::from_utf8(&tail[..nul]).map_err(|_| CographError::InvalidUtf8(offset))
    }

    /// Reads the leading 32-bit element count of a list region. Offset 0 is
    /// the absent-list sentinel and reads as zero.
    pub fn list_count(&self, offset: u32) -> Result<u32> {
        if offset == 0 {
            return Ok(0);
        }
        let bytes = self.slice(offset, 4)?;
        Ok(u32::from_le_bytes(
            bytes.try_into().expect("slice has exactly 4 bytes"),
        ))
    }

    /// Borrows the `count * element_size` bytes following a list count.
    /// Offset 0 yields an empty span; an absent list and a present list
    /// with count 0 are indistinguishable to readers.
    pub fn list_span(&self, offset: u32, element_size: usize) -> Result<&[u8]> {
        if offset == 0 {
            return Ok(&[]);
        }
        let count = self.list_count(offset)? as usize;
        let length = count.checked_mul(element_size).ok_or_else(|| {
            CographError::OutOfRange(format!("list at {offset} with count {count} overflows"))
        })?;
        let elements = offset.checked_add(4).ok_or_else(|| {
            CographError::OutOfRange(format!("list elements at {offset} overflow"))
        })?;
        self.slice(elements, length)
    }

    /// Borrows the verbatim source text section.
    pub fn source_text(&self) -> Result<&str> {
        let header = self.header;
        if header.source_len == 0 {
            return Ok("");
        }
        let bytes = self.slice(header.source_offset, header.source_len as usize)?;
        std::str::from_utf8(bytes).map_err(|_| CographError::InvalidUtf8(header.source_offset))
    }
}
