use crate::buffer::ImageBuffer;
use crate::error::Result;
use crate::schema::{FixedRecord, PropertyRecord, PROPERTY_SIZE};
use crate::value::Value;

/// One key/value pair; the key is an interned string, the value a tagged
/// variant.
#[derive(Debug, Copy, Clone)]
pub struct Property<'a> {
    buffer: &'a ImageBuffer,
    record: PropertyRecord,
}

impl<'a> Property<'a> {
    pub fn key(&self) -> Result<&'a str> {
        self.buffer.read_cstring(self.record.key_offset)
    }

    pub fn value(&self) -> Result<Value<'a>> {
        Value::read(self.buffer, self.record.value_offset)
    }
}

/// Property collection of a symbol node or CPG edge; a borrowed span of
/// 8-byte records, scanned linearly in emission order.
#[derive(Debug, Copy, Clone)]
pub struct Properties<'a> {
    buffer: &'a ImageBuffer,
    data: &'a [u8],
}

impl<'a> Properties<'a> {
    pub(crate) fn load(buffer: &'a ImageBuffer, offset: u32) -> Result<Self> {
        Ok(Self {
            buffer,
            data: buffer.list_span(offset, PROPERTY_SIZE)?,
        })
    }

    pub fn count(&self) -> u32 {
        (self.data.len() / PROPERTY_SIZE) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: u32) -> Result<Property<'a>> {
        if index >= self.count() {
            return Err(crate::error::CographError::OutOfRange(format!(
                "property index {index} out of {} entries",
                self.count()
            )));
        }
        let at = index as usize * PROPERTY_SIZE;
        Ok(Property {
            buffer: self.buffer,
            record: PropertyRecord::from_bytes(&self.data[at..at + PROPERTY_SIZE])?,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<Property<'a>>> + 'a {
        let buffer = self.buffer;
        self.data.chunks_exact(PROPERTY_SIZE).map(move |chunk| {
            Ok(Property {
                buffer,
                record: PropertyRecord::from_bytes(chunk)?,
            })
        })
    }

    /// Linear scan returning the first property whose key matches.
    pub fn find(&self, key: &str) -> Result<Option<Value<'a>>> {
        for entry in self.iter() {
            let property = entry?;
            if property.key()? == key {
                return Ok(Some(property.value()?));
            }
        }
        Ok(None)
    }
}
