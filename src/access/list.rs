use crate::buffer::ImageBuffer;
use crate::error::{CographError, Result};

/// A borrowed span of 32-bit offsets, the element shape shared by packed
/// lists, child lists, and edge lists. Iteration order is the order the
/// builder emitted the elements.
#[derive(Debug, Copy, Clone)]
pub struct OffsetList<'a> {
    data: &'a [u8],
}

impl<'a> OffsetList<'a> {
    pub(crate) fn load(buffer: &'a ImageBuffer, offset: u32) -> Result<Self> {
        Ok(Self {
            data: buffer.list_span(offset, 4)?,
        })
    }

    pub fn count(&self) -> u32 {
        (self.data.len() / 4) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: u32) -> Result<u32> {
        if index >= self.count() {
            return Err(CographError::OutOfRange(format!(
                "list index {index} out of {} elements",
                self.count()
            )));
        }
        let at = index as usize * 4;
        Ok(u32::from_le_bytes(
            self.data[at..at + 4]
                .try_into()
                .expect("slice has exactly 4 bytes"),
        ))
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + 'a {
        self.data.chunks_exact(4).map(|chunk| {
            u32::from_le_bytes(chunk.try_into().expect("chunk has exactly 4 bytes"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_over(values: &[u32]) -> Vec<u8> {
        let mut data = Vec::new();
        for value in values {
            data.extend_from_slice(&value.to_le_bytes());
        }
        data
    }

    #[test]
    fn indexing_and_iteration() {
        let data = list_over(&[32, 64, 96]);
        let list = OffsetList { data: &data };
        assert_eq!(list.count(), 3);
        assert_eq!(list.get(0).expect("first"), 32);
        assert_eq!(list.get(2).expect("last"), 96);
        assert!(matches!(list.get(3), Err(CographError::OutOfRange(_))));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![32, 64, 96]);
    }

    #[test]
    fn empty_list() {
        let list = OffsetList { data: &[] };
        assert_eq!(list.count(), 0);
        assert!(list.is_empty());
        assert!(list.iter().next().is_none());
    }
}
