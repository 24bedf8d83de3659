//! # Chunked Transfer Buffer
//!
//! BLE writes without response carry a small payload, so a print job is
//! streamed as a sequence of bounded chunks. The buffer hands them out in
//! order, once each, then reports exhaustion.
//!
//! ```text
//! 70 bytes, chunk size 32:  [0..32] [32..64] [64..70] None
//! ```

/// Byte sequence consumed front to back by [`TransferBuffer::extract`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferBuffer {
    data: Vec<u8>,
    cursor: usize,
}

impl TransferBuffer {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }

    /// Remove and return up to `max_chunk_size` bytes from the head.
    ///
    /// Returns `None` once every byte has been handed out. A zero
    /// `max_chunk_size` also yields `None` rather than an empty chunk.
    pub fn extract(&mut self, max_chunk_size: usize) -> Option<&[u8]> {
        if self.is_empty() || max_chunk_size == 0 {
            return None;
        }
        let start = self.cursor;
        let end = (start + max_chunk_size).min(self.data.len());
        self.cursor = end;
        Some(&self.data[start..end])
    }

    /// Bytes not yet extracted
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Bytes extracted so far
    #[inline]
    pub fn consumed(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_70_bytes_in_32_byte_chunks() {
        let data: Vec<u8> = (0..70).collect();
        let mut buffer = TransferBuffer::new(data.clone());

        assert_eq!(buffer.extract(32), Some(&data[0..32]));
        assert_eq!(buffer.extract(32), Some(&data[32..64]));
        assert_eq!(buffer.extract(32), Some(&data[64..70]));
        assert_eq!(buffer.extract(32), None);
        assert_eq!(buffer.consumed(), 70);
    }

    #[test]
    fn test_exact_multiple() {
        let mut buffer = TransferBuffer::new(vec![7; 64]);
        assert_eq!(buffer.extract(32).map(<[u8]>::len), Some(32));
        assert_eq!(buffer.remaining(), 32);
        assert_eq!(buffer.extract(32).map(<[u8]>::len), Some(32));
        assert!(buffer.is_empty());
        assert_eq!(buffer.extract(32), None);
    }

    #[test]
    fn test_empty_buffer() {
        let mut buffer = TransferBuffer::default();
        assert!(buffer.is_empty());
        assert_eq!(buffer.extract(32), None);
    }

    #[test]
    fn test_zero_chunk_size() {
        let mut buffer = TransferBuffer::new(vec![1, 2, 3]);
        assert_eq!(buffer.extract(0), None);
        assert_eq!(buffer.remaining(), 3);
    }

    #[test]
    fn test_reassembles_in_order() {
        let data: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let mut buffer = TransferBuffer::new(data.clone());
        let mut out = Vec::new();
        while let Some(chunk) = buffer.extract(17) {
            out.extend_from_slice(chunk);
        }
        assert_eq!(out, data);
    }
}
