//! Outbound payload chunking.
//!
//! Payloads larger than one chunk are sent as consecutive datagrams of at most
//! `chunk_size` bytes, in order. The receiver sees them as independent
//! datagrams; no framing is added.

/// Splits `payload` into chunks of at most `chunk_size` bytes.
///
/// An empty payload yields no chunks.
///
/// # Panics
///
/// Panics if `chunk_size` is zero.
pub fn chunks(payload: &[u8], chunk_size: usize) -> std::slice::Chunks<'_, u8> {
    payload.chunks(chunk_size)
}

/// Number of datagrams [`chunks`] will produce.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SEND_CHUNK_SIZE;

    #[test]
    fn test_2500_bytes_split_into_1024_1024_452() {
        // Arrange
        let payload = vec![0xA5u8; 2500];

        // Act
        let sizes: Vec<usize> = chunks(&payload, SEND_CHUNK_SIZE).map(<[u8]>::len).collect();

        // Assert
        assert_eq!(sizes, vec![1024, 1024, 452]);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_chunk() {
        let payload = vec![0u8; 2048];
        assert_eq!(chunks(&payload, SEND_CHUNK_SIZE).count(), 2);
        assert_eq!(chunk_count(2048, SEND_CHUNK_SIZE), 2);
    }

    #[test]
    fn test_empty_payload_has_no_chunks() {
        assert_eq!(chunks(&[], SEND_CHUNK_SIZE).count(), 0);
        assert_eq!(chunk_count(0, SEND_CHUNK_SIZE), 0);
    }

    #[test]
    fn test_chunks_preserve_byte_order() {
        // Arrange
        let payload: Vec<u8> = (0..=255u8).cycle().take(1100).collect();

        // Act
        let rejoined: Vec<u8> = chunks(&payload, SEND_CHUNK_SIZE).flatten().copied().collect();

        // Assert
        assert_eq!(rejoined, payload);
    }
}
