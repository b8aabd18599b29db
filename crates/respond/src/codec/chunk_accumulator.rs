//! Chunked transfer encoding framer working in place on a connection owned buffer.
//!
//! The chunk size is only known once the body bytes of a chunk have been
//! accumulated, so the first [`RESERVED_SIZE`] bytes of the buffer are kept free. When
//! the chunk is finalized the hex size and its CRLF are written right aligned against
//! the start of the body bytes, and the chunk is handed out as a single contiguous
//! slice without copying the body a second time.
//!
//! ```text
//! |<------ RESERVED_SIZE ------>|<---- body ---->|<- tail ->|
//! | unused ........ | 1a3\r\n   | ...........    | \r\n 0\r\n\r\n |
//!                   ^ reserved offset
//! ```

use crate::pool::PooledBuffer;

/// Bytes kept at the head of the buffer for the hex chunk size and its CRLF
pub const RESERVED_SIZE: usize = 16;

pub(crate) const CRLF: &[u8; 2] = b"\r\n";

/// The terminal zero sized chunk with an empty trailer section
pub const LAST_CHUNK: &[u8; 5] = b"0\r\n\r\n";

/// Bytes kept at the end of the buffer, the CRLF closing the chunk data followed by
/// the terminal chunk when the chunk is the final one
const TAIL_RESERVE: usize = CRLF.len() + LAST_CHUNK.len();

/// Smallest buffer able to frame a chunk with at least one body byte
pub const MIN_CHUNK_BUFFER_SIZE: usize = RESERVED_SIZE + TAIL_RESERVE + 1;

/// Worst case size text: two hex digits per byte of the size plus CRLF
pub const MAX_SIZE_TEXT: usize = 2 * size_of::<usize>() + CRLF.len();

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Writes `size` as lowercase hex without leading zeros followed by CRLF into `out`,
/// returning the number of bytes written.
pub fn encode_chunk_size(size: usize, out: &mut [u8; MAX_SIZE_TEXT]) -> usize {
    let digits = if size == 0 { 1 } else { (usize::BITS - size.leading_zeros()).div_ceil(4) as usize };

    let mut remaining = size;
    for slot in out[..digits].iter_mut().rev() {
        *slot = HEX_DIGITS[remaining & 0xf];
        remaining >>= 4;
    }
    out[digits..digits + CRLF.len()].copy_from_slice(CRLF);
    digits + CRLF.len()
}

/// Offset of the first size byte when the size text is right aligned against the
/// start of the chunk body.
///
/// # Panics
///
/// Panics when the size text does not fit the reserved prefix, which can only happen
/// with a buffer far larger than any chunk buffer the config accepts.
#[inline]
pub fn reserved_offset(size_text_len: usize) -> usize {
    assert!(
        size_text_len <= RESERVED_SIZE,
        "chunk size text of {size_text_len} bytes exceed the reserved prefix of {RESERVED_SIZE} bytes"
    );
    RESERVED_SIZE - size_text_len
}

/// Frames body bytes into one http chunk, reused for every chunk of every request
/// served by a connection.
#[derive(Debug)]
pub struct ChunkAccumulator {
    buffer: PooledBuffer,
}

impl ChunkAccumulator {
    /// # Panics
    ///
    /// Panics if the buffer is smaller than [`MIN_CHUNK_BUFFER_SIZE`], `ResponseConfig::validate`
    /// rejects such sizes before any buffer is allocated.
    pub fn new(buffer: PooledBuffer) -> Self {
        assert!(
            buffer.capacity() >= MIN_CHUNK_BUFFER_SIZE,
            "chunk buffer of {} bytes is below the minimum {MIN_CHUNK_BUFFER_SIZE}",
            buffer.capacity()
        );
        Self { buffer }
    }

    /// Maximum number of body bytes a single chunk can hold
    #[inline]
    pub fn segment_capacity(&self) -> usize {
        self.buffer.capacity() - RESERVED_SIZE - TAIL_RESERVE
    }

    /// The writable region following the reserved prefix and the `accumulated` body bytes.
    pub fn remaining_segment(&mut self, accumulated: usize) -> &mut [u8] {
        debug_assert!(accumulated <= self.segment_capacity());
        let end = self.buffer.capacity() - TAIL_RESERVE;
        &mut self.buffer[RESERVED_SIZE + accumulated..end]
    }

    /// Finalizes the chunk holding `accumulated` body bytes and returns the complete
    /// framed chunk, followed by the terminal chunk when `is_final` is set.
    ///
    /// # Panics
    ///
    /// Panics if `accumulated` is larger than [`segment_capacity`](Self::segment_capacity).
    pub fn chunk_data(&mut self, accumulated: usize, is_final: bool) -> &[u8] {
        assert!(
            accumulated <= self.segment_capacity(),
            "accumulated {accumulated} bytes exceed the chunk segment capacity {}",
            self.segment_capacity()
        );

        let mut size_text = [0u8; MAX_SIZE_TEXT];
        let size_text_len = encode_chunk_size(accumulated, &mut size_text);
        let offset = reserved_offset(size_text_len);
        self.buffer[offset..RESERVED_SIZE].copy_from_slice(&size_text[..size_text_len]);

        let mut end = RESERVED_SIZE + accumulated;
        self.buffer[end..end + CRLF.len()].copy_from_slice(CRLF);
        end += CRLF.len();

        if is_final {
            self.buffer[end..end + LAST_CHUNK.len()].copy_from_slice(LAST_CHUNK);
            end += LAST_CHUNK.len();
        }

        &self.buffer[offset..end]
    }

    pub fn into_buffer(self) -> PooledBuffer {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accumulator(size: usize) -> ChunkAccumulator {
        ChunkAccumulator::new(PooledBuffer::try_new(size).unwrap())
    }

    fn fill(accumulator: &mut ChunkAccumulator, data: &[u8]) -> usize {
        let segment = accumulator.remaining_segment(0);
        segment[..data.len()].copy_from_slice(data);
        data.len()
    }

    #[test]
    fn test_encode_chunk_size() {
        let mut out = [0u8; MAX_SIZE_TEXT];
        let len = encode_chunk_size(0, &mut out);
        assert_eq!(&out[..len], b"0\r\n");

        let len = encode_chunk_size(0xab, &mut out);
        assert_eq!(&out[..len], b"ab\r\n");

        let len = encode_chunk_size(4096, &mut out);
        assert_eq!(&out[..len], b"1000\r\n");

        let len = encode_chunk_size(usize::MAX, &mut out);
        assert_eq!(len, 2 * size_of::<usize>() + 2);
        assert!(out[..len - 2].iter().all(|&b| b == b'f'));
    }

    #[test]
    fn test_reserved_offset() {
        assert_eq!(reserved_offset(3), RESERVED_SIZE - 3);
        assert_eq!(reserved_offset(RESERVED_SIZE), 0);
    }

    #[test]
    #[should_panic(expected = "exceed the reserved prefix")]
    fn test_reserved_offset_overflow() {
        reserved_offset(RESERVED_SIZE + 1);
    }

    #[test]
    fn test_single_chunk() {
        let mut accumulator = accumulator(64);
        let accumulated = fill(&mut accumulator, b"hello");
        assert_eq!(accumulator.chunk_data(accumulated, false), b"5\r\nhello\r\n");
    }

    #[test]
    fn test_final_chunk() {
        let mut accumulator = accumulator(64);
        let accumulated = fill(&mut accumulator, b"hello");
        assert_eq!(accumulator.chunk_data(accumulated, true), b"5\r\nhello\r\n0\r\n\r\n");
    }

    #[test]
    fn test_accumulate_in_steps() {
        let mut accumulator = accumulator(64);
        accumulator.remaining_segment(0)[..2].copy_from_slice(b"ab");
        accumulator.remaining_segment(2)[..1].copy_from_slice(b"c");
        assert_eq!(accumulator.chunk_data(3, false), b"3\r\nabc\r\n");
    }

    #[test]
    fn test_reuse_with_different_size_width() {
        let mut accumulator = accumulator(512);
        let large = vec![b'x'; 300];
        let accumulated = fill(&mut accumulator, &large);
        let chunk = accumulator.chunk_data(accumulated, false).to_vec();
        assert!(chunk.starts_with(b"12c\r\nxxx"));

        // a narrower size text must not leave the previous wider one visible
        let accumulated = fill(&mut accumulator, b"z");
        assert_eq!(accumulator.chunk_data(accumulated, false), b"1\r\nz\r\n");
    }

    #[test]
    fn test_segment_leaves_room_for_tail() {
        let mut accumulator = accumulator(MIN_CHUNK_BUFFER_SIZE);
        assert_eq!(accumulator.segment_capacity(), 1);
        assert_eq!(accumulator.remaining_segment(0).len(), 1);
        assert!(accumulator.remaining_segment(1).is_empty());

        let accumulated = fill(&mut accumulator, b"!");
        assert_eq!(accumulator.chunk_data(accumulated, true), b"1\r\n!\r\n0\r\n\r\n");
    }

    #[test]
    fn test_every_accumulated_size_stays_in_bounds() {
        let size = 300;
        let mut accumulator = accumulator(size);
        for accumulated in 0..=accumulator.segment_capacity() {
            for is_final in [false, true] {
                let data_len = accumulator.chunk_data(accumulated, is_final).len();
                let expected = format!("{accumulated:x}\r\n").len()
                    + accumulated
                    + CRLF.len()
                    + if is_final { LAST_CHUNK.len() } else { 0 };
                assert_eq!(data_len, expected);
                assert!(data_len <= size);
            }
        }
    }

    #[test]
    #[should_panic(expected = "exceed the chunk segment capacity")]
    fn test_accumulated_beyond_capacity() {
        let mut accumulator = accumulator(64);
        let capacity = accumulator.segment_capacity();
        accumulator.chunk_data(capacity + 1, false);
    }
}
