use crate::config::ResponseConfig;
use crate::pool::{MemoryPool, PooledBuffer};
use crate::protocol::AllocError;
use tracing::debug;

/// The long lived buffers of one connection, taken from the pool when the connection is
/// accepted and given back when it closes.
#[derive(Debug)]
pub struct ConnectionBuffers {
    pub header: PooledBuffer,
    pub chunk: PooledBuffer,
    pub copy: PooledBuffer,
}

impl ConnectionBuffers {
    /// Allocates the header, chunk and copy buffers sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns the [`AllocError`] of the first failed allocation, buffers allocated before
    /// it are freed back to the pool.
    pub fn allocate(pool: &dyn MemoryPool, config: &ResponseConfig) -> Result<Self, AllocError> {
        let header = pool.allocate(config.response_header_buffer_size)?;

        let chunk = match pool.allocate(config.chunk_buffer_size) {
            Ok(chunk) => chunk,
            Err(e) => {
                pool.free(header);
                return Err(e);
            }
        };

        let copy = match pool.allocate(config.response_buffer_size) {
            Ok(copy) => copy,
            Err(e) => {
                pool.free(header);
                pool.free(chunk);
                return Err(e);
            }
        };

        debug!(
            header = header.capacity(),
            chunk = chunk.capacity(),
            copy = copy.capacity(),
            "connection buffers allocated"
        );
        Ok(Self { header, chunk, copy })
    }

    pub fn release(self, pool: &dyn MemoryPool) {
        pool.free(self.header);
        pool.free(self.chunk);
        pool.free(self.copy);
    }
}
