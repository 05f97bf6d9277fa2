/*!
A pool of reusable byte buffers.

The block codecs assemble every block in a transient byte accumulator before
compressing or persisting it. Pooling those accumulators keeps the allocator
out of the flush and compaction hot paths. The pool makes no promise beyond
"a buffer handed out is empty"; capacity is whatever a previous user grew the
buffer to.
*/

use parking_lot::Mutex;

/// A concurrent pool of growable byte buffers.
#[derive(Debug, Default)]
pub(crate) struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// Create an empty [`BufferPool`].
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Get a cleared buffer from the pool, allocating a fresh one if the pool is empty.
    pub(crate) fn get(&self) -> Vec<u8> {
        self.buffers.lock().pop().unwrap_or_default()
    }

    /// Return a buffer to the pool. The buffer's contents are cleared.
    pub(crate) fn put(&self, mut buffer: Vec<u8>) {
        buffer.clear();
        self.buffers.lock().push(buffer);
    }
}
