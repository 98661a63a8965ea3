//! Reusable scratch buffers for decode output and sampled encodes.

/// A pool of `Vec` buffers with an acquire/release lifecycle.
///
/// Decode steps run many times over the life of a sketch; renting the
/// emission buffer keeps the per-step allocation at zero after warm-up.
/// Every acquired buffer must be released exactly once, on every path;
/// the sketch keeps its pool private so the pairing stays local to each
/// method.
pub struct BufferPool<T> {
    free: Vec<Vec<T>>,
}

impl<T> BufferPool<T> {
    /// An empty pool.
    pub fn new() -> Self {
        Self { free: Vec::new() }
    }

    /// Take a cleared buffer with at least `hint` capacity.
    pub fn acquire(&mut self, hint: usize) -> Vec<T> {
        match self.free.pop() {
            Some(mut buf) => {
                buf.reserve(hint);
                buf
            }
            None => Vec::with_capacity(hint),
        }
    }

    /// Return a buffer to the pool; contents are dropped.
    pub fn release(&mut self, mut buf: Vec<T>) {
        buf.clear();
        self.free.push(buf);
    }
}

impl<T> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new()
    }
}
