//! Output buffer abstraction for the serializer.

/// Trait for types that can receive serialized message bytes.
pub trait RosBuffer {
    /// Append bytes to the buffer.
    fn extend_from_slice(&mut self, data: &[u8]);

    /// Append a single byte.
    fn push(&mut self, byte: u8);

    /// Current length of buffered data.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve capacity for at least `additional` more bytes.
    fn reserve(&mut self, _additional: usize) {}

    /// Clear the buffer for reuse.
    fn clear(&mut self);
}

impl RosBuffer for Vec<u8> {
    #[inline(always)]
    fn extend_from_slice(&mut self, data: &[u8]) {
        Vec::extend_from_slice(self, data)
    }

    #[inline(always)]
    fn push(&mut self, byte: u8) {
        Vec::push(self, byte)
    }

    #[inline(always)]
    fn len(&self) -> usize {
        Vec::len(self)
    }

    #[inline(always)]
    fn reserve(&mut self, additional: usize) {
        Vec::reserve(self, additional)
    }

    #[inline(always)]
    fn clear(&mut self) {
        Vec::clear(self)
    }
}
