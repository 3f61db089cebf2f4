//! Fixed-Capacity Ring Buffer
//!
//! A tiny arena-plus-index ring with compile-time capacity, used for the
//! pulse history and the random-draw loop/history buffers. All logical
//! indexing goes through [`Ring::at`], which keeps the modular arithmetic in
//! one place instead of scattering `(head + N - k) % N` expressions through
//! the estimators.

/// Bounded FIFO with overwrite-oldest eviction. Never allocates.
#[derive(Debug, Clone)]
pub struct Ring<T, const N: usize> {
    buffer: [T; N],
    head: usize,
}

impl<T: Copy + Default, const N: usize> Default for Ring<T, N> {
    fn default() -> Self {
        Self::filled(T::default())
    }
}

impl<T: Copy, const N: usize> Ring<T, N> {
    /// Create a ring with every slot set to `value`.
    pub fn filled(value: T) -> Self {
        Self {
            buffer: [value; N],
            head: 0,
        }
    }

    /// Capacity (slots start at the fill value and are always readable).
    #[inline]
    pub const fn len(&self) -> usize {
        N
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    /// Overwrite all slots with `value` and rewind the head.
    pub fn reset(&mut self, value: T) {
        self.buffer = [value; N];
        self.head = 0;
    }

    /// Advance the head and write `value` into the new current slot.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.head = (self.head + 1) % N;
        self.buffer[self.head] = value;
    }

    /// Read the entry written `age` pushes ago (`age == 0` is the current
    /// slot). Ages larger than the capacity wrap.
    #[inline]
    pub fn at(&self, age: usize) -> &T {
        &self.buffer[(self.head + N - (age % N)) % N]
    }

    /// Mutable access to the current slot.
    #[inline]
    pub fn current_mut(&mut self) -> &mut T {
        &mut self.buffer[self.head]
    }

    /// Current slot, read-only.
    #[inline]
    pub fn current(&self) -> &T {
        &self.buffer[self.head]
    }

    /// Iterate over all slots in storage order (no particular age order).
    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.buffer.iter()
    }
}
