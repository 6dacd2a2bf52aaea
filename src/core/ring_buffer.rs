//! Fixed-capacity sample ring for real-time audio paths.

/// Fixed-capacity FIFO of samples.
///
/// Storage is allocated once in [`SampleRing::with_capacity`]. No operation
/// allocates or shifts memory afterwards; each copies at most two contiguous
/// segments.
#[derive(Debug, Clone)]
pub struct SampleRing {
    data: Vec<f32>,
    head: usize,
    len: usize,
}

impl SampleRing {
    /// Creates a ring with fixed capacity.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: vec![0.0; cap],
            head: 0,
            len: 0,
        }
    }

    /// Number of samples currently stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Fixed capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Free space in samples.
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Physical index of the first free slot.
    #[inline]
    fn tail(&self) -> usize {
        let cap = self.capacity();
        if cap == 0 {
            0
        } else {
            (self.head + self.len) % cap
        }
    }

    /// Appends as many samples from `input` as fit.
    ///
    /// Returns the number of samples written.
    pub fn push_slice(&mut self, input: &[f32]) -> usize {
        let count = input.len().min(self.free());
        if count == 0 {
            return 0;
        }
        let cap = self.capacity();
        let tail = self.tail();
        let first = count.min(cap - tail);
        self.data[tail..tail + first].copy_from_slice(&input[..first]);
        let second = count - first;
        if second > 0 {
            self.data[..second].copy_from_slice(&input[first..count]);
        }
        self.len += count;
        count
    }

    /// Appends up to `n` zero samples. Returns the number written.
    pub fn push_silence(&mut self, n: usize) -> usize {
        let count = n.min(self.free());
        let cap = self.capacity();
        let mut tail = self.tail();
        for _ in 0..count {
            self.data[tail] = 0.0;
            tail = (tail + 1) % cap;
        }
        self.len += count;
        count
    }

    /// Copies samples from the front into `out` without consuming them.
    ///
    /// Returns the number of samples copied.
    pub fn copy_front(&self, out: &mut [f32]) -> usize {
        let count = out.len().min(self.len);
        if count == 0 {
            return 0;
        }
        let first = count.min(self.capacity() - self.head);
        out[..first].copy_from_slice(&self.data[self.head..self.head + first]);
        let second = count - first;
        if second > 0 {
            out[first..count].copy_from_slice(&self.data[..second]);
        }
        count
    }

    /// Drops up to `n` samples from the front. Returns the number dropped.
    pub fn skip(&mut self, n: usize) -> usize {
        let count = n.min(self.len);
        if count == 0 {
            return 0;
        }
        self.head = (self.head + count) % self.capacity();
        self.len -= count;
        if self.len == 0 {
            self.head = 0;
        }
        count
    }

    /// Moves samples from the front into `out`. Returns the number moved.
    pub fn pop_into(&mut self, out: &mut [f32]) -> usize {
        let count = self.copy_front(out);
        self.skip(count)
    }
}
