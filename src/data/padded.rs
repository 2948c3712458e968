//! Fixed-stride view over gathered, padded receive storage.
//!
//! Rank `r` owns rows `[r * stride, (r + 1) * stride)`; each row is `width`
//! elements wide. Only the first `counts[r]` rows of a segment are data, and
//! [`PaddedBuffer::row`] refuses to hand out anything past that bound.

/// Rank-major padded buffer with per-rank valid row counts.
#[derive(Clone, Debug, PartialEq)]
pub struct PaddedBuffer<T> {
    data: Vec<T>,
    counts: Vec<usize>,
    stride: usize,
    width: usize,
}

impl<T> PaddedBuffer<T> {
    /// Wrap `data` (length `counts.len() * stride * width`).
    ///
    /// # Panics
    /// If `data` has the wrong length or a count exceeds `stride`.
    pub fn new(data: Vec<T>, counts: Vec<usize>, stride: usize, width: usize) -> Self {
        assert_eq!(data.len(), counts.len() * stride * width, "padded buffer length");
        assert!(counts.iter().all(|&c| c <= stride), "row count exceeds stride");
        Self {
            data,
            counts,
            stride,
            width,
        }
    }

    /// Number of rank segments.
    pub fn ranks(&self) -> usize {
        self.counts.len()
    }

    /// Rows per rank segment, padding included.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Valid rows in `rank`'s segment.
    pub fn count(&self, rank: usize) -> usize {
        self.counts[rank]
    }

    /// Flat element offset of row `index` in `rank`'s segment.
    #[inline]
    pub fn offset(&self, rank: usize, index: usize) -> usize {
        (rank * self.stride + index) * self.width
    }

    /// Row `index` of `rank`, or `None` if it is padding or out of range.
    pub fn row(&self, rank: usize, index: usize) -> Option<&[T]> {
        if rank >= self.ranks() || index >= self.counts[rank] {
            return None;
        }
        let start = self.offset(rank, index);
        Some(&self.data[start..start + self.width])
    }

    /// Valid rows of `rank`, padding excluded.
    pub fn segment(&self, rank: usize) -> &[T] {
        let start = self.offset(rank, 0);
        &self.data[start..start + self.counts[rank] * self.width]
    }

    /// All valid rows, rank-ascending then index-ascending.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        (0..self.ranks()).flat_map(move |r| self.segment(r).chunks_exact(self.width.max(1)))
    }

    /// Total valid rows over all ranks.
    pub fn total_rows(&self) -> usize {
        self.counts.iter().sum()
    }
}
