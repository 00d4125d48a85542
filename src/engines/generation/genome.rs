/// Genome representation
///
/// A genome is a byte buffer of fixed capacity holding `size` meaningful bytes.
/// What the bytes mean is up to the `Domain` plugged into the run; the engine
/// only crossovers, mutates and compares them.
///
/// Owned genomes are `Genome`. A borrowed, read-only window over someone
/// else's bytes is a `GenomeView`, which cannot be resized or written.
use crate::error::{EvoError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Genome {
    data: Vec<u8>, // len == capacity, bytes past `size` are zero
    size: usize,
}

impl Genome {
    /// Empty genome with `capacity` zeroed bytes reserved.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|e| EvoError::OutOfMemory(format!("genome of {} bytes: {}", capacity, e)))?;
        data.resize(capacity, 0);
        Ok(Self { data, size: 0 })
    }

    /// Copies `bytes` into a new genome whose size and capacity equal its length.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            size: bytes.len(),
        }
    }

    pub fn view(bytes: &[u8]) -> GenomeView<'_> {
        GenomeView { data: bytes }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.size]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.size]
    }

    /// Sets the logical size. Bytes dropped by shrinking are zeroed.
    pub fn set_size(&mut self, size: usize) -> Result<()> {
        if size > self.capacity() {
            return Err(EvoError::GenomeTooLarge {
                requested: size,
                capacity: self.capacity(),
            });
        }
        if size < self.size {
            self.data[size..self.size].fill(0);
        }
        self.size = size;
        Ok(())
    }

    /// Changes the capacity. Existing bytes are kept, growth is zero-filled,
    /// and shrinking below `size` truncates the genome.
    pub fn resize(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity > self.data.len() {
            self.data
                .try_reserve_exact(new_capacity - self.data.len())
                .map_err(|e| EvoError::OutOfMemory(format!("resize to {} bytes: {}", new_capacity, e)))?;
        }
        self.data.resize(new_capacity, 0);
        self.size = self.size.min(new_capacity);
        Ok(())
    }

    /// Fills the genome with random bytes. An empty genome is first grown to
    /// its full capacity.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        if self.size == 0 {
            self.size = self.capacity();
        }
        rng.fill(&mut self.data[..self.size]);
    }

    pub fn zero(&mut self) {
        self.data.fill(0);
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = checked_end(offset, len, self.size)?;
        Ok(&self.data[offset..end])
    }

    /// Writes `bytes` at `offset`, extending `size` when writing past it.
    /// The write must fit within the capacity.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = checked_end(offset, bytes.len(), self.capacity())?;
        self.data[offset..end].copy_from_slice(bytes);
        self.size = self.size.max(end);
        Ok(())
    }

    /// Number of differing bytes between two genomes of the same size.
    pub fn distance(&self, other: &Genome) -> Result<usize> {
        hamming(self.as_bytes(), other.as_bytes())
    }

    /// Fraction of matching bytes relative to the longer genome, in `[0, 1]`.
    pub fn similarity(&self, other: &Genome) -> f64 {
        byte_similarity(self.as_bytes(), other.as_bytes())
    }
}

/// Borrowed read-only genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenomeView<'a> {
    data: &'a [u8],
}

impl<'a> GenomeView<'a> {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn read(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let end = checked_end(offset, len, self.data.len())?;
        Ok(&self.data[offset..end])
    }

    pub fn distance(&self, other: &GenomeView<'_>) -> Result<usize> {
        hamming(self.data, other.data)
    }

    pub fn to_genome(&self) -> Genome {
        Genome::from_bytes(self.data)
    }
}

fn checked_end(offset: usize, len: usize, limit: usize) -> Result<usize> {
    match offset.checked_add(len) {
        Some(end) if end <= limit => Ok(end),
        _ => Err(EvoError::OutOfBounds {
            offset,
            end: offset.saturating_add(len),
            len: limit,
        }),
    }
}

fn hamming(a: &[u8], b: &[u8]) -> Result<usize> {
    if a.len() != b.len() {
        return Err(EvoError::SizeMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter().zip(b).filter(|(x, y)| x != y).count())
}

pub(crate) fn byte_similarity(a: &[u8], b: &[u8]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 0.0;
    }
    let matching = a.iter().zip(b).filter(|(x, y)| x == y).count();
    matching as f64 / longest as f64
}
