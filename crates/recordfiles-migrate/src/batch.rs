//! Splitting identifier sets into query-sized batches.
//!
//! Remote stores cap the length of a filter clause (and of the URL carrying
//! it), so every downstream query works on one bounded [`Batch`] at a time.

/// Default number of identifiers inlined into one query.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A bounded, ordered slice of a larger sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    /// 1-based position of this batch in the sequence.
    pub number: usize,
    /// Items in input order.
    pub items: Vec<T>,
}

/// A batch of record identifiers.
pub type IdentifierBatch = Batch<String>;

impl<T> Batch<T> {
    /// Number of items in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Lazy iterator over consecutive batches of an input iterator.
#[derive(Debug)]
pub struct Batches<I> {
    inner: I,
    size: usize,
    emitted: usize,
}

impl<I: Iterator> Iterator for Batches<I> {
    type Item = Batch<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        let items: Vec<I::Item> = self.inner.by_ref().take(self.size).collect();
        if items.is_empty() {
            return None;
        }
        self.emitted += 1;
        Some(Batch {
            number: self.emitted,
            items,
        })
    }
}

/// Splits `items` into consecutive batches of at most `size` elements.
///
/// Every element lands in exactly one batch and input order is kept. An
/// empty input yields no batches. A `size` of 0 is treated as 1; config
/// validation rejects it before it gets here.
pub fn batches<I: IntoIterator>(items: I, size: usize) -> Batches<I::IntoIter> {
    Batches {
        inner: items.into_iter(),
        size: size.max(1),
        emitted: 0,
    }
}

/// Number of batches [`batches`] produces for `len` items.
#[must_use]
pub fn batch_count(len: usize, size: usize) -> usize {
    len.div_ceil(size.max(1))
}

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;
