// Closed block ranges for historical log queries

use std::fmt;

/// Closed range `[from, to]` of block numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    /// Returns `None` when `from > to`
    pub fn new(from: u64, to: u64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// Saturates at `u64::MAX` for the full `[0, u64::MAX]` range
    pub fn len(&self) -> u64 {
        (self.to - self.from).saturating_add(1)
    }

    /// Splits the range into consecutive ascending sub-ranges of at most `chunk_size` blocks.
    /// Node providers cap the span of a single `eth_getLogs` call.
    pub fn chunks(&self, chunk_size: u64) -> Vec<BlockRange> {
        let chunk_size = chunk_size.max(1);
        let mut chunks = Vec::new();
        let mut current_from = self.from;
        loop {
            let current_to = current_from.saturating_add(chunk_size - 1).min(self.to);
            chunks.push(BlockRange {
                from: current_from,
                to: current_to,
            });
            if current_to == self.to {
                break;
            }
            current_from = current_to + 1;
        }
        chunks
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inverted_range_rejected() {
        assert!(BlockRange::new(10, 9).is_none());
        assert_eq!(BlockRange::new(10, 10).map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_chunks_cover_range_in_order() {
        let range = BlockRange::new(8_585_483, 8_585_502).unwrap();
        let chunks = range.chunks(8);
        assert_eq!(
            chunks,
            vec![
                BlockRange { from: 8_585_483, to: 8_585_490 },
                BlockRange { from: 8_585_491, to: 8_585_498 },
                BlockRange { from: 8_585_499, to: 8_585_502 },
            ]
        );
        assert_eq!(chunks.iter().map(BlockRange::len).sum::<u64>(), range.len());
    }

    #[test]
    fn test_chunk_larger_than_range() {
        let range = BlockRange::new(5, 7).unwrap();
        assert_eq!(range.chunks(2000), vec![range]);
    }

    #[test]
    fn test_range_ending_at_u64_max_terminates() {
        let range = BlockRange::new(u64::MAX - 2, u64::MAX).unwrap();
        assert_eq!(range.chunks(2).len(), 2);
    }

    #[test]
    fn test_full_range_len_saturates() {
        let range = BlockRange::new(0, u64::MAX).unwrap();
        assert_eq!(range.len(), u64::MAX);
    }
}
