//! Splitting of the per-round work into contiguous segments.

use std::ops::Range;

use crate::error::{Error, Result};

/// Half-open range `[start, end)` of cells or vehicle list indices assigned
/// to a single worker for one round.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Segment {
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index < self.end
    }
}

/// Splits `size` units of work among `workers`.
///
/// Each segment gets `ceil(size / workers)` units, the last one whatever is
/// left. Segments that would be empty are omitted, so fewer than `workers`
/// segments may come back. Together the segments cover `[0, size)` exactly
/// once.
pub fn partition(size: usize, workers: usize) -> Result<Vec<Segment>> {
    if workers == 0 {
        return Err(Error::InvalidConfig(
            "can't partition work among zero workers".to_string(),
        ));
    }
    let chunk = (size + workers - 1) / workers;
    let mut segments = Vec::with_capacity(workers);
    if chunk == 0 {
        return Ok(segments);
    }
    let mut start = 0;
    while start < size {
        let end = (start + chunk).min(size);
        segments.push(Segment::new(start, end));
        start = end;
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(segments: &[Segment], size: usize) {
        let mut next = 0;
        for s in segments {
            assert_eq!(s.start, next);
            assert!(!s.is_empty());
            next = s.end;
        }
        assert_eq!(next, size);
    }

    #[test]
    fn even_split() {
        let segments = partition(12, 4).unwrap();
        assert_eq!(segments.len(), 4);
        assert!(segments.iter().all(|s| s.len() == 3));
        assert_covers(&segments, 12);
    }

    #[test]
    fn uneven_split_shortens_last() {
        let segments = partition(10, 4).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::new(0, 3),
                Segment::new(3, 6),
                Segment::new(6, 9),
                Segment::new(9, 10)
            ]
        );
    }

    #[test]
    fn empty_segments_are_omitted() {
        // ceil(10 / 6) = 2, so only five segments carry any work
        let segments = partition(10, 6).unwrap();
        assert_eq!(segments.len(), 5);
        assert_covers(&segments, 10);

        assert_eq!(partition(3, 8).unwrap().len(), 3);
        assert!(partition(0, 4).unwrap().is_empty());
    }

    #[test]
    fn zero_workers_is_an_error() {
        assert!(partition(10, 0).is_err());
    }

    #[test]
    fn coverage_holds_for_many_shapes() {
        for size in 0..40 {
            for workers in 1..12 {
                assert_covers(&partition(size, workers).unwrap(), size);
            }
        }
    }
}
