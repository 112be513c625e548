use std::fmt;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Offset/limit window over an ordered sequence of any shape.
///
/// The sequence length is passed into each transition instead of being
/// stored, so the same paginator can follow a result set that is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    offset: usize,
    limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLabel {
    pub current: usize,
    pub total: usize,
}

impl fmt::Display for PageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {}", self.current, self.total)
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Paginator {
    /// A zero limit is raised to one.
    pub fn new(limit: usize) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Change the page size and return to the first page. Zero is ignored.
    pub fn set_page_size(&mut self, limit: usize) {
        if limit == 0 {
            return;
        }
        self.limit = limit;
        self.offset = 0;
    }

    pub fn reset(&mut self) {
        self.offset = 0;
    }

    pub fn total_pages(&self, len: usize) -> usize {
        len.div_ceil(self.limit).max(1)
    }

    pub fn next(&mut self, len: usize) {
        let current = self.offset / self.limit;
        if current + 1 < self.total_pages(len) {
            self.offset += self.limit;
        }
    }

    pub fn prev(&mut self) {
        if self.offset >= self.limit {
            self.offset -= self.limit;
        }
    }

    pub fn window<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = self.offset.min(items.len());
        let end = self.offset.saturating_add(self.limit).min(items.len());
        &items[start..end]
    }

    pub fn page_label(&self, len: usize) -> PageLabel {
        PageLabel {
            current: 1 + self.offset / self.limit,
            total: self.total_pages(len),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_three_pages_and_clamps() {
        let items: Vec<u32> = (0..25).collect();
        let mut pager = Paginator::new(10);
        let mut labels = vec![pager.page_label(items.len()).to_string()];
        for _ in 0..3 {
            pager.next(items.len());
            labels.push(pager.page_label(items.len()).to_string());
        }
        assert_eq!(labels, ["1 of 3", "2 of 3", "3 of 3", "3 of 3"]);
        assert_eq!(pager.window(&items), &items[20..25]);
    }

    #[test]
    fn offsets_stay_in_bounds() {
        for len in 0..40usize {
            for limit in 1..12usize {
                let mut pager = Paginator::new(limit);
                for _ in 0..50 {
                    pager.next(len);
                    assert_eq!(pager.offset() % limit, 0);
                    assert!(pager.offset() < len.max(1));
                }
                for _ in 0..50 {
                    pager.prev();
                }
                assert_eq!(pager.offset(), 0);
            }
        }
    }

    #[test]
    fn page_size_change_returns_to_first_page() {
        let mut pager = Paginator::new(5);
        pager.next(30);
        pager.next(30);
        assert_eq!(pager.offset(), 10);
        pager.set_page_size(20);
        assert_eq!((pager.offset(), pager.limit()), (0, 20));
        pager.set_page_size(0);
        assert_eq!(pager.limit(), 20);
    }

    #[test]
    fn empty_sequence_reads_page_one_of_one() {
        let items: Vec<u32> = Vec::new();
        let mut pager = Paginator::default();
        pager.next(0);
        assert!(pager.window(&items).is_empty());
        assert_eq!(pager.page_label(0).to_string(), "1 of 1");
    }

    #[test]
    fn window_is_stable_between_transitions() {
        let items: Vec<u32> = (0..13).collect();
        let mut pager = Paginator::new(4);
        pager.next(items.len());
        assert_eq!(pager.window(&items), pager.window(&items));
        assert_eq!(pager.window(&items), &[4, 5, 6, 7]);
    }

    #[test]
    fn window_clips_when_sequence_shrinks() {
        let long: Vec<u32> = (0..30).collect();
        let mut pager = Paginator::new(10);
        pager.next(long.len());
        pager.next(long.len());
        let short = &long[..5];
        assert!(pager.window(short).is_empty());
    }
}
