//! Offset to page translation.
//!
//! The API is page based (`page`, `per_page`) while callers think in record
//! offsets. An offset that does not sit on a page boundary is snapped down to
//! the start of its page; the searcher then discards the leading records it
//! did not ask for (see [`PagePlan::skip_for`]).

/// One page request derived from an offset and a total limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagePlan {
    /// 1-indexed page number.
    pub page: usize,
    /// Records requested per page, `1..=max_per_page`.
    pub per_page: usize,
}

impl PagePlan {
    /// First record position covered by this page.
    pub fn rounded_offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }

    /// Number of leading records of this page that precede `offset`.
    ///
    /// A hand-built plan with `per_page == 0` skips nothing.
    pub fn skip_for(&self, offset: usize) -> usize {
        offset.checked_rem(self.per_page).unwrap_or(0)
    }
}

/// Plan the page that contains `offset`.
///
/// Zero `limit` or `max_per_page` are treated as 1.
pub fn plan(offset: usize, limit: usize, max_per_page: usize) -> PagePlan {
    let per_page = limit.min(max_per_page).max(1);
    let rounded_offset = (offset / per_page) * per_page;
    PagePlan {
        page: rounded_offset / per_page + 1,
        per_page,
    }
}
