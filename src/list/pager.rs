use crate::list::state::{display_number, ListState};
use crate::storage::{StoreError, TodoStore};

/// Discrete page-by-page browsing over the collection. The pager owns its
/// cursor (`current_page`, 1-based) and replaces the whole window on every
/// page change.
pub struct PagedTodos<S> {
    store: S,
    state: ListState,
    current_page: usize,
    per_page: usize,
}

/// One entry of the rendered page-number strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageLink {
    Page(usize),
    Gap,
}

impl<S: TodoStore> PagedTodos<S> {
    pub fn open(store: S, per_page: usize) -> Result<Self, StoreError> {
        let mut pager = Self {
            store,
            state: ListState::new(),
            current_page: 1,
            per_page: per_page.max(1),
        };
        pager.change_page(1)?;
        Ok(pager)
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ListState {
        &mut self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }

    pub fn total_pages(&self) -> usize {
        self.state.total_count().div_ceil(self.per_page)
    }

    /// Fetches the requested page and replaces the window with it. A page
    /// that comes back empty while the collection is non-empty (its rows were
    /// deleted under us) silently falls back one page at a time, so a
    /// populated collection never shows an empty page.
    pub fn change_page(&mut self, page: usize) -> Result<(), StoreError> {
        let mut page = page.max(1);
        self.state.begin_loading();
        loop {
            let offset = (page - 1) * self.per_page;
            let fetched = match self.store.fetch_range(offset, self.per_page) {
                Ok(fetched) => fetched,
                Err(err) => {
                    self.state.abort_loading();
                    return Err(err);
                }
            };
            if fetched.items.is_empty() && fetched.total_count > 0 && page > 1 {
                page -= 1;
                continue;
            }
            let has_more = offset + fetched.items.len() < fetched.total_count;
            self.current_page = page;
            self.state
                .replace(fetched.items, fetched.total_count, has_more);
            return Ok(());
        }
    }

    pub fn next_page(&mut self) -> Result<(), StoreError> {
        if self.current_page < self.total_pages() {
            self.change_page(self.current_page + 1)
        } else {
            Ok(())
        }
    }

    pub fn previous_page(&mut self) -> Result<(), StoreError> {
        if self.current_page > 1 {
            self.change_page(self.current_page - 1)
        } else {
            Ok(())
        }
    }

    /// Re-fetches the current page; the empty-page fallback also repairs a
    /// cursor that now points past the end.
    pub fn refresh(&mut self) -> Result<(), StoreError> {
        self.change_page(self.current_page)
    }

    /// Number shown next to the row at `index` of the current page.
    pub fn display_number(&self, index: usize) -> usize {
        let offset = (self.current_page - 1) * self.per_page;
        display_number(self.state.total_count(), offset, index)
    }

    /// 1-based position of the first row on the current page.
    pub fn first_item_position(&self) -> usize {
        if self.state.total_count() == 0 {
            0
        } else {
            (self.current_page - 1) * self.per_page + 1
        }
    }

    /// 1-based position of the last row on the current page.
    pub fn last_item_position(&self) -> usize {
        (self.current_page * self.per_page).min(self.state.total_count())
    }

    pub fn page_links(&self) -> Vec<PageLink> {
        page_links(self.current_page, self.total_pages())
    }
}

/// Windowed page-number strip: all pages when few, otherwise the first and
/// last page plus a two-page neighborhood around the current one, gaps marked
/// with `Gap`.
pub fn page_links(current: usize, total_pages: usize) -> Vec<PageLink> {
    const MAX_VISIBLE: usize = 5;
    let mut links = Vec::new();
    if total_pages <= MAX_VISIBLE {
        links.extend((1..=total_pages).map(PageLink::Page));
        return links;
    }

    let start = current.saturating_sub(2).max(1);
    let end = (current + 2).min(total_pages);
    if start > 1 {
        links.push(PageLink::Page(1));
        if start > 2 {
            links.push(PageLink::Gap);
        }
    }
    links.extend((start..=end).map(PageLink::Page));
    if end < total_pages {
        if end < total_pages - 1 {
            links.push(PageLink::Gap);
        }
        links.push(PageLink::Page(total_pages));
    }
    links
}
