//! Selection, scrolling and search state of the table
//!
//! Everything here works on positions within the currently visible row set
//! (the full order, or only the search matches while searching), so callers
//! pass in that set's length and the number of rows that fit on screen.

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ViewState {
    pub selected: usize,
    pub scroll: usize,
    search: Option<String>,
    /// Next refresh request redials every host it touches
    pub force_reconnect: bool,
    /// Transient message for the status bar
    pub notice: Option<String>,
}

fn max_scroll(len: usize, page: usize) -> usize {
    len.saturating_sub(page)
}

impl ViewState {
    fn keep_visible(&mut self, page: usize) {
        let page = page.max(1);
        if self.selected < self.scroll {
            self.scroll = self.selected;
        } else if self.selected >= self.scroll + page {
            self.scroll = self.selected + 1 - page;
        }
    }

    pub fn up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            if self.selected < self.scroll {
                self.scroll -= 1;
            }
        }
    }

    pub fn down(&mut self, len: usize, page: usize) {
        if self.selected + 1 < len {
            self.selected += 1;
            if self.selected >= self.scroll + page.max(1) {
                self.scroll += 1;
            }
        }
    }

    pub fn page_up(&mut self, page: usize) {
        self.selected = self.selected.saturating_sub(page);
        self.scroll = self.scroll.saturating_sub(page);
        self.keep_visible(page);
    }

    pub fn page_down(&mut self, len: usize, page: usize) {
        if len == 0 {
            return;
        }
        self.selected = (self.selected + page).min(len - 1);
        self.scroll = (self.scroll + page).min(max_scroll(len, page));
        self.keep_visible(page);
    }

    pub fn home(&mut self) {
        self.selected = 0;
        self.scroll = 0;
    }

    pub fn end(&mut self, len: usize, page: usize) {
        self.selected = len.saturating_sub(1);
        self.scroll = max_scroll(len, page);
    }

    /// Pull selection and scroll back inside a row set that may have shrunk
    /// or a window that may have been resized
    pub fn clamp(&mut self, len: usize, page: usize) {
        if len == 0 {
            self.home();
            return;
        }
        self.selected = self.selected.min(len - 1);
        self.scroll = self.scroll.min(max_scroll(len, page));
        self.keep_visible(page);
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }

    pub fn start_search(&mut self) {
        if self.search.is_none() {
            self.search = Some(String::new());
            self.home();
        }
    }

    pub fn push_search(&mut self, ch: char) {
        if let Some(search) = &mut self.search {
            search.push(ch);
            self.home();
        }
    }

    /// Delete the last character, or leave search mode when already empty
    pub fn pop_search(&mut self) {
        let Some(search) = &mut self.search else {
            return;
        };
        if search.pop().is_none() {
            self.search = None;
        }
        self.home();
    }

    pub fn exit_search(&mut self) {
        if self.search.take().is_some() {
            self.home();
        }
    }

    /// Consume the force-reconnect flag
    pub fn take_force_reconnect(&mut self) -> bool {
        std::mem::take(&mut self.force_reconnect)
    }
}
