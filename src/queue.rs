//! Circular headline queue.
//!
//! Empty-queue navigation is a no-op that reports "no content", never an error.

#[derive(Debug, Clone, Default)]
pub struct HeadlineQueue {
    items: Vec<String>,
    cursor: usize,
}

impl HeadlineQueue {
    pub fn new(items: Vec<String>) -> Self {
        Self { items, cursor: 0 }
    }

    /// Headline under the cursor, if any.
    pub fn current(&self) -> Option<&str> {
        self.items.get(self.cursor).map(String::as_str)
    }

    /// Move forward one item, wrapping from the last back to the first.
    pub fn advance(&mut self) -> Option<&str> {
        if self.items.is_empty() {
            return None;
        }
        self.cursor = (self.cursor + 1) % self.items.len();
        self.current()
    }

    /// Move back one item, wrapping from the first to the last.
    pub fn retreat(&mut self) -> Option<&str> {
        if self.items.is_empty() {
            return None;
        }
        self.cursor = if self.cursor == 0 {
            self.items.len() - 1
        } else {
            self.cursor - 1
        };
        self.current()
    }

    pub fn append<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.items.extend(items);
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}
