use super::Toggleable;

/// The items of one screen plus the filtered copy the list actually shows.
/// Every mutation goes through here so the two copies never disagree.
///
/// Taps whose request has not settled yet are recorded as pending writes.
/// A fresh server copy loaded while they are outstanding gets them laid back
/// on top, so a reload never hides a tap that is still going to land.
#[derive(Debug, Clone)]
pub struct ToggleCollection<T: Toggleable> {
    items: Vec<T>,
    visible: Vec<T>,
    query: String,
    loading: bool,
    pending: Vec<PendingWrite<T>>,
}

#[derive(Debug, Clone)]
struct PendingWrite<T: Toggleable> {
    key: T::Key,
    /// Status asked for by the latest tap on this key
    status: T::Status,
    outstanding: usize,
}

impl<T: Toggleable> Default for ToggleCollection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            visible: Vec::new(),
            query: String::new(),
            loading: false,
            pending: Vec::new(),
        }
    }
}

impl<T: Toggleable> ToggleCollection<T> {
    pub fn new(items: Vec<T>) -> Self {
        let mut collection = Self::default();
        collection.reset(items);
        collection
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn visible(&self) -> &[T] {
        &self.visible
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.items.iter().find(|item| item.key() == *key)
    }

    /// Replace the whole collection with a fresh server copy. Pending writes
    /// are re-applied over it.
    pub fn reset(&mut self, items: Vec<T>) {
        self.items = items;
        for write in &self.pending {
            if let Some(item) = self.items.iter_mut().find(|item| item.key() == write.key) {
                item.set_status(write.status);
            }
        }
        self.refilter();
    }

    /// Record a tap whose request is about to go out.
    pub fn begin_write(&mut self, key: &T::Key, status: T::Status) {
        match self.pending.iter_mut().find(|write| write.key == *key) {
            Some(write) => {
                write.status = status;
                write.outstanding += 1;
            }
            None => self.pending.push(PendingWrite {
                key: key.clone(),
                status,
                outstanding: 1,
            }),
        }
    }

    /// Settle one request for `key`. Returns true if a later tap on the same
    /// key is still outstanding.
    pub fn finish_write(&mut self, key: &T::Key) -> bool {
        let Some(index) = self.pending.iter().position(|write| write.key == *key) else {
            return false;
        };
        let write = &mut self.pending[index];
        write.outstanding = write.outstanding.saturating_sub(1);
        if write.outstanding == 0 {
            self.pending.swap_remove(index);
            false
        } else {
            true
        }
    }


    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.refilter();
    }

    /// Set one item's status in both copies. Returns the previous status, or
    /// `None` if the key is unknown.
    pub fn replace_status(&mut self, key: &T::Key, status: T::Status) -> Option<T::Status> {
        let item = self.items.iter_mut().find(|item| item.key() == *key)?;
        let previous = item.status();
        item.set_status(status);

        if let Some(shown) = self.visible.iter_mut().find(|item| item.key() == *key) {
            shown.set_status(status);
        }
        Some(previous)
    }

    /// Swap in a server-acknowledged copy of one item.
    pub fn replace_item(&mut self, replacement: T) -> bool {
        let key = replacement.key();
        let Some(slot) = self.items.iter_mut().find(|item| item.key() == key) else {
            return false;
        };
        *slot = replacement.clone();

        if let Some(shown) = self.visible.iter_mut().find(|item| item.key() == key) {
            *shown = replacement;
        }
        true
    }

    fn refilter(&mut self) {
        let query = self.query.trim();
        self.visible = if query.is_empty() {
            self.items.clone()
        } else {
            self.items
                .iter()
                .filter(|item| item.matches(query))
                .cloned()
                .collect()
        };
    }
}
