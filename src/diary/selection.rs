/// The record that save and delete actions target.
///
/// Only the reconciler mutates this; it performs no validation of its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    active: Option<String>,
}

impl Selection {
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.as_deref() == Some(key)
    }

    pub(crate) fn set(&mut self, key: &str) {
        self.active = Some(key.to_string());
    }

    pub(crate) fn clear(&mut self) {
        self.active = None;
    }

    /// Drops the selection if it points at `key`.
    pub(crate) fn release(&mut self, key: &str) -> bool {
        if self.is_active(key) {
            self.active = None;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_only_clears_matching_key() {
        let mut selection = Selection::default();
        selection.set("diary_1");
        assert!(!selection.release("diary_2"));
        assert!(selection.is_active("diary_1"));
        assert!(selection.release("diary_1"));
        assert_eq!(selection.active(), None);
    }
}
