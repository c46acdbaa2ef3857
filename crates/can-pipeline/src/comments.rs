//! Operator annotations per identifier

use std::collections::BTreeMap;

/// Free-text comment per raw identifier, last write wins
#[derive(Debug, Clone, Default)]
pub struct CommentBook {
    comments: BTreeMap<u32, String>,
}

impl CommentBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the comment for `id`; an empty or blank text removes it
    pub fn set(&mut self, id: u32, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            self.comments.remove(&id);
        } else {
            self.comments.insert(id, text);
        }
    }

    /// Comment for `id`
    pub fn get(&self, id: u32) -> Option<&str> {
        self.comments.get(&id).map(String::as_str)
    }

    /// All comments ordered by identifier
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.comments.iter().map(|(id, text)| (*id, text.as_str()))
    }

    /// Number of commented identifiers
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    /// Whether there are no comments
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut book = CommentBook::new();
        book.set(0x7E0, "engine request");
        book.set(0x7E0, "ECU tester");
        assert_eq!(book.get(0x7E0), Some("ECU tester"));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn test_blank_removes() {
        let mut book = CommentBook::new();
        book.set(0x100, "door");
        book.set(0x100, "   ");
        assert_eq!(book.get(0x100), None);
        assert!(book.is_empty());
    }
}
