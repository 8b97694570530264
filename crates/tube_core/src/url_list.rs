use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Ordered list of URLs with an optional cursor on the selected entry.
///
/// Entries are only checked for non-emptiness; duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlList {
    entries: Vec<String>,
    cursor: Option<usize>,
}

impl UrlList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a trimmed entry. Returns false when the input is blank.
    pub fn push(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() {
            return false;
        }
        self.entries.push(url.to_string());
        true
    }

    /// Imports one entry per non-empty line, keeping file order.
    /// Returns the number of entries added.
    pub fn import_str(&mut self, text: &str) -> usize {
        text.lines().filter(|line| self.push(line)).count()
    }

    /// Reads a flat text file (one URL per line) and appends its entries.
    pub fn import_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read URL list {}", path.display()))?;
        let added = self.import_str(&text);
        tracing::info!("imported {added} URLs from {}", path.display());
        Ok(added)
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);
        self.cursor = match self.cursor {
            Some(c) if c == index => None,
            Some(c) if c > index => Some(c - 1),
            other => other,
        };
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }

    /// Moves the cursor; out-of-range indices clear it.
    pub fn select(&mut self, index: usize) {
        self.cursor = (index < self.entries.len()).then_some(index);
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.cursor
    }

    /// Puts back a cursor saved from [`Self::selected_index`].
    pub fn restore_cursor(&mut self, cursor: Option<usize>) {
        self.cursor = cursor.filter(|&c| c < self.entries.len());
    }

    pub fn selected(&self) -> Option<&str> {
        self.cursor
            .and_then(|c| self.entries.get(c))
            .map(String::as_str)
    }

    /// Moves the cursor to the following entry and returns it. With no
    /// cursor the first entry is taken. `None` once the end is reached;
    /// the cursor then stays on the last entry.
    pub fn advance(&mut self) -> Option<&str> {
        let next = match self.cursor {
            Some(c) => c + 1,
            None => 0,
        };
        if next >= self.entries.len() {
            return None;
        }
        self.cursor = Some(next);
        self.entries.get(next).map(String::as_str)
    }

    /// 1-based position of the cursor and the list length.
    pub fn position(&self) -> (usize, usize) {
        (self.cursor.map_or(0, |c| c + 1), self.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn import_file_keeps_every_non_empty_line_in_order() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "https://youtu.be/a")?;
        writeln!(file)?;
        writeln!(file, "   ")?;
        writeln!(file, "  https://youtu.be/b  ")?;
        writeln!(file, "https://youtu.be/a")?;
        write!(file, "#not-a-comment")?;

        let mut list = UrlList::new();
        let added = list.import_file(file.path())?;

        assert_eq!(added, 4);
        assert_eq!(
            list.entries(),
            &[
                "https://youtu.be/a",
                "https://youtu.be/b",
                "https://youtu.be/a",
                "#not-a-comment"
            ]
        );
        Ok(())
    }

    #[test]
    fn import_file_missing_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut list = UrlList::new();
        assert!(list.import_file(dir.path().join("missing.txt")).is_err());
        assert!(list.is_empty());
    }

    #[rstest]
    #[case("", false)]
    #[case("   ", false)]
    #[case("x", true)]
    fn push_rejects_blank_entries(#[case] input: &str, #[case] accepted: bool) {
        let mut list = UrlList::new();
        assert_eq!(list.push(input), accepted);
        assert_eq!(list.len(), usize::from(accepted));
    }

    #[test]
    fn advance_walks_the_list_and_stops_at_end() {
        let mut list = UrlList::new();
        list.import_str("a\nb\n");
        assert_eq!(list.position(), (0, 2));
        assert_eq!(list.advance(), Some("a"));
        assert_eq!(list.advance(), Some("b"));
        assert_eq!(list.position(), (2, 2));
        assert_eq!(list.advance(), None);
        assert_eq!(list.selected(), Some("b"));
    }

    #[test]
    fn restore_cursor_undoes_advance() {
        let mut list = UrlList::new();
        list.import_str("a\nb\n");
        let saved = list.selected_index();
        assert_eq!(list.advance(), Some("a"));
        list.restore_cursor(saved);
        assert_eq!(list.position(), (0, 2));
        list.restore_cursor(Some(5));
        assert_eq!(list.selected(), None);
    }

    #[test]
    fn remove_shifts_cursor() {
        let mut list = UrlList::new();
        list.import_str("a\nb\nc");
        list.select(2);
        assert_eq!(list.remove(0).as_deref(), Some("a"));
        assert_eq!(list.selected(), Some("c"));
        assert_eq!(list.remove(1).as_deref(), Some("c"));
        assert_eq!(list.selected(), None);
        assert_eq!(list.remove(9), None);
    }
}
