/// Text under scan, addressed by zero-based character offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    text: String,
    // Byte offset of every char, plus `text.len()` as the final entry.
    boundaries: Vec<usize>,
}

impl SourceDocument {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let mut boundaries = text.char_indices().map(|(offset, _)| offset).collect::<Vec<_>>();
        boundaries.push(text.len());
        Self { text, boundaries }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Character count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Characters `[start, end)`, or `None` when the range does not fit the document.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Option<&str> {
        if start > end {
            return None;
        }
        let from = *self.boundaries.get(start)?;
        let to = *self.boundaries.get(end)?;
        self.text.get(from..to)
    }
}
