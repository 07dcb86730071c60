use memchr::memchr_iter;

/// Check if content is likely binary
pub fn is_binary(content: &[u8]) -> bool {
    let sample_size = content.len().min(8192);
    let sample = &content[..sample_size];

    // Check for null bytes
    let null_count = memchr_iter(0, sample).count();
    if null_count > sample_size / 10 {
        return true;
    }

    // Check for high proportion of non-text bytes
    let non_text_count = sample
        .iter()
        .filter(|&&b| b < 0x20 && b != b'\n' && b != b'\r' && b != b'\t')
        .count();

    non_text_count > sample_size / 8
}

/// Maps byte offsets to zero-based line numbers.
pub struct LineIndex {
    /// Byte offset of every newline
    newlines: Vec<usize>,
}

impl LineIndex {
    pub fn new(content: &str) -> Self {
        Self {
            newlines: memchr_iter(b'\n', content.as_bytes()).collect(),
        }
    }

    /// Line containing `offset`
    pub fn line_of(&self, offset: usize) -> usize {
        self.newlines.partition_point(|&nl| nl < offset)
    }

    pub fn line_count(&self) -> usize {
        self.newlines.len() + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_binary() {
        assert!(!is_binary(b"fn main() {}\n"));
        assert!(is_binary(&[0u8; 64]));

        let mut sparse = b"plain text line\n".repeat(8);
        sparse[3] = 0;
        assert!(!is_binary(&sparse));
    }

    #[test]
    fn test_line_of() {
        let idx = LineIndex::new("ab\ncd\n\nef");
        assert_eq!(idx.line_of(0), 0);
        assert_eq!(idx.line_of(2), 0);
        assert_eq!(idx.line_of(3), 1);
        assert_eq!(idx.line_of(7), 3);
        assert_eq!(idx.line_count(), 4);
    }
}
