use std::fmt;

/// The authoritative text of a conversation and its stamped version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub version: u64,
}

impl Document {
    pub fn new(content: String) -> Self {
        Self {
            content,
            version: 0,
        }
    }

    pub fn new_with_version(content: String, version: u64) -> Self {
        Self { content, version }
    }

    /// Version the next accepted edit will be stamped with
    pub fn next_version(&self) -> u64 {
        self.version + 1
    }

    /// Replace the content with an accepted edit and advance the version
    pub fn commit(&mut self, new_content: String) {
        self.content = new_content;
        self.version += 1;
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (v{})", self.content, self.version)
    }
}

impl From<&str> for Document {
    fn from(content: &str) -> Self {
        Self::new(content.to_string())
    }
}

impl From<String> for Document {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_advances_version() {
        let mut doc = Document::from("hello");
        assert_eq!(doc.version, 0);
        assert_eq!(doc.next_version(), 1);

        doc.commit("hullo".to_string());
        assert_eq!(doc.content, "hullo");
        assert_eq!(doc.version, 1);
        assert_eq!(doc.to_string(), "hullo (v1)");
    }
}
