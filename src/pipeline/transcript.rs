//! Running transcript of the model's speech.

/// Append-only text, cleared on connect and on interruption.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `delta` in arrival order.
    pub fn append(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    pub fn reset(&mut self) {
        self.text.clear();
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_concatenate_in_order() {
        let mut t = Transcript::new();
        t.append("Hel");
        t.append("lo, ");
        t.append("world");
        assert_eq!(t.as_str(), "Hello, world");
    }

    #[test]
    fn reset_clears() {
        let mut t = Transcript::new();
        t.append("something");
        t.reset();
        assert!(t.is_empty());
        assert_eq!(t.as_str(), "");
    }

    #[test]
    fn empty_delta_is_a_no_op() {
        let mut t = Transcript::new();
        t.append("a");
        t.append("");
        assert_eq!(t.as_str(), "a");
    }
}
