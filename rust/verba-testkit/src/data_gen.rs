//! Synthetic text for indexing tests.
//!
//! Words are drawn from a fixed vocabulary with a skewed distribution, so
//! that a few terms occur in most documents and most terms are rare.

/// A seeded generator of document texts.
pub struct TextGenerator {
    rng: fastrand::Rng,
    vocabulary: Vec<String>,
}

impl TextGenerator {
    /// Creates a generator over `vocabulary_size` distinct words.
    pub fn new(seed: u64, vocabulary_size: usize) -> TextGenerator {
        assert_ne!(vocabulary_size, 0);
        let mut rng = fastrand::Rng::with_seed(seed);
        let vocabulary = (0..vocabulary_size)
            .map(|i| format!("{}{i}", random_word(&mut rng)))
            .collect();
        TextGenerator { rng, vocabulary }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Picks one vocabulary word; low indexes are picked more often.
    pub fn word(&mut self) -> &str {
        let index = self.pick();
        &self.vocabulary[index]
    }

    fn pick(&mut self) -> usize {
        let n = self.vocabulary.len();
        self.rng.usize(..n).min(self.rng.usize(..n))
    }

    /// Generates a whitespace-separated text of `num_words` words.
    pub fn text(&mut self, num_words: usize) -> String {
        let mut text = String::new();
        for i in 0..num_words {
            if i > 0 {
                text.push(' ');
            }
            let index = self.pick();
            text.push_str(&self.vocabulary[index]);
        }
        text
    }

    /// Generates `count` texts with word counts in `min_words..=max_words`.
    pub fn texts(&mut self, count: usize, min_words: usize, max_words: usize) -> Vec<String> {
        (0..count)
            .map(|_| {
                let len = self.rng.usize(min_words..=max_words);
                self.text(len)
            })
            .collect()
    }
}

fn random_word(rng: &mut fastrand::Rng) -> String {
    let len = rng.usize(2..8);
    (0..len).map(|_| rng.lowercase()).collect()
}

/// Writes `id` as a fixed-width key, so that key order matches id order.
pub fn doc_key(id: usize) -> String {
    format!("doc{id:08}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let a = TextGenerator::new(7, 50).texts(10, 1, 20);
        let b = TextGenerator::new(7, 50).texts(10, 1, 20);
        assert_eq!(a, b);
        assert!(a.iter().all(|t| !t.is_empty()));
    }

    #[test]
    fn test_words_are_from_vocabulary() {
        let mut generator = TextGenerator::new(1, 10);
        let vocabulary = generator.vocabulary().to_vec();
        let text = generator.text(100);
        assert!(text.split(' ').all(|w| vocabulary.iter().any(|v| v == w)));
        assert_eq!(doc_key(42), "doc00000042");
    }
}
