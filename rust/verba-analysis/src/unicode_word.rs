//! Unicode word analyzer - extracts alphanumeric words using Unicode word boundaries.

use unicode_segmentation::{UnicodeSegmentation, UnicodeWordIndices};
use verba_common::Result;

use crate::{Analyzer, Token, TokenStream, utf16_len};

/// Extracts the alphanumeric words of a value (as defined by UAX #29),
/// optionally lower-casing them.
#[derive(Default)]
pub struct UnicodeWordAnalyzer {
    lowercase: bool,
    position_increment_gap: u32,
}

impl UnicodeWordAnalyzer {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn lowercasing() -> Self {
        UnicodeWordAnalyzer {
            lowercase: true,
            position_increment_gap: 0,
        }
    }

    pub fn with_position_increment_gap(mut self, gap: u32) -> Self {
        self.position_increment_gap = gap;
        self
    }
}

impl Analyzer for UnicodeWordAnalyzer {
    fn token_stream<'a>(&self, _field: &str, text: &'a str) -> Result<Box<dyn TokenStream + 'a>> {
        Ok(Box::new(UnicodeWordStream {
            text,
            words: text.unicode_word_indices(),
            lowercase: self.lowercase,
            byte_pos: 0,
            utf16_pos: 0,
        }))
    }

    fn position_increment_gap(&self, _field: &str) -> u32 {
        self.position_increment_gap
    }
}

struct UnicodeWordStream<'a> {
    text: &'a str,
    words: UnicodeWordIndices<'a>,
    lowercase: bool,
    byte_pos: usize,
    utf16_pos: u32,
}

impl UnicodeWordStream<'_> {
    fn utf16_offset(&mut self, byte_offset: usize) -> u32 {
        self.utf16_pos += utf16_len(&self.text[self.byte_pos..byte_offset]);
        self.byte_pos = byte_offset;
        self.utf16_pos
    }
}

impl TokenStream for UnicodeWordStream<'_> {
    fn next_token(&mut self, token: &mut Token) -> Result<bool> {
        let Some((start, word)) = self.words.next() else {
            return Ok(false);
        };
        token.clear();
        token.start_offset = self.utf16_offset(start);
        token.end_offset = self.utf16_offset(start + word.len());
        if self.lowercase {
            token.text.extend(word.chars().flat_map(char::to_lowercase));
        } else {
            token.text.push_str(word);
        }
        Ok(true)
    }
}
