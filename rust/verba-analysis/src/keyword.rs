//! Keyword analyzer - emits the entire value as one token.

use verba_common::Result;

use crate::{Analyzer, Token, TokenStream, utf16_len};

#[derive(Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn token_stream<'a>(&self, _field: &str, text: &'a str) -> Result<Box<dyn TokenStream + 'a>> {
        Ok(Box::new(KeywordStream { text: Some(text) }))
    }
}

struct KeywordStream<'a> {
    text: Option<&'a str>,
}

impl TokenStream for KeywordStream<'_> {
    fn next_token(&mut self, token: &mut Token) -> Result<bool> {
        let Some(text) = self.text.take() else {
            return Ok(false);
        };
        token.clear();
        token.text.push_str(text);
        token.end_offset = utf16_len(text);
        Ok(true)
    }
}
