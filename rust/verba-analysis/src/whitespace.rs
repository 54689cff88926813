//! Whitespace analyzer - splits on whitespace and keeps everything else.

use std::str::CharIndices;

use verba_common::Result;

use crate::{Analyzer, Token, TokenStream};

#[derive(Default)]
pub struct WhitespaceAnalyzer;

impl WhitespaceAnalyzer {
    pub fn new() -> Self {
        WhitespaceAnalyzer
    }
}

impl Analyzer for WhitespaceAnalyzer {
    fn token_stream<'a>(&self, _field: &str, text: &'a str) -> Result<Box<dyn TokenStream + 'a>> {
        Ok(Box::new(WhitespaceStream {
            chars: text.char_indices(),
            text,
            utf16_pos: 0,
        }))
    }
}

struct WhitespaceStream<'a> {
    text: &'a str,
    chars: CharIndices<'a>,
    utf16_pos: u32,
}

impl TokenStream for WhitespaceStream<'_> {
    fn next_token(&mut self, token: &mut Token) -> Result<bool> {
        let mut start: Option<(usize, u32)> = None;
        for (i, c) in self.chars.by_ref() {
            let pos = self.utf16_pos;
            self.utf16_pos += c.len_utf16() as u32;
            if c.is_whitespace() {
                if let Some((start_byte, start_utf16)) = start {
                    token.clear();
                    token.text.push_str(&self.text[start_byte..i]);
                    token.start_offset = start_utf16;
                    token.end_offset = pos;
                    return Ok(true);
                }
            } else if start.is_none() {
                start = Some((i, pos));
            }
        }
        match start {
            Some((start_byte, start_utf16)) => {
                token.clear();
                token.text.push_str(&self.text[start_byte..]);
                token.start_offset = start_utf16;
                token.end_offset = self.utf16_pos;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect_tokens;

    #[test]
    fn test_whitespace_split() {
        let analyzer = WhitespaceAnalyzer::new();
        let mut stream = analyzer.token_stream("body", " a-b\tc.d  e ").unwrap();
        let tokens = collect_tokens(&mut stream).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::new("a-b", 1, 4),
                Token::new("c.d", 5, 8),
                Token::new("e", 10, 11)
            ]
        );
    }
}
