//! Analyzers turning field text into streams of tokens.
//!
//! The indexing core treats analysis as a black box: for every indexed,
//! tokenized field it asks the configured [`Analyzer`] for a [`TokenStream`]
//! and pulls [`Token`]s from it until the stream is exhausted. Each token
//! carries its text, the increment from the previous token's position, its
//! start/end offsets (in UTF-16 code units of the field value) and an optional
//! payload.

pub mod keyword;
pub mod unicode_word;
pub mod whitespace;

use std::sync::Arc;

pub use keyword::KeywordAnalyzer;
pub use unicode_word::UnicodeWordAnalyzer;
pub use whitespace::WhitespaceAnalyzer;
use verba_common::{Result, error::Error};

/// A single term occurrence produced by a [`TokenStream`].
///
/// Token values are reused between calls to [`TokenStream::next_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    /// Distance from the previous token's position; `1` for adjacent tokens,
    /// `0` for tokens stacked on the same position.
    pub position_increment: u32,
    pub start_offset: u32,
    pub end_offset: u32,
    pub payload: Option<Vec<u8>>,
}

impl Token {
    pub fn new(text: impl Into<String>, start_offset: u32, end_offset: u32) -> Token {
        Token {
            text: text.into(),
            position_increment: 1,
            start_offset,
            end_offset,
            payload: None,
        }
    }

    /// Resets the token to an empty, adjacent token without a payload.
    pub fn clear(&mut self) {
        self.text.clear();
        self.position_increment = 1;
        self.start_offset = 0;
        self.end_offset = 0;
        self.payload = None;
    }
}

impl Default for Token {
    fn default() -> Self {
        Token::new(String::new(), 0, 0)
    }
}

/// A lazy, single-pass sequence of tokens.
pub trait TokenStream {
    /// Fills `token` with the next token. Returns `false` once the stream is exhausted.
    fn next_token(&mut self, token: &mut Token) -> Result<bool>;
}

impl<T: TokenStream + ?Sized> TokenStream for Box<T> {
    fn next_token(&mut self, token: &mut Token) -> Result<bool> {
        (**self).next_token(token)
    }
}

/// A token stream over a precomputed list of tokens.
pub struct VecTokenStream {
    tokens: std::vec::IntoIter<Token>,
}

impl VecTokenStream {
    pub fn new(tokens: Vec<Token>) -> VecTokenStream {
        VecTokenStream {
            tokens: tokens.into_iter(),
        }
    }
}

impl TokenStream for VecTokenStream {
    fn next_token(&mut self, token: &mut Token) -> Result<bool> {
        match self.tokens.next() {
            Some(next) => {
                *token = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Produces token streams for field values.
pub trait Analyzer: Send + Sync {
    fn token_stream<'a>(&self, field: &str, text: &'a str) -> Result<Box<dyn TokenStream + 'a>>;

    /// Position gap inserted between two values of the same field within one document.
    fn position_increment_gap(&self, _field: &str) -> u32 {
        0
    }
}

/// Stock analyzers available by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    /// The whole value is a single token.
    Keyword,
    /// Alphanumeric words, split on Unicode word boundaries.
    UnicodeWord,
    /// Alphanumeric words, lower-cased.
    Standard,
    /// Runs of non-whitespace characters.
    Whitespace,
}

impl TryFrom<&str> for AnalyzerKind {
    type Error = Error;

    fn try_from(name: &str) -> Result<Self> {
        match name {
            "keyword" => Ok(AnalyzerKind::Keyword),
            "unicode-word" => Ok(AnalyzerKind::UnicodeWord),
            "standard" => Ok(AnalyzerKind::Standard),
            "whitespace" => Ok(AnalyzerKind::Whitespace),
            _ => Err(Error::invalid_arg(
                "name",
                format!("Unrecognized analyzer: {name}"),
            )),
        }
    }
}

impl AnalyzerKind {
    pub const fn name(&self) -> &'static str {
        match self {
            AnalyzerKind::Keyword => "keyword",
            AnalyzerKind::UnicodeWord => "unicode-word",
            AnalyzerKind::Standard => "standard",
            AnalyzerKind::Whitespace => "whitespace",
        }
    }
}

/// Creates a stock analyzer by name.
pub fn create_analyzer(name: &str) -> Result<Arc<dyn Analyzer>> {
    Ok(match AnalyzerKind::try_from(name)? {
        AnalyzerKind::Keyword => Arc::new(KeywordAnalyzer::new()),
        AnalyzerKind::UnicodeWord => Arc::new(UnicodeWordAnalyzer::new()),
        AnalyzerKind::Standard => Arc::new(UnicodeWordAnalyzer::lowercasing()),
        AnalyzerKind::Whitespace => Arc::new(WhitespaceAnalyzer::new()),
    })
}

/// Number of UTF-16 code units in `s`.
pub(crate) fn utf16_len(s: &str) -> u32 {
    s.chars().map(|c| c.len_utf16() as u32).sum()
}

/// Drains a token stream into a vector (test and diagnostics helper).
pub fn collect_tokens(stream: &mut dyn TokenStream) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut token = Token::default();
    while stream.next_token(&mut token)? {
        tokens.push(token.clone());
    }
    Ok(tokens)
}
