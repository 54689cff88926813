//! Analyzers for failure, ordering and payload scenarios.
//!
//! All of them split on whitespace like
//! [`WhitespaceAnalyzer`](verba_analysis::WhitespaceAnalyzer).

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use verba_analysis::{Analyzer, Token, TokenStream, WhitespaceAnalyzer};
use verba_common::{Result, error::Error};

/// Fails the token stream when it reaches the `trigger` token.
///
/// Tokens before the trigger are produced normally, so the failure happens
/// after part of the field has been inverted.
pub struct FailingAnalyzer {
    trigger: String,
}

impl FailingAnalyzer {
    pub fn new(trigger: impl Into<String>) -> FailingAnalyzer {
        FailingAnalyzer {
            trigger: trigger.into(),
        }
    }
}

impl Analyzer for FailingAnalyzer {
    fn token_stream<'a>(&self, field: &str, text: &'a str) -> Result<Box<dyn TokenStream + 'a>> {
        Ok(Box::new(FailingStream {
            inner: WhitespaceAnalyzer::new().token_stream(field, text)?,
            trigger: self.trigger.clone(),
            field: field.to_string(),
        }))
    }
}

struct FailingStream<'a> {
    inner: Box<dyn TokenStream + 'a>,
    trigger: String,
    field: String,
}

impl TokenStream for FailingStream<'_> {
    fn next_token(&mut self, token: &mut Token) -> Result<bool> {
        if !self.inner.next_token(token)? {
            return Ok(false);
        }
        if token.text == self.trigger {
            return Err(Error::analysis(
                &self.field,
                format!("failure triggered by {:?}", self.trigger),
            ));
        }
        Ok(true)
    }
}

/// A gate that analyzers can be held at until a test opens it.
#[derive(Default)]
pub struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

#[derive(Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

impl Gate {
    pub fn new() -> Arc<Gate> {
        Arc::new(Gate::default())
    }

    /// Blocks until the gate is opened.
    pub fn pass(&self) {
        let mut state = self.state.lock();
        state.waiting += 1;
        self.cond.notify_all();
        while !state.open {
            self.cond.wait(&mut state);
        }
        state.waiting -= 1;
    }

    /// Blocks until `count` callers are held at the gate.
    pub fn wait_for_waiting(&self, count: usize) {
        let mut state = self.state.lock();
        while state.waiting < count {
            self.cond.wait(&mut state);
        }
    }

    pub fn open(&self) {
        self.state.lock().open = true;
        self.cond.notify_all();
    }
}

/// Holds the analysis of any value containing the `trigger` word at a
/// [`Gate`]. Other values pass through immediately.
pub struct BlockingAnalyzer {
    trigger: String,
    gate: Arc<Gate>,
}

impl BlockingAnalyzer {
    pub fn new(trigger: impl Into<String>, gate: Arc<Gate>) -> BlockingAnalyzer {
        BlockingAnalyzer {
            trigger: trigger.into(),
            gate,
        }
    }
}

impl Analyzer for BlockingAnalyzer {
    fn token_stream<'a>(&self, field: &str, text: &'a str) -> Result<Box<dyn TokenStream + 'a>> {
        if text.split_whitespace().any(|word| word == self.trigger) {
            self.gate.pass();
        }
        WhitespaceAnalyzer::new().token_stream(field, text)
    }
}

/// Attaches the part of each token after a `|` as its payload: `"fox|ab"`
/// becomes the token `fox` carrying the payload `b"ab"`.
///
/// A `+0` suffix on the token text stacks the token on the previous
/// position.
#[derive(Default)]
pub struct PayloadAnalyzer;

impl PayloadAnalyzer {
    pub fn new() -> PayloadAnalyzer {
        PayloadAnalyzer
    }
}

impl Analyzer for PayloadAnalyzer {
    fn token_stream<'a>(&self, field: &str, text: &'a str) -> Result<Box<dyn TokenStream + 'a>> {
        Ok(Box::new(PayloadStream {
            inner: WhitespaceAnalyzer::new().token_stream(field, text)?,
        }))
    }
}

struct PayloadStream<'a> {
    inner: Box<dyn TokenStream + 'a>,
}

impl TokenStream for PayloadStream<'_> {
    fn next_token(&mut self, token: &mut Token) -> Result<bool> {
        if !self.inner.next_token(token)? {
            return Ok(false);
        }
        if let Some((text, payload)) = token.text.split_once('|') {
            token.payload = Some(payload.as_bytes().to_vec());
            token.text = text.to_string();
        }
        if let Some(text) = token.text.strip_suffix("+0") {
            token.text = text.to_string();
            token.position_increment = 0;
        }
        Ok(true)
    }
}
