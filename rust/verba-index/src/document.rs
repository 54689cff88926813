//! Documents and fields handed to the indexing pipeline.

use std::io::Read;

use verba_analysis::TokenStream;
use verba_common::{Result, error::Error};

/// The value of a [`Field`].
pub enum FieldValue {
    Text(String),
    /// Text read to the end when the field is indexed.
    Reader(Box<dyn Read + Send>),
    /// A pre-analyzed token stream; bypasses the analyzer.
    Tokens(Box<dyn TokenStream + Send>),
    Binary(Vec<u8>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            FieldValue::Binary(b) => Some(b),
            _ => None,
        }
    }
}

impl std::fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            FieldValue::Reader(_) => f.write_str("Reader(..)"),
            FieldValue::Tokens(_) => f.write_str("Tokens(..)"),
            FieldValue::Binary(b) => f.debug_tuple("Binary").field(&b.len()).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    No,
    /// Analyzed into tokens.
    Tokenized,
    /// Indexed as a single token.
    Untokenized,
    /// Indexed as a single token, without norms.
    NoNorms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermVector {
    No,
    Yes,
    WithPositions,
    WithOffsets,
    WithPositionsOffsets,
}

impl TermVector {
    pub fn is_stored(self) -> bool {
        self != TermVector::No
    }

    pub fn with_positions(self) -> bool {
        matches!(self, TermVector::WithPositions | TermVector::WithPositionsOffsets)
    }

    pub fn with_offsets(self) -> bool {
        matches!(self, TermVector::WithOffsets | TermVector::WithPositionsOffsets)
    }
}

#[derive(Debug)]
pub struct Field {
    name: String,
    value: FieldValue,
    store: Store,
    index: Index,
    term_vector: TermVector,
    boost: f32,
}

impl Field {
    /// Creates a field, rejecting combinations of options that cannot be indexed.
    pub fn new(
        name: impl Into<String>,
        value: FieldValue,
        store: Store,
        index: Index,
        term_vector: TermVector,
    ) -> Result<Field> {
        let name = name.into();
        match &value {
            FieldValue::Binary(_) => {
                if store != Store::Yes || index != Index::No {
                    return Err(invalid_field(&name, "binary values can only be stored"));
                }
            }
            FieldValue::Reader(_) | FieldValue::Tokens(_) => {
                if store == Store::Yes {
                    return Err(invalid_field(&name, "reader and token values cannot be stored"));
                }
                if index != Index::Tokenized {
                    return Err(invalid_field(&name, "reader and token values must be tokenized"));
                }
            }
            FieldValue::Text(_) => {}
        }
        if store == Store::No && index == Index::No {
            return Err(invalid_field(&name, "a field must be stored or indexed"));
        }
        if index == Index::No && term_vector.is_stored() {
            return Err(invalid_field(&name, "term vectors require an indexed field"));
        }
        Ok(Field {
            name,
            value,
            store,
            index,
            term_vector,
            boost: 1.0,
        })
    }

    /// A stored and tokenized text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Field {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            store: Store::Yes,
            index: Index::Tokenized,
            term_vector: TermVector::No,
            boost: 1.0,
        }
    }

    /// A stored, untokenized field without norms, typically an identifier.
    pub fn keyword(name: impl Into<String>, value: impl Into<String>) -> Field {
        Field {
            name: name.into(),
            value: FieldValue::Text(value.into()),
            store: Store::Yes,
            index: Index::NoNorms,
            term_vector: TermVector::No,
            boost: 1.0,
        }
    }

    pub fn binary(name: impl Into<String>, value: Vec<u8>) -> Field {
        Field {
            name: name.into(),
            value: FieldValue::Binary(value),
            store: Store::Yes,
            index: Index::No,
            term_vector: TermVector::No,
            boost: 1.0,
        }
    }

    pub fn reader(name: impl Into<String>, reader: Box<dyn Read + Send>) -> Field {
        Field {
            name: name.into(),
            value: FieldValue::Reader(reader),
            store: Store::No,
            index: Index::Tokenized,
            term_vector: TermVector::No,
            boost: 1.0,
        }
    }

    pub fn tokens(name: impl Into<String>, tokens: Box<dyn TokenStream + Send>) -> Field {
        Field {
            name: name.into(),
            value: FieldValue::Tokens(tokens),
            store: Store::No,
            index: Index::Tokenized,
            term_vector: TermVector::No,
            boost: 1.0,
        }
    }

    /// Enables term vectors on an indexed field.
    pub fn with_term_vector(mut self, term_vector: TermVector) -> Result<Field> {
        if self.index == Index::No && term_vector.is_stored() {
            return Err(invalid_field(&self.name, "term vectors require an indexed field"));
        }
        self.term_vector = term_vector;
        Ok(self)
    }

    pub fn with_boost(mut self, boost: f32) -> Field {
        self.boost = boost;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub(crate) fn value_mut(&mut self) -> &mut FieldValue {
        &mut self.value
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub fn is_stored(&self) -> bool {
        self.store == Store::Yes
    }

    pub fn is_indexed(&self) -> bool {
        self.index != Index::No
    }

    pub fn is_tokenized(&self) -> bool {
        self.index == Index::Tokenized
    }

    pub fn omit_norms(&self) -> bool {
        self.index == Index::NoNorms
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.value, FieldValue::Binary(_))
    }

    pub fn term_vector(&self) -> TermVector {
        self.term_vector
    }
}

fn invalid_field(name: &str, message: &str) -> Error {
    Error::invalid_arg(format!("field '{name}'"), message)
}

/// An ordered list of fields with a document-level boost.
#[derive(Debug)]
pub struct Document {
    fields: Vec<Field>,
    boost: f32,
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

impl Document {
    pub fn new() -> Document {
        Document {
            fields: Vec::new(),
            boost: 1.0,
        }
    }

    pub fn add(&mut self, field: Field) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn with_field(mut self, field: Field) -> Document {
        self.fields.push(field);
        self
    }

    pub fn with_boost(mut self, boost: f32) -> Document {
        self.boost = boost;
        self
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<Field>, f32) {
        (self.fields, self.boost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_validation() {
        assert!(
            Field::new(
                "data",
                FieldValue::Binary(vec![1]),
                Store::Yes,
                Index::Tokenized,
                TermVector::No
            )
            .is_err()
        );
        assert!(
            Field::new(
                "body",
                FieldValue::Reader(Box::new(std::io::empty())),
                Store::Yes,
                Index::Tokenized,
                TermVector::No
            )
            .is_err()
        );
        assert!(
            Field::new(
                "body",
                FieldValue::Text("x".into()),
                Store::No,
                Index::No,
                TermVector::No
            )
            .is_err()
        );
        assert!(
            Field::new(
                "body",
                FieldValue::Text("x".into()),
                Store::Yes,
                Index::No,
                TermVector::Yes
            )
            .is_err()
        );
        let field = Field::new(
            "body",
            FieldValue::Text("x".into()),
            Store::No,
            Index::Tokenized,
            TermVector::WithPositionsOffsets,
        )
        .unwrap();
        assert!(field.term_vector().with_positions() && field.term_vector().with_offsets());
        assert!(field.is_indexed() && field.is_tokenized() && !field.is_stored());
    }

    #[test]
    fn test_document_builder() {
        let doc = Document::new()
            .with_field(Field::keyword("id", "1"))
            .with_field(Field::text("body", "hello"))
            .with_boost(2.0);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.boost(), 2.0);
        assert!(doc.fields()[0].omit_norms());
        assert_eq!(doc.fields()[1].value().as_text(), Some("hello"));
    }
}
