//! Domain metadata documents.
//!
//! Domains are tagged with a small XML element stored under a caller chosen
//! namespace:
//!
//! ```xml
//! <discover xmlns="http://example.org/xmlns/discover/1.0">
//!   <key>role</key>
//!   <value>consul-server</value>
//! </discover>
//! ```
//!
//! The root element name is free. Its `key` and `value` children (matched by
//! local name, so namespace prefixes are ignored) carry the tag.

use quick_xml::{events::Event, Reader};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("metadata document has no root element")]
    MissingRoot,

    #[error("metadata document ends inside <{0}>")]
    Truncated(String),
}

/// Decoded `key`/`value` children. A child absent from the document is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataDocument {
    pub key: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Key,
    Value,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"key" => Some(Field::Key),
            b"value" => Some(Field::Value),
            _ => None,
        }
    }
}

impl MetadataDocument {
    pub fn parse(xml: &str) -> Result<Self, MetadataError> {
        match Self::decode(xml) {
            (document, None) => Ok(document),
            (_, Some(err)) => Err(err),
        }
    }

    /// Decodes as far as the document allows. Children completed before an
    /// error are kept in the returned document alongside the error.
    pub fn decode(xml: &str) -> (Self, Option<MetadataError>) {
        let mut document = MetadataDocument::default();
        let err = document.read_from(xml).err();
        (document, err)
    }

    fn read_from(&mut self, xml: &str) -> Result<(), MetadataError> {
        let mut reader = Reader::from_str(xml);
        let mut open: Vec<String> = Vec::new();
        let mut capture: Option<(Field, String)> = None;
        let mut seen_root = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    seen_root = true;
                    if open.len() == 1 && capture.is_none() {
                        capture = Field::from_local_name(e.local_name().as_ref())
                            .map(|field| (field, String::new()));
                    }
                    open.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
                Event::Empty(e) => {
                    if open.is_empty() {
                        // `<root/>`: nothing inside
                        seen_root = true;
                        break;
                    }
                    if open.len() == 1 {
                        if let Some(field) = Field::from_local_name(e.local_name().as_ref()) {
                            self.set(field, String::new());
                        }
                    }
                }
                Event::End(_) => {
                    open.pop();
                    if open.len() == 1 {
                        if let Some((field, text)) = capture.take() {
                            self.set(field, text);
                        }
                    }
                    if open.is_empty() {
                        break;
                    }
                }
                Event::Text(t) => {
                    if let Some((_, text)) = capture.as_mut() {
                        text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some((_, text)) = capture.as_mut() {
                        text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(MetadataError::MissingRoot);
        }
        if let Some(name) = open.pop() {
            return Err(MetadataError::Truncated(name));
        }
        Ok(())
    }

    fn set(&mut self, field: Field, text: String) {
        match field {
            Field::Key => self.key = Some(text),
            Field::Value => self.value = Some(text),
        }
    }
}

/// The key/value pair a domain is matched on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainMetadata {
    pub key: String,
    pub value: String,
}

/// Turns each domain's raw metadata into the pair used for filtering.
///
/// By default every domain is judged on its own document alone: a document
/// that fails to decode, or lacks a child, reads as empty strings. With
/// `carry_over` set, fields that a document does not supply keep whatever
/// the previous domain's document held, which is how the provider behaved
/// when it decoded into one reused record. Children that decoded before a
/// document turned out broken still overwrite the record in that mode.
#[derive(Debug, Default)]
pub struct MetadataTracker {
    carry_over: bool,
    last: DomainMetadata,
}

impl MetadataTracker {
    pub fn new(carry_over: bool) -> Self {
        Self {
            carry_over,
            last: DomainMetadata::default(),
        }
    }

    pub fn resolve(&mut self, domain: &str, xml: &str) -> DomainMetadata {
        let (document, err) = MetadataDocument::decode(xml);
        if let Some(e) = &err {
            warn!(
                "discover-libvirt: undecodable metadata of domain {}: {}",
                domain, e
            );
        }

        if !self.carry_over {
            if err.is_some() {
                return DomainMetadata::default();
            }
            return DomainMetadata {
                key: document.key.unwrap_or_default(),
                value: document.value.unwrap_or_default(),
            };
        }

        // Whatever decoded before an error still lands on the record.
        if let Some(key) = document.key {
            self.last.key = key;
        }
        if let Some(value) = document.value {
            self.last.value = value;
        }
        self.last.clone()
    }
}
