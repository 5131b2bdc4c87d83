//! Persistence adapter: documents ↔ key-value storage and share links.
//!
//! Storage holds one JSON document under one key. Before anything leaves the
//! process it is sanitized and stamped with `metadata.updatedAt` (epoch
//! millis) and `metadata.version` (the app version).
//!
//! Share links carry the same JSON, percent-encoded, in the URL fragment:
//! `<origin><pathname>#data=<encoded>`.

use crate::model::{Document, ModelError};
use crate::sanitize::{MarkupSanitizer, Sanitizer, sanitize_document};
use chrono::Utc;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;
use winnow::combinator::{opt, preceded, separated};
use winnow::prelude::*;
use winnow::token::take_till;

/// Fragment parameter carrying the encoded document.
pub const SHARE_PARAM: &str = "data";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("storage backend failed: {0}")]
    Storage(String),
    #[error("storage quota exceeded ({needed} bytes needed, {available} available)")]
    QuotaExceeded { needed: usize, available: usize },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("invalid document JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed share fragment: {0}")]
    Fragment(String),
}

/// A string key-value store (browser `localStorage` or an in-memory map).
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError>;
    fn remove(&mut self, key: &str) -> Result<(), PersistError>;
}

/// In-memory store. Clones share the same backing map, so a second adapter
/// over a clone sees what the first one wrote (a simulated page reload).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects writes once the total value size would exceed
    /// `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), PersistError> {
        let mut entries = self.entries.borrow_mut();
        if let Some(quota) = self.quota {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(_, v)| v.len())
                .sum();
            let available = quota.saturating_sub(used);
            if value.len() > available {
                return Err(PersistError::QuotaExceeded {
                    needed: value.len(),
                    available,
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), PersistError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Reads and writes documents through a [`KeyValueStore`].
pub struct Persistence<S: KeyValueStore> {
    store: S,
    key: String,
    version: String,
    sanitizer: Box<dyn Sanitizer>,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(store: S, key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            version: version.into(),
            sanitizer: Box::new(MarkupSanitizer),
        }
    }

    /// Replace the default markup sanitizer.
    pub fn with_sanitizer(mut self, sanitizer: Box<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The sanitized, metadata-stamped copy that would be written.
    pub fn prepare(&self, doc: &Document) -> Result<Document, PersistError> {
        let mut prepared = sanitize_document(doc, self.sanitizer.as_ref())?;
        let meta = prepared.metadata.get_or_insert_with(Default::default);
        meta.updated_at = Some(Utc::now().timestamp_millis());
        meta.version = Some(self.version.clone());
        Ok(prepared)
    }

    pub fn save(&mut self, doc: &Document) -> Result<(), PersistError> {
        let json = self.prepare(doc)?.to_json()?;
        self.store.set(&self.key, &json)?;
        log::debug!(
            "saved document {} ({} nodes, {} bytes)",
            doc.id,
            doc.nodes.len(),
            json.len()
        );
        Ok(())
    }

    /// Load the stored document. A missing key is `Ok(None)`; a version
    /// mismatch or structural problem is logged and the document returned
    /// as-is.
    pub fn load(&self) -> Result<Option<Document>, PersistError> {
        let Some(json) = self.store.get(&self.key)? else {
            return Ok(None);
        };
        let doc = Document::from_json(&json)?;
        self.check_loaded(&doc);
        Ok(Some(doc))
    }

    pub fn clear(&mut self) -> Result<(), PersistError> {
        self.store.remove(&self.key)
    }

    /// `<origin><pathname>#data=<percent-encoded JSON>`.
    pub fn share_link(
        &self,
        origin: &str,
        pathname: &str,
        doc: &Document,
    ) -> Result<String, PersistError> {
        let json = self.prepare(doc)?.to_json()?;
        Ok(format!(
            "{origin}{pathname}#{SHARE_PARAM}={}",
            urlencoding::encode(&json)
        ))
    }

    fn check_loaded(&self, doc: &Document) {
        let stored = doc.metadata.as_ref().and_then(|m| m.version.as_deref());
        if let Some(stored) = stored
            && stored != self.version
        {
            log::warn!(
                "document {} was saved by version {stored}, running {}",
                doc.id,
                self.version
            );
        }
        if let Err(e) = doc.validate() {
            log::warn!("loaded document {} is inconsistent: {e}", doc.id);
        }
    }
}

// ─── Share fragment ──────────────────────────────────────────────────────

fn parse_param<'a>(input: &mut &'a str) -> ModalResult<(&'a str, &'a str)> {
    let key = take_till(1.., |c: char| c == '=' || c == '&').parse_next(input)?;
    let value = opt(preceded('=', take_till(0.., '&'))).parse_next(input)?;
    Ok((key, value.unwrap_or("")))
}

fn parse_params<'a>(input: &mut &'a str) -> ModalResult<Vec<(&'a str, &'a str)>> {
    let _ = opt('#').parse_next(input)?;
    separated(0.., parse_param, '&').parse_next(input)
}

/// Extract the document from a URL fragment (`#data=...`, the leading `#`
/// optional). A fragment without a `data` parameter yields `Ok(None)`.
pub fn parse_share_fragment(fragment: &str) -> Result<Option<Document>, PersistError> {
    let mut rest = fragment;
    let params = parse_params
        .parse_next(&mut rest)
        .map_err(|e| PersistError::Fragment(e.to_string()))?;

    let Some((_, encoded)) = params.into_iter().find(|(k, _)| *k == SHARE_PARAM) else {
        return Ok(None);
    };
    if encoded.is_empty() {
        return Ok(None);
    }
    let json = urlencoding::decode(encoded).map_err(|e| PersistError::Fragment(e.to_string()))?;
    Ok(Some(Document::from_json(&json)?))
}

/// The fragment part of a full URL, if any.
pub fn fragment_of(url: &str) -> Option<&str> {
    url.split_once('#').map(|(_, frag)| frag)
}
