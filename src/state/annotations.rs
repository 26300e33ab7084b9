use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::cache::KvCache;
use crate::state::codec;

/// A user-authored marker on the chart: a dated vertical line with a label
/// anchored at `y_value`. One logical entity; the split into line and label
/// primitives happens only at the chart boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Epoch milliseconds; x position of the line.
    pub date: i64,
    /// Label anchor in chart-percentage units (0-100). The line itself
    /// always spans full height.
    pub y_value: f64,
    pub content: String,
    pub source: String,
}

/// One-field edit applied to an existing annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationEdit {
    Date(i64),
    YValue(f64),
    Content(String),
    Source(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AnnotationError {
    #[error("annotation index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Canonical in-memory annotation list for the active market.
///
/// The cache and the URL are projections of this list, never sources of
/// truth once it exists; they are consulted only at seed time, URL first.
/// Identity is positional: an annotation's index is its identity until a
/// remove shifts later indices down.
#[derive(Debug, Default)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
}

impl AnnotationStore {
    /// Seed the store for a freshly selected market. Precedence: the URL
    /// token when present (shared links override local edits), else the
    /// cache entry for this slug, else empty. Malformed tokens decode to
    /// empty lists, so a bad URL still falls back cleanly.
    pub fn initialize(slug: &str, url_token: Option<&str>, cache: &KvCache) -> Self {
        if let Some(token) = url_token {
            let annotations = codec::decode_annotations(token);
            debug!("seeded {} annotations from URL for {}", annotations.len(), slug);
            return Self { annotations };
        }

        let annotations = cache
            .get(&KvCache::annotations_key(slug))
            .map(|token| codec::decode_annotations(&token))
            .unwrap_or_default();
        debug!("seeded {} annotations from cache for {}", annotations.len(), slug);
        Self { annotations }
    }

    pub fn from_list(annotations: Vec<Annotation>) -> Self {
        Self { annotations }
    }

    pub fn list(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Append a new annotation. Empty content defaults to `Event {n}`
    /// where n is the 0-based creation index.
    pub fn add(&mut self, date: i64, y_value: f64, content: String, source: String) -> usize {
        let content = if content.is_empty() {
            format!("Event {}", self.annotations.len())
        } else {
            content
        };
        self.annotations.push(Annotation {
            date,
            y_value,
            content,
            source,
        });
        self.annotations.len() - 1
    }

    /// Mutate exactly one field of the annotation at `index`.
    pub fn update(&mut self, index: usize, edit: AnnotationEdit) -> Result<(), AnnotationError> {
        let len = self.annotations.len();
        let annotation = self
            .annotations
            .get_mut(index)
            .ok_or(AnnotationError::IndexOutOfRange { index, len })?;

        match edit {
            AnnotationEdit::Date(date) => annotation.date = date,
            AnnotationEdit::YValue(y) => annotation.y_value = y,
            AnnotationEdit::Content(content) => annotation.content = content,
            AnnotationEdit::Source(source) => annotation.source = source,
        }
        Ok(())
    }

    /// Delete the annotation at `index`; later indices shift down by one.
    pub fn remove(&mut self, index: usize) -> Result<Annotation, AnnotationError> {
        if index >= self.annotations.len() {
            return Err(AnnotationError::IndexOutOfRange {
                index,
                len: self.annotations.len(),
            });
        }
        Ok(self.annotations.remove(index))
    }
}
