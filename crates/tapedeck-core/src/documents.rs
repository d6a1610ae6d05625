//! Source document arena
//!
//! Documents are keyed by stable id and carry an explicit order, so hosts
//! reorder tabs with `move_to` instead of find-then-splice over a shared
//! array. Labels double as the keys of the compile file map and must be
//! unique.

use std::collections::HashMap;

use uuid::Uuid;

use crate::error::{DeckError, DeckResult};

/// One source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: Uuid,
    pub label: String,
    pub text: String,
}

/// Ordered arena of source documents
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    documents: HashMap<Uuid, Document>,
    order: Vec<Uuid>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document; returns its freshly minted id
    pub fn insert(&mut self, label: impl Into<String>, text: impl Into<String>) -> DeckResult<Uuid> {
        let index = self.order.len();
        self.insert_at(index, label, text)
    }

    /// Insert a document at a position in the order (clamped to the end)
    pub fn insert_at(
        &mut self,
        index: usize,
        label: impl Into<String>,
        text: impl Into<String>,
    ) -> DeckResult<Uuid> {
        let label = label.into();
        if self.label_taken(&label) {
            return Err(DeckError::DuplicateLabel(label));
        }
        let id = Uuid::new_v4();
        self.documents.insert(id, Document {
            id,
            label,
            text: text.into(),
        });
        let index = index.min(self.order.len());
        self.order.insert(index, id);
        Ok(id)
    }

    /// Move a document to a new position in the order (clamped to the end)
    pub fn move_to(&mut self, id: Uuid, index: usize) -> DeckResult<()> {
        let current = self
            .position(id)
            .ok_or_else(|| DeckError::unknown_entry(id.to_string()))?;
        self.order.remove(current);
        let index = index.min(self.order.len());
        self.order.insert(index, id);
        Ok(())
    }

    pub fn remove(&mut self, id: Uuid) -> DeckResult<Document> {
        let document = self
            .documents
            .remove(&id)
            .ok_or_else(|| DeckError::unknown_entry(id.to_string()))?;
        self.order.retain(|&other| other != id);
        Ok(document)
    }

    pub fn rename(&mut self, id: Uuid, label: impl Into<String>) -> DeckResult<()> {
        let label = label.into();
        if self.documents.get(&id).is_some_and(|d| d.label == label) {
            return Ok(());
        }
        if self.label_taken(&label) {
            return Err(DeckError::DuplicateLabel(label));
        }
        let document = self
            .documents
            .get_mut(&id)
            .ok_or_else(|| DeckError::unknown_entry(id.to_string()))?;
        document.label = label;
        Ok(())
    }

    pub fn set_text(&mut self, id: Uuid, text: impl Into<String>) -> DeckResult<()> {
        let document = self
            .documents
            .get_mut(&id)
            .ok_or_else(|| DeckError::unknown_entry(id.to_string()))?;
        document.text = text.into();
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Option<&Document> {
        self.documents.get(&id)
    }

    /// Documents in display order
    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.order.iter().filter_map(|id| self.documents.get(id))
    }

    /// Id of the first document in the order, the default entry choice
    pub fn first(&self) -> Option<Uuid> {
        self.order.first().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Label → text map handed to the compiler
    pub fn file_map(&self) -> HashMap<String, String> {
        self.documents
            .values()
            .map(|d| (d.label.clone(), d.text.clone()))
            .collect()
    }

    /// Resolve a document id to its label, if it exists
    pub fn resolve_entry(&self, id: Uuid) -> Option<String> {
        self.documents.get(&id).map(|d| d.label.clone())
    }

    fn label_taken(&self, label: &str) -> bool {
        self.documents.values().any(|d| d.label == label)
    }

    fn position(&self, id: Uuid) -> Option<usize> {
        self.order.iter().position(|&other| other == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_preserves_order_and_resolves_entries() {
        let mut store = DocumentStore::new();
        let a = store.insert("a.tape", "+").unwrap();
        let b = store.insert("b.tape", "-").unwrap();

        let labels: Vec<_> = store.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["a.tape", "b.tape"]);
        assert_eq!(store.first(), Some(a));
        assert_eq!(store.resolve_entry(b).as_deref(), Some("b.tape"));
        assert_eq!(store.resolve_entry(Uuid::new_v4()), None);
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let mut store = DocumentStore::new();
        store.insert("main.tape", "").unwrap();
        assert!(matches!(
            store.insert("main.tape", ""),
            Err(DeckError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn move_to_reorders_without_losing_documents() {
        let mut store = DocumentStore::new();
        let a = store.insert("a", "").unwrap();
        let _b = store.insert("b", "").unwrap();
        let c = store.insert("c", "").unwrap();

        store.move_to(c, 0).unwrap();
        let labels: Vec<_> = store.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["c", "a", "b"]);

        // Out-of-range targets clamp to the end.
        store.move_to(c, 99).unwrap();
        let labels: Vec<_> = store.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["a", "b", "c"]);

        store.remove(a).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.first(), store.iter().next().map(|d| d.id));
    }

    #[test]
    fn rename_guards_collisions_but_allows_noop() {
        let mut store = DocumentStore::new();
        let a = store.insert("a", "").unwrap();
        store.insert("b", "").unwrap();

        assert!(store.rename(a, "a").is_ok());
        assert!(store.rename(a, "c").is_ok());
        assert!(matches!(store.rename(a, "b"), Err(DeckError::DuplicateLabel(_))));
    }

    #[test]
    fn file_map_mirrors_current_text() {
        let mut store = DocumentStore::new();
        let id = store.insert("main.tape", "+.").unwrap();
        store.set_text(id, "-.").unwrap();

        let map = store.file_map();
        assert_eq!(map.len(), 1);
        assert_eq!(map["main.tape"], "-.");
    }
}
