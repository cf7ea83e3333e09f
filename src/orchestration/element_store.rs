//! In-memory [`ElementStore`] for embedding and tests.

use crate::orchestration::types::{Element, ElementStore};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

#[derive(Debug, Default)]
pub struct InMemoryElementStore {
    elements: DashMap<String, Element>,
}

impl InMemoryElementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_elements(elements: impl IntoIterator<Item = Element>) -> Self {
        let store = Self::new();
        for element in elements {
            store.insert(element);
        }
        store
    }

    /// Insert or replace an element, returning the previous value
    pub fn insert(&self, element: Element) -> Option<Element> {
        self.elements.insert(element.id.clone(), element)
    }

    pub fn insert_value(&self, id: impl Into<String>, data: Value) -> Option<Element> {
        self.insert(Element::new(id, data))
    }

    pub fn remove(&self, id: &str) -> Option<Element> {
        self.elements.remove(id).map(|(_, element)| element)
    }

    pub fn get(&self, id: &str) -> Option<Element> {
        self.elements.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

#[async_trait]
impl ElementStore for InMemoryElementStore {
    async fn resolve(&self, ids: &[String]) -> anyhow::Result<Vec<Element>> {
        Ok(ids.iter().filter_map(|id| self.get(id)).collect())
    }
}
