//! Key-value attribute store, read by the polling submitter.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use relay_core::BoxFuture;

use crate::error::TransportResult;

/// Attributes addressed by table, item, and attribute name.
pub trait AttributeStore: Send + Sync {
    /// Read an attribute; `None` when it was never written.
    fn get_attribute<'a>(
        &'a self,
        table: &'a str,
        item: &'a str,
        attribute: &'a str,
    ) -> BoxFuture<'a, TransportResult<Option<String>>>;

    fn put_attribute<'a>(
        &'a self,
        table: &'a str,
        item: &'a str,
        attribute: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>>;
}

type AttributeKey = (String, String, String);

#[derive(Clone, Default)]
pub struct MemoryAttributeStore {
    values: Arc<RwLock<HashMap<AttributeKey, String>>>,
}

impl MemoryAttributeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn attribute_key(table: &str, item: &str, attribute: &str) -> AttributeKey {
    (table.to_string(), item.to_string(), attribute.to_string())
}

impl AttributeStore for MemoryAttributeStore {
    fn get_attribute<'a>(
        &'a self,
        table: &'a str,
        item: &'a str,
        attribute: &'a str,
    ) -> BoxFuture<'a, TransportResult<Option<String>>> {
        Box::pin(async move {
            Ok(self
                .values
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .get(&attribute_key(table, item, attribute))
                .cloned())
        })
    }

    fn put_attribute<'a>(
        &'a self,
        table: &'a str,
        item: &'a str,
        attribute: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(async move {
            self.values
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .insert(attribute_key(table, item, attribute), value.to_string());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_attribute_reads_as_none() {
        let store = MemoryAttributeStore::new();
        assert_eq!(store.get_attribute("t", "a", "recognition").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_overwrites_previous_value() {
        let store = MemoryAttributeStore::new();
        store.put_attribute("t", "a", "recognition", "Paul").await.unwrap();
        store.put_attribute("t", "a", "recognition", "Emma").await.unwrap();
        assert_eq!(
            store.get_attribute("t", "a", "recognition").await.unwrap().as_deref(),
            Some("Emma")
        );
        assert_eq!(store.get_attribute("t", "b", "recognition").await.unwrap(), None);
    }
}
