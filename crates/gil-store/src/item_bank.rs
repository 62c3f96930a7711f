//! In-memory item bank.

use std::collections::HashMap;

use async_trait::async_trait;

use gil_core::model::Item;
use gil_core::parser::ItemBankFile;
use gil_core::traits::ItemBank;

/// Item bank held in memory, typically loaded from TOML files.
#[derive(Debug, Clone, Default)]
pub struct InMemoryItemBank {
    items: Vec<Item>,
    index: HashMap<String, usize>,
}

impl InMemoryItemBank {
    /// Build a bank from items. A later duplicate id replaces the earlier item.
    pub fn new(items: Vec<Item>) -> Self {
        let mut bank = Self::default();
        for item in items {
            match bank.index.get(&item.id) {
                Some(&pos) => {
                    tracing::warn!("duplicate item id '{}', keeping the last definition", item.id);
                    bank.items[pos] = item;
                }
                None => {
                    bank.index.insert(item.id.clone(), bank.items.len());
                    bank.items.push(item);
                }
            }
        }
        bank
    }

    /// Merge the items of several parsed files.
    pub fn from_files(files: &[ItemBankFile]) -> Self {
        Self::new(files.iter().flat_map(|f| f.items.iter().cloned()).collect())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Active items in a domain.
    pub fn domain_size(&self, domain: &str) -> usize {
        self.items
            .iter()
            .filter(|i| i.is_active && i.domain == domain)
            .count()
    }
}

#[async_trait]
impl ItemBank for InMemoryItemBank {
    async fn get_candidate_items(
        &self,
        domain: &str,
        exclude_ids: &[String],
    ) -> anyhow::Result<Vec<Item>> {
        Ok(self
            .items
            .iter()
            .filter(|i| i.is_active && i.domain == domain)
            .filter(|i| !exclude_ids.contains(&i.id))
            .cloned()
            .collect())
    }

    async fn get_item(&self, id: &str) -> anyhow::Result<Option<Item>> {
        Ok(self.index.get(id).map(|&pos| self.items[pos].clone()))
    }
}
