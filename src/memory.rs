// In-process catalog: same contract as SqliteCatalog, no persistence

use anyhow::{bail, Result};

use crate::db::{accumulate, CatalogEntry, CatalogStore, MAX_QUANTITY};
use crate::parser::EntryError;

#[derive(Debug, Default, Clone)]
pub struct MemoryCatalog {
    entries: Vec<CatalogEntry>,
    /// Entries as they were when the open batch began
    snapshot: Option<Vec<CatalogEntry>>,
    commits: usize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed batches
    pub fn commits(&self) -> usize {
        self.commits
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }
}

impl CatalogStore for MemoryCatalog {
    fn find_by_name(&self, name: &str) -> Result<Option<CatalogEntry>> {
        Ok(self.position(name).map(|i| self.entries[i].clone()))
    }

    fn create(&mut self, name: &str, quantity: u64, unit_price: f64) -> Result<CatalogEntry> {
        if self.position(name).is_some() {
            bail!("Item {:?} already exists", name);
        }
        if quantity > MAX_QUANTITY {
            return Err(EntryError::InvalidQuantity {
                text: quantity.to_string(),
            }
            .into());
        }

        let entry = CatalogEntry::new(name, quantity, unit_price);
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn add_quantity(&mut self, name: &str, delta: u64) -> Result<()> {
        match self.position(name) {
            Some(i) => {
                let entry = &mut self.entries[i];
                entry.quantity = accumulate(name, entry.quantity, delta)?;
                Ok(())
            }
            None => bail!("Item {:?} not found", name),
        }
    }

    fn set_price(&mut self, name: &str, unit_price: f64) -> Result<bool> {
        match self.position(name) {
            Some(i) => {
                self.entries[i].unit_price = unit_price;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn all(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.entries.clone())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    fn clear(&mut self) -> Result<usize> {
        let removed = self.entries.len();
        self.entries.clear();
        Ok(removed)
    }

    fn begin(&mut self, _actor: &'static str) -> Result<()> {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.entries.clone());
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.snapshot = None;
        self.commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some(entries) = self.snapshot.take() {
            self.entries = entries;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_catalog_contract() {
        let mut catalog = MemoryCatalog::new();

        catalog.create("Apple", 2, 0.0).unwrap();
        assert!(catalog.create("Apple", 1, 0.0).is_err());

        catalog.add_quantity("Apple", 3).unwrap();
        assert!(catalog.set_price("Apple", 4.0).unwrap());
        assert!(!catalog.set_price("Bread", 4.0).unwrap());

        assert_eq!(
            catalog.find_by_name("Apple").unwrap(),
            Some(CatalogEntry::new("Apple", 5, 4.0))
        );
        assert!(catalog.unpriced().unwrap().is_empty());

        assert_eq!(catalog.clear().unwrap(), 1);
        assert_eq!(catalog.count().unwrap(), 0);
    }

    #[test]
    fn test_memory_catalog_overflow_and_rollback() {
        let mut catalog = MemoryCatalog::new();
        catalog.create("Apple", MAX_QUANTITY, 0.0).unwrap();

        catalog.begin("entry_parser").unwrap();
        catalog.create("Bread", 1, 0.0).unwrap();
        let err = catalog.add_quantity("Apple", 1).unwrap_err();
        catalog.rollback().unwrap();

        assert!(err.downcast_ref::<EntryError>().is_some());
        assert_eq!(
            catalog.all().unwrap(),
            vec![CatalogEntry::new("Apple", MAX_QUANTITY, 0.0)]
        );
        assert_eq!(catalog.commits(), 0);
    }
}
