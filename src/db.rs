use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::parser::EntryError;

/// Largest quantity a catalog entry can hold (SQLite INTEGER range)
pub const MAX_QUANTITY: u64 = i64::MAX as u64;

/// One named item: accumulated quantity and last known unit price
///
/// `unit_price == 0.0` means "unpriced".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub quantity: u64,
    pub unit_price: f64,
}

impl CatalogEntry {
    pub fn new(name: &str, quantity: u64, unit_price: f64) -> Self {
        Self {
            name: name.to_string(),
            quantity,
            unit_price,
        }
    }

    pub fn is_priced(&self) -> bool {
        self.unit_price != 0.0
    }

    /// quantity × unit_price
    pub fn line_value(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }
}

// ============================================================================
// STORE CONTRACT
// ============================================================================

/// Keyed record set of catalog entries
///
/// Names are unique. A full parse or extract pass calls `begin` once, does
/// its upserts and then `commit`s; stores without transactions may ignore
/// both.
pub trait CatalogStore {
    fn find_by_name(&self, name: &str) -> Result<Option<CatalogEntry>>;

    /// Insert a new entry; fails if the name is taken
    fn create(&mut self, name: &str, quantity: u64, unit_price: f64) -> Result<CatalogEntry>;

    /// Accumulate quantity on an existing entry
    fn add_quantity(&mut self, name: &str, delta: u64) -> Result<()>;

    /// Overwrite the unit price; returns false if the name is unknown
    fn set_price(&mut self, name: &str, unit_price: f64) -> Result<bool>;

    /// All entries in insertion order
    fn all(&self) -> Result<Vec<CatalogEntry>>;

    fn unpriced(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.all()?.into_iter().filter(|e| !e.is_priced()).collect())
    }

    fn count(&self) -> Result<usize>;

    /// Bulk clear, returns the number of entries removed
    fn clear(&mut self) -> Result<usize>;

    /// Start a batch of changes made on behalf of `actor`
    fn begin(&mut self, _actor: &'static str) -> Result<()> {
        Ok(())
    }

    /// Flush the current batch
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Discard the current batch
    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Run `work` as one batch on behalf of `actor`
///
/// Commits when `work` succeeds. Any error, including a failed commit, rolls
/// the batch back so nothing leaks into the next one.
pub fn in_batch<S, T, F>(store: &mut S, actor: &'static str, work: F) -> Result<T>
where
    S: CatalogStore + ?Sized,
    F: FnOnce(&mut S) -> Result<T>,
{
    store.begin(actor)?;

    let result = work(store).and_then(|value| store.commit().map(|_| value));

    if result.is_err() {
        if let Err(e) = store.rollback() {
            warn!(actor, error = %e, "rollback failed");
        }
    }

    result
}

/// `current + delta`, bounded by `MAX_QUANTITY`
pub(crate) fn accumulate(name: &str, current: u64, delta: u64) -> Result<u64, EntryError> {
    current
        .checked_add(delta)
        .filter(|total| *total <= MAX_QUANTITY)
        .ok_or_else(|| EntryError::QuantityOverflow {
            name: name.to_string(),
        })
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

/// Event for audit trail: every change to the catalog is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            quantity INTEGER NOT NULL DEFAULT 0,
            unit_price REAL NOT NULL DEFAULT 0.0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_items_unit_price ON items(unit_price)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

fn event_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let timestamp: String = row.get(1)?;
    let data: String = row.get(5)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|_| rusqlite::Error::InvalidQuery)?
            .with_timezone(&Utc),
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data: serde_json::from_str(&data).map_err(|_| rusqlite::Error::InvalidQuery)?,
        actor: row.get(6)?,
    })
}

/// Audit trail of one entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE CATALOG
// ============================================================================

const ENTITY_ITEM: &str = "item";
const DEFAULT_ACTOR: &str = "operator";

/// SQLite-backed catalog
///
/// The first mutation after a commit opens a transaction; `commit` closes it.
/// Dropping the catalog with changes pending rolls them back.
pub struct SqliteCatalog {
    conn: Connection,
    actor: &'static str,
}

impl SqliteCatalog {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to set up catalog schema")?;
        Ok(Self {
            conn,
            actor: DEFAULT_ACTOR,
        })
    }

    /// Audit trail for one item, newest first
    pub fn events_for_item(&self, name: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, ENTITY_ITEM, name)
    }

    fn ensure_transaction(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    fn record(&self, event_type: &str, name: &str, data: serde_json::Value) -> Result<()> {
        let event = Event::new(event_type, ENTITY_ITEM, name, data, self.actor);
        insert_event(&self.conn, &event)
    }
}

fn quantity_to_sql(quantity: u64) -> Result<i64, EntryError> {
    i64::try_from(quantity).map_err(|_| EntryError::InvalidQuantity {
        text: quantity.to_string(),
    })
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let quantity: i64 = row.get(1)?;
    Ok(CatalogEntry {
        name: row.get(0)?,
        quantity: u64::try_from(quantity)
            .map_err(|_| rusqlite::Error::IntegralValueOutOfRange(1, quantity))?,
        unit_price: row.get(2)?,
    })
}

impl CatalogStore for SqliteCatalog {
    fn find_by_name(&self, name: &str) -> Result<Option<CatalogEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT name, quantity, unit_price FROM items WHERE name = ?1",
                [name],
                entry_from_row,
            )
            .optional()?;

        Ok(entry)
    }

    fn create(&mut self, name: &str, quantity: u64, unit_price: f64) -> Result<CatalogEntry> {
        self.ensure_transaction()?;
        let now = Utc::now().to_rfc3339();

        let result = self.conn.execute(
            "INSERT INTO items (name, quantity, unit_price, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![name, quantity_to_sql(quantity)?, unit_price, now],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                bail!("Item {:?} already exists", name);
            }
            Err(e) => return Err(e.into()),
        }

        self.record(
            "item_created",
            name,
            serde_json::json!({ "quantity": quantity, "unit_price": unit_price }),
        )?;

        Ok(CatalogEntry::new(name, quantity, unit_price))
    }

    fn add_quantity(&mut self, name: &str, delta: u64) -> Result<()> {
        self.ensure_transaction()?;

        // SQLite turns an overflowing INTEGER sum into REAL, so add here
        let current = self
            .find_by_name(name)?
            .ok_or_else(|| anyhow!("Item {:?} not found", name))?
            .quantity;
        let total = accumulate(name, current, delta)?;

        self.conn.execute(
            "UPDATE items SET quantity = ?1, updated_at = ?2 WHERE name = ?3",
            params![quantity_to_sql(total)?, Utc::now().to_rfc3339(), name],
        )?;

        self.record("quantity_added", name, serde_json::json!({ "delta": delta }))
    }

    fn set_price(&mut self, name: &str, unit_price: f64) -> Result<bool> {
        self.ensure_transaction()?;

        let changed = self.conn.execute(
            "UPDATE items SET unit_price = ?1, updated_at = ?2 WHERE name = ?3",
            params![unit_price, Utc::now().to_rfc3339(), name],
        )?;
        if changed == 0 {
            return Ok(false);
        }

        self.record("price_set", name, serde_json::json!({ "unit_price": unit_price }))?;
        Ok(true)
    }

    fn all(&self) -> Result<Vec<CatalogEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, quantity, unit_price FROM items ORDER BY id")?;

        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn unpriced(&self) -> Result<Vec<CatalogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, quantity, unit_price FROM items WHERE unit_price = 0.0 ORDER BY id",
        )?;

        let entries = stmt
            .query_map([], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }

    fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;

        Ok(usize::try_from(count)?)
    }

    fn clear(&mut self) -> Result<usize> {
        self.ensure_transaction()?;

        let removed = self.conn.execute("DELETE FROM items", [])?;
        self.record("catalog_cleared", "*", serde_json::json!({ "removed": removed }))?;

        Ok(removed)
    }

    fn begin(&mut self, actor: &'static str) -> Result<()> {
        self.ensure_transaction()?;
        self.actor = actor;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn
                .execute_batch("COMMIT")
                .context("Failed to commit catalog changes")?;
            debug!(actor = self.actor, "catalog committed");
        }
        self.actor = DEFAULT_ACTOR;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
            debug!(actor = self.actor, "catalog rolled back");
        }
        self.actor = DEFAULT_ACTOR;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_find() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        catalog.create("Apple", 3, 0.0).unwrap();
        catalog.commit().unwrap();

        let entry = catalog.find_by_name("Apple").unwrap().unwrap();
        assert_eq!(entry, CatalogEntry::new("Apple", 3, 0.0));
        assert!(!entry.is_priced());
        assert!(catalog.find_by_name("Banana").unwrap().is_none());
    }

    #[test]
    fn test_names_are_unique() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        catalog.create("Apple", 1, 0.0).unwrap();
        let err = catalog.create("Apple", 2, 5.0).unwrap_err();

        assert!(err.to_string().contains("already exists"));
        assert_eq!(catalog.count().unwrap(), 1);
    }

    #[test]
    fn test_add_quantity_accumulates() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        catalog.create("Apple", 2, 0.0).unwrap();
        catalog.add_quantity("Apple", 3).unwrap();
        catalog.commit().unwrap();

        assert_eq!(catalog.find_by_name("Apple").unwrap().unwrap().quantity, 5);
        assert!(catalog.add_quantity("Missing", 1).is_err());
    }

    #[test]
    fn test_set_price_and_unpriced() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        catalog.create("Apple", 2, 0.0).unwrap();
        catalog.create("Bread", 1, 0.0).unwrap();

        assert!(catalog.set_price("Apple", 12.5).unwrap());
        assert!(!catalog.set_price("Missing", 1.0).unwrap());
        catalog.commit().unwrap();

        let unpriced = catalog.unpriced().unwrap();
        assert_eq!(unpriced.len(), 1);
        assert_eq!(unpriced[0].name, "Bread");
    }

    #[test]
    fn test_all_in_insertion_order() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        for name in ["Zucchini", "Apple", "Mango"] {
            catalog.create(name, 1, 0.0).unwrap();
        }
        catalog.commit().unwrap();

        let names: Vec<String> = catalog.all().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["Zucchini", "Apple", "Mango"]);
    }

    #[test]
    fn test_clear() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        catalog.create("Apple", 1, 0.0).unwrap();
        catalog.create("Bread", 1, 0.0).unwrap();
        assert_eq!(catalog.clear().unwrap(), 2);
        catalog.commit().unwrap();

        assert_eq!(catalog.count().unwrap(), 0);
    }

    #[test]
    fn test_rollback_discards_batch() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        catalog.create("Apple", 1, 0.0).unwrap();
        catalog.commit().unwrap();

        catalog.begin("entry_parser").unwrap();
        catalog.add_quantity("Apple", 10).unwrap();
        catalog.create("Bread", 1, 0.0).unwrap();
        catalog.rollback().unwrap();

        assert_eq!(catalog.count().unwrap(), 1);
        assert_eq!(catalog.find_by_name("Apple").unwrap().unwrap().quantity, 1);
    }

    #[test]
    fn test_in_batch_commits_on_success() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        let created = in_batch(&mut catalog, "entry_parser", |store| {
            store.create("Apple", 1, 0.0)?;
            store.create("Bread", 2, 0.0)?;
            Ok(2)
        })
        .unwrap();

        assert_eq!(created, 2);
        assert!(catalog.conn.is_autocommit());
        assert_eq!(catalog.count().unwrap(), 2);
    }

    #[test]
    fn test_in_batch_rolls_back_on_error() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        let result: Result<()> = in_batch(&mut catalog, "entry_parser", |store| {
            store.create("Apple", 1, 0.0)?;
            bail!("rejected")
        });
        assert!(result.is_err());
        assert!(catalog.conn.is_autocommit());

        // The next batch must not carry the rejected write along
        in_batch(&mut catalog, "manual_pricing", |store| {
            store.create("Bread", 1, 0.0).map(|_| ())
        })
        .unwrap();

        assert_eq!(catalog.all().unwrap(), vec![CatalogEntry::new("Bread", 1, 0.0)]);
        assert!(catalog.events_for_item("Apple").unwrap().is_empty());
    }

    #[test]
    fn test_add_quantity_overflow_is_rejected() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        catalog.create("Apple", MAX_QUANTITY, 0.0).unwrap();
        let err = catalog.add_quantity("Apple", 1).unwrap_err();
        catalog.commit().unwrap();

        assert_eq!(
            err.downcast_ref::<EntryError>(),
            Some(&EntryError::QuantityOverflow {
                name: "Apple".to_string()
            })
        );
        // Still readable, still at the maximum
        assert_eq!(
            catalog.all().unwrap(),
            vec![CatalogEntry::new("Apple", MAX_QUANTITY, 0.0)]
        );
    }

    #[test]
    fn test_create_rejects_quantity_beyond_integer_range() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        let err = catalog.create("Apple", MAX_QUANTITY + 1, 0.0).unwrap_err();

        assert!(err.downcast_ref::<EntryError>().is_some());
        assert_eq!(catalog.count().unwrap(), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let mut catalog = SqliteCatalog::open(&path).unwrap();
            catalog.create("Apple", 4, 2.5).unwrap();
            catalog.commit().unwrap();
        }

        let catalog = SqliteCatalog::open(&path).unwrap();
        assert_eq!(
            catalog.find_by_name("Apple").unwrap(),
            Some(CatalogEntry::new("Apple", 4, 2.5))
        );
    }

    #[test]
    fn test_uncommitted_changes_dropped_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let mut catalog = SqliteCatalog::open(&path).unwrap();
            catalog.create("Apple", 4, 2.5).unwrap();
        }

        let catalog = SqliteCatalog::open(&path).unwrap();
        assert_eq!(catalog.count().unwrap(), 0);
    }

    #[test]
    fn test_event_log() {
        let mut catalog = SqliteCatalog::open_in_memory().unwrap();

        catalog.begin("entry_parser").unwrap();
        catalog.create("Apple", 2, 0.0).unwrap();
        catalog.commit().unwrap();

        catalog.begin("manual_pricing").unwrap();
        catalog.set_price("Apple", 9.0).unwrap();
        catalog.commit().unwrap();

        let events = catalog.events_for_item("Apple").unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "price_set");
        assert_eq!(events[0].actor, "manual_pricing");
        assert_eq!(events[1].event_type, "item_created");
        assert_eq!(events[1].actor, "entry_parser");
    }
}
