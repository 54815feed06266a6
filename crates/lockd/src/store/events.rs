//! Persistent, bounded event log.
//!
//! Events append in chronological order and read back with an
//! offset/limit window. When the log exceeds its retention cap the
//! oldest entries are dropped. Persistence follows the same JSON
//! replace-on-save scheme as the key store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use protocol::{EventsFilter, LockEvent};
use serde::{Deserialize, Serialize};

/// Wrapper for serializing the event log.
#[derive(Debug, Serialize, Deserialize)]
struct EventStoreData {
    /// Version of the store format (for future migrations).
    version: u32,
    /// Logged events, oldest first.
    events: Vec<LockEvent>,
}

impl Default for EventStoreData {
    fn default() -> Self {
        Self {
            version: 1,
            events: Vec::new(),
        }
    }
}

/// Thread-safe, bounded store for the lock's event log.
pub struct EventStore {
    /// The path to the JSON file.
    path: PathBuf,
    /// Logged events, oldest first.
    events: RwLock<Vec<LockEvent>>,
    /// Maximum number of events retained.
    max_events: usize,
}

impl EventStore {
    /// Creates an event store that will persist to the given path.
    pub fn new<P: AsRef<Path>>(path: P, max_events: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            events: RwLock::new(Vec::new()),
            max_events,
        }
    }

    /// Creates a store at `path` and loads any existing data.
    pub fn open<P: AsRef<Path>>(path: P, max_events: usize) -> Result<Self> {
        let store = Self::new(path, max_events);
        store.load()?;
        Ok(store)
    }

    /// Returns the path to the event log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the event log from the JSON file.
    ///
    /// If the file does not exist, the log will be empty.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!("Event log not found at {:?}, starting empty", self.path);
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read event log: {}", self.path.display()))?;
        let data: EventStoreData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse event log: {}", self.path.display()))?;

        let mut events = self.write_events()?;
        *events = data.events;
        Self::enforce_retention(&mut events, self.max_events);

        tracing::info!("Loaded {} events from {:?}", events.len(), self.path);
        Ok(())
    }

    /// Saves the event log to the JSON file.
    ///
    /// Uses atomic write (write to temp file, then rename) to prevent
    /// corruption.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create event log directory: {}", parent.display())
            })?;
        }

        let data = {
            let events = self.read_events()?;
            EventStoreData {
                version: 1,
                events: events.clone(),
            }
        };

        let contents = serde_json::to_string_pretty(&data).context("Failed to serialize event log")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents)
            .with_context(|| format!("Failed to write temp event log: {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp event log {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!("Saved {} events to {:?}", data.events.len(), self.path);
        Ok(())
    }

    /// Appends one event, dropping the oldest past the retention cap.
    ///
    /// Does not automatically save; call `save()` after making changes.
    pub fn append(&self, event: LockEvent) -> Result<()> {
        let mut events = self.write_events()?;
        tracing::debug!("Logging event {:?} by key {}", event.action, event.key);
        events.push(event);
        Self::enforce_retention(&mut events, self.max_events);
        Ok(())
    }

    /// Returns every logged event, oldest first.
    pub fn all(&self) -> Vec<LockEvent> {
        self.read_events()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Reads back a pagination window of the log, oldest first.
    pub fn fetch(&self, filter: &EventsFilter) -> Vec<LockEvent> {
        let events = match self.read_events() {
            Ok(events) => events,
            Err(_) => return Vec::new(),
        };
        let window = events.iter().skip(filter.offset as usize);
        match filter.limit {
            Some(limit) => window.take(limit as usize).cloned().collect(),
            None => window.cloned().collect(),
        }
    }

    /// Returns the number of logged events.
    pub fn len(&self) -> usize {
        self.read_events().map(|events| events.len()).unwrap_or(0)
    }

    /// Returns true if no event has been logged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn enforce_retention(events: &mut Vec<LockEvent>, max_events: usize) {
        if events.len() > max_events {
            let excess = events.len() - max_events;
            events.drain(..excess);
            tracing::debug!("Dropped {} events past the retention cap", excess);
        }
    }

    fn read_events(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<LockEvent>>> {
        self.events
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on event log"))
    }

    fn write_events(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<LockEvent>>> {
        self.events
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on event log"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{EventAction, UnlockAction};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn unlock_event() -> LockEvent {
        LockEvent::new(
            Uuid::new_v4(),
            EventAction::Unlock {
                action: UnlockAction::Default,
            },
        )
    }

    #[test]
    fn test_append_and_fetch_in_order() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::new(dir.path().join("events.json"), 100);

        let events: Vec<LockEvent> = (0..5).map(|_| unlock_event()).collect();
        for event in &events {
            store.append(event.clone()).unwrap();
        }

        assert_eq!(store.len(), 5);
        assert_eq!(store.all(), events);

        let window = store.fetch(&EventsFilter {
            offset: 1,
            limit: Some(2),
        });
        assert_eq!(window, events[1..3].to_vec());
    }

    #[test]
    fn test_fetch_without_limit_reads_to_end() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::new(dir.path().join("events.json"), 100);
        for _ in 0..4 {
            store.append(unlock_event()).unwrap();
        }

        let window = store.fetch(&EventsFilter {
            offset: 2,
            limit: None,
        });
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_fetch_past_end_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::new(dir.path().join("events.json"), 100);
        store.append(unlock_event()).unwrap();

        let window = store.fetch(&EventsFilter {
            offset: 10,
            limit: None,
        });
        assert!(window.is_empty());
    }

    #[test]
    fn test_retention_drops_oldest() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::new(dir.path().join("events.json"), 3);

        let events: Vec<LockEvent> = (0..5).map(|_| unlock_event()).collect();
        for event in &events {
            store.append(event.clone()).unwrap();
        }

        assert_eq!(store.len(), 3);
        assert_eq!(store.all(), events[2..].to_vec());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.json");

        let events: Vec<LockEvent> = (0..3).map(|_| unlock_event()).collect();
        {
            let store = EventStore::new(&path, 100);
            for event in &events {
                store.append(event.clone()).unwrap();
            }
            store.save().unwrap();
        }

        let store = EventStore::open(&path, 100).unwrap();
        assert_eq!(store.all(), events);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = EventStore::open(dir.path().join("absent.json"), 100).unwrap();
        assert!(store.is_empty());
    }
}
