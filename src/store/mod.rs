//! The demo data store: every collection the mock backend serves, held in
//! memory and mirrored into a [`StorageScopes`] after each mutation.
//!
//! The store never cascades. Handlers own referential cleanup and call
//! [`DemoStore::retain_where`] for junction rows before deleting a parent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::DemoConfig,
    id::new_uuid_v7,
    seed::{Record, SeedData},
    storage::{PersistError, StorageScopes},
    time::now_iso,
};

pub mod ids;

pub use ids::{field_matches, matches_id, record_id, IdLike, ID_FIELD, LEGACY_ID_FIELD};

/// Field scanned by [`DemoStore::next_sequence`].
pub const SEQUENCE_FIELD: &str = "invoiceNumber";

/// Fields a patch may never overwrite.
const IMMUTABLE_FIELDS: &[&str] = &[ID_FIELD, LEGACY_ID_FIELD, "createdAt", "tenantId"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
struct PersistedState {
    #[serde(default)]
    collections: BTreeMap<String, Vec<Record>>,
    #[serde(default)]
    tenant: Record,
}

/// How the current state was obtained at initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOrigin {
    /// No session marker: a new session always starts from seed data.
    NewSession,
    /// The durable version marker differed from the configured schema version.
    VersionChanged,
    /// Persisted state from this session was restored.
    Restored,
    /// Persisted state was missing or unreadable; seed data was used instead.
    RestoreFailed,
    /// State was replaced by an explicit reset.
    Reset,
}

impl StateOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateOrigin::NewSession => "new_session",
            StateOrigin::VersionChanged => "version_changed",
            StateOrigin::Restored => "restored",
            StateOrigin::RestoreFailed => "restore_failed",
            StateOrigin::Reset => "reset",
        }
    }
}

pub struct DemoStore {
    state: PersistedState,
    storage: StorageScopes,
    config: DemoConfig,
    origin: StateOrigin,
}

impl DemoStore {
    /// Build the store for this session.
    ///
    /// A missing session marker or a schema version mismatch replaces state
    /// with seed data; otherwise persisted state is loaded, falling back to
    /// seed data if it cannot be parsed.
    pub fn initialize(seed: &SeedData, storage: StorageScopes, config: DemoConfig) -> Self {
        let has_session = storage.session.get(&config.session_key).is_some();
        let stored_version = storage.durable.get(&config.version_key);
        let version_matches = stored_version.as_deref() == Some(config.schema_version.as_str());

        let mut store = Self {
            state: PersistedState::default(),
            storage,
            config,
            origin: StateOrigin::NewSession,
        };

        if !has_session || !version_matches {
            store.origin = if has_session {
                StateOrigin::VersionChanged
            } else {
                StateOrigin::NewSession
            };
            store.load_seed(seed);
            info!(
                target: "boarding_mock",
                event = "store_seeded",
                reason = store.origin.as_str(),
                stored_version = stored_version.as_deref().unwrap_or("none"),
                schema_version = %store.config.schema_version
            );
            store.persist_or_log("initialize");
        } else {
            match store.read_persisted() {
                Some(state) => {
                    store.state = state;
                    store.origin = StateOrigin::Restored;
                    info!(
                        target: "boarding_mock",
                        event = "store_restored",
                        collections = store.state.collections.len()
                    );
                }
                None => {
                    store.origin = StateOrigin::RestoreFailed;
                    store.load_seed(seed);
                    store.persist_or_log("initialize");
                }
            }
        }

        store.write_markers();
        store
    }

    fn read_persisted(&self) -> Option<PersistedState> {
        let raw = self.storage.durable.get(&self.config.storage_key)?;
        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(mut state) => {
                for records in state.collections.values_mut() {
                    for record in records.iter_mut() {
                        ingest(record, &self.config.tenant_id);
                    }
                }
                Some(state)
            }
            Err(err) => {
                warn!(
                    target: "boarding_mock",
                    event = "store_restore_parse_failed",
                    error = %err
                );
                None
            }
        }
    }

    fn write_markers(&self) {
        if let Err(err) = self
            .storage
            .durable
            .set(&self.config.version_key, &self.config.schema_version)
        {
            warn!(target: "boarding_mock", event = "version_marker_write_failed", error = %err);
        }
        if self.storage.session.get(&self.config.session_key).is_none() {
            if let Err(err) = self
                .storage
                .session
                .set(&self.config.session_key, &new_uuid_v7())
            {
                warn!(target: "boarding_mock", event = "session_marker_write_failed", error = %err);
            }
        }
    }

    fn load_seed(&mut self, seed: &SeedData) {
        let mut collections = seed.collections.clone();
        for records in collections.values_mut() {
            for record in records.iter_mut() {
                ingest(record, &self.config.tenant_id);
            }
        }
        self.state = PersistedState {
            collections,
            tenant: seed.tenant.clone(),
        };
    }

    pub fn origin(&self) -> StateOrigin {
        self.origin
    }

    pub fn config(&self) -> &DemoConfig {
        &self.config
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.state.collections.keys().map(String::as_str)
    }

    /// The named collection, or an empty slice when it does not exist.
    pub fn collection(&self, name: &str) -> &[Record] {
        self.state
            .collections
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Live access to a collection. Callers mutating through this must call
    /// [`DemoStore::persist`] themselves.
    pub fn collection_mut(&mut self, name: &str) -> &mut Vec<Record> {
        self.state.collections.entry(name.to_string()).or_default()
    }

    pub fn get_by_id<K: IdLike + ?Sized>(&self, collection: &str, id: &K) -> Option<&Record> {
        let key = id.id_key()?;
        self.collection(collection)
            .iter()
            .find(|record| matches_id(record, &key))
    }

    /// Rows whose `field` refers to `key`.
    pub fn find_where<'a>(
        &'a self,
        collection: &str,
        field: &'a str,
        key: &'a str,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        self.collection(collection)
            .iter()
            .filter(move |record| field_matches(record, field, key))
    }

    /// Remove every row whose `field` refers to `key`; returns how many went.
    pub fn retain_where(&mut self, collection: &str, field: &str, key: &str) -> usize {
        let Some(records) = self.state.collections.get_mut(collection) else {
            return 0;
        };
        let before = records.len();
        records.retain(|record| !field_matches(record, field, key));
        let removed = before - records.len();
        if removed > 0 {
            debug!(
                target: "boarding_mock",
                event = "rows_removed",
                collection,
                field,
                key,
                removed
            );
            self.persist_or_log("retain_where");
        }
        removed
    }

    /// Append a record, assigning identifiers and audit fields.
    pub fn insert(&mut self, collection: &str, mut record: Record) -> Record {
        if !ids::normalize_ids(&mut record) {
            record.insert(ID_FIELD.to_string(), Value::String(new_uuid_v7()));
            ids::normalize_ids(&mut record);
        }
        let now = Value::String(now_iso());
        record.insert(
            "tenantId".to_string(),
            Value::String(self.config.tenant_id.clone()),
        );
        record.insert("createdAt".to_string(), now.clone());
        record.insert("updatedAt".to_string(), now);

        self.collection_mut(collection).push(record.clone());
        self.persist_or_log("insert");
        record
    }

    /// Shallow-merge `patch` over the addressed record.
    pub fn update<K: IdLike + ?Sized>(
        &mut self,
        collection: &str,
        id: &K,
        patch: &Record,
    ) -> Option<Record> {
        let key = id.id_key()?.into_owned();
        let records = self.state.collections.get_mut(collection)?;
        let record = records.iter_mut().find(|record| matches_id(record, &key))?;
        for (field, value) in patch {
            if IMMUTABLE_FIELDS.contains(&field.as_str()) {
                continue;
            }
            record.insert(field.clone(), value.clone());
        }
        record.insert("updatedAt".to_string(), Value::String(now_iso()));
        let updated = record.clone();
        self.persist_or_log("update");
        Some(updated)
    }

    pub fn delete<K: IdLike + ?Sized>(&mut self, collection: &str, id: &K) -> bool {
        let Some(key) = id.id_key().map(|key| key.into_owned()) else {
            return false;
        };
        let Some(records) = self.state.collections.get_mut(collection) else {
            return false;
        };
        let Some(index) = records.iter().position(|record| matches_id(record, &key)) else {
            return false;
        };
        records.remove(index);
        self.persist_or_log("delete");
        true
    }

    /// Next `PREFIX#####` number after the highest one used in `collection`.
    pub fn next_sequence(&self, prefix: &str, collection: &str) -> String {
        let highest = self
            .collection(collection)
            .iter()
            .filter_map(|record| record.get(SEQUENCE_FIELD).and_then(Value::as_str))
            .filter_map(|number| number.strip_prefix(prefix))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        format!(
            "{prefix}{:0width$}",
            highest + 1,
            width = self.config.sequence_width
        )
    }

    /// Replace everything with a fresh copy of `seed`.
    pub fn reset(&mut self, seed: &SeedData) {
        self.load_seed(seed);
        self.origin = StateOrigin::Reset;
        info!(target: "boarding_mock", event = "store_reset");
        self.persist_or_log("reset");
    }

    pub fn tenant(&self) -> &Record {
        &self.state.tenant
    }

    pub fn update_tenant(&mut self, patch: &Record) -> Record {
        for (field, value) in patch {
            self.state.tenant.insert(field.clone(), value.clone());
        }
        self.state
            .tenant
            .insert("updatedAt".to_string(), Value::String(now_iso()));
        self.persist_or_log("update_tenant");
        self.state.tenant.clone()
    }

    /// Serialize the whole state into durable storage.
    pub fn persist(&self) -> Result<(), PersistError> {
        let serialized = serde_json::to_string(&self.state)?;
        self.storage
            .durable
            .set(&self.config.storage_key, &serialized)
    }

    /// Persistence is best effort: the in-memory state stays authoritative.
    fn persist_or_log(&self, operation: &'static str) {
        if let Err(err) = self.persist() {
            warn!(
                target: "boarding_mock",
                event = "store_persist_failed",
                operation,
                error = %err
            );
        }
    }
}

/// Normalize a record entering the store from seed or persisted data.
fn ingest(record: &mut Record, tenant_id: &str) {
    if !ids::normalize_ids(record) {
        record.insert(ID_FIELD.to_string(), Value::String(new_uuid_v7()));
        ids::normalize_ids(record);
    }
    if !record.contains_key("tenantId") {
        record.insert(
            "tenantId".to_string(),
            Value::String(tenant_id.to_string()),
        );
    }
    if !record.contains_key("createdAt") {
        record.insert("createdAt".to_string(), Value::String(now_iso()));
    }
    if !record.contains_key("updatedAt") {
        let created = record
            .get("createdAt")
            .cloned()
            .unwrap_or_else(|| Value::String(now_iso()));
        record.insert("updatedAt".to_string(), created);
    }
}
