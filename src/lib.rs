//! Mock backend for a pet-boarding management app.
//!
//! A [`DemoStore`] holds every collection in memory and persists through a
//! pluggable key/value backend; a [`Dispatcher`] routes synthetic REST
//! requests onto resource handlers and always answers with an
//! [`ApiResponse`].

pub mod config;
pub mod envelope;
mod error;
mod fence;
pub mod handlers;
pub mod id;
pub mod logging;
pub mod query;
pub mod request;
pub mod router;
pub mod seed;
pub mod storage;
pub mod store;
pub mod time;

pub use config::DemoConfig;
pub use envelope::{Envelope, ListShape};
pub use error::{panic_payload, AppError, AppResult, CrashId};
pub use request::{ApiRequest, Method, RequestBody};
pub use router::{ApiResponse, Dispatcher, ResourceKind, Route, RouteTable};
pub use seed::{Record, SeedData, SeedError};
pub use storage::{
    FileStorage, KeyValueStore, MemoryStorage, PersistError, StorageHandle, StorageScopes,
};
pub use store::{DemoStore, StateOrigin};

/// Store over the bundled seed with in-memory storage, as tests and demos use it.
pub fn demo_dispatcher() -> AppResult<Dispatcher> {
    let seed = SeedData::bundled(chrono::Utc::now())?;
    let store = DemoStore::initialize(&seed, StorageScopes::in_memory(), DemoConfig::default());
    Ok(Dispatcher::new(store))
}
