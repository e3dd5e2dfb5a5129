#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::sync::{Arc, Mutex};

use boarding_mock_lib::{
    ApiResponse, DemoConfig, DemoStore, Dispatcher, Method, SeedData, StorageScopes,
};
use serde_json::Value;
use tracing::subscriber::{self, DefaultGuard};
use tracing_subscriber::{fmt, EnvFilter};

pub fn seed(value: Value) -> SeedData {
    SeedData::from_value(value).expect("seed data")
}

pub fn store(value: Value) -> DemoStore {
    DemoStore::initialize(&seed(value), StorageScopes::in_memory(), DemoConfig::default())
}

pub fn dispatcher(value: Value) -> Dispatcher {
    Dispatcher::new(store(value))
}

pub fn get(dispatcher: &mut Dispatcher, url: &str) -> ApiResponse {
    dispatcher.handle(Method::Get, url, None::<Value>)
}

pub fn post(dispatcher: &mut Dispatcher, url: &str, body: Value) -> ApiResponse {
    dispatcher.handle(Method::Post, url, body)
}

pub fn patch(dispatcher: &mut Dispatcher, url: &str, body: Value) -> ApiResponse {
    dispatcher.handle(Method::Patch, url, body)
}

pub fn delete(dispatcher: &mut Dispatcher, url: &str) -> ApiResponse {
    dispatcher.handle(Method::Delete, url, None::<Value>)
}

/// Ids of the records in a JSON array.
pub fn ids(items: &Value) -> Vec<String> {
    items
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id"))
                .map(|id| match id {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

pub struct BufferWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for BufferWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// JSON log capture for the current thread.
pub fn capture_logs(filter: &str) -> (Arc<Mutex<Vec<u8>>>, DefaultGuard) {
    let buffer: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let writer = buffer.clone();
    let subscriber = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(move || BufferWriter(writer.clone()))
        .json()
        .finish();
    let guard = subscriber::set_default(subscriber);
    (buffer, guard)
}

pub fn logs_to_string(buffer: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(buffer.lock().unwrap().clone()).expect("log utf8")
}

/// Parsed JSON log lines.
pub fn log_lines(buffer: &Arc<Mutex<Vec<u8>>>) -> Vec<Value> {
    logs_to_string(buffer)
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}
