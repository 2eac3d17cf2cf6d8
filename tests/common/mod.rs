#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::sync::Mutex;

use serde_json::{Value, json};

use storyblok_backup::api::ManagementClient;
use storyblok_backup::error::BackupError;

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

/// Canned management API: collections keyed by path (plus `?k=v` for params),
/// single objects keyed by path, binaries keyed by URL.
#[derive(Default)]
pub struct MockClient {
    pub collections: HashMap<String, Vec<Value>>,
    pub objects: HashMap<String, Value>,
    pub files: HashMap<String, Vec<u8>>,
    pub fail_path: Option<String>,
    pub calls: Mutex<Vec<Call>>,
}

impl MockClient {
    pub fn with_collection(mut self, path: &str, items: Vec<Value>) -> Self {
        self.collections.insert(path.to_string(), items);
        self
    }

    pub fn with_object(mut self, path: &str, body: Value) -> Self {
        self.objects.insert(path.to_string(), body);
        self
    }

    pub fn with_file(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn failing_on(mut self, path: &str) -> Self {
        self.fail_path = Some(path.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str, path: &str, body: Option<&Value>) -> Result<(), BackupError> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });
        if self.fail_path.as_deref() == Some(path) {
            return Err(BackupError::ApiStatus {
                status: 422,
                message: "rejected".to_string(),
            });
        }
        Ok(())
    }
}

impl ManagementClient for MockClient {
    fn get_all(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>, BackupError> {
        let key = params
            .iter()
            .fold(path.to_string(), |key, (name, value)| format!("{key}?{name}={value}"));
        self.record("GET_ALL", &key, None)?;
        Ok(self.collections.get(&key).cloned().unwrap_or_default())
    }

    fn get(&self, path: &str) -> Result<Value, BackupError> {
        self.record("GET", path, None)?;
        self.objects
            .get(path)
            .cloned()
            .ok_or_else(|| BackupError::ApiStatus {
                status: 404,
                message: format!("no object at {path}"),
            })
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, BackupError> {
        self.record("POST", path, Some(body))?;
        Ok(json!({"created": body}))
    }

    fn put(&self, path: &str, body: &Value) -> Result<Value, BackupError> {
        self.record("PUT", path, Some(body))?;
        Ok(json!({"updated": body}))
    }

    fn download(&self, url: &str, writer: &mut dyn Write) -> Result<u64, BackupError> {
        self.record("DOWNLOAD", url, None)?;
        let bytes = self.files.get(url).ok_or_else(|| BackupError::ApiStatus {
            status: 404,
            message: format!("no file at {url}"),
        })?;
        writer
            .write_all(bytes)
            .map_err(|err| BackupError::Filesystem(err.to_string()))?;
        Ok(bytes.len() as u64)
    }
}
