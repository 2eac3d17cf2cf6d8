//! Turns one backup file back into management API calls.
//!
//! Restoring happens in two steps. [`plan`] decodes and shapes the payload into
//! a list of [`RestoreRequest`]s without touching the network, so every
//! validation failure surfaces before the first call. [`Restore::execute`] then
//! sends the requests one after another and stops at the first failure.

use std::fs;
use std::time::Instant;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::api::ManagementClient;
use crate::catalog::{RestoreDescriptor, Shaping, restore_lookup};
use crate::domain::{RestoreMode, SpaceId, id_to_string};
use crate::error::BackupError;
use crate::output::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone)]
pub struct RestoreOptions {
    pub space_id: SpaceId,
    pub mode: RestoreMode,
    pub publish: bool,
    /// Parent datasource for `datasource-entries` in create mode.
    pub datasource_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreRequest {
    pub resource_type: &'static str,
    pub target_id: Option<String>,
    /// `None` when the body is not wrapped, as for collaborator invitations.
    pub envelope_key: Option<&'static str>,
    pub payload: Value,
    pub mode: RestoreMode,
    pub path: String,
}

impl RestoreRequest {
    pub fn method(&self) -> &'static str {
        match self.mode {
            RestoreMode::Create => "POST",
            RestoreMode::Update => "PUT",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
    pub resource_type: String,
    pub mode: RestoreMode,
    pub items: Vec<RestoredItem>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoredItem {
    pub id: Option<String>,
    pub method: String,
    pub path: String,
    pub response: Value,
}

pub fn read_resource_file(path: &Utf8Path) -> Result<Value, BackupError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
        BackupError::InvalidInputFile {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    })?;
    serde_json::from_str(&content).map_err(|err| BackupError::InvalidInputFile {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Builds every request needed to restore `resource`, without sending any.
pub fn plan(
    descriptor: &'static RestoreDescriptor,
    resource: Value,
    source: &Utf8Path,
    options: &RestoreOptions,
) -> Result<Vec<RestoreRequest>, BackupError> {
    let invalid = |reason: &str| BackupError::InvalidInputFile {
        path: source.to_path_buf(),
        reason: reason.to_string(),
    };

    match (descriptor.shaping, options.mode) {
        (Shaping::UpdateOnly(reason), RestoreMode::Create) => {
            return Err(BackupError::UnsupportedOperation(reason.to_string()));
        }
        (Shaping::DatasourceEntries, RestoreMode::Create) if options.datasource_id.is_none() => {
            return Err(BackupError::MissingDatasourceId);
        }
        _ => {}
    }

    if descriptor.shaping == Shaping::DatasourceEntries {
        let Value::Array(entries) = resource else {
            return Err(invalid("expected a list of datasource entries"));
        };
        return entries
            .into_iter()
            .map(|entry| {
                let Value::Object(mut entry) = entry else {
                    return Err(invalid("datasource entry is not a JSON object"));
                };
                if let (RestoreMode::Create, Some(datasource_id)) =
                    (options.mode, &options.datasource_id)
                {
                    entry.insert("datasource_id".to_string(), id_value(datasource_id));
                }
                single_request(descriptor, entry, source, options)
            })
            .collect();
    }

    let Value::Object(mut object) = resource else {
        return Err(invalid("expected a JSON object"));
    };
    if descriptor.shaping == Shaping::Story {
        object.remove("updated_at");
    }
    Ok(vec![single_request(descriptor, object, source, options)?])
}

fn single_request(
    descriptor: &'static RestoreDescriptor,
    object: Map<String, Value>,
    source: &Utf8Path,
    options: &RestoreOptions,
) -> Result<RestoreRequest, BackupError> {
    let own_id = object.get("id").and_then(id_to_string);
    let space = options.space_id.as_str();

    let segment = descriptor.api_segment;
    let (target_id, path) = match (descriptor.shaping, options.mode) {
        (Shaping::Space, RestoreMode::Create) => (None, "spaces".to_string()),
        (Shaping::Space, RestoreMode::Update) => (None, format!("spaces/{space}")),
        (_, RestoreMode::Create) => (None, format!("spaces/{space}/{segment}")),
        (_, RestoreMode::Update) => {
            let id = own_id.ok_or_else(|| BackupError::InvalidInputFile {
                path: source.to_path_buf(),
                reason: format!("{} has no `id` to update", descriptor.name),
            })?;
            let path = format!("spaces/{space}/{segment}/{id}");
            (Some(id), path)
        }
    };

    let (envelope_key, mut payload) =
        if descriptor.shaping == Shaping::Collaborator && options.mode == RestoreMode::Create {
            (None, invitation(&object))
        } else {
            let mut body = Map::new();
            body.insert(descriptor.envelope.to_string(), Value::Object(object));
            (Some(descriptor.envelope), body)
        };
    if options.publish {
        payload.insert("publish".to_string(), json!(1));
    }

    Ok(RestoreRequest {
        resource_type: descriptor.name,
        target_id,
        envelope_key,
        payload: Value::Object(payload),
        mode: options.mode,
        path,
    })
}

/// Collaborators are created by inviting the user again rather than posting the stored object.
fn invitation(collaborator: &Map<String, Value>) -> Map<String, Value> {
    let mut body = Map::new();
    if let Some(email) = collaborator.get("user").and_then(|user| user.get("userid")) {
        body.insert("email".to_string(), email.clone());
    }
    for field in ["role", "space_id", "permissions", "space_role_ids"] {
        if let Some(value) = collaborator.get(field) {
            body.insert(field.to_string(), value.clone());
        }
    }
    let multi = collaborator.get("role").and_then(Value::as_str) == Some("multi");
    body.insert("allow_multiple_roles_creation".to_string(), Value::Bool(multi));
    body
}

fn id_value(raw: &str) -> Value {
    raw.trim()
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub struct Restore<C: ManagementClient> {
    client: C,
}

impl<C: ManagementClient> Restore<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn run(
        &self,
        resource_type: &str,
        file: &Utf8Path,
        options: &RestoreOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RestoreResult, BackupError> {
        let start = Instant::now();
        let descriptor = restore_lookup(resource_type)?;
        let resource = read_resource_file(file)?;
        let requests = plan(descriptor, resource, file, options)?;
        info!(
            resource = descriptor.name,
            mode = %options.mode,
            requests = requests.len(),
            "restore started"
        );

        let mut items = Vec::with_capacity(requests.len());
        for request in &requests {
            items.push(self.execute(request, sink)?);
        }

        Ok(RestoreResult {
            resource_type: descriptor.name.to_string(),
            mode: options.mode,
            items,
            elapsed_ms: start.elapsed().as_millis(),
        })
    }

    pub fn execute(
        &self,
        request: &RestoreRequest,
        sink: &dyn ProgressSink,
    ) -> Result<RestoredItem, BackupError> {
        debug!(method = request.method(), path = %request.path, "restore request");
        let response = match request.mode {
            RestoreMode::Create => self.client.post(&request.path, &request.payload)?,
            RestoreMode::Update => self.client.put(&request.path, &request.payload)?,
        };

        let message = match (&request.mode, &request.target_id) {
            (RestoreMode::Update, Some(id)) => {
                format!("Updated \"{}\" resource with id \"{id}\".", request.resource_type)
            }
            (RestoreMode::Update, None) => format!("Updated \"{}\" resource.", request.resource_type),
            (RestoreMode::Create, _) => format!("Created \"{}\" resource.", request.resource_type),
        };
        sink.event(ProgressEvent::item(message));
        sink.event(ProgressEvent::detail(format!(
            "Result:\n{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| response.to_string())
        )));

        Ok(RestoredItem {
            id: request.target_id.clone(),
            method: request.method().to_string(),
            path: request.path.clone(),
            response,
        })
    }
}
