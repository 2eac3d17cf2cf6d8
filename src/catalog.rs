//! Fixed tables of the resource types a space is made of.
//!
//! [`CATALOG`] drives the backup traversal and its order is significant:
//! every entry is processed strictly in sequence. [`RESTORE_CATALOG`] lists the
//! types a single backup file can be restored as. The two overlap but are not
//! the same set: `field-types` can be backed up but not restored, and
//! datasource entries are restored as a list rather than one object.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde_json::Value;

use crate::domain::id_to_string;
use crate::error::BackupError;

/// Picks the value a backup file is named after out of one item.
pub type IdAccessor = fn(&Value) -> Option<&Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// The space object itself, written once at the backup root.
    Space,
    /// One collection request, each item written as-is.
    Collection,
    /// Summaries are listed, then every story is fetched in full.
    Stories,
    /// Metadata per asset, optionally followed by the binary download.
    Assets,
    /// Metadata per datasource, followed by all of its entries.
    Datasources,
}

#[derive(Debug)]
pub struct ResourceDescriptor {
    pub name: &'static str,
    pub api_segment: &'static str,
    pub folder: Option<&'static str>,
    pub id_field: &'static str,
    pub file_id: IdAccessor,
    pub fetch: FetchKind,
    pub selectable: bool,
}

impl ResourceDescriptor {
    pub fn file_name(&self, item: &Value) -> Result<String, BackupError> {
        (self.file_id)(item)
            .and_then(id_to_string)
            .ok_or_else(|| BackupError::MissingIdField {
                resource: self.name.to_string(),
                field: self.id_field.to_string(),
            })
    }
}

fn by_id(item: &Value) -> Option<&Value> {
    item.get("id")
}

fn by_name(item: &Value) -> Option<&Value> {
    item.get("name")
}

fn by_activity_id(item: &Value) -> Option<&Value> {
    item.get("activity").and_then(|activity| activity.get("id"))
}

const fn collection(
    name: &'static str,
    api_segment: &'static str,
    id_field: &'static str,
    file_id: IdAccessor,
) -> ResourceDescriptor {
    ResourceDescriptor {
        name,
        api_segment,
        folder: Some(name),
        id_field,
        file_id,
        fetch: FetchKind::Collection,
        selectable: true,
    }
}

pub static CATALOG: [ResourceDescriptor; 19] = [
    ResourceDescriptor {
        name: "space",
        api_segment: "",
        folder: None,
        id_field: "id",
        file_id: by_id,
        fetch: FetchKind::Space,
        selectable: false,
    },
    ResourceDescriptor {
        fetch: FetchKind::Stories,
        ..collection("stories", "stories", "id", by_id)
    },
    collection("components", "components", "name", by_name),
    collection("component-groups", "component_groups", "id", by_id),
    ResourceDescriptor {
        fetch: FetchKind::Assets,
        ..collection("assets", "assets", "id", by_id)
    },
    collection("asset-folders", "asset_folders", "id", by_id),
    ResourceDescriptor {
        fetch: FetchKind::Datasources,
        ..collection("datasources", "datasources", "id", by_id)
    },
    collection("space-roles", "space_roles", "id", by_id),
    collection("tasks", "tasks", "id", by_id),
    collection("activities", "activities", "activity.id", by_activity_id),
    collection("presets", "presets", "id", by_id),
    collection("field-types", "field_types", "name", by_name),
    collection("workflow-stages", "workflow_stages", "id", by_id),
    collection(
        "workflow-stage-changes",
        "workflow_stage_changes",
        "id",
        by_id,
    ),
    collection("workflows", "workflows", "id", by_id),
    collection("releases", "releases", "id", by_id),
    collection("collaborators", "collaborators", "id", by_id),
    collection("internal-tags", "internal_tags", "id", by_id),
    collection("webhooks", "webhook_endpoints", "id", by_id),
];

pub fn lookup(name: &str) -> Result<&'static ResourceDescriptor, BackupError> {
    CATALOG
        .iter()
        .find(|descriptor| descriptor.name == name)
        .ok_or_else(|| BackupError::UnknownResourceType(name.to_string()))
}

/// Resource types a backup run is restricted to. `None` means every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    names: Option<BTreeSet<&'static str>>,
}

impl SelectionSet {
    pub fn all() -> Self {
        Self { names: None }
    }

    pub fn from_names<I, S>(names: I) -> Result<Self, BackupError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selected = BTreeSet::new();
        for name in names {
            let descriptor = lookup(name.as_ref().trim())?;
            if !descriptor.selectable {
                return Err(BackupError::Configuration(format!(
                    "resource type `{}` cannot be selected",
                    descriptor.name
                )));
            }
            selected.insert(descriptor.name);
        }
        if selected.is_empty() {
            return Err(BackupError::Configuration(
                "resource type selection is empty".to_string(),
            ));
        }
        Ok(Self {
            names: Some(selected),
        })
    }

    pub fn is_all(&self) -> bool {
        self.names.is_none()
    }

    pub fn contains(&self, descriptor: &ResourceDescriptor) -> bool {
        match &self.names {
            None => true,
            Some(names) => names.contains(descriptor.name),
        }
    }

    /// Selected descriptors in catalog order.
    pub fn descriptors(&self) -> impl Iterator<Item = &'static ResourceDescriptor> + '_ {
        CATALOG.iter().filter(|descriptor| self.contains(descriptor))
    }
}

impl FromStr for SelectionSet {
    type Err = BackupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_names(value.split(',').filter(|part| !part.trim().is_empty()))
    }
}

/// Type-specific payload rule applied before a restore request is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shaping {
    Plain,
    /// Drops `updated_at`.
    Story,
    /// Create mode sends an invitation instead of the enveloped object.
    Collaborator,
    /// The file holds a list; each entry becomes its own request.
    DatasourceEntries,
    /// Create targets the account-level `spaces` endpoint, update the space itself.
    Space,
    /// Create mode is refused with the given reason.
    UpdateOnly(&'static str),
}

#[derive(Debug)]
pub struct RestoreDescriptor {
    pub name: &'static str,
    pub api_segment: &'static str,
    pub envelope: &'static str,
    pub shaping: Shaping,
}

const fn restorable(
    name: &'static str,
    api_segment: &'static str,
    envelope: &'static str,
) -> RestoreDescriptor {
    RestoreDescriptor {
        name,
        api_segment,
        envelope,
        shaping: Shaping::Plain,
    }
}

pub static RESTORE_CATALOG: [RestoreDescriptor; 19] = [
    RestoreDescriptor {
        shaping: Shaping::Story,
        ..restorable("story", "stories", "story")
    },
    RestoreDescriptor {
        shaping: Shaping::Collaborator,
        ..restorable("collaborator", "collaborators", "collaborator")
    },
    restorable("component", "components", "component"),
    restorable("component-group", "component_groups", "component_group"),
    RestoreDescriptor {
        shaping: Shaping::UpdateOnly("creating assets is not supported"),
        ..restorable("asset", "assets", "asset")
    },
    restorable("asset-folder", "asset_folders", "asset_folder"),
    restorable("internal-tag", "internal_tags", "internal_tag"),
    restorable("datasource", "datasources", "datasource"),
    RestoreDescriptor {
        shaping: Shaping::DatasourceEntries,
        ..restorable("datasource-entries", "datasource_entries", "datasource_entry")
    },
    RestoreDescriptor {
        shaping: Shaping::Space,
        ..restorable("space", "", "space")
    },
    restorable("space-role", "space_roles", "space_role"),
    restorable("task", "tasks", "task"),
    restorable("preset", "presets", "preset"),
    restorable("webhook", "webhook_endpoints", "webhook_endpoint"),
    restorable("workflow", "workflows", "workflow"),
    restorable("workflow-stage", "workflow_stages", "workflow_stage"),
    restorable("release", "releases", "release"),
    restorable("pipeline-branch", "branches", "branch"),
    RestoreDescriptor {
        shaping: Shaping::UpdateOnly(
            "creating access-tokens from a backup is not possible, it would result in a new token",
        ),
        ..restorable("access-token", "api_keys", "api_key")
    },
];

pub fn restore_lookup(name: &str) -> Result<&'static RestoreDescriptor, BackupError> {
    RESTORE_CATALOG
        .iter()
        .find(|descriptor| descriptor.name == name)
        .ok_or_else(|| BackupError::UnknownResourceType(name.to_string()))
}
