use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::api::ManagementClient;
use crate::archive;
use crate::catalog::{FetchKind, ResourceDescriptor, SelectionSet};
use crate::domain::SpaceId;
use crate::error::BackupError;
use crate::layout::{BackupLayout, asset_file_name};
use crate::output::{EventLevel, ProgressEvent, ProgressSink};

#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub space_id: SpaceId,
    pub output_dir: Utf8PathBuf,
    pub selection: SelectionSet,
    pub with_asset_files: bool,
    pub force: bool,
    /// Zip file prefix; `None` leaves the backup as a plain directory.
    pub zip_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub space_id: String,
    pub output_dir: String,
    pub resources: Vec<ResourceReport>,
    pub asset_files: usize,
    pub archive: Option<String>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceReport {
    pub name: String,
    pub items: usize,
    pub files: usize,
}

struct RunContext<'a> {
    space_id: &'a SpaceId,
    layout: &'a BackupLayout,
    with_asset_files: bool,
    sink: &'a dyn ProgressSink,
    asset_files: usize,
}

impl RunContext<'_> {
    fn collection_path(&self, segment: &str) -> String {
        format!("spaces/{}/{segment}", self.space_id)
    }

    fn write(&self, path: &Utf8Path, value: &Value) -> Result<(), BackupError> {
        BackupLayout::write_json(path, value)?;
        debug!(%path, "written");
        self.sink.event(ProgressEvent::item(format!("Written file {path}")));
        Ok(())
    }
}

pub struct Backup<C: ManagementClient> {
    client: C,
}

impl<C: ManagementClient> Backup<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Walks the catalog in order and writes every selected resource type to disk.
    ///
    /// The first failure of any request or write aborts the run; files written
    /// up to that point are left in place.
    pub fn run(
        &self,
        options: &BackupOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BackupReport, BackupError> {
        let start = Instant::now();
        let layout = BackupLayout::new(options.output_dir.clone());

        sink.event(ProgressEvent::phase(format!(
            "Creating backup for space {}:",
            options.space_id
        )));
        sink.event(ProgressEvent::phase(format!(
            "Output dir: {}",
            layout.output_dir()
        )));
        layout.prepare(options.force, options.selection.descriptors())?;
        info!(
            space = %options.space_id,
            output = %layout.output_dir(),
            filtered = !options.selection.is_all(),
            "backup started"
        );

        let mut ctx = RunContext {
            space_id: &options.space_id,
            layout: &layout,
            with_asset_files: options.with_asset_files,
            sink,
            asset_files: 0,
        };

        let mut resources = Vec::new();
        for descriptor in options.selection.descriptors() {
            let resource_start = Instant::now();
            sink.event(ProgressEvent::phase(format!("Fetching {}", descriptor.name)));
            info!(resource = descriptor.name, "fetching");
            let report = self.backup_resource(descriptor, &mut ctx)?;
            sink.event(ProgressEvent {
                level: EventLevel::Item,
                message: format!(
                    "{}: {} items, {} files",
                    report.name, report.items, report.files
                ),
                elapsed: Some(resource_start.elapsed()),
            });
            resources.push(report);
        }

        let archive = match &options.zip_prefix {
            Some(prefix) => {
                sink.event(ProgressEvent::phase("Creating zip file"));
                let name = archive::archive_file_name(prefix, Local::now().naive_local());
                let path = archive::create_zip(layout.root(), &layout.output_dir().join(name))?;
                info!(archive = %path, "zip file created");
                Some(path.to_string())
            }
            None => None,
        };

        Ok(BackupReport {
            space_id: options.space_id.to_string(),
            output_dir: layout.output_dir().to_string(),
            resources,
            asset_files: ctx.asset_files,
            archive,
            elapsed_ms: start.elapsed().as_millis(),
        })
    }

    fn backup_resource(
        &self,
        descriptor: &ResourceDescriptor,
        ctx: &mut RunContext<'_>,
    ) -> Result<ResourceReport, BackupError> {
        match descriptor.fetch {
            FetchKind::Space => self.backup_space(descriptor, ctx),
            FetchKind::Collection => self.backup_collection(descriptor, ctx),
            FetchKind::Stories => self.backup_stories(descriptor, ctx),
            FetchKind::Assets => self.backup_assets(descriptor, ctx),
            FetchKind::Datasources => self.backup_datasources(descriptor, ctx),
        }
    }

    fn backup_space(
        &self,
        descriptor: &ResourceDescriptor,
        ctx: &mut RunContext<'_>,
    ) -> Result<ResourceReport, BackupError> {
        let response = self.client.get(&format!("spaces/{}/", ctx.space_id))?;
        let space = take_field(response, "space")?;
        ctx.write(&ctx.layout.space_path(ctx.space_id.as_str()), &space)?;
        Ok(ResourceReport {
            name: descriptor.name.to_string(),
            items: 1,
            files: 1,
        })
    }

    fn backup_collection(
        &self,
        descriptor: &ResourceDescriptor,
        ctx: &mut RunContext<'_>,
    ) -> Result<ResourceReport, BackupError> {
        let items = self
            .client
            .get_all(&ctx.collection_path(descriptor.api_segment), &[])?;
        for item in &items {
            let path = ctx
                .layout
                .json_path(descriptor.folder, &descriptor.file_name(item)?);
            ctx.write(&path, item)?;
        }
        Ok(ResourceReport {
            name: descriptor.name.to_string(),
            items: items.len(),
            files: items.len(),
        })
    }

    fn backup_stories(
        &self,
        descriptor: &ResourceDescriptor,
        ctx: &mut RunContext<'_>,
    ) -> Result<ResourceReport, BackupError> {
        let collection = ctx.collection_path(descriptor.api_segment);
        let summaries = self.client.get_all(&collection, &[])?;
        for summary in &summaries {
            let id = descriptor.file_name(summary)?;
            let response = self.client.get(&format!("{collection}/{id}"))?;
            let mut story = take_field(response, "story")?;
            if let Value::Object(map) = &mut story {
                map.remove("preview_token");
            }
            ctx.write(&ctx.layout.json_path(descriptor.folder, &id), &story)?;
        }
        Ok(ResourceReport {
            name: descriptor.name.to_string(),
            items: summaries.len(),
            files: summaries.len(),
        })
    }

    fn backup_assets(
        &self,
        descriptor: &ResourceDescriptor,
        ctx: &mut RunContext<'_>,
    ) -> Result<ResourceReport, BackupError> {
        let assets = self
            .client
            .get_all(&ctx.collection_path(descriptor.api_segment), &[])?;
        let mut files = 0;
        for asset in &assets {
            let id = descriptor.file_name(asset)?;
            ctx.write(&ctx.layout.json_path(descriptor.folder, &id), asset)?;
            files += 1;
            if ctx.with_asset_files {
                let path = download_asset_file(&self.client, ctx.layout, descriptor, asset)?;
                ctx.sink
                    .event(ProgressEvent::item(format!("Written file {path}")));
                ctx.asset_files += 1;
                files += 1;
            }
        }
        Ok(ResourceReport {
            name: descriptor.name.to_string(),
            items: assets.len(),
            files,
        })
    }

    fn backup_datasources(
        &self,
        descriptor: &ResourceDescriptor,
        ctx: &mut RunContext<'_>,
    ) -> Result<ResourceReport, BackupError> {
        let datasources = self
            .client
            .get_all(&ctx.collection_path(descriptor.api_segment), &[])?;
        let entries_path = ctx.collection_path("datasource_entries");
        let folder = descriptor.folder.unwrap_or(descriptor.name);
        let mut files = 0;
        for datasource in &datasources {
            let id = descriptor.file_name(datasource)?;
            ctx.write(&ctx.layout.json_path(Some(folder), &id), datasource)?;
            let entries = self
                .client
                .get_all(&entries_path, &[("datasource_id", id.clone())])?;
            ctx.write(
                &ctx.layout.datasource_entries_path(folder, &id),
                &Value::Array(entries),
            )?;
            files += 2;
        }
        Ok(ResourceReport {
            name: descriptor.name.to_string(),
            items: datasources.len(),
            files,
        })
    }
}

/// Streams one asset binary to `<assets folder>/<id>.<ext>`.
///
/// The target must not exist yet: an existing file fails with
/// [`BackupError::OutputConflict`] and is left untouched.
pub fn download_asset_file<C: ManagementClient + ?Sized>(
    client: &C,
    layout: &BackupLayout,
    descriptor: &ResourceDescriptor,
    asset: &Value,
) -> Result<Utf8PathBuf, BackupError> {
    let id = descriptor.file_name(asset)?;
    let source = asset
        .get("filename")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| BackupError::MissingIdField {
            resource: descriptor.name.to_string(),
            field: "filename".to_string(),
        })?;
    let folder = descriptor.folder.unwrap_or(descriptor.name);
    let path = layout.binary_path(folder, &asset_file_name(&id, source));
    let mut file = BackupLayout::create_exclusive(&path)?;
    let bytes = client.download(source, &mut file)?;
    debug!(%path, bytes, "asset file written");
    Ok(path)
}

fn take_field(response: Value, key: &str) -> Result<Value, BackupError> {
    match response {
        Value::Object(mut map) => map
            .remove(key)
            .ok_or_else(|| BackupError::UnexpectedResponse(format!("no `{key}` object"))),
        _ => Err(BackupError::UnexpectedResponse(format!(
            "response for `{key}` is not an object"
        ))),
    }
}
