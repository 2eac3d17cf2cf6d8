mod common;

use std::collections::BTreeSet;
use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Value, json};
use tempfile::TempDir;

use common::MockClient;
use storyblok_backup::backup::{Backup, BackupOptions, download_asset_file};
use storyblok_backup::catalog::{CATALOG, SelectionSet, lookup};
use storyblok_backup::domain::SpaceId;
use storyblok_backup::error::BackupError;
use storyblok_backup::layout::BackupLayout;
use storyblok_backup::output::JsonOutput;

const SPACE: &str = "123";

fn output_dir(temp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(temp.path().join("out")).unwrap()
}

fn options(output_dir: Utf8PathBuf, selection: SelectionSet) -> BackupOptions {
    BackupOptions {
        space_id: SPACE.parse::<SpaceId>().unwrap(),
        output_dir,
        selection,
        with_asset_files: false,
        force: false,
        zip_prefix: None,
    }
}

fn read_json(path: &Utf8Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn list_files(root: &Utf8Path) -> BTreeSet<String> {
    let mut files = BTreeSet::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in dir.read_dir_utf8().unwrap() {
            let entry = entry.unwrap();
            let path = entry.path().to_path_buf();
            if path.is_dir() {
                stack.push(path);
            } else {
                files.insert(path.strip_prefix(root).unwrap().to_string());
            }
        }
    }
    files
}

fn story_space() -> MockClient {
    MockClient::default()
        .with_collection(
            "spaces/123/stories",
            vec![json!({"id": 1, "name": "Home"}), json!({"id": 2, "name": "About"})],
        )
        .with_object(
            "spaces/123/stories/1",
            json!({"story": {"id": 1, "name": "Home", "content": {"component": "page"}, "preview_token": {"token": "abc", "timestamp": "1"}}}),
        )
        .with_object(
            "spaces/123/stories/2",
            json!({"story": {"id": 2, "name": "About", "content": {"component": "page"}}}),
        )
}

#[test]
fn stories_only_selection_writes_exactly_story_files() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let backup = Backup::new(story_space());
    let selection: SelectionSet = "stories".parse().unwrap();

    let report = backup.run(&options(out.clone(), selection), &JsonOutput).unwrap();

    let root = out.join("backup");
    let files = list_files(&root);
    assert_eq!(
        files,
        BTreeSet::from(["stories/1.json".to_string(), "stories/2.json".to_string()])
    );
    let folders: Vec<_> = root
        .read_dir_utf8()
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string())
        .collect();
    assert_eq!(folders, vec!["stories".to_string()]);

    let story = read_json(&root.join("stories/1.json"));
    assert_eq!(story["name"], "Home");
    assert!(story.get("preview_token").is_none());

    assert_eq!(report.resources.len(), 1);
    assert_eq!(report.resources[0].name, "stories");
    assert_eq!(report.resources[0].files, 2);

    let paths: Vec<_> = backup
        .client()
        .calls()
        .into_iter()
        .map(|call| call.path)
        .collect();
    assert_eq!(
        paths,
        vec![
            "spaces/123/stories",
            "spaces/123/stories/1",
            "spaces/123/stories/2"
        ]
    );
}

#[test]
fn full_run_visits_catalog_in_order() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let client = MockClient::default().with_object("spaces/123/", json!({"space": {"id": 123}}));
    let backup = Backup::new(client);

    backup
        .run(&options(out.clone(), SelectionSet::all()), &JsonOutput)
        .unwrap();

    let expected: Vec<String> = CATALOG
        .iter()
        .map(|descriptor| match descriptor.name {
            "space" => "spaces/123/".to_string(),
            _ => format!("spaces/123/{}", descriptor.api_segment),
        })
        .collect();
    let paths: Vec<_> = backup
        .client()
        .calls()
        .into_iter()
        .map(|call| call.path)
        .collect();
    assert_eq!(paths, expected);

    for descriptor in CATALOG.iter() {
        if let Some(folder) = descriptor.folder {
            assert!(out.join("backup").join(folder).is_dir(), "{folder} missing");
        }
    }
    assert_eq!(read_json(&out.join("backup/space-123.json")), json!({"id": 123}));
}

#[test]
fn writes_dependent_and_nested_resources() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let client = MockClient::default()
        .with_collection(
            "spaces/123/components",
            vec![json!({"id": 9, "name": "teaser", "schema": {}})],
        )
        .with_collection(
            "spaces/123/activities",
            vec![json!({"activity": {"id": 42, "key": "story.update"}, "user": {"id": 5}})],
        )
        .with_collection(
            "spaces/123/datasources",
            vec![json!({"id": 7, "name": "Colors", "slug": "colors"})],
        )
        .with_collection(
            "spaces/123/datasource_entries?datasource_id=7",
            vec![
                json!({"id": 70, "name": "red", "value": "#f00"}),
                json!({"id": 71, "name": "blue", "value": "#00f"}),
            ],
        );
    let backup = Backup::new(client);
    let selection = SelectionSet::from_names(["components", "datasources", "activities"]).unwrap();

    let report = backup.run(&options(out.clone(), selection), &JsonOutput).unwrap();

    let root = out.join("backup");
    assert_eq!(
        list_files(&root),
        BTreeSet::from([
            "activities/42.json".to_string(),
            "components/teaser.json".to_string(),
            "datasources/7.json".to_string(),
            "datasources/7_entries.json".to_string(),
        ])
    );
    let entries = read_json(&root.join("datasources/7_entries.json"));
    assert_eq!(entries.as_array().unwrap().len(), 2);
    assert_eq!(entries[0]["name"], "red");

    let names: Vec<_> = report.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["components", "datasources", "activities"]);
}

#[test]
fn json_files_are_pretty_printed() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let client = MockClient::default().with_collection(
        "spaces/123/tasks",
        vec![json!({"id": 3, "name": "Review"})],
    );
    let backup = Backup::new(client);

    backup
        .run(&options(out.clone(), "tasks".parse().unwrap()), &JsonOutput)
        .unwrap();

    let content = fs::read_to_string(out.join("backup/tasks/3.json")).unwrap();
    assert_eq!(content, "{\n  \"id\": 3,\n  \"name\": \"Review\"\n}\n");
}

#[test]
fn existing_output_dir_requires_force() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    fs::create_dir_all(out.join("stale")).unwrap();
    fs::write(out.join("stale/old.json"), "{}").unwrap();

    let backup = Backup::new(story_space());
    let mut opts = options(out.clone(), "stories".parse().unwrap());

    let err = backup.run(&opts, &JsonOutput).unwrap_err();
    assert_matches!(err, BackupError::OutputConflict(_));
    assert!(backup.client().calls().is_empty());
    assert!(out.join("stale/old.json").exists());

    opts.force = true;
    backup.run(&opts, &JsonOutput).unwrap();
    assert!(!out.join("stale").exists());
    assert!(out.join("backup/stories/1.json").exists());
}

#[test]
fn forced_reruns_produce_identical_trees() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let backup = Backup::new(story_space());
    let mut opts = options(out.clone(), "stories".parse().unwrap());
    opts.force = true;

    backup.run(&opts, &JsonOutput).unwrap();
    let root = out.join("backup");
    let first: Vec<_> = list_files(&root)
        .into_iter()
        .map(|file| (file.clone(), fs::read(root.join(&file)).unwrap()))
        .collect();

    backup.run(&opts, &JsonOutput).unwrap();
    let second: Vec<_> = list_files(&root)
        .into_iter()
        .map(|file| (file.clone(), fs::read(root.join(&file)).unwrap()))
        .collect();

    assert_eq!(first, second);
}

#[test]
fn asset_files_are_downloaded_with_source_extension() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let url = "https://a.storyblok.com/f/123/1200x800/abc/hero.image.png";
    let client = MockClient::default()
        .with_collection(
            "spaces/123/assets",
            vec![json!({"id": 5, "filename": url, "alt": "Hero"})],
        )
        .with_file(url, b"PNGDATA");
    let backup = Backup::new(client);
    let mut opts = options(out.clone(), "assets".parse().unwrap());
    opts.with_asset_files = true;

    let report = backup.run(&opts, &JsonOutput).unwrap();

    assert_eq!(fs::read(out.join("backup/assets/5.png")).unwrap(), b"PNGDATA");
    assert_eq!(read_json(&out.join("backup/assets/5.json"))["alt"], "Hero");
    assert_eq!(report.asset_files, 1);
    assert_eq!(report.resources[0].files, 2);
}

#[test]
fn asset_without_extension_is_stored_under_bare_id() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let url = "https://a.storyblok.com/f/123/v2.assets/noext";
    let client = MockClient::default()
        .with_collection(
            "spaces/123/assets",
            vec![json!({"id": 5, "filename": url})],
        )
        .with_file(url, b"RAW");
    let backup = Backup::new(client);
    let mut opts = options(out.clone(), "assets".parse().unwrap());
    opts.with_asset_files = true;

    backup.run(&opts, &JsonOutput).unwrap();

    assert_eq!(fs::read(out.join("backup/assets/5")).unwrap(), b"RAW");
    assert!(out.join("backup/assets/5.json").exists());
}

#[test]
fn asset_metadata_only_without_flag() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let client = MockClient::default().with_collection(
        "spaces/123/assets",
        vec![json!({"id": 5, "filename": "https://a.storyblok.com/f/123/x.png"})],
    );
    let backup = Backup::new(client);

    backup
        .run(&options(out.clone(), "assets".parse().unwrap()), &JsonOutput)
        .unwrap();

    assert!(!out.join("backup/assets/5.png").exists());
    assert!(
        backup
            .client()
            .calls()
            .iter()
            .all(|call| call.method != "DOWNLOAD")
    );
}

#[test]
fn existing_asset_file_is_a_conflict_and_kept() {
    let temp = tempfile::tempdir().unwrap();
    let layout = BackupLayout::new(output_dir(&temp));
    let descriptor = lookup("assets").unwrap();
    layout.prepare(false, [descriptor]).unwrap();
    let existing = layout.root().join("assets/5.jpg");
    fs::write(&existing, b"partial").unwrap();

    let url = "https://a.storyblok.com/f/123/photo.jpg";
    let client = MockClient::default().with_file(url, b"fresh");
    let asset = json!({"id": 5, "filename": url});

    let err = download_asset_file(&client, &layout, descriptor, &asset).unwrap_err();
    assert_matches!(err, BackupError::OutputConflict(path) if path == existing);
    assert_eq!(fs::read(&existing).unwrap(), b"partial");
    assert!(client.calls().is_empty());
}

#[test]
fn duplicate_asset_ids_abort_the_run() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let url = "https://a.storyblok.com/f/123/a.gif";
    let client = MockClient::default()
        .with_collection(
            "spaces/123/assets",
            vec![
                json!({"id": 5, "filename": url}),
                json!({"id": 5, "filename": url}),
            ],
        )
        .with_file(url, b"GIF");
    let backup = Backup::new(client);
    let mut opts = options(out.clone(), "assets".parse().unwrap());
    opts.with_asset_files = true;

    let err = backup.run(&opts, &JsonOutput).unwrap_err();
    assert_matches!(err, BackupError::OutputConflict(_));
    assert_eq!(fs::read(out.join("backup/assets/5.gif")).unwrap(), b"GIF");
}

#[test]
fn api_failure_stops_the_traversal() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let client = story_space().failing_on("spaces/123/components");
    let backup = Backup::new(client);
    let selection =
        SelectionSet::from_names(["stories", "components", "presets"]).unwrap();

    let err = backup.run(&options(out.clone(), selection), &JsonOutput).unwrap_err();

    assert_matches!(err, BackupError::ApiStatus { status: 422, .. });
    assert!(err.is_api_failure());
    let paths: Vec<_> = backup
        .client()
        .calls()
        .into_iter()
        .map(|call| call.path)
        .collect();
    assert!(!paths.iter().any(|path| path.ends_with("presets")));
    assert!(out.join("backup/stories/1.json").exists());
}

#[test]
fn item_without_id_field_fails() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let client = MockClient::default()
        .with_collection("spaces/123/field_types", vec![json!({"id": 1})]);
    let backup = Backup::new(client);

    let err = backup
        .run(&options(out, "field-types".parse().unwrap()), &JsonOutput)
        .unwrap_err();
    assert_matches!(
        err,
        BackupError::MissingIdField { resource, field } if resource == "field-types" && field == "name"
    );
}

#[test]
fn zip_archive_contains_backup_tree() {
    let temp = tempfile::tempdir().unwrap();
    let out = output_dir(&temp);
    let backup = Backup::new(story_space());
    let mut opts = options(out.clone(), "stories".parse().unwrap());
    opts.zip_prefix = Some("daily".to_string());

    let report = backup.run(&opts, &JsonOutput).unwrap();

    let archive_path = Utf8PathBuf::from(report.archive.unwrap());
    assert_eq!(archive_path.parent().unwrap(), out.as_path());
    let file_name = archive_path.file_name().unwrap();
    assert!(file_name.starts_with("daily-"));
    assert!(file_name.ends_with(".zip"));

    let file = fs::File::open(&archive_path).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    let names: Vec<_> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"stories/1.json".to_string()));
    assert!(names.contains(&"stories/2.json".to_string()));
}
