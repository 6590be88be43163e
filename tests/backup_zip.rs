#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("timetabled-backup-src");
    let workspace2 = temp_dir("timetabled-backup-dst");
    let out_dir = temp_dir("timetabled-backup-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join("timetable.sqlite3"), bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.ttbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(export.entry_count, 2);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/timetable.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT);
    assert_eq!(import.db_sha256, export.db_sha256);

    let restored = std::fs::read(workspace2.join("timetable.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn checksum_mismatch_is_rejected_and_leaves_workspace_untouched() {
    let out_dir = temp_dir("timetabled-backup-tampered");
    let workspace = temp_dir("timetabled-backup-keep");
    std::fs::write(workspace.join("timetable.sqlite3"), b"original").expect("write existing db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("start manifest");
        zip.write_all(
            serde_json::json!({
                "format": backup::BUNDLE_FORMAT,
                "version": 1,
                "dbSha256": "0".repeat(64)
            })
            .to_string()
            .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file("db/timetable.sqlite3", opts).expect("start db");
        zip.write_all(b"tampered payload").expect("write db");
        zip.finish().expect("finish zip");
    }

    let e = backup::import_workspace_bundle(&bundle_path, &workspace).expect_err("mismatch");
    assert!(format!("{e:#}").contains("checksum mismatch"));
    let kept = std::fs::read(workspace.join("timetable.sqlite3")).expect("read kept db");
    assert_eq!(kept, b"original");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn export_without_database_fails() {
    let workspace = temp_dir("timetabled-backup-empty");
    let out = workspace.join("never.zip");
    let e = backup::export_workspace_bundle(&workspace, &out).expect_err("no db");
    assert!(e.to_string().contains("workspace database not found"));
    let _ = std::fs::remove_dir_all(workspace);
}
