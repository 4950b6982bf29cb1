//! Archive extraction and deploy script tests

use std::io::Write;
use std::path::Path;

use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use depwatch::deploy::applier::Applier;
use depwatch::errors::WatcherError;

fn build_archive(path: &Path, entries: &[(&str, &str)]) {
    let file = std::fs::File::create(path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap();
}

#[tokio::test]
async fn test_apply_runs_top_level_deploy_script() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("deploy-root");
    std::fs::create_dir(&dest).unwrap();

    let archive = dir.path().join("release.zip");
    build_archive(
        &archive,
        &[
            ("deploy.sh", "#!/bin/bash\necho deploying\ntouch ran-marker\n"),
            ("config/app.yml", "key: value\n"),
        ],
    );

    Applier::apply(&archive, &dest).await.unwrap();

    // Script runs with its own directory as the working directory
    assert!(dest.join("ran-marker").exists());
    assert!(dest.join("config/app.yml").exists());
}

#[tokio::test]
async fn test_apply_finds_script_one_level_deep() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("deploy-root");
    std::fs::create_dir(&dest).unwrap();

    let archive = dir.path().join("release.zip");
    build_archive(
        &archive,
        &[("release-1.2.0/deploy.sh", "#!/bin/bash\ntouch ran-marker\n")],
    );

    Applier::apply(&archive, &dest).await.unwrap();
    assert!(dest.join("release-1.2.0/ran-marker").exists());
}

#[tokio::test]
async fn test_apply_fails_when_script_exits_nonzero() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("deploy-root");
    std::fs::create_dir(&dest).unwrap();

    let archive = dir.path().join("release.zip");
    build_archive(&archive, &[("deploy.sh", "#!/bin/bash\nexit 7\n")]);

    let result = Applier::apply(&archive, &dest).await;
    assert!(matches!(result, Err(WatcherError::ApplyError(_))));
}

#[tokio::test]
async fn test_apply_fails_without_deploy_script() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("deploy-root");
    std::fs::create_dir(&dest).unwrap();

    let archive = dir.path().join("release.zip");
    build_archive(&archive, &[("README.md", "no script here\n")]);

    let result = Applier::apply(&archive, &dest).await;
    match result {
        Err(WatcherError::ApplyError(msg)) => assert!(msg.contains("deploy.sh")),
        other => panic!("expected apply error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_apply_rejects_invalid_archive() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("deploy-root");
    std::fs::create_dir(&dest).unwrap();

    let archive = dir.path().join("release.zip");
    std::fs::write(&archive, b"this is not a zip file").unwrap();

    let result = Applier::apply(&archive, &dest).await;
    assert!(matches!(result, Err(WatcherError::ApplyError(_))));
}

#[tokio::test]
async fn test_apply_removes_stale_release_owned_dirs() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("deploy-root");
    std::fs::create_dir_all(dest.join("firmware")).unwrap();
    std::fs::create_dir_all(dest.join("images")).unwrap();
    std::fs::create_dir_all(dest.join("data")).unwrap();
    std::fs::write(dest.join("firmware/old.bin"), b"old").unwrap();
    std::fs::write(dest.join("images/old.tar"), b"old").unwrap();
    std::fs::write(dest.join("data/keep.db"), b"keep").unwrap();

    let archive = dir.path().join("release.zip");
    build_archive(
        &archive,
        &[
            ("deploy.sh", "#!/bin/bash\nexit 0\n"),
            ("firmware/new.bin", "new"),
        ],
    );

    Applier::apply(&archive, &dest).await.unwrap();

    assert!(!dest.join("firmware/old.bin").exists());
    assert!(dest.join("firmware/new.bin").exists());
    assert!(!dest.join("images").exists());
    // Directories not owned by the release are untouched
    assert!(dest.join("data/keep.db").exists());
}
