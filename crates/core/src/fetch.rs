//! Source acquisition: VCS checkout, archive download, local copy
//!
//! The transport side of the executor's fetch stage. Archives are
//! downloaded and SHA256-verified before unpacking; git sources are
//! cloned through the uniform subprocess runner and pinned to a fixed
//! ref; local sources are copied as-is.

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tar::Archive;
use tracing::{debug, info};

use kiln_platform::{run_command, CommandSpec};

use crate::error::ExecError;
use crate::manifest::Source;

type FetchResult = std::result::Result<(), ExecError>;

/// Acquires a package's source tree into a destination directory.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source, dest: &Path) -> FetchResult;
}

/// The real fetcher: git, HTTP archives, local directories.
pub struct DefaultFetcher;

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch(&self, source: &Source, dest: &Path) -> FetchResult {
        // Fetch always starts from a clean checkout directory.
        if dest.exists() {
            fs::remove_dir_all(dest).map_err(|e| ExecError::Fetch(e.to_string()))?;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| ExecError::Fetch(e.to_string()))?;
        }

        match source {
            Source::Git {
                repository,
                reference,
            } => fetch_git(repository, reference, dest).await,
            Source::Archive { url, sha256 } => {
                let url = url.clone();
                let sha256 = sha256.clone();
                let dest = dest.to_path_buf();
                tokio::task::spawn_blocking(move || fetch_archive(&url, sha256.as_deref(), &dest))
                    .await
                    .map_err(|e| ExecError::Fetch(format!("fetch task failed: {}", e)))?
            }
            Source::Local { path } => copy_tree(path, dest),
        }
    }
}

async fn fetch_git(repository: &str, reference: &str, dest: &Path) -> FetchResult {
    info!(repository, reference, "cloning");

    let clone = CommandSpec::new(vec![
        "git".to_string(),
        "clone".to_string(),
        repository.to_string(),
        dest.display().to_string(),
    ]);
    let status = run_command(&clone)
        .await
        .map_err(|e| ExecError::Fetch(e.to_string()))?;
    if !status.success() {
        return Err(ExecError::Fetch(format!(
            "git clone {} exited with {}",
            repository, status
        )));
    }

    // A ref that does not exist in the clone fails verification.
    let checkout = CommandSpec::new(["git", "checkout", reference]).current_dir(dest);
    let status = run_command(&checkout)
        .await
        .map_err(|e| ExecError::Fetch(e.to_string()))?;
    if !status.success() {
        return Err(ExecError::SourceVerificationFailed {
            expected: reference.to_string(),
            actual: format!("checkout exited with {}", status),
        });
    }

    Ok(())
}

fn fetch_archive(url: &str, expected_sha256: Option<&str>, dest: &Path) -> FetchResult {
    info!(url, "downloading");

    let response =
        reqwest::blocking::get(url).map_err(|e| ExecError::Fetch(e.to_string()))?;
    if !response.status().is_success() {
        return Err(ExecError::Fetch(format!(
            "GET {} returned {}",
            url,
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .map_err(|e| ExecError::Fetch(e.to_string()))?;

    if let Some(expected) = expected_sha256 {
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let actual = hex::encode(hasher.finalize());
        if actual != expected {
            return Err(ExecError::SourceVerificationFailed {
                expected: expected.to_string(),
                actual,
            });
        }
        debug!(sha256 = expected, "digest verified");
    }

    // Stage the archive next to the destination, then unpack.
    let archive_path = archive_staging_path(url, dest);
    let mut file = File::create(&archive_path).map_err(|e| ExecError::Fetch(e.to_string()))?;
    file.write_all(&bytes)
        .map_err(|e| ExecError::Fetch(e.to_string()))?;
    drop(file);

    let result = unpack_archive(&archive_path, dest);
    fs::remove_file(&archive_path).ok();
    result
}

fn archive_staging_path(url: &str, dest: &Path) -> PathBuf {
    let filename = url.rsplit('/').next().unwrap_or("archive");
    dest.with_file_name(format!(
        "{}.{}",
        dest.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "src".to_string()),
        filename
    ))
}

/// Unpack an archive into `dest`.
///
/// Upstream tarballs are required to carry exactly one top-level
/// directory; its contents become `dest`. An archive with loose
/// root-level entries (or none) is rejected rather than silently
/// dropping files.
///
/// Supports `.tar.gz` / `.tgz`, `.tar`, and `.zip`.
pub fn unpack_archive(archive_path: &Path, dest: &Path) -> FetchResult {
    let name = archive_path.to_string_lossy();
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| ExecError::Fetch(e.to_string()))?;

    // Extract verbatim into a staging directory first, then hoist the
    // single top-level directory into place.
    let staging =
        tempfile::tempdir_in(parent).map_err(|e| ExecError::Fetch(e.to_string()))?;

    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = File::open(archive_path).map_err(|e| ExecError::Fetch(e.to_string()))?;
        Archive::new(GzDecoder::new(BufReader::new(file)))
            .unpack(staging.path())
            .map_err(|e| ExecError::Fetch(e.to_string()))?;
    } else if name.ends_with(".tar") {
        let file = File::open(archive_path).map_err(|e| ExecError::Fetch(e.to_string()))?;
        Archive::new(BufReader::new(file))
            .unpack(staging.path())
            .map_err(|e| ExecError::Fetch(e.to_string()))?;
    } else if name.ends_with(".zip") {
        let file = File::open(archive_path).map_err(|e| ExecError::Fetch(e.to_string()))?;
        zip::ZipArchive::new(BufReader::new(file))
            .map_err(|e| ExecError::Fetch(format!("failed to open zip: {}", e)))?
            .extract(staging.path())
            .map_err(|e| ExecError::Fetch(format!("failed to extract zip: {}", e)))?;
    } else {
        return Err(ExecError::Fetch(format!(
            "unsupported archive format: {}",
            name
        )));
    }

    hoist_top_level(staging.path(), dest)
}

/// Move the archive's single top-level directory to `dest`.
fn hoist_top_level(staging: &Path, dest: &Path) -> FetchResult {
    let entries: Vec<PathBuf> = fs::read_dir(staging)
        .map_err(|e| ExecError::Fetch(e.to_string()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()
        .map_err(|e| ExecError::Fetch(e.to_string()))?;

    match entries.as_slice() {
        [top] if top.is_dir() => {
            fs::rename(top, dest).map_err(|e| ExecError::Fetch(e.to_string()))
        }
        _ => Err(ExecError::Fetch(format!(
            "archive expected exactly one top-level directory, found {} entries",
            entries.len()
        ))),
    }
}

fn copy_tree(src: &Path, dest: &Path) -> FetchResult {
    if !src.is_dir() {
        return Err(ExecError::Fetch(format!(
            "local source is not a directory: {}",
            src.display()
        )));
    }
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| ExecError::Fetch(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| ExecError::Fetch(e.to_string()))?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| ExecError::Fetch(e.to_string()))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| ExecError::Fetch(e.to_string()))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| ExecError::Fetch(e.to_string()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_fetch_copies_tree() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(src.join("sub")).unwrap();
        std::fs::write(src.join("configure"), "#!/bin/sh\n").unwrap();
        std::fs::write(src.join("sub/file.c"), "int main(){}\n").unwrap();

        let dest = temp.path().join("checkout");
        let source = Source::Local { path: src.clone() };
        DefaultFetcher.fetch(&source, &dest).await.unwrap();

        assert!(dest.join("configure").is_file());
        assert!(dest.join("sub/file.c").is_file());
    }

    #[tokio::test]
    async fn test_local_fetch_replaces_stale_checkout() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("new.txt"), "new").unwrap();

        let dest = temp.path().join("checkout");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::write(dest.join("stale.txt"), "old").unwrap();

        let source = Source::Local { path: src };
        DefaultFetcher.fetch(&source, &dest).await.unwrap();

        assert!(dest.join("new.txt").is_file());
        assert!(!dest.join("stale.txt").exists());
    }

    #[tokio::test]
    async fn test_local_fetch_missing_directory() {
        let temp = TempDir::new().unwrap();
        let source = Source::Local {
            path: temp.path().join("does-not-exist"),
        };
        let err = DefaultFetcher
            .fetch(&source, &temp.path().join("checkout"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Fetch(_)));
    }

    #[test]
    fn test_unpack_tar_gz_strips_top_level() {
        let temp = TempDir::new().unwrap();

        // Build pkg-1.0/hello.txt inside a tar.gz.
        let archive_path = temp.path().join("pkg.tar.gz");
        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        let content = b"hello";
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "pkg-1.0/hello.txt", &content[..])
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = temp.path().join("out");
        unpack_archive(&archive_path, &dest).unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.join("hello.txt")).unwrap(),
            "hello"
        );
    }

    #[test]
    fn test_unpack_rejects_loose_root_entries() {
        let temp = TempDir::new().unwrap();

        // configure and Makefile at the archive root, no wrapping dir.
        let archive_path = temp.path().join("pkg.tar.gz");
        let file = File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for name in ["configure", "Makefile"] {
            let content = b"x";
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, &content[..]).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();

        let dest = temp.path().join("out");
        let err = unpack_archive(&archive_path, &dest).unwrap_err();
        assert!(matches!(err, ExecError::Fetch(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_unpack_unknown_format() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("pkg.rar");
        std::fs::write(&archive, "junk").unwrap();
        let err = unpack_archive(&archive, &temp.path().join("out")).unwrap_err();
        assert!(matches!(err, ExecError::Fetch(_)));
    }
}
