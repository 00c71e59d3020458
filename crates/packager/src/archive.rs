//! Archive writing and completion markers
//!
//! An archive counts as done only when its completion marker exists and
//! the marker's digest matches the archive bytes. Archives are written to a
//! temporary file and renamed into place; the marker is written last.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pack_core::{ArchiveFormat, Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Suffix appended to an archive's file name to name its marker
pub const MARKER_SUFFIX: &str = ".sha256.json";

/// One file going into an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Name inside the archive
    pub name: String,

    /// File on disk
    pub path: PathBuf,
}

/// Result of writing an archive
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
    pub entries: Vec<String>,
}

/// Completion marker stored next to a finished archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionMarker {
    /// Archive file name
    pub archive: String,

    /// Hex SHA-256 of the archive
    pub sha256: String,

    pub size_bytes: u64,

    /// Names stored in the archive
    pub entries: Vec<String>,

    pub created_at: DateTime<Utc>,
}

fn archive_error(action: &str, e: impl std::fmt::Display) -> Error {
    Error::Archive {
        message: format!("{}: {}", action, e),
    }
}

/// Regular files directly inside `dir`, sorted by name
///
/// Subdirectories are skipped; archives are always flat.
pub fn collect_entries(dir: &Path) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            debug!(path = %entry.path().display(), "Skipping subdirectory");
            continue;
        }
        // Follow symlinks; skip anything that isn't a file in the end
        if !entry.path().is_file() {
            continue;
        }
        entries.push(ArchiveEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Hex SHA-256 of a file
pub fn compute_sha256(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Marker location for an archive
pub fn marker_path(archive: &Path) -> PathBuf {
    let mut name = archive
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();
    name.push_str(MARKER_SUFFIX);
    archive.with_file_name(name)
}

fn temp_path(target: &Path) -> PathBuf {
    let temp_name = format!(
        ".{}.{}.tmp",
        target.file_name().unwrap_or_default().to_string_lossy(),
        Uuid::new_v4()
    );
    target.with_file_name(temp_name)
}

fn write_zip(entries: &[ArchiveEntry], file: File) -> Result<File> {
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(true);

    for entry in entries {
        zip.start_file(entry.name.as_str(), options)
            .map_err(|e| archive_error(&format!("add {}", entry.name), e))?;
        let mut source = File::open(&entry.path)?;
        io::copy(&mut source, &mut zip)?;
    }

    zip.finish().map_err(|e| archive_error("finish zip", e))
}

fn write_tar_gz(entries: &[ArchiveEntry], file: File) -> Result<File> {
    let mut tar = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    tar.follow_symlinks(true);

    for entry in entries {
        tar.append_path_with_name(&entry.path, &entry.name)
            .map_err(|e| archive_error(&format!("add {}", entry.name), e))?;
    }

    let encoder = tar
        .into_inner()
        .map_err(|e| archive_error("finish tar", e))?;
    encoder.finish().map_err(|e| archive_error("finish gzip", e))
}

/// Pack `entries` into `target`, flat, replacing any existing file
///
/// The archive is written next to `target` and renamed into place once
/// synced, so `target` never holds a partial archive.
pub fn write_archive(
    format: ArchiveFormat,
    entries: &[ArchiveEntry],
    target: &Path,
) -> Result<ArchiveSummary> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let temp = temp_path(target);
    let (sha256, size_bytes) = match finish_temp(format, entries, &temp, target) {
        Ok(done) => done,
        Err(e) => {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
    };

    Ok(ArchiveSummary {
        path: target.to_path_buf(),
        sha256,
        size_bytes,
        entries: entries.iter().map(|e| e.name.clone()).collect(),
    })
}

/// Write, sync and hash the temp archive, then move it onto `target`
fn finish_temp(
    format: ArchiveFormat,
    entries: &[ArchiveEntry],
    temp: &Path,
    target: &Path,
) -> Result<(String, u64)> {
    let file = File::create(temp)?;
    let file = match format {
        ArchiveFormat::Zip => write_zip(entries, file)?,
        ArchiveFormat::TarGz => write_tar_gz(entries, file)?,
    };
    file.sync_all()?;
    drop(file);

    let sha256 = compute_sha256(temp)?;
    let size_bytes = fs::metadata(temp)?.len();
    fs::rename(temp, target)?;
    Ok((sha256, size_bytes))
}

/// Record a finished archive
pub fn write_marker(summary: &ArchiveSummary) -> Result<CompletionMarker> {
    let marker = CompletionMarker {
        archive: summary
            .path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string(),
        sha256: summary.sha256.clone(),
        size_bytes: summary.size_bytes,
        entries: summary.entries.clone(),
        created_at: Utc::now(),
    };

    let path = marker_path(&summary.path);
    let temp = temp_path(&path);
    let mut file = File::create(&temp)?;
    file.write_all(serde_json::to_string_pretty(&marker)?.as_bytes())?;
    file.sync_all()?;
    fs::rename(&temp, &path)?;
    Ok(marker)
}

/// True if `archive` and a matching completion marker both exist
pub fn is_complete(archive: &Path) -> Result<bool> {
    if !archive.is_file() {
        return Ok(false);
    }
    let marker_file = marker_path(archive);
    let raw = match fs::read_to_string(&marker_file) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let marker: CompletionMarker = match serde_json::from_str(&raw) {
        Ok(marker) => marker,
        Err(e) => {
            warn!(marker = %marker_file.display(), error = %e, "Unreadable completion marker");
            return Ok(false);
        }
    };

    if fs::metadata(archive)?.len() != marker.size_bytes {
        return Ok(false);
    }
    Ok(compute_sha256(archive)? == marker.sha256)
}

/// Remove an archive and its marker, ignoring missing files
pub fn discard(archive: &Path) -> Result<()> {
    for path in [archive.to_path_buf(), marker_path(archive)] {
        match fs::remove_file(&path) {
            Ok(()) => info!(path = %path.display(), "Removed incomplete archive output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Names stored in an archive, in archive order
pub fn list_entries(format: ArchiveFormat, archive: &Path) -> Result<Vec<String>> {
    let file = File::open(archive)?;
    match format {
        ArchiveFormat::Zip => {
            let mut zip = ZipArchive::new(file).map_err(|e| archive_error("open zip", e))?;
            let mut names = Vec::with_capacity(zip.len());
            for i in 0..zip.len() {
                let entry = zip.by_index(i).map_err(|e| archive_error("read zip entry", e))?;
                names.push(entry.name().to_string());
            }
            Ok(names)
        }
        ArchiveFormat::TarGz => {
            let mut tar = tar::Archive::new(GzDecoder::new(file));
            let mut names = Vec::new();
            for entry in tar.entries().map_err(|e| archive_error("read tar", e))? {
                let entry = entry.map_err(|e| archive_error("read tar entry", e))?;
                let path = entry.path().map_err(|e| archive_error("read tar path", e))?;
                names.push(path.to_string_lossy().to_string());
            }
            Ok(names)
        }
    }
}

/// Contents of one archive member
pub fn read_entry(format: ArchiveFormat, archive: &Path, name: &str) -> Result<Vec<u8>> {
    let file = File::open(archive)?;
    let mut contents = Vec::new();
    match format {
        ArchiveFormat::Zip => {
            let mut zip = ZipArchive::new(file).map_err(|e| archive_error("open zip", e))?;
            let mut entry = zip
                .by_name(name)
                .map_err(|e| archive_error(&format!("find {}", name), e))?;
            entry.read_to_end(&mut contents)?;
        }
        ArchiveFormat::TarGz => {
            let mut tar = tar::Archive::new(GzDecoder::new(file));
            let mut found = false;
            for entry in tar.entries().map_err(|e| archive_error("read tar", e))? {
                let mut entry = entry.map_err(|e| archive_error("read tar entry", e))?;
                let matches = entry
                    .path()
                    .map(|p| p.to_string_lossy() == name)
                    .unwrap_or(false);
                if matches {
                    entry.read_to_end(&mut contents)?;
                    found = true;
                    break;
                }
            }
            if !found {
                return Err(archive_error("find entry", name));
            }
        }
    }
    Ok(contents)
}
