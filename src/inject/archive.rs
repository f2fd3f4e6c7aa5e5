//! Packing of override files and the CA certificate into a tar archive.
//!
//! The archive is extracted at the container root, so every path is stored
//! relative to `/`. All entries are owned by root and read-only, so a process
//! inside the container cannot tamper with its own overrides.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use walkdir::WalkDir;

use crate::error::{InterceptError, Result};
use crate::inject::{INJECTED_CA_PATH, INJECTED_OVERRIDES_PATH};

/// Mode for packed override entries: read and execute for everybody.
pub const OVERRIDE_MODE: u32 = 0o555;

/// Mode for the injected certificate.
pub const CERTIFICATE_MODE: u32 = 0o444;

/// Archive path for an absolute in-container path.
fn archive_path(container_path: &str) -> PathBuf {
    PathBuf::from(container_path.trim_start_matches('/'))
}

fn root_header(entry_type: tar::EntryType, mode: u32, size: u64, mtime: u64) -> tar::Header {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_size(size);
    header.set_mtime(mtime);
    header.set_uid(0);
    header.set_gid(0);
    // GNU headers always have room for user/group names.
    let _ = header.set_username("root");
    let _ = header.set_groupname("root");
    header
}

fn archive_err(path: &Path) -> impl FnOnce(std::io::Error) -> InterceptError + '_ {
    move |source| InterceptError::Archive {
        path: path.to_path_buf(),
        source,
    }
}

/// Pack `source_dir` under the injected overrides root, then append the
/// certificate at the injected CA path.
///
/// The certificate entry is always the last entry, and the archive is only
/// finished once it has been written.
pub fn pack_overrides(source_dir: &Path, certificate: &str) -> Result<Bytes> {
    let overrides_root = archive_path(INJECTED_OVERRIDES_PATH);
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);

    for entry in WalkDir::new(source_dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source_dir)
            .unwrap_or(entry.path());
        let target = overrides_root.join(relative);
        let metadata = entry.metadata()?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs());
        let file_type = entry.file_type();

        if file_type.is_dir() {
            let mut header = root_header(tar::EntryType::Directory, OVERRIDE_MODE, 0, mtime);
            builder
                .append_data(&mut header, &target, std::io::empty())
                .map_err(archive_err(entry.path()))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(archive_err(entry.path()))?;
            let mut header = root_header(tar::EntryType::Symlink, OVERRIDE_MODE, 0, mtime);
            builder
                .append_link(&mut header, &target, &link)
                .map_err(archive_err(entry.path()))?;
        } else if file_type.is_file() {
            let file = fs::File::open(entry.path()).map_err(archive_err(entry.path()))?;
            let mut header = root_header(
                tar::EntryType::Regular,
                OVERRIDE_MODE,
                metadata.len(),
                mtime,
            );
            builder
                .append_data(&mut header, &target, file)
                .map_err(archive_err(entry.path()))?;
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping special file");
        }
    }

    let mut header = root_header(
        tar::EntryType::Regular,
        CERTIFICATE_MODE,
        certificate.len() as u64,
        0,
    );
    builder
        .append_data(
            &mut header,
            archive_path(INJECTED_CA_PATH),
            certificate.as_bytes(),
        )
        .map_err(archive_err(Path::new(INJECTED_CA_PATH)))?;

    let archive = builder
        .into_inner()
        .map_err(archive_err(source_dir))?;
    Ok(Bytes::from(archive))
}
