//! Unpacking vendor archives and flattening their wrapper directories.
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::StackError;

/// Archive formats we can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// Detects the format from the file name.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(Self::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// Unpacks `archive` into `dest`, creating `dest` if needed.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), StackError> {
    let format =
        ArchiveFormat::detect(archive).ok_or_else(|| StackError::UnsupportedArchive(archive.to_path_buf()))?;

    fs::create_dir_all(dest).map_err(StackError::io(dest))?;
    info!("Extracting {:?} into {:?}", archive, dest);

    match format {
        ArchiveFormat::Zip => extract_zip(archive, dest),
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest),
    }
}

fn archive_error(path: &Path, reason: impl ToString) -> StackError {
    StackError::Archive {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<(), StackError> {
    let file = File::open(archive).map_err(StackError::io(archive))?;
    let mut zip = ZipArchive::new(file).map_err(|err| archive_error(archive, err))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|err| archive_error(archive, err))?;
        let relative = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| archive_error(archive, format!("unsafe entry path '{}'", entry.name())))?;
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(StackError::io(&target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(StackError::io(parent))?;
        }
        let mut out = File::create(&target).map_err(StackError::io(&target))?;
        io::copy(&mut entry, &mut out).map_err(StackError::io(&target))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                .map_err(StackError::io(&target))?;
        }
    }

    debug!("Unpacked {} zip entries from {:?}", zip.len(), archive);
    Ok(())
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), StackError> {
    let file = File::open(archive).map_err(StackError::io(archive))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.set_preserve_mtime(false);
    tar.set_overwrite(true);

    let entries = tar.entries().map_err(|err| archive_error(archive, err))?;
    for entry in entries {
        let mut entry = entry.map_err(|err| archive_error(archive, err))?;
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|err| archive_error(archive, err))?;
        if !unpacked {
            let name = entry
                .path()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|_| "<unknown>".to_string());
            return Err(archive_error(archive, format!("unsafe entry path '{name}'")));
        }
    }

    Ok(())
}

/// Moves everything under `<root>/<wrapper>` up into `root` and removes the
/// wrapper directory.
pub fn flatten_wrapper(root: &Path, wrapper: &str) -> Result<(), StackError> {
    let source = root.join(wrapper);
    if !source.is_dir() {
        return Err(StackError::MissingComponent {
            what: format!("archive directory '{wrapper}'"),
            path: source,
        });
    }

    // Rename first so a child named like the wrapper cannot collide with it.
    let parked = unique_sibling(root, wrapper);
    fs::rename(&source, &parked).map_err(StackError::io(&source))?;

    // Links are moved as they are; only real directories get recreated.
    let entries: Vec<(PathBuf, bool)> = WalkDir::new(&parked)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            entry
                .map(|entry| {
                    let is_dir = entry.file_type().is_dir();
                    (entry.into_path(), is_dir)
                })
                .map_err(|err| {
                    let path =
                        err.path().map(Path::to_path_buf).unwrap_or_else(|| parked.clone());
                    StackError::Io {
                        path,
                        source: err
                            .into_io_error()
                            .unwrap_or_else(|| io::Error::other("directory walk failed")),
                    }
                })
        })
        .collect::<Result<_, _>>()?;

    for (path, is_dir) in entries {
        let relative = path
            .strip_prefix(&parked)
            .map_err(|err| archive_error(&path, err))?;
        let target = root.join(relative);

        if is_dir {
            fs::create_dir_all(&target).map_err(StackError::io(&target))?;
        } else {
            fs::rename(&path, &target).map_err(StackError::io(&path))?;
        }
    }

    fs::remove_dir_all(&parked).map_err(StackError::io(&parked))?;
    debug!("Flattened '{wrapper}' into {:?}", root);
    Ok(())
}

fn unique_sibling(root: &Path, base: &str) -> PathBuf {
    let mut attempt = 0u32;
    loop {
        let candidate = root.join(format!(".{base}.relocating{attempt}"));
        if !candidate.exists() {
            return candidate;
        }
        attempt += 1;
    }
}
