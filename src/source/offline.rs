use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use tar::Archive;
use tempdir::TempDir;
use zstd::stream::read::Decoder as ZstdDecoder;

use super::{ChannelKind, DepthImage, DepthKey, ImageSource};
use crate::error::SourceError;

const ARCHIVE_SUFFIX: &str = ".tar.zst";

/// Reads pre-recorded depth stacks from disk.
///
/// A dataset is either a directory or a `.tar.zst` archive of one, laid out as
/// `<root>/<channel>/<depth>.<ext>`. Archives are unpacked into a temporary
/// directory that lives as long as the reader.
#[derive(Default)]
pub struct OfflineReader {
    root: Option<PathBuf>,
    index: HashMap<(DepthKey, ChannelKind), PathBuf>,
    working_dir: Option<TempDir>,
}

impl OfflineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root of the opened dataset (inside the working directory for archives)
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Number of indexed images
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Indexed depths of one channel, ascending
    pub fn depths(&self, channel: ChannelKind) -> Vec<f64> {
        let mut keys: Vec<DepthKey> = self
            .index
            .keys()
            .filter(|(_, c)| *c == channel)
            .map(|(d, _)| *d)
            .collect();
        keys.sort();
        keys.into_iter().map(DepthKey::depth).collect()
    }

    fn unpack(archive_path: &Path) -> Result<TempDir, SourceError> {
        let unavailable = |what: &str, e: std::io::Error| {
            SourceError::Unavailable(format!("{what} {:?}: {e}", archive_path))
        };

        let working_dir = TempDir::new("holocontours_dataset")
            .map_err(|e| unavailable("cannot create working directory for", e))?;
        let f = File::open(archive_path).map_err(|e| unavailable("failed to open archive", e))?;
        let decoder =
            ZstdDecoder::new(f).map_err(|e| unavailable("invalid zstd stream in", e))?;
        let mut archive = Archive::new(decoder);
        archive
            .unpack(working_dir.path())
            .map_err(|e| unavailable("failed to extract archive", e))?;

        log::debug!("unpacked {:?} into {:?}", archive_path, working_dir.path());
        Ok(working_dir)
    }
}

/// Locate the dataset root: the directory holding the channel folders,
/// or its only subdirectory when an archive wraps everything in one folder
fn dataset_root(dir: &Path) -> PathBuf {
    if has_channel_dirs(dir) {
        return dir.to_path_buf();
    }
    let subdirs: Vec<PathBuf> = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    match subdirs.as_slice() {
        [only] if has_channel_dirs(only) => only.clone(),
        _ => dir.to_path_buf(),
    }
}

fn has_channel_dirs(dir: &Path) -> bool {
    ChannelKind::ALL
        .iter()
        .any(|c| dir.join(c.dir_name()).is_dir())
}

fn index_dataset(root: &Path) -> HashMap<(DepthKey, ChannelKind), PathBuf> {
    let mut index = HashMap::new();
    for channel in ChannelKind::ALL {
        let Ok(entries) = fs::read_dir(root.join(channel.dir_name())) else {
            continue;
        };
        for path in entries.flatten().map(|e| e.path()) {
            if !path.is_file() {
                continue;
            }
            let depth = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|d| d.is_finite());
            match depth {
                Some(depth) => {
                    let key = (DepthKey::from_depth(depth), channel);
                    if let Some(kept) = index.get(&key) {
                        log::warn!(
                            "ignoring {:?}: depth {depth} is indistinguishable from {:?}",
                            path,
                            kept
                        );
                        continue;
                    }
                    index.insert(key, path);
                }
                None => log::debug!("ignoring {:?}: name is not a depth", path),
            }
        }
    }
    index
}

impl ImageSource for OfflineReader {
    fn open(&mut self, location: &str) -> Result<(), SourceError> {
        self.root = None;
        self.index.clear();
        self.working_dir = None;

        let path = Path::new(location);
        let (root, working_dir) = if path.is_dir() {
            (dataset_root(path), None)
        } else if path.is_file() && location.ends_with(ARCHIVE_SUFFIX) {
            let working_dir = Self::unpack(path)?;
            (dataset_root(working_dir.path()), Some(working_dir))
        } else {
            return Err(SourceError::Unavailable(format!(
                "no dataset directory or {ARCHIVE_SUFFIX} archive at {location:?}"
            )));
        };

        let index = index_dataset(&root);
        if index.is_empty() {
            return Err(SourceError::Unavailable(format!(
                "dataset {location:?} contains no depth images"
            )));
        }

        log::info!("indexed {} images under {:?}", index.len(), root);
        self.root = Some(root);
        self.index = index;
        self.working_dir = working_dir;
        Ok(())
    }

    fn fetch(&mut self, depth: f64, channel: ChannelKind) -> Result<DepthImage, SourceError> {
        if self.root.is_none() {
            return Err(SourceError::NotOpened);
        }
        let path = self
            .index
            .get(&(DepthKey::from_depth(depth), channel))
            .ok_or_else(|| SourceError::retrieval(depth, channel, "not recorded in dataset"))?;

        let decoded = image::open(path).map_err(|e| {
            SourceError::retrieval(depth, channel, format!("failed to decode {:?}: {e}", path))
        })?;
        Ok(DepthImage::new(depth, channel, decoded.to_luma32f()))
    }

    fn name(&self) -> &str {
        "offline"
    }
}
