//! In-flight state of one shrink run.

use std::path::{Path, PathBuf};

use crate::error::ShrinkError;
use crate::size::SizeEstimate;
use crate::tools::{DiskTools, PartitionTableKind};

/// Only raw images can be mapped and truncated in place.
pub const RAW_FORMAT: &str = "raw";

/// The disk image being shrunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    pub path: PathBuf,
    pub format: String,
    /// Virtual size in bytes; `None` once truncation made it stale.
    pub virtual_size: Option<u64>,
}

impl ImageHandle {
    /// Validate `path` and query its metadata. Nothing is mapped here.
    pub fn inspect<T>(tools: &T, path: &Path) -> Result<Self, ShrinkError>
    where
        T: DiskTools + ?Sized,
    {
        if !path.is_file() {
            return Err(ShrinkError::InvalidInput(format!(
                "{} does not exist or is not a regular file",
                path.display()
            )));
        }

        let info = tools.image_info(path).map_err(|e| {
            ShrinkError::InvalidInput(format!(
                "cannot read image metadata of {}: {:#}",
                path.display(),
                e
            ))
        })?;

        if info.format != RAW_FORMAT {
            return Err(ShrinkError::InvalidInput(format!(
                "{} is a {} image, only raw images are supported",
                path.display(),
                info.format
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            format: info.format,
            virtual_size: Some(info.virtual_size),
        })
    }
}

/// Live block-device exposure of the image's partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMapping {
    pub image: PathBuf,
    pub devices: Vec<PathBuf>,
}

impl PartitionMapping {
    pub fn new(image: PathBuf, devices: Vec<PathBuf>) -> Self {
        Self { image, devices }
    }

    /// The device holding the resizable filesystem: always the first mapping.
    pub fn device(&self) -> Option<&Path> {
        self.devices.first().map(PathBuf::as_path)
    }
}

/// Mutable context threaded through the pipeline steps.
#[derive(Debug, Clone)]
pub struct Session {
    pub image: ImageHandle,
    pub mapping: Option<PartitionMapping>,
    pub estimate: Option<SizeEstimate>,
    pub table: PartitionTableKind,
}

impl Session {
    pub fn new(image: ImageHandle) -> Self {
        Self {
            image,
            mapping: None,
            estimate: None,
            table: PartitionTableKind::Unknown,
        }
    }
}
