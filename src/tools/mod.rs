//! Host tool adapter.
//!
//! The shrink pipeline never runs a program or parses tool output itself.
//! It talks to a [`DiskTools`] implementation that returns typed results;
//! [`HostTools`] is the real one, tests substitute a recording fake.

mod host;
pub mod parse;

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};

pub use host::HostTools;

/// Every external program the shrinker depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tool {
    QemuImg,
    Kpartx,
    E2fsck,
    Resize2fs,
    Dumpe2fs,
    Parted,
    Truncate,
    Gdisk,
}

impl Tool {
    pub const ALL: [Tool; 8] = [
        Tool::QemuImg,
        Tool::Kpartx,
        Tool::E2fsck,
        Tool::Resize2fs,
        Tool::Dumpe2fs,
        Tool::Parted,
        Tool::Truncate,
        Tool::Gdisk,
    ];

    /// Program name looked up in PATH when not overridden.
    pub fn default_program(self) -> &'static str {
        match self {
            Tool::QemuImg => "qemu-img",
            Tool::Kpartx => "kpartx",
            Tool::E2fsck => "e2fsck",
            Tool::Resize2fs => "resize2fs",
            Tool::Dumpe2fs => "dumpe2fs",
            Tool::Parted => "parted",
            Tool::Truncate => "truncate",
            Tool::Gdisk => "gdisk",
        }
    }

    /// Environment variable that overrides the program.
    pub fn env_key(self) -> &'static str {
        match self {
            Tool::QemuImg => "IMGSHRINK_QEMU_IMG",
            Tool::Kpartx => "IMGSHRINK_KPARTX",
            Tool::E2fsck => "IMGSHRINK_E2FSCK",
            Tool::Resize2fs => "IMGSHRINK_RESIZE2FS",
            Tool::Dumpe2fs => "IMGSHRINK_DUMPE2FS",
            Tool::Parted => "IMGSHRINK_PARTED",
            Tool::Truncate => "IMGSHRINK_TRUNCATE",
            Tool::Gdisk => "IMGSHRINK_GDISK",
        }
    }

    /// Distribution package that usually ships the program.
    pub fn package(self) -> &'static str {
        match self {
            Tool::QemuImg => "qemu-utils",
            Tool::Kpartx => "kpartx",
            Tool::E2fsck | Tool::Resize2fs | Tool::Dumpe2fs => "e2fsprogs",
            Tool::Parted => "parted",
            Tool::Truncate => "coreutils",
            Tool::Gdisk => "gdisk",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_program())
    }
}

/// Metadata reported by the image query tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Container format, e.g. `raw` or `qcow2`.
    pub format: String,
    /// Guest-visible size in bytes.
    pub virtual_size: u64,
}

/// Filesystem block statistics for a mapped device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    /// Smallest block count the filesystem can be shrunk to.
    pub min_blocks: u64,
    /// Block size in bytes.
    pub block_size: u64,
    pub block_count: Option<u64>,
    pub free_blocks: Option<u64>,
}

/// Sector size assumed for partition table structures.
pub const SECTOR_SIZE: u64 = 512;

/// Backup GPT header plus its 128-entry partition array.
pub const GPT_BACKUP_SECTORS: u64 = 33;

/// Partition table flavour, discovered after the partition resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PartitionTableKind {
    Mbr,
    Gpt,
    #[default]
    Unknown,
}

impl PartitionTableKind {
    /// Map a `parted` label name onto a table kind.
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "msdos" | "mbr" | "dos" => Self::Mbr,
            "gpt" => Self::Gpt,
            _ => Self::Unknown,
        }
    }

    /// GPT keeps a backup header at the end of the disk that truncation invalidates.
    pub fn needs_repair(self) -> bool {
        self == Self::Gpt
    }

    /// Bytes the table keeps after the last partition.
    pub fn trailing_bytes(self) -> u64 {
        match self {
            Self::Gpt => GPT_BACKUP_SECTORS * SECTOR_SIZE,
            Self::Mbr | Self::Unknown => 0,
        }
    }
}

impl fmt::Display for PartitionTableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mbr => "mbr",
            Self::Gpt => "gpt",
            Self::Unknown => "unknown",
        })
    }
}

/// Black-box disk operations used by the shrink pipeline.
///
/// Each method either fully succeeds or fails; nothing is retried.
/// Text parsing happens inside implementations, never in callers.
pub trait DiskTools {
    /// Query format and virtual size of an image file.
    fn image_info(&self, image: &Path) -> Result<ImageInfo>;

    /// Expose the image's partitions as block devices.
    ///
    /// Success means a mapping may exist and must be removed, even when no
    /// device could be identified and the list is empty.
    fn map_partitions(&self, image: &Path) -> Result<Vec<PathBuf>>;

    /// Remove every mapping created for `image`.
    fn unmap_partitions(&self, image: &Path) -> Result<()>;

    /// Forced filesystem consistency check.
    fn check_filesystem(&self, device: &Path) -> Result<()>;

    /// Minimum block count and block size of the filesystem on `device`.
    fn filesystem_stats(&self, device: &Path) -> Result<FsStats>;

    /// Resize the filesystem on `device` in place to `size_mb` MiB.
    fn resize_filesystem(&self, device: &Path, size_mb: u64) -> Result<()>;

    /// Resize partition `index` of `image` so it spans `size_mb` MiB.
    ///
    /// Returns the byte offset just past the partition's new end.
    fn resize_partition(&self, image: &Path, index: u32, size_mb: u64) -> Result<u64>;

    /// Inspect the partition table of `image`.
    fn partition_table_kind(&self, image: &Path) -> Result<PartitionTableKind>;

    /// Shrink the image file to `size` bytes. Must refuse to grow it.
    fn truncate_image(&self, image: &Path, size: u64) -> Result<()>;

    /// Rewrite the GPT backup structures at the current end of `image`.
    fn repair_partition_table(&self, image: &Path) -> Result<()>;
}

impl<T: DiskTools + ?Sized> DiskTools for &T {
    fn image_info(&self, image: &Path) -> Result<ImageInfo> {
        (**self).image_info(image)
    }

    fn map_partitions(&self, image: &Path) -> Result<Vec<PathBuf>> {
        (**self).map_partitions(image)
    }

    fn unmap_partitions(&self, image: &Path) -> Result<()> {
        (**self).unmap_partitions(image)
    }

    fn check_filesystem(&self, device: &Path) -> Result<()> {
        (**self).check_filesystem(device)
    }

    fn filesystem_stats(&self, device: &Path) -> Result<FsStats> {
        (**self).filesystem_stats(device)
    }

    fn resize_filesystem(&self, device: &Path, size_mb: u64) -> Result<()> {
        (**self).resize_filesystem(device, size_mb)
    }

    fn resize_partition(&self, image: &Path, index: u32, size_mb: u64) -> Result<u64> {
        (**self).resize_partition(image, index, size_mb)
    }

    fn partition_table_kind(&self, image: &Path) -> Result<PartitionTableKind> {
        (**self).partition_table_kind(image)
    }

    fn truncate_image(&self, image: &Path, size: u64) -> Result<()> {
        (**self).truncate_image(image, size)
    }

    fn repair_partition_table(&self, image: &Path) -> Result<()> {
        (**self).repair_partition_table(image)
    }
}
