//! Text extraction from host tool output.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use super::{FsStats, ImageInfo, PartitionTableKind};

#[derive(Debug, Deserialize)]
struct QemuImgInfo {
    format: String,
    #[serde(rename = "virtual-size")]
    virtual_size: u64,
}

/// Parse `qemu-img info --output=json`.
pub fn image_info(json: &str) -> Result<ImageInfo> {
    let info: QemuImgInfo =
        serde_json::from_str(json).context("Unexpected qemu-img info output")?;
    Ok(ImageInfo {
        format: info.format,
        virtual_size: info.virtual_size,
    })
}

/// Mapper device paths from `kpartx -av` output.
///
/// ```text
/// add map loop0p1 (253:0): 0 1026048 linear 7:0 2048
/// ```
pub fn kpartx_devices(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            match (words.next(), words.next(), words.next()) {
                (Some("add"), Some("map"), Some(name)) => {
                    Some(PathBuf::from("/dev/mapper").join(name))
                }
                _ => None,
            }
        })
        .collect()
}

/// Minimum block count from `resize2fs -P`.
///
/// ```text
/// Estimated minimum size of the filesystem: 127993
/// ```
pub fn resize2fs_min_blocks(output: &str) -> Result<u64> {
    let line = output
        .lines()
        .find(|l| l.contains("minimum size"))
        .ok_or_else(|| anyhow!("resize2fs did not report a minimum size"))?;
    let value = line.rsplit(':').next().unwrap_or_default().trim();
    value
        .parse()
        .with_context(|| format!("Non-numeric minimum size '{}'", value))
}

/// Parse a numeric field from `dumpe2fs -h` output.
pub fn dumpe2fs_field(output: &str, field: &str) -> Option<u64> {
    for line in output.lines() {
        if let Some(value) = line.strip_prefix(field) {
            return value.trim().parse().ok();
        }
    }
    None
}

/// Combine `resize2fs -P` and `dumpe2fs -h` results.
pub fn filesystem_stats(min_blocks: u64, dumpe2fs: &str) -> Result<FsStats> {
    let block_size = match dumpe2fs_field(dumpe2fs, "Block size:") {
        Some(size) if size > 0 => size,
        _ => bail!("dumpe2fs did not report a usable block size"),
    };

    Ok(FsStats {
        min_blocks,
        block_size,
        block_count: dumpe2fs_field(dumpe2fs, "Block count:"),
        free_blocks: dumpe2fs_field(dumpe2fs, "Free blocks:"),
    })
}

/// Disk layout from `parted -s -m <image> unit B print`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartedLayout {
    pub table: PartitionTableKind,
    /// `(number, start offset in bytes)` per partition.
    pub partitions: Vec<(u32, u64)>,
}

impl PartedLayout {
    pub fn partition_start(&self, number: u32) -> Option<u64> {
        self.partitions
            .iter()
            .find(|(n, _)| *n == number)
            .map(|(_, start)| *start)
    }
}

/// Parse machine-readable `parted` output.
///
/// ```text
/// BYT;
/// /tmp/disk.raw:2147483648B:file:512:512:gpt::;
/// 1:1048576B:2146435071B:2145386496B:ext4::;
/// ```
pub fn parted_layout(output: &str) -> Result<PartedLayout> {
    let mut table = None;
    let mut partitions = Vec::new();

    for line in output.lines() {
        let line = line.trim().trim_end_matches(';');
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 2 {
            continue;
        }

        if let Ok(number) = fields[0].parse::<u32>() {
            let start = fields[1]
                .trim_end_matches('B')
                .parse::<u64>()
                .with_context(|| format!("Bad partition start '{}'", fields[1]))?;
            partitions.push((number, start));
        } else if table.is_none() && fields.len() >= 6 {
            table = Some(PartitionTableKind::from_label(fields[5]));
        }
    }

    let table = table.ok_or_else(|| anyhow!("parted did not print a disk line"))?;
    Ok(PartedLayout { table, partitions })
}
