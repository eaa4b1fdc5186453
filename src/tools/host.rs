//! [`DiskTools`] backed by the real host binaries.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::{parse, DiskTools, FsStats, ImageInfo, PartitionTableKind, Tool};
use crate::config::Config;
use crate::process::Cmd;
use crate::size::MIB;

/// gdisk expert session: extra functionality, relocate backup structures
/// to the end of the disk, write, confirm.
const GDISK_REPAIR_SCRIPT: &str = "x\ne\nw\nY\n";

/// Runs the configured host programs.
#[derive(Debug, Clone)]
pub struct HostTools {
    config: Config,
}

impl HostTools {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn cmd(&self, tool: Tool) -> Cmd {
        Cmd::new(self.config.program(tool)).error_msg(format!("{} failed", tool))
    }

    fn parted_print(&self, image: &Path) -> Result<parse::PartedLayout> {
        let out = self
            .cmd(Tool::Parted)
            .args(["-s", "-m"])
            .arg_path(image)
            .args(["unit", "B", "print"])
            .run()?;
        parse::parted_layout(&out.stdout)
    }
}

impl DiskTools for HostTools {
    fn image_info(&self, image: &Path) -> Result<ImageInfo> {
        let out = self
            .cmd(Tool::QemuImg)
            .args(["info", "--output=json"])
            .arg_path(image)
            .run()?;
        parse::image_info(&out.stdout)
    }

    fn map_partitions(&self, image: &Path) -> Result<Vec<PathBuf>> {
        let out = self.cmd(Tool::Kpartx).arg("-av").arg_path(image).run()?;
        // kpartx exited 0, so whatever it created has to be removed later
        // even if none of its lines could be read.
        let devices = parse::kpartx_devices(&out.stdout);
        if devices.is_empty() {
            tracing::warn!("kpartx mapped {} but reported no devices", image.display());
        }
        Ok(devices)
    }

    fn unmap_partitions(&self, image: &Path) -> Result<()> {
        self.cmd(Tool::Kpartx).arg("-d").arg_path(image).run()?;
        Ok(())
    }

    fn check_filesystem(&self, device: &Path) -> Result<()> {
        self.cmd(Tool::E2fsck)
            .args(["-f", "-y"])
            .arg_path(device)
            .run()?;
        Ok(())
    }

    fn filesystem_stats(&self, device: &Path) -> Result<FsStats> {
        let estimate = self
            .cmd(Tool::Resize2fs)
            .arg("-P")
            .arg_path(device)
            .run()?;
        let min_blocks = parse::resize2fs_min_blocks(&estimate.stdout)?;

        let dump = self.cmd(Tool::Dumpe2fs).arg("-h").arg_path(device).run()?;
        parse::filesystem_stats(min_blocks, &dump.stdout)
    }

    fn resize_filesystem(&self, device: &Path, size_mb: u64) -> Result<()> {
        self.cmd(Tool::Resize2fs)
            .arg_path(device)
            .arg(format!("{}M", size_mb))
            .run()?;
        Ok(())
    }

    fn resize_partition(&self, image: &Path, index: u32, size_mb: u64) -> Result<u64> {
        let layout = self.parted_print(image)?;
        let start = layout
            .partition_start(index)
            .with_context(|| format!("Partition {} not found in {}", index, image.display()))?;
        let end = size_mb
            .checked_mul(MIB)
            .and_then(|size| size.checked_add(start))
            .with_context(|| format!("Partition {} end overflows", index))?;

        // Shrinking asks for confirmation even in script mode, so answer it.
        self.cmd(Tool::Parted)
            .arg("---pretend-input-tty")
            .arg_path(image)
            // parted takes an inclusive end offset.
            .args(["unit", "B", "resizepart", &index.to_string(), &format!("{}B", end - 1)])
            .input("Yes\n")
            .run()?;
        Ok(end)
    }

    fn partition_table_kind(&self, image: &Path) -> Result<PartitionTableKind> {
        Ok(self.parted_print(image)?.table)
    }

    fn truncate_image(&self, image: &Path, size: u64) -> Result<()> {
        // "<" makes truncate refuse to extend the file.
        self.cmd(Tool::Truncate)
            .args(["-s", &format!("<{}", size)])
            .arg_path(image)
            .run()?;
        Ok(())
    }

    fn repair_partition_table(&self, image: &Path) -> Result<()> {
        self.cmd(Tool::Gdisk)
            .arg_path(image)
            .input(GDISK_REPAIR_SCRIPT)
            .run()?;
        Ok(())
    }
}
