//! imgshrink - shrink a raw disk image to the size its filesystem needs.
//!
//! The image must be raw and hold a single ext2/3/4 partition. Shrinking
//! drives host tools (kpartx, e2fsck, resize2fs, parted, truncate, gdisk)
//! through the [`tools::DiskTools`] adapter; [`shrink::Shrinker`] owns the
//! step order and guarantees the partition mapping is torn down on every
//! path.

pub mod config;
pub mod error;
pub mod logging;
pub mod preflight;
pub mod process;
pub mod report;
pub mod session;
pub mod shrink;
pub mod size;
pub mod timing;
pub mod tools;

pub use error::ShrinkError;
pub use shrink::{Outcome, Shrinker, Step};
