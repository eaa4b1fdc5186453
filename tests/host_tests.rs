//! `HostTools` against shell scripts standing in for the disk tools.
//!
//! Only `truncate` is real, so the image file on disk shows exactly what a
//! shrink leaves behind. The scripts log their arguments for inspection.
//! Every test is serial: writing a script while another thread forks can
//! make executing it fail with "text file busy".

mod helpers;

use std::fs;
use std::path::{Path, PathBuf};

use helpers::{fake_program, RecordingReporter, TestImage};
use imgshrink::config::Config;
use imgshrink::error::ShrinkError;
use imgshrink::size::MIB;
use imgshrink::tools::{DiskTools, HostTools, PartitionTableKind, Tool};
use imgshrink::{Outcome, Shrinker};
use serial_test::serial;
use tempfile::TempDir;

const IMAGE_SIZE: u64 = 2048 * MIB;

fn host_tools(overrides: Vec<(Tool, String)>) -> HostTools {
    HostTools::new(Config::from_vars(
        overrides
            .into_iter()
            .map(|(tool, program)| (tool.env_key().to_string(), program)),
    ))
}

/// parted that prints one partition at 1 MiB and logs resize requests.
fn fake_parted(dir: &Path, label: &str) -> (String, PathBuf) {
    let log = dir.join("parted.log");
    let body = format!(
        r#"case "$*" in
  *resizepart*) echo "$*" >> "{log}" ;;
  *) printf 'BYT;\n%s:2147483648B:file:512:512:{label}::;\n1:1048576B:2147483647B:2146435072B:ext4::;\n' "$3" ;;
esac"#,
        log = log.display(),
        label = label
    );
    (fake_program(dir, "parted", &body), log)
}

/// kpartx that logs its mode flag and prints `map_output` when mapping.
fn fake_kpartx(dir: &Path, map_output: &str) -> (String, PathBuf) {
    let log = dir.join("kpartx.log");
    let body = format!(
        r#"echo "$1" >> "{log}"
if [ "$1" = "-av" ]; then echo "{output}"; fi"#,
        log = log.display(),
        output = map_output
    );
    (fake_program(dir, "kpartx", &body), log)
}

/// Every tool except `truncate` replaced by a script. The filesystem
/// reports a 500 MiB minimum.
fn scripted_tools(dir: &Path, label: &str, map_output: &str) -> (HostTools, PathBuf) {
    let (parted, _) = fake_parted(dir, label);
    let (kpartx, kpartx_log) = fake_kpartx(dir, map_output);
    let tools = host_tools(vec![
        (
            Tool::QemuImg,
            fake_program(
                dir,
                "qemu-img",
                r#"echo '{"format": "raw", "virtual-size": 2147483648}'"#,
            ),
        ),
        (Tool::Kpartx, kpartx),
        (Tool::E2fsck, fake_program(dir, "e2fsck", "exit 0")),
        (
            Tool::Resize2fs,
            fake_program(
                dir,
                "resize2fs",
                r#"if [ "$1" = "-P" ]; then echo "Estimated minimum size of the filesystem: 128000"; fi"#,
            ),
        ),
        (
            Tool::Dumpe2fs,
            fake_program(dir, "dumpe2fs", r#"echo "Block size:               4096""#),
        ),
        (Tool::Parted, parted),
        (Tool::Gdisk, fake_program(dir, "gdisk", "cat > /dev/null")),
    ]);
    (tools, kpartx_log)
}

fn logged_lines(log: &Path) -> Vec<String> {
    fs::read_to_string(log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).unwrap().len()
}

#[test]
#[serial]
fn test_resized_partition_ends_inside_truncated_image() {
    for (label, table) in [("msdos", PartitionTableKind::Mbr), ("gpt", PartitionTableKind::Gpt)] {
        let scripts = TempDir::new().unwrap();
        let (parted, log) = fake_parted(scripts.path(), label);
        let tools = host_tools(vec![(Tool::Parted, parted)]);
        let image = TestImage::with_size(IMAGE_SIZE);

        let end = tools.resize_partition(&image.path, 1, 500).unwrap();
        assert_eq!(end, MIB + 500 * MIB);

        let requests = logged_lines(&log);
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("resizepart 1 "), "{}", requests[0]);
        let last_byte: u64 = requests[0]
            .rsplit(' ')
            .next()
            .unwrap()
            .trim_end_matches('B')
            .parse()
            .unwrap();
        assert_eq!(last_byte + 1, end);

        assert_eq!(tools.partition_table_kind(&image.path).unwrap(), table);
        tools
            .truncate_image(&image.path, end + table.trailing_bytes())
            .unwrap();

        let len = file_len(&image.path);
        assert!(last_byte < len, "{} table: partition ends past EOF", label);
        assert_eq!(len - end, table.trailing_bytes());
    }
}

#[test]
#[serial]
fn test_shrink_leaves_whole_partition_in_image() {
    for (label, expected) in [("msdos", 501 * MIB), ("gpt", 501 * MIB + 33 * 512)] {
        let scripts = TempDir::new().unwrap();
        let (tools, kpartx_log) = scripted_tools(
            scripts.path(),
            label,
            "add map loop0p1 (253:0): 0 4190208 linear 7:0 2048",
        );
        let image = TestImage::with_size(IMAGE_SIZE);

        let mut shrinker =
            Shrinker::open(tools, RecordingReporter::default(), &image.path).unwrap();
        let outcome = shrinker.run().unwrap();

        assert!(matches!(
            outcome,
            Outcome::Shrunk { image_bytes, .. } if image_bytes == expected
        ));
        assert_eq!(file_len(&image.path), expected, "{} table", label);
        assert_eq!(logged_lines(&kpartx_log), vec!["-av", "-d"]);
    }
}

#[test]
#[serial]
fn test_unreadable_map_output_is_still_unmapped() {
    let scripts = TempDir::new().unwrap();
    let (tools, kpartx_log) = scripted_tools(
        scripts.path(),
        "msdos",
        "device-mapper: reload ioctl on loop0p1 failed",
    );

    let devices = tools.map_partitions(Path::new("/tmp/disk.raw")).unwrap();
    assert!(devices.is_empty());
    fs::remove_file(&kpartx_log).unwrap();

    let image = TestImage::with_size(IMAGE_SIZE);
    let mut shrinker = Shrinker::open(tools, RecordingReporter::default(), &image.path).unwrap();
    let err = shrinker.run().unwrap_err();

    assert!(matches!(err, ShrinkError::Mapping(_)));
    assert_eq!(logged_lines(&kpartx_log), vec!["-av", "-d"]);
    assert!(shrinker.session().mapping.is_none());
    assert_eq!(file_len(&image.path), IMAGE_SIZE);
}
