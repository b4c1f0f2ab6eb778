//! Remote shell sequence that provisions a swap file.

use shell_escape::unix::escape;

/// Location of the swap file on the scalet.
pub const SWAP_FILE_PATH: &str = "/var/swap.img";

/// Builds the script that creates, enables, and persists a swap file of
/// `megabytes` size.
///
/// Each step is chained with `&&` so the first failure stops the sequence
/// and surfaces as a non-zero exit status.
#[must_use]
pub fn swap_file_script(megabytes: u32) -> String {
    let path = escape(SWAP_FILE_PATH.into());
    let fstab_entry = escape(format!("{SWAP_FILE_PATH}    none    swap    sw    0    0").into());
    [
        format!("touch {path}"),
        format!("chmod 600 {path}"),
        format!("dd if=/dev/zero of={path} bs=1MB count={megabytes}"),
        format!("mkswap {path}"),
        format!("swapon {path}"),
        format!("echo {fstab_entry} >> /etc/fstab"),
    ]
    .join(" && ")
}
