//! Flags understood by the Vscale driver and their defaults.

use crate::flags::McnFlag;

/// Access token flag.
pub const FLAG_ACCESS_TOKEN: &str = "vscale-access-token";
/// Datacenter location flag.
pub const FLAG_LOCATION: &str = "vscale-location";
/// Base image flag.
pub const FLAG_MADE_FROM: &str = "vscale-made-from";
/// Resource plan flag.
pub const FLAG_RPLAN: &str = "vscale-rplan";
/// Swap file size flag, in megabytes.
pub const FLAG_SWAP_FILE: &str = "vscale-swap-file";

/// Default datacenter location.
pub const DEFAULT_LOCATION: &str = "spb0";
/// Default base image.
pub const DEFAULT_MADE_FROM: &str = "ubuntu_16.04_64_001_docker";
/// Default resource plan.
pub const DEFAULT_RPLAN: &str = "small";
/// Default swap size; zero disables the swap file.
pub const DEFAULT_SWAP_FILE: u32 = 0;

/// Flag declarations in the order they are presented to users.
#[must_use]
pub fn create_flags() -> Vec<McnFlag> {
    vec![
        McnFlag::string(
            FLAG_ACCESS_TOKEN,
            "VSCALE_ACCESS_TOKEN",
            "Vscale API access token",
            None,
        ),
        McnFlag::string(
            FLAG_LOCATION,
            "VSCALE_LOCATION",
            "Datacenter location",
            Some(DEFAULT_LOCATION),
        ),
        McnFlag::string(
            FLAG_MADE_FROM,
            "VSCALE_MADE_FROM",
            "Base image identifier",
            Some(DEFAULT_MADE_FROM),
        ),
        McnFlag::string(
            FLAG_RPLAN,
            "VSCALE_RPLAN",
            "Resource plan identifier",
            Some(DEFAULT_RPLAN),
        ),
        McnFlag::int(
            FLAG_SWAP_FILE,
            "VSCALE_SWAP_FILE",
            "Swap file size in megabytes (0 disables swap)",
            i64::from(DEFAULT_SWAP_FILE),
        ),
    ]
}
