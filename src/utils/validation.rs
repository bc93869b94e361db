//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for colon-separated MAC addresses
static MAC_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{2}(:[0-9a-fA-F]{2}){5}$").unwrap()
});

/// Validate a MAC address (`aa:bb:cc:dd:ee:ff`)
pub fn validate_mac(mac: &str) -> bool {
    MAC_REGEX.is_match(mac)
}

/// Compare two MAC addresses ignoring case
pub fn same_mac(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Strip the prefix length from an address in CIDR notation
pub fn strip_prefix_len(addr: &str) -> &str {
    addr.split('/').next().unwrap_or(addr)
}
