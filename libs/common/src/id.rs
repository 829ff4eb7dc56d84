use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// ULIDs sort lexicographically by creation time at millisecond granularity.
///
/// # Examples
/// ```
/// let id = steeple_common::id::prefixed_ulid("ntf");
/// assert!(id.starts_with("ntf_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const NOTIFICATION: &str = "ntf";
    pub const CONNECTION: &str = "conn";
}
