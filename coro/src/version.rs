//! Version reporting, entirely decoupled from the rest of the crate: no
//! other component reads or writes anything here.

/// A semantic version triple, mirroring the reference coroutine library's
/// `cco_version` struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// This crate's version, read from its own `Cargo.toml` at compile time.
pub fn version() -> Version {
    Version {
        major: parse_component(env!("CARGO_PKG_VERSION_MAJOR")),
        minor: parse_component(env!("CARGO_PKG_VERSION_MINOR")),
        patch: parse_component(env!("CARGO_PKG_VERSION_PATCH")),
    }
}

fn parse_component(s: &str) -> u32 {
    // `CARGO_PKG_VERSION_*` is always a plain decimal integer; a malformed
    // value here would mean a broken build, not a runtime condition to
    // recover from.
    match u32::from_str_radix(s, 10) {
        Ok(n) => n,
        Err(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_matches_cargo_toml() {
        let v = version();
        assert_eq!(v, Version { major: 0, minor: 1, patch: 0 });
    }
}
