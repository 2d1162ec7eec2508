//! Build descriptor.
//!
//! [`build_info`] returns an immutable value describing this build; there is
//! no global version state to read or mutate.

/// Name, version, and enabled optional features of this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    /// Whether the `obs_slog` terminal observer is compiled in.
    pub obs_slog: bool,
}

static BUILD_INFO: BuildInfo = BuildInfo {
    name: env!("CARGO_PKG_NAME"),
    version: env!("CARGO_PKG_VERSION"),
    obs_slog: cfg!(feature = "obs_slog"),
};

pub fn build_info() -> &'static BuildInfo {
    &BUILD_INFO
}

impl std::fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)?;
        if self.obs_slog {
            write!(f, " (+obs_slog)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_this_package() {
        let info = build_info();
        assert_eq!(info.name, "maxentropy");
        assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
        assert!(info.to_string().starts_with("maxentropy "));
    }
}
