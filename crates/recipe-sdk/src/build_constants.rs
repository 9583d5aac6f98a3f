// Build constants for the package.

/// Package metadata.
#[derive(Debug, Clone)]
pub struct Package;

impl Package {
    /// The semantic version, from `CARGO_PKG_VERSION`.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    /// The commit hash from which this binary was built.
    /// Set via the `RECIPE_RUNNER_COMMIT_HASH` env var at compile time, or "N/A".
    pub const COMMIT_HASH: &'static str = match option_env!("RECIPE_RUNNER_COMMIT_HASH") {
        Some(h) => h,
        None => "N/A",
    };
}
