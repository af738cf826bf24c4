use std::env;
use std::path::PathBuf;

/// Environment variable selecting the execution mode.
pub const MODE_ENV: &str = "KERNEL_BRIDGE_MODE";
/// Environment variable holding an explicit kernel binary override.
pub const PATH_ENV: &str = "KERNEL_BRIDGE_PATH";

/// Default name of the kernel executable, before any platform suffix.
pub const DEFAULT_KERNEL_NAME: &str = "workspace-kernel";

/// How the bridge chooses between the external kernel and a local fallback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Use the kernel when a compatible one resolves, otherwise fall back.
    Auto,
    /// Require the kernel; resolution failure is fatal.
    External,
    /// Never resolve or invoke the kernel.
    Fallback,
}

impl ExecutionMode {
    /// Parses a mode selector. Matching is case-insensitive; unrecognized
    /// values (and absence) select `Auto`.
    pub fn parse(raw: Option<&str>) -> Self {
        let token = raw.map(str::trim).unwrap_or("").to_ascii_lowercase();
        match token.as_str() {
            "external" | "kernel" => ExecutionMode::External,
            "fallback" | "off" | "disable" | "none" => ExecutionMode::Fallback,
            _ => ExecutionMode::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Auto => "auto",
            ExecutionMode::External => "external",
            ExecutionMode::Fallback => "fallback",
        }
    }
}

/// Everything the resolver needs to enumerate kernel candidates.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub mode: ExecutionMode,
    /// Explicit binary override; tried first and, in external mode, alone.
    pub override_path: Option<PathBuf>,
    /// Base name of the kernel executable (`.exe` is appended on Windows).
    pub kernel_name: String,
    /// Root holding packaged binaries under `bin/<os>-<arch>/`.
    /// Defaults to the running executable's directory.
    pub package_dir: Option<PathBuf>,
    /// Workspace root whose `target/{release,debug}` build outputs are tried
    /// last. Defaults to the current directory.
    pub workspace_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Auto,
            override_path: None,
            kernel_name: DEFAULT_KERNEL_NAME.to_string(),
            package_dir: None,
            workspace_dir: None,
        }
    }
}

impl BridgeConfig {
    /// Reads mode and override from the environment, leaving the remaining
    /// fields at their defaults.
    pub fn from_env() -> Self {
        let mode = ExecutionMode::parse(env::var(MODE_ENV).ok().as_deref());
        let override_path = env::var(PATH_ENV)
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from);
        log::debug!(
            "bridge config from env: mode={} override={:?}",
            mode.as_str(),
            override_path
        );
        Self {
            mode,
            override_path,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.override_path = Some(path.into());
        self
    }

    pub fn with_kernel_name(mut self, name: impl Into<String>) -> Self {
        self.kernel_name = name.into();
        self
    }

    pub fn with_package_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.package_dir = Some(dir.into());
        self
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }
}
