//! Default shell and working directory resolution.

use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable naming the user's shell on this platform.
#[cfg(windows)]
pub const SHELL_ENV_VAR: &str = "COMSPEC";
#[cfg(not(windows))]
pub const SHELL_ENV_VAR: &str = "SHELL";

/// Shell used when neither the configuration nor the environment names one.
#[cfg(windows)]
pub const FALLBACK_SHELL: &str = r"C:\Windows\System32\cmd.exe";
#[cfg(not(windows))]
pub const FALLBACK_SHELL: &str = "/bin/bash";

/// Detects the shell to use.
///
/// Returns the shell in this order of preference:
/// 1. The configured override if set and non-empty
/// 2. The platform shell variable (`$SHELL`, or `%COMSPEC%` on Windows)
/// 3. The platform fallback
pub fn detect_shell(configured: Option<&str>) -> String {
    resolve_shell(configured, |key| std::env::var(key).ok())
}

fn resolve_shell<F>(configured: Option<&str>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(shell) = configured.filter(|s| !s.is_empty()) {
        return shell.to_string();
    }

    lookup(SHELL_ENV_VAR)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}

/// Working directory for new sessions: the home directory, or the current
/// directory when no home is known.
pub fn default_cwd() -> Option<PathBuf> {
    dirs::home_dir().or_else(|| std::env::current_dir().ok())
}

/// Snapshot of the current process environment, passed through verbatim.
pub fn inherited_env() -> Vec<(OsString, OsString)> {
    std::env::vars_os().collect()
}
