use std::path::PathBuf;

/// Overrides the home directory for `.env` lookup and the data directory.
pub const HOME_OVERRIDE_VAR: &str = "EVALBENCH_HOME";

/// Returns the user's home directory using common environment variables.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os(HOME_OVERRIDE_VAR)
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(PathBuf::from)
        })
}

/// Returns the default path to ~/.env (or $EVALBENCH_HOME/.env if set).
pub fn home_env_path() -> Option<PathBuf> {
    home_dir().map(|mut dir| {
        dir.push(".env");
        dir
    })
}

/// Returns the directory holding log files.
pub fn data_dir() -> PathBuf {
    if let Some(mut dir) = home_dir() {
        dir.push(".evalbench");
        dir
    } else {
        PathBuf::from(".evalbench")
    }
}

pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}
