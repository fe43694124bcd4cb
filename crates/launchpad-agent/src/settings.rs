use std::{path::PathBuf, time::Duration};

pub const DEFAULT_RUNTIME_URL: &str =
    "https://download.oracle.com/java/17/latest/jdk-17_windows-x64_bin.zip";

const DEFAULT_WORK_DIR: &str = "./server";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15 * 60;
const DEFAULT_LOG_MAX_LINES: usize = 1000;

pub(crate) fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Runtime knobs for provisioning and the console.
///
/// Built explicitly by callers (tests point the URLs at a loopback server);
/// the binary uses [`Settings::from_env`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory the server is laid out in. Runtime, artifact, script and
    /// license file all land at its root.
    pub work_dir: PathBuf,
    pub runtime_url: String,
    /// When set, tool artifacts are fetched from `<mirror>/<file name>`.
    pub artifact_mirror: Option<String>,
    pub http_timeout: Duration,
    pub log_max_lines: usize,
}

impl Settings {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            runtime_url: DEFAULT_RUNTIME_URL.to_string(),
            artifact_mirror: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            log_max_lines: DEFAULT_LOG_MAX_LINES,
        }
    }

    pub fn from_env() -> Self {
        let raw = env_string("LAUNCHPAD_WORK_DIR").unwrap_or_else(|| DEFAULT_WORK_DIR.to_string());
        let mut settings = Self::new(absolute(PathBuf::from(raw)));

        if let Some(url) = env_string("LAUNCHPAD_RUNTIME_URL") {
            settings.runtime_url = url;
        }
        settings.artifact_mirror = env_string("LAUNCHPAD_ARTIFACT_MIRROR")
            .map(|m| m.trim_end_matches('/').to_string());
        settings.http_timeout = Duration::from_secs(
            env_u64("LAUNCHPAD_HTTP_TIMEOUT_SECS")
                .map(|v| v.clamp(10, 2 * 60 * 60))
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        );
        settings.log_max_lines = env_usize("LAUNCHPAD_LOG_MAX_LINES")
            .map(|v| v.clamp(100, 50_000))
            .unwrap_or(DEFAULT_LOG_MAX_LINES);
        settings
    }

    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }
}

fn absolute(p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        return p;
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_defaults() {
        let s = Settings::new("/tmp/srv");
        assert_eq!(s.work_dir, PathBuf::from("/tmp/srv"));
        assert_eq!(s.runtime_url, DEFAULT_RUNTIME_URL);
        assert!(s.artifact_mirror.is_none());
        assert_eq!(s.http_timeout, Duration::from_secs(900));
        assert_eq!(s.log_max_lines, 1000);
        assert_eq!(s.log_dir(), PathBuf::from("/tmp/srv/logs"));
    }

    #[test]
    fn absolute_keeps_absolute_paths() {
        assert_eq!(absolute(PathBuf::from("/a/b")), PathBuf::from("/a/b"));
        assert!(absolute(PathBuf::from("rel")).is_absolute());
    }
}
