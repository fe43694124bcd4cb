use std::path::{Component, Path, PathBuf};

pub const SERVER_JAR: &str = "server.jar";

/// How deep below the server directory the bundled runtime is searched for.
const RUNTIME_SEARCH_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptFlavor {
    /// `start_server.bat`, run through `cmd.exe`.
    Batch,
    /// `start_server.sh`, run through `sh`.
    Shell,
}

impl ScriptFlavor {
    pub fn native() -> Self {
        if cfg!(windows) {
            ScriptFlavor::Batch
        } else {
            ScriptFlavor::Shell
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ScriptFlavor::Batch => "start_server.bat",
            ScriptFlavor::Shell => "start_server.sh",
        }
    }

    fn java_file_name(self) -> &'static str {
        match self {
            ScriptFlavor::Batch => "java.exe",
            ScriptFlavor::Shell => "java",
        }
    }
}

/// The one-line start script written next to `server.jar`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchScript {
    flavor: ScriptFlavor,
    java: String,
    ram_gigabytes: u8,
}

impl LaunchScript {
    /// A script that runs whatever `java` is on `PATH`.
    pub fn new(flavor: ScriptFlavor, ram_gigabytes: u8) -> Self {
        Self {
            flavor,
            java: "java".to_string(),
            ram_gigabytes,
        }
    }

    /// Points the script at a runtime binary, given relative to the script's directory.
    pub fn with_runtime(mut self, java_rel: &Path) -> Self {
        let sep = match self.flavor {
            ScriptFlavor::Batch => "\\",
            ScriptFlavor::Shell => "/",
        };
        let parts: Vec<String> = java_rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        let joined = parts.join(sep);
        self.java = match self.flavor {
            ScriptFlavor::Batch if joined.contains(' ') => format!("\"{joined}\""),
            ScriptFlavor::Shell if !is_shell_safe(&joined) => {
                format!("'{}'", joined.replace('\'', r"'\''"))
            }
            _ => joined,
        };
        self
    }

    pub fn flavor(&self) -> ScriptFlavor {
        self.flavor
    }

    pub fn java_command_line(&self) -> String {
        let n = self.ram_gigabytes;
        format!("{} -Xmx{n}G -Xms{n}G -jar {SERVER_JAR}", self.java)
    }

    pub fn render(&self) -> String {
        match self.flavor {
            ScriptFlavor::Batch => format!("@echo off\n{}", self.java_command_line()),
            ScriptFlavor::Shell => format!("#!/bin/sh\n{}\n", self.java_command_line()),
        }
    }

    /// Writes the script into `dir` (replacing any previous one) and returns its path.
    pub fn write(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(self.flavor.file_name());
        let tmp = dir.join(format!("{}.tmp", self.flavor.file_name()));
        std::fs::write(&tmp, self.render().as_bytes())?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
        }
        std::fs::rename(&tmp, &path)?;
        Ok(path)
    }
}

/// Characters `sh` takes literally in an unquoted word.
fn is_shell_safe(word: &str) -> bool {
    word.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ','))
}

fn collect_named_files(root: &Path, file_name: &str, depth: usize, out: &mut Vec<PathBuf>) {
    let rd = match std::fs::read_dir(root) {
        Ok(v) => v,
        Err(_) => return,
    };
    for e in rd.flatten() {
        let path = e.path();
        let meta = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(_) => continue,
        };
        if meta.file_type().is_symlink() {
            continue;
        }
        if meta.is_dir() {
            if depth > 0 {
                collect_named_files(&path, file_name, depth - 1, out);
            }
            continue;
        }
        if meta.is_file()
            && path
                .file_name()
                .and_then(|s| s.to_str())
                .is_some_and(|n| n == file_name)
        {
            out.push(path);
        }
    }
}

fn best_candidate(mut candidates: Vec<PathBuf>) -> Option<PathBuf> {
    candidates.sort_by(|a, b| {
        let la = a.components().count();
        let lb = b.components().count();
        la.cmp(&lb)
            .then_with(|| a.to_string_lossy().cmp(&b.to_string_lossy()))
    });
    candidates.into_iter().next()
}

/// Finds a `bin/java` (or `bin\java.exe`) unpacked below `root`, shallowest first,
/// and returns it relative to `root`.
pub fn find_runtime_java(root: &Path, flavor: ScriptFlavor) -> Option<PathBuf> {
    let mut found = Vec::new();
    collect_named_files(root, flavor.java_file_name(), RUNTIME_SEARCH_DEPTH, &mut found);
    found.retain(|p| {
        p.parent()
            .and_then(|d| d.file_name())
            .is_some_and(|d| d == "bin")
    });
    let best = best_candidate(found)?;
    best.strip_prefix(root).ok().map(Path::to_path_buf)
}
