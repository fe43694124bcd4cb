use std::{fmt, str::FromStr};

pub const MIN_RAM_GIGABYTES: u8 = 1;
pub const MAX_RAM_GIGABYTES: u8 = 16;
pub const DEFAULT_RAM_GIGABYTES: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown server tool: {0} (expected one of Bukkit, Spigot, Paper, Forge, Sponge, Mohist)")]
    UnknownTool(String),

    #[error("ram must be between 1 and 16 GiB (got {0})")]
    RamOutOfRange(u32),
}

/// Server distributions the launcher knows how to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ServerTool {
    Bukkit,
    Spigot,
    Paper,
    Forge,
    Sponge,
    Mohist,
}

impl ServerTool {
    pub const ALL: [ServerTool; 6] = [
        ServerTool::Bukkit,
        ServerTool::Spigot,
        ServerTool::Paper,
        ServerTool::Forge,
        ServerTool::Sponge,
        ServerTool::Mohist,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ServerTool::Bukkit => "Bukkit",
            ServerTool::Spigot => "Spigot",
            ServerTool::Paper => "Paper",
            ServerTool::Forge => "Forge",
            ServerTool::Sponge => "Sponge",
            ServerTool::Mohist => "Mohist",
        }
    }

    /// Upstream download location of the 1.19.4 build for this tool.
    ///
    /// Forge ships an installer jar rather than a runnable server; it is staged
    /// the same way as the others.
    pub fn artifact_url(self) -> &'static str {
        match self {
            ServerTool::Bukkit => {
                "https://download.getbukkit.org/craftbukkit/craftbukkit-1.19.4.jar"
            }
            ServerTool::Spigot => "https://download.getbukkit.org/spigot/spigot-1.19.4.jar",
            ServerTool::Paper => {
                "https://api.papermc.io/v2/projects/paper/versions/1.19.4/builds/545/downloads/paper-1.19.4-545.jar"
            }
            ServerTool::Forge => {
                "https://maven.minecraftforge.net/net/minecraftforge/forge/1.19.4-45.0.66/forge-1.19.4-45.0.66-installer.jar"
            }
            ServerTool::Sponge => {
                "https://repo.spongepowered.org/repository/maven-releases/org/spongepowered/spongevanilla/1.19.4-10.0.0-RC1341/spongevanilla-1.19.4-10.0.0-RC1341-universal.jar"
            }
            ServerTool::Mohist => "https://mohistmc.com/builds/1.19.4/mohist-1.19.4-120-server.jar",
        }
    }

    pub fn download_target(self) -> DownloadTarget {
        DownloadTarget::from_url(self.artifact_url())
    }

    /// Like [`ServerTool::download_target`], but fetched from `mirror` when one is configured.
    /// The destination file name is unaffected.
    pub fn download_target_via(self, mirror: Option<&str>) -> DownloadTarget {
        let upstream = self.download_target();
        match mirror {
            Some(base) => DownloadTarget {
                url: format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    upstream.destination_file_name
                ),
                destination_file_name: upstream.destination_file_name,
            },
            None => upstream,
        }
    }
}

impl fmt::Display for ServerTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ServerTool {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ServerTool::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownTool(wanted.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    pub url: String,
    pub destination_file_name: String,
}

impl DownloadTarget {
    /// The destination is the URL's final path segment (query and fragment ignored).
    pub fn from_url(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let file_name = path.rsplit('/').next().unwrap_or(path);
        Self {
            url: url.to_string(),
            destination_file_name: file_name.to_string(),
        }
    }
}

/// What the operator picked: which tool, and how much heap to give it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    tool: ServerTool,
    ram_gigabytes: u8,
}

impl ServerConfig {
    pub fn new(tool: ServerTool, ram_gigabytes: u32) -> Result<Self, ConfigError> {
        let in_range = (u32::from(MIN_RAM_GIGABYTES)..=u32::from(MAX_RAM_GIGABYTES))
            .contains(&ram_gigabytes);
        if !in_range {
            return Err(ConfigError::RamOutOfRange(ram_gigabytes));
        }
        Ok(Self {
            tool,
            ram_gigabytes: ram_gigabytes as u8,
        })
    }

    pub fn with_default_ram(tool: ServerTool) -> Self {
        Self {
            tool,
            ram_gigabytes: DEFAULT_RAM_GIGABYTES,
        }
    }

    pub fn tool(&self) -> ServerTool {
        self.tool
    }

    pub fn ram_gigabytes(&self) -> u8 {
        self.ram_gigabytes
    }
}
