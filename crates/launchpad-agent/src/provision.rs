use std::path::{Path, PathBuf};

use crate::{
    catalog::{ServerConfig, ServerTool},
    console::LineSink,
    extract::{ExtractError, extract},
    fetch::{FetchError, fetch, http_client},
    launch_script::{LaunchScript, SERVER_JAR, ScriptFlavor, find_runtime_java},
    report::format_error_chain,
    settings::Settings,
};

pub const RUNTIME_ARCHIVE: &str = "java-runtime.zip";
pub const LICENSE_FILE: &str = "eula.txt";
pub const LICENSE_CONTENT: &str = "eula=true";

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("build http client")]
    ClientSetup(#[source] reqwest::Error),

    #[error("java runtime download failed")]
    RuntimeFetchFailed(#[source] FetchError),

    #[error("java runtime extraction failed")]
    RuntimeExtractFailed(#[source] ExtractError),

    #[error("{tool} download failed")]
    ArtifactFetchFailed {
        tool: ServerTool,
        #[source]
        source: FetchError,
    },

    #[error("stage {from} as server.jar")]
    StagingFailed {
        from: String,
        #[source]
        source: std::io::Error,
    },

    #[error("write launch script")]
    ScriptWriteFailed(#[source] std::io::Error),

    #[error("write eula.txt")]
    LicenseWriteFailed(#[source] std::io::Error),
}

/// Files left behind by a successful provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedServerDirectory {
    pub root: PathBuf,
    pub server_jar: PathBuf,
    pub launch_script: PathBuf,
    pub license_file: PathBuf,
    /// Bundled runtime binary the script points at, relative to `root`.
    pub runtime_java: Option<PathBuf>,
}

/// Lays out a runnable server directory: runtime, server jar, start script, EULA.
#[derive(Debug, Clone)]
pub struct Provisioner {
    settings: Settings,
    client: reqwest::Client,
    flavor: ScriptFlavor,
}

impl Provisioner {
    pub fn new(settings: Settings) -> Result<Self, ProvisionError> {
        let client = http_client(settings.http_timeout).map_err(ProvisionError::ClientSetup)?;
        Ok(Self {
            settings,
            client,
            flavor: ScriptFlavor::native(),
        })
    }

    pub fn with_script_flavor(mut self, flavor: ScriptFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Where the start script lands once provisioning succeeds.
    pub fn launch_script_path(&self) -> PathBuf {
        self.settings.work_dir.join(self.flavor.file_name())
    }

    /// Runs every step in order, stopping at the first failure.
    ///
    /// Progress goes to `notify`; on failure the full error chain is emitted
    /// once before returning. Nothing is rolled back: files written by earlier
    /// steps stay on disk, and re-running overwrites them.
    pub async fn provision(
        &self,
        config: &ServerConfig,
        notify: &LineSink,
    ) -> Result<ProvisionedServerDirectory, ProvisionError> {
        match self.run_steps(config, notify).await {
            Ok(dir) => {
                tracing::info!(tool = %config.tool(), root = %dir.root.display(), "server created");
                notify.emit("server created");
                Ok(dir)
            }
            Err(err) => {
                let chain = format_error_chain(&err);
                tracing::warn!(tool = %config.tool(), error = %chain, "provisioning failed");
                notify.emit(format!("error: {chain}"));
                Err(err)
            }
        }
    }

    async fn run_steps(
        &self,
        config: &ServerConfig,
        notify: &LineSink,
    ) -> Result<ProvisionedServerDirectory, ProvisionError> {
        let root = self.settings.work_dir.clone();

        let archive = root.join(RUNTIME_ARCHIVE);
        notify.emit(format!("downloading java runtime from {}", self.settings.runtime_url));
        let n = fetch(&self.client, &self.settings.runtime_url, &archive)
            .await
            .map_err(ProvisionError::RuntimeFetchFailed)?;
        notify.emit(format!("downloaded {RUNTIME_ARCHIVE} ({n} bytes)"));

        notify.emit(format!("extracting {RUNTIME_ARCHIVE}"));
        let report = extract_blocking(archive, root.clone())
            .await
            .map_err(ProvisionError::RuntimeExtractFailed)?;
        notify.emit(format!(
            "extracted {} files ({} bytes)",
            report.files_written, report.bytes_written
        ));

        let tool = config.tool();
        let target = tool.download_target_via(self.settings.artifact_mirror.as_deref());
        let artifact = root.join(&target.destination_file_name);
        notify.emit(format!("downloading {tool} from {}", target.url));
        let n = fetch(&self.client, &target.url, &artifact)
            .await
            .map_err(|source| ProvisionError::ArtifactFetchFailed { tool, source })?;
        notify.emit(format!("downloaded {} ({n} bytes)", target.destination_file_name));

        let server_jar = root.join(SERVER_JAR);
        notify.emit(format!("staging {} as {SERVER_JAR}", target.destination_file_name));
        stage(&artifact, &server_jar).await.map_err(|source| {
            ProvisionError::StagingFailed {
                from: target.destination_file_name.clone(),
                source,
            }
        })?;
        notify.emit(format!("staged {SERVER_JAR}"));

        let runtime_java = find_runtime_java(&root, self.flavor);
        let mut script = LaunchScript::new(self.flavor, config.ram_gigabytes());
        if let Some(java) = runtime_java.as_deref() {
            script = script.with_runtime(java);
        }
        notify.emit(format!(
            "writing {} ({})",
            self.flavor.file_name(),
            script.java_command_line()
        ));
        let launch_script = {
            let root = root.clone();
            tokio::task::spawn_blocking(move || script.write(&root))
                .await
                .map_err(std::io::Error::other)
                .and_then(|r| r)
                .map_err(ProvisionError::ScriptWriteFailed)?
        };
        notify.emit(format!("wrote {}", self.flavor.file_name()));

        let license_file = root.join(LICENSE_FILE);
        notify.emit(format!("accepting EULA ({LICENSE_FILE})"));
        tokio::fs::write(&license_file, LICENSE_CONTENT)
            .await
            .map_err(ProvisionError::LicenseWriteFailed)?;
        notify.emit(format!("wrote {LICENSE_FILE}"));

        Ok(ProvisionedServerDirectory {
            root,
            server_jar,
            launch_script,
            license_file,
            runtime_java,
        })
    }
}

async fn extract_blocking(
    archive: PathBuf,
    dest: PathBuf,
) -> Result<crate::extract::ExtractReport, ExtractError> {
    tokio::task::spawn_blocking(move || extract(&archive, &dest))
        .await
        .map_err(|e| ExtractError::Io {
            entry: RUNTIME_ARCHIVE.to_string(),
            source: std::io::Error::other(e),
        })?
}

/// Moves the downloaded artifact onto `server.jar`, replacing an older one.
async fn stage(artifact: &Path, server_jar: &Path) -> std::io::Result<()> {
    if artifact == server_jar {
        return Ok(());
    }
    tokio::fs::rename(artifact, server_jar).await
}
