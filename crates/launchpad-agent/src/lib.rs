pub mod catalog;
pub mod child;
pub mod console;
pub mod extract;
pub mod fetch;
pub mod launch_script;
pub mod launcher;
pub mod operator;
pub mod provision;
pub mod relay;
pub mod report;
pub mod settings;
pub mod supervisor;

#[cfg(test)]
mod testutil;

pub use catalog::{ConfigError, DownloadTarget, ServerConfig, ServerTool};
pub use launcher::Launcher;
pub use provision::{ProvisionError, ProvisionedServerDirectory, Provisioner};
pub use settings::Settings;
