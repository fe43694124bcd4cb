use std::path::PathBuf;

use launchpad_process::{ProcessId, ProcessStatus};
use tokio::task::JoinHandle;

use crate::{
    catalog::ServerConfig,
    child::Interpreter,
    console::{Console, LineSource},
    launch_script::ScriptFlavor,
    provision::{ProvisionError, ProvisionedServerDirectory, Provisioner},
    relay::CommandRelay,
    report::format_error_chain,
    settings::Settings,
    supervisor::{SupervisedProcess, Supervisor},
};

/// Everything the operator can do, wired to one console.
///
/// Long-running work happens on background tasks; every method returns
/// promptly and reports progress and failures as console lines.
#[derive(Debug, Clone)]
pub struct Launcher {
    console: Console,
    provisioner: Provisioner,
    supervisor: Supervisor,
    relay: CommandRelay,
}

impl Launcher {
    pub fn new(settings: Settings, console: Console) -> Result<Self, ProvisionError> {
        let interpreter = Interpreter::native();
        let flavor = ScriptFlavor::native();
        Self::with_platform(settings, console, interpreter, flavor)
    }

    pub fn with_platform(
        settings: Settings,
        console: Console,
        interpreter: Interpreter,
        flavor: ScriptFlavor,
    ) -> Result<Self, ProvisionError> {
        let relay = CommandRelay::allow_arbitrary_commands(interpreter.clone())
            .in_dir(settings.work_dir.clone());
        let provisioner = Provisioner::new(settings)?.with_script_flavor(flavor);
        Ok(Self {
            console,
            provisioner,
            supervisor: Supervisor::new(interpreter),
            relay,
        })
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn script_path(&self) -> PathBuf {
        self.provisioner.launch_script_path()
    }

    /// Provisions in the background. The outcome also reaches the console.
    pub fn create(
        &self,
        config: ServerConfig,
    ) -> JoinHandle<Result<ProvisionedServerDirectory, ProvisionError>> {
        let provisioner = self.provisioner.clone();
        let sink = self.console.sink(LineSource::Provision);
        sink.emit(format!(
            "creating {} server with {} GiB",
            config.tool(),
            config.ram_gigabytes()
        ));
        tokio::spawn(async move { provisioner.provision(&config, &sink).await })
    }

    /// Starts the provisioned launch script and forwards its output.
    pub fn start(&self) -> Option<SupervisedProcess> {
        let launcher = self.console.sink(LineSource::Launcher);
        if let Some(prev) = self.supervisor.current()
            && prev.is_alive()
        {
            launcher.emit(format!(
                "server {} is still running; starting another one",
                prev.id().short()
            ));
        }

        let script = self.script_path();
        let (process, lines) = match self.supervisor.start(&script) {
            Ok(v) => v,
            Err(err) => {
                launcher.emit(format!("error: {}", format_error_chain(&err)));
                return None;
            }
        };

        let sink = self.console.sink(LineSource::Server(process.id().clone()));
        sink.emit(match process.pid() {
            Some(pid) => format!("started {} (pid {pid})", script.display()),
            None => format!("started {}", script.display()),
        });
        let forwarding = sink.forward(lines);
        let watched = process.clone();
        tokio::spawn(async move {
            let _ = forwarding.await;
            let status = watched.wait().await;
            sink.emit(status.message.unwrap_or_else(|| "exited".to_string()));
        });
        Some(process)
    }

    /// Relays `command` to the host shell. The echo and all output carry the
    /// invocation's own tag.
    pub fn exec(&self, command: &str) -> Option<ProcessId> {
        match self.relay.run(command) {
            Ok(invocation) => {
                let id = invocation.id().clone();
                let sink = self.console.sink(LineSource::Relay(id.clone()));
                sink.emit(format!("> {command}"));
                let (_handle, lines) = invocation.into_parts();
                sink.forward(lines);
                Some(id)
            }
            Err(err) => {
                let sink = self.console.sink(LineSource::Launcher);
                sink.emit(format!("> {command}"));
                sink.emit(format!("error: {}", format_error_chain(&err)));
                None
            }
        }
    }

    pub fn status(&self) -> Option<ProcessStatus> {
        self.supervisor.current().map(|p| p.status())
    }

    /// Kills the tracked server. `false` if there is none or it already stopped.
    pub fn kill(&self) -> bool {
        let Some(process) = self.supervisor.current() else {
            return false;
        };
        let delivered = process.kill();
        if delivered {
            self.console
                .sink(LineSource::Launcher)
                .emit(format!("killing server {}", process.id().short()));
        }
        delivered
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use launchpad_process::ProcessState;

    use super::*;
    use crate::{
        catalog::ServerTool,
        console::{self, ConsoleLine, LineStream},
        testutil::{self, Entry},
    };

    async fn next_matching(
        stream: &mut LineStream<ConsoleLine>,
        pred: impl Fn(&ConsoleLine) -> bool,
    ) -> ConsoleLine {
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let line = stream.next_line().await.expect("console closed");
                if pred(&line) {
                    return line;
                }
            }
        })
        .await
        .expect("timed out waiting for console line")
    }

    fn launcher(dir: &std::path::Path) -> (Launcher, LineStream<ConsoleLine>) {
        let (console, stream) = console::channel(1000);
        let launcher = Launcher::with_platform(
            Settings::new(dir.join("server")),
            console,
            Interpreter::posix(),
            ScriptFlavor::Shell,
        )
        .unwrap();
        (launcher, stream)
    }

    #[tokio::test]
    async fn start_before_create_reports_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (launcher, mut stream) = launcher(tmp.path());

        assert!(launcher.start().is_none());
        let line = next_matching(&mut stream, |l| l.text.starts_with("error:")).await;
        assert_eq!(line.source, LineSource::Launcher);
        assert!(line.text.contains("start_server.sh"), "{}", line.text);
        assert!(launcher.status().is_none());
        assert!(!launcher.kill());
    }

    #[tokio::test]
    async fn start_forwards_server_output_and_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let (launcher, mut stream) = launcher(tmp.path());
        let script = launcher.script_path();
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "#!/bin/sh\necho Done (1.2s)!\n").unwrap();

        let process = launcher.start().unwrap();
        let id = process.id().clone();

        let line = next_matching(&mut stream, |l| l.text == "Done (1.2s)!").await;
        assert_eq!(line.source, LineSource::Server(id.clone()));
        let line = next_matching(&mut stream, |l| l.text.starts_with("exited")).await;
        assert_eq!(line.text, "exited with code 0");
        assert_eq!(launcher.status().unwrap().state, ProcessState::Exited);
    }

    #[tokio::test]
    async fn kill_stops_the_server() {
        let tmp = tempfile::tempdir().unwrap();
        let (launcher, mut stream) = launcher(tmp.path());
        let script = launcher.script_path();
        std::fs::create_dir_all(script.parent().unwrap()).unwrap();
        std::fs::write(&script, "#!/bin/sh\necho up\nsleep 30\n").unwrap();

        let process = launcher.start().unwrap();
        next_matching(&mut stream, |l| l.text == "up").await;
        assert!(launcher.kill());

        let status = tokio::time::timeout(Duration::from_secs(10), process.wait())
            .await
            .unwrap();
        assert_eq!(status.state, ProcessState::Killed);
        next_matching(&mut stream, |l| l.text == "killed").await;
    }

    #[tokio::test]
    async fn exec_tags_echo_and_output_per_invocation() {
        let tmp = tempfile::tempdir().unwrap();
        let (launcher, mut stream) = launcher(tmp.path());

        let id = launcher.exec("echo hello").unwrap();

        let echo = next_matching(&mut stream, |l| l.text == "> echo hello").await;
        assert_eq!(echo.source, LineSource::Relay(id.clone()));
        let out = next_matching(&mut stream, |l| l.text == "hello").await;
        assert_eq!(out.source, LineSource::Relay(id));
    }

    #[tokio::test]
    async fn concurrent_exec_output_interleaves_but_keeps_per_command_order() {
        let tmp = tempfile::tempdir().unwrap();
        let (launcher, stream) = launcher(tmp.path());
        let paced = |tag: &str| format!("for i in 1 2 3 4; do echo {tag}$i; sleep 0.1; done");

        let a = launcher.exec(&paced("a")).unwrap();
        let b = launcher.exec(&paced("b")).unwrap();
        drop(launcher);
        let lines = tokio::time::timeout(Duration::from_secs(10), stream.collect_all())
            .await
            .unwrap();

        let of = |id: &ProcessId| -> Vec<&str> {
            lines
                .iter()
                .filter(|l| l.source == LineSource::Relay(id.clone()))
                .map(|l| l.text.as_str())
                .collect()
        };
        let echo_a = format!("> {}", paced("a"));
        let echo_b = format!("> {}", paced("b"));
        assert_eq!(of(&a), [echo_a.as_str(), "a1", "a2", "a3", "a4"]);
        assert_eq!(of(&b), [echo_b.as_str(), "b1", "b2", "b3", "b4"]);

        // Both commands were live at once, so the shared stream mixes them.
        let pos = |text: &str| lines.iter().position(|l| l.text == text).unwrap();
        assert!(pos("b1") < pos("a4"), "{lines:?}");
        assert!(pos("a1") < pos("b4"), "{lines:?}");
    }

    #[tokio::test]
    async fn create_then_start_runs_the_generated_script() {
        let base = testutil::serve_files(vec![
            (
                "/runtime/java-runtime.zip",
                testutil::zip_bytes(&[Entry::Executable(
                    "jdk/bin/java",
                    b"#!/bin/sh\necho \"fake java $*\"\n",
                )]),
            ),
            ("/jars/spigot-1.19.4.jar", b"jar".to_vec()),
        ])
        .await;
        let tmp = tempfile::tempdir().unwrap();
        let (console, mut stream) = console::channel(1000);
        let mut settings = Settings::new(tmp.path().join("server"));
        settings.runtime_url = format!("{base}/runtime/java-runtime.zip");
        settings.artifact_mirror = Some(format!("{base}/jars"));
        let launcher = Launcher::with_platform(
            settings,
            console,
            Interpreter::posix(),
            ScriptFlavor::Shell,
        )
        .unwrap();

        let config = ServerConfig::new(ServerTool::Spigot, 6).unwrap();
        launcher.create(config).await.unwrap().unwrap();
        next_matching(&mut stream, |l| l.text == "server created").await;

        launcher.start().unwrap();
        let line = next_matching(&mut stream, |l| l.text.starts_with("fake java")).await;
        assert_eq!(line.text, "fake java -Xmx6G -Xms6G -jar server.jar");
    }
}
