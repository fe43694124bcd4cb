use anyhow::Context;
use launchpad_agent::{
    Launcher, Settings,
    console::{self, LineSource},
    operator::{HELP, OperatorCommand},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::oneshot,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(settings: &Settings) -> anyhow::Result<WorkerGuard> {
    let dir = settings.log_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("create log dir {}", dir.display()))?;
    let (file, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&dir, "launchpad.log"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(EnvFilter::from_default_env()),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(file)
                .with_filter(EnvFilter::new("info")),
        )
        .init();
    Ok(guard)
}

/// Returns `false` when the operator asked to leave.
fn dispatch(launcher: &Launcher, command: OperatorCommand) -> bool {
    let say = |text: String| launcher.console().sink(LineSource::Launcher).emit(text);
    match command {
        OperatorCommand::Create(config) => {
            // The task reports its own outcome on the console.
            drop(launcher.create(config));
        }
        OperatorCommand::Start => {
            launcher.start();
        }
        OperatorCommand::Status => match launcher.status() {
            Some(status) => match serde_json::to_string(&status) {
                Ok(json) => say(json),
                Err(e) => say(format!("error: {e}")),
            },
            None => say("no server has been started".to_string()),
        },
        OperatorCommand::Kill => {
            if !launcher.kill() {
                say("no running server to kill".to_string());
            }
        }
        OperatorCommand::Help => say(HELP.to_string()),
        OperatorCommand::Relay(text) => {
            launcher.exec(&text);
        }
        OperatorCommand::Empty => {}
        OperatorCommand::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    let _guard = init_tracing(&settings)?;
    tracing::info!(work_dir = %settings.work_dir.display(), "launchpad starting");

    let (console, lines) = console::channel(settings.log_max_lines);
    let launcher = Launcher::new(settings, console).context("initialize launcher")?;

    let (stop_printer, stop_rx) = oneshot::channel();
    let printer = tokio::spawn(lines.drain_until(stop_rx, |line| println!("{line}")));

    println!("{HELP}");
    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = input.next_line() => line.context("read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let keep_going = match OperatorCommand::parse(&line) {
            Ok(command) => dispatch(&launcher, command),
            Err(e) => {
                launcher
                    .console()
                    .sink(LineSource::Launcher)
                    .emit(format!("error: {e}"));
                true
            }
        };
        if !keep_going {
            break;
        }
    }

    tracing::info!("launchpad exiting");
    // A running server keeps its forwarder alive, so stop rather than wait for EOF.
    drop(launcher);
    let _ = stop_printer.send(());
    printer.await.context("console printer")?;
    Ok(())
}
