use std::{
    collections::VecDeque,
    fmt,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use futures_util::Stream;
use launchpad_process::ProcessId;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

/// Where a console line came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSource {
    Launcher,
    Provision,
    Server(ProcessId),
    Relay(ProcessId),
}

impl fmt::Display for LineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineSource::Launcher => f.write_str("launcher"),
            LineSource::Provision => f.write_str("provision"),
            LineSource::Server(_) => f.write_str("server"),
            LineSource::Relay(id) => write!(f, "relay:{}", id.short()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleLine {
    pub source: LineSource,
    pub text: String,
}

impl fmt::Display for ConsoleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.text)
    }
}

/// Pull side of a line channel.
///
/// Lines arrive in the order the producer emitted them. Once every producer is
/// gone the stream yields `None` forever; it cannot be rewound or restarted.
#[derive(Debug)]
pub struct LineStream<T = String> {
    rx: mpsc::UnboundedReceiver<T>,
}

pub(crate) fn line_channel<T>() -> (mpsc::UnboundedSender<T>, LineStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, LineStream { rx })
}

impl<T> LineStream<T> {
    pub async fn next_line(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Non-blocking: the next line if one is already buffered.
    pub fn try_next_line(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Waits for the producers to finish and returns everything they emitted.
    pub async fn collect_all(mut self) -> Vec<T> {
        let mut out = Vec::new();
        while let Some(line) = self.rx.recv().await {
            out.push(line);
        }
        out
    }

    /// Hands each line to `out` until the producers finish or `stop` fires.
    ///
    /// After `stop`, lines already queued are still delivered; lines from
    /// producers that outlive the stop are not waited for.
    pub async fn drain_until<F>(mut self, mut stop: oneshot::Receiver<()>, mut out: F)
    where
        F: FnMut(T),
    {
        loop {
            tokio::select! {
                biased;
                line = self.rx.recv() => match line {
                    Some(line) => out(line),
                    None => return,
                },
                _ = &mut stop => break,
            }
        }
        while let Ok(line) = self.rx.try_recv() {
            out(line);
        }
    }
}

impl<T> Stream for LineStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug)]
pub struct ConsoleHistory {
    next_seq: u64,
    max_lines: usize,
    lines: VecDeque<(u64, ConsoleLine)>,
}

impl ConsoleHistory {
    pub fn new(max_lines: usize) -> Self {
        Self {
            next_seq: 1,
            max_lines: max_lines.max(1),
            lines: VecDeque::new(),
        }
    }

    fn push_line(&mut self, line: ConsoleLine) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.lines.push_back((seq, line));
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Lines after `cursor`, at most `limit` of them, plus the new cursor.
    /// A zero cursor returns the most recent `limit` lines.
    pub fn tail_after(&self, cursor: u64, limit: usize) -> (Vec<ConsoleLine>, u64) {
        if cursor == 0 {
            let start = self.lines.len().saturating_sub(limit);
            let mut out = Vec::new();
            let mut last = 0;
            for (seq, line) in self.lines.iter().skip(start) {
                out.push(line.clone());
                last = *seq;
            }
            return (out, last);
        }

        let mut out = Vec::new();
        let mut last = cursor;
        for (seq, line) in self.lines.iter() {
            if *seq > cursor {
                out.push(line.clone());
                last = *seq;
                if out.len() >= limit {
                    break;
                }
            }
        }
        (out, last)
    }
}

/// The operator console: hands out tagged sinks that all feed one stream.
#[derive(Debug, Clone)]
pub struct Console {
    tx: mpsc::UnboundedSender<ConsoleLine>,
    history: Arc<Mutex<ConsoleHistory>>,
}

pub fn channel(max_lines: usize) -> (Console, LineStream<ConsoleLine>) {
    let (tx, stream) = line_channel();
    let console = Console {
        tx,
        history: Arc::new(Mutex::new(ConsoleHistory::new(max_lines))),
    };
    (console, stream)
}

impl Console {
    pub fn sink(&self, source: LineSource) -> LineSink {
        LineSink {
            source,
            tx: self.tx.clone(),
            history: self.history.clone(),
        }
    }

    pub fn tail(&self, cursor: u64, limit: usize) -> (Vec<ConsoleLine>, u64) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .tail_after(cursor, limit)
    }
}

/// Push side used by provisioning, the supervisor forwarder and relays.
#[derive(Debug, Clone)]
pub struct LineSink {
    source: LineSource,
    tx: mpsc::UnboundedSender<ConsoleLine>,
    history: Arc<Mutex<ConsoleHistory>>,
}

impl LineSink {
    pub fn source(&self) -> &LineSource {
        &self.source
    }

    pub fn emit(&self, text: impl Into<String>) {
        let line = ConsoleLine {
            source: self.source.clone(),
            text: text.into(),
        };
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_line(line.clone());
        // A console nobody reads is not an error for the producer.
        let _ = self.tx.send(line);
    }

    /// Drains `lines` into this sink on a background task.
    pub fn forward(&self, mut lines: LineStream<String>) -> JoinHandle<()> {
        let sink = self.clone();
        tokio::spawn(async move {
            while let Some(line) = lines.next_line().await {
                sink.emit(line);
            }
        })
    }
}
