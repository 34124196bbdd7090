pub mod output;

use crate::bridge::error::{Error, Result};
use crate::bridge::{preview, Toggles};
use log::{debug, warn};
use output::{MiLine, MiResult};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

/// What a stop notification was about.
#[derive(Debug, Clone, PartialEq)]
pub enum StopEvent {
    /// `reason="breakpoint-hit"`; carries the gdb breakpoint number.
    Breakpoint(String),
    /// Any other stop (signal, exited, replay boundary); carries the reason.
    Other(String),
}

/// Blocking client for a gdb subprocess driven through the MI interpreter.
///
/// One synchronous operation (issue a command, get the parsed reply) plus an
/// asynchronous fan-out: a reader thread turns `*stopped` breakpoint-hit
/// records into [`StopEvent`]s on a channel. The stop raised by the one-shot
/// bootstrap breakpoint during attach is not delivered there; it completes
/// [`MiClient::wait_bootstrap`] instead.
pub struct MiClient {
    child: Option<Child>,
    writer: Box<dyn Write + Send>,
    results_rx: Receiver<MiResult>,
    stops_rx: Receiver<StopEvent>,
    bootstrap_rx: Receiver<()>,
    token: u64,
    toggles: Arc<Toggles>,
}

impl MiClient {
    /// Spawn gdb attached to the remote-serial endpoint of the replay session.
    pub fn start(gdb: &Path, remote_port: u16, image: &Path, toggles: Arc<Toggles>) -> Result<Self> {
        let args = [
            "-l".to_string(),
            "-1".to_string(),
            "-ex".to_string(),
            format!("target extended-remote :{remote_port}"),
            "--interpreter".to_string(),
            "mi".to_string(),
            image.display().to_string(),
        ];
        debug!(target: "mi", "starting {} {}", gdb.display(), args.join(" "));

        let mut child = Command::new(gdb)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Spawn("gdb", e))?;

        let stdout = child.stdout.take().ok_or(Error::MiClosed)?;
        let stdin = child.stdin.take().ok_or(Error::MiClosed)?;
        Ok(Self::from_transport_inner(
            BufReader::new(stdout),
            Box::new(stdin),
            Some(child),
            toggles,
        ))
    }

    /// Build a client over an arbitrary transport. The real session talks to
    /// the gdb child's stdio; tests feed scripted MI exchanges instead.
    pub fn from_transport<R, W>(reader: R, writer: W, toggles: Arc<Toggles>) -> Self
    where
        R: BufRead + Send + 'static,
        W: Write + Send + 'static,
    {
        Self::from_transport_inner(reader, Box::new(writer), None, toggles)
    }

    fn from_transport_inner<R>(
        reader: R,
        writer: Box<dyn Write + Send>,
        child: Option<Child>,
        toggles: Arc<Toggles>,
    ) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (results_tx, results_rx) = mpsc::channel();
        let (stops_tx, stops_rx) = mpsc::channel();
        let (bootstrap_tx, bootstrap_rx) = mpsc::sync_channel(1);

        let reader_toggles = Arc::clone(&toggles);
        thread::spawn(move || read_loop(reader, results_tx, stops_tx, bootstrap_tx, reader_toggles));

        MiClient {
            child,
            writer,
            results_rx,
            stops_rx,
            bootstrap_rx,
            token: 0,
            toggles,
        }
    }

    /// Issue one MI command and return its result record.
    ///
    /// `command` is the operation with its arguments already rendered, e.g.
    /// `break-insert -t -f --source retrace.c --line 91`.
    pub fn send(&mut self, command: &str) -> Result<MiResult> {
        self.token += 1;
        if self.toggles.verbose.load(Ordering::Relaxed) {
            println!("retrace -> gdb: {command}");
        }

        self.writer.write_all(format!("{}-{}\n", self.token, command).as_bytes())?;
        self.writer.flush()?;

        let result = self.results_rx.recv().map_err(|_| Error::MiClosed)?;
        if let Some(token) = result.token
            && token != self.token
        {
            warn!(target: "mi", "reply token {token} does not match command token {}", self.token);
        }

        if self.toggles.verbose.load(Ordering::Relaxed) {
            println!(
                "gdb -> retrace: ^{}{}",
                result.class,
                preview(&format!("{:?}", result.fields))
            );
        }
        Ok(result)
    }

    /// Issue a command that must complete with class `done`.
    pub fn send_ok(&mut self, command: &str) -> Result<MiResult> {
        let result = self.send(command)?;
        if result.class != "done" {
            let details = result
                .fields
                .get_str("msg")
                .unwrap_or(&result.class)
                .to_string();
            return Err(Error::MiCommand {
                command: command.to_string(),
                details,
            });
        }
        Ok(result)
    }

    /// Block until the next stop notification.
    pub fn wait_stop(&mut self) -> Result<StopEvent> {
        self.stops_rx.recv().map_err(|_| Error::MiClosed)
    }

    /// Block until the bootstrap breakpoint fires during attach.
    pub fn wait_bootstrap(&mut self) -> Result<()> {
        self.bootstrap_rx.recv().map_err(|_| Error::MiClosed)
    }

    /// Ask gdb to exit and reap the subprocess.
    pub fn exit(&mut self) {
        let _ = self.writer.write_all(b"-gdb-exit\n");
        let _ = self.writer.flush();
        if let Some(child) = self.child.as_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn read_loop<R: BufRead>(
    reader: R,
    results_tx: mpsc::Sender<MiResult>,
    stops_tx: mpsc::Sender<StopEvent>,
    bootstrap_tx: SyncSender<()>,
    toggles: Arc<Toggles>,
) {
    let mut seen_first_stop = false;

    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        let Some(parsed) = output::parse_line(&line) else {
            debug!(target: "mi", "ignoring non-mi line: {}", preview(&line));
            continue;
        };

        match parsed {
            MiLine::Result(result) => {
                if results_tx.send(result).is_err() {
                    break;
                }
            }
            MiLine::Exec(stop) if stop.class == "stopped" => {
                if toggles.gdb_notifications.load(Ordering::Relaxed) {
                    println!("{}", stop.fields.to_json());
                }

                let reason = stop.fields.get_str("reason").unwrap_or("unknown");
                let event = match stop.fields.get_str("bkptno") {
                    Some(no) if reason == "breakpoint-hit" => {
                        StopEvent::Breakpoint(no.to_string())
                    }
                    _ => StopEvent::Other(reason.to_string()),
                };

                // the very first breakpoint stop belongs to the bootstrap
                // breakpoint and is consumed by session startup
                if !seen_first_stop && matches!(event, StopEvent::Breakpoint(_)) {
                    seen_first_stop = true;
                    let _ = bootstrap_tx.send(());
                    continue;
                }

                if stops_tx.send(event).is_err() {
                    break;
                }
            }
            MiLine::Exec(rec) | MiLine::Status(rec) | MiLine::Notify(rec) => {
                if toggles.gdb_notifications.load(Ordering::Relaxed) {
                    println!("={},{}", rec.class, rec.fields.to_json());
                }
            }
            MiLine::Stream(_, text) => {
                debug!(target: "mi", "gdb: {}", preview(text.trim_end()));
            }
            MiLine::Prompt => {}
        }
    }

    debug!(target: "mi", "gdb output stream closed");
}
