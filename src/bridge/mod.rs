pub mod breakpoint;
pub mod error;
pub mod location;
pub mod mi;
pub mod probe;
pub mod replay;
pub mod step;

use crate::bridge::breakpoint::{Breakpoint, BreakpointKind, BreakpointRegistry};
use crate::bridge::location::LocationIndex;
use crate::bridge::mi::MiClient;
use crate::bridge::replay::Recorder;
use crate::dbgp::feature::FeatureMap;
use crate::weak_error;
use log::info;
use std::fmt;
use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

/// Name of the instrumentation source holding the stepping and bootstrap
/// lines, and the two well-known lines inside it. The stepping line is
/// executed once per script statement; the bootstrap line is reached once,
/// when the entry script is known.
pub(crate) const STEP_SOURCE: &str = "retrace.c";
pub(crate) const STEP_LINE: u32 = 99;
pub(crate) const BOOTSTRAP_LINE: u32 = 91;

/// Generated source with one breakpoint location per script file and per
/// stack level; the location index is built from it.
pub(crate) const BREAK_SOURCE: &str = "retrace_break.c";

/// The master stepping breakpoint is the first breakpoint of the gdb session.
pub(crate) const MASTER_BP: &str = "1";

/// Engine execution state as reported to the DBGp client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Starting,
    Running,
    Break,
    Stopping,
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Status::Starting => "starting",
            Status::Running => "running",
            Status::Break => "break",
            Status::Stopping => "stopping",
            Status::Stopped => "stopped",
        };
        f.write_str(word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Ok,
    Error,
    Aborted,
    Exception,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let word = match self {
            Reason::Ok => "ok",
            Reason::Error => "error",
            Reason::Aborted => "aborted",
            Reason::Exception => "exception",
        };
        f.write_str(word)
    }
}

/// Runtime toggles flipped from the interactive prompt and read at logging
/// sites across threads.
#[derive(Default)]
pub struct Toggles {
    /// Echo protocol traffic (IDE and gdb) to the terminal.
    pub verbose: AtomicBool,
    /// Echo unsolicited gdb notifications to the terminal.
    pub gdb_notifications: AtomicBool,
}

/// A script-level position, as reported in `break` responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub filename: String,
    pub line: i64,
}

/// The replay session: owner of the recorder and gdb subprocesses, the
/// breakpoint registry, the location index and the DBGp feature map.
///
/// Everything the bridge coordinates hangs off this struct; the only datum
/// shared with another thread is the direction flag (the prompt thread flips
/// it, the dispatcher latches it once per request).
pub struct Session {
    pub(crate) mi: MiClient,
    pub(crate) breakpoints: BreakpointRegistry,
    pub(crate) index: LocationIndex,
    pub(crate) features: FeatureMap,
    pub(crate) entry_file: String,
    last_sequence: i64,
    pub(crate) status: Status,
    pub(crate) reason: Reason,
    direction: Arc<Mutex<bool>>,
    recorder: Option<Recorder>,
}

impl Session {
    /// Assemble a session around an attached MI client. The master stepping
    /// breakpoint must already exist in gdb under number 1; it is mirrored
    /// here as a disabled internal entry.
    pub fn new(mi: MiClient, index: LocationIndex, entry_file: String, recorder: Option<Recorder>) -> Self {
        let mut breakpoints = BreakpointRegistry::default();
        breakpoints.track(Breakpoint {
            number: MASTER_BP.to_string(),
            kind: BreakpointKind::Master,
            enabled: false,
        });

        Session {
            mi,
            breakpoints,
            index,
            features: FeatureMap::new(),
            entry_file,
            last_sequence: 0,
            status: Status::Starting,
            reason: Reason::Ok,
            direction: Arc::new(Mutex::new(false)),
            recorder,
        }
    }

    pub fn entry_file(&self) -> &str {
        &self.entry_file
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// Shared handle to the direction flag for the prompt thread.
    pub fn direction_handle(&self) -> Arc<Mutex<bool>> {
        Arc::clone(&self.direction)
    }

    /// Copy of the direction flag, taken once at the start of a request and
    /// stable for its whole lifetime.
    pub fn latched_direction(&self) -> bool {
        *self.direction.lock().expect("direction flag poisoned")
    }

    /// Record the sequence number of a request; a number at or below the last
    /// seen one is a protocol violation.
    pub fn accept_sequence(&mut self, sequence: i64) -> error::Result<()> {
        if sequence <= self.last_sequence {
            return Err(error::Error::StaleSequence(sequence));
        }
        self.last_sequence = sequence;
        Ok(())
    }

    /// Escape hatch for the prompt: pass one raw MI command straight through.
    pub fn raw_mi(&mut self, command: &str) -> error::Result<mi::output::MiResult> {
        self.mi.send(command)
    }

    /// Orderly shutdown: interrupt the recorder through its terminal, take
    /// gdb down, await the recorder. Returns the recorder's exit code when
    /// known.
    pub fn teardown(mut self) -> i32 {
        self.status = Status::Stopping;
        info!(target: "bridge", "tearing the replay session down");

        if let Some(recorder) = self.recorder.as_mut() {
            // Ctrl+C for the replay session
            _ = weak_error!(recorder.pty.write_all(&[3]), "recorder interrupt");
        }

        self.mi.exit();

        let mut code = 0;
        if let Some(mut recorder) = self.recorder.take() {
            if let Some(status) = weak_error!(recorder.child.wait(), "await recorder") {
                code = status.code().unwrap_or(0);
            }
        }
        code
    }
}

/// Clip long protocol payloads for terminal echo.
pub(crate) fn preview(s: &str) -> String {
    const LIMIT: usize = 300;
    if s.chars().count() <= LIMIT {
        s.to_string()
    } else {
        let clipped: String = s.chars().take(LIMIT).collect();
        format!("{clipped}...")
    }
}
