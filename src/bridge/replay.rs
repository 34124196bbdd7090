//! Startup of the replay session: the recorder under a pseudo-terminal, gdb
//! attached to its remote-serial endpoint, and the initial breakpoint
//! handshake that yields the entry script.

use crate::bridge::breakpoint::breakpoint_number;
use crate::bridge::error::{Error, Result};
use crate::bridge::location::LocationIndex;
use crate::bridge::mi::MiClient;
use crate::bridge::{
    Session, Toggles, BOOTSTRAP_LINE, BREAK_SOURCE, MASTER_BP, STEP_LINE, STEP_SOURCE,
};
use log::{debug, info};
use nix::pty::openpty;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Deadline for spotting the gdb connection string in the recorder output.
const ENDPOINT_DEADLINE: Duration = Duration::from_secs(5);

pub struct ReplayOptions {
    /// Recording to replay; the recorder picks its latest trace when empty.
    pub trace_dir: Option<PathBuf>,
    /// Directory holding `ext/retrace/` with the generated sources.
    pub install_location: PathBuf,
    pub rr: PathBuf,
    pub gdb: PathBuf,
    /// Port of the remote-serial endpoint the recorder opens for gdb.
    pub gdb_remote_port: u16,
}

/// The recorder subprocess and the master side of its controlling terminal.
/// The terminal is written to exactly once, to interrupt the recorder at
/// teardown.
pub struct Recorder {
    pub(crate) child: Child,
    pub(crate) pty: File,
}

/// Run the startup sequence and hand back a session stopped at the entry
/// script, ready to serve the IDE.
pub fn start(options: &ReplayOptions, toggles: Arc<Toggles>) -> Result<Session> {
    let break_file = options
        .install_location
        .join("ext")
        .join("retrace")
        .join(BREAK_SOURCE);
    let index = LocationIndex::from_file(&break_file)?;

    let (mut child, master) = spawn_recorder(options)?;
    info!(target: "bridge", "replay session started");

    let image = match scrape_endpoint(&master) {
        Ok(image) => image,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };
    debug!(target: "bridge", "gdb will open the hardlinked image {}", image.display());

    // keep mirroring recorder output now that the endpoint line was seen
    let mut mirror = master.try_clone()?;
    thread::spawn(move || {
        let _ = std::io::copy(&mut mirror, &mut std::io::stdout());
    });

    let mut mi = match MiClient::start(&options.gdb, options.gdb_remote_port, &image, toggles) {
        Ok(mi) => mi,
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
    };

    if let Err(e) = attach_handshake(&mut mi) {
        mi.exit();
        let _ = child.kill();
        let _ = child.wait();
        return Err(e);
    }

    let mut session = Session::new(
        mi,
        index,
        String::new(),
        Some(Recorder { child, pty: master }),
    );

    match session.current_filename() {
        Ok(entry) => {
            info!(target: "bridge", "replaying from entry script {entry}");
            session.entry_file = entry;
            Ok(session)
        }
        Err(e) => {
            session.teardown();
            Err(e)
        }
    }
}

fn spawn_recorder(options: &ReplayOptions) -> Result<(Child, File)> {
    let pty = openpty(None, None).map_err(nix_io)?;

    let mut command = Command::new(&options.rr);
    command.arg("replay").arg("-s").arg(options.gdb_remote_port.to_string());
    if let Some(trace_dir) = &options.trace_dir {
        command.arg(std::fs::canonicalize(trace_dir)?);
    }

    command
        .stdin(pty.slave.try_clone().map_err(Error::IO)?)
        .stdout(pty.slave.try_clone().map_err(Error::IO)?)
        .stderr(pty.slave);

    // the replay session wants a controlling terminal
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid().map_err(|e| std::io::Error::from_raw_os_error(e as i32))?;
            if nix::libc::ioctl(0, nix::libc::TIOCSCTTY as _, 0) < 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| Error::Spawn("rr", e))?;
    Ok((child, File::from(pty.master)))
}

/// Mirror recorder output until the line naming the remote-serial endpoint
/// shows up; the pathname after its first `/` is the hardlinked image gdb
/// must open.
fn scrape_endpoint(master: &File) -> Result<PathBuf> {
    let timed = timeout_readwrite::TimeoutReader::new(master.try_clone()?, ENDPOINT_DEADLINE);
    let mut reader = BufReader::new(timed);
    let started_at = Instant::now();

    loop {
        if started_at.elapsed() > ENDPOINT_DEADLINE {
            return Err(Error::EndpointScrape);
        }

        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(0) => return Err(Error::EndpointScrape),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::TimedOut => return Err(Error::EndpointScrape),
            Err(e) => return Err(e.into()),
        }
        print!("{line}");

        if line.contains("target extended-remote") {
            let slash = line.find('/').ok_or(Error::EndpointScrape)?;
            return Ok(PathBuf::from(line[slash..].trim()));
        }
    }
}

/// Insert the master stepping breakpoint (disabled) and the one-shot
/// bootstrap breakpoint, then continue to the bootstrap stop.
fn attach_handshake(mi: &mut MiClient) -> Result<()> {
    let master =
        mi.send_ok(&format!("break-insert -f -d --source {STEP_SOURCE} --line {STEP_LINE}"))?;
    let number = breakpoint_number(&master)?;
    if number != MASTER_BP {
        return Err(Error::MasterBreakpoint(number));
    }

    mi.send_ok(&format!("break-insert -t -f --source {STEP_SOURCE} --line {BOOTSTRAP_LINE}"))?;

    // results from gdb must never be chopped off
    mi.send_ok("gdb-set print elements 0")?;

    mi.send("exec-continue")?;
    mi.wait_bootstrap()
}

fn nix_io(errno: nix::errno::Errno) -> Error {
    Error::IO(std::io::Error::from_raw_os_error(errno as i32))
}

/// Resolve a snapshot tag to the trace directory that holds it.
///
/// Recording drops a `retrace-snapshot-<tag>` source capture inside the trace
/// directory; replaying by tag means finding that directory under the
/// recorder's trace root.
pub fn trace_dir_for_snapshot(tag: &str) -> Result<PathBuf> {
    let home = std::env::var_os("HOME").ok_or_else(|| Error::SnapshotNotFound(tag.to_string()))?;
    let trace_root = PathBuf::from(home).join(".local/share/rr");
    find_snapshot(&trace_root, tag)
}

fn find_snapshot(trace_root: &std::path::Path, tag: &str) -> Result<PathBuf> {
    let Ok(traces) = std::fs::read_dir(trace_root) else {
        return Err(Error::SnapshotNotFound(tag.to_string()));
    };

    let mut matches = Vec::new();
    for trace in traces.flatten() {
        if trace.file_name().to_string_lossy().contains("latest-trace") {
            continue;
        }
        let Ok(entries) = std::fs::read_dir(trace.path()) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("retrace-snapshot") && name.contains(tag) {
                matches.push(entry.path());
            }
        }
    }

    match matches.as_slice() {
        [] => Err(Error::SnapshotNotFound(tag.to_string())),
        [snapshot] => {
            info!(target: "bridge", "found snapshot {} for tag {tag}", snapshot.display());
            snapshot
                .parent()
                .map(PathBuf::from)
                .ok_or_else(|| Error::SnapshotNotFound(tag.to_string()))
        }
        many => {
            let listing = many
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            Err(Error::SnapshotAmbiguous(tag.to_string(), listing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static DIR_COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn trace_root() -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "retrace-traces-{}-{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        for (trace, snapshot) in [
            ("app-0", Some("retrace-snapshot-release-day")),
            ("app-1", Some("retrace-snapshot-bugfix")),
            ("latest-trace", None),
        ] {
            let dir = root.join(trace);
            fs::create_dir_all(&dir).unwrap();
            if let Some(snapshot) = snapshot {
                fs::create_dir_all(dir.join(snapshot)).unwrap();
            }
        }
        root
    }

    #[test]
    fn snapshot_tag_resolves_to_its_trace_dir() {
        let root = trace_root();
        let found = find_snapshot(&root, "bugfix").unwrap();
        assert_eq!(found, root.join("app-1"));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn unknown_tag_is_not_found() {
        let root = trace_root();
        let err = find_snapshot(&root, "nonexistent").unwrap_err();
        assert!(matches!(err, Error::SnapshotNotFound(_)));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn tag_matching_several_snapshots_is_ambiguous() {
        let root = trace_root();
        // both snapshot names contain an "s"
        let err = find_snapshot(&root, "s").unwrap_err();
        assert!(matches!(err, Error::SnapshotAmbiguous(_, _)));
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn missing_trace_root_is_not_found() {
        let err = find_snapshot(std::path::Path::new("/nonexistent/rr"), "tag").unwrap_err();
        assert!(matches!(err, Error::SnapshotNotFound(_)));
    }
}
