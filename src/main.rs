use clap::{Parser, Subcommand};
use log::error;
use retrace::bridge::replay::{self, ReplayOptions};
use retrace::bridge::Toggles;
use retrace::ui::ide;
use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Reversible debugging bridge for PHP: replays an rr recording and serves it
/// to a DBGp IDE, forwards and backwards.
#[derive(Parser, Debug)]
#[command(name = "retrace", version, about, long_about = None)]
struct Cli {
    /// Print more messages to know what retrace is doing
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Location of the retrace folder (its ext/retrace holds the generated
    /// breakpoint location file)
    #[arg(long, global = true, default_value = ".")]
    install_location: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay and debug a previous execution
    Replay {
        /// Recording to replay: a trace directory, or a snapshot tag to look
        /// up under the recorder's trace root (defaults to the latest trace)
        trace: Option<String>,

        /// DBGp client/IDE port for replaying
        #[arg(long, default_value_t = 9000)]
        replay_port: u16,

        /// Port at which the recorder's backend is made available to gdb
        #[arg(long, default_value_t = 9999)]
        gdb_remote_port: u16,

        /// The rr executable (default assumes rr exists in $PATH)
        #[arg(long, default_value = "rr")]
        with_rr: PathBuf,

        /// The gdb executable (default assumes gdb exists in $PATH)
        #[arg(long, default_value = "gdb")]
        with_gdb: PathBuf,

        /// Show notification messages from gdb
        #[arg(short, long)]
        gdb_notify: bool,
    },
}

fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay {
            trace,
            replay_port,
            gdb_remote_port,
            with_rr,
            with_gdb,
            gdb_notify,
        } => {
            let toggles = Arc::new(Toggles::default());
            toggles.verbose.store(cli.verbose, Ordering::Relaxed);
            toggles.gdb_notifications.store(gdb_notify, Ordering::Relaxed);

            let trace_dir = match trace {
                None => None,
                Some(trace) if PathBuf::from(&trace).is_dir() => Some(PathBuf::from(trace)),
                Some(tag) => match replay::trace_dir_for_snapshot(&tag) {
                    Ok(dir) => Some(dir),
                    Err(e) => {
                        error!(target: "bridge", "{e:#}");
                        eprintln!("retrace: {e:#}");
                        exit(1);
                    }
                },
            };

            let options = ReplayOptions {
                trace_dir,
                install_location: cli.install_location,
                rr: with_rr,
                gdb: with_gdb,
                gdb_remote_port,
            };

            let session = match replay::start(&options, Arc::clone(&toggles)) {
                Ok(session) => session,
                Err(e) => {
                    error!(target: "bridge", "{e:#}");
                    eprintln!("retrace: {e:#}");
                    exit(1);
                }
            };

            match ide::run(session, replay_port, toggles) {
                Ok(code) => exit(code),
                Err(e) => {
                    error!(target: "bridge", "{e:#}");
                    eprintln!("retrace: {e:#}");
                    exit(1);
                }
            }
        }
    }
}
