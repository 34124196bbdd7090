use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- environment errors ----------------------------------------
    #[error("failed to spawn {0}: {1}")]
    Spawn(&'static str, #[source] std::io::Error),
    #[error("could not find the gdb connection string in the recorder output")]
    EndpointScrape,
    #[error("breakpoint location file {0}: could not find the marker `{1}`")]
    MissingSentinel(PathBuf, &'static str),
    #[error("breakpoint location file {0}: malformed count after `{1}`")]
    MalformedSentinel(PathBuf, &'static str),
    #[error("breakpoint location file {0}: malformed file marker at line {1}")]
    MalformedFileMarker(PathBuf, usize),
    #[error("breakpoint location file {0}: duplicate entry for {1}")]
    DuplicateLocation(PathBuf, String),
    #[error("breakpoint location file {path} declares {declared} files but {found} were found")]
    FileCountMismatch {
        path: PathBuf,
        declared: usize,
        found: usize,
    },
    #[error("breakpoint location file {path} declares {declared} stack levels but more were found")]
    LevelOverflow { path: PathBuf, declared: usize },

    // --------------------------------- gdb/mi errors ---------------------------------------------
    #[error("gdb/mi stream closed")]
    MiClosed,
    #[error("could not execute the gdb/mi command `{command}`: {details}")]
    MiCommand { command: String, details: String },
    #[error("improper gdb string response: {0}")]
    GdbStringResponse(String),
    #[error("breakpoint number {0} returned by gdb is not unique")]
    DuplicateBreakpoint(String),
    #[error("gdb assigned number {0} to the stepping breakpoint, expected 1")]
    MasterBreakpoint(String),
    #[error("stack depth breakpoint was not inserted")]
    DepthBreakpoint,
    #[error("max stack depth is {max} but asked to break at depth {level}")]
    DepthRange { level: i64, max: i64 },

    // --------------------------------- breakpoint translation ------------------------------------
    #[error("{0}")]
    NoSuchFile(String),
    #[error("could not set breakpoint in gdb, something is probably wrong with its parameters")]
    CouldNotSetBreakpoint,
    #[error("breakpoint type `{0}` is not supported")]
    TypeNotSupported(String),
    #[error("hit condition/value is currently not supported")]
    HitConditionUnsupported,
    #[error("{0} updates are currently unsupported in breakpoint_update")]
    UpdateUnsupported(&'static str),

    // --------------------------------- snapshot lookup -------------------------------------------
    #[error("could not find a snapshot matching `{0}`")]
    SnapshotNotFound(String),
    #[error("multiple snapshots match `{0}`: {1}")]
    SnapshotAmbiguous(String, String),

    // --------------------------------- replay boundary -------------------------------------------
    #[error("replay reached the boundary of the recording ({0})")]
    TraceBoundary(String),

    // --------------------------------- protocol errors -------------------------------------------
    #[error("malformed request: {0}")]
    Request(String),
    #[error("sequence number {0} has already been seen")]
    StaleSequence(i64),
    #[error("unimplemented command `{0}`")]
    UnknownCommand(String),
    #[error("unknown feature `{0}`")]
    UnknownFeature(String),
    #[error("feature `{0}` is read only")]
    FeatureReadOnly(String),
    #[error("cannot assign `{1}` to the boolean feature `{0}`")]
    FeatureValue(String, String),
}

impl Error {
    /// Return a hint to an interface - render the error to the client and keep
    /// the session alive, or tear the session down.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::MiCommand { .. }
                | Error::GdbStringResponse(_)
                | Error::NoSuchFile(_)
                | Error::CouldNotSetBreakpoint
                | Error::TypeNotSupported(_)
                | Error::HitConditionUnsupported
                | Error::UpdateUnsupported(_)
                | Error::TraceBoundary(_)
        )
    }

    /// DBGp error code rendered into `<error code="..">` responses.
    ///
    /// 200 and 201 are the protocol codes for "could not set breakpoint" and
    /// "breakpoint type not supported"; everything else maps onto 998, the
    /// catch-all internal-error code.
    pub fn dbgp_code(&self) -> u32 {
        match self {
            Error::NoSuchFile(_) | Error::CouldNotSetBreakpoint => 200,
            Error::TypeNotSupported(_)
            | Error::HitConditionUnsupported
            | Error::UpdateUnsupported(_) => 201,
            _ => 998,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
