use crate::bridge::error::{Error, Result};
use log::debug;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const NUM_FILES_SENTINEL: &str = "//&&& Number of Files:";
const MAX_STACK_DEPTH_SENTINEL: &str = "//&&& Max Stack Depth:";
const FILENAME_SENTINEL: &str = "//###";
const LEVEL_SENTINEL: &str = "//$$$";

/// Lookup tables built from the generated breakpoint location file.
///
/// Conditional line breakpoints land on the instrumentation line that
/// represents a script file; depth breakpoints land on the line that
/// represents a stack level. Both tables are immutable after construction.
#[derive(Debug)]
pub struct LocationIndex {
    files: HashMap<String, u64>,
    levels: Vec<u64>,
    max_depth: usize,
}

impl LocationIndex {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(target: "bridge", "loading breakpoint locations from {}", path.display());
        let file = File::open(path)?;
        Self::parse(BufReader::new(file), path)
    }

    fn parse<R: BufRead>(mut reader: R, path: &Path) -> Result<Self> {
        fn header<R: BufRead>(
            sentinel: &'static str,
            reader: &mut R,
            lineno: &mut usize,
            path: &Path,
        ) -> Result<usize> {
            let mut line = String::new();
            reader.read_line(&mut line)?;
            *lineno += 1;
            let at = line
                .find(sentinel)
                .ok_or_else(|| Error::MissingSentinel(path.to_path_buf(), sentinel))?;
            line[at + sentinel.len()..]
                .trim()
                .parse::<usize>()
                .map_err(|_| Error::MalformedSentinel(path.to_path_buf(), sentinel))
        }

        let mut lineno = 0usize;
        let num_files = header(NUM_FILES_SENTINEL, &mut reader, &mut lineno, path)?;
        let max_depth = header(MAX_STACK_DEPTH_SENTINEL, &mut reader, &mut lineno, path)?;
        let path = PathBuf::from(path);

        let mut files = HashMap::with_capacity(num_files);
        let mut levels = Vec::with_capacity(max_depth);

        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            lineno += 1;

            if let Some(at) = line.find(FILENAME_SENTINEL) {
                let rest = line[at + FILENAME_SENTINEL.len()..].trim();
                if rest.is_empty() {
                    return Err(Error::MalformedFileMarker(path, lineno));
                }
                let uri = if rest.starts_with("file://") {
                    rest.to_string()
                } else {
                    format!("file://{rest}")
                };
                if files.insert(uri.clone(), lineno as u64).is_some() {
                    return Err(Error::DuplicateLocation(path, uri));
                }
            }

            if line.contains(LEVEL_SENTINEL) {
                if levels.len() == max_depth {
                    return Err(Error::LevelOverflow {
                        path,
                        declared: max_depth,
                    });
                }
                levels.push(lineno as u64);
            }
        }

        if files.len() != num_files {
            return Err(Error::FileCountMismatch {
                path,
                declared: num_files,
                found: files.len(),
            });
        }

        debug!(
            target: "bridge",
            "location index ready: {} files, {} stack levels",
            files.len(),
            levels.len()
        );

        Ok(LocationIndex {
            files,
            levels,
            max_depth,
        })
    }

    /// Instrumentation line whose conditional breakpoint represents `uri`.
    pub fn file_line(&self, uri: &str) -> Option<u64> {
        self.files.get(uri).copied()
    }

    /// Instrumentation line that represents stack depth `level` (0-based).
    pub fn level_line(&self, level: i64) -> Option<u64> {
        usize::try_from(level)
            .ok()
            .and_then(|l| self.levels.get(l).copied())
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
