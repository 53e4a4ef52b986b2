// ========================================================================================
//
//                     PREDICTION FILE READING AND WRITING
//
// ========================================================================================
//
// Prediction files are plain text, one floating-point value per line, and every file
// that takes part in a blend shares the same implicit example order: line k of each file
// describes the same (user, movie) pair. Nothing in the files themselves carries that
// correspondence, so the line count is the only thing that can be checked, and it is
// checked exactly. A file that is one line short is rejected outright.
//
// Files are memory-mapped and split on '\n' with `memchr`; values are parsed with
// `lexical-core`. Output goes to a hidden temporary sibling that is renamed over the
// destination once fully flushed, so a failed run never leaves a truncated result.

use memmap2::Mmap;
use ndarray::ArrayViewMut1;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionReadError {
    #[error("Failed to read prediction file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "Prediction file '{path}' has {found} lines, but exactly {expected} are required. Every prediction file must cover the same examples in the same order."
    )]
    PredictionCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("Line {line} of '{path}' is not a floating-point prediction: '{text}'")]
    InvalidPrediction {
        path: PathBuf,
        line: usize,
        text: String,
    },
    #[error("Line {line} of '{path}' holds a non-finite prediction.")]
    NonFinitePrediction { path: PathBuf, line: usize },
}

/// A read-only view of a line-oriented prediction file.
pub struct PredictionFile {
    path: PathBuf,
    mmap: Option<Mmap>,
}

impl PredictionFile {
    pub fn open(path: &Path) -> Result<Self, PredictionReadError> {
        let io_error = |source| PredictionReadError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_error)?;
        let len = file.metadata().map_err(io_error)?.len();
        // Zero-length files cannot be mapped on every platform.
        let mmap = if len == 0 {
            None
        } else {
            // SAFETY: the map is read-only and the blend inputs are not modified while
            // a run is in progress.
            Some(unsafe { Mmap::map(&file) }.map_err(io_error)?)
        };
        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Iterates over the lines of the file with surrounding ASCII whitespace removed.
    /// A final line without a trailing newline is still yielded.
    pub fn lines(&self) -> Lines<'_> {
        Lines {
            remaining: self.bytes(),
        }
    }

    /// Parses every line as a prediction, whatever the number of lines.
    pub fn read_all(&self) -> Result<Vec<f64>, PredictionReadError> {
        self.lines()
            .enumerate()
            .map(|(index, line)| parse_prediction(&self.path, index + 1, line))
            .collect()
    }

    /// Parses exactly `column.len()` predictions into `column`.
    ///
    /// Fails with [`PredictionReadError::PredictionCountMismatch`] when the file holds
    /// more or fewer lines. The reported count covers the whole file.
    pub fn read_into(&self, mut column: ArrayViewMut1<'_, f64>) -> Result<(), PredictionReadError> {
        let expected = column.len();
        let mut lines = self.lines();
        for (index, slot) in column.iter_mut().enumerate() {
            let Some(line) = lines.next() else {
                return Err(self.count_mismatch(expected, index));
            };
            *slot = parse_prediction(&self.path, index + 1, line)?;
        }
        let surplus = lines.count();
        if surplus > 0 {
            return Err(self.count_mismatch(expected, expected + surplus));
        }
        Ok(())
    }

    fn count_mismatch(&self, expected: usize, found: usize) -> PredictionReadError {
        PredictionReadError::PredictionCountMismatch {
            path: self.path.clone(),
            expected,
            found,
        }
    }
}

/// Line iterator over a mapped prediction file.
pub struct Lines<'a> {
    remaining: &'a [u8],
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining.is_empty() {
            return None;
        }
        let line = match memchr::memchr(b'\n', self.remaining) {
            Some(end) => {
                let line = &self.remaining[..end];
                self.remaining = &self.remaining[end + 1..];
                line
            }
            None => std::mem::take(&mut self.remaining),
        };
        Some(line.trim_ascii())
    }
}

/// Parses one trimmed line. `line_number` is 1-based and only used for errors.
pub fn parse_prediction(
    path: &Path,
    line_number: usize,
    line: &[u8],
) -> Result<f64, PredictionReadError> {
    let value: f64 =
        lexical_core::parse(line).map_err(|_| PredictionReadError::InvalidPrediction {
            path: path.to_path_buf(),
            line: line_number,
            text: String::from_utf8_lossy(line).into_owned(),
        })?;
    if !value.is_finite() {
        return Err(PredictionReadError::NonFinitePrediction {
            path: path.to_path_buf(),
            line: line_number,
        });
    }
    Ok(value)
}

/// Writes to `path` atomically: the content is assembled in a hidden sibling
/// file that replaces `path` only after it has been completely written.
pub fn write_lines_atomically<F>(path: &Path, write_body: F) -> std::io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let staging = staging_path(path);
    let result: std::io::Result<()> = (|| {
        let mut writer = BufWriter::new(File::create(&staging)?);
        write_body(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    })();

    match result {
        Ok(()) => fs::rename(&staging, path).inspect_err(|_| {
            let _ = fs::remove_file(&staging);
        }),
        Err(err) => {
            let _ = fs::remove_file(&staging);
            Err(err)
        }
    }
}

/// Writes one prediction per line with `precision` decimal digits.
pub fn write_predictions<I>(path: &Path, values: I, precision: usize) -> std::io::Result<()>
where
    I: IntoIterator<Item = f64>,
{
    write_lines_atomically(path, |writer| {
        for value in values {
            writeln!(writer, "{value:.precision$}")?;
        }
        Ok(())
    })
}

fn staging_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    path.with_file_name(format!(".{file_name}.partial"))
}
