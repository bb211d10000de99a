//! Reader for POA window files.
//!
//! A window file is a sequence of blocks. Each block starts with a line
//! holding the number of sequences `N`, followed by `N` lines of sequence
//! text. Blank lines between blocks are ignored. Files may be gzipped
//! (detected by magic bytes, not extension).

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use thiserror::Error;

use crate::core::types::Group;

const BUFFER_SIZE: usize = 4 * 1024 * 1024; // 4MB buffer

#[derive(Debug, Error)]
pub enum WindowReadError {
    #[error("I/O error reading windows: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: expected a sequence count, found {value:?}")]
    InvalidCount { line: usize, value: String },

    #[error("line {line}: window declares {expected} sequences but only {found} follow")]
    Truncated {
        line: usize,
        expected: usize,
        found: usize,
    },
}

/// Streaming window reader yielding one [`Group`] per block.
pub struct WindowReader {
    reader: Box<dyn BufRead + Send>,
    line_no: usize,
    buf: String,
}

/// Check for gzip magic bytes
fn is_gzip_file(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let n = file.read(&mut magic)?;
    Ok(n == 2 && magic == [0x1f, 0x8b])
}

impl WindowReader {
    /// Open a window file, decompressing gzip transparently.
    pub fn open(path: &Path) -> Result<Self, WindowReadError> {
        let inner: Box<dyn Read + Send> = if is_gzip_file(path)? {
            log::debug!("Detected gzip window file: {}", path.display());
            Box::new(GzDecoder::new(File::open(path)?))
        } else {
            Box::new(File::open(path)?)
        };
        Ok(Self::from_reader(inner))
    }

    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(BufReader::with_capacity(BUFFER_SIZE, reader)),
            line_no: 0,
            buf: String::new(),
        }
    }

    /// Next line with trailing whitespace removed, or `None` at EOF.
    fn next_line(&mut self) -> Result<Option<&str>, WindowReadError> {
        self.buf.clear();
        if self.reader.read_line(&mut self.buf)? == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        Ok(Some(self.buf.trim_end()))
    }

    /// Read the next window. Returns `Ok(None)` at end of input.
    pub fn next_window(&mut self) -> Result<Option<Group>, WindowReadError> {
        let count = loop {
            let line_no = self.line_no + 1;
            match self.next_line()? {
                None => return Ok(None),
                Some(line) if line.is_empty() => continue,
                Some(line) => {
                    break line.parse::<usize>().map_err(|_| WindowReadError::InvalidCount {
                        line: line_no,
                        value: line.to_string(),
                    })?
                }
            }
        };

        let header_line = self.line_no;
        let mut sequences: Vec<Vec<u8>> = Vec::with_capacity(count);
        while sequences.len() < count {
            match self.next_line()? {
                Some(line) => sequences.push(line.as_bytes().to_vec()),
                None => {
                    return Err(WindowReadError::Truncated {
                        line: header_line,
                        expected: count,
                        found: sequences.len(),
                    })
                }
            }
        }

        Ok(Some(Group::from_strs(&sequences)))
    }

    /// Read up to `limit` windows (all windows when `None`).
    pub fn read_windows(&mut self, limit: Option<usize>) -> Result<Vec<Group>, WindowReadError> {
        let mut windows = Vec::new();
        while limit.map_or(true, |l| windows.len() < l) {
            match self.next_window()? {
                Some(group) => windows.push(group),
                None => break,
            }
        }
        Ok(windows)
    }
}

/// Load windows from `path`.
pub fn load_windows(path: &Path, limit: Option<usize>) -> Result<Vec<Group>, WindowReadError> {
    let mut reader = WindowReader::open(path)?;
    let windows = reader.read_windows(limit)?;
    log::info!(
        "Loaded {} windows ({} sequences) from {}",
        windows.len(),
        windows.iter().map(Group::len).sum::<usize>(),
        path.display()
    );
    Ok(windows)
}
