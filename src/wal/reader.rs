//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::entry::{parse_header, HEADER_SIZE, MAX_ENTRY_SIZE};
use super::WalEntry;
use crate::error::{QuillError, Result};

/// Outcome of reading one framed entry
pub(crate) enum EntryRead {
    Entry(WalEntry),
    /// Clean end of file on an entry boundary
    End,
    /// The file ends inside an entry (torn write)
    Torn,
    /// A complete entry failed validation
    Corrupt(String),
}

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,

    /// Offset of the next unread entry
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file; torn or corrupt entries are
    /// reported as `WalCorruption`.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        match self.read_next()? {
            EntryRead::Entry(entry) => Ok(Some(entry)),
            EntryRead::End => Ok(None),
            EntryRead::Torn => Err(QuillError::WalCorruption(format!(
                "partial entry at offset {}",
                self.position
            ))),
            EntryRead::Corrupt(reason) => Err(QuillError::WalCorruption(reason)),
        }
    }

    /// Iterate over all entries until the end or the first invalid one
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }

    /// Byte offset just past the last entry returned
    pub fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn read_next(&mut self) -> Result<EntryRead> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(EntryRead::End),
            n if n < HEADER_SIZE => return Ok(EntryRead::Torn),
            _ => {}
        }

        let (lsn, crc, len) = parse_header(&header);
        if len > MAX_ENTRY_SIZE {
            return Ok(EntryRead::Corrupt(format!(
                "entry length {} exceeds maximum at offset {}",
                len, self.position
            )));
        }

        let mut data = vec![0u8; len as usize];
        if read_full(&mut self.reader, &mut data)? < data.len() {
            return Ok(EntryRead::Torn);
        }

        match WalEntry::from_parts(lsn, crc, &data) {
            Ok(entry) => {
                self.position += (HEADER_SIZE + data.len()) as u64;
                Ok(EntryRead::Entry(entry))
            }
            Err(e) => Ok(EntryRead::Corrupt(e.to_string())),
        }
    }
}

/// Fill `buf` as far as the file allows; returns the number of bytes read
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Iterator over WAL entries
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
