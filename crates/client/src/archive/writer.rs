//! In-memory zip archive.

use std::collections::HashSet;
use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use replica_core::Error;

/// Accumulates archive entries in memory until finished.
pub struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
    names: HashSet<String>,
}

impl Default for ArchiveWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveWriter {
    pub fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            names: HashSet::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Add an entry. Names must be unique within the archive.
    pub fn add(&mut self, name: &str, data: &[u8]) -> Result<(), Error> {
        if self.names.contains(name) {
            return Err(Error::ArchiveFinalize(format!("duplicate entry {name}")));
        }

        self.zip
            .start_file(name, self.options)
            .map_err(|e| Error::ArchiveFinalize(format!("failed to start entry {name}: {e}")))?;
        self.zip
            .write_all(data)
            .map_err(|e| Error::ArchiveFinalize(format!("failed to write entry {name}: {e}")))?;

        self.names.insert(name.to_string());
        Ok(())
    }

    /// Finish the archive and return its bytes.
    pub fn finish(self) -> Result<Vec<u8>, Error> {
        let cursor = self
            .zip
            .finish()
            .map_err(|e| Error::ArchiveFinalize(format!("failed to finish archive: {e}")))?;
        Ok(cursor.into_inner())
    }
}
