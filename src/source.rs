// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

use std::fs::File;
use std::io::{Read, Take};
use std::path::Path;
use crate::error::TransferError;
use crate::protocol::*;

/// Sequential reader over the file being sent, with its wire name and size
pub struct FileSource {
    filename: Vec<u8>,
    size: u32,
    reader: Take<Box<dyn Read + Send>>,
}

impl FileSource {
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        if !path.is_file() {
            return Err(TransferError::FileNotFound { path: path.to_path_buf() });
        }

        let file = File::open(path).map_err(TransferError::Source)?;
        let len = file.metadata().map_err(TransferError::Source)?.len();
        let filename = path
            .file_name()
            .map(|name| name.as_encoded_bytes().to_vec())
            .unwrap_or_default();

        FileSource::new(filename, len, file)
    }

    /// Wraps any reader. Reads stop at `len` even if the reader has more.
    pub fn new(
        filename: impl Into<Vec<u8>>,
        len: u64,
        reader: impl Read + Send + 'static,
    ) -> Result<Self, TransferError> {
        let filename = filename.into();
        if filename.len() > MAX_FILENAME_LEN {
            return Err(TransferError::FilenameTooLong { len: filename.len() });
        }
        let size = u32::try_from(len).map_err(|_| TransferError::FileTooLarge { len })?;
        let reader: Box<dyn Read + Send> = Box::new(reader);

        Ok(FileSource {
            filename,
            size,
            reader: reader.take(len),
        })
    }

    pub fn filename(&self) -> &[u8] {
        &self.filename
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Fills `buf` with the next chunk of at most `CHUNK_SIZE` bytes.
    /// Returns 0 once the file is exhausted.
    pub fn next_chunk(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransferError> {
        buf.clear();
        self.reader
            .by_ref()
            .take(CHUNK_SIZE as u64)
            .read_to_end(buf)
            .map_err(TransferError::Source)
    }
}
