use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::models::error::RecorderError;
use crate::processing::wav_format;

const BIT_DEPTH: u16 = 16;

/// Streaming WAV file writer.
///
/// Writes a placeholder 44-byte header on open, appends raw PCM as samples
/// arrive, and rewrites the header with the final sizes on close. `close`
/// returns the SHA-256 hex digest of the completed file.
pub struct WavFileWriter {
    file_path: PathBuf,
    sample_rate: u32,
    channels: u16,
    file: Option<File>,
    total_bytes_written: u64,
    is_open: bool,
}

impl WavFileWriter {
    pub fn new(file_path: PathBuf, sample_rate: u32, channels: u16) -> Self {
        Self {
            file_path,
            sample_rate,
            channels,
            file: None,
            total_bytes_written: 0,
            is_open: false,
        }
    }

    /// Create the file (and its parent directory) and write the header.
    pub fn open(&mut self) -> Result<(), RecorderError> {
        if self.is_open {
            return Ok(());
        }

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| RecorderError::Storage(format!("create output dir: {}", e)))?;
            }
        }

        let file = File::create(&self.file_path)
            .map_err(|e| RecorderError::Storage(format!("create {}: {}", self.file_path.display(), e)))?;
        self.file = Some(file);

        // Data size is a placeholder until close.
        let header = wav_format::generate_wav_header(self.sample_rate, BIT_DEPTH, self.channels, 0);
        self.write_raw(&header)?;
        self.is_open = true;
        Ok(())
    }

    /// Append interleaved int16 samples as little-endian PCM.
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<(), RecorderError> {
        if !self.is_open {
            return Err(RecorderError::Storage("file is not open for writing".into()));
        }
        self.write_raw(&wav_format::pcm_bytes(samples))
    }

    /// Finalize the header and return the file's SHA-256 checksum.
    pub fn close(&mut self) -> Result<String, RecorderError> {
        if !self.is_open {
            return Err(RecorderError::Storage("file is not open".into()));
        }

        let data_size = (self.total_bytes_written - wav_format::WAV_HEADER_SIZE as u64) as u32;
        let header =
            wav_format::generate_wav_header(self.sample_rate, BIT_DEPTH, self.channels, data_size);

        let file = self.file.as_mut().unwrap();
        file.seek(SeekFrom::Start(0))
            .map_err(|e| RecorderError::Storage(e.to_string()))?;
        file.write_all(&header)
            .map_err(|e| RecorderError::Storage(e.to_string()))?;
        file.flush()
            .map_err(|e| RecorderError::Storage(e.to_string()))?;
        self.file = None;
        self.is_open = false;

        sha256_file(&self.file_path)
    }

    /// Total bytes written so far (including the header).
    pub fn bytes_written(&self) -> u64 {
        self.total_bytes_written
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), RecorderError> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| RecorderError::Storage("file is not open".into()))?;
        file.write_all(data)
            .map_err(|e| RecorderError::Storage(format!("write failed: {}", e)))?;
        self.total_bytes_written += data.len() as u64;
        Ok(())
    }
}

/// Compute the SHA-256 hex digest of a file.
fn sha256_file(path: &Path) -> Result<String, RecorderError> {
    let data = fs::read(path)
        .map_err(|e| RecorderError::Storage(format!("read file for checksum: {}", e)))?;
    let digest = Sha256::digest(&data);
    Ok(hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
