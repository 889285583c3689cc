// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Payload framing applied to each grouped batch before it is written.
//!
//! Every codec here is a pure function of its input. The snappy variants use
//! the Hadoop-compatible block layout: big-endian length prefixes followed by
//! raw (unframed) snappy data, so that further blocks can be appended to an
//! existing file without rewriting earlier ones.

use std::io::{self, Write};

use derive_more::Display;
use flate2::write::GzEncoder;
use serde::Deserialize;

use crate::errors::ConfigError;

pub const DEFAULT_SNAPPY_BUFSIZE: usize = 32 * 1024;
pub const MAX_SNAPPY_BUFSIZE: usize = 64 * 1024;

/// Written once at the start of a file created with the `file` snappy format:
/// 8 magic bytes, then the format version and the minimum compatible version
/// as big-endian u32.
pub const SNAPPY_FILE_HEADER: [u8; 16] = [
    0x82, b'S', b'N', b'A', b'P', b'P', b'Y', 0x00, // magic
    0x00, 0x00, 0x00, 0x01, // version
    0x00, 0x00, 0x00, 0x01, // minimum compatible version
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    #[display("none")]
    None,
    #[display("gzip")]
    Gzip,
    #[display("snappy")]
    Snappy,
}

impl std::str::FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            other => Err(ConfigError::Invalid(format!(
                "Invalid compression '{other}'. Must be one of: none, gzip, snappy"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnappyFormat {
    #[display("file")]
    File,
    #[default]
    #[display("stream")]
    Stream,
}

impl std::str::FromStr for SnappyFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(SnappyFormat::File),
            "stream" => Ok(SnappyFormat::Stream),
            other => Err(ConfigError::Invalid(format!(
                "Invalid snappy_format '{other}'. Must be one of: file, stream"
            ))),
        }
    }
}

/// Resolved framing for one sink instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Plain,
    Gzip,
    SnappyFile,
    SnappyStream { bufsize: usize },
}

impl Framing {
    #[must_use]
    pub fn new(compression: Compression, format: SnappyFormat, bufsize: usize) -> Self {
        match (compression, format) {
            (Compression::None, _) => Framing::Plain,
            (Compression::Gzip, _) => Framing::Gzip,
            (Compression::Snappy, SnappyFormat::File) => Framing::SnappyFile,
            (Compression::Snappy, SnappyFormat::Stream) => Framing::SnappyStream {
                bufsize: bufsize.clamp(1, MAX_SNAPPY_BUFSIZE),
            },
        }
    }

    /// Suffix appended to every resolved destination path.
    #[must_use]
    pub fn path_suffix(&self) -> &'static str {
        match self {
            Framing::Plain => "",
            Framing::Gzip => ".gz",
            Framing::SnappyFile | Framing::SnappyStream { .. } => ".snappy",
        }
    }

    /// Bytes that must precede the first payload of a newly created file.
    #[must_use]
    pub fn create_header(&self) -> &'static [u8] {
        match self {
            Framing::SnappyFile => &SNAPPY_FILE_HEADER,
            _ => &[],
        }
    }

    pub fn encode(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        match self {
            Framing::Plain => Ok(data.to_vec()),
            Framing::Gzip => compress_gzip(data),
            Framing::SnappyFile => compress_snappy_file(data),
            Framing::SnappyStream { bufsize } => compress_snappy_stream(data, *bufsize),
        }
    }
}

/// Wraps the whole input in a single gzip member.
pub fn compress_gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// One block: `[u32 BE compressed length][snappy bytes]`.
pub fn compress_snappy_file(data: &[u8]) -> io::Result<Vec<u8>> {
    let compressed = snap::raw::Encoder::new()
        .compress_vec(data)
        .map_err(io::Error::other)?;
    let mut out = Vec::with_capacity(4 + compressed.len());
    out.extend_from_slice(&block_len(compressed.len())?.to_be_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Chunks of at most `bufsize` input bytes, each written as
/// `[u32 BE uncompressed length][u32 BE compressed length][snappy bytes]`.
/// Empty input produces no chunks.
pub fn compress_snappy_stream(data: &[u8], bufsize: usize) -> io::Result<Vec<u8>> {
    let mut encoder = snap::raw::Encoder::new();
    let mut out = Vec::with_capacity(data.len() / 2 + 8);
    for chunk in data.chunks(bufsize.max(1)) {
        let compressed = encoder.compress_vec(chunk).map_err(io::Error::other)?;
        out.extend_from_slice(&block_len(chunk.len())?.to_be_bytes());
        out.extend_from_slice(&block_len(compressed.len())?.to_be_bytes());
        out.extend_from_slice(&compressed);
    }
    Ok(out)
}

/// Inverse of [`compress_snappy_stream`] over any number of concatenated chunks.
pub fn decompress_snappy_stream(mut data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = snap::raw::Decoder::new();
    let mut out = Vec::new();
    while !data.is_empty() {
        let uncompressed_len = read_u32(&mut data)? as usize;
        let compressed_len = read_u32(&mut data)? as usize;
        let block = take(&mut data, compressed_len)?;
        let decompressed = decoder.decompress_vec(block).map_err(io::Error::other)?;
        if decompressed.len() != uncompressed_len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "chunk declared {uncompressed_len} bytes but decompressed to {}",
                    decompressed.len()
                ),
            ));
        }
        out.extend_from_slice(&decompressed);
    }
    Ok(out)
}

/// Inverse of the `file` format: an optional [`SNAPPY_FILE_HEADER`] followed
/// by any number of `[u32 BE compressed length][snappy bytes]` blocks.
pub fn decompress_snappy_file(mut data: &[u8]) -> io::Result<Vec<u8>> {
    if data.starts_with(&SNAPPY_FILE_HEADER) {
        data = &data[SNAPPY_FILE_HEADER.len()..];
    }
    let mut decoder = snap::raw::Decoder::new();
    let mut out = Vec::new();
    while !data.is_empty() {
        let compressed_len = read_u32(&mut data)? as usize;
        let block = take(&mut data, compressed_len)?;
        out.extend_from_slice(&decoder.decompress_vec(block).map_err(io::Error::other)?);
    }
    Ok(out)
}

fn block_len(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("block of {len} bytes does not fit a 32-bit length prefix"),
        )
    })
}

fn read_u32(data: &mut &[u8]) -> io::Result<u32> {
    let bytes = take(data, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn take<'a>(data: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    if data.len() < n {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("truncated block: wanted {n} bytes, {} left", data.len()),
        ));
    }
    let (head, tail) = data.split_at(n);
    *data = tail;
    Ok(head)
}
