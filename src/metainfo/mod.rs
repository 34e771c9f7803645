//! Torrent metainfo loading from `.torrent` files and magnet URIs.
//!
//! The loader keeps the original file buffer alive and records the byte span
//! of the `info` value inside it, so the infohash is always SHA-1 over the
//! exact source bytes - never over a re-encoded dictionary.

mod magnet;
mod torrent;

use std::ops::Range;

use crate::bencode::BencodeError;
use crate::InfoHash;

/// One file carried by a torrent.
///
/// `offset` is the position of the file's first byte within the concatenated
/// torrent payload, i.e. the running sum of the preceding entries' lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path segments relative to the torrent root
    pub path: Vec<String>,
    /// File length in bytes
    pub length: u64,
    /// Byte offset within the concatenated payload
    pub offset: u64,
}

/// The decoded `info` dictionary of a torrent.
///
/// For magnet-derived metainfo, everything except `name` stays empty until
/// metadata is fetched from peers (out of scope for this crate).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoDictionary {
    /// Suggested display name (single-file mode: also the file name)
    pub name: String,
    /// Piece size in bytes
    pub piece_length: u32,
    /// SHA-1 digest per piece
    pub pieces: Vec<[u8; 20]>,
    /// Files in payload order; single-file torrents carry one entry
    pub files: Vec<FileEntry>,
}

/// Canonical in-memory form of a torrent's metainfo.
///
/// Owns the source buffer so the raw `info` slice stays borrowable for the
/// lifetime of the metainfo; see [`Metainfo::info_raw`].
#[derive(Debug, Clone)]
pub struct Metainfo {
    raw: Vec<u8>,
    info_span: Range<usize>,
    /// Decoded `info` dictionary
    pub info: InfoDictionary,
    /// Announce tiers in preference order (BEP 12); each tier is an ordered
    /// list of announce URLs
    pub announce_list: Vec<Vec<String>>,
    info_hash: InfoHash,
}

impl Metainfo {
    /// Returns the infohash identifying this torrent's swarm.
    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    /// Returns the exact bytes of the `info` value as they appeared in the
    /// source. Empty for magnet-derived metainfo.
    pub fn info_raw(&self) -> &[u8] {
        &self.raw[self.info_span.clone()]
    }

    /// Returns the total payload length across all files.
    pub fn total_length(&self) -> u64 {
        self.info.files.iter().map(|file| file.length).sum()
    }

    pub(crate) fn assemble(
        raw: Vec<u8>,
        info_span: Range<usize>,
        info: InfoDictionary,
        announce_list: Vec<Vec<String>>,
        info_hash: InfoHash,
    ) -> Self {
        Self {
            raw,
            info_span,
            info,
            announce_list,
            info_hash,
        }
    }
}

/// Errors produced while loading metainfo.
#[derive(Debug, thiserror::Error)]
pub enum MetainfoError {
    /// The source was not valid bencode.
    #[error("malformed bencode")]
    Bencode(#[from] BencodeError),

    /// A required field was absent.
    #[error("missing required field `{field}`")]
    MissingField {
        /// Dotted path of the absent field
        field: &'static str,
    },

    /// A field was present with the wrong type or shape.
    #[error("field `{field}` has the wrong type or shape")]
    TypeMismatch {
        /// Dotted path of the offending field
        field: &'static str,
    },

    /// A magnet `xt` hash was not valid hex or base32.
    #[error("info hash is not valid hex or base32")]
    InvalidInfohashEncoding,

    /// A magnet `xt` hash had a length matching neither encoding.
    #[error("unsupported magnet hash encoding")]
    UnsupportedMagnetHashEncoding,

    /// File lengths do not agree with the piece count.
    #[error("piece layout mismatch: {reason}")]
    PieceLayoutMismatch {
        /// What disagreed
        reason: String,
    },

    /// The URI did not start with `magnet:?`.
    #[error("not a magnet URI")]
    NotMagnet,
}
