//! `.torrent` file loading and infohash computation.

use std::collections::BTreeMap;

use sha1::{Digest, Sha1};

use super::{FileEntry, InfoDictionary, Metainfo, MetainfoError};
use crate::bencode::{self, BencodeValue};
use crate::InfoHash;

type BencodeDict = BTreeMap<Vec<u8>, BencodeValue>;

impl Metainfo {
    /// Loads metainfo from the bytes of a `.torrent` file.
    ///
    /// The infohash is SHA-1 over the byte span the `info` value occupied in
    /// `data`; the buffer is retained so [`Metainfo::info_raw`] can return
    /// that exact slice.
    ///
    /// # Errors
    ///
    /// - `MetainfoError::Bencode` - The input is not well-formed bencode
    /// - `MetainfoError::MissingField` / `TypeMismatch` - Required structure is absent or mis-typed
    /// - `MetainfoError::PieceLayoutMismatch` - File lengths disagree with the piece count
    pub fn from_torrent(data: Vec<u8>) -> Result<Self, MetainfoError> {
        let capture = bencode::decode_with_info_span(&data)?;
        let root = capture
            .root
            .as_dict()
            .ok_or(MetainfoError::TypeMismatch { field: "root" })?;
        let info_span = capture
            .info_span
            .clone()
            .ok_or(MetainfoError::MissingField { field: "info" })?;

        let info_value = root
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField { field: "info" })?;
        let info_dict = info_value
            .as_dict()
            .ok_or(MetainfoError::TypeMismatch { field: "info" })?;

        let info = parse_info_dict(info_dict)?;
        validate_piece_layout(&info)?;

        let announce_list = collect_tracker_tiers(root);

        let mut hasher = Sha1::new();
        hasher.update(&data[info_span.clone()]);
        let info_hash = InfoHash::new(hasher.finalize().into());

        Ok(Metainfo::assemble(
            data,
            info_span,
            info,
            announce_list,
            info_hash,
        ))
    }
}

fn parse_info_dict(info: &BencodeDict) -> Result<InfoDictionary, MetainfoError> {
    let name = require_utf8(info, b"name", "info.name")?;

    let piece_length = require_integer(info, b"piece length", "info.piece length")?;
    if piece_length <= 0 || piece_length > i64::from(u32::MAX) {
        return Err(MetainfoError::TypeMismatch {
            field: "info.piece length",
        });
    }

    let pieces_blob = require_bytes(info, b"pieces", "info.pieces")?;
    if pieces_blob.len() % 20 != 0 {
        return Err(MetainfoError::TypeMismatch {
            field: "info.pieces",
        });
    }
    let pieces = pieces_blob
        .chunks_exact(20)
        .map(|chunk| {
            let mut digest = [0u8; 20];
            digest.copy_from_slice(chunk);
            digest
        })
        .collect();

    let files = match info.get(b"files".as_slice()) {
        Some(files_value) => multi_file_entries(files_value)?,
        None => single_file_entry(info, &name)?,
    };

    Ok(InfoDictionary {
        name,
        piece_length: piece_length as u32,
        pieces,
        files,
    })
}

fn single_file_entry(info: &BencodeDict, name: &str) -> Result<Vec<FileEntry>, MetainfoError> {
    let length = require_integer(info, b"length", "info.length")?;
    if length <= 0 {
        return Err(MetainfoError::TypeMismatch {
            field: "info.length",
        });
    }
    Ok(vec![FileEntry {
        path: vec![name.to_string()],
        length: length as u64,
        offset: 0,
    }])
}

fn multi_file_entries(files_value: &BencodeValue) -> Result<Vec<FileEntry>, MetainfoError> {
    let entries = files_value
        .as_list()
        .ok_or(MetainfoError::TypeMismatch { field: "info.files" })?;
    if entries.is_empty() {
        return Err(MetainfoError::TypeMismatch { field: "info.files" });
    }

    let mut files = Vec::with_capacity(entries.len());
    let mut running_offset = 0u64;

    for entry in entries {
        let entry_dict = entry.as_dict().ok_or(MetainfoError::TypeMismatch {
            field: "info.files entry",
        })?;

        let length = require_integer(entry_dict, b"length", "info.files.length")?;
        if length < 0 {
            return Err(MetainfoError::TypeMismatch {
                field: "info.files.length",
            });
        }

        let path_value = entry_dict
            .get(b"path".as_slice())
            .ok_or(MetainfoError::MissingField {
                field: "info.files.path",
            })?;
        let segments = path_value.as_list().ok_or(MetainfoError::TypeMismatch {
            field: "info.files.path",
        })?;
        let mut path = Vec::with_capacity(segments.len());
        for segment in segments {
            let text = segment.as_str().ok_or(MetainfoError::TypeMismatch {
                field: "info.files.path segment",
            })?;
            path.push(text.to_string());
        }

        files.push(FileEntry {
            path,
            length: length as u64,
            offset: running_offset,
        });
        running_offset += length as u64;
    }

    Ok(files)
}

/// Checks that `sum(lengths)` lands inside the final piece:
/// `piece_length * (count - 1) < total <= piece_length * count`.
fn validate_piece_layout(info: &InfoDictionary) -> Result<(), MetainfoError> {
    let total: u64 = info.files.iter().map(|file| file.length).sum();
    let count = info.pieces.len() as u64;
    let piece_length = u64::from(info.piece_length);

    let consistent = if count == 0 {
        total == 0
    } else {
        total > piece_length.saturating_mul(count - 1)
            && total <= piece_length.saturating_mul(count)
    };
    if !consistent {
        return Err(MetainfoError::PieceLayoutMismatch {
            reason: format!(
                "{total} bytes across {count} pieces of {piece_length}"
            ),
        });
    }
    Ok(())
}

/// BEP 12 `announce-list` (list of tiers), falling back to a single-tier
/// `announce`, else no tiers at all.
fn collect_tracker_tiers(root: &BencodeDict) -> Vec<Vec<String>> {
    let mut tiers = Vec::new();

    if let Some(tier_values) = root
        .get(b"announce-list".as_slice())
        .and_then(BencodeValue::as_list)
    {
        for tier_value in tier_values {
            let Some(urls) = tier_value.as_list() else {
                continue;
            };
            let tier: Vec<String> = urls
                .iter()
                .filter_map(BencodeValue::as_str)
                .map(str::to_string)
                .collect();
            if !tier.is_empty() {
                tiers.push(tier);
            }
        }
    }

    if tiers.is_empty() {
        if let Some(announce) = root
            .get(b"announce".as_slice())
            .and_then(BencodeValue::as_str)
        {
            tiers.push(vec![announce.to_string()]);
        }
    }

    tiers
}

fn require_integer(
    dict: &BencodeDict,
    key: &[u8],
    field: &'static str,
) -> Result<i64, MetainfoError> {
    match dict.get(key) {
        Some(value) => value
            .as_integer()
            .ok_or(MetainfoError::TypeMismatch { field }),
        None => Err(MetainfoError::MissingField { field }),
    }
}

fn require_bytes<'a>(
    dict: &'a BencodeDict,
    key: &[u8],
    field: &'static str,
) -> Result<&'a [u8], MetainfoError> {
    match dict.get(key) {
        Some(value) => value.as_bytes().ok_or(MetainfoError::TypeMismatch { field }),
        None => Err(MetainfoError::MissingField { field }),
    }
}

fn require_utf8(
    dict: &BencodeDict,
    key: &[u8],
    field: &'static str,
) -> Result<String, MetainfoError> {
    let bytes = require_bytes(dict, key, field)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| MetainfoError::TypeMismatch { field })
}
