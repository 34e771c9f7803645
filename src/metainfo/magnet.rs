//! Magnet URI loading.

use data_encoding::BASE32;
use percent_encoding::percent_decode_str;

use super::{InfoDictionary, Metainfo, MetainfoError};
use crate::InfoHash;

const BTIH_PREFIX: &str = "urn:btih:";

impl Metainfo {
    /// Loads metainfo from a magnet URI.
    ///
    /// Recognized parameters: `xt` (`urn:btih:` with 40 hex or 32 base32
    /// characters), `dn` (display name), and `tr` (tracker URL, one tier per
    /// occurrence, deduplicated). Pieces, piece length, and files stay empty;
    /// fetching metadata from peers is a collaborator's job.
    ///
    /// # Errors
    ///
    /// - `MetainfoError::NotMagnet` - Missing `magnet:?` prefix
    /// - `MetainfoError::MissingField` - No `xt=urn:btih:` parameter
    /// - `MetainfoError::InvalidInfohashEncoding` - Hash is not decodable hex/base32
    /// - `MetainfoError::UnsupportedMagnetHashEncoding` - Hash length matches neither encoding
    pub fn from_magnet(uri: &str) -> Result<Self, MetainfoError> {
        let query = uri.strip_prefix("magnet:?").ok_or(MetainfoError::NotMagnet)?;

        let mut name = String::new();
        let mut tiers: Vec<Vec<String>> = Vec::new();
        let mut info_hash: Option<InfoHash> = None;

        for pair in query.split('&') {
            let (key, raw_value) = match pair.split_once('=') {
                Some((key, value)) => (key, value),
                None => (pair, ""),
            };
            let value = percent_decode_str(raw_value)
                .decode_utf8_lossy()
                .into_owned();

            match key {
                "dn" => name = value,
                "tr" => {
                    // Each tracker becomes its own single-endpoint tier,
                    // deduplicated across all tiers.
                    if !tiers.iter().any(|tier| tier.contains(&value)) {
                        tiers.push(vec![value]);
                    }
                }
                "xt" => {
                    if let Some(hash_text) = value.strip_prefix(BTIH_PREFIX) {
                        info_hash = Some(decode_btih(hash_text)?);
                    }
                }
                _ => {}
            }
        }

        let info_hash = info_hash.ok_or(MetainfoError::MissingField { field: "xt" })?;

        Ok(Metainfo::assemble(
            Vec::new(),
            0..0,
            InfoDictionary {
                name,
                ..InfoDictionary::default()
            },
            tiers,
            info_hash,
        ))
    }
}

/// Decodes a btih hash in either of its two textual encodings: 40 hex
/// characters or 32 base32 characters (RFC 4648 alphabet).
fn decode_btih(text: &str) -> Result<InfoHash, MetainfoError> {
    match text.len() {
        40 => text.parse(),
        32 => {
            let decoded = BASE32
                .decode(text.to_ascii_uppercase().as_bytes())
                .map_err(|_| MetainfoError::InvalidInfohashEncoding)?;
            let bytes: [u8; 20] = decoded
                .try_into()
                .map_err(|_| MetainfoError::InvalidInfohashEncoding)?;
            Ok(InfoHash::new(bytes))
        }
        _ => Err(MetainfoError::UnsupportedMagnetHashEncoding),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_magnet_basic() {
        let metainfo = Metainfo::from_magnet(
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=foo&tr=udp%3A%2F%2Fhost%3A1234",
        )
        .unwrap();

        let expected: InfoHash = "0123456789abcdef0123456789abcdef01234567".parse().unwrap();
        assert_eq!(metainfo.info_hash(), expected);
        assert_eq!(metainfo.info.name, "foo");
        assert_eq!(
            metainfo.announce_list,
            vec![vec!["udp://host:1234".to_string()]]
        );
        assert!(metainfo.info.pieces.is_empty());
        assert_eq!(metainfo.info.piece_length, 0);
        assert!(metainfo.info.files.is_empty());
        assert!(metainfo.info_raw().is_empty());
    }

    #[test]
    fn test_from_magnet_base32_hash() {
        // 32 base32 chars decode to 20 bytes; all-'A' decodes to all zeroes.
        let metainfo =
            Metainfo::from_magnet("magnet:?xt=urn:btih:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
        assert_eq!(metainfo.info_hash(), InfoHash::new([0u8; 20]));
    }

    #[test]
    fn test_from_magnet_deduplicates_trackers() {
        let metainfo = Metainfo::from_magnet(
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567\
             &tr=udp%3A%2F%2Fa%3A1&tr=udp%3A%2F%2Fb%3A2&tr=udp%3A%2F%2Fa%3A1",
        )
        .unwrap();
        assert_eq!(
            metainfo.announce_list,
            vec![
                vec!["udp://a:1".to_string()],
                vec!["udp://b:2".to_string()],
            ]
        );
    }

    #[test]
    fn test_from_magnet_percent_decodes_name() {
        let metainfo = Metainfo::from_magnet(
            "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567&dn=My%20File",
        )
        .unwrap();
        assert_eq!(metainfo.info.name, "My File");
    }

    #[test]
    fn test_from_magnet_rejects_non_magnet() {
        assert!(matches!(
            Metainfo::from_magnet("http://example/file.torrent"),
            Err(MetainfoError::NotMagnet)
        ));
    }

    #[test]
    fn test_from_magnet_requires_xt() {
        assert!(matches!(
            Metainfo::from_magnet("magnet:?dn=foo"),
            Err(MetainfoError::MissingField { field: "xt" })
        ));
    }

    #[test]
    fn test_from_magnet_rejects_bad_hash_lengths() {
        assert!(matches!(
            Metainfo::from_magnet("magnet:?xt=urn:btih:abcd"),
            Err(MetainfoError::UnsupportedMagnetHashEncoding)
        ));
    }

    #[test]
    fn test_from_magnet_rejects_invalid_hex() {
        let bad_hex = "zz23456789abcdef0123456789abcdef01234567";
        assert!(matches!(
            Metainfo::from_magnet(&format!("magnet:?xt=urn:btih:{bad_hex}")),
            Err(MetainfoError::InvalidInfohashEncoding)
        ));
    }
}
