//! Plain-text decoding with best-effort charset detection.

use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;

use crate::ExtractFailure;

/// Read a `.txt` file of unknown encoding.
pub(crate) fn read_text_file(path: &Path) -> Result<String, ExtractFailure> {
    let bytes = std::fs::read(path).map_err(|e| ExtractFailure::Read(e.to_string()))?;
    Ok(decode_bytes(&bytes))
}

/// Decode bytes of unknown encoding: BOM first, then a `chardetng` guess.
///
/// Malformed sequences become U+FFFD rather than failing.
pub fn decode_bytes(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);

    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through() {
        assert_eq!(decode_bytes("Délai d'exécution".as_bytes()), "Délai d'exécution");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("Marché".as_bytes());
        assert_eq!(decode_bytes(&bytes), "Marché");
    }

    #[test]
    fn utf16le_bom_is_honoured() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Lot".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode_bytes(&bytes), "Lot");
    }

    #[test]
    fn latin1_is_detected() {
        let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode("Procédure négociée ouverte à tous");
        assert_eq!(decode_bytes(&bytes), "Procédure négociée ouverte à tous");
    }

    #[test]
    fn empty_input() {
        assert_eq!(decode_bytes(b""), "");
    }
}
