// Mode S message classification and identity extraction
//
// Logged messages are hex strings. Only the 56-bit all-call reply (DF11) is
// decoded here, to recover the aircraft address when the log left it blank.

use serde::{Deserialize, Serialize};

use crate::constants::{DF_ALL_CALL, EXTENDED_HEX_LEN, SHORT_HEX_LEN};

/// Message length class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    /// 56-bit squitter
    Short,
    /// 112-bit extended squitter
    Extended,
    Unknown,
}

impl MessageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageClass::Short => "short",
            MessageClass::Extended => "extended",
            MessageClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MessageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DF11 (All-call reply) fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllCallReply {
    pub df: u8,
    /// Capability
    pub ca: u8,
    /// Announced address
    pub aa: u32,
}

impl AllCallReply {
    /// Decode a 7-byte message; `None` unless the downlink format is 11
    pub fn decode(buf: &[u8; 7]) -> Option<Self> {
        let df = (buf[0] & 0xf8) >> 3;
        if df != DF_ALL_CALL {
            return None;
        }
        let ca = buf[0] & 0x07;
        let aa = ((buf[1] as u32) << 16) | ((buf[2] as u32) << 8) | buf[3] as u32;
        Some(AllCallReply { df, ca, aa })
    }
}

/// Hex message with all whitespace removed
fn compact(message_hex: &str) -> String {
    message_hex.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Classify a message by hex length. Content is not validated.
pub fn classify(message_hex: &str) -> MessageClass {
    match compact(message_hex).len() {
        SHORT_HEX_LEN => MessageClass::Short,
        EXTENDED_HEX_LEN => MessageClass::Extended,
        _ => MessageClass::Unknown,
    }
}

/// Recover the 24-bit aircraft address from a DF11 all-call reply.
///
/// Returns the address as 6 lowercase hex digits, or `None` for anything
/// that is not a well-formed 56-bit DF11 message.
pub fn extract_identity(message_hex: &str) -> Option<String> {
    let s = compact(message_hex);
    if s.len() != SHORT_HEX_LEN {
        return None;
    }
    let mut buf = [0u8; 7];
    hex::decode_to_slice(&s, &mut buf).ok()?;
    AllCallReply::decode(&buf).map(|reply| format!("{:06x}", reply.aa))
}

/// Normalise a logged ICAO24 field: trimmed, spaces removed, lowercase,
/// exactly 6 hex digits.
pub fn normalize_identity(raw: &str) -> Option<String> {
    let s: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ' ')
        .collect::<String>()
        .to_lowercase();
    if s.len() == 6 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(s)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(classify("5d4840d6000000"), MessageClass::Short);
        // Content is not checked
        assert_eq!(classify("zzzzzzzzzzzzzz"), MessageClass::Short);
        assert_eq!(classify("8d4840d6202cc371c32ce0576098"), MessageClass::Extended);
        assert_eq!(classify(" 8d4840d6 202cc371 c32ce057 6098 "), MessageClass::Extended);
        assert_eq!(classify("5d4840d600"), MessageClass::Unknown);
        assert_eq!(classify("5d4840d6000000000000"), MessageClass::Unknown);
        assert_eq!(classify(""), MessageClass::Unknown);
    }

    #[test]
    fn test_extract_identity_crafted() {
        // DF=01011, CA=000, AA=0x00002a, parity zeroed
        assert_eq!(extract_identity("5800002a000000").as_deref(), Some("00002a"));
    }

    #[test]
    fn test_extract_identity_real_df11() {
        assert_eq!(extract_identity("5d4840d6000000").as_deref(), Some("4840d6"));
        assert_eq!(extract_identity("5D4840D6 000000").as_deref(), Some("4840d6"));
    }

    #[test]
    fn test_extract_identity_wrong_df() {
        // DF4 surveillance reply
        assert_eq!(extract_identity("20001838ca3804"), None);
        // DF17 payload cut to 14 chars
        assert_eq!(extract_identity("8d4840d6202cc3"), None);
    }

    #[test]
    fn test_extract_identity_malformed() {
        assert_eq!(extract_identity("5d4840d6"), None);
        assert_eq!(extract_identity("8d4840d6202cc371c32ce0576098"), None);
        assert_eq!(extract_identity("5g4840d6000000"), None);
        assert_eq!(extract_identity("+d4840d6000000"), None);
        assert_eq!(extract_identity(""), None);
    }

    #[test]
    fn test_all_call_reply_fields() {
        let reply = AllCallReply::decode(&[0x5d, 0x48, 0x40, 0xd6, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(reply.df, 11);
        assert_eq!(reply.ca, 5);
        assert_eq!(reply.aa, 0x4840d6);
    }

    #[test]
    fn test_normalize_identity() {
        assert_eq!(normalize_identity("8991A2").as_deref(), Some("8991a2"));
        assert_eq!(normalize_identity("  89 91a2 ").as_deref(), Some("8991a2"));
        assert_eq!(normalize_identity(""), None);
        assert_eq!(normalize_identity("      "), None);
        assert_eq!(normalize_identity("8991a"), None);
        assert_eq!(normalize_identity("8991a2f"), None);
        assert_eq!(normalize_identity("8991g2"), None);
    }
}
