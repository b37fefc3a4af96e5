//! # Wire Protocol
//!
//! Plaintext protocol spoken between producers, control panels and the broker.
//!
//! ```text
//! client -> broker   [<clientId>:<password>]          handshake, once, unterminated
//! broker -> client   [SERVER]Connected\n              acknowledgement, once
//! either direction   <recipientId>:<payload>\n        value / command frame
//! either direction   [<recipientId>]<payload>\n       control panel form
//! broker -> all      [SERVER]LED_UPDATE@0x<hh>\n      actuation notification
//! ```
//!
//! The broker does not frame inbound traffic: every chunk read from the socket
//! is one message. Parsers here are lenient: a bad credential degrades to a
//! default and a bad LED level is a protocol error the session skips.

use std::fmt;

use super::error::{RelayError, Result};
use super::value::Value;

/// Acknowledgement the broker sends right after reading the credential frame.
pub const SERVER_ACK: &str = "[SERVER]Connected\n";

/// Client id used when the credential frame cannot be parsed.
pub const UNKNOWN_CLIENT: &str = "Unknown";

/// Recipient marker meaning "every connected client".
pub const BROADCAST_MARKER: &str = "ALLMSG";

/// Marker that introduces an LED command inside a payload.
pub const LED_COMMAND: &str = "LED@";

/// Longest client id accepted from a credential frame.
pub const MAX_CLIENT_ID_LEN: usize = 48;

// ============================================================================
// CREDENTIALS
// ============================================================================

/// Shared-secret login sent once, immediately after connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub client_id: String,
    pub password: String,
}

impl Credential {
    pub fn new(client_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            password: password.into(),
        }
    }

    /// Encode as `[id:password]`, with no line terminator.
    pub fn encode(&self) -> String {
        format!("[{}:{}]", self.client_id, self.password)
    }
}

/// Outcome of scanning the first bytes of a connection for a credential frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScan {
    /// Extracted id, or [`UNKNOWN_CLIENT`] when none could be found.
    pub client_id: String,
    /// Number of leading bytes that belong to the handshake.
    pub consumed: usize,
}

/// Whether `buf` holds enough of the handshake to stop reading.
///
/// A buffer that does not open with `[` will never become a credential, so it
/// is complete as soon as it is non-empty.
pub fn credential_complete(buf: &[u8]) -> bool {
    match buf.first() {
        None => false,
        Some(b'[') => buf.contains(&b']'),
        Some(_) => true,
    }
}

/// Extract the client id from a handshake buffer.
///
/// The id is the text between the opening `[` and the first `:` (or `]` when
/// there is no colon). The handshake ends at the first `]`; bytes after it are
/// left for the caller to treat as ordinary traffic. Without a closing bracket
/// the whole buffer is consumed.
pub fn scan_credential(buf: &[u8]) -> CredentialScan {
    let consumed = buf
        .iter()
        .position(|&b| b == b']')
        .map(|pos| pos + 1)
        .unwrap_or(buf.len());

    let client_id = extract_client_id(buf).unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    CredentialScan { client_id, consumed }
}

fn extract_client_id(buf: &[u8]) -> Option<String> {
    if buf.first() != Some(&b'[') {
        return None;
    }
    let end = buf
        .iter()
        .position(|&b| b == b':')
        .or_else(|| buf.iter().position(|&b| b == b']'))?;
    let id = &buf[1..end];
    if id.is_empty() || id.len() > MAX_CLIENT_ID_LEN {
        return None;
    }
    Some(String::from_utf8_lossy(id).into_owned())
}

// ============================================================================
// FRAMES
// ============================================================================

/// Addressee of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Broadcast,
    Client(String),
}

impl Recipient {
    pub fn from_id(id: &str) -> Self {
        if id.is_empty() || id == BROADCAST_MARKER {
            Recipient::Broadcast
        } else {
            Recipient::Client(id.to_string())
        }
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Broadcast => f.write_str(BROADCAST_MARKER),
            Recipient::Client(id) => f.write_str(id),
        }
    }
}

/// One logical protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub recipient: Recipient,
    pub payload: String,
}

impl Frame {
    pub fn new(recipient: Recipient, payload: impl Into<String>) -> Self {
        Self {
            recipient,
            payload: payload.into(),
        }
    }

    /// Frame carrying a control value, as sent by producers.
    pub fn value(recipient: Recipient, value: Value) -> Self {
        Self::new(recipient, value.to_string())
    }

    /// Encode as `<recipientId>:<payload>\n`.
    pub fn encode(&self) -> String {
        let mut wire = format!("{}:{}", self.recipient, self.payload);
        if !wire.ends_with('\n') {
            wire.push('\n');
        }
        wire
    }
}

// ============================================================================
// LED COMMANDS
// ============================================================================

/// Find `LED@<value>` anywhere in `text` and parse the value.
///
/// The value is hexadecimal with a `0x` prefix, decimal otherwise; only the
/// leading digits count, so `LED@0x80\n` and `LED@12abc` both parse. Values
/// are clamped into 0..=255, so `LED@-5` means off.
///
/// Returns `Ok(None)` when the marker is absent and a protocol error when no
/// digits follow it.
pub fn parse_led_command(text: &str) -> Result<Option<Value>> {
    let Some(at) = text.find(LED_COMMAND) else {
        return Ok(None);
    };
    let token = &text[at + LED_COMMAND.len()..];
    parse_level(token).map(Some).ok_or_else(|| {
        let shown: String = token.trim_end().chars().take(16).collect();
        RelayError::Protocol(format!("bad LED level '{shown}'"))
    })
}

fn parse_level(token: &str) -> Option<Value> {
    if let Some(hex) = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        let digits = leading(hex, |c| c.is_ascii_hexdigit());
        if digits.is_empty() {
            return None;
        }
        return Some(clamp_digits(digits, 16, false));
    }

    let (negative, unsigned) = match token.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, token),
    };
    let digits = leading(unsigned, |c| c.is_ascii_digit());
    if digits.is_empty() {
        return None;
    }
    Some(clamp_digits(digits, 10, negative))
}

fn clamp_digits(digits: &str, radix: u32, negative: bool) -> Value {
    if negative {
        return Value::MIN;
    }
    // Digit runs too long for u64 are necessarily above 255.
    let raw = u64::from_str_radix(digits, radix).unwrap_or(u64::MAX);
    Value::clamped(raw.min(i64::MAX as u64) as i64)
}

fn leading(s: &str, pred: impl Fn(char) -> bool) -> &str {
    let end = s.find(|c: char| !pred(c)).unwrap_or(s.len());
    &s[..end]
}

/// Notification broadcast to every client after an actuation.
pub fn led_update_notification(value: Value) -> String {
    format!("[SERVER]LED_UPDATE@0x{:02x}\n", value.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_encoding() {
        assert_eq!(Credential::new("3", "PASSWD").encode(), "[3:PASSWD]");
    }

    #[test]
    fn test_scan_well_formed_credential() {
        let scan = scan_credential(b"[42:secret]");
        assert_eq!(scan.client_id, "42");
        assert_eq!(scan.consumed, 11);
    }

    #[test]
    fn test_scan_credential_without_separator() {
        let scan = scan_credential(b"hello there");
        assert_eq!(scan.client_id, UNKNOWN_CLIENT);
        assert_eq!(scan.consumed, 11);

        let scan = scan_credential(b"[noseparator");
        assert_eq!(scan.client_id, UNKNOWN_CLIENT);
    }

    #[test]
    fn test_scan_credential_bracket_only() {
        assert_eq!(scan_credential(b"[KSH_QT]").client_id, "KSH_QT");
    }

    #[test]
    fn test_scan_credential_rejects_empty_and_long_ids() {
        assert_eq!(scan_credential(b"[:pw]").client_id, UNKNOWN_CLIENT);
        let long = format!("[{}:pw]", "x".repeat(MAX_CLIENT_ID_LEN + 1));
        assert_eq!(scan_credential(long.as_bytes()).client_id, UNKNOWN_CLIENT);
    }

    #[test]
    fn test_scan_credential_leaves_trailing_traffic() {
        let buf = b"[3:PASSWD]2:128\n";
        let scan = scan_credential(buf);
        assert_eq!(scan.client_id, "3");
        assert_eq!(&buf[scan.consumed..], b"2:128\n");
    }

    #[test]
    fn test_credential_completeness() {
        assert!(!credential_complete(b""));
        assert!(!credential_complete(b"[4"));
        assert!(!credential_complete(b"[42:sec"));
        assert!(credential_complete(b"[42:secret]"));
        assert!(credential_complete(b"42:secret"));
    }

    #[test]
    fn test_value_frame_encoding() {
        let frame = Frame::value(Recipient::Client("2".into()), Value::new(77));
        assert_eq!(frame.encode(), "2:77\n");
    }

    #[test]
    fn test_led_command_parsing() {
        let level = |text: &str| parse_led_command(text).unwrap();
        assert_eq!(level("LED@0x80"), Some(Value::new(128)));
        assert_eq!(level("[KSH_QT]LED@0xff\n"), Some(Value::new(255)));
        assert_eq!(level("LED@42\n"), Some(Value::new(42)));
        assert_eq!(level("LED@12abc"), Some(Value::new(12)));
        assert_eq!(level("LED@300"), Some(Value::MAX));
        assert_eq!(level("LED@99999999999999999999999"), Some(Value::MAX));
        assert_eq!(level("no command here"), None);
    }

    #[test]
    fn test_negative_led_level_clamps_to_off() {
        assert_eq!(parse_led_command("LED@-5").unwrap(), Some(Value::MIN));
        assert_eq!(parse_led_command("2:LED@-300\n").unwrap(), Some(Value::MIN));
    }

    #[test]
    fn test_malformed_led_level_is_protocol_error() {
        for text in ["LED@abc", "LED@0x", "LED@-", "LED@\n"] {
            let err = parse_led_command(text).unwrap_err();
            assert!(matches!(err, RelayError::Protocol(_)), "{text}: {err}");
        }
    }

    #[test]
    fn test_led_update_notification() {
        assert_eq!(led_update_notification(Value::new(0x80)), "[SERVER]LED_UPDATE@0x80\n");
        assert_eq!(led_update_notification(Value::new(5)), "[SERVER]LED_UPDATE@0x05\n");
    }
}
