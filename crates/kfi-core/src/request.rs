//! Injection request parsing.
//!
//! A request is `"<pid>"`, `"<pid> <register>"` or `"<pid> <register> <bit>"`.
//! Each field is an integer in C notation: decimal, `0x` hex, or `0` octal.

use tracing::debug;

use crate::error::{Error, Result};

/// Longest request accepted at the boundary (bytes).
pub const MAX_REQUEST_LEN: usize = 500;

/// A parsed injection request.
///
/// Register and bit selectors are kept exactly as written, including
/// out-of-range values; the fault selector decides what to do with them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectionRequest {
    pub pid: i32,
    pub register: Option<i64>,
    pub bit: Option<i64>,
}

impl InjectionRequest {
    /// Request a fully random fault in `pid`.
    pub fn random(pid: i32) -> Self {
        Self {
            pid,
            register: None,
            bit: None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut fields = raw.split_whitespace();

        let pid_field = fields
            .next()
            .ok_or_else(|| Error::MalformedInput("missing process id".to_string()))?;
        let pid = parse_integer(pid_field)
            .ok_or_else(|| Error::MalformedInput(format!("invalid process id '{pid_field}'")))?;
        let pid = i32::try_from(pid)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| Error::MalformedInput(format!("process id out of range: {pid}")))?;

        let register = fields.next().and_then(|f| optional_field("register", f));
        let bit = fields.next().and_then(|f| optional_field("bit", f));

        let extra = fields.count();
        if extra > 0 {
            debug!("Ignoring {} extra field(s) in request", extra);
        }

        Ok(Self { pid, register, bit })
    }
}

impl std::str::FromStr for InjectionRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn optional_field(label: &str, field: &str) -> Option<i64> {
    let value = parse_integer(field);
    if value.is_none() {
        debug!("Unparseable {} field '{}', treating as unset", label, field);
    }
    value
}

/// Parse an integer with an optional sign and C base prefix.
pub(crate) fn parse_integer(field: &str) -> Option<i64> {
    let (negative, digits) = match field.as_bytes().first() {
        Some(b'-') => (true, &field[1..]),
        Some(b'+') => (false, &field[1..]),
        _ => (false, field),
    };

    let (radix, body) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    // from_str_radix would accept a second sign here
    if body.is_empty() || body.starts_with(['+', '-']) {
        return None;
    }

    let magnitude = i64::from_str_radix(body, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
