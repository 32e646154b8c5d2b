//! Canonical serialization and content hashing.
//!
//! Every content-addressed entity (events, quorums) is identified by the
//! SHA-1 of its canonical JSON form, rendered as 40 lowercase hex chars.
//!
//! Canonical form rules:
//! - Compact: no whitespace between tokens.
//! - Struct fields in declaration order; map keys sorted lexicographically.
//!   Entity types must therefore use `BTreeMap` for their mappings.
//! - `<`, `>`, `&`, U+2028 and U+2029 inside strings are escaped as `\u00XX`
//!   style sequences.
//! - Floats use the shortest round-trip digits with no trailing `.0`;
//!   magnitudes outside `[1e-6, 1e21)` use exponent form with an explicit
//!   sign on positive exponents (`1e+21`, `1.5e-7`).
//! - Integers beyond 2^53 in magnitude are written as the nearest `f64`
//!   under the float rules (`12345678901234567891` becomes
//!   `12345678901234567000`), since every number in the established byte
//!   stream passed through a double.
//!
//! These rules reproduce the byte stream that existing deje documents were
//! hashed with, so hashes stay interoperable.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};
use sha1::{Digest, Sha1};

use crate::error::ErrorCode;

/// Length of a hex-encoded content hash.
pub const HASH_HEX_LEN: usize = 40;

/// Errors from canonical serialization.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// The value has no JSON representation (e.g. a map with non-string keys).
    #[error("value cannot be serialized canonically: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl HashError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::UnsupportedType
    }
}

/// Integers up to this magnitude are exact in an `f64`.
const MAX_EXACT_INT: u64 = 1 << 53;

/// `serde_json` formatter producing the canonical byte stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanonicalFormatter;

impl Formatter for CanonicalFormatter {
    fn write_i64<W>(&mut self, writer: &mut W, value: i64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if value.unsigned_abs() > MAX_EXACT_INT {
            #[allow(clippy::cast_precision_loss)]
            return self.write_f64(writer, value as f64);
        }
        write!(writer, "{value}")
    }

    fn write_u64<W>(&mut self, writer: &mut W, value: u64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if value > MAX_EXACT_INT {
            #[allow(clippy::cast_precision_loss)]
            return self.write_f64(writer, value as f64);
        }
        write!(writer, "{value}")
    }

    fn write_i128<W>(&mut self, writer: &mut W, value: i128) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if value.unsigned_abs() > u128::from(MAX_EXACT_INT) {
            #[allow(clippy::cast_precision_loss)]
            return self.write_f64(writer, value as f64);
        }
        write!(writer, "{value}")
    }

    fn write_u128<W>(&mut self, writer: &mut W, value: u128) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if value > u128::from(MAX_EXACT_INT) {
            #[allow(clippy::cast_precision_loss)]
            return self.write_f64(writer, value as f64);
        }
        write!(writer, "{value}")
    }

    fn write_f32<W>(&mut self, writer: &mut W, value: f32) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.write_f64(writer, f64::from(value))
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(format_float(value).as_bytes())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let bytes = fragment.as_bytes();
        let mut start = 0;
        for (i, ch) in fragment.char_indices() {
            let escaped = match ch {
                '<' => "\\u003c",
                '>' => "\\u003e",
                '&' => "\\u0026",
                '\u{2028}' => "\\u2028",
                '\u{2029}' => "\\u2029",
                _ => continue,
            };
            writer.write_all(&bytes[start..i])?;
            writer.write_all(escaped.as_bytes())?;
            start = i + ch.len_utf8();
        }
        writer.write_all(&bytes[start..])
    }
}

fn format_float(value: f64) -> String {
    let abs = value.abs();
    if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        let text = format!("{value:e}");
        match text.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => text,
        }
    } else {
        format!("{value}")
    }
}

/// Serialize `value` to its canonical byte form.
///
/// # Errors
///
/// Returns [`HashError::Serialize`] if `value` has no JSON representation.
pub fn canonical_bytes<T>(value: &T) -> Result<Vec<u8>, HashError>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::with_capacity(128);
    let mut ser = Serializer::with_formatter(&mut buf, CanonicalFormatter);
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Canonical form as a string (for logs and diagnostics).
///
/// # Errors
///
/// Same as [`canonical_bytes`].
pub fn canonicalize<T>(value: &T) -> Result<String, HashError>
where
    T: Serialize + ?Sized,
{
    let bytes = canonical_bytes(value)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Hex-encoded SHA-1 of raw bytes.
#[must_use]
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Content hash of `value`: SHA-1 over its canonical form.
///
/// # Errors
///
/// Same as [`canonical_bytes`].
pub fn hash_object<T>(value: &T) -> Result<String, HashError>
where
    T: Serialize + ?Sized,
{
    Ok(digest_hex(&canonical_bytes(value)?))
}

/// Returns `true` if `s` looks like a content hash (40 lowercase hex chars).
#[must_use]
pub fn is_hash(s: &str) -> bool {
    s.len() == HASH_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
