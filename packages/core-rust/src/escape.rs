//! Percent-escaping for URL path segments, query values, and form bodies.
//!
//! ASCII letters and digits are always safe. Every other byte outside the
//! profile's safe set is written as `%XX` with uppercase hex, so multi-byte
//! code points come out as their UTF-8 percent sequence (`é` -> `%C3%A9`).
//!
//! [`escape`] returns `Cow::Borrowed` when nothing needed escaping, so the
//! common all-safe case never allocates.

use std::borrow::Cow;

use percent_encoding::{percent_encode, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Errors from building an [`EscapeProfile`] or escaping UTF-16 input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EscapeError {
    #[error("space cannot be a safe character when spaces are escaped as '+'")]
    SpaceConflict,
    #[error("safe character set must be ASCII, found {0:?}")]
    NonAsciiSafeChar(char),
    #[error("unpaired surrogate 0x{unit:04X} at index {index}")]
    UnpairedSurrogate { index: usize, unit: u16 },
}

/// Configuration for [`escape`]: which ASCII characters pass through verbatim
/// and whether a space is written as `+`.
pub struct EscapeProfile {
    /// Bytes that get percent-encoded. With `use_plus_for_space` the space is
    /// left out of the set and rewritten to `+` after encoding.
    encode: AsciiSet,
    use_plus_for_space: bool,
}

impl EscapeProfile {
    /// Safe set for path segments.
    pub const PATH: EscapeProfile = EscapeProfile::from_known(b"-._~!$'()*,;&=@:", false);

    /// Safe set for query names and values.
    pub const QUERY: EscapeProfile = EscapeProfile::from_known(b"-_.!~*'()@:$,;/?", false);

    /// Safe set for `application/x-www-form-urlencoded` bodies.
    pub const FORM: EscapeProfile = EscapeProfile::from_known(b"-_.*", true);

    /// Builds a profile from a set of extra safe characters.
    ///
    /// # Errors
    ///
    /// Returns [`EscapeError::SpaceConflict`] if `safe_chars` contains a space
    /// while `use_plus_for_space` is set, and [`EscapeError::NonAsciiSafeChar`]
    /// for any non-ASCII safe character.
    pub fn new(safe_chars: &str, use_plus_for_space: bool) -> Result<Self, EscapeError> {
        if let Some(c) = safe_chars.chars().find(|c| !c.is_ascii()) {
            return Err(EscapeError::NonAsciiSafeChar(c));
        }
        if use_plus_for_space && safe_chars.contains(' ') {
            return Err(EscapeError::SpaceConflict);
        }
        Ok(Self::from_known(safe_chars.as_bytes(), use_plus_for_space))
    }

    /// Const constructor for the built-in profiles; input is already known valid.
    const fn from_known(safe_chars: &[u8], use_plus_for_space: bool) -> Self {
        let mut encode = if use_plus_for_space {
            NON_ALPHANUMERIC.remove(b' ')
        } else {
            NON_ALPHANUMERIC.add(b' ')
        };
        let mut i = 0;
        while i < safe_chars.len() {
            encode = encode.remove(safe_chars[i]);
            i += 1;
        }
        Self {
            encode,
            use_plus_for_space,
        }
    }

    /// Whether this byte passes through unescaped.
    #[must_use]
    pub fn is_safe(&self, byte: u8) -> bool {
        if byte == b' ' && self.use_plus_for_space {
            return false;
        }
        percent_encode(std::slice::from_ref(&byte), &self.encode)
            .next()
            .is_some_and(|chunk| chunk.len() == 1)
    }

    /// Whether a space is written as `+` rather than `%20`.
    #[must_use]
    pub fn use_plus_for_space(&self) -> bool {
        self.use_plus_for_space
    }
}

impl std::fmt::Debug for EscapeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let extra: String = (0u8..128)
            .filter(|b| self.is_safe(*b) && !b.is_ascii_alphanumeric())
            .map(char::from)
            .collect();
        f.debug_struct("EscapeProfile")
            .field("safe", &extra)
            .field("use_plus_for_space", &self.use_plus_for_space)
            .finish()
    }
}

/// Escapes `input` according to `profile`.
#[must_use]
pub fn escape<'a>(input: &'a str, profile: &EscapeProfile) -> Cow<'a, str> {
    let encoded: Cow<'a, str> = utf8_percent_encode(input, &profile.encode).into();
    if profile.use_plus_for_space && encoded.contains(' ') {
        Cow::Owned(encoded.replace(' ', "+"))
    } else {
        encoded
    }
}

/// Escapes UTF-16 input, decoding surrogate pairs into supplementary code points.
///
/// # Errors
///
/// Returns [`EscapeError::UnpairedSurrogate`] with the code-unit index of the
/// first lone surrogate.
pub fn escape_utf16(units: &[u16], profile: &EscapeProfile) -> Result<String, EscapeError> {
    let mut decoded = String::with_capacity(units.len());
    let mut index = 0;
    for item in char::decode_utf16(units.iter().copied()) {
        match item {
            Ok(c) => {
                decoded.push(c);
                index += c.len_utf16();
            }
            Err(e) => {
                return Err(EscapeError::UnpairedSurrogate {
                    index,
                    unit: e.unpaired_surrogate(),
                })
            }
        }
    }
    Ok(escape(&decoded, profile).into_owned())
}
