//! Location strings.
//!
//! ```text
//! location  = [protocol "://"] (txid | temp) "_" category index
//! temp      = "_" ("d" | "o") index          ; inside a pending batch
//! error     = "error://" reason
//! category  = "o" | "i" | "r"                ; output, input, ref
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BindingError, BindingResult};

/// Prefix of the terminal error marker.
pub const ERROR_PREFIX: &str = "error://";

/// What a confirmed location points at inside its transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// A transaction output.
    Output,
    /// A transaction input.
    Input,
    /// A read-only reference.
    Ref,
}

impl Category {
    fn letter(self) -> char {
        match self {
            Self::Output => 'o',
            Self::Input => 'i',
            Self::Ref => 'r',
        }
    }

    fn from_letter(c: char) -> Option<Self> {
        match c {
            'o' => Some(Self::Output),
            'i' => Some(Self::Input),
            'r' => Some(Self::Ref),
            _ => None,
        }
    }
}

/// Kind of temporary location handed out while a batch is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TempKind {
    /// A code deployment, `_d<N>`.
    Deploy,
    /// A jig output, `_o<N>`.
    Output,
}

impl TempKind {
    fn letter(self) -> char {
        match self {
            Self::Deploy => 'd',
            Self::Output => 'o',
        }
    }
}

/// A parsed location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// A confirmed position `<txid>_<category><index>`, optionally behind
    /// one `<protocol>://` indirection.
    Confirmed {
        /// Indirection protocol, if any.
        protocol: Option<String>,
        /// Transaction id.
        txid: String,
        /// Output, input, or ref.
        category: Category,
        /// Position within the category.
        index: u32,
    },
    /// A placeholder assigned at enqueue time.
    Temporary {
        /// Deploy or output.
        kind: TempKind,
        /// Enqueue position in the batch.
        index: u32,
    },
    /// The terminal error marker.
    Error(String),
}

impl Location {
    /// An output of `txid`.
    #[must_use]
    pub fn output(txid: impl Into<String>, index: u32) -> Self {
        Self::Confirmed {
            protocol: None,
            txid: txid.into(),
            category: Category::Output,
            index,
        }
    }

    /// Parse a location string.
    ///
    /// # Errors
    ///
    /// [`BindingError::InvalidLocation`] when `s` does not follow the grammar.
    pub fn parse(s: &str) -> BindingResult<Self> {
        let bad = || BindingError::InvalidLocation(s.to_owned());
        if let Some(reason) = s.strip_prefix(ERROR_PREFIX) {
            return Ok(Self::Error(reason.to_owned()));
        }
        let (protocol, rest) = match s.split_once("://") {
            Some((p, rest)) if !p.is_empty() && !rest.contains("://") => (Some(p.to_owned()), rest),
            Some(_) => return Err(bad()),
            None => (None, s),
        };
        if let Some(temp) = rest.strip_prefix('_') {
            if protocol.is_some() {
                return Err(bad());
            }
            let mut chars = temp.chars();
            let kind = match chars.next() {
                Some('d') => TempKind::Deploy,
                Some('o') => TempKind::Output,
                _ => return Err(bad()),
            };
            let index = parse_index(chars.as_str()).ok_or_else(bad)?;
            return Ok(Self::Temporary { kind, index });
        }
        let (txid, tail) = rest.rsplit_once('_').ok_or_else(bad)?;
        if txid.is_empty() || !txid.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(bad());
        }
        let mut chars = tail.chars();
        let category = chars.next().and_then(Category::from_letter).ok_or_else(bad)?;
        let index = parse_index(chars.as_str()).ok_or_else(bad)?;
        Ok(Self::Confirmed {
            protocol,
            txid: txid.to_owned(),
            category,
            index,
        })
    }

    /// Whether this is a placeholder from a pending batch.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary { .. })
    }

    /// Whether this is the error marker.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Transaction id of a confirmed location.
    #[must_use]
    pub fn txid(&self) -> Option<&str> {
        match self {
            Self::Confirmed { txid, .. } => Some(txid),
            _ => None,
        }
    }

    /// Output, temp, or category index.
    #[must_use]
    pub fn index(&self) -> Option<u32> {
        match self {
            Self::Confirmed { index, .. } | Self::Temporary { index, .. } => Some(*index),
            Self::Error(_) => None,
        }
    }
}

fn parse_index(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return None;
    }
    digits.parse().ok()
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed {
                protocol,
                txid,
                category,
                index,
            } => {
                if let Some(p) = protocol {
                    write!(f, "{p}://")?;
                }
                write!(f, "{txid}_{}{index}", category.letter())
            },
            Self::Temporary { kind, index } => write!(f, "_{}{index}", kind.letter()),
            Self::Error(reason) => write!(f, "{ERROR_PREFIX}{reason}"),
        }
    }
}

impl FromStr for Location {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confirmed_and_indirect() {
        let loc = Location::parse("abc123_o2").unwrap();
        assert_eq!(loc, Location::output("abc123", 2));
        assert_eq!(loc.to_string(), "abc123_o2");

        let indirect = Location::parse("native://ff00_r0").unwrap();
        assert!(matches!(
            &indirect,
            Location::Confirmed { protocol: Some(p), category: Category::Ref, .. } if p == "native"
        ));
        assert_eq!(indirect.to_string(), "native://ff00_r0");
    }

    #[test]
    fn test_parse_temporary_and_error() {
        assert_eq!(
            Location::parse("_d0").unwrap(),
            Location::Temporary { kind: TempKind::Deploy, index: 0 }
        );
        assert!(Location::parse("_o12").unwrap().is_temporary());
        let err = Location::parse("error://Broadcast failed: no funds").unwrap();
        assert_eq!(err, Location::Error("Broadcast failed: no funds".to_owned()));
        assert_eq!(err.to_string(), "error://Broadcast failed: no funds");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "abc", "abc_x1", "abc_o", "abc_o01", "_x1", "a://b://c_o1", "://abc_o1", "p://_d1"] {
            assert!(Location::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_serde_uses_string_form() {
        let json = serde_json::to_string(&Location::output("aa", 1)).unwrap();
        assert_eq!(json, "\"aa_o1\"");
        let back: Location = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index(), Some(1));
    }
}
