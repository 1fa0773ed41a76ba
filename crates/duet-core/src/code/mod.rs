//! Peer ids and pairing links.
//!
//! Every session is identified by a short peer id. The id is shared with the
//! other device as a pairing link (`<base>?code=<id>`), which the UI may
//! render as a scannable code. Consuming the link on the other device yields
//! the id to connect to.
//!
//! ## Id Format
//!
//! Ids use a 31-character alphabet that excludes ambiguous characters:
//! - Valid characters: `2-9`, `A-H`, `J-K`, `M`, `N`, `P-Z`
//! - Excluded: `0`, `1`, `I`, `L`, `O` (easily confused)
//!
//! ## Example
//!
//! ```rust,ignore
//! use duet_core::code::{PairingLink, PeerId};
//!
//! let id = PeerId::generate();
//! let link = PairingLink::new("https://duet.example/", id);
//! println!("{link}"); // https://duet.example/?code=K7PQ2M
//!
//! let parsed = PairingLink::parse("https://duet.example/?code=K7PQ2M")?;
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// The character set used for id generation.
/// Excludes ambiguous characters: 0, 1, I, L, O
pub const ID_CHARSET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";

/// Length of a peer id
pub const ID_LENGTH: usize = 6;

/// Query parameter carrying the peer id in a pairing link
pub const LINK_PARAM: &str = "code";

/// A validated peer id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId {
    id: String,
}

impl PeerId {
    /// Parse and validate a peer id from a string.
    ///
    /// Input is trimmed and upper-cased before validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the id has the wrong length or invalid characters.
    pub fn parse(input: &str) -> Result<Self> {
        let normalized = input.trim().to_uppercase();

        if normalized.len() != ID_LENGTH {
            return Err(Error::InvalidPeerId(format!(
                "id must be {} characters, got {}",
                ID_LENGTH,
                normalized.len()
            )));
        }

        if let Some(c) = normalized
            .chars()
            .find(|c| !c.is_ascii() || !ID_CHARSET.contains(&(*c as u8)))
        {
            return Err(Error::InvalidPeerId(format!("invalid character '{c}' in id")));
        }

        Ok(Self { id: normalized })
    }

    /// Generate a new random peer id.
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let id = (0..ID_LENGTH)
            .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
            .collect();

        Self { id }
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A pairing link: a base location plus the peer id to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingLink {
    base: String,
    peer_id: PeerId,
}

impl PairingLink {
    /// Create a link for `peer_id` under `base`.
    pub fn new(base: impl Into<String>, peer_id: PeerId) -> Self {
        Self {
            base: base.into(),
            peer_id,
        }
    }

    /// Parse a pairing link, or a bare peer id.
    ///
    /// A bare id yields a link with an empty base.
    ///
    /// # Errors
    ///
    /// Returns an error if the link has no `code` parameter or the id is invalid.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        let Some((base, query)) = input.split_once('?') else {
            return Ok(Self::new(String::new(), PeerId::parse(input)?));
        };

        let value = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find_map(|(key, value)| (key == LINK_PARAM).then_some(value))
            .ok_or_else(|| {
                Error::InvalidLink(format!("missing '{LINK_PARAM}' parameter in '{input}'"))
            })?;

        Ok(Self::new(base, PeerId::parse(value)?))
    }

    /// Base location of the link (may be empty).
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Peer id carried by the link.
    #[must_use]
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }
}

impl fmt::Display for PairingLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.base.is_empty() {
            write!(f, "{}", self.peer_id)
        } else {
            write!(f, "{}?{}={}", self.base, LINK_PARAM, self.peer_id)
        }
    }
}
