//! Avatar character/style selection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Character used when a selection has to be corrected.
pub const FALLBACK_CHARACTER: &str = "lisa";
/// Style used when a selection has to be corrected.
pub const FALLBACK_STYLE: &str = "casual-sitting";

/// The avatar to render: a character and one of its styles.
///
/// The `casual-sitting` style is only provisioned for the `lisa`
/// character; any other pairing with it is invalid and is replaced by the
/// fallback selection before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarSelection {
    pub character: String,
    pub style: String,
}

impl AvatarSelection {
    pub fn new(character: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            style: style.into(),
        }
    }

    /// `true` when the pair may be sent to the speech service as-is.
    ///
    /// ```
    /// use voice_avatar::session::AvatarSelection;
    ///
    /// assert!(AvatarSelection::new("lisa", "casual-sitting").is_valid());
    /// assert!(AvatarSelection::new("harry", "business").is_valid());
    /// assert!(!AvatarSelection::new("harry", "casual-sitting").is_valid());
    /// assert!(!AvatarSelection::new("", "business").is_valid());
    /// ```
    pub fn is_valid(&self) -> bool {
        let character = self.character.trim();
        let style = self.style.trim();

        if character.is_empty() || style.is_empty() {
            return false;
        }
        !(style == FALLBACK_STYLE && character != FALLBACK_CHARACTER)
    }

    /// Return `self` when valid, otherwise the fallback selection.
    pub fn validated(self) -> Self {
        if self.is_valid() {
            return self;
        }
        let fallback = Self::default();
        log::warn!("session: avatar {self} is not a valid combination, using {fallback}");
        fallback
    }
}

impl Default for AvatarSelection {
    fn default() -> Self {
        Self::new(FALLBACK_CHARACTER, FALLBACK_STYLE)
    }
}

impl fmt::Display for AvatarSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.character, self.style)
    }
}
