//! Keyword classifier for image search metadata
//!
//! Decides from free text (image URL, page URL, title) whether a search hit
//! is unwanted content such as cosplay, merchandise, fan art or manga scans.
//! Matching is a case-insensitive substring search against fixed lowercase
//! phrase lists.

use serde::{Deserialize, Serialize};

/// Phrases that mark a search hit as unwanted
pub const BLOCK_WORDS: &[&str] = &[
    "cosplay",
    "真人",
    "live action",
    "actor",
    "actress",
    "figure",
    "figurine",
    "toy",
    "funko",
    "nendoroid",
    "model",
    "statue",
    "poster",
    "wallpaper",
    "hd wallpaper",
    "4k",
    "8k",
    "background",
    "merch",
    "t-shirt",
    "shirt",
    "hoodie",
    "mug",
    "sticker",
    "keychain",
    "drawing",
    "fanart",
    "fan art",
    "artwork",
    "deviantart",
    "pixiv",
    "manga",
    "panel",
    "scan",
    "cover",
    "coloring",
    "amv",
    "edit",
    "collage",
    "meme",
    "gif",
    "roblox",
    "minecraft",
    "gacha",
];

/// Phrases suggesting the hit is an actual anime frame or screenshot
pub const ALLOW_HINTS: &[&str] = &[
    "naruto",
    "shippuden",
    "anime",
    "episode",
    "frame",
    "screenshot",
];

/// Returns `true` when `text` contains any block-listed phrase.
///
/// Empty text is never trash.
#[must_use]
pub fn is_trash(text: &str) -> bool {
    contains_any(text, BLOCK_WORDS)
}

/// Returns `true` when `text` contains any allow-hint phrase.
#[must_use]
pub fn is_anime_hint(text: &str) -> bool {
    contains_any(text, ALLOW_HINTS)
}

fn contains_any<S: AsRef<str>>(text: &str, phrases: &[S]) -> bool {
    if text.is_empty() {
        return false;
    }
    let haystack = text.to_lowercase();
    phrases
        .iter()
        .any(|phrase| haystack.contains(&phrase.as_ref().to_lowercase()))
}

/// Classifier with configurable keyword lists
///
/// The default instance uses [`BLOCK_WORDS`] and [`ALLOW_HINTS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordClassifier {
    /// Phrases that reject a hit
    pub block_words: Vec<String>,
    /// Phrases that hint at an anime frame
    pub allow_hints: Vec<String>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self {
            block_words: BLOCK_WORDS.iter().map(|w| (*w).to_string()).collect(),
            allow_hints: ALLOW_HINTS.iter().map(|w| (*w).to_string()).collect(),
        }
    }
}

impl KeywordClassifier {
    /// Create a classifier with custom lists
    pub fn new<I, J, S, T>(block_words: I, allow_hints: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            block_words: block_words.into_iter().map(Into::into).collect(),
            allow_hints: allow_hints.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn is_trash(&self, text: &str) -> bool {
        contains_any(text, &self.block_words)
    }

    #[must_use]
    pub fn is_anime_hint(&self, text: &str) -> bool {
        contains_any(text, &self.allow_hints)
    }
}
