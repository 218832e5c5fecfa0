//! crates/writing_assistant_core/src/persona.rs
//!
//! The fixed catalog of personas the commentary pipeline can write as.
//! Purely descriptive: the session engine only passes the identifier through.

use crate::domain::ParseEnumError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersonaCategory {
    /// Short, shareable takes in the voice of a well-known poster.
    TweetExtractor,
    /// Archetypal guidance voices.
    InnerGuidance,
}

impl PersonaCategory {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TweetExtractor => "Tweet Extractors",
            Self::InnerGuidance => "Inner Guidance",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PersonaType {
    #[default]
    TwitterNaval,
    TwitterPg,
    TwitterElon,
    TwitterSam,
    TwitterSolbrah,
    TwitterAusten,
    Anima,
    Animus,
}

impl PersonaType {
    /// Every persona, in selector order.
    pub const ALL: [PersonaType; 8] = [
        Self::TwitterNaval,
        Self::TwitterPg,
        Self::TwitterElon,
        Self::TwitterSam,
        Self::TwitterSolbrah,
        Self::TwitterAusten,
        Self::Anima,
        Self::Animus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwitterNaval => "twitter_naval",
            Self::TwitterPg => "twitter_pg",
            Self::TwitterElon => "twitter_elon",
            Self::TwitterSam => "twitter_sam",
            Self::TwitterSolbrah => "twitter_solbrah",
            Self::TwitterAusten => "twitter_austen",
            Self::Anima => "anima",
            Self::Animus => "animus",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TwitterNaval => "Naval",
            Self::TwitterPg => "Paul Graham",
            Self::TwitterElon => "Elon",
            Self::TwitterSam => "Sam Altman",
            Self::TwitterSolbrah => "SolBrah",
            Self::TwitterAusten => "Austen",
            Self::Anima => "Anima",
            Self::Animus => "Animus",
        }
    }

    pub fn category(&self) -> PersonaCategory {
        match self {
            Self::Anima | Self::Animus => PersonaCategory::InnerGuidance,
            _ => PersonaCategory::TweetExtractor,
        }
    }
}

impl fmt::Display for PersonaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonaType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|persona| persona.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "persona",
                value: s.to_string(),
            })
    }
}

/// The catalog grouped by category, in selector order.
pub fn catalog() -> Vec<(PersonaCategory, Vec<PersonaType>)> {
    [PersonaCategory::TweetExtractor, PersonaCategory::InnerGuidance]
        .into_iter()
        .map(|category| {
            let members = PersonaType::ALL
                .into_iter()
                .filter(|persona| persona.category() == category)
                .collect();
            (category, members)
        })
        .collect()
}
