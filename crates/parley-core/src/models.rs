// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Registry of supported completion models.
//!
//! The set is fixed at build time. Lookup by user-supplied names goes through
//! [`AIModel::resolve`], which accepts exact identifiers, short aliases, and
//! near-miss spellings.

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Minimum normalized similarity for a fuzzy model-name match.
const MATCH_CUTOFF: f64 = 0.6;

/// Short names users may type instead of a full identifier.
const ALIASES: &[(&str, AIModel)] = &[
    ("gpt", AIModel::Gpt41),
    ("mini", AIModel::Gpt41Mini),
    ("nano", AIModel::Gpt41Nano),
    ("o3", AIModel::O3),
    ("o4-mini", AIModel::O4Mini),
    ("deepseek", AIModel::DeepSeekV3),
    ("deepseek-v3", AIModel::DeepSeekV3),
    ("deepseekv3", AIModel::DeepSeekV3),
    ("v3", AIModel::DeepSeekV3),
    ("deepseekr1", AIModel::DeepSeekR1),
    ("r1", AIModel::DeepSeekR1),
    ("mai", AIModel::MaiDsR1),
];

/// A completion model known to the bot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
pub enum AIModel {
    #[strum(serialize = "gpt-4.1")]
    Gpt41,
    #[strum(serialize = "gpt-4.1-mini")]
    Gpt41Mini,
    #[strum(serialize = "gpt-4.1-nano")]
    Gpt41Nano,
    #[strum(serialize = "o3")]
    O3,
    #[strum(serialize = "o4-mini")]
    O4Mini,
    #[strum(serialize = "DeepSeek-V3-0324")]
    DeepSeekV3,
    #[strum(serialize = "DeepSeek-R1")]
    DeepSeekR1,
    #[strum(serialize = "MAI-DS-R1")]
    MaiDsR1,
}

impl AIModel {
    /// The identifier sent to the completion endpoint.
    pub fn identifier(self) -> &'static str {
        self.into()
    }

    /// Whether the model accepts image content items.
    pub fn supports_image(self) -> bool {
        matches!(self, Self::Gpt41 | Self::Gpt41Mini | Self::O3 | Self::O4Mini)
    }

    /// Model name the tokenizer library knows this family by.
    pub fn tokenizer_model(self) -> &'static str {
        match self {
            Self::Gpt41 | Self::Gpt41Mini | Self::Gpt41Nano | Self::O3 | Self::O4Mini => "gpt-4o",
            _ => self.identifier(),
        }
    }

    /// All identifiers in declaration order.
    pub fn identifiers() -> Vec<&'static str> {
        Self::iter().map(Self::identifier).collect()
    }

    /// Exact, case-insensitive identifier lookup.
    pub fn from_identifier(name: &str) -> Option<Self> {
        name.trim().parse().ok()
    }

    /// Resolves a user-supplied model name, returning `default` when nothing
    /// is close enough.
    ///
    /// Order: exact identifier, exact alias, closest identifier, closest alias.
    pub fn resolve(name: &str, default: AIModel) -> AIModel {
        let wanted = name.trim().to_lowercase();

        if let Some(model) = Self::from_identifier(&wanted) {
            return model;
        }

        if let Some((_, model)) = ALIASES.iter().find(|(alias, _)| *alias == wanted) {
            return *model;
        }

        let by_identifier = Self::iter().map(|m| (m.identifier().to_lowercase(), m));
        if let Some(model) = closest(&wanted, by_identifier) {
            return model;
        }

        let by_alias = ALIASES.iter().map(|(alias, m)| (alias.to_string(), *m));
        closest(&wanted, by_alias).unwrap_or(default)
    }
}

fn closest(wanted: &str, candidates: impl Iterator<Item = (String, AIModel)>) -> Option<AIModel> {
    let mut best: Option<(f64, AIModel)> = None;
    for (name, model) in candidates {
        let score = strsim::normalized_levenshtein(wanted, &name);
        if score >= MATCH_CUTOFF && best.is_none_or(|(s, _)| score > s) {
            best = Some((score, model));
        }
    }
    best.map(|(_, model)| model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_round_trip() {
        for model in AIModel::iter() {
            assert_eq!(AIModel::from_identifier(model.identifier()), Some(model));
        }
    }

    #[test]
    fn identifier_lookup_is_case_insensitive() {
        assert_eq!(AIModel::from_identifier("deepseek-r1"), Some(AIModel::DeepSeekR1));
        assert_eq!(AIModel::from_identifier("GPT-4.1"), Some(AIModel::Gpt41));
    }

    #[test]
    fn resolve_aliases() {
        assert_eq!(AIModel::resolve("mini", AIModel::Gpt41), AIModel::Gpt41Mini);
        assert_eq!(AIModel::resolve("R1", AIModel::Gpt41), AIModel::DeepSeekR1);
        assert_eq!(AIModel::resolve("mai", AIModel::Gpt41), AIModel::MaiDsR1);
    }

    #[test]
    fn resolve_near_miss() {
        assert_eq!(
            AIModel::resolve("gpt-4.1-mnii", AIModel::Gpt41),
            AIModel::Gpt41Mini
        );
    }

    #[test]
    fn resolve_unknown_falls_back_to_default() {
        assert_eq!(
            AIModel::resolve("zzzzzzzzzz", AIModel::Gpt41Nano),
            AIModel::Gpt41Nano
        );
    }

    #[test]
    fn image_support() {
        assert!(AIModel::Gpt41.supports_image());
        assert!(AIModel::O4Mini.supports_image());
        assert!(!AIModel::DeepSeekR1.supports_image());
        assert!(!AIModel::Gpt41Nano.supports_image());
    }

    #[test]
    fn gpt_family_uses_gpt_4o_tokenizer() {
        assert_eq!(AIModel::Gpt41Mini.tokenizer_model(), "gpt-4o");
        assert_eq!(AIModel::DeepSeekV3.tokenizer_model(), "DeepSeek-V3-0324");
    }
}
