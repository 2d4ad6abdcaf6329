// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! English display names for the language tags Telegram clients report.
//!
//! Covers the languages and regions the bot meets in practice; anything else
//! is reported as "Unknown".

const UNKNOWN: &str = "Unknown";

const LANGUAGES: &[(&str, &str)] = &[
    ("ar", "Arabic"),
    ("be", "Belarusian"),
    ("ca", "Catalan"),
    ("cs", "Czech"),
    ("de", "German"),
    ("el", "Greek"),
    ("en", "English"),
    ("es", "Spanish"),
    ("fa", "Persian"),
    ("fi", "Finnish"),
    ("fr", "French"),
    ("he", "Hebrew"),
    ("hi", "Hindi"),
    ("hu", "Hungarian"),
    ("id", "Indonesian"),
    ("it", "Italian"),
    ("ja", "Japanese"),
    ("kk", "Kazakh"),
    ("ko", "Korean"),
    ("ms", "Malay"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("pt", "Portuguese"),
    ("ro", "Romanian"),
    ("ru", "Russian"),
    ("sk", "Slovak"),
    ("sr", "Serbian"),
    ("sv", "Swedish"),
    ("th", "Thai"),
    ("tr", "Turkish"),
    ("uk", "Ukrainian"),
    ("uz", "Uzbek"),
    ("vi", "Vietnamese"),
    ("zh", "Chinese"),
];

const REGIONS: &[(&str, &str)] = &[
    ("AR", "Argentina"),
    ("AU", "Australia"),
    ("BR", "Brazil"),
    ("CA", "Canada"),
    ("CN", "China"),
    ("DE", "Germany"),
    ("ES", "Spain"),
    ("FR", "France"),
    ("GB", "United Kingdom"),
    ("IN", "India"),
    ("IT", "Italy"),
    ("JP", "Japan"),
    ("KR", "South Korea"),
    ("MX", "Mexico"),
    ("PT", "Portugal"),
    ("RU", "Russia"),
    ("TW", "Taiwan"),
    ("UA", "Ukraine"),
    ("US", "United States"),
];

/// Display language and region for a language tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleInfo {
    pub language: String,
    pub region: String,
}

impl LocaleInfo {
    /// Parses tags such as `en`, `pt-BR`, or `zh_TW`.
    pub fn from_language_code(code: &str) -> Self {
        let mut subtags = code.split(['-', '_']);
        let language = subtags
            .next()
            .map(str::to_ascii_lowercase)
            .and_then(|lang| lookup(LANGUAGES, &lang));
        let region = subtags
            .next()
            .map(str::to_ascii_uppercase)
            .and_then(|region| lookup(REGIONS, &region));

        match language {
            Some(language) => Self {
                language: language.to_string(),
                region: region.unwrap_or(UNKNOWN).to_string(),
            },
            None => Self {
                language: UNKNOWN.to_string(),
                region: UNKNOWN.to_string(),
            },
        }
    }
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}
