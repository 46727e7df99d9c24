//! Supported label languages
//!
//! The platform accepts labels in English plus 13 Indian languages. The set
//! is a fixed compiled table, not configuration: the UI translation bundles
//! and the database CHECK constraint both assume exactly these codes.

/// (code, native display name) for every supported language
pub const SUPPORTED_LANGUAGES: [(&str, &str); 14] = [
    ("en", "English"),
    ("hi", "हिन्दी (Hindi)"),
    ("te", "తెలుగు (Telugu)"),
    ("ta", "தமிழ் (Tamil)"),
    ("bn", "বাংলা (Bengali)"),
    ("gu", "ગુજરાતી (Gujarati)"),
    ("mr", "मराठी (Marathi)"),
    ("kn", "ಕನ್ನಡ (Kannada)"),
    ("ml", "മലയാളം (Malayalam)"),
    ("pa", "ਪੰਜਾਬੀ (Punjabi)"),
    ("or", "ଓଡିଆ (Odia)"),
    ("as", "অসমীয়া (Assamese)"),
    ("ur", "اردو (Urdu)"),
    ("sa", "संस्कृत (Sanskrit)"),
];

/// Check whether a language code is in the supported set
pub fn is_supported(code: &str) -> bool {
    SUPPORTED_LANGUAGES.iter().any(|(c, _)| *c == code)
}

/// Native display name for a language code, if supported
pub fn display_name(code: &str) -> Option<&'static str> {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| *name)
}

/// All supported codes, in table order
pub fn codes() -> impl Iterator<Item = &'static str> {
    SUPPORTED_LANGUAGES.iter().map(|(c, _)| *c)
}
