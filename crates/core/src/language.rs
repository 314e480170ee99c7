/// Number of characters sampled from the start of a document for language
/// detection. Shorter documents are used in their entirety.
pub const DETECTION_SAMPLE_CHARS: usize = 4_096;

const FALLBACK: &str = "en";

struct LanguageProfile {
    code: &'static str,
    stopwords: &'static [&'static str],
}

const PROFILES: [LanguageProfile; 5] = [
    LanguageProfile {
        code: "fr",
        stopwords: &[
            "le", "la", "les", "des", "une", "un", "et", "est", "dans", "que", "qui", "pour",
            "avec", "sur", "pas", "sont", "par", "plus", "mais", "nous", "vous", "cette", "aux",
            "ont", "être", "ce", "se", "du", "au", "comme",
        ],
    },
    LanguageProfile {
        code: "en",
        stopwords: &[
            "the", "and", "for", "that", "with", "this", "are", "was", "have", "from", "not",
            "but", "they", "his", "her", "you", "all", "will", "one", "would", "there", "their",
            "which", "been", "has", "were", "when", "what", "about",
        ],
    },
    LanguageProfile {
        code: "es",
        stopwords: &[
            "el", "los", "las", "una", "con", "por", "para", "del", "está", "son", "como",
            "más", "pero", "sus", "ser", "entre", "cuando", "muy", "sin", "sobre", "también",
            "hasta", "hay", "donde",
        ],
    },
    LanguageProfile {
        code: "de",
        stopwords: &[
            "der", "die", "das", "und", "ist", "nicht", "mit", "ein", "eine", "auf", "für",
            "den", "von", "sich", "dem", "auch", "werden", "sind", "einer", "wird", "aus",
            "oder", "aber", "bei",
        ],
    },
    LanguageProfile {
        code: "it",
        stopwords: &[
            "il", "che", "di", "non", "per", "con", "sono", "della", "più", "anche", "come",
            "dei", "nel", "alla", "gli", "delle", "questo", "essere", "dalla",
        ],
    },
];

/// Classify the dominant language of `text` as an ISO 639-1 code.
///
/// Scores each profile by the fraction of tokens that are stopwords of that
/// language; ties resolve to the profile listed first, and text with no
/// recognizable stopwords falls back to "en".
pub fn detect_language(text: &str) -> &'static str {
    let sample: String = text.chars().take(DETECTION_SAMPLE_CHARS).collect();
    let tokens: Vec<String> = sample
        .split(|character: char| !character.is_alphabetic())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect();

    if tokens.is_empty() {
        return FALLBACK;
    }

    let mut best_code = FALLBACK;
    let mut best_score = 0.0f64;

    for profile in &PROFILES {
        let hits = tokens
            .iter()
            .filter(|token| profile.stopwords.contains(&token.as_str()))
            .count();
        let score = hits as f64 / tokens.len() as f64;
        if score > best_score {
            best_score = score;
            best_code = profile.code;
        }
    }

    best_code
}

/// Human-readable name for a detected code, used in translation prompts.
pub fn language_name(code: &str) -> &'static str {
    match code {
        "fr" => "French",
        "en" => "English",
        "es" => "Spanish",
        "de" => "German",
        "it" => "Italian",
        _ => "English",
    }
}

#[cfg(test)]
mod tests {
    use super::{detect_language, language_name, DETECTION_SAMPLE_CHARS};

    #[test]
    fn french_text_is_detected() {
        let text = "Ce rapport présente les résultats de l'étude que nous avons menée \
                    dans le cadre du projet, avec une analyse des données qui sont \
                    disponibles pour les équipes.";
        assert_eq!(detect_language(text), "fr");
    }

    #[test]
    fn english_text_is_detected() {
        let text = "This report presents the results of the study that was conducted \
                    as part of the project, with an analysis of the data that are \
                    available for all the teams.";
        assert_eq!(detect_language(text), "en");
    }

    #[test]
    fn short_documents_use_their_entirety() {
        // Far shorter than the sample window; detection still works.
        assert!("le chat est sur la table et les livres sont dans la maison".len()
            < DETECTION_SAMPLE_CHARS);
        assert_eq!(
            detect_language("le chat est sur la table et les livres sont dans la maison"),
            "fr"
        );
    }

    #[test]
    fn unrecognizable_text_falls_back_to_english() {
        assert_eq!(detect_language(""), "en");
        assert_eq!(detect_language("0101 2323 4545"), "en");
    }

    #[test]
    fn language_names_cover_known_codes() {
        assert_eq!(language_name("fr"), "French");
        assert_eq!(language_name("xx"), "English");
    }
}
