//! Answer checking for dictation rounds

use strsim::{levenshtein, normalized_levenshtein};

/// Result of comparing a typed answer to the expected word
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub is_correct: bool,
    pub similarity_score: f64,
    pub letters_off: usize,
    pub feedback: String,
}

/// Check a typed answer. Only an exact (case-insensitive, trimmed) match is
/// correct; near misses get a distance hint that does not reveal the word.
pub fn check_answer(user_input: &str, expected: &str) -> MatchResult {
    let input_normalized = user_input.trim().to_lowercase();
    let expected_normalized = expected.trim().to_lowercase();

    if input_normalized == expected_normalized {
        return MatchResult {
            is_correct: true,
            similarity_score: 1.0,
            letters_off: 0,
            feedback: "Correct!".to_string(),
        };
    }

    let similarity = normalized_levenshtein(&input_normalized, &expected_normalized);
    let distance = levenshtein(&input_normalized, &expected_normalized);

    let feedback = if input_normalized.is_empty() {
        "Incorrect. Nothing was typed".to_string()
    } else if similarity >= 0.5 {
        let unit = if distance == 1 { "letter" } else { "letters" };
        format!("Incorrect. Almost! {} {} off", distance, unit)
    } else {
        "Incorrect".to_string()
    };

    MatchResult {
        is_correct: false,
        similarity_score: similarity,
        letters_off: distance,
        feedback,
    }
}
