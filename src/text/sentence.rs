//! Sentence splitting.
//!
//! Splits text at sentence-terminating punctuation followed by
//! whitespace, vetoing boundaries that fall inside common abbreviation
//! patterns (single-letter initials like `U.S.`, honorifics like `Mr.`).

/// Splits text into trimmed, non-empty sentences.
///
/// A boundary is a `.`, `!`, or `?` followed by whitespace, unless the
/// characters leading up to it match an abbreviation pattern:
///
/// - `\w.\w.` — single-letter initials (`U.S. `, `e.g. `)
/// - `[A-Z][a-z].` — two-letter honorifics (`Mr. `, `Dr. `)
#[must_use]
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next_is_space = chars.get(i + 1).is_some_and(|n| n.is_whitespace());

        if matches!(c, '.' | '!' | '?') && next_is_space && !is_abbreviation(&chars, i + 1) {
            let sentence: String = chars[start..=i].iter().collect();
            push_trimmed(&mut sentences, &sentence);
            // Skip the single whitespace character after the terminator.
            start = i + 2;
            i += 2;
            continue;
        }
        i += 1;
    }

    if start < chars.len() {
        let rest: String = chars[start..].iter().collect();
        push_trimmed(&mut sentences, &rest);
    }

    sentences
}

fn push_trimmed(sentences: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Checks whether the characters before the whitespace at `ws` form an
/// abbreviation that should suppress the sentence boundary.
fn is_abbreviation(chars: &[char], ws: usize) -> bool {
    let at = |back: usize| ws.checked_sub(back).and_then(|idx| chars.get(idx)).copied();

    // `\w.\w.` ending at the whitespace: e.g. "U.S. " or "e.g. "
    if let (Some(a), Some(b), Some(c)) = (at(4), at(3), at(2)) {
        if a.is_alphanumeric() && b == '.' && c.is_alphanumeric() {
            return true;
        }
    }

    // `[A-Z][a-z].` ending at the whitespace: "Mr. ", "Dr. "
    if let (Some(a), Some(b), Some(c)) = (at(3), at(2), at(1)) {
        if a.is_uppercase() && b.is_lowercase() && c == '.' {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_split() {
        let sentences = split_sentences("First sentence. Second sentence! Third?");
        assert_eq!(
            sentences,
            vec!["First sentence.", "Second sentence!", "Third?"]
        );
    }

    #[test]
    fn test_no_terminator() {
        let sentences = split_sentences("no terminator here");
        assert_eq!(sentences, vec!["no terminator here"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_honorific_not_split() {
        let sentences = split_sentences("Mr. Smith arrived. He sat down.");
        assert_eq!(sentences, vec!["Mr. Smith arrived.", "He sat down."]);
    }

    #[test]
    fn test_initials_not_split() {
        let sentences = split_sentences("The U.S. economy grew. Exports rose.");
        assert_eq!(sentences, vec!["The U.S. economy grew.", "Exports rose."]);
    }

    #[test]
    fn test_eg_not_split() {
        let sentences = split_sentences("Cite sources, e.g. reports. Then verify.");
        assert_eq!(
            sentences,
            vec!["Cite sources, e.g. reports.", "Then verify."]
        );
    }

    #[test]
    fn test_trailing_text_without_punctuation() {
        let sentences = split_sentences("Done. And more to come");
        assert_eq!(sentences, vec!["Done.", "And more to come"]);
    }

    #[test]
    fn test_multiple_blank_runs() {
        let sentences = split_sentences("One.  Two.");
        // The second whitespace char becomes leading space and is trimmed.
        assert_eq!(sentences, vec!["One.", "Two."]);
    }

    #[test]
    fn test_citation_markers_stay_attached() {
        let sentences = split_sentences("Paris is the capital [1]. It is in France [2].");
        assert_eq!(
            sentences,
            vec!["Paris is the capital [1].", "It is in France [2]."]
        );
    }
}
