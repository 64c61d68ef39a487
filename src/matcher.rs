use tracing::{debug, info};

use crate::positions::NameMap;

/// Normalizes a spoken token for comparison: lowercase, trimmed, one trailing `.` removed
#[must_use]
pub fn normalize_token(token: &str) -> String {
    let lowered = token.trim().to_lowercase();
    match lowered.strip_suffix('.') {
        Some(stripped) => stripped.to_owned(),
        None => lowered,
    }
}

/// Resolves transcribed segments to a position index
///
/// Tokens are examined in spoken order; for each token the mapping is scanned in
/// ascending index order and the first case-insensitive name match wins. Segments
/// are pulled lazily, so nothing after the first match is consumed. Positions
/// sharing a name therefore always resolve to the lowest index.
pub fn resolve<I>(segments: I, names: &NameMap) -> Option<usize>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for segment in segments {
        for token in segment.as_ref().split_whitespace() {
            let word = normalize_token(token);
            if word.is_empty() {
                continue;
            }

            let hit = names
                .iter()
                .find(|(_, name)| name.to_lowercase() == word)
                .map(|(&index, _)| index);

            if let Some(index) = hit {
                info!(word = %word, index, "voice command matched");
                return Some(index);
            }
            debug!(word = %word, "no position named");
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn names(entries: &[(usize, &str)]) -> NameMap {
        entries
            .iter()
            .map(|&(index, name)| (index, name.to_owned()))
            .collect()
    }

    #[test]
    fn test_normalize_token() {
        assert_eq!(normalize_token("CUMIN."), "cumin");
        assert_eq!(normalize_token("  Salt "), "salt");
        assert_eq!(normalize_token("pepper.."), "pepper.");
        assert_eq!(normalize_token("."), "");
    }

    #[test]
    fn test_case_and_period_insensitive_match() {
        let mapping = names(&[(3, "Cumin")]);
        assert_eq!(resolve(["Please", "add", "CUMIN."], &mapping), Some(3));
    }

    #[test]
    fn test_match_inside_sentence_segment() {
        let mapping = names(&[(1, "Salt"), (8, "Paprika")]);
        assert_eq!(resolve([" Give me some paprika."], &mapping), Some(8));
    }

    #[test]
    fn test_no_match() {
        let mapping = names(&[(1, "Salt"), (2, "Pepper")]);
        assert_eq!(resolve(["nothing", "useful", "here"], &mapping), None);
    }

    #[test]
    fn test_empty_transcript() {
        let mapping = names(&[(1, "Salt")]);
        assert_eq!(resolve(Vec::<String>::new(), &mapping), None);
        assert_eq!(resolve(["", "   "], &mapping), None);
    }

    #[test]
    fn test_duplicate_names_resolve_deterministically() {
        let mapping = names(&[(2, "Salt"), (1, "Salt")]);
        let first = resolve(["salt"], &mapping);
        assert!(matches!(first, Some(1 | 2)));
        for _ in 0..10 {
            assert_eq!(resolve(["salt"], &mapping), first);
        }
        assert_eq!(first, Some(1));
    }

    #[test]
    fn test_first_token_wins_over_later_tokens() {
        let mapping = names(&[(1, "Salt"), (2, "Pepper")]);
        assert_eq!(resolve(["pepper then salt"], &mapping), Some(2));
    }

    #[test]
    fn test_later_segments_not_consumed_after_match() {
        let mapping = names(&[(4, "Thyme")]);
        let pulled = Cell::new(0);
        let segments = ["thyme", "ignored", "also ignored"]
            .into_iter()
            .inspect(|_| pulled.set(pulled.get() + 1));

        assert_eq!(resolve(segments, &mapping), Some(4));
        assert_eq!(pulled.get(), 1);
    }

    #[test]
    fn test_multi_word_names_never_match_single_tokens() {
        let mapping = names(&[(5, "Garam Masala")]);
        assert_eq!(resolve(["garam masala"], &mapping), None);
    }
}
