//! Suggestions for misspelled names using Levenshtein distance.
//!
//! Used to turn "unknown directive `modul`" into "unknown directive `modul`; did you mean `module`?".

/// Computes the [Levenshtein distance](https://en.wikipedia.org/wiki/Levenshtein_distance)
///     between two strings, counted in characters.
///
/// Only two rows of the dynamic programming matrix are kept.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        current[0] = i;
        for j in 1..=b.len() {
            let substitution = previous[j - 1] + usize::from(a[i - 1] != b[j - 1]);
            current[j] = substitution.min(previous[j] + 1).min(current[j - 1] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Returns the dictionary word closest to `word`, if it is close enough to be a plausible typo.
///
/// A word is close enough if at most a third of its characters (and at least one) need to change.
/// Ties are broken by dictionary order.
pub fn closest_word<'a, I>(dictionary: I, word: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let threshold = (word.chars().count() / 3).max(1);
    let mut best: Option<(usize, &'a str)> = None;
    for candidate in dictionary {
        let distance = levenshtein_distance(word, candidate);
        if distance == 0 || distance > threshold {
            continue;
        }
        match best {
            Some((d, _)) if d <= distance => {}
            _ => best = Some((distance, candidate)),
        }
    }
    best.map(|(_, w)| w)
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! distance_tests {
        ($( ($name: ident, $a: expr, $b: expr, $expected: expr), )+) => {
            $(
            #[test]
            fn $name() {
                assert_eq!(levenshtein_distance($a, $b), $expected);
                assert_eq!(levenshtein_distance($b, $a), $expected);
            }
            )+
        };
    }

    distance_tests![
        (distance_equal, "module", "module", 0),
        (distance_empty, "", "path", 4),
        (distance_substitution, "path", "math", 1),
        (distance_insertion, "modul", "module", 1),
        (distance_kitten, "kitten", "sitting", 3),
    ];

    #[test]
    fn closest_word_finds_typo() {
        let dictionary = ["module", "make", "onchange", "watch"];
        assert_eq!(closest_word(dictionary, "modul"), Some("module"));
    }

    #[test]
    fn closest_word_rejects_distant_words() {
        let dictionary = ["module", "make"];
        assert_eq!(closest_word(dictionary, "paper"), None);
    }
}
