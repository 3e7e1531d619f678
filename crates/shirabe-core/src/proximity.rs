//! Jaro–Winkler string proximity.
//!
//! Scores are in `[0.0, 1.0]`, 1.0 meaning identical. Comparison is by
//! `char`, case-sensitive; callers normalize titles first (see
//! [`crate::normalize`]) and pick their own acceptance threshold.

/// Weight given to a shared prefix.
const PREFIX_SCALE: f64 = 0.1;

/// Longest prefix that earns the Winkler bonus.
const MAX_PREFIX: usize = 4;

/// Jaro–Winkler similarity of two strings.
pub fn proximity(s: &str, t: &str) -> f64 {
    let (s, t) = ordered(s, t);
    let jaro = jaro_chars(&s, &t);
    let prefix = s
        .iter()
        .zip(t.iter())
        .take(MAX_PREFIX)
        .take_while(|(a, b)| a == b)
        .count();
    (jaro + prefix as f64 * PREFIX_SCALE * (1.0 - jaro)).min(1.0)
}

/// Plain Jaro similarity, without the prefix bonus.
pub fn jaro(s: &str, t: &str) -> f64 {
    let (s, t) = ordered(s, t);
    jaro_chars(&s, &t)
}

/// Put the pair in a canonical order so the greedy match pass gives the
/// same answer both ways round.
fn ordered(s: &str, t: &str) -> (Vec<char>, Vec<char>) {
    let s: Vec<char> = s.chars().collect();
    let t: Vec<char> = t.chars().collect();
    if (s.len(), &s) <= (t.len(), &t) {
        (s, t)
    } else {
        (t, s)
    }
}

fn jaro_chars(s: &[char], t: &[char]) -> f64 {
    match (s.is_empty(), t.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let window = (s.len().max(t.len()) / 2).saturating_sub(1).max(1);
    let mut s_matched = vec![false; s.len()];
    let mut t_matched = vec![false; t.len()];
    let mut matches = 0usize;

    for (i, sc) in s.iter().enumerate() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(t.len());
        for j in start..end {
            if !t_matched[j] && t[j] == *sc {
                s_matched[i] = true;
                t_matched[j] = true;
                matches += 1;
                break;
            }
        }
    }

    if matches == 0 {
        return 0.0;
    }

    let mut half_transpositions = 0usize;
    let mut k = 0;
    for (i, sc) in s.iter().enumerate() {
        if !s_matched[i] {
            continue;
        }
        while !t_matched[k] {
            k += 1;
        }
        if *sc != t[k] {
            half_transpositions += 1;
        }
        k += 1;
    }

    let m = matches as f64;
    let transpositions = half_transpositions as f64 / 2.0;
    (m / s.len() as f64 + m / t.len() as f64 + (m - transpositions) / m) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_empty_strings() {
        assert_eq!(proximity("", ""), 1.0);
        assert_eq!(proximity("", "x"), 0.0);
        assert_eq!(proximity("x", ""), 0.0);
    }

    #[test]
    fn test_identical() {
        for s in ["a", "Frieren", "進撃の巨人", "Attack on Titan Season 2"] {
            assert_eq!(proximity(s, s), 1.0, "{s}");
        }
    }

    #[test]
    fn test_no_common_characters() {
        assert_eq!(proximity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_known_values() {
        assert!(approx(jaro("MARTHA", "MARHTA"), 0.944));
        assert!(approx(proximity("MARTHA", "MARHTA"), 0.961));
        assert!(approx(jaro("DIXON", "DICKSONX"), 0.767));
        assert!(approx(proximity("DIXON", "DICKSONX"), 0.813));
    }

    #[test]
    fn test_symmetric() {
        let pairs = [
            ("MARTHA", "MARHTA"),
            ("Shingeki no Kyojin", "Shingeki no Kyojin Season 3"),
            ("ab", "ba"),
            ("One Piece", "One Punch Man"),
            ("aab", "abaa"),
        ];
        for (s, t) in pairs {
            assert_eq!(proximity(s, t), proximity(t, s), "{s} / {t}");
        }
    }

    #[test]
    fn test_bounded() {
        let pairs = [("a", "aaaa"), ("kimetsu", "kimetsu no yaiba"), ("xy", "yx")];
        for (s, t) in pairs {
            let p = proximity(s, t);
            assert!((0.0..=1.0).contains(&p), "{s} / {t} = {p}");
        }
    }

    #[test]
    fn test_closer_titles_score_higher() {
        let target = "sousou no frieren";
        assert!(proximity(target, "sousou no frieren 2") > proximity(target, "spy x family"));
    }
}
