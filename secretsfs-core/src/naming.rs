//! Key name substitution.
//!
//! Backend keys may contain a character (usually `/`) that cannot appear in
//! a single path segment.  Such keys are exposed with that character swapped
//! for a configured substitute, and mapped back by trying every way the
//! substitute occurrences could be reinterpreted.

use std::collections::HashSet;

/// Above this many occurrences the power set is not built: the candidate
/// list shrinks to the identity and the fully replaced name, and
/// [`resolve_key`] matches keys position by position instead.
pub const MAX_ENUMERATED_OCCURRENCES: usize = 16;

/// Every string obtained by independently keeping or replacing each `from`
/// in `name` with `to`, identity first.
///
/// With more than [`MAX_ENUMERATED_OCCURRENCES`] occurrences only the
/// identity and the fully replaced name are returned.
///
/// # Examples
/// ```
/// # use secretsfs_core::naming::enumerate_possibilities;
/// assert_eq!(enumerate_possibilities("_c", '_', '/'), vec!["_c", "/c"]);
/// assert_eq!(enumerate_possibilities("foo", '_', '/'), vec!["foo"]);
/// assert!(enumerate_possibilities("", '_', '/').is_empty());
/// ```
pub fn enumerate_possibilities(name: &str, from: char, to: char) -> Vec<String> {
    if name.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = name.chars().collect();
    let positions: Vec<usize> = chars
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == from)
        .map(|(i, _)| i)
        .collect();
    let k = positions.len();
    if k > MAX_ENUMERATED_OCCURRENCES {
        let replaced: String = chars.iter().map(|&c| if c == from { to } else { c }).collect();
        return vec![name.to_string(), replaced];
    }

    (0u64..1 << k)
        .map(|mask| {
            let mut variant = chars.clone();
            // The last occurrence is the least significant bit.
            for (n, &pos) in positions.iter().enumerate() {
                if mask & (1 << (k - 1 - n)) != 0 {
                    variant[pos] = to;
                }
            }
            variant.into_iter().collect()
        })
        .collect()
}

/// Rewrite a backend key into the name shown in the filesystem.
pub fn expose_key(key: &str, bad: char, subst: char) -> String {
    key.replace(bad, &subst.to_string())
}

/// Find the real backend key an exposed name stands for.
///
/// An exact match wins; otherwise the first key in `keys` that is one of the
/// exposed name's reinterpretations is returned.
pub fn resolve_key<'a, I>(exposed: &str, keys: I, bad: char, subst: char) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let keys: Vec<&str> = keys.into_iter().collect();
    if keys.contains(&exposed) {
        return Some(exposed.to_string());
    }
    if !exposed.contains(subst) {
        return None;
    }

    if exposed.matches(subst).count() <= MAX_ENUMERATED_OCCURRENCES {
        let candidates: HashSet<String> =
            enumerate_possibilities(exposed, subst, bad).into_iter().collect();
        keys.into_iter()
            .find(|k| candidates.contains(*k))
            .map(str::to_string)
    } else {
        keys.into_iter()
            .find(|k| reinterprets(exposed, k, bad, subst))
            .map(str::to_string)
    }
}

fn reinterprets(exposed: &str, key: &str, bad: char, subst: char) -> bool {
    exposed.chars().count() == key.chars().count()
        && exposed
            .chars()
            .zip(key.chars())
            .all(|(e, k)| e == k || (e == subst && k == bad))
}

/// Check that a bad/substitute pair can round-trip.
pub fn validate_pair(bad: char, subst: char) -> Result<(), String> {
    if bad == subst {
        return Err(format!("substitute character {subst:?} equals the replaced character"));
    }
    if subst == '\0' || subst == '/' {
        return Err(format!("substitute character {subst:?} cannot appear in a file name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(v: Vec<String>) -> HashSet<String> {
        v.into_iter().collect()
    }

    #[test]
    fn enumerates_full_power_set() {
        let got = enumerate_possibilities("a_b_c_d", '_', '/');
        assert_eq!(
            got,
            vec![
                "a_b_c_d", "a_b_c/d", "a_b/c_d", "a_b/c/d", "a/b_c_d", "a/b_c/d", "a/b/c_d",
                "a/b/c/d"
            ]
        );
    }

    #[test]
    fn enumerates_leading_and_trailing() {
        assert_eq!(enumerate_possibilities("_c", '_', '/'), vec!["_c", "/c"]);
        assert_eq!(
            enumerate_possibilities("_c_", '_', '/'),
            vec!["_c_", "_c/", "/c_", "/c/"]
        );
    }

    #[test]
    fn empty_name_yields_empty_set() {
        assert!(enumerate_possibilities("", '_', '/').is_empty());
    }

    #[test]
    fn no_occurrence_yields_identity() {
        assert_eq!(set(enumerate_possibilities("foo", '_', '/')), set(vec!["foo".into()]));
    }

    #[test]
    fn enumeration_is_capped_for_many_occurrences() {
        let name = "a_".repeat(64);
        let got = enumerate_possibilities(&name, '_', '/');
        assert_eq!(got, vec![name.clone(), "a/".repeat(64)]);

        let at_limit = "_".repeat(MAX_ENUMERATED_OCCURRENCES);
        assert_eq!(
            enumerate_possibilities(&at_limit, '_', '/').len(),
            1 << MAX_ENUMERATED_OCCURRENCES
        );
    }

    #[test]
    fn resolve_survives_sixty_four_occurrences() {
        let exposed = "x_".repeat(64);
        let key = "x/".repeat(64);
        assert_eq!(resolve_key(&exposed, [key.as_str()], '/', '_'), Some(key.clone()));
    }

    #[test]
    fn expose_replaces_every_bad_char() {
        assert_eq!(expose_key("tls/cert/pem", '/', '_'), "tls_cert_pem");
        assert_eq!(expose_key("plain", '/', '_'), "plain");
    }

    #[test]
    fn resolve_prefers_exact_match() {
        let keys = ["a_b", "a/b"];
        assert_eq!(resolve_key("a_b", keys, '/', '_').as_deref(), Some("a_b"));
    }

    #[test]
    fn resolve_finds_substituted_key() {
        let keys = ["user", "tls/cert"];
        assert_eq!(resolve_key("tls_cert", keys, '/', '_').as_deref(), Some("tls/cert"));
        assert_eq!(resolve_key("missing", keys, '/', '_'), None);
        assert_eq!(resolve_key("tls_key", keys, '/', '_'), None);
    }

    #[test]
    fn resolve_with_many_occurrences_uses_positional_match() {
        let exposed = "_".repeat(20) + "x";
        let key = "/".repeat(20) + "x";
        let keys = [key.as_str()];
        assert_eq!(resolve_key(&exposed, keys, '/', '_'), Some(key.clone()));
    }

    #[test]
    fn validate_rejects_degenerate_pairs() {
        assert!(validate_pair('/', '_').is_ok());
        assert!(validate_pair('_', '_').is_err());
        assert!(validate_pair('/', '\0').is_err());
    }
}
