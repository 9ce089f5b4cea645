use std::collections::HashSet;

/// Channel ids are `UC` followed by a 22-character body over the id alphabet
/// (alphanumerics plus `-` and `_`). Case-sensitive, 24 characters total.
pub const ID_PREFIX: &str = "UC";
pub const ID_LEN: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Format,
    Duplicate,
}

#[derive(Debug, Default)]
pub struct Validation {
    pub valid: Vec<String>,
    pub rejected: Vec<(String, RejectReason)>,
}

fn is_well_formed(id: &str) -> bool {
    id.len() == ID_LEN
        && id.starts_with(ID_PREFIX)
        && id[ID_PREFIX.len()..]
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Partition a list of raw identifiers into valid ids and rejections.
///
/// Pure and order-preserving: every input element lands in exactly one of the
/// two outputs. Exact repeats of an already-accepted id are rejected as
/// `Duplicate` rather than `Format`. Surrounding whitespace is stripped before
/// matching; nothing else is normalized.
pub fn validate<I, S>(ids: I) -> Validation
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = Validation::default();
    let mut seen: HashSet<String> = HashSet::new();
    for raw in ids {
        let id = raw.as_ref().trim().to_string();
        if !is_well_formed(&id) {
            out.rejected.push((id, RejectReason::Format));
        } else if seen.contains(&id) {
            out.rejected.push((id, RejectReason::Duplicate));
        } else {
            seen.insert(id.clone());
            out.valid.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(suffix: char) -> String {
        format!("UC{}", suffix.to_string().repeat(22))
    }

    #[test]
    fn partitions_every_element_exactly_once() {
        let input = vec![id('a'), "XYZ123".to_string(), id('b'), id('a')];
        let v = validate(&input);
        assert_eq!(v.valid.len() + v.rejected.len(), input.len());
        assert_eq!(v.valid, vec![id('a'), id('b')]);
    }

    #[test]
    fn rejects_malformed_ids_as_format() {
        let v = validate(["XYZ123", "", "UCshort", "uCAAAAAAAAAAAAAAAAAAAAAA"]);
        assert!(v.valid.is_empty());
        assert!(v.rejected.iter().all(|(_, r)| *r == RejectReason::Format));
    }

    #[test]
    fn rejects_exact_repeats_as_duplicate() {
        let v = validate([id('a'), id('a'), id('a')]);
        assert_eq!(v.valid, vec![id('a')]);
        assert_eq!(v.rejected.len(), 2);
        assert!(v
            .rejected
            .iter()
            .all(|(_, r)| *r == RejectReason::Duplicate));
    }

    #[test]
    fn is_case_sensitive() {
        let lower = format!("uc{}", "a".repeat(22));
        let v = validate([lower.as_str()]);
        assert_eq!(v.rejected, vec![(lower, RejectReason::Format)]);
    }

    #[test]
    fn body_alphabet_allows_dash_and_underscore_only() {
        let ok = "UCa1-_a1-_a1-_a1-_a1-_a1".to_string();
        let bad = "UCa1-_a1-_a1-_a1-_a1-_a+".to_string();
        assert!(is_well_formed(&ok));
        assert!(!is_well_formed(&bad));
    }

    #[test]
    fn trims_surrounding_whitespace() {
        let padded = format!("  {}  ", id('a'));
        let v = validate([padded.as_str()]);
        assert_eq!(v.valid, vec![id('a')]);
    }
}
