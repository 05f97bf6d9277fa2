/*!
The versioned key codec.

Every record is stored under a key of the form `user_key + "@" + decimal(ts)`
where `ts` is the commit timestamp assigned by the oracle. All ordering in
the engine uses this encoded form. The comparator splits at the *last* `@`:
the primary order is bytewise ascending on the user part, and versions of the
same user key are ordered newest first, so a lower-bound search for
`key@read_ts` lands on the newest version visible at `read_ts`.

Keys without a separator compare plain bytewise. User keys containing `@`
are not distinguished from the separator and are unsupported.
*/

use std::cmp::Ordering;

/// Separator between the user key and the timestamp suffix.
const SEPARATOR: u8 = b'@';

/// Combine a user key and a timestamp into a versioned key.
pub(crate) fn key_with_ts(user_key: &[u8], ts: u64) -> Vec<u8> {
    let suffix = ts.to_string();
    let mut key = Vec::with_capacity(user_key.len() + 1 + suffix.len());
    key.extend_from_slice(user_key);
    key.push(SEPARATOR);
    key.extend_from_slice(suffix.as_bytes());
    key
}

/// Return the user part of a versioned key. A key without a separator is
/// returned unchanged.
pub(crate) fn parse_key(key: &[u8]) -> &[u8] {
    match key.iter().rposition(|&b| b == SEPARATOR) {
        Some(index) => &key[..index],
        None => key,
    }
}

/// Parse the timestamp suffix of a versioned key. Returns 0 if the suffix is
/// absent or unparsable.
pub(crate) fn parse_ts(key: &[u8]) -> u64 {
    let index = match key.iter().rposition(|&b| b == SEPARATOR) {
        Some(index) => index,
        None => return 0,
    };

    std::str::from_utf8(&key[index + 1..])
        .ok()
        .and_then(|digits| digits.parse::<u64>().ok())
        .unwrap_or(0)
}

/**
Compare two versioned keys.

User parts compare bytewise ascending; equal user parts order by timestamp
*descending* so that newer versions sort first. If either key lacks a
separator, both compare plain bytewise.
*/
pub(crate) fn compare_keys(a: &[u8], b: &[u8]) -> Ordering {
    let a_sep = a.iter().rposition(|&byte| byte == SEPARATOR);
    let b_sep = b.iter().rposition(|&byte| byte == SEPARATOR);
    if a_sep.is_none() || b_sep.is_none() {
        return a.cmp(b);
    }

    match parse_key(a).cmp(parse_key(b)) {
        Ordering::Equal => parse_ts(b).cmp(&parse_ts(a)),
        ordering => ordering,
    }
}

/// True iff the user parts of two versioned keys are equal.
pub(crate) fn is_same_key(a: &[u8], b: &[u8]) -> bool {
    parse_key(a) == parse_key(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_and_splits_versioned_keys() {
        let key = key_with_ts(b"user:1", 42);
        assert_eq!(key, b"user:1@42".to_vec());
        assert_eq!(parse_key(&key), b"user:1");
        assert_eq!(parse_ts(&key), 42);
    }

    #[test]
    fn parse_handles_legacy_keys() {
        assert_eq!(parse_key(b"plain"), b"plain");
        assert_eq!(parse_ts(b"plain"), 0);
        assert_eq!(parse_ts(b"key@not-a-number"), 0);
        assert_eq!(parse_ts(b""), 0);
    }

    #[test]
    fn orders_user_keys_ascending() {
        assert_eq!(
            compare_keys(b"apple@5", b"banana@5"),
            Ordering::Less
        );
        assert_eq!(
            compare_keys(b"banana@5", b"apple@9"),
            Ordering::Greater
        );
    }

    #[test]
    fn newer_versions_sort_first() {
        assert_eq!(compare_keys(b"key@30", b"key@10"), Ordering::Less);
        assert_eq!(compare_keys(b"key@10", b"key@30"), Ordering::Greater);
        assert_eq!(compare_keys(b"key@10", b"key@10"), Ordering::Equal);
    }

    #[test]
    fn falls_back_to_bytewise_without_separator() {
        assert_eq!(compare_keys(b"abc", b"abd"), Ordering::Less);
        assert_eq!(compare_keys(b"key2@5", b"key5"), Ordering::Less);
        assert_eq!(compare_keys(b"key5@3", b"key5"), Ordering::Greater);
    }

    #[test]
    fn same_key_ignores_versions() {
        assert!(is_same_key(b"key@1", b"key@9000"));
        assert!(!is_same_key(b"key@1", b"keys@1"));
    }
}
