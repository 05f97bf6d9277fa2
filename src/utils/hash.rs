//! Key fingerprinting for transaction conflict sets.

use xxhash_rust::xxh64::xxh64;

/**
Return the 64-bit fingerprint of a user key.

Conflict detection intersects fingerprint sets rather than key sets, so two
distinct keys hashing to the same fingerprint can only cause a spurious
conflict, never a missed one.
*/
pub(crate) fn fingerprint(user_key: &[u8]) -> u64 {
    xxh64(user_key, 0)
}
