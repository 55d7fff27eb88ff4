//! Signature reduction and harmony scoring.

use sha2::{Digest, Sha256};

/// Target signatures the optimizer converges toward.
pub const ATTRACTORS: [u8; 3] = [3, 6, 9];

/// Fibonacci-like reference sequence used for proximity scaling and the
/// sum-membership harmony rule.
pub const REFERENCE_SEQUENCE: [u64; 16] = [
    1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377, 610, 987,
];

/// Number of positions on the signature ring.
const RING: u8 = 10;

/// Repeated decimal digit sum down to a single digit.
pub(crate) fn digit_root(mut n: u64) -> u8 {
    while n >= 10 {
        let mut sum = 0;
        while n > 0 {
            sum += n % 10;
            n /= 10;
        }
        n = sum;
    }
    n as u8
}

/// Signature of a real value: `|value|` scaled by 1000, truncated, then
/// reduced to its digital root. Non-finite values map to 0.
pub fn signature(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    // `as` saturates for magnitudes beyond u64.
    digit_root((value.abs() * 1000.0) as u64)
}

/// Signature of an arbitrary label, via the digit sum of its SHA-256 hex
/// digest. Used for device and task signatures.
pub fn signature_of(data: &str) -> u8 {
    let digest = Sha256::digest(data.as_bytes());
    let total: u64 = hex::encode(digest)
        .chars()
        .filter_map(|c| c.to_digit(16))
        .map(u64::from)
        .sum();
    digit_root(total)
}

/// Returns true if the signature is in the attractor set.
pub fn is_attractor(signature: u8) -> bool {
    ATTRACTORS.contains(&signature)
}

/// Shortest distance between two signatures on the 0-9 ring.
pub fn ring_distance(a: u8, b: u8) -> u8 {
    let d = a.abs_diff(b) % RING;
    d.min(RING - d)
}

/// The attractor closest to `signature` on the ring. Ties resolve to the
/// smaller attractor.
pub fn nearest_attractor(signature: u8) -> u8 {
    ATTRACTORS
        .iter()
        .copied()
        .min_by_key(|a| ring_distance(signature, *a))
        .unwrap_or(ATTRACTORS[0])
}

/// Compatibility between two signatures, in `[0.3, 1.0]`.
pub fn harmony(a: u8, b: u8) -> f64 {
    if a == b {
        return 1.0;
    }

    match (is_attractor(a), is_attractor(b)) {
        (true, true) => return 0.9,
        (true, false) | (false, true) => return 0.7,
        (false, false) => {}
    }

    let sum = u64::from(a) + u64::from(b);
    if is_attractor(digit_root(sum)) {
        return 0.8;
    }
    if REFERENCE_SEQUENCE.contains(&sum) {
        return 0.6;
    }

    (1.0 - f64::from(ring_distance(a, b)) / 5.0).max(0.3)
}

/// Scaling factor in `[1.0, 2.0)` derived from how close the value's
/// scaled magnitude sits to a reference sequence entry.
pub(crate) fn proximity_factor(value: f64) -> f64 {
    let scaled = ((value.abs() * 100.0) as u64) % 1000;
    let nearest = REFERENCE_SEQUENCE
        .iter()
        .copied()
        .min_by_key(|r| r.abs_diff(scaled))
        .unwrap_or(1);
    1.0 + nearest as f64 / 1000.0
}
