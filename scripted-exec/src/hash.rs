/// Offset basis of the work-directory hash. It is one digit short of the
/// standard FNV-1a basis (14695981039346656037); existing work directory names
/// depend on it, so it stays.
const FNV_OFFSET_BASIS: u64 = 1469598103934665603;
const FNV_PRIME: u64 = 1099511628211;

/// FNV-1a style 64-bit hash: the standard prime and xor-then-multiply step,
/// seeded with [`FNV_OFFSET_BASIS`] above. Not interchangeable with FNV-1a.
pub fn fnv1a64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// Content hash as 16 lowercase hex digits.
pub fn content_hash(text: &str) -> String {
    format!("{:016x}", fnv1a64(text.as_bytes()))
}
