use civitas_types::Hash;

/// Compute blake3 hash of data
pub fn hash(data: &[u8]) -> Hash {
    Hash::compute(data)
}

/// Compute blake3 hash of multiple data slices
pub fn hash_multi(data: &[&[u8]]) -> Hash {
    Hash::compute_multi(data)
}

/// Hash with a domain separator.
///
/// The domain is length-prefixed so that `("ab", "c")` and `("a", "bc")`
/// never collide.
pub fn hash_with_domain(data: &[u8], domain: &str) -> Hash {
    let len = (domain.len() as u64).to_le_bytes();
    hash_multi(&[&len, domain.as_bytes(), data])
}

/// Incremental hasher for building identifiers out of many fields.
pub struct IncrementalHasher {
    hasher: blake3::Hasher,
}

impl IncrementalHasher {
    pub fn new() -> Self {
        Self {
            hasher: blake3::Hasher::new(),
        }
    }

    /// Start a hasher already bound to a domain separator.
    pub fn with_domain(domain: &str) -> Self {
        let mut hasher = Self::new();
        hasher.update(&(domain.len() as u64).to_le_bytes());
        hasher.update(domain.as_bytes());
        hasher
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.hasher.update(data);
        self
    }

    pub fn update_u64(&mut self, value: u64) -> &mut Self {
        self.update(&value.to_le_bytes())
    }

    pub fn update_u128(&mut self, value: u128) -> &mut Self {
        self.update(&value.to_le_bytes())
    }

    pub fn finalize(&self) -> Hash {
        Hash::from_bytes(*self.hasher.finalize().as_bytes())
    }
}

impl Default for IncrementalHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_multi() {
        assert_eq!(hash_multi(&[b"hello ", b"world"]), hash(b"hello world"));
    }

    #[test]
    fn test_hash_with_domain() {
        let result1 = hash_with_domain(b"data", "domain1");
        let result2 = hash_with_domain(b"data", "domain2");
        assert_ne!(result1, result2);
        assert_eq!(result1, hash_with_domain(b"data", "domain1"));
    }

    #[test]
    fn test_domain_is_length_prefixed() {
        assert_ne!(hash_with_domain(b"c", "ab"), hash_with_domain(b"bc", "a"));
    }

    #[test]
    fn test_incremental_matches_domain_hash() {
        let mut hasher = IncrementalHasher::with_domain("ops");
        hasher.update(b"payload");
        assert_eq!(hasher.finalize(), hash_with_domain(b"payload", "ops"));
    }

    #[test]
    fn test_incremental_integers() {
        let a = IncrementalHasher::new().update_u64(1).update_u128(2).finalize();
        let b = IncrementalHasher::new().update_u64(2).update_u128(1).finalize();
        assert_ne!(a, b);
    }
}
