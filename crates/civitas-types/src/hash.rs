use crate::error::TypesError;
use std::fmt;
use std::str::FromStr;

/// 32-byte hash value (blake3 digest).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const ZERO: Self = Self([0u8; 32]);
    pub const LEN: usize = 32;

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != 32 {
            return Err(TypesError::InvalidHashLength(slice.len()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Compute blake3 hash of data
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Compute blake3 hash of multiple data slices
    pub fn compute_multi(data: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for chunk in data {
            hasher.update(chunk);
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, used in log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl FromStr for Hash {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_compute() {
        let hash = Hash::compute(b"hello world");
        assert!(!hash.is_zero());
        assert_eq!(hash, Hash::compute(b"hello world"));
        assert_ne!(hash, Hash::compute(b"hello world!"));
    }

    #[test]
    fn test_hash_compute_multi() {
        let hash1 = Hash::compute_multi(&[b"hello ", b"world"]);
        let hash2 = Hash::compute(b"hello world");
        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_hex_parse() {
        let hash = Hash::compute(b"test");
        let parsed: Hash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert_eq!(hash.short().len(), 8);
    }

    #[test]
    fn test_hash_wrong_length() {
        assert_eq!(Hash::from_slice(&[0u8; 31]), Err(TypesError::InvalidHashLength(31)));
    }
}
