//! serde and borsh implementations for civitas-types.
//!
//! serde uses the human-readable string forms (Bech32m addresses, 0x-hex
//! hashes and keys); borsh uses the raw fixed-width bytes.

use crate::*;

#[cfg(feature = "serde")]
mod serde_impls {
    use super::*;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;

    fn strip_hex_prefix(s: &str) -> &str {
        s.strip_prefix("0x").unwrap_or(s)
    }

    impl Serialize for Hash {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            self.to_string().serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Hash {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            Hash::from_str(&s).map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for Address {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            self.to_string().serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Address {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            Address::from_str(&s).map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for Ed25519Signature {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            format!("0x{}", hex::encode(self.as_bytes())).serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Ed25519Signature {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(strip_hex_prefix(&s)).map_err(serde::de::Error::custom)?;
            Ed25519Signature::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }

    impl Serialize for Ed25519PublicKey {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            format!("0x{}", hex::encode(self.as_bytes())).serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for Ed25519PublicKey {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            let bytes = hex::decode(strip_hex_prefix(&s)).map_err(serde::de::Error::custom)?;
            Ed25519PublicKey::from_slice(&bytes).map_err(serde::de::Error::custom)
        }
    }
}

#[cfg(feature = "borsh")]
mod borsh_impls {
    use super::*;
    use borsh::{BorshDeserialize, BorshSerialize};

    impl BorshSerialize for Hash {
        fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
            writer.write_all(self.as_bytes())
        }
    }

    impl BorshDeserialize for Hash {
        fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
            let mut bytes = [0u8; 32];
            reader.read_exact(&mut bytes)?;
            Ok(Hash::from_bytes(bytes))
        }
    }

    impl BorshSerialize for Address {
        fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
            writer.write_all(self.as_bytes())
        }
    }

    impl BorshDeserialize for Address {
        fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
            let mut bytes = [0u8; 20];
            reader.read_exact(&mut bytes)?;
            Ok(Address::from_bytes(bytes))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(feature = "serde")]
    fn test_address_serde_uses_bech32() {
        let original = Address::from_bytes([3u8; 20]);
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.contains("civ1"));
        let decoded: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    #[cfg(feature = "serde")]
    fn test_signature_serde() {
        let original = Ed25519Signature::from_bytes([9u8; 64]);
        let json = serde_json::to_string(&original).unwrap();
        assert!(json.starts_with("\"0x"));
        let decoded: Ed25519Signature = serde_json::from_str(&json).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    #[cfg(feature = "borsh")]
    fn test_address_borsh_is_raw_bytes() {
        let original = Address::from_bytes([5u8; 20]);
        let encoded = borsh::to_vec(&original).unwrap();
        assert_eq!(encoded, vec![5u8; 20]);
        let decoded: Address = borsh::from_slice(&encoded).unwrap();
        assert_eq!(original, decoded);
    }
}
