//! Hash function contract shared by the history and hyper trees.
//!
//! Both trees are parameterized over a [`Hasher`] with a fixed output width
//! of W bits. Production deployments use [`Sha256Hasher`] (W = 256); the
//! 8-bit [`XorHasher`] and [`PearsonHasher`] exist so tree-shape tests can
//! work with digests small enough to enumerate by hand.
//!
//! A hasher must be deterministic and must depend only on the concatenation
//! of its inputs, i.e. `hash([a, b]) == hash([a ++ b])`. Implementations
//! hold no state between calls.

use std::str::FromStr;

use sha2::{Digest as _, Sha256};

/// A digest produced by a [`Hasher`]. Width depends on the hasher.
pub type Digest = Vec<u8>;

/// Collision-resistant hash with a fixed output width.
pub trait Hasher: Send + Sync {
    /// Hash the concatenation of the given byte slices.
    fn hash(&self, data: &[&[u8]]) -> Digest;

    /// Digest width in bytes.
    fn len(&self) -> usize;

    /// Digest width in bits.
    fn bits(&self) -> u16 {
        (self.len() * 8) as u16
    }
}

/// Selects a [`Hasher`] implementation; the factory of the two trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HasherKind {
    /// SHA-256, the production hasher (W = 256).
    Sha256,
    /// BLAKE3 truncated to its default 256-bit output.
    Blake3,
    /// One-byte XOR fold (W = 8). Testing only.
    Xor,
    /// One-byte Pearson hash (W = 8). Testing only.
    Pearson,
}

impl HasherKind {
    /// Instantiate a fresh hasher of this kind.
    pub fn new_hasher(&self) -> Box<dyn Hasher> {
        match self {
            HasherKind::Sha256 => Box::new(Sha256Hasher),
            HasherKind::Blake3 => Box::new(Blake3Hasher),
            HasherKind::Xor => Box::new(XorHasher),
            HasherKind::Pearson => Box::new(PearsonHasher),
        }
    }
}

impl FromStr for HasherKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(HasherKind::Sha256),
            "blake3" => Ok(HasherKind::Blake3),
            "xor" => Ok(HasherKind::Xor),
            "pearson" => Ok(HasherKind::Pearson),
            other => Err(format!("unknown hasher kind: {other}")),
        }
    }
}

/// SHA-256.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl Hasher for Sha256Hasher {
    fn hash(&self, data: &[&[u8]]) -> Digest {
        let mut hasher = Sha256::new();
        for chunk in data {
            hasher.update(chunk);
        }
        hasher.finalize().to_vec()
    }

    fn len(&self) -> usize {
        32
    }
}

/// BLAKE3 with the default 32-byte output.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn hash(&self, data: &[&[u8]]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        for chunk in data {
            hasher.update(chunk);
        }
        hasher.finalize().as_bytes().to_vec()
    }

    fn len(&self) -> usize {
        32
    }
}

/// Folds every input byte with XOR into a single output byte.
///
/// Trivially non-cryptographic; exists so 8-bit tree tests can predict
/// every node hash by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct XorHasher;

impl Hasher for XorHasher {
    fn hash(&self, data: &[&[u8]]) -> Digest {
        let mut result = 0u8;
        for chunk in data {
            for b in *chunk {
                result ^= b;
            }
        }
        vec![result]
    }

    fn len(&self) -> usize {
        1
    }
}

/// Pearson table lookup hashing. 256 entries shuffled in a fixed order.
const PEARSON_TABLE: [u8; 256] = [
    98, 6, 85, 150, 36, 23, 112, 164, 135, 207, 169, 5, 26, 64, 165, 219, //
    61, 20, 68, 89, 130, 63, 52, 102, 24, 229, 132, 245, 80, 216, 195, 115, //
    90, 168, 156, 203, 177, 120, 2, 190, 188, 7, 100, 185, 174, 243, 162, 10, //
    237, 18, 253, 225, 8, 208, 172, 244, 255, 126, 101, 79, 145, 235, 228, 121, //
    123, 251, 67, 250, 161, 0, 107, 97, 241, 111, 181, 82, 249, 33, 69, 55, //
    59, 153, 29, 9, 213, 167, 84, 93, 30, 46, 94, 75, 151, 114, 73, 222, //
    197, 96, 210, 45, 16, 227, 248, 202, 51, 152, 252, 125, 81, 206, 215, 186, //
    39, 158, 178, 187, 131, 136, 1, 49, 50, 17, 141, 91, 47, 129, 60, 99, //
    154, 35, 86, 171, 105, 34, 38, 200, 147, 58, 77, 118, 173, 246, 76, 254, //
    133, 232, 196, 144, 198, 124, 53, 4, 108, 74, 223, 234, 134, 230, 157, 139, //
    189, 205, 199, 128, 176, 19, 211, 236, 127, 192, 231, 70, 233, 88, 146, 44, //
    183, 201, 22, 83, 13, 214, 116, 109, 159, 32, 95, 226, 140, 220, 57, 12, //
    221, 31, 209, 182, 143, 92, 149, 184, 148, 62, 113, 65, 37, 27, 106, 166, //
    3, 14, 204, 72, 21, 41, 56, 66, 28, 193, 40, 217, 25, 54, 179, 117, //
    238, 87, 240, 155, 180, 170, 242, 212, 191, 163, 78, 218, 137, 194, 175, 110, //
    43, 119, 224, 71, 122, 142, 42, 160, 104, 48, 247, 103, 15, 11, 138, 239, //
];

/// Pearson hashing over the fixed permutation table.
///
/// Each input slice is hashed independently, then the per-slice results
/// are folded through the table again.
#[derive(Debug, Clone, Copy, Default)]
pub struct PearsonHasher;

impl Hasher for PearsonHasher {
    fn hash(&self, data: &[&[u8]]) -> Digest {
        let mut intermediate = Vec::with_capacity(data.len());
        for chunk in data {
            let mut h = 0u8;
            for b in *chunk {
                h = PEARSON_TABLE[(h ^ b) as usize];
            }
            intermediate.push(h);
        }

        let mut result = 0u8;
        for h in intermediate {
            result = PEARSON_TABLE[(result ^ h) as usize];
        }
        vec![result]
    }

    fn len(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_width_and_determinism() {
        let hasher = Sha256Hasher;
        let a = hasher.hash(&[b"event"]);
        let b = hasher.hash(&[b"event"]);
        assert_eq!(a.len(), 32);
        assert_eq!(hasher.len(), 32);
        assert_eq!(hasher.bits(), 256);
        assert_eq!(a, b);
    }

    #[test]
    fn test_concatenation_semantics() {
        // H(a, b) must equal H(a ++ b) for every implementation.
        for kind in [
            HasherKind::Sha256,
            HasherKind::Blake3,
            HasherKind::Xor,
            HasherKind::Pearson,
        ] {
            let hasher = kind.new_hasher();
            let split = hasher.hash(&[b"hello ", b"world"]);
            let joined = hasher.hash(&[b"hello world"]);
            assert_eq!(split, joined, "{kind:?} breaks concatenation semantics");
        }
    }

    #[test]
    fn test_xor_folds_all_bytes() {
        let hasher = XorHasher;
        assert_eq!(hasher.hash(&[&[0x00], &[0x00]]), vec![0x00]);
        assert_eq!(hasher.hash(&[&[0x0f], &[0xf0]]), vec![0xff]);
        assert_eq!(hasher.hash(&[&[0xaa, 0xaa]]), vec![0x00]);
        assert_eq!(hasher.len(), 1);
    }

    #[test]
    fn test_pearson_is_one_byte_and_stable() {
        let hasher = PearsonHasher;
        let d = hasher.hash(&[b"some event"]);
        assert_eq!(d.len(), 1);
        assert_eq!(d, hasher.hash(&[b"some event"]));
        // Single zero byte walks the table once.
        assert_eq!(hasher.hash(&[&[0x00]]), vec![PEARSON_TABLE[PEARSON_TABLE[0] as usize]]);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("sha256".parse::<HasherKind>().unwrap(), HasherKind::Sha256);
        assert_eq!("xor".parse::<HasherKind>().unwrap(), HasherKind::Xor);
        assert!("md5".parse::<HasherKind>().is_err());
    }
}
