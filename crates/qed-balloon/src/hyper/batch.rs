//! Fixed-shape subtree batches, the hyper tree's unit of storage.
//!
//! A batch packs four tree levels into 31 heap-ordered slots: slot 0 is
//! the batch root, the children of slot `i` are `2i + 1` and `2i + 2`,
//! and the bottom row (slots 15..31) holds the roots of child batches.
//! On disk a batch is a 4-byte bitmap of present slots (bit `i` is bit
//! `7 - i % 8` of byte `i / 8`) followed by the present entries in slot
//! order. Each entry is a hash-wide payload plus one type tag.
//!
//! A *shortcut* entry at slot `i` terminates descent where exactly one
//! leaf lives beneath: slot `i` carries the leaf hash tagged
//! [`TAG_SHORTCUT`], and slots `2i + 1` / `2i + 2` carry the full key and
//! the value, both tagged [`TAG_KEY_OR_VALUE`].

use crate::error::BalloonError;

type Result<T> = std::result::Result<T, BalloonError>;

/// Tree levels covered by one batch.
pub const BATCH_HEIGHT: u16 = 4;
/// Slots per batch: `2^5 - 1` heap-ordered nodes.
pub const BATCH_SLOTS: usize = 31;

const BITMAP_LEN: usize = 4;

/// Entry type: an inner-node (or child batch root) hash.
pub const TAG_INNER: u8 = 0;
/// Entry type: a shortcut leaf hash.
pub const TAG_SHORTCUT: u8 = 1;
/// Entry type: a shortcut's key or value payload.
pub const TAG_KEY_OR_VALUE: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    payload: Vec<u8>,
    tag: u8,
}

/// An unpacked batch. `width` is the hash width in bytes; every payload is
/// exactly that wide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    width: usize,
    slots: Vec<Option<Entry>>,
}

impl Batch {
    /// A batch with no occupied slots.
    pub fn empty(width: usize) -> Self {
        Self {
            width,
            slots: vec![None; BATCH_SLOTS],
        }
    }

    /// Decode a serialized batch, validating the §4.8 layout.
    pub fn deserialize(width: usize, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BITMAP_LEN {
            return Err(BalloonError::CorruptBatch(format!(
                "batch of {} bytes is shorter than its bitmap",
                bytes.len()
            )));
        }
        let (bitmap, mut rest) = bytes.split_at(BITMAP_LEN);
        if bitmap[3] & 0x01 != 0 {
            return Err(BalloonError::CorruptBatch("bitmap addresses slot 31".to_string()));
        }

        let entry_size = width + 1;
        let mut batch = Self::empty(width);
        for slot in 0..BATCH_SLOTS {
            if bitmap[slot / 8] >> (7 - slot % 8) & 1 == 0 {
                continue;
            }
            if rest.len() < entry_size {
                return Err(BalloonError::CorruptBatch(format!(
                    "batch truncated at slot {slot}"
                )));
            }
            let (entry, remaining) = rest.split_at(entry_size);
            rest = remaining;
            let tag = entry[width];
            if tag > TAG_KEY_OR_VALUE {
                return Err(BalloonError::CorruptBatch(format!(
                    "unknown type tag {tag} at slot {slot}"
                )));
            }
            batch.slots[slot] = Some(Entry {
                payload: entry[..width].to_vec(),
                tag,
            });
        }
        if !rest.is_empty() {
            return Err(BalloonError::CorruptBatch(format!(
                "{} trailing bytes after batch entries",
                rest.len()
            )));
        }
        Ok(batch)
    }

    /// Encode the batch: bitmap, then present entries in slot order.
    pub fn serialize(&self) -> Vec<u8> {
        let occupied = self.slots.iter().filter(|s| s.is_some()).count();
        let mut out = Vec::with_capacity(BITMAP_LEN + occupied * (self.width + 1));
        let mut bitmap = [0u8; BITMAP_LEN];
        for (slot, entry) in self.slots.iter().enumerate() {
            if entry.is_some() {
                bitmap[slot / 8] |= 1 << (7 - slot % 8);
            }
        }
        out.extend_from_slice(&bitmap);
        for entry in self.slots.iter().flatten() {
            out.extend_from_slice(&entry.payload);
            out.push(entry.tag);
        }
        out
    }

    /// Whether slot `slot` is occupied.
    pub fn has(&self, slot: usize) -> bool {
        self.slots[slot].is_some()
    }

    /// Whether the batch holds nothing.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }

    /// The hash payload at `slot` (inner or shortcut entries).
    pub fn hash_at(&self, slot: usize) -> Option<&[u8]> {
        self.slots[slot].as_ref().map(|e| e.payload.as_slice())
    }

    /// Whether slot `slot` holds a shortcut.
    pub fn is_shortcut(&self, slot: usize) -> bool {
        matches!(&self.slots[slot], Some(e) if e.tag == TAG_SHORTCUT)
    }

    /// The `(key, value)` of a shortcut at `slot`.
    pub fn shortcut_at(&self, slot: usize) -> Result<(Vec<u8>, Vec<u8>)> {
        let corrupt = |what: &str| {
            BalloonError::CorruptBatch(format!("shortcut at slot {slot} has no {what} entry"))
        };
        if !self.is_shortcut(slot) {
            return Err(corrupt("shortcut"));
        }
        let key = self.slots[2 * slot + 1].as_ref().ok_or_else(|| corrupt("key"))?;
        let value = self.slots[2 * slot + 2].as_ref().ok_or_else(|| corrupt("value"))?;
        if key.tag != TAG_KEY_OR_VALUE || value.tag != TAG_KEY_OR_VALUE {
            return Err(BalloonError::CorruptBatch(format!(
                "inner entry below the shortcut at slot {slot}"
            )));
        }
        Ok((key.payload.clone(), value.payload.clone()))
    }

    /// Write an inner-node hash at `slot`.
    pub fn set_inner(&mut self, slot: usize, hash: &[u8]) {
        debug_assert_eq!(hash.len(), self.width);
        self.slots[slot] = Some(Entry {
            payload: hash.to_vec(),
            tag: TAG_INNER,
        });
    }

    /// Write a shortcut at `slot`: leaf hash plus key and value children.
    pub fn set_shortcut(&mut self, slot: usize, leaf_hash: &[u8], key: &[u8], value: &[u8]) {
        debug_assert!(slot < 15, "shortcut children must stay inside the batch");
        self.slots[slot] = Some(Entry {
            payload: leaf_hash.to_vec(),
            tag: TAG_SHORTCUT,
        });
        self.slots[2 * slot + 1] = Some(Entry {
            payload: key.to_vec(),
            tag: TAG_KEY_OR_VALUE,
        });
        self.slots[2 * slot + 2] = Some(Entry {
            payload: value.to_vec(),
            tag: TAG_KEY_OR_VALUE,
        });
    }

    /// Remove a shortcut and its key/value children, leaving the slot
    /// free for an inner node when the shortcut is pushed down.
    pub fn clear_shortcut(&mut self, slot: usize) {
        self.slots[slot] = None;
        self.slots[2 * slot + 1] = None;
        self.slots[2 * slot + 2] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_shortcut_layout() {
        // One shortcut at the batch root: bitmap 11100000…, three entries.
        let mut batch = Batch::empty(1);
        batch.set_shortcut(0, &[0x00], &[0x00], &[0x00]);
        assert_eq!(
            batch.serialize(),
            vec![0xe0, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x02, 0x00, 0x02],
        );
    }

    #[test]
    fn test_left_spine_layout() {
        // Inner hashes down the left spine: slots 0, 1, 3, 7, 15.
        let mut batch = Batch::empty(1);
        for slot in [0, 1, 3, 7, 15] {
            batch.set_inner(slot, &[0x04]);
        }
        assert_eq!(
            batch.serialize(),
            vec![
                0xd1, 0x01, 0x00, 0x00, //
                0x04, 0x00, 0x04, 0x00, 0x04, 0x00, 0x04, 0x00, 0x04, 0x00,
            ],
        );
    }

    #[test]
    fn test_roundtrip() {
        let mut batch = Batch::empty(1);
        batch.set_inner(0, &[0x08]);
        batch.set_shortcut(1, &[0x00], &[0x00], &[0x00]);
        batch.set_inner(2, &[0x04]);
        batch.set_shortcut(5, &[0x08], &[0x08], &[0x08]);
        batch.set_shortcut(6, &[0x0c], &[0x0c], &[0x0c]);

        let bytes = batch.serialize();
        assert_eq!(&bytes[..4], &[0xfe, 0x1e, 0x00, 0x00]);
        assert_eq!(Batch::deserialize(1, &bytes).unwrap(), batch);
    }

    #[test]
    fn test_clear_shortcut_frees_children() {
        let mut batch = Batch::empty(1);
        batch.set_shortcut(1, &[0x01], &[0x01], &[0x01]);
        batch.clear_shortcut(1);
        assert!(batch.is_empty());
    }

    #[test]
    fn test_deserialize_rejects_truncation() {
        let bytes = vec![0xe0, 0x00, 0x00, 0x00, 0x00, 0x01];
        assert!(matches!(
            Batch::deserialize(1, &bytes),
            Err(BalloonError::CorruptBatch(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_unknown_tag() {
        let bytes = vec![0x80, 0x00, 0x00, 0x00, 0x00, 0x03];
        assert!(matches!(
            Batch::deserialize(1, &bytes),
            Err(BalloonError::CorruptBatch(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_trailing_bytes() {
        let bytes = vec![0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];
        assert!(matches!(
            Batch::deserialize(1, &bytes),
            Err(BalloonError::CorruptBatch(_))
        ));
    }

    #[test]
    fn test_wide_entries() {
        let mut batch = Batch::empty(32);
        batch.set_inner(0, &[0xab; 32]);
        let bytes = batch.serialize();
        assert_eq!(bytes.len(), 4 + 33);
        let parsed = Batch::deserialize(32, &bytes).unwrap();
        assert_eq!(parsed.hash_at(0), Some([0xab; 32].as_slice()));
    }
}
