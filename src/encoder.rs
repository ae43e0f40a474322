//! Input id encoders.
//!
//! An encoder deterministically folds an input id into a 64-bit word: the low
//! 56 bits carry the payload, the top 7 bits carry length metadata, and bit
//! 56 stays clear — the mapper owns it as the collision mark. The value 0 is
//! reserved for "no id here" and must never be produced for a real id; the
//! mapper rejects it at `put`. The zero-length id is still a real id and
//! encodes to a reserved word of its own (`EMPTY_ID`, length metadata zero).

const PAYLOAD_MASK: u64 = (1 << 56) - 1;
const LENGTH_SHIFT: u32 = 57;
const MAX_LENGTH: usize = 0x7F;
/// Encoding of the zero-length id. Its length metadata is all zeros, so
/// without a reserved word it would land on the gap value; no non-empty id
/// can produce this (their length bits are non-zero).
const EMPTY_ID: u64 = 1;

pub trait Encoder: Sync {
    fn encode(&self, input_id: &[u8]) -> u64;
}

/// Packs up to seven bytes big-endian into the low 56 bits. Longer ids keep
/// their first seven bytes, which is what makes accidental collisions
/// possible: two ids sharing a 7-byte prefix and a length encode identically
/// and are told apart through the collision side-store.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringEncoder;

impl Encoder for StringEncoder {
    fn encode(&self, input_id: &[u8]) -> u64 {
        if input_id.is_empty() {
            return EMPTY_ID;
        }
        let len = input_id.len().min(MAX_LENGTH) as u64;
        let mut payload = 0u64;
        for &byte in input_id.iter().take(7) {
            payload = (payload << 8) | byte as u64;
        }
        (len << LENGTH_SHIFT) | payload
    }
}

/// Hashes the whole id into the 56-bit payload. Trades the string encoder's
/// prefix ordering for far fewer accidental collisions on ids that share
/// long prefixes.
#[derive(Debug, Clone, Copy)]
pub struct HashEncoder {
    seed: u64,
}

impl HashEncoder {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl Default for HashEncoder {
    fn default() -> Self {
        Self::new(0xA24B_1F6F_1234_5678)
    }
}

impl Encoder for HashEncoder {
    fn encode(&self, input_id: &[u8]) -> u64 {
        if input_id.is_empty() {
            return EMPTY_ID;
        }
        let len = input_id.len().min(MAX_LENGTH) as u64;
        let payload = wyhash::wyhash(input_id, self.seed) & PAYLOAD_MASK;
        (len << LENGTH_SHIFT) | payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::COLLISION_MARK;
    use rand::rngs::StdRng;
    use rand::{Rng, RngCore, SeedableRng};

    #[test]
    fn string_encoder_packs_length_and_bytes() {
        let eid = StringEncoder.encode(b"ab");
        assert_eq!(eid >> LENGTH_SHIFT, 2);
        assert_eq!(eid & PAYLOAD_MASK, 0x6162);
    }

    #[test]
    fn empty_id_gets_its_own_nonzero_encoding() {
        for eid in [StringEncoder.encode(b""), HashEncoder::default().encode(b"")] {
            assert_ne!(eid, 0);
            assert!(!COLLISION_MARK.is_set(eid));
            // Length metadata of zero: no non-empty id can encode here.
            assert_eq!(eid >> LENGTH_SHIFT, 0);
        }
        assert_ne!(StringEncoder.encode(b""), StringEncoder.encode(b"a"));
        assert_ne!(StringEncoder.encode(b""), StringEncoder.encode(&[0]));
    }

    #[test]
    fn distinct_short_ids_encode_distinctly() {
        assert_ne!(StringEncoder.encode(b"alice"), StringEncoder.encode(b"bob"));
        assert_ne!(StringEncoder.encode(b"a"), StringEncoder.encode(b"aa"));
    }

    #[test]
    fn long_ids_with_shared_prefix_and_length_collide() {
        let a = b"prefix-aaaaa";
        let b = b"prefix-bbbbb";
        assert_eq!(StringEncoder.encode(a), StringEncoder.encode(b));
        assert_ne!(HashEncoder::default().encode(a), HashEncoder::default().encode(b));
    }

    #[test]
    fn encoders_never_touch_the_collision_mark() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for _ in 0..10_000 {
            let len = rng.gen_range(1..=40);
            let mut id = vec![0u8; len];
            rng.fill_bytes(&mut id);
            for eid in [StringEncoder.encode(&id), HashEncoder::default().encode(&id)] {
                assert!(!COLLISION_MARK.is_set(eid), "bit 56 set for {id:?}");
                assert_ne!(eid, 0);
            }
        }
    }

    #[test]
    fn hash_encoder_is_deterministic_and_seeded() {
        let a = HashEncoder::new(1).encode(b"node-1");
        assert_eq!(a, HashEncoder::new(1).encode(b"node-1"));
        assert_ne!(a, HashEncoder::new(2).encode(b"node-1"));
    }
}
