//! Block coding schemes
//!
//! Data burned into a coded block carries redundancy which the eFuse
//! controller uses to correct single bit faults. The ESP32 can use 3/4
//! encoding for blocks 1-3, all later chips protect every block but block 0
//! with Reed-Solomon RS(44,32) check values.

use crate::error::Error;

/// Number of data bytes in a Reed-Solomon protected block
pub const RS_DATA_LEN: usize = 32;
/// Number of check bytes appended to a Reed-Solomon protected block
pub const RS_CHECK_LEN: usize = 12;

/// Number of payload bytes in a 3/4 encoded block
pub const THREE_QUARTERS_DATA_LEN: usize = 24;

const PRIMITIVE: u16 = 0x11d;

/// Exponent and logarithm tables of GF(2^8)
struct Galois {
    exp: [u8; 512],
    log: [u8; 256],
}

const GF: Galois = build_tables();

const fn build_tables() -> Galois {
    let mut exp = [0u8; 512];
    let mut log = [0u8; 256];

    let mut x: u16 = 1;
    let mut i = 0;
    while i < 255 {
        exp[i] = x as u8;
        log[x as usize] = i as u8;

        x <<= 1;
        if x & 0x100 != 0 {
            x ^= PRIMITIVE;
        }
        i += 1;
    }

    while i < 512 {
        exp[i] = exp[i - 255];
        i += 1;
    }

    Galois { exp, log }
}

const fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }

    GF.exp[GF.log[a as usize] as usize + GF.log[b as usize] as usize]
}

/// Generator polynomial, highest degree coefficient first
const GENERATOR: [u8; RS_CHECK_LEN + 1] = build_generator();

const fn build_generator() -> [u8; RS_CHECK_LEN + 1] {
    let mut g = [0u8; RS_CHECK_LEN + 1];
    g[0] = 1;

    // Multiply by (x - a^i) for every root, the degree grows by one each round
    let mut i = 0;
    while i < RS_CHECK_LEN {
        let root = GF.exp[i];
        let mut j = i + 1;
        while j > 0 {
            g[j] ^= gf_mul(g[j - 1], root);
            j -= 1;
        }
        i += 1;
    }

    g
}

/// Compute the Reed-Solomon check values for one block of data.
pub fn rs_check_values(data: &[u8; RS_DATA_LEN]) -> [u8; RS_CHECK_LEN] {
    let mut remainder = [0u8; RS_DATA_LEN + RS_CHECK_LEN];
    remainder[..RS_DATA_LEN].copy_from_slice(data);

    for i in 0..RS_DATA_LEN {
        let coef = remainder[i];
        if coef != 0 {
            for (j, g) in GENERATOR.iter().enumerate().skip(1) {
                remainder[i + j] ^= gf_mul(*g, coef);
            }
        }
    }

    let mut check = [0u8; RS_CHECK_LEN];
    check.copy_from_slice(&remainder[RS_DATA_LEN..]);
    check
}

/// Apply 3/4 encoding to up to 24 bytes of data.
///
/// Every group of 6 data bytes is followed by the XOR of the group and the
/// sum of the bit counts of each byte weighted by its position.
pub fn encode_three_quarters(data: &[u8]) -> Result<[u8; 32], Error> {
    if data.len() > THREE_QUARTERS_DATA_LEN {
        return Err(Error::DataTooLarge {
            block: String::from("3/4 encoded block"),
            len: data.len(),
            max: THREE_QUARTERS_DATA_LEN,
        });
    }

    let mut padded = [0u8; THREE_QUARTERS_DATA_LEN];
    padded[..data.len()].copy_from_slice(data);

    let mut encoded = [0u8; 32];
    for (group, out) in padded.chunks_exact(6).zip(encoded.chunks_exact_mut(8)) {
        let xor = group.iter().fold(0u8, |acc, b| acc ^ b);
        let weighted = group
            .iter()
            .enumerate()
            .map(|(i, b)| (i as u32 + 1) * b.count_ones())
            .sum::<u32>();

        out[..6].copy_from_slice(group);
        out[6] = xor;
        out[7] = (weighted & 0xff) as u8;
    }

    Ok(encoded)
}

/// Strip the check bytes of a 3/4 encoded block.
pub fn decode_three_quarters(encoded: &[u8; 32]) -> [u8; THREE_QUARTERS_DATA_LEN] {
    let mut data = [0u8; THREE_QUARTERS_DATA_LEN];
    for (group, out) in encoded.chunks_exact(8).zip(data.chunks_exact_mut(6)) {
        out.copy_from_slice(&group[..6]);
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syndromes(codeword: &[u8]) -> Vec<u8> {
        (0..RS_CHECK_LEN)
            .map(|i| {
                let x = GF.exp[i];
                codeword.iter().fold(0u8, |acc, c| gf_mul(acc, x) ^ c)
            })
            .collect()
    }

    fn codeword(data: &[u8; RS_DATA_LEN]) -> Vec<u8> {
        let mut word = data.to_vec();
        word.extend_from_slice(&rs_check_values(data));
        word
    }

    #[test]
    fn field_tables_are_consistent() {
        assert_eq!(GF.exp[0], 1);
        assert_eq!(GF.exp[8], 0x1d);
        for x in 1..=255u8 {
            assert_eq!(GF.exp[GF.log[x as usize] as usize], x);
        }
    }

    #[test]
    fn generator_is_monic() {
        assert_eq!(GENERATOR[0], 1);
        assert_ne!(GENERATOR[RS_CHECK_LEN], 0);
    }

    #[test]
    fn empty_block_has_zero_check_values() {
        assert_eq!(rs_check_values(&[0; RS_DATA_LEN]), [0; RS_CHECK_LEN]);
    }

    #[test]
    fn codewords_have_zero_syndromes() {
        let mut data = [0u8; RS_DATA_LEN];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i as u8).wrapping_mul(37).wrapping_add(11);
        }

        assert!(syndromes(&codeword(&data)).iter().all(|s| *s == 0));

        let mut key = [0xffu8; RS_DATA_LEN];
        key[0] = 0x01;
        assert!(syndromes(&codeword(&key)).iter().all(|s| *s == 0));
    }

    #[test]
    fn corrupted_codeword_is_detected() {
        let data = [0x5au8; RS_DATA_LEN];
        let mut word = codeword(&data);
        word[3] ^= 0x10;

        assert!(syndromes(&word).iter().any(|s| *s != 0));
    }

    #[test]
    fn three_quarters_places_check_bytes() {
        let data = [0x01, 0x03, 0x00, 0x00, 0x00, 0x80];
        let encoded = encode_three_quarters(&data).unwrap();

        assert_eq!(&encoded[..6], &data);
        assert_eq!(encoded[6], 0x01 ^ 0x03 ^ 0x80);
        assert_eq!(encoded[7], (1 + 2 * 2 + 6) as u8);
        assert_eq!(&encoded[8..], &[0; 24]);
    }

    #[test]
    fn three_quarters_rejects_oversized_data() {
        assert!(matches!(
            encode_three_quarters(&[0; 25]),
            Err(Error::DataTooLarge { len: 25, max: 24, .. })
        ));
    }

    #[test]
    fn three_quarters_decodes_payload() {
        let data = (0..24).collect::<Vec<u8>>();
        let encoded = encode_three_quarters(&data).unwrap();

        assert_eq!(decode_three_quarters(&encoded).to_vec(), data);
    }
}
