//! Traditional Unix `crypt(3)` password hashing (DES-based).
//!
//! PostgreSQL's oldest authentication method (`areq == 4`) asks the frontend
//! to hash the password with the same algorithm as the C library `crypt()`
//! function, salted with two bytes sent by the backend. There is no crate in
//! this workspace's stack for the salt-modified DES Feistel network that
//! algorithm requires, so it is implemented directly from the classic
//! tables (Morris & Thompson, "Password Security: A Case History").

const IP: [u8; 64] = [
    58, 50, 42, 34, 26, 18, 10, 2, 60, 52, 44, 36, 28, 20, 12, 4,
    62, 54, 46, 38, 30, 22, 14, 6, 64, 56, 48, 40, 32, 24, 16, 8,
    57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3,
    61, 53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
];

const FP: [u8; 64] = [
    40, 8, 48, 16, 56, 24, 64, 32, 39, 7, 47, 15, 55, 23, 63, 31,
    38, 6, 46, 14, 54, 22, 62, 30, 37, 5, 45, 13, 53, 21, 61, 29,
    36, 4, 44, 12, 52, 20, 60, 28, 35, 3, 43, 11, 51, 19, 59, 27,
    34, 2, 42, 10, 50, 18, 58, 26, 33, 1, 41, 9, 49, 17, 57, 25,
];

const PC1: [u8; 56] = [
    57, 49, 41, 33, 25, 17, 9, 1, 58, 50, 42, 34, 26, 18,
    10, 2, 59, 51, 43, 35, 27, 19, 11, 3, 60, 52, 44, 36,
    63, 55, 47, 39, 31, 23, 15, 7, 62, 54, 46, 38, 30, 22,
    14, 6, 61, 53, 45, 37, 29, 21, 13, 5, 28, 20, 12, 4,
];

const PC2: [u8; 48] = [
    14, 17, 11, 24, 1, 5, 3, 28, 15, 6, 21, 10,
    23, 19, 12, 4, 26, 8, 16, 7, 27, 20, 13, 2,
    41, 52, 31, 37, 47, 55, 30, 40, 51, 45, 33, 48,
    44, 49, 39, 56, 34, 53, 46, 42, 50, 36, 29, 32,
];

const SHIFTS: [u8; 16] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

/// Expansion table. `crypt`'s salt swaps pairs `(i, i+24)` of this table's output bits.
const E: [u8; 48] = [
    32, 1, 2, 3, 4, 5, 4, 5, 6, 7, 8, 9,
    8, 9, 10, 11, 12, 13, 12, 13, 14, 15, 16, 17,
    16, 17, 18, 19, 20, 21, 20, 21, 22, 23, 24, 25,
    24, 25, 26, 27, 28, 29, 28, 29, 30, 31, 32, 1,
];

const P: [u8; 32] = [
    16, 7, 20, 21, 29, 12, 28, 17, 1, 15, 23, 26, 5, 18, 31, 10,
    2, 8, 24, 14, 32, 27, 3, 9, 19, 13, 30, 6, 22, 11, 4, 25,
];

#[rustfmt::skip]
const S: [[u8; 64]; 8] = [
    [
        14,4,13,1,2,15,11,8,3,10,6,12,5,9,0,7,
        0,15,7,4,14,2,13,1,10,6,12,11,9,5,3,8,
        4,1,14,8,13,6,2,11,15,12,9,7,3,10,5,0,
        15,12,8,2,4,9,1,7,5,11,3,14,10,0,6,13,
    ],
    [
        15,1,8,14,6,11,3,4,9,7,2,13,12,0,5,10,
        3,13,4,7,15,2,8,14,12,0,1,10,6,9,11,5,
        0,14,7,11,10,4,13,1,5,8,12,6,9,3,2,15,
        13,8,10,1,3,15,4,2,11,6,7,12,0,5,14,9,
    ],
    [
        10,0,9,14,6,3,15,5,1,13,12,7,11,4,2,8,
        13,7,0,9,3,4,6,10,2,8,5,14,12,11,15,1,
        13,6,4,9,8,15,3,0,11,1,2,12,5,10,14,7,
        1,10,13,0,6,9,8,7,4,15,14,3,11,5,2,12,
    ],
    [
        7,13,14,3,0,6,9,10,1,2,8,5,11,12,4,15,
        13,8,11,5,6,15,0,3,4,7,2,12,1,10,14,9,
        10,6,9,0,12,11,7,13,15,1,3,14,5,2,8,4,
        3,15,0,6,10,1,13,8,9,4,5,11,12,7,2,14,
    ],
    [
        2,12,4,1,7,10,11,6,8,5,3,15,13,0,14,9,
        14,11,2,12,4,7,13,1,5,0,15,10,3,9,8,6,
        4,2,1,11,10,13,7,8,15,9,12,5,6,3,0,14,
        11,8,12,7,1,14,2,13,6,15,0,9,10,4,5,3,
    ],
    [
        12,1,10,15,9,2,6,8,0,13,3,4,14,7,5,11,
        10,15,4,2,7,12,9,5,6,1,13,14,0,11,3,8,
        9,14,15,5,2,8,12,3,7,0,4,10,1,13,11,6,
        4,3,2,12,9,5,15,10,11,14,1,7,6,0,8,13,
    ],
    [
        4,11,2,14,15,0,8,13,3,12,9,7,5,10,6,1,
        13,0,11,7,4,9,1,10,14,3,5,12,2,15,8,6,
        1,4,11,13,12,3,7,14,10,15,6,8,0,5,9,2,
        6,11,13,8,1,4,10,7,9,5,0,15,14,2,3,12,
    ],
    [
        13,2,8,4,6,15,11,1,10,9,3,14,5,0,12,7,
        1,15,13,8,10,3,7,4,12,5,6,11,0,14,9,2,
        7,11,4,1,9,12,14,2,0,6,10,13,15,3,5,8,
        2,1,14,7,4,10,8,13,15,12,9,0,3,5,6,11,
    ],
];

type Bits = Vec<u8>;

fn bytes_to_bits(bytes: &[u8; 8]) -> Bits {
    let mut bits = Vec::with_capacity(64);
    for &b in bytes {
        for i in (0..8).rev() {
            bits.push((b >> i) & 1);
        }
    }
    bits
}

fn permute(input: &[u8], table: &[u8]) -> Bits {
    table.iter().map(|&i| input[i as usize - 1]).collect()
}

/// 16 round keys of 48 bits each, derived from the password-derived 64-bit key.
fn key_schedule(key: &[u8; 8]) -> [Bits; 16] {
    let key_bits = bytes_to_bits(key);
    let permuted = permute(&key_bits, &PC1);
    let (c, d) = permuted.split_at(28);
    let (mut c, mut d) = (c.to_vec(), d.to_vec());

    std::array::from_fn(|round| {
        let shift = SHIFTS[round] as usize;
        c.rotate_left(shift);
        d.rotate_left(shift);
        let cd: Bits = c.iter().chain(d.iter()).copied().collect();
        permute(&cd, &PC2)
    })
}

fn feistel(half: &[u8], subkey: &[u8], salt_bits: &[bool; 12]) -> Bits {
    let mut expanded = permute(half, &E);
    for (i, &swap) in salt_bits.iter().enumerate() {
        if swap {
            expanded.swap(i, i + 24);
        }
    }
    let xored: Bits = expanded.iter().zip(subkey).map(|(a, b)| a ^ b).collect();

    let mut sbox_out = Vec::with_capacity(32);
    for (i, chunk) in xored.chunks(6).enumerate() {
        let row = (chunk[0] << 1 | chunk[5]) as usize;
        let col = (chunk[1] << 3 | chunk[2] << 2 | chunk[3] << 1 | chunk[4]) as usize;
        let val = S[i][row * 16 + col];
        for b in (0..4).rev() {
            sbox_out.push((val >> b) & 1);
        }
    }
    permute(&sbox_out, &P)
}

fn des_encrypt_block(block: &[u8; 8], subkeys: &[Bits; 16], salt_bits: &[bool; 12]) -> [u8; 8] {
    let bits = bytes_to_bits(block);
    let permuted = permute(&bits, &IP);
    let (mut l, mut r) = (permuted[..32].to_vec(), permuted[32..].to_vec());

    for subkey in subkeys {
        let f = feistel(&r, subkey, salt_bits);
        let new_r: Bits = l.iter().zip(f.iter()).map(|(a, b)| a ^ b).collect();
        l = r;
        r = new_r;
    }

    let combined: Bits = r.iter().chain(l.iter()).copied().collect();
    let out_bits = permute(&combined, &FP);

    let mut out = [0u8; 8];
    for (i, chunk) in out_bits.chunks(8).enumerate() {
        let mut byte = 0u8;
        for &b in chunk {
            byte = (byte << 1) | b;
        }
        out[i] = byte;
    }
    out
}

const CRYPT_ALPHABET: &[u8; 64] =
    b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn salt_value(c: u8) -> u8 {
    CRYPT_ALPHABET.iter().position(|&a| a == c).map_or(0, |i| i as u8)
}

fn salt_bits_from(salt: [u8; 2]) -> [bool; 12] {
    let combined = ((salt_value(salt[0]) as u16) | ((salt_value(salt[1]) as u16) << 6)) & 0xFFF;
    std::array::from_fn(|i| (combined >> i) & 1 == 1)
}

/// Derive the 64-bit DES key from up to the first 8 password bytes: each
/// byte contributes its low 7 bits, left-shifted by one (the dropped bit is
/// the unused DES parity slot that the key schedule's `PC1` never reads).
fn key_from_password(password: &[u8]) -> [u8; 8] {
    let mut key = [0u8; 8];
    for (i, slot) in key.iter_mut().enumerate() {
        let c = password.get(i).copied().unwrap_or(0);
        *slot = (c & 0x7f) << 1;
    }
    key
}

/// Classic Unix `crypt(3)`: 25 cascaded DES encryptions of an all-zero block,
/// with the salt swapping pairs of `E`-table output bits on every round.
///
/// Returns the 11-character hash body (without the leading 2-character salt).
pub fn crypt(password: &[u8], salt: [u8; 2]) -> String {
    let key = key_from_password(password);
    let subkeys = key_schedule(&key);
    let salt_bits = salt_bits_from(salt);

    let mut block = [0u8; 8];
    for _ in 0..25 {
        block = des_encrypt_block(&block, &subkeys, &salt_bits);
    }

    // Pack the 64-bit result into 11 base64-like crypt characters (6 bits each,
    // with the final (66th) bit implicitly zero).
    let mut bits = Vec::with_capacity(66);
    bits.extend(bytes_to_bits(&block));
    bits.push(0);
    bits.push(0);

    let mut out = String::with_capacity(11);
    for chunk in bits.chunks(6).take(11) {
        let mut v = 0u8;
        for &b in chunk {
            v = (v << 1) | b;
        }
        out.push(CRYPT_ALPHABET[v as usize] as char);
    }
    out
}
