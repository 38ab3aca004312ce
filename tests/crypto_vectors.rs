//! Fixed vectors for the key schedule and the counter-mode keystream.

use assetport::crypto::{self, derive_key, CipherOptions, Keystream};

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
        .collect()
}

const GOLDEN_PLAIN: &[u8] = b"UnityFS\x00\x00\x00\x00\x06golden bundle payload 0123456789";
const GOLDEN_CIPHER: &str =
    "55f0bfbd50d913b5f57bd58c2dd4cc2d3a656386d590e9d95e658de6b6eb7a21b35f044de8bd09919c532f66";

#[test]
fn derive_default_parameters() {
    let key = derive_key("password", b"salt", 32, 100).unwrap();
    assert_eq!(
        hex(&key),
        "8333f080d0f0bf68768fbcb8b81fccbdb745ec6c24a6f3c4eecbd145b132076b"
    );
}

#[test]
fn derive_minimum_iterations() {
    let key = derive_key("password", b"salt", 16, 2).unwrap();
    assert_eq!(hex(&key), "47e97e39e2b32b15eb9278e53f7bfca5");
}

#[test]
fn derive_extends_past_one_digest() {
    let key = derive_key("hunter2", &[1, 2, 3, 4], 64, 5).unwrap();
    assert_eq!(
        hex(&key),
        "a746a0c4f9b6907ded3b9f632a8cbca8ae0472e32821b468d1aae3e9c9c79399\
         b0df9a1fe2c670039b8820d96a975848c814051906b8ef27166e1e6751aacf9a"
    );
}

#[test]
fn decrypt_golden_bundle() {
    let ciphertext = unhex(GOLDEN_CIPHER);
    assert!(!crypto::is_plain_bundle(&ciphertext));

    let plain = crypto::decrypt(&ciphertext, "password", b"salt", CipherOptions::default()).unwrap();
    assert_eq!(plain, GOLDEN_PLAIN);
    assert!(crypto::is_plain_bundle(&plain));

    let again = crypto::encrypt(&plain, "password", b"salt", CipherOptions::default()).unwrap();
    assert_eq!(hex(&again), GOLDEN_CIPHER);
}

#[test]
fn aes128_short_message() {
    let options = CipherOptions {
        key_length: 16,
        iterations: 3,
    };
    let out = crypto::encrypt(b"hello world", "k", b"s", options).unwrap();
    assert_eq!(hex(&out), "017bf5a9b1ed958e9f9a41");
}

#[test]
fn keystream_can_start_mid_stream() {
    let ciphertext = unhex(GOLDEN_CIPHER);
    let keystream = Keystream::new("password", b"salt", CipherOptions::default()).unwrap();

    // Bytes 16.. start at block 1.
    let mut tail = ciphertext[16..].to_vec();
    keystream.apply(&mut tail, 1);
    assert_eq!(tail, &GOLDEN_PLAIN[16..]);
}

#[test]
fn parallel_and_sequential_agree_on_large_input() {
    use rand::RngCore;

    let mut data = vec![0u8; 300 * 1024 + 7];
    rand::thread_rng().fill_bytes(&mut data);
    let keystream = Keystream::new("pw", b"salt", CipherOptions::default()).unwrap();

    let mut sequential = data.clone();
    keystream.apply(&mut sequential, 0);
    let mut parallel = data.clone();
    keystream.apply_parallel(&mut parallel);
    assert_eq!(sequential, parallel);

    keystream.apply_parallel(&mut parallel);
    assert_eq!(parallel, data);
}

#[test]
fn invalid_parameters() {
    assert!(derive_key("pw", b"salt", 32, 1).is_err());
    let odd = CipherOptions {
        key_length: 20,
        iterations: 10,
    };
    assert!(crypto::decrypt(b"data", "pw", b"salt", odd).is_err());
}
