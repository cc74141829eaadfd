//! Integration tests for the ChronoVault crypto module.

use chronovault::crypto::kdf::Argon2Params;
use chronovault::crypto::keys::MasterKey;
use chronovault::crypto::{decrypt, derive_key, encrypt, generate_salt, DecryptingStream, EncryptingStream};
use chronovault::errors::ChronoVaultError;

// ---------------------------------------------------------------------------
// AEAD with detached tags
// ---------------------------------------------------------------------------

#[test]
fn encrypt_decrypt_roundtrip_with_aad() {
    let key = [0xABu8; 32];
    let sealed = encrypt(&key, b"id\0report.pdf", b"quarterly numbers").expect("encrypt");

    assert_eq!(sealed.nonce.len(), 12);
    assert_eq!(sealed.tag.len(), 16);
    assert_eq!(sealed.ciphertext.len(), b"quarterly numbers".len());

    let plain = decrypt(&key, b"id\0report.pdf", &sealed).expect("decrypt");
    assert_eq!(plain, b"quarterly numbers");
}

#[test]
fn same_plaintext_encrypts_differently_each_time() {
    let key = [0xCDu8; 32];
    let a = encrypt(&key, b"", b"hello").unwrap();
    let b = encrypt(&key, b"", b"hello").unwrap();
    assert_ne!(a.nonce, b.nonce);
    assert_ne!(a.ciphertext, b.ciphertext);
}

#[test]
fn flipped_tag_bit_fails_to_decrypt() {
    let key = [1u8; 32];
    let mut sealed = encrypt(&key, b"aad", b"payload").unwrap();
    sealed.tag[0] ^= 0x01;

    let err = decrypt(&key, b"aad", &sealed).unwrap_err();
    assert!(matches!(err, ChronoVaultError::DecryptionFailed));
}

#[test]
fn renamed_record_fails_to_decrypt() {
    let key = [2u8; 32];
    let sealed = encrypt(&key, b"id\0a.txt", b"payload").unwrap();
    assert!(decrypt(&key, b"id\0b.txt", &sealed).is_err());
}

// ---------------------------------------------------------------------------
// Password-based key derivation
// ---------------------------------------------------------------------------

#[test]
fn derive_key_is_deterministic_per_salt() {
    let params = Argon2Params::minimum();
    let salt = generate_salt();

    let a = derive_key(b"Secret123", &salt, &params).unwrap();
    let b = derive_key(b"Secret123", &salt, &params).unwrap();
    let c = derive_key(b"Secret123", &generate_salt(), &params).unwrap();

    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn weak_params_are_rejected() {
    let params = Argon2Params {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    };
    assert!(derive_key(b"pw", &generate_salt(), &params).is_err());
}

#[test]
fn verifier_only_matches_the_same_password() {
    let params = Argon2Params::minimum();
    let salt = generate_salt();
    let right = MasterKey::new(derive_key(b"Secret123", &salt, &params).unwrap());
    let wrong = MasterKey::new(derive_key(b"Secret124", &salt, &params).unwrap());

    let stored = right.password_verifier().unwrap();
    assert!(right.verify(&stored).unwrap());
    assert!(!wrong.verify(&stored).unwrap());
}

#[test]
fn file_key_is_bound_to_the_unlock_time() {
    let key = MasterKey::new([9u8; 32]);
    let early = key.file_key(b"abc", 1_700_000_000).unwrap();
    let late = key.file_key(b"abc", 1_700_003_600).unwrap();
    assert_ne!(*early, *late);
}

// ---------------------------------------------------------------------------
// Streaming file encryption
// ---------------------------------------------------------------------------

#[test]
fn multi_chunk_stream_roundtrip() {
    let key = [3u8; 32];
    let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

    let mut blob = Vec::new();
    let written = EncryptingStream::new(&key)
        .with_chunk_size(1024)
        .encrypt_stream(&data[..], &mut blob)
        .unwrap();
    assert_eq!(written, data.len() as u64);

    let mut out = Vec::new();
    let read = DecryptingStream::new(&key).decrypt_stream(&blob[..], &mut out).unwrap();
    assert_eq!(read, data.len() as u64);
    assert_eq!(out, data);
}

#[test]
fn empty_file_stream_roundtrip() {
    let key = [4u8; 32];
    let mut blob = Vec::new();
    EncryptingStream::new(&key).encrypt_stream(&b""[..], &mut blob).unwrap();

    let mut out = Vec::new();
    DecryptingStream::new(&key).decrypt_stream(&blob[..], &mut out).unwrap();
    assert!(out.is_empty());
}

#[test]
fn truncated_stream_is_rejected() {
    let key = [5u8; 32];
    let data = vec![7u8; 5000];
    let mut blob = Vec::new();
    EncryptingStream::new(&key)
        .with_chunk_size(1024)
        .encrypt_stream(&data[..], &mut blob)
        .unwrap();

    // Drop the final chunk: length prefix, ciphertext and tag.
    let final_chunk = 4 + (5000 - 4 * 1024) + 16;
    blob.truncate(blob.len() - final_chunk);

    let mut out = Vec::new();
    assert!(DecryptingStream::new(&key).decrypt_stream(&blob[..], &mut out).is_err());
}

#[test]
fn stream_with_wrong_key_is_rejected() {
    let mut blob = Vec::new();
    EncryptingStream::new(&[6u8; 32]).encrypt_stream(&b"secret"[..], &mut blob).unwrap();

    let mut out = Vec::new();
    assert!(DecryptingStream::new(&[7u8; 32]).decrypt_stream(&blob[..], &mut out).is_err());
}
