use docshift::security::{decrypt, open_payload, seal_payload, IV_LEN, SALT_LEN};

#[test]
fn decrypt_of_sealed_payload_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let plain = b"%PDF-1.4 fake body for the round trip";
    let sealed = seal_payload(plain, "correct horse").unwrap();

    let enc_path = dir.path().join("report.pdf.enc");
    std::fs::write(&enc_path, &sealed).unwrap();

    let expected_plain_path = dir.path().join("report.pdf");
    {
        let plaintext = decrypt(&enc_path, Some("correct horse")).unwrap();
        assert_eq!(plaintext.path(), expected_plain_path);
        assert_eq!(std::fs::read(plaintext.path()).unwrap(), plain);
    }
    // The guard wipes the decrypted file on drop, on every exit path.
    assert!(!expected_plain_path.exists());
    // The ciphertext itself is untouched.
    assert!(enc_path.exists());
}

#[test]
fn corrupted_ciphertext_fails_before_any_conversion() {
    let dir = tempfile::tempdir().unwrap();
    let mut sealed = seal_payload(b"sensitive document", "key").unwrap();
    // One flipped bit in the ciphertext must break AEAD authentication.
    sealed[SALT_LEN + IV_LEN + 1] ^= 0x01;

    let enc_path = dir.path().join("doc.pdf.enc");
    std::fs::write(&enc_path, &sealed).unwrap();

    assert!(decrypt(&enc_path, Some("key")).is_err());
    // No partial plaintext may ever be persisted.
    assert!(!dir.path().join("doc.pdf").exists());
}

#[test]
fn wrong_key_is_fatal_not_a_fallback() {
    let sealed = seal_payload(b"body", "right key").unwrap();
    assert!(open_payload(&sealed, "wrong key").is_err());
}

#[test]
fn encrypted_input_without_passphrase_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let enc_path = dir.path().join("doc.pdf.enc");
    std::fs::write(&enc_path, b"whatever").unwrap();
    assert!(decrypt(&enc_path, None).is_err());
}

#[test]
fn plaintext_input_passes_through_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.pdf");
    std::fs::write(&path, b"%PDF-1.4").unwrap();

    {
        let plaintext = decrypt(&path, None).unwrap();
        assert_eq!(plaintext.path(), path);
    }
    // Pass-through inputs are not owned and must survive the guard's drop.
    assert!(path.exists());
}
