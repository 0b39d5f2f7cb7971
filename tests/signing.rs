//! Signature equivalence between the keyed-hash path and the manual
//! RFC 2104 construction.

use ses_transport::signer;

#[test]
fn native_and_fallback_agree_across_key_lengths() {
    let data = b"Tue, 5 April 2011 12:00:00 +0000";
    let keys: &[&[u8]] = &[
        b"",
        b"k",
        b"wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
        &[0u8; 64],
        &[0xFF; 64],
        &[0x5C; 65],
        &[0x36; 200],
    ];

    for key in keys {
        assert_eq!(
            signer::sign(data, key),
            signer::sign_rfc2104(data, key),
            "paths diverged for key of {} bytes",
            key.len()
        );
    }
}

#[test]
fn signature_is_base64_of_a_sha1_digest() {
    let sig = signer::sign(b"some date", b"some key");
    // 20-byte digest encodes to 28 base64 characters with one pad.
    assert_eq!(sig.len(), 28);
    assert!(sig.ends_with('='));
}

#[test]
fn published_vector() {
    assert_eq!(
        signer::sign(b"The quick brown fox jumps over the lazy dog", b"key"),
        "3nybhbi3iqa8ino29wqQcBydtNk="
    );
}
