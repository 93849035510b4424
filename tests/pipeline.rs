//! End-to-end checks against responses computed the way an NTLMv1 client computes them.


use cipher::{BlockEncrypt, KeyInit};
use cipher::generic_array::GenericArray;
use des::Des;
use digest::Digest;
use md4::Md4;
use md5::Md5;
use rand::Rng;
use rand::rngs::OsRng;

use ntlmv1_challenge::deskey::{assemble_nt_hash, nt_segment_to_des_key};
use ntlmv1_challenge::{ParsedChallenge, is_ess_response};


fn nt_hash(password: &str) -> [u8; 16] {
    let password_bytes: Vec<u8> = password.encode_utf16()
        .flat_map(|p| p.to_le_bytes())
        .collect();
    let mut md4 = <Md4 as Digest>::new();
    md4.update(&password_bytes);
    md4.finalize().as_slice().try_into().unwrap()
}

fn des_encrypt(key: [u8; 8], data: [u8; 8]) -> [u8; 8] {
    let des = Des::new_from_slice(&key).unwrap();
    let mut block = GenericArray::clone_from_slice(&data);
    des.encrypt_block(&mut block);
    block.as_slice().try_into().unwrap()
}

fn nt_keys(nt_hash: [u8; 16]) -> [[u8; 8]; 3] {
    let mut third = [0u8; 7];
    third[0..2].copy_from_slice(&nt_hash[14..16]);
    [
        nt_segment_to_des_key(nt_hash[0..7].try_into().unwrap()),
        nt_segment_to_des_key(nt_hash[7..14].try_into().unwrap()),
        nt_segment_to_des_key(third),
    ]
}

/// DES-encrypts the challenge three times, keyed with the NT hash.
fn desl(nt_hash: [u8; 16], challenge: [u8; 8]) -> [u8; 24] {
    let mut response = [0u8; 24];
    for (chunk, key) in response.chunks_exact_mut(8).zip(nt_keys(nt_hash)) {
        chunk.copy_from_slice(&des_encrypt(key, challenge));
    }
    response
}


#[test]
fn known_password_hash() {
    assert_eq!(hex::encode(nt_hash("password")), "8846f7eaee8fb117ad06bdd830b7586c");
}

#[test]
fn ess_capture_decrypts_under_effective_challenge() {
    let hash = nt_hash("password");
    let server_challenge = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
    let mut client_challenge = [0u8; 8];
    OsRng.fill(&mut client_challenge);

    let expected_challenge: [u8; 8] = {
        let mut md5 = <Md5 as Digest>::new();
        md5.update(server_challenge);
        md5.update(client_challenge);
        md5.finalize().as_slice()[0..8].try_into().unwrap()
    };
    let nt_response = desl(hash, expected_challenge);

    let mut lm_response = [0u8; 24];
    lm_response[0..8].copy_from_slice(&client_challenge);

    let capture = format!(
        "victim::LAB:{}:{}:{}",
        hex::encode_upper(lm_response), hex::encode_upper(nt_response), hex::encode(server_challenge),
    );
    let parsed = ParsedChallenge::parse(&capture).unwrap();

    assert!(parsed.ess_negotiated());
    assert_eq!(parsed.client_challenge(), Some(hex::encode_upper(client_challenge).as_str()));
    assert_eq!(parsed.effective_challenge(), hex::encode(expected_challenge));

    // a cracker that finds these keys has found the hash
    let keys = nt_keys(hash);
    let challenge: [u8; 8] = hex::decode(parsed.effective_challenge()).unwrap().try_into().unwrap();
    for (ciphertext, key) in parsed.ciphertexts().iter().zip(keys) {
        assert_eq!(hex::encode_upper(des_encrypt(key, challenge)), *ciphertext);
    }

    let tail: [u8; 2] = hash[14..16].try_into().unwrap();
    assert_eq!(assemble_nt_hash(keys[0], keys[1], tail), hash);
}

#[test]
fn non_ess_capture_uses_server_challenge() {
    let hash = nt_hash("Summer2024!");
    let server_challenge = [0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02, 0x03, 0x04];
    let nt_response = desl(hash, server_challenge);

    // clients without an LM hash send the NT response twice
    let capture = format!(
        "svc_backup:WS01:LAB:{}:{}:{}",
        hex::encode(nt_response), hex::encode(nt_response), hex::encode(server_challenge),
    );
    let parsed = ParsedChallenge::parse(&capture).unwrap();

    assert!(!parsed.ess_negotiated());
    assert_eq!(parsed.effective_challenge(), "deadbeef01020304");
    assert_eq!(parsed.ciphertexts()[0], hex::encode(&nt_response[0..8]));
}

#[test]
fn random_well_formed_captures_always_parse() {
    let mut rng = OsRng;
    for round in 0..64 {
        let mut lm = [0u8; 24];
        let mut nt = [0u8; 24];
        let mut server = [0u8; 8];
        rng.fill(&mut lm);
        rng.fill(&mut nt);
        rng.fill(&mut server);
        if round % 2 == 0 {
            lm[10..].fill(0);
        }

        let lm_hex = hex::encode_upper(lm);
        let capture = format!("user::DOMAIN:{}:{}:{}", lm_hex, hex::encode_upper(nt), hex::encode_upper(server));
        let parsed = ParsedChallenge::parse(&capture).unwrap();

        assert_eq!(parsed.effective_challenge().len(), 16);
        assert_eq!(parsed.ess_negotiated(), is_ess_response(&lm_hex));
        assert_eq!(parsed.ess_negotiated(), lm_hex[20..].chars().all(|c| c == '0'));
        if !parsed.ess_negotiated() {
            assert_eq!(parsed.effective_challenge(), parsed.server_challenge());
        }
        assert_eq!(ParsedChallenge::parse(&capture).unwrap(), parsed);
    }
}
