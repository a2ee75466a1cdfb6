// Identifier Mint: session codes, participant ids, and resume tokens.
//
// The alphabet omits 0/O/1/I/L so codes read back unambiguously over voice
// or a photographed QR code. Everything is generated uppercase already, so
// round-tripping through `.to_uppercase()` is a no-op for mint output.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};

const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKMNPQRSTUVWXYZ";
const PARTICIPANT_ID_LEN: usize = 3;
const CLIENT_SUFFIX_LEN: usize = 2;
const RESUME_TOKEN_BYTES: usize = 24; // 24 bytes -> 48 hex chars

fn random_alphabet_string(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Generate a session code of the given length. Caller is responsible for
/// retrying on collision with a live session (see `SessionRegistry::create`).
pub fn generate_session_code(length: usize) -> String {
    random_alphabet_string(length)
}

/// Generate a fresh participant id: 3 chars for a host, 3+2 for a client.
pub fn generate_participant_id(is_client: bool) -> String {
    if is_client {
        format!(
            "{}{}",
            random_alphabet_string(PARTICIPANT_ID_LEN),
            random_alphabet_string(CLIENT_SUFFIX_LEN)
        )
    } else {
        random_alphabet_string(PARTICIPANT_ID_LEN)
    }
}

/// Generate a 48-hex-character resume token from a cryptographically strong source.
pub fn generate_resume_token() -> String {
    let mut bytes = [0u8; RESUME_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
