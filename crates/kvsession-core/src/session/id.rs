use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes drawn per identifier.
pub const SESSION_ID_BYTES: usize = 32;

/// Generate a fresh session identifier.
///
/// 32 bytes from the OS CSPRNG, base32 (standard alphabet) without padding:
/// 52 characters of `A-Z2-7`.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes)
}
