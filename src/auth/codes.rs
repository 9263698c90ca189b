//! Access-code generation.
//!
//! Master codes (`XXXX-XXXX`, 36^8 keyspace) grant psychologist registration;
//! patient codes (`XXX-XXX`, 36^6) link a patient to the issuing psychologist.
//! Collisions are handled at the insert site by retrying on the unique
//! violation rather than pre-checking, so there is no check-then-insert race.

use rand::Rng;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generation attempts before giving up. With the keyspaces above this only
/// trips when the store itself misbehaves.
pub const MAX_GENERATION_ATTEMPTS: u32 = 20;

fn block(rng: &mut impl Rng, len: usize) -> String {
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// One-time code granting psychologist registration, format `XXXX-XXXX`.
pub fn generate_master_code(rng: &mut impl Rng) -> String {
    format!("{}-{}", block(rng, 4), block(rng, 4))
}

/// One-time code linking a patient to a psychologist, format `XXX-XXX`.
pub fn generate_patient_code(rng: &mut impl Rng) -> String {
    format!("{}-{}", block(rng, 3), block(rng, 3))
}
