use super::cesr;
use crate::interfaces::Hasher;

/// Blake3-256 digests in `E`-coded text.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn sum(&self, message: &[u8]) -> String {
        cesr::encode(cesr::BLAKE3_256, blake3::hash(message).as_bytes())
    }
}
