use super::cesr;
use crate::{
    error::{Error, Result},
    interfaces::Noncer,
};
use rand::{RngCore, rngs::OsRng};

/// 128-bit nonces from the operating system RNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsNoncer;

impl Noncer for OsNoncer {
    fn generate_128(&self) -> Result<String> {
        let mut raw = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut raw)
            .map_err(|err| Error::collaborator("noncer", err, true))?;
        Ok(cesr::encode(cesr::SALT_128, &raw))
    }
}
