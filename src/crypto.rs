//! Payload decryption for P4K entries
//!
//! Encrypted P4K entries use AES-128-CBC with a zero IV and a single key shared by every
//! CryEngine title that ships P4K archives. Ciphertext is always a whole number of blocks;
//! the plaintext is zero padded and callers trim it to the entry's declared size.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

use crate::error::{Error, Result};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// The public CryEngine P4K key
pub const P4K_KEY: [u8; 16] = [
    0x5E, 0x7A, 0x20, 0x02, 0x30, 0x2E, 0xEB, 0x1A,
    0x3B, 0xB6, 0x17, 0xC3, 0x0F, 0xDE, 0x1E, 0x47,
];

/// IV used for every entry
pub const P4K_IV: [u8; 16] = [0u8; 16];

/// AES block size
pub const BLOCK_SIZE: usize = 16;

/// Decrypt `data` and return the plaintext, padding included
///
/// # Arguments
/// * `data` - The encrypted payload (must be a multiple of 16 bytes)
pub fn decrypt_aes_cbc(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    if data.len() % BLOCK_SIZE != 0 {
        return Err(Error::Decryption(format!(
            "Data length {} is not a multiple of {}",
            data.len(),
            BLOCK_SIZE
        )));
    }

    let cipher = Aes128CbcDec::new(&P4K_KEY.into(), &P4K_IV.into());

    let mut buffer = data.to_vec();
    let len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| Error::Decryption(format!("AES decryption failed: {:?}", e)))?
        .len();
    buffer.truncate(len);

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    fn encrypt(plain: &[u8]) -> Vec<u8> {
        let mut buffer = plain.to_vec();
        let len = buffer.len();
        Aes128CbcEnc::new(&P4K_KEY.into(), &P4K_IV.into())
            .encrypt_padded_mut::<NoPadding>(&mut buffer, len)
            .unwrap();
        buffer
    }

    #[test]
    fn test_decrypt_round_trip_keeps_trailing_zeros() {
        let plain = [0u8; 32];
        let cipher = encrypt(&plain);
        assert_ne!(cipher, plain);
        assert_eq!(decrypt_aes_cbc(&cipher).unwrap(), plain);
    }

    #[test]
    fn test_rejects_partial_block() {
        assert!(matches!(
            decrypt_aes_cbc(&[1, 2, 3]),
            Err(Error::Decryption(_))
        ));
        assert!(decrypt_aes_cbc(&[]).unwrap().is_empty());
    }
}
