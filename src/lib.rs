//! Keyseal - random-key authenticated file encryption
//!
//! Every encryption mints a fresh 32-byte key and seals the data with
//! XChaCha20-Poly1305. The sealed message and the key are returned (or
//! written) separately; both are needed to recover the plaintext.
//!
//! ```no_run
//! let (sealed, key) = keyseal::encrypt(b"attack at dawn")?;
//! let plaintext = keyseal::decrypt(&sealed, &key)?;
//! assert_eq!(&plaintext[..], b"attack at dawn");
//! # Ok::<(), keyseal::error::KeysealError>(())
//! ```

#![forbid(unsafe_code)]

pub mod error;
pub mod file_ops;
pub mod keys;
pub mod sealcrypt;
pub mod varmor;
pub mod worker;

use zeroize::Zeroizing;

use crate::error::Result;
use crate::keys::Key;

/// Seal `plaintext` under a newly generated key.
pub fn encrypt(plaintext: &[u8]) -> Result<(Vec<u8>, Key)> {
    let key = Key::generate()?;
    let sealed = sealcrypt::seal(&key, plaintext)?;
    Ok((sealed, key))
}

/// Open a sealed message with the given key.
pub fn decrypt(sealed: &[u8], key: &Key) -> Result<Zeroizing<Vec<u8>>> {
    sealcrypt::open(key, sealed).map(Zeroizing::new)
}
