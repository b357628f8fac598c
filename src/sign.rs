// sign.rs - Ed25519 signing key handling for the CLI
//
// Keys are stored as base64 of the 32-byte seed. Decoded seed bytes are
// zeroized once the SigningKey has been built.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use ed25519_dalek::SigningKey;
use std::path::Path;
use zeroize::Zeroizing;

/// Environment variable holding the base64 signing key.
pub const SECRET_KEY_ENV: &str = "JARSIG_ED25519_SK_B64";

/// Generate a new Ed25519 keypair. Returns (secret_key_b64, public_key_b64).
pub fn keygen() -> (Zeroizing<String>, String) {
    let mut csprng = rand::rngs::OsRng;
    let signing_key = SigningKey::generate(&mut csprng);
    let verifying_key = signing_key.verifying_key();
    (
        Zeroizing::new(B64.encode(signing_key.to_bytes())),
        B64.encode(verifying_key.to_bytes()),
    )
}

/// Build a signing key from its base64 seed.
pub fn signing_key_from_b64(secret_key_b64: &str) -> Result<SigningKey> {
    let sk_bytes = Zeroizing::new(
        B64.decode(secret_key_b64.trim())
            .context("decoding secret key base64")?,
    );
    let sk_array: Zeroizing<[u8; 32]> = Zeroizing::new(
        sk_bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("secret key must be 32 bytes"))?,
    );
    Ok(SigningKey::from_bytes(&sk_array))
}

/// Load a secret key from either the environment variable or a keyfile path.
pub fn load_secret_key(keyfile: Option<&Path>) -> Result<SigningKey> {
    if let Ok(key) = std::env::var(SECRET_KEY_ENV) {
        let key = Zeroizing::new(key);
        if !key.is_empty() {
            return signing_key_from_b64(&key).context(SECRET_KEY_ENV);
        }
    }

    if let Some(path) = keyfile {
        let contents = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("reading keyfile {}", path.display()))?,
        );
        return signing_key_from_b64(&contents)
            .with_context(|| format!("keyfile {}", path.display()));
    }

    bail!(
        "No signing key found. Set {SECRET_KEY_ENV} env var \
         or pass --keyfile <path>"
    );
}

/// Public key (base64) of a signing key.
pub fn public_key_b64(key: &SigningKey) -> String {
    B64.encode(key.verifying_key().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keygen_round_trips_through_b64() {
        let (sk, pk) = keygen();
        let key = signing_key_from_b64(&sk).unwrap();
        assert_eq!(public_key_b64(&key), pk);
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(signing_key_from_b64("not base64!").is_err());
        assert!(signing_key_from_b64(&B64.encode([1u8; 16])).is_err());
    }

    #[test]
    fn loads_keyfile_with_trailing_newline() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("jarsig.sk");
        let (sk, pk) = keygen();
        std::fs::write(&path, format!("{}\n", sk.as_str())).unwrap();
        // the env var takes precedence when set, so only check the keyfile
        // path when it is absent
        if std::env::var(SECRET_KEY_ENV).is_err() {
            let key = load_secret_key(Some(&path)).unwrap();
            assert_eq!(public_key_b64(&key), pk);
        }
    }
}
