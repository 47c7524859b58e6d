use alloy::signers::local::PrivateKeySigner;
use rand::Rng;
use std::fmt;

/// Freshly generated custodial wallet
pub struct GeneratedWallet {
    pub address: String,
    pub private_key: String,
}

impl fmt::Debug for GeneratedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedWallet")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

pub fn generate_wallet() -> GeneratedWallet {
    let signer = PrivateKeySigner::random();
    GeneratedWallet {
        address: signer.address().to_checksum(None),
        private_key: format!("0x{}", hex::encode(signer.to_bytes())),
    }
}

/// Two uppercase letters, a dash and four digits, e.g. `XY-8765`
pub fn generate_access_key() -> String {
    let mut rng = rand::rng();
    let letters: String = (0..2)
        .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
        .collect();
    let digits: u16 = rng.random_range(0..10_000);
    format!("{}-{:04}", letters, digits)
}

pub fn is_access_key(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    bytes.len() == 7
        && bytes[..2].iter().all(|b| b.is_ascii_uppercase())
        && bytes[2] == b'-'
        && bytes[3..].iter().all(|b| b.is_ascii_digit())
}
