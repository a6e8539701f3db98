use ed25519_dalek::{self, Verifier, Signer};
use rand::rngs::OsRng;
use serde::{Serialize, Deserialize};

pub type PublicKey = ed25519_dalek::PublicKey;
pub type Signature = ed25519_dalek::Signature;

// canonical key identity: the public-key bytes, never object identity
pub type KeyId = [u8; 32];

#[derive(Debug, Serialize, Deserialize)]
pub struct Keypair {
    pub kp: ed25519_dalek::Keypair,
}

impl Keypair {
    pub fn gen() -> Self {
        let mut csprng = OsRng {};
        Self { kp: ed25519_dalek::Keypair::generate(&mut csprng) }
    }

    pub fn id(&self) -> KeyId {
        self.kp.public.to_bytes()
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.kp.sign(msg)
    }
}

pub fn verify(id: &KeyId, msg: &[u8], sig: &Signature) -> bool {
    match PublicKey::from_bytes(id) {
        Ok(pk) => pk.verify(msg, sig).is_ok(),
        Err(_) => false,
    }
}

// index 0 is the node's default key; own blocks carry an index into `keys`
#[derive(Debug)]
pub struct Wallet {
    pub keys: Vec<Keypair>,
}

impl Wallet {
    pub fn gen(extra: usize) -> Self {
        let keys = (0..=extra).map(|_| Keypair::gen()).collect();
        Self { keys }
    }

    pub fn def_key(&self) -> &Keypair {
        &self.keys[0]
    }

    pub fn def_id(&self) -> KeyId {
        self.def_key().id()
    }

    pub fn key(&self, index: usize) -> Option<&Keypair> {
        self.keys.get(index)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn sign_verify() {
        let kp = Keypair::gen();
        let sig = kp.sign(b"message");
        assert!(verify(&kp.id(), b"message", &sig));
        assert!(!verify(&kp.id(), b"other", &sig));
    }

    #[test]
    fn deterministic_sign() {
        let kp = Keypair::gen();
        assert_eq!(kp.sign(b"message"), kp.sign(b"message"));
    }

    #[test]
    fn wallet_default() {
        let wallet = Wallet::gen(3);
        assert_eq!(wallet.keys.len(), 4);
        assert_eq!(wallet.def_id(), wallet.keys[0].id());
        assert!(wallet.key(4).is_none());
    }
}
