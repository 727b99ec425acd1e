use std::fmt;

use arbdeploy_common::utils::keccak;
use ethereum_types::{Address, U256};
use secp256k1::{Message, SECP256K1, SecretKey};

use crate::{
    errors::SignerError,
    transaction::{Eip1559Transaction, SignedTransaction},
};

/// Deployer key held in memory.
#[derive(Clone)]
pub struct LocalSigner {
    secret_key: SecretKey,
    address: Address,
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Derives an Ethereum address from a secp256k1 secret key.
pub fn address_from_secret_key(secret_key: &SecretKey) -> Address {
    let public_key = secret_key.public_key(SECP256K1);
    let hash = keccak(&public_key.serialize_uncompressed()[1..]);
    Address::from_slice(&hash.as_bytes()[12..])
}

impl LocalSigner {
    pub fn new(secret_key: SecretKey) -> Self {
        Self {
            address: address_from_secret_key(&secret_key),
            secret_key,
        }
    }

    pub fn from_hex(raw: &str) -> Result<Self, SignerError> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|_| SignerError::MalformedKey)?;
        if bytes.len() != 32 {
            return Err(SignerError::MalformedKey);
        }
        let secret_key = SecretKey::from_slice(&bytes).map_err(|_| SignerError::InvalidKey)?;
        Ok(Self::new(secret_key))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign_eip1559(&self, tx: &Eip1559Transaction) -> SignedTransaction {
        let message = Message::from_digest(tx.signing_hash().to_fixed_bytes());
        let (recovery_id, signature) = SECP256K1
            .sign_ecdsa_recoverable(&message, &self.secret_key)
            .serialize_compact();

        let r = U256::from_big_endian(&signature[..32]);
        let s = U256::from_big_endian(&signature[32..64]);
        tx.encode_signed(i32::from(recovery_id) != 0, r, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};

    // Well-known development account #0 of Hardhat and Anvil.
    const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn derives_the_dev_account_address() {
        let signer = LocalSigner::from_hex(DEV_KEY).expect("valid key");
        assert_eq!(
            arbdeploy_common::utils::to_checksum(&signer.address()),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
        );
        assert!(!format!("{signer:?}").contains("ac0974"));
    }

    #[test]
    fn rejects_malformed_keys() {
        assert_eq!(LocalSigner::from_hex("0x1234").err(), Some(SignerError::MalformedKey));
        assert_eq!(LocalSigner::from_hex("zz").err(), Some(SignerError::MalformedKey));
        assert_eq!(
            LocalSigner::from_hex(&"00".repeat(32)).err(),
            Some(SignerError::InvalidKey)
        );
    }

    #[test]
    fn signature_recovers_to_the_signer() {
        let signer = LocalSigner::from_hex(DEV_KEY).expect("valid key");
        let tx = Eip1559Transaction {
            chain_id: 31337,
            nonce: 0,
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            max_fee_per_gas: U256::from(2_000_000_000u64),
            gas_limit: 500_000,
            to: None,
            value: U256::zero(),
            data: vec![0x60, 0x80, 0x60, 0x40, 0x52],
        };
        let signed = signer.sign_eip1559(&tx);

        let body = rlp::Rlp::new(&signed.raw[1..]);
        assert_eq!(body.item_count().expect("list"), 12);
        let y_parity: u8 = body.val_at(9).expect("y parity");
        let r: U256 = body.val_at(10).expect("r");
        let s: U256 = body.val_at(11).expect("s");

        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&r.to_big_endian());
        compact[32..].copy_from_slice(&s.to_big_endian());
        let recovery_id = RecoveryId::try_from(i32::from(y_parity)).expect("parity is 0 or 1");
        let signature = RecoverableSignature::from_compact(&compact, recovery_id).expect("signature");
        let message = Message::from_digest(tx.signing_hash().to_fixed_bytes());
        let public_key = SECP256K1.recover_ecdsa(&message, &signature).expect("recoverable");
        let recovered = keccak(&public_key.serialize_uncompressed()[1..]);
        assert_eq!(Address::from_slice(&recovered.as_bytes()[12..]), signer.address());
    }
}
