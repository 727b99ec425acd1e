use arbdeploy_common::utils::keccak;
use ethereum_types::{Address, H256, U256};
use rlp::RlpStream;

pub const EIP1559_TX_TYPE: u8 = 0x02;

/// Type-2 transaction with an empty access list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: U256,
    pub max_fee_per_gas: U256,
    pub gas_limit: u64,
    /// `None` deploys `data` as creation code.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Vec<u8>,
    pub hash: H256,
}

impl Eip1559Transaction {
    fn append_fields(&self, stream: &mut RlpStream) {
        stream.append(&self.chain_id);
        stream.append(&self.nonce);
        stream.append(&self.max_priority_fee_per_gas);
        stream.append(&self.max_fee_per_gas);
        stream.append(&self.gas_limit);
        match &self.to {
            Some(to) => stream.append(to),
            None => stream.append_empty_data(),
        };
        stream.append(&self.value);
        stream.append(&self.data);
        stream.begin_list(0);
    }

    /// `0x02 || rlp([chain_id, ..., access_list])`, the preimage of the signing hash.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut stream = RlpStream::new_list(9);
        self.append_fields(&mut stream);
        typed(stream)
    }

    pub fn signing_hash(&self) -> H256 {
        keccak(self.signing_payload())
    }

    pub fn encode_signed(&self, y_parity: bool, r: U256, s: U256) -> SignedTransaction {
        let mut stream = RlpStream::new_list(12);
        self.append_fields(&mut stream);
        stream.append(&u8::from(y_parity));
        stream.append(&r);
        stream.append(&s);
        let raw = typed(stream);
        SignedTransaction {
            hash: keccak(&raw),
            raw,
        }
    }
}

fn typed(stream: RlpStream) -> Vec<u8> {
    let body = stream.out();
    let mut encoded = Vec::with_capacity(body.len() + 1);
    encoded.push(EIP1559_TX_TYPE);
    encoded.extend_from_slice(&body);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn creation_payload_encodes_empty_to() {
        let tx = Eip1559Transaction {
            chain_id: 11155111,
            nonce: 3,
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
            max_fee_per_gas: U256::from(30_000_000_000u64),
            gas_limit: 1_500_000,
            to: None,
            value: U256::zero(),
            data: hex!("6080604052").to_vec(),
        };
        assert_eq!(
            tx.signing_payload(),
            hex!("02dd83aa36a703843b9aca008506fc23ac008316e3608080856080604052c0").to_vec()
        );
    }

    #[test]
    fn call_payload_encodes_recipient_and_value() {
        let tx = Eip1559Transaction {
            chain_id: 1,
            nonce: 0,
            max_priority_fee_per_gas: U256::from(2),
            max_fee_per_gas: U256::from(100),
            gas_limit: 21_000,
            to: Some(Address::repeat_byte(0x11)),
            value: U256::exp10(18),
            data: Vec::new(),
        };
        assert_eq!(
            tx.signing_payload(),
            hex!("02e701800264825208941111111111111111111111111111111111111111880de0b6b3a764000080c0")
                .to_vec()
        );
    }

    #[test]
    fn signed_encoding_extends_the_unsigned_fields() {
        let tx = Eip1559Transaction {
            chain_id: 31337,
            gas_limit: 100_000,
            ..Default::default()
        };
        let signed = tx.encode_signed(true, U256::from(5), U256::from(6));
        assert_eq!(signed.raw[0], EIP1559_TX_TYPE);
        assert!(signed.raw.ends_with(&[0x01, 0x05, 0x06]));
        assert_eq!(signed.hash, keccak(&signed.raw));
    }
}
