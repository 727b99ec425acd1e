//! Serde adapters for the registry's on-disk representation.

pub mod checksummed_address {
    use ethereum_types::Address;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    use crate::utils::{parse_address, to_checksum};

    pub fn serialize<S>(address: &Address, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_checksum(address))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_address(&raw).map_err(D::Error::custom)
    }
}

pub mod checksummed_address_vec {
    use ethereum_types::Address;
    use serde::{Deserialize, Deserializer, Serializer, de::Error, ser::SerializeSeq};

    use crate::utils::{parse_address, to_checksum};

    pub fn serialize<S>(addresses: &[Address], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(addresses.len()))?;
        for address in addresses {
            seq.serialize_element(&to_checksum(address))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Address>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| parse_address(raw).map_err(D::Error::custom))
            .collect()
    }
}

/// `Option<U256>` as a decimal string, so wei amounts survive JavaScript readers.
pub mod u256_dec_str_opt {
    use ethereum_types::U256;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(value) => serializer.serialize_str(&value.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<U256>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| U256::from_dec_str(&raw).map_err(D::Error::custom))
            .transpose()
    }
}
