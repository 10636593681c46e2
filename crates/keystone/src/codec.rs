//! DAG-CBOR encoding for persisted records
//!
//! Keystones, scope indexes, aggregation keystones and mount indexes are
//! all stored as DAG-CBOR blocks. Encoding is deterministic, so decoding a
//! block and encoding it again reproduces the same bytes (and therefore the
//! same content address).

use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode block: {0}")]
    Encode(String),
    #[error("failed to decode block: {0}")]
    Decode(String),
}

/// A record that can be stored as a DAG-CBOR block
pub trait BlockEncoded: Serialize + DeserializeOwned + Sized {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        serde_ipld_dagcbor::to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_ipld_dagcbor::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        tags: BTreeMap<String, u64>,
    }

    impl BlockEncoded for Record {}

    #[test]
    fn test_reencode_is_byte_identical() {
        let record = Record {
            name: "record".to_string(),
            tags: BTreeMap::from([("b".to_string(), 2), ("a".to_string(), 1)]),
        };
        let encoded = record.encode().unwrap();
        let decoded = Record::decode(&encoded).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.encode().unwrap(), encoded);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(
            Record::decode(&[0xff, 0x00, 0x13]),
            Err(CodecError::Decode(_))
        ));
    }
}
