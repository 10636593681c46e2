use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::BlockEncoded;
use crate::registry::MergePolicy;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("invalid by-id payload: {0}")]
    InvalidRecords(#[from] serde_json::Error),
}

/// One service's share of a merged aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum Contribution {
    /// Records keyed by id, upserted round over round
    ById { records: BTreeMap<String, Value> },
    /// Distinct payloads seen so far, oldest first
    Append { history: Vec<Bytes> },
    /// The latest payload
    Replace { payload: Bytes },
}

impl Contribution {
    /// Fold `payload` into what the service contributed last round
    pub fn merge(
        policy: &MergePolicy,
        previous: Option<&Contribution>,
        payload: Bytes,
    ) -> Result<Self, MergeError> {
        match policy {
            MergePolicy::Replace => Ok(Contribution::Replace { payload }),
            MergePolicy::Append { retention } => {
                let mut history = match previous {
                    Some(Contribution::Append { history }) => history.clone(),
                    _ => Vec::new(),
                };
                if history.last() != Some(&payload) {
                    history.push(payload);
                }
                if let Some(retention) = retention {
                    let retention = usize::try_from(*retention).unwrap_or(usize::MAX);
                    if history.len() > retention {
                        history.drain(..history.len() - retention);
                    }
                }
                Ok(Contribution::Append { history })
            }
            MergePolicy::ById => {
                let incoming: Map<String, Value> = serde_json::from_slice(&payload)?;
                let mut records = match previous {
                    Some(Contribution::ById { records }) => records.clone(),
                    _ => BTreeMap::new(),
                };
                records.extend(incoming);
                Ok(Contribution::ById { records })
            }
        }
    }
}

/// The decrypted body of an aggregation, keyed by service id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedPayload(BTreeMap<String, Contribution>);

impl BlockEncoded for MergedPayload {}

impl MergedPayload {
    pub fn get(&self, service_id: &str) -> Option<&Contribution> {
        self.0.get(service_id)
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.0.contains_key(service_id)
    }

    pub fn service_ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn insert(&mut self, service_id: String, contribution: Contribution) {
        self.0.insert(service_id, contribution);
    }
}
