use serde::{Deserialize, Serialize};

use crate::{Result, SeqId};

/// Wire envelope for core signals, tagged with a sequence id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal(SeqId, nasch_core::distr::Signal);

impl Signal {
    pub fn from(id: SeqId, sig: nasch_core::distr::Signal) -> Self {
        Self(id, sig)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn id(&self) -> SeqId {
        self.0
    }

    pub fn into_inner(self) -> (SeqId, nasch_core::distr::Signal) {
        (self.0, self.1)
    }
}
