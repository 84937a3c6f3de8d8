//! Binary encoding for the raw data cached per job.
//!
//! bincode keeps the payload compact and fast to decode; gzip on top shrinks
//! multi-year exports considerably since titles repeat heavily.

use bincode::{deserialize, serialize};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use tracing::debug;
use watch_stats_models::{JobId, ProfileYears, RawRecord, UserId};

use crate::error::CodecError;

/// Everything background processing needs to resume a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobData {
    pub job_id: JobId,
    pub user: UserId,
    pub profile_years: ProfileYears,
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Clone, Copy)]
pub struct JobDataCodec {
    use_compression: bool,
}

impl Default for JobDataCodec {
    fn default() -> Self {
        Self { use_compression: true }
    }
}

impl JobDataCodec {
    pub fn new(use_compression: bool) -> Self {
        Self { use_compression }
    }

    pub fn encode(&self, data: &JobData) -> Result<Vec<u8>, CodecError> {
        let serialized = serialize(data).map_err(CodecError::Encode)?;

        let encoded = if self.use_compression {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&serialized)?;
            encoder.finish()?
        } else {
            serialized
        };

        debug!(job_id = %data.job_id, records = data.records.len(), bytes = encoded.len(), "Encoded job data");
        Ok(encoded)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<JobData, CodecError> {
        let decoded = if self.use_compression {
            let mut decoder = GzDecoder::new(bytes);
            let mut decompressed = Vec::new();
            decoder.read_to_end(&mut decompressed)?;
            decompressed
        } else {
            bytes.to_vec()
        };

        deserialize(&decoded).map_err(CodecError::Decode)
    }
}
