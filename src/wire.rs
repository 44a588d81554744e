//! The wire client contract: the boundary through which a sealed record set
//! is physically submitted to one named stream.
//!
//! This module owns the only real I/O in the crate. Everything upstream of
//! it (the buffer, the roster, the dispatch state machine) is agnostic to
//! how a record set actually reaches the remote service.

use crate::error::WireError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// A committed position in the log: segment, entry, and slot.
///
/// The acknowledgement names this triple for the record set as a whole;
/// per-record coordinates are derived by adding the record's index within
/// the set to `slot_id`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub log_segment_seq: i64,
    pub entry_id: i64,
    pub slot_id: i32,
}

impl Coordinate {
    pub fn new(log_segment_seq: i64, entry_id: i64, slot_id: i32) -> Self {
        Self {
            log_segment_seq,
            entry_id,
            slot_id,
        }
    }

    /// The coordinate for the `i`th record in a set acknowledged at `self`.
    pub(crate) fn offset_by(&self, i: u32) -> Coordinate {
        Coordinate {
            log_segment_seq: self.log_segment_seq,
            entry_id: self.entry_id,
            slot_id: self.slot_id + i as i32,
        }
    }
}

/// The collaborator that submits a sealed record set's bytes to a named
/// stream and reports back the base coordinate the service assigned it.
///
/// Implementations must not block the calling task; failures of any kind
/// (timeout, transport, rejection) are reported as `WireError` and are
/// always treated as a speculation trigger by the dispatch state machine,
/// never surfaced to the caller directly.
#[async_trait]
pub trait WireClient: Send + Sync {
    async fn write_record_set(
        &self,
        stream: &str,
        payload: Bytes,
        record_count: u32,
    ) -> Result<Coordinate, WireError>;
}

/// HTTP-based implementation of [`WireClient`], the real, end-to-end-usable
/// collaborator. Streams are named literally by the roster -- no namespace
/// resolution or ensemble placement happens here; that belongs to the
/// metadata/cluster driver this crate deliberately does not reproduce.
pub struct HttpWireClient {
    inner: reqwest::Client,
    base_url: String,
}

/// Response header carrying the base coordinate of a successful append,
/// formatted as `"{segment}:{entry}:{slot}"`.
pub const HEADER_RECORDSET_COORDINATE: &str = "x-recordset-coordinate";

impl HttpWireClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, Duration::from_secs(5))
    }

    pub fn with_timeout(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let inner = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            inner,
            base_url: base_url.into(),
        })
    }

    fn stream_url(&self, stream: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), stream)
    }

    fn parse_coordinate(value: &str) -> Option<Coordinate> {
        let mut parts = value.split(':');
        let segment = parts.next()?.parse().ok()?;
        let entry = parts.next()?.parse().ok()?;
        let slot = parts.next()?.parse().ok()?;
        Some(Coordinate::new(segment, entry, slot))
    }
}

#[async_trait]
impl WireClient for HttpWireClient {
    async fn write_record_set(
        &self,
        stream: &str,
        payload: Bytes,
        record_count: u32,
    ) -> Result<Coordinate, WireError> {
        let url = self.stream_url(stream);

        let resp = self
            .inner
            .post(&url)
            .header("content-type", "application/octet-stream")
            .header("x-record-count", record_count.to_string())
            .body(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WireError::Timeout {
                        stream: stream.to_string(),
                    }
                } else {
                    WireError::Transport {
                        stream: stream.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = resp.status().as_u16();

        if status != 200 && status != 201 {
            return Err(WireError::Rejected {
                stream: stream.to_string(),
                status,
            });
        }

        let coordinate = resp
            .headers()
            .get(HEADER_RECORDSET_COORDINATE)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse_coordinate)
            .ok_or_else(|| WireError::Rejected {
                stream: stream.to_string(),
                status,
            })?;

        Ok(coordinate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_offset_by_advances_slot_only() {
        let base = Coordinate::new(7, 42, 10);
        let c2 = base.offset_by(2);
        assert_eq!(c2.log_segment_seq, 7);
        assert_eq!(c2.entry_id, 42);
        assert_eq!(c2.slot_id, 12);
    }

    #[test]
    fn parse_coordinate_round_trips() {
        let c = HttpWireClient::parse_coordinate("7:42:10").unwrap();
        assert_eq!(c, Coordinate::new(7, 42, 10));
        assert!(HttpWireClient::parse_coordinate("bogus").is_none());
    }
}
