// frame.rs
// The data-frame protocol multiplexed over one peer connection
//
// Exactly two payload kinds travel over a connection: whole files and chat
// messages. The tag field on the wire is `dataType`, matching the shape the
// web client speaks: { dataType: "file" | "message", fileName?, fileType?,
// payload?, text? }. Decoding is total-or-nothing; a frame either comes back
// fully typed or the bytes are rejected with a DecodeError.

use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// The unit exchanged over a connection. Adding a third kind is a
/// compile-time exercise: every decode site matches exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dataType")]
pub enum Frame {
    /// A whole file, held fully in memory on both ends. There is no
    /// chunking or backpressure at this layer.
    #[serde(rename = "file", rename_all = "camelCase")]
    File {
        file_name: String,
        file_type: String,
        #[serde(with = "serde_bytes")]
        payload: Vec<u8>,
    },

    /// One chat message.
    #[serde(rename = "message")]
    Message { text: String },
}

impl Frame {
    /// Encode the frame for the transport. Serialization failure is a local
    /// packaging error and is surfaced, never sent partially.
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        serde_json::to_vec(self).map_err(DecodeError)
    }

    /// Decode bytes delivered by the transport into a typed frame.
    pub fn decode(bytes: &[u8]) -> Result<Frame, DecodeError> {
        serde_json::from_slice(bytes).map_err(DecodeError)
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::File { .. } => "file",
            Frame::Message { .. } => "message",
        }
    }
}
