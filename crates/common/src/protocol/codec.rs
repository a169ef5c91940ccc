use super::Frame;
use crate::Result;

/// Encode a frame as a MessagePack map with named fields
pub fn encode(frame: &Frame) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(frame)?)
}

/// Decode one frame from a complete transport message
pub fn decode(bytes: &[u8]) -> Result<Frame> {
    Ok(rmp_serde::from_slice(bytes)?)
}
