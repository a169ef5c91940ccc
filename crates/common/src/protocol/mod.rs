mod codec;
mod frame;
mod request;
mod response;

use std::collections::HashMap;

pub use codec::{decode, encode};
pub use frame::Frame;
pub use request::RequestHead;
pub use response::ResponseHead;

/// Identifier correlating every frame that belongs to one proxied request
pub type RequestId = u64;

/// Header name to list of values; repeated headers keep every value in order
pub type HeaderMultimap = HashMap<String, Vec<String>>;
