mod chunks;
mod headers;
mod id;

pub use chunks::split_chunks;
pub use headers::{headers_to_map, is_hop_by_hop, map_to_headers};
pub use id::generate_subdomain;
