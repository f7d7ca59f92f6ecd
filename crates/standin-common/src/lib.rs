mod accept;
mod uri;

pub use accept::accept_retry_delay;
pub use uri::{
    encode_query, join_segments, parse_query, quote_segment, split_path, unquote_segment,
    QueryMap,
};
