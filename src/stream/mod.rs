pub mod lines;

pub use lines::{
    data_payload, is_done_payload, timed_line_stream, LineSplitter, DATA_PREFIX, DONE_SENTINEL,
};
