pub mod request;
pub mod response;

pub use request::{read_head, Limits, Method, RequestHead, Version};
pub use response::{reason_phrase, Response};
