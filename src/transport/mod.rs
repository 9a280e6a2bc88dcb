mod endpoint;
mod http_transport;

pub use endpoint::{EndpointCandidate, GenerationRequest};
pub use http_transport::HttpTransport;
