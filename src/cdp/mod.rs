pub mod discovery;
pub mod transport;

pub use discovery::{Endpoint, TargetInfo};
pub use transport::CdpTransport;
