// Front doors of the service. Both drive the same registry and pipeline and
// write through one shared `OutputStore`.

pub mod datagram;
pub mod http;

pub use datagram::DatagramServer;
pub use http::{HttpState, router};
