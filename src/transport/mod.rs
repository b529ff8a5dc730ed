pub mod session;
pub mod tcp;
pub mod traits;

pub use session::{AckOutcome, TransportSession};
pub use tcp::TcpConnector;
pub use traits::{TransportConnector, TransportStream};
