// author: kodeholic (powered by Claude)

pub mod cert;
pub mod conn;
pub mod net;
pub mod pending;
pub mod registry;
pub mod router;
pub mod session;

pub use cert::ServerCert;
pub use net::{UdpPacket, UdpTransport};
pub use router::{classify, ConnectionRouter, PacketKind};
pub use session::{DtlsSession, Role, SessionState};
