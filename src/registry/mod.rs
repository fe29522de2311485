//! Registry subsystem.
//!
//! # Data Flow
//! ```text
//! lainlet watch endpoint (HTTP, ?watch=1)
//!     → stream.rs (line framing, reconnect loop)
//!     → types.rs (data payload → Snapshot)
//!     → single-slot channel → snapshot consumer
//! ```

pub mod stream;
pub mod types;

pub use stream::{RegistryStream, StreamError, StreamEvent};
pub use types::{ContainerInfo, ServiceKey, ServiceRecord, Snapshot};
