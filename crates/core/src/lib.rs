//! Small set of cross-cutting utilities shared by the gateway crate: the
//! interned string type, a couple of generic helpers, and process-wide
//! tracing bootstrap. Nothing here is gateway-specific.

pub mod bow;
pub mod prelude;
pub mod strng;
pub mod telemetry;

pub use bow::OwnedOrBorrowed;
pub use strng::Strng;
