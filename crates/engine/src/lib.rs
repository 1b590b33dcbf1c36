//! Request-handling core: transport-neutral envelopes, the CloudEvents
//! codec, the per-signature router, and the output fan-out.

pub mod cloudevent;
pub mod envelope;
pub mod fanout;
pub mod router;

pub use cloudevent::{classify, decode, CanonicalEvent, CodecError, EventMode};
pub use envelope::{RequestEnvelope, ResponseEnvelope};
pub use fanout::FanoutError;
pub use router::{call_shape, SignatureRouter, Variant};
