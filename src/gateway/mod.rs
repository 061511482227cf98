//! The gateway proper: forwarding, usage recording and the pipeline that
//! drives the security gates in front of them.

pub mod forwarder;
pub mod pipeline;
pub mod usage;

pub use forwarder::{ForwardError, Forwarder, OutboundRequest, UpstreamResponse};
pub use pipeline::Gateway;
pub use usage::{RecordingError, UsageRecorder};
