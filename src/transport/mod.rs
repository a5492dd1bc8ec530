//! # Transport Module
//!
//! Uniform outbound delivery over three interchangeable implementations:
//!
//! - [`HttpBrokerTransport`] sends through the remote broker API
//! - [`SidecarTransport`] sends through a locally embedded session manager
//! - [`DryRunTransport`] answers with synthetic successes
//!
//! [`TransportFactory`] picks one from the live transport mode. All of them
//! fail with [`CanonicalError`].

pub mod dryrun;
pub mod errors;
pub mod factory;
pub mod http;
pub mod sidecar;
pub mod traits;
pub mod types;

pub use dryrun::DryRunTransport;
pub use errors::{CanonicalError, ErrorCode, TransportOutcome};
pub use factory::{ActiveTransport, TransportDependencies, TransportFactory};
pub use http::HttpBrokerTransport;
pub use sidecar::{
    InMemorySidecarManager, SidecarError, SidecarInstanceManager, SidecarInstanceState,
    SidecarOutbound, SidecarReceipt, SidecarTransport,
};
pub use traits::WhatsAppTransport;
pub use types::{
    normalize_phone, InstanceStatus, MediaKind, RecipientCheck, SendMediaRequest,
    SendTextRequest, TransportName, TransportResult,
};
