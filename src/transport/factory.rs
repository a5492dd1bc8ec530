//! # Transport Factory
//!
//! Resolves the transport for the live [`TransportMode`] and memoizes it.
//!
//! The memo is keyed by mode: repeated [`TransportFactory::resolve`] calls
//! return the same instance while the mode is unchanged, and the first call
//! after a mode change builds a fresh one. [`TransportFactory::reset`] drops
//! the memo explicitly. Callers must not hold on to a resolved transport
//! across mode changes and expect it to follow the new mode.
//!
//! ```text
//! RuntimeSettingsSource::current().transport_mode
//!     ↓
//! TransportFactory::resolve()
//!     ↓ (memoized per mode)
//! ActiveTransport::{Http | Sidecar | DryRun}    Disabled → TRANSPORT_NOT_CONFIGURED
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use super::dryrun::DryRunTransport;
use super::errors::{CanonicalError, TransportOutcome};
use super::http::HttpBrokerTransport;
use super::sidecar::{SidecarInstanceManager, SidecarTransport};
use super::traits::WhatsAppTransport;
use super::types::{
    InstanceStatus, RecipientCheck, SendMediaRequest, SendTextRequest, TransportName,
    TransportResult,
};
use crate::broker::BrokerMessagingApi;
use crate::config::{RuntimeSettingsSource, TransportMode};

/// The transport selected for the current mode
#[derive(Debug, Clone)]
pub enum ActiveTransport {
    Http(Arc<HttpBrokerTransport>),
    Sidecar(Arc<SidecarTransport>),
    DryRun(Arc<DryRunTransport>),
}

impl ActiveTransport {
    /// Whether both handles point at the same underlying instance
    pub fn same_instance(&self, other: &ActiveTransport) -> bool {
        match (self, other) {
            (Self::Http(a), Self::Http(b)) => Arc::ptr_eq(a, b),
            (Self::Sidecar(a), Self::Sidecar(b)) => Arc::ptr_eq(a, b),
            (Self::DryRun(a), Self::DryRun(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn build(mode: TransportMode, deps: &TransportDependencies) -> TransportOutcome<Self> {
        match mode {
            TransportMode::Http => {
                let api = deps.broker_api.clone().ok_or_else(|| {
                    CanonicalError::not_configured(
                        "HTTP transport selected but no broker client is available",
                    )
                })?;
                Ok(Self::Http(Arc::new(HttpBrokerTransport::new(api))))
            }
            TransportMode::Sidecar => {
                let manager = deps.sidecar_manager.clone().ok_or_else(|| {
                    CanonicalError::not_configured(
                        "Sidecar transport selected but no instance manager is available",
                    )
                })?;
                Ok(Self::Sidecar(Arc::new(SidecarTransport::new(manager))))
            }
            TransportMode::DryRun => Ok(Self::DryRun(Arc::new(DryRunTransport::new()))),
            TransportMode::Disabled => Err(CanonicalError::not_configured(
                "WhatsApp transport is disabled",
            )),
        }
    }
}

#[async_trait]
impl WhatsAppTransport for ActiveTransport {
    fn name(&self) -> TransportName {
        match self {
            Self::Http(transport) => transport.name(),
            Self::Sidecar(transport) => transport.name(),
            Self::DryRun(transport) => transport.name(),
        }
    }

    async fn send_text(&self, request: &SendTextRequest) -> TransportOutcome<TransportResult> {
        match self {
            Self::Http(transport) => transport.send_text(request).await,
            Self::Sidecar(transport) => transport.send_text(request).await,
            Self::DryRun(transport) => transport.send_text(request).await,
        }
    }

    async fn send_media(&self, request: &SendMediaRequest) -> TransportOutcome<TransportResult> {
        match self {
            Self::Http(transport) => transport.send_media(request).await,
            Self::Sidecar(transport) => transport.send_media(request).await,
            Self::DryRun(transport) => transport.send_media(request).await,
        }
    }

    async fn check_recipient(
        &self,
        instance_id: &str,
        phone: &str,
    ) -> TransportOutcome<RecipientCheck> {
        match self {
            Self::Http(transport) => transport.check_recipient(instance_id, phone).await,
            Self::Sidecar(transport) => transport.check_recipient(instance_id, phone).await,
            Self::DryRun(transport) => transport.check_recipient(instance_id, phone).await,
        }
    }

    async fn get_status(&self, instance_id: &str) -> TransportOutcome<InstanceStatus> {
        match self {
            Self::Http(transport) => transport.get_status(instance_id).await,
            Self::Sidecar(transport) => transport.get_status(instance_id).await,
            Self::DryRun(transport) => transport.get_status(instance_id).await,
        }
    }
}

/// Collaborators the transports are built from
#[derive(Clone, Default)]
pub struct TransportDependencies {
    pub broker_api: Option<Arc<dyn BrokerMessagingApi>>,
    pub sidecar_manager: Option<Arc<dyn SidecarInstanceManager>>,
}

impl TransportDependencies {
    pub fn with_broker_api(mut self, api: Arc<dyn BrokerMessagingApi>) -> Self {
        self.broker_api = Some(api);
        self
    }

    pub fn with_sidecar_manager(mut self, manager: Arc<dyn SidecarInstanceManager>) -> Self {
        self.sidecar_manager = Some(manager);
        self
    }
}

/// Mode-keyed, memoizing transport resolver
pub struct TransportFactory {
    runtime: Arc<dyn RuntimeSettingsSource>,
    deps: TransportDependencies,
    cached: Mutex<Option<(TransportMode, ActiveTransport)>>,
}

impl std::fmt::Debug for TransportFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportFactory")
            .field("cached_mode", &self.cached_mode())
            .field("has_broker_api", &self.deps.broker_api.is_some())
            .field("has_sidecar_manager", &self.deps.sidecar_manager.is_some())
            .finish()
    }
}

impl TransportFactory {
    pub fn new(runtime: Arc<dyn RuntimeSettingsSource>, deps: TransportDependencies) -> Self {
        Self {
            runtime,
            deps,
            cached: Mutex::new(None),
        }
    }

    /// Transport for the current mode, built on first use per mode
    pub fn resolve(&self) -> TransportOutcome<ActiveTransport> {
        let mode = self.runtime.current().transport_mode;
        let mut cached = self.cached.lock();

        if let Some((cached_mode, transport)) = cached.as_ref() {
            if *cached_mode == mode {
                return Ok(transport.clone());
            }
        }
        if let Some((previous_mode, _)) = cached.take() {
            info!(
                previous_mode = %previous_mode,
                mode = %mode,
                "Transport mode changed, discarding cached transport"
            );
        }

        let transport = ActiveTransport::build(mode, &self.deps)?;
        debug!(mode = %mode, transport = %transport.name(), "Transport resolved");
        *cached = Some((mode, transport.clone()));
        Ok(transport)
    }

    /// Drop the memoized transport
    pub fn reset(&self) {
        if self.cached.lock().take().is_some() {
            info!("Transport cache reset");
        }
    }

    /// Mode of the memoized transport, if any
    pub fn cached_mode(&self) -> Option<TransportMode> {
        self.cached.lock().as_ref().map(|(mode, _)| *mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RuntimeSettings, SharedRuntimeSettings};
    use crate::transport::ErrorCode;

    fn factory(mode: TransportMode) -> (Arc<SharedRuntimeSettings>, TransportFactory) {
        let runtime = Arc::new(SharedRuntimeSettings::new(RuntimeSettings {
            poller_disabled: false,
            transport_mode: mode,
        }));
        let factory = TransportFactory::new(runtime.clone(), TransportDependencies::default());
        (runtime, factory)
    }

    #[test]
    fn test_memoizes_per_mode() {
        let (_runtime, factory) = factory(TransportMode::DryRun);
        let first = factory.resolve().unwrap();
        let second = factory.resolve().unwrap();
        assert!(first.same_instance(&second));
        assert_eq!(factory.cached_mode(), Some(TransportMode::DryRun));
    }

    #[test]
    fn test_reset_forces_rebuild() {
        let (_runtime, factory) = factory(TransportMode::DryRun);
        let first = factory.resolve().unwrap();
        factory.reset();
        assert_eq!(factory.cached_mode(), None);
        let second = factory.resolve().unwrap();
        assert!(!first.same_instance(&second));
    }

    #[test]
    fn test_disabled_and_missing_dependencies() {
        let (runtime, factory) = factory(TransportMode::Disabled);
        let err = factory.resolve().unwrap_err();
        assert_eq!(err.code, ErrorCode::TransportNotConfigured);
        assert_eq!(err.transport, TransportName::None);

        runtime.set_transport_mode(TransportMode::Sidecar);
        let err = factory.resolve().unwrap_err();
        assert_eq!(err.code, ErrorCode::TransportNotConfigured);
        assert_eq!(factory.cached_mode(), None);
    }
}
