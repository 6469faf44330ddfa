//! Services known to a conode.
//!
//! Services are registered as factories. When a [`Server`](crate::Server)
//! binds, it calls every factory once with a [`Context`] and keeps the
//! resulting instances for its whole lifetime.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use corelib::ServerIdentity;

use crate::error::RegistrationError;
use crate::service::Service;

/// What a service gets to know about the conode it runs on.
#[derive(Debug, Clone)]
pub struct Context {
    identity: ServerIdentity,
    service: String,
}

impl Context {
    pub(crate) fn new(identity: ServerIdentity, service: impl Into<String>) -> Self {
        Self {
            identity,
            service: service.into(),
        }
    }

    /// Identity of the conode.
    pub fn server_identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Name the service is registered under.
    pub fn service_name(&self) -> &str {
        &self.service
    }
}

type ServiceFactory = Box<dyn Fn(&Context) -> anyhow::Result<Arc<dyn Service>> + Send + Sync>;

#[derive(Default)]
pub struct ServiceRegistry {
    factories: BTreeMap<String, ServiceFactory>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.service_names())
            .finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_new_service<F>(&mut self, name: &str, factory: F) -> Result<(), RegistrationError>
    where
        F: Fn(&Context) -> anyhow::Result<Arc<dyn Service>> + Send + Sync + 'static,
    {
        if self.factories.contains_key(name) {
            return Err(RegistrationError::DuplicateService(name.to_string()));
        }
        self.factories.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    pub fn unregister_service(&mut self, name: &str) -> Result<(), RegistrationError> {
        self.factories
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistrationError::UnknownService(name.to_string()))
    }

    pub fn service_names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Build one instance of every registered service for `identity`.
    pub(crate) fn instantiate(
        &self,
        identity: &ServerIdentity,
    ) -> Result<BTreeMap<String, Arc<dyn Service>>, RegistrationError> {
        let mut services = BTreeMap::new();
        for (name, factory) in &self.factories {
            let context = Context::new(identity.clone(), name.as_str());
            let service = factory(&context).map_err(|e| RegistrationError::Factory {
                service: name.clone(),
                message: format!("{e:#}"),
            })?;
            services.insert(name.clone(), service);
        }
        info!(conode = %identity, services = ?services.keys().collect::<Vec<_>>(), "services started");
        Ok(services)
    }
}
