//! Lazy singleton external-service clients
//!
//! Created on first use, shared across every session in the worker process,
//! and resettable so test teardown gets clean state. No other process-wide
//! mutable configuration exists.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

use tutor_agent_config::ServiceEndpoints;

use crate::moderation::{HttpModerationClient, ModerationApi};
use crate::rewriter::{HttpRewriteClient, RewriteApi};

static MODERATION: Lazy<RwLock<Option<Arc<dyn ModerationApi>>>> =
    Lazy::new(|| RwLock::new(None));
static REWRITER: Lazy<RwLock<Option<Arc<dyn RewriteApi>>>> = Lazy::new(|| RwLock::new(None));

/// Shared moderation client for this process.
pub fn moderation_client(services: &ServiceEndpoints) -> Arc<dyn ModerationApi> {
    if let Some(client) = MODERATION.read().clone() {
        return client;
    }
    let mut slot = MODERATION.write();
    slot.get_or_insert_with(|| {
        Arc::new(HttpModerationClient::new(
            services.inference_url.clone(),
            services.inference_api_key.clone(),
            services.moderation_model.clone(),
        ))
    })
    .clone()
}

/// Shared rewriter client for this process.
pub fn rewriter_client(services: &ServiceEndpoints) -> Arc<dyn RewriteApi> {
    if let Some(client) = REWRITER.read().clone() {
        return client;
    }
    let mut slot = REWRITER.write();
    slot.get_or_insert_with(|| {
        Arc::new(HttpRewriteClient::new(
            services.inference_url.clone(),
            services.inference_api_key.clone(),
            services.rewriter_model.clone(),
        ))
    })
    .clone()
}

/// Drop the shared clients. Test isolation only.
pub fn reset_shared_clients() {
    *MODERATION.write() = None;
    *REWRITER.write() = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clients_are_created_once_and_resettable() {
        reset_shared_clients();
        let services = ServiceEndpoints::default();

        let a = moderation_client(&services);
        let b = moderation_client(&services);
        assert!(Arc::ptr_eq(&a, &b));

        reset_shared_clients();
        let c = moderation_client(&services);
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
