use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{request::Parts, Extensions};
use clinexec_store::{Action, AuditLog};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::auth::AuthUser;

/// Who did it and from where
#[derive(Debug, Clone)]
pub struct AuditContext {
    pub actor: Option<String>,
    pub client_ip: String,
}

impl AuditContext {
    pub fn new(actor: Option<String>, client_ip: String) -> Self {
        Self { actor, client_ip }
    }

    /// Context for work started by the server itself (cron sweeps, background triggers)
    pub fn system() -> Self {
        Self::new(Some("system".to_string()), "local".to_string())
    }

    /// Extract audit context from request extensions
    pub fn from_extensions(extensions: &Extensions) -> Self {
        let client_ip = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let actor = extensions.get::<AuthUser>().map(|u| u.user_id.clone());

        Self { actor, client_ip }
    }
}

impl<S> FromRequestParts<S> for AuditContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_extensions(&parts.extensions))
    }
}

/// Log an action and persist it to the audit database in the background.
pub fn record(
    context: &AuditContext,
    action: Action,
    entity: &str,
    entity_id: Option<String>,
    outcome: Result<Option<String>, String>,
    audit_log: &Arc<Mutex<AuditLog>>,
) {
    let success = outcome.is_ok();
    let detail = match outcome {
        Ok(detail) => detail,
        Err(error) => Some(error),
    };

    if success {
        tracing::info!(
            actor = context.actor.as_deref().unwrap_or("anonymous"),
            client_ip = %context.client_ip,
            action = action.as_str(),
            entity,
            entity_id = entity_id.as_deref().unwrap_or("-"),
            "Audit: {} {}",
            action.as_str(),
            entity
        );
    } else {
        tracing::warn!(
            actor = context.actor.as_deref().unwrap_or("anonymous"),
            client_ip = %context.client_ip,
            action = action.as_str(),
            entity,
            entity_id = entity_id.as_deref().unwrap_or("-"),
            error = detail.as_deref().unwrap_or(""),
            "Audit: {} {} failed",
            action.as_str(),
            entity
        );
    }

    let context = context.clone();
    let entity = entity.to_string();
    let audit_log = Arc::clone(audit_log);

    tokio::spawn(async move {
        let audit = audit_log.lock().await;
        if let Err(e) = audit.log(
            action,
            Some(&entity),
            entity_id.as_deref(),
            context.actor.as_deref(),
            Some(&context.client_ip),
            success,
            detail.as_deref(),
        ) {
            tracing::error!("Failed to write audit log to database: {}", e);
        }
    });
}

/// Log a successful action
pub fn log_success(
    context: &AuditContext,
    action: Action,
    entity: &str,
    entity_id: impl ToString,
    audit_log: &Arc<Mutex<AuditLog>>,
) {
    record(
        context,
        action,
        entity,
        Some(entity_id.to_string()),
        Ok(None),
        audit_log,
    );
}

/// Log an authentication attempt
pub fn log_auth_attempt(client_ip: &str, user_id: Option<&str>, success: bool) {
    if success {
        tracing::debug!(
            user_id = user_id.unwrap_or("unknown"),
            client_ip = %client_ip,
            status = "success",
            "Audit: Authentication successful"
        );
    } else {
        tracing::warn!(
            client_ip = %client_ip,
            status = "failed",
            "Audit: Authentication failed"
        );
    }
}
