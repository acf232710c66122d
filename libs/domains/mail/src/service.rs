//! Remote mail services: template and provider lookup, history and status
//! records.
//!
//! `MailService` is the capability the job processor depends on.
//! `GrpcMailService` implements it over connections from the shared
//! [`ClientPool`].

use crate::models::{Encryption, HistoryUpdate, MailProvider, MailTemplate, StatusEvent};
use async_trait::async_trait;
use grpc_client::{ClientHandle, ClientPool, PoolError};
use rpc::mail::{
    CreateStatusHistoryRequest, GetMailProviderRequest, GetMailTmplRequest, UpdateMailHistoryRequest,
    mail_history_service_client::MailHistoryServiceClient,
    mail_provider_service_client::MailProviderServiceClient, mail_tmpl_service_client::MailTmplServiceClient,
    status_history_service_client::StatusHistoryServiceClient,
};
use std::sync::Arc;
use thiserror::Error;
use tonic::Code;
use tonic::transport::Channel;
use tracing::debug;

/// Errors from a remote mail service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No connection to the endpoint.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// The call reached the service and failed.
    #[error("RPC failed: {0}")]
    Rpc(#[from] tonic::Status),

    /// The service answered with a record this worker cannot use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Remote operations a mail job depends on.
///
/// Lookups return `Ok(None)` when the record does not exist.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailService: Send + Sync + 'static {
    async fn get_template(&self, id: &str) -> Result<Option<MailTemplate>, ServiceError>;

    async fn get_provider(&self, email: &str) -> Result<Option<MailProvider>, ServiceError>;

    async fn update_history(&self, update: &HistoryUpdate) -> Result<(), ServiceError>;

    async fn create_status_event(&self, event: &StatusEvent) -> Result<(), ServiceError>;
}

/// [`MailService`] over gRPC.
///
/// All four contracts are served by one endpoint, looked up in the pool on
/// every call so a replaced connection is picked up immediately.
#[derive(Clone)]
pub struct GrpcMailService {
    pool: Arc<ClientPool>,
    endpoint: String,
}

impl GrpcMailService {
    pub fn new(pool: Arc<ClientPool>, endpoint: impl Into<String>) -> Self {
        Self {
            pool,
            endpoint: endpoint.into(),
        }
    }

    async fn channel(&self) -> Result<ClientHandle<Channel>, ServiceError> {
        Ok(self.pool.acquire(&self.endpoint).await?)
    }

    /// Flag the connection for replacement when the transport is gone.
    fn rpc_failed(handle: &ClientHandle<Channel>, status: tonic::Status) -> ServiceError {
        if status.code() == Code::Unavailable {
            handle.mark_unavailable();
        }
        ServiceError::Rpc(status)
    }
}

#[async_trait]
impl MailService for GrpcMailService {
    async fn get_template(&self, id: &str) -> Result<Option<MailTemplate>, ServiceError> {
        let handle = self.channel().await?;
        let mut client = MailTmplServiceClient::new(handle.connection().clone());

        match client.get_mail_tmpl(GetMailTmplRequest { id: id.to_string() }).await {
            Ok(response) => Ok(response.into_inner().mail_tmpl.map(template_from_proto)),
            Err(status) if status.code() == Code::NotFound => Ok(None),
            Err(status) => Err(Self::rpc_failed(&handle, status)),
        }
    }

    async fn get_provider(&self, email: &str) -> Result<Option<MailProvider>, ServiceError> {
        let handle = self.channel().await?;
        let mut client = MailProviderServiceClient::new(handle.connection().clone());

        let request = GetMailProviderRequest {
            email: email.to_string(),
        };
        match client.get_mail_provider(request).await {
            Ok(response) => response.into_inner().mail_provider.map(provider_from_proto).transpose(),
            Err(status) if status.code() == Code::NotFound => Ok(None),
            Err(status) => Err(Self::rpc_failed(&handle, status)),
        }
    }

    async fn update_history(&self, update: &HistoryUpdate) -> Result<(), ServiceError> {
        let handle = self.channel().await?;
        let mut client = MailHistoryServiceClient::new(handle.connection().clone());

        let request = UpdateMailHistoryRequest {
            id: update.job_id.clone(),
            subject: update.subject.clone(),
            body: update.body.clone(),
            tos: update.recipients.clone(),
            data: update.data.clone(),
            template_id: update.template_id.clone(),
            email_provider: update.provider_email.clone(),
        };
        client
            .update_mail_history(request)
            .await
            .map_err(|status| Self::rpc_failed(&handle, status))?;

        debug!(job_id = %update.job_id, "Mail history updated");
        Ok(())
    }

    async fn create_status_event(&self, event: &StatusEvent) -> Result<(), ServiceError> {
        let handle = self.channel().await?;
        let mut client = StatusHistoryServiceClient::new(handle.connection().clone());

        client
            .create_status_history(status_request(event))
            .await
            .map_err(|status| Self::rpc_failed(&handle, status))?;
        Ok(())
    }
}

fn template_from_proto(tmpl: rpc::mail::MailTmpl) -> MailTemplate {
    MailTemplate {
        id: tmpl.id,
        name: tmpl.name,
        subject: tmpl.subject,
        body: tmpl.body,
        keys: tmpl.keys,
        provider_email: tmpl.provider_email,
        status: tmpl.status.into(),
    }
}

fn provider_from_proto(provider: rpc::mail::MailProvider) -> Result<MailProvider, ServiceError> {
    let port = u16::try_from(provider.port)
        .map_err(|_| ServiceError::InvalidResponse(format!("provider port {} out of range", provider.port)))?;

    Ok(MailProvider {
        id: provider.id,
        email: provider.email,
        name: provider.name,
        host: provider.host,
        port,
        username: provider.user_name,
        password: provider.password,
        encryption: Encryption::parse_lenient(&provider.encryption),
        status: provider.status.into(),
    })
}

fn status_request(event: &StatusEvent) -> CreateStatusHistoryRequest {
    CreateStatusHistoryRequest {
        mail_history_id: event.job_id.clone(),
        status: event.status.to_string(),
        message: event.message.clone(),
        created_at: event.created_at.to_rfc3339(),
    }
}
