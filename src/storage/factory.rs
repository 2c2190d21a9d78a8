//! Transport factory: pick a backend from configuration

use crate::core::config::{BackendType, StoreConfig};
use crate::core::{Error, Result};
use crate::storage::auth::{ServiceAccount, ServiceAccountKey, StaticToken, TokenProvider};
use crate::storage::{MemoryTransport, SheetsTransport, Transport};
use std::sync::Arc;
use tracing::info;

/// Create the transport named by `config.backend`.
///
/// The memory backend starts with an empty table for every configured
/// collection. The sheets backend requires a spreadsheet id and either a
/// service-account key file or a fixed access token.
pub fn create_transport(config: &StoreConfig) -> Result<Arc<dyn Transport>> {
    match config.backend {
        BackendType::Memory => {
            info!(collections = config.collections.len(), "using in-memory backend");
            Ok(Arc::new(MemoryTransport::with_collections(&config.collections)))
        }
        BackendType::Sheets => {
            let spreadsheet_id = config
                .spreadsheet_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| Error::config("sheets backend requires a spreadsheet id"))?;
            let auth = token_provider(config)?;
            info!(spreadsheet_id, api = %config.api_base_url, "using sheets backend");
            Ok(Arc::new(SheetsTransport::with_auth(
                &config.api_base_url,
                spreadsheet_id,
                auth,
                config.request_timeout,
            )?))
        }
    }
}

fn token_provider(config: &StoreConfig) -> Result<Arc<dyn TokenProvider>> {
    if let Some(path) = &config.credentials_file {
        let account = ServiceAccount::new(ServiceAccountKey::from_file(path)?, config.request_timeout)?;
        info!(account = account.email(), "authenticating with service account");
        return Ok(Arc::new(account));
    }
    config
        .access_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .map(|token| Arc::new(StaticToken::new(token)) as Arc<dyn TokenProvider>)
        .ok_or_else(|| Error::config("sheets backend requires credentials or an access token"))
}
