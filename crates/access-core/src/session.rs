//! ============================================================================
//! Access Session - Wires config, store, clock and the access components
//! ============================================================================
//! One session per contract/endpoint pair; nothing here is process-global.
//! ============================================================================

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::info;

use crate::access::{AccessResolver, DelegationFilter};
use crate::clock::{Clock, SystemClock};
use crate::config::AccessConfig;
use crate::reader::TokenStateReader;
use crate::rental::{ConfirmConfig, RentalManager};
use crate::store::EvmRpcStore;
use crate::types::Account;
use crate::wallet::{AccountConnector, ConnectMode};

pub struct AccessSession {
    config: AccessConfig,
    store: Arc<EvmRpcStore>,
    reader: TokenStateReader,
    clock: Arc<dyn Clock>,
}

impl AccessSession {
    /// Build the RPC store and reader for `config`
    pub fn new(config: AccessConfig) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(EvmRpcStore::from_config(&config)?);
        let reader = TokenStateReader::with_timeout(store.clone(), config.rpc_timeout());

        info!(
            "Access session for contract {} via {}",
            config.contract_address, config.rpc_url
        );

        Ok(Self {
            config,
            store,
            reader,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source used by every component built from here
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    pub fn reader(&self) -> &TokenStateReader {
        &self.reader
    }

    pub fn resolver(&self) -> AccessResolver {
        AccessResolver::new(self.reader.clone(), self.clock.clone())
            .with_concurrency(self.config.scan_concurrency)
    }

    pub fn delegation_filter(&self) -> DelegationFilter {
        DelegationFilter::new(self.reader.clone(), self.clock.clone())
            .with_concurrency(self.config.scan_concurrency)
    }

    pub fn rental_manager(&self, owner: Account) -> RentalManager {
        RentalManager::with_confirm_config(
            self.delegation_filter(),
            owner,
            ConfirmConfig::from(&self.config),
        )
    }

    /// Configured account, else the node's first account for `mode`
    pub async fn account(&self, mode: ConnectMode) -> Result<Account> {
        if let Some(account) = &self.config.account {
            return Ok(account.clone());
        }
        self.store
            .connect(mode)
            .await?
            .ok_or_else(|| anyhow!("No account connected (set an account or unlock one on the node)"))
    }
}
