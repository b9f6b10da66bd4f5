//! Shared setup for commands that perform transfers.

use std::future::Future;
use std::sync::Arc;

use rangebridge::config::ConfigFile;
use rangebridge::logging::{init_logging, LoggingGuard};
use rangebridge::loopback::LoopbackProducer;
use rangebridge::{TransferConfig, TransferCoordinator, TransportMode};
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;

/// Config, logging and runtime for one CLI invocation.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load config, install logging and build the runtime.
    pub fn new() -> Result<Self, CliError> {
        let config = ConfigFile::load()?;
        let logging = init_logging(&config.logging_config())?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("rangebridge")
            .build()
            .map_err(|e| CliError::Runtime(format!("Failed to start runtime: {}", e)))?;

        Ok(Self {
            config,
            runtime,
            _logging: logging,
        })
    }

    pub fn log_startup(&self, command: &str) {
        info!(version = rangebridge::VERSION, command, "rangebridge starting");
    }

    /// Transfer config from the file, with CLI overrides applied.
    pub fn transfer_config(
        &self,
        transport: Option<TransportMode>,
        chunk_size: Option<usize>,
    ) -> TransferConfig {
        let mut config = self.config.transfer_config();
        if let Some(transport) = transport {
            config = config.with_transport(transport);
        }
        if let Some(chunk_size) = chunk_size {
            config = config.with_chunk_size(chunk_size);
        }
        config
    }

    /// A coordinator over an in-process loopback producer.
    pub fn coordinator(
        &self,
        config: TransferConfig,
        producer: &LoopbackProducer,
    ) -> Arc<TransferCoordinator> {
        Arc::new(TransferCoordinator::new(config, Arc::new(producer.clone())))
    }

    /// Cancel the returned token on Ctrl+C.
    pub fn cancel_on_ctrlc(&self) -> Result<CancellationToken, CliError> {
        let cancel = CancellationToken::new();
        let handler_token = cancel.clone();
        ctrlc::set_handler(move || {
            eprintln!();
            eprintln!("Received interrupt, canceling transfer...");
            handler_token.cancel();
        })
        .map_err(|e| CliError::Runtime(format!("Failed to set signal handler: {}", e)))?;
        Ok(cancel)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
