extern crate config as config_crate;
extern crate env_logger;
#[macro_use]
extern crate failure;
extern crate futures;
extern crate hyper;
extern crate hyper_rustls;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[cfg_attr(test, macro_use)]
extern crate serde_json;
#[cfg(test)]
extern crate tempfile;
extern crate tokio;
extern crate validator;

pub mod backoff;
pub mod config;
pub mod errors;
pub mod http;
pub mod microservice;
pub mod models;
pub mod services;

use std::io;
use std::io::Write;
use std::process;
use std::sync::Arc;

use failure::Error as FailureError;

pub use crate::config::Config;

use crate::backoff::TokioSleeper;
use crate::http::{ClientHandle, HttpClient};
use crate::microservice::{SupabaseMicroserviceImpl, WarehousesMicroserviceImpl};
use crate::services::sync::{ReplaceReport, SyncServiceImpl};

/// Wires the real clients together and runs one sync, writing the progress lines to `out`.
pub async fn run<W: Write>(config: &Config, out: &mut W) -> Result<ReplaceReport, FailureError> {
    info!("Syncing {}", config);

    let http_client = ClientHandle::new(config.wb.timeout());
    let warehouses_microservice = WarehousesMicroserviceImpl::new(http_client.cloned(), Arc::new(TokioSleeper), &config.wb)?;
    let supabase_microservice = SupabaseMicroserviceImpl::new(http_client.cloned(), &config.supabase)?;
    let service = SyncServiceImpl::new(
        Arc::new(warehouses_microservice),
        Arc::new(supabase_microservice),
        config.supabase.batch_size,
    );

    services::sync::run(&service, out).await
}

/// Runs the sync from provided `Config` and exits the process with 1 on any failure.
pub fn start(config: Config) {
    // Prepare logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = config.validate() {
        fail(&e);
    }

    // Prepare reactor
    let core = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| fail(&e.into()));

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = core.block_on(run(&config, &mut out)) {
        fail(&e);
    }
}

/// Reports a fatal error on stderr and terminates.
pub fn fail(e: &FailureError) -> ! {
    debug!("{:?}", e);
    eprintln!("ERROR: {}", errors::diagnostic(e));
    process::exit(1);
}
