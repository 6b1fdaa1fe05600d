use std::sync::Arc;

use failure::{Error, Fail};
use futures::FutureExt;
use hyper::header::{HeaderMap, AUTHORIZATION};
use hyper::StatusCode;
use serde_json::{self, Value};

use super::{secret_header, ApiFuture};

use crate::backoff::{Backoff, Sleeper};
use crate::config;
use crate::errors::Error as ErrorKind;
use crate::http::HttpClient;
use crate::models::*;

pub trait WarehousesMicroservice: Send + Sync {
    /// Fetches and normalizes the full warehouse list, retrying while rate limited.
    fn fetch_warehouses(&self) -> ApiFuture<Vec<Warehouse>>;
}

pub struct WarehousesMicroserviceImpl {
    http_client: Box<dyn HttpClient>,
    sleeper: Arc<dyn Sleeper>,
    api_url: String,
    backoff: Backoff,
}

impl WarehousesMicroservice for WarehousesMicroserviceImpl {
    fn fetch_warehouses(&self) -> ApiFuture<Vec<Warehouse>> {
        fetch_with_backoff(
            self.http_client.cloned(),
            self.sleeper.clone(),
            self.api_url.clone(),
            self.backoff.clone(),
        )
        .boxed()
    }
}

impl WarehousesMicroserviceImpl {
    pub fn new(http_client: Box<dyn HttpClient>, sleeper: Arc<dyn Sleeper>, config: &config::WbConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, secret_header(&config.token)?);

        Ok(Self {
            http_client: http_client.with_headers(headers),
            sleeper,
            api_url: config.api_url.clone(),
            backoff: Backoff::new(config.backoff()),
        })
    }
}

async fn fetch_with_backoff(
    http_client: Box<dyn HttpClient>,
    sleeper: Arc<dyn Sleeper>,
    url: String,
    backoff: Backoff,
) -> Result<Vec<Warehouse>, Error> {
    let mut attempt = 0;
    while let Some(wait) = backoff.wait(attempt) {
        if !wait.is_zero() {
            debug!("Waiting {:?} before attempt {}", wait, attempt + 1);
            sleeper.sleep(wait).await;
        }

        let response = http_client.get(url.clone(), None).await?;
        match response.status {
            StatusCode::OK => return normalize(&response.body, response.parse::<Value>()?),
            StatusCode::TOO_MANY_REQUESTS if !backoff.is_last(attempt) => {
                warn!("WB API rate limited attempt {} of {}", attempt + 1, backoff.attempts());
                attempt += 1;
            }
            StatusCode::TOO_MANY_REQUESTS => break,
            status => {
                return Err(ErrorKind::Upstream {
                    status: status.as_u16(),
                    body: response.body,
                }.into())
            }
        }
    }

    Err(ErrorKind::RateLimited(backoff.attempts()).into())
}

fn normalize(body: &str, data: Value) -> Result<Vec<Warehouse>, Error> {
    let rows = match data {
        Value::Array(rows) => rows,
        _ => return Err(ErrorKind::UnexpectedResponse(body.to_string()).into()),
    };

    rows.into_iter()
        .map(|row| -> Result<Warehouse, Error> {
            if !row.is_object() {
                return Err(ErrorKind::UnexpectedResponse(row.to_string()).into());
            }
            let raw = serde_json::from_value::<RawWarehouse>(row).map_err(|e| e.context(ErrorKind::Parse))?;
            Ok(Warehouse::from(raw))
        })
        .collect()
}
