use failure::Error;
use futures::FutureExt;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json;

use super::{secret_header, ApiFuture};

use crate::config;
use crate::errors::Error as ErrorKind;
use crate::http::{HttpClient, ResponseFuture};
use crate::models::*;

/// PostgREST access to the destination table.
pub trait SupabaseMicroservice: Send + Sync {
    /// Deletes every row whose `column` is at least `min`. PostgREST refuses to
    /// delete without a filter, so clearing a table goes through this.
    fn delete_gte(&self, column: &str, min: i64) -> ApiFuture<()>;
    fn insert(&self, rows: &[Warehouse]) -> ApiFuture<()>;
}

pub struct SupabaseMicroserviceImpl {
    http_client: Box<dyn HttpClient>,
    table_url: String,
    schema: String,
}

impl SupabaseMicroservice for SupabaseMicroserviceImpl {
    fn delete_gte(&self, column: &str, min: i64) -> ApiFuture<()> {
        let url = format!("{}?{}=gte.{}", self.table_url, column, min);
        let request = self.profile_headers().map(|headers| self.http_client.delete(url, Some(headers)));
        execute(request).boxed()
    }

    fn insert(&self, rows: &[Warehouse]) -> ApiFuture<()> {
        debug!("Inserting {} rows into {}", rows.len(), self.table_url);
        let request = serde_json::to_string(rows)
            .map_err(From::from)
            .and_then(|body| -> Result<ResponseFuture, Error> {
                let mut headers = self.profile_headers()?;
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                Ok(self.http_client.post(self.table_url.clone(), Some(body), Some(headers)))
            });
        execute(request).boxed()
    }
}

impl SupabaseMicroserviceImpl {
    pub fn new(http_client: Box<dyn HttpClient>, config: &config::SupabaseConfig) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("apikey"), secret_header(&config.service_key)?);
        headers.insert(AUTHORIZATION, secret_header(&format!("Bearer {}", config.service_key))?);
        headers.insert(HeaderName::from_static("prefer"), HeaderValue::from_static("return=minimal"));

        Ok(Self {
            http_client: http_client.with_headers(headers),
            table_url: format!("{}/rest/v1/{}", config.url.trim_end_matches('/'), config.table),
            schema: config.schema.clone(),
        })
    }

    fn profile_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(HeaderName::from_static("content-profile"), HeaderValue::from_str(&self.schema)?);
        Ok(headers)
    }
}

async fn execute(request: Result<ResponseFuture, Error>) -> Result<(), Error> {
    let response = request?.await.map_err(|e| e.context(ErrorKind::Persistence))?;
    if response.is_success() {
        Ok(())
    } else {
        Err(format_err!("Supabase {}: {}", response.status, response.body)
            .context(ErrorKind::Persistence)
            .into())
    }
}

#[cfg(test)]
mod tests {
    use hyper::Method;
    use serde_json::Value;

    use super::*;
    use crate::config::Config;
    use crate::errors::error_kind;
    use crate::http::mock::MockHttpClient;

    fn microservice(mock: &MockHttpClient) -> SupabaseMicroserviceImpl {
        let config = Config::with_lookup(|name| match name {
            "SUPABASE_URL" => Some("https://project.supabase.co/".to_string()),
            "SUPABASE_SERVICE_KEY" => Some("service-key".to_string()),
            "SUPABASE_SCHEMA" => Some("wb".to_string()),
            _ => None,
        }).unwrap();
        SupabaseMicroserviceImpl::new(Box::new(mock.clone()), &config.supabase).unwrap()
    }

    fn warehouse(id: i64) -> Warehouse {
        Warehouse::from(RawWarehouse {
            id: Some(json!(id)),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn delete_filters_every_row() {
        let mock = MockHttpClient::new();
        mock.respond(204, "");

        microservice(&mock).delete_gte("id", 0).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].url, "https://project.supabase.co/rest/v1/fbw_warehouses?id=gte.0");
        assert_eq!(requests[0].headers["apikey"], "service-key");
        assert_eq!(requests[0].headers[AUTHORIZATION], "Bearer service-key");
        assert_eq!(requests[0].headers["content-profile"], "wb");
        assert_eq!(requests[0].headers["prefer"], "return=minimal");
    }

    #[tokio::test]
    async fn insert_posts_json_array() {
        let mock = MockHttpClient::new();
        mock.respond(201, "");

        microservice(&mock).insert(&[warehouse(1), warehouse(2)]).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::POST);
        assert_eq!(requests[0].url, "https://project.supabase.co/rest/v1/fbw_warehouses");
        assert_eq!(requests[0].headers[CONTENT_TYPE], "application/json");
        assert_eq!(requests[0].headers["content-profile"], "wb");

        let body: Value = serde_json::from_str(requests[0].body.as_ref().unwrap()).unwrap();
        let rows = body.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["id"], json!(2));
        assert_eq!(rows[1]["accepts_qr"], Value::Null);
        assert_eq!(rows[1].as_object().unwrap().len(), 7);
    }

    #[tokio::test]
    async fn error_status_is_a_persistence_error() {
        let mock = MockHttpClient::new();
        mock.respond(409, r#"{"message":"duplicate key value"}"#);

        let e = microservice(&mock).insert(&[warehouse(1)]).await.unwrap_err();

        match error_kind(&e) {
            Some(ErrorKind::Persistence) => {}
            other => panic!("unexpected kind: {:?}", other),
        }
        assert!(crate::errors::diagnostic(&e).contains("duplicate key value"));
    }

    #[tokio::test]
    async fn transport_error_is_a_persistence_error() {
        let mock = MockHttpClient::new();
        mock.fail("connection reset");

        let e = microservice(&mock).delete_gte("id", 0).await.unwrap_err();

        match error_kind(&e) {
            Some(ErrorKind::Persistence) => {}
            other => panic!("unexpected kind: {:?}", other),
        }
    }
}
