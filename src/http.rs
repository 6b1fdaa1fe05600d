use std::time::Duration;

use failure::{Error, Fail};
use futures::future::BoxFuture;
use futures::FutureExt;
use hyper::client::HttpConnector;
use hyper::header::HeaderMap;
use hyper::{Body, Client, Method, Request, StatusCode};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use serde::de::Deserialize;

use crate::errors::Error as ErrorKind;

pub type ResponseFuture = BoxFuture<'static, Result<Response, Error>>;

#[derive(Clone, Debug)]
pub struct Response {
    pub status: StatusCode,
    pub body: String,
}

pub trait HttpClient: Send + Sync {
    fn cloned(&self) -> Box<dyn HttpClient>;

    fn request(&self, method: Method, url: String, body: Option<String>, headers: Option<HeaderMap>) -> ResponseFuture;

    fn get(&self, url: String, headers: Option<HeaderMap>) -> ResponseFuture {
        self.request(Method::GET, url, None, headers)
    }

    fn post(&self, url: String, body: Option<String>, headers: Option<HeaderMap>) -> ResponseFuture {
        self.request(Method::POST, url, body, headers)
    }

    fn delete(&self, url: String, headers: Option<HeaderMap>) -> ResponseFuture {
        self.request(Method::DELETE, url, None, headers)
    }

    /// Returns a client that sends `headers` with every request.
    fn with_headers(&self, headers: HeaderMap) -> Box<dyn HttpClient> {
        Box::new(HttpClientWithDefaultHeaders::new(self.cloned(), headers))
    }
}

pub struct HttpClientWithDefaultHeaders<S: HttpClient> {
    inner: S,
    headers: HeaderMap,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn parse<T: for<'a> Deserialize<'a> + 'static + Send>(&self) -> Result<T, Error> {
        let response = &self.body;
        if response.is_empty() {
            serde_json::from_value(serde_json::Value::Null)
        } else {
            serde_json::from_str::<T>(&response)
        }
        .map_err(|e| e.context(ErrorKind::Parse).into())
    }
}

impl<S: HttpClient> HttpClientWithDefaultHeaders<S> {
    pub fn new(client: S, headers: HeaderMap) -> Self {
        Self { inner: client, headers }
    }
}

impl<S: HttpClient> HttpClient for HttpClientWithDefaultHeaders<S> {
    fn request(&self, method: Method, url: String, body: Option<String>, headers: Option<HeaderMap>) -> ResponseFuture {
        let mut existing_headers = self.headers.clone();
        if let Some(headers) = headers {
            existing_headers.extend(headers);
        }
        self.inner.request(method, url, body, Some(existing_headers))
    }

    fn cloned(&self) -> Box<dyn HttpClient> {
        Box::new(HttpClientWithDefaultHeaders::new(self.inner.cloned(), self.headers.clone()))
    }
}

/// Hyper client over rustls. Every request, body included, must finish within `timeout`.
#[derive(Clone)]
pub struct ClientHandle {
    client: Client<HttpsConnector<HttpConnector>>,
    timeout: Duration,
}

impl ClientHandle {
    pub fn new(timeout: Duration) -> Self {
        let https = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            client: Client::builder().build::<_, Body>(https),
            timeout,
        }
    }

    async fn timed_request(
        client: Client<HttpsConnector<HttpConnector>>,
        timeout: Duration,
        method: Method,
        url: String,
        body: Option<String>,
        headers: Option<HeaderMap>,
    ) -> Result<Response, Error> {
        let request = Self::simple_request(client, method, url.clone(), body, headers);
        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result.map_err(|e| e.context(ErrorKind::HttpClient).into()),
            Err(_) => Err(format_err!("Request to {} timed out after {:?}", url, timeout)
                .context(ErrorKind::HttpClient)
                .into()),
        }
    }

    async fn simple_request(
        client: Client<HttpsConnector<HttpConnector>>,
        method: Method,
        url: String,
        body: Option<String>,
        headers: Option<HeaderMap>,
    ) -> Result<Response, Error> {
        let mut request = Request::builder()
            .method(method)
            .uri(url.as_str())
            .body(body.map(Body::from).unwrap_or_else(Body::empty))?;
        if let Some(headers) = headers {
            request.headers_mut().extend(headers);
        }

        let response = client.request(request).await?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await?;
        let body = String::from_utf8_lossy(&bytes).into_owned();
        trace!("{} <- {}", status, url);

        Ok(Response { status, body })
    }
}

impl HttpClient for ClientHandle {
    fn request(&self, method: Method, url: String, body: Option<String>, headers: Option<HeaderMap>) -> ResponseFuture {
        debug!("{} {}", method, url);
        Self::timed_request(self.client.clone(), self.timeout, method, url, body, headers).boxed()
    }

    fn cloned(&self) -> Box<dyn HttpClient> {
        Box::new(Clone::clone(self))
    }
}

impl HttpClient for Box<dyn HttpClient> {
    fn request(&self, method: Method, url: String, body: Option<String>, headers: Option<HeaderMap>) -> ResponseFuture {
        (**self).request(method, url, body, headers)
    }

    fn cloned(&self) -> Box<dyn HttpClient> {
        (**self).cloned()
    }
}

#[cfg(test)]
pub mod mock {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use futures::future;

    use super::*;

    #[derive(Clone, Debug)]
    pub struct RecordedRequest {
        pub method: Method,
        pub url: String,
        pub body: Option<String>,
        pub headers: HeaderMap,
    }

    /// Answers requests from a queue of canned responses and remembers what was asked.
    #[derive(Clone, Default)]
    pub struct MockHttpClient {
        responses: Arc<Mutex<VecDeque<Result<Response, String>>>>,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl MockHttpClient {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, status: u16, body: &str) -> &Self {
            let status = StatusCode::from_u16(status).unwrap();
            self.responses.lock().unwrap().push_back(Ok(Response {
                status,
                body: body.to_string(),
            }));
            self
        }

        pub fn fail(&self, message: &str) -> &Self {
            self.responses.lock().unwrap().push_back(Err(message.to_string()));
            self
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl HttpClient for MockHttpClient {
        fn request(&self, method: Method, url: String, body: Option<String>, headers: Option<HeaderMap>) -> ResponseFuture {
            self.requests.lock().unwrap().push(RecordedRequest {
                method,
                url,
                body,
                headers: headers.unwrap_or_default(),
            });
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no canned response left");
            let result: Result<Response, Error> = next.map_err(|message| format_err!("{}", message).context(ErrorKind::HttpClient).into());
            future::ready(result).boxed()
        }

        fn cloned(&self) -> Box<dyn HttpClient> {
            Box::new(self.clone())
        }
    }

    #[tokio::test]
    async fn default_headers_are_merged() {
        let mock = MockHttpClient::new();
        mock.respond(200, "[]");

        let mut defaults = HeaderMap::new();
        defaults.insert("authorization", "token".parse().unwrap());
        defaults.insert("x-scope", "default".parse().unwrap());
        let client = mock.with_headers(defaults);

        let mut extra = HeaderMap::new();
        extra.insert("x-scope", "request".parse().unwrap());
        client.get("http://localhost/items".to_string(), Some(extra)).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].headers["authorization"], "token");
        assert_eq!(requests[0].headers["x-scope"], "request");
    }

    #[tokio::test]
    async fn cloned_wrapper_keeps_default_headers() {
        let mock = MockHttpClient::new();
        mock.respond(204, "");

        let mut defaults = HeaderMap::new();
        defaults.insert("apikey", "key".parse().unwrap());
        let client = HttpClientWithDefaultHeaders::new(mock.clone(), defaults).cloned();

        client.delete("http://localhost/items".to_string(), None).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].method, Method::DELETE);
        assert_eq!(requests[0].headers["apikey"], "key");
    }

    #[test]
    fn parse_reports_parse_errors() {
        let response = Response {
            status: StatusCode::OK,
            body: "not json".to_string(),
        };
        let e = response.parse::<serde_json::Value>().unwrap_err();
        match crate::errors::error_kind(&e) {
            Some(ErrorKind::Parse) => {}
            other => panic!("unexpected kind: {:?}", other),
        }
    }
}
