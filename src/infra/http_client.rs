use crate::app::ports::{HttpClientPort, HttpGetRequest, HttpGetResult, TransportError};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }
}

fn transport_error(e: reqwest::Error, request: &HttpGetRequest) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(request.timeout)
    } else if e.is_builder() {
        TransportError::InvalidRequest(e.to_string())
    } else {
        TransportError::Network { message: e.to_string(), source: Some(Box::new(e)) }
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn get(&self, request: &HttpGetRequest) -> Result<HttpGetResult, TransportError> {
        tracing::debug!("HTTP GET request to: {}", request.url);
        let resp = self
            .client
            .get(&request.url)
            .query(&request.query)
            .header(AUTHORIZATION, format!("Bearer {}", request.bearer_token))
            .header(ACCEPT, "application/json")
            .timeout(request.timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, request))?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        // buffer the whole body inside the attempt; a failure here is retried like any other
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| transport_error(e, request))?
            .to_vec();
        tracing::debug!("HTTP response: status={}, size={} bytes", status, bytes.len());
        Ok(HttpGetResult { status, bytes, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: String, timeout: Duration) -> HttpGetRequest {
        HttpGetRequest {
            url,
            query: BTreeMap::from([("since".to_string(), "2024-01-01".to_string())]),
            bearer_token: "tok".into(),
            timeout,
        }
    }

    #[tokio::test]
    async fn sends_bearer_token_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/items"))
            .and(query_param("since", "2024-01-01"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("[1]", "application/json"))
            .mount(&server)
            .await;

        let http = ReqwestHttp::new("raw_ingest-test").unwrap();
        let resp = http
            .get(&request(format!("{}/v1/items", server.uri()), Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.bytes, b"[1]");
        assert_eq!(resp.content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let http = ReqwestHttp::new("raw_ingest-test").unwrap();
        let err = http
            .get(&request(server.uri(), Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn non_2xx_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let http = ReqwestHttp::new("raw_ingest-test").unwrap();
        let resp = http.get(&request(server.uri(), Duration::from_secs(5))).await.unwrap();
        assert_eq!(resp.status, 503);
    }
}
