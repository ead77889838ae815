//! Conversions between hyper messages and exchanges.

use crate::exchange::{ExchangeResponse, Headers, InterceptedExchange};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::http::{HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};
use tracing::warn;

/// Convert a committed response for the network collaborator.
///
/// Headers hyper rejects are dropped with a warning. `content-length` is
/// always recomputed from the body.
pub fn into_hyper(response: &ExchangeResponse) -> Response<Full<Bytes>> {
    let mut out = Response::new(Full::new(response.body.clone()));
    *out.status_mut() =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let headers = out.headers_mut();
    for (name, value) in response.headers.iter() {
        if name.eq_ignore_ascii_case("content-length")
            || name.eq_ignore_ascii_case("transfer-encoding")
        {
            continue;
        }
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid response header"),
        }
    }
    headers.insert(
        hyper::header::CONTENT_LENGTH,
        HeaderValue::from(response.body.len()),
    );
    out
}

/// Read a hyper request into a fresh exchange.
///
/// Origin-form URIs are made absolute from the `Host` header, assuming `http`.
pub async fn exchange_from_request<B>(request: Request<B>) -> Result<InterceptedExchange, B::Error>
where
    B: Body,
{
    let (parts, body) = request.into_parts();
    let body = body.collect().await?.to_bytes();

    let url = match (parts.uri.scheme_str(), parts.uri.authority()) {
        (Some(_), Some(_)) => parts.uri.to_string(),
        _ => {
            let host = parts
                .headers
                .get(hyper::header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("localhost");
            let path = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            format!("http://{host}{path}")
        }
    };

    let headers: Headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Ok(InterceptedExchange::new(parts.method.as_str(), url)
        .with_headers(headers)
        .with_body(body))
}

/// Read an upstream hyper response into an [`ExchangeResponse`].
pub async fn response_from_hyper<B>(response: Response<B>) -> Result<ExchangeResponse, B::Error>
where
    B: Body,
{
    let (parts, body) = response.into_parts();
    let body = body.collect().await?.to_bytes();
    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    Ok(ExchangeResponse {
        status: parts.status.as_u16(),
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ResponseBuilder;

    #[test]
    fn test_into_hyper_sets_length_and_headers() {
        let response = ResponseBuilder::new(201)
            .header("X-Mock", "yes")
            .header("Content-Length", "999")
            .body(r#"{"ok":true}"#)
            .build();
        let hyper_response = into_hyper(&response);
        assert_eq!(hyper_response.status(), StatusCode::CREATED);
        assert_eq!(hyper_response.headers().get("x-mock").unwrap(), "yes");
        assert_eq!(
            hyper_response.headers().get("content-length").unwrap(),
            "11"
        );
        assert_eq!(
            hyper_response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_into_hyper_drops_invalid_header_names() {
        let response = ResponseBuilder::new(200)
            .header("bad header", "x")
            .header("ok", "y")
            .build();
        let hyper_response = into_hyper(&response);
        assert!(hyper_response.headers().get("ok").is_some());
        assert_eq!(hyper_response.headers().len(), 2);
    }

    #[test]
    fn test_unknown_status_becomes_500() {
        let response = ResponseBuilder::new(1000).build();
        assert_eq!(into_hyper(&response).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_exchange_from_origin_form_request() {
        let request = Request::builder()
            .method("post")
            .uri("/v1.0/me?$select=id")
            .header("Host", "api.test")
            .header("Authorization", "Bearer abc")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap();
        let exchange = exchange_from_request(request).await.unwrap();
        assert_eq!(exchange.method(), "POST");
        assert_eq!(exchange.url(), "http://api.test/v1.0/me?$select=id");
        assert_eq!(
            exchange.request().headers.get("authorization"),
            Some("Bearer abc")
        );
        assert_eq!(exchange.request().body_str(), Some("{}"));
    }

    #[tokio::test]
    async fn test_exchange_from_absolute_request() {
        let request = Request::builder()
            .uri("https://api.test/items/1")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let exchange = exchange_from_request(request).await.unwrap();
        assert_eq!(exchange.url(), "https://api.test/items/1");
        assert_eq!(exchange.method(), "GET");
    }

    #[tokio::test]
    async fn test_response_from_hyper() {
        let upstream = Response::builder()
            .status(404)
            .header("x-upstream", "1")
            .body(Full::new(Bytes::from_static(b"missing")))
            .unwrap();
        let response = response_from_hyper(upstream).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.headers.get("X-Upstream"), Some("1"));
        assert_eq!(response.body_str(), Some("missing"));
    }
}
