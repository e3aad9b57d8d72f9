use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part as FormPart};
use serde_json::Value;
use tracing::trace;

use super::{Body, Method, PartValue, Request, Response, Transport};
use crate::config::Opts;
use crate::error::Error;
use crate::errors::NetworkError;

/// [`Transport`] over HTTP
///
/// The session cookie set by the login endpoint is kept by the underlying
/// client and sent with every following request.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(opts: &Opts) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(opts.get_request_timeout())
            .build()
            .context("failed to create HTTP client")
            .map_err(Error::internal)?;

        Ok(Self {
            client,
            base_url: opts.get_base_url().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn form(parts: Vec<super::Part>) -> Result<Form, Error> {
    let mut form = Form::new();
    for part in parts {
        form = match part.value {
            PartValue::Text(text) => form.text(part.name, text),
            PartValue::File(upload) => {
                let file = FormPart::bytes(upload.bytes)
                    .file_name(upload.file_name)
                    .mime_str(&upload.content_type)
                    .with_context(|| format!("invalid content type for '{}'", part.name))
                    .map_err(Error::internal)?;
                form.part(part.name, file)
            }
        };
    }
    Ok(form)
}

/// Read the response body as JSON, falling back to plain text
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        let url = self.url(&request.path);
        trace!(method = %request.method, %url, "sending request");

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        let builder = if request.query.is_empty() {
            builder
        } else {
            builder.query(&request.query)
        };
        let builder = match request.body {
            Body::Empty => builder,
            Body::Json(body) => builder.json(&body),
            Body::Multipart(parts) => builder.multipart(form(parts)?),
        };

        let response = builder.send().await.map_err(NetworkError::new)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(NetworkError::new)?;

        Ok(Response {
            status,
            body: parse_body(&bytes),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn it_joins_paths_to_the_base_url() {
        let transport =
            HttpTransport::new(&Opts::default().base_url("http://localhost:5000/api/v1/"))
                .unwrap();
        assert_eq!(
            transport.url("/posts/p1"),
            "http://localhost:5000/api/v1/posts/p1"
        );
        assert_eq!(transport.url("posts"), "http://localhost:5000/api/v1/posts");
    }

    #[test]
    fn it_reads_json_text_or_nothing() {
        assert_eq!(parse_body(b""), Value::Null);
        assert_eq!(parse_body(br#"{"message":"ok"}"#), json!({"message": "ok"}));
        assert_eq!(parse_body(b"Not Found"), json!("Not Found"));
    }

    #[tokio::test]
    async fn it_fails_with_a_network_error_when_unreachable() {
        // nothing listens on the discard port
        let transport = HttpTransport::new(
            &Opts::default()
                .base_url("http://127.0.0.1:9")
                .request_timeout(std::time::Duration::from_secs(2)),
        )
        .unwrap();
        let err = transport
            .send(Request::new(Method::Get, "/posts"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
