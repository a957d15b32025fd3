//! Response plumbing shared by the vendor adapters.
use base64::{engine::general_purpose, Engine as _};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::error::{truncate, AppError, AppResult, MAX_DETAIL_CHARS};
use crate::models::GeneratedImage;

/// Pass 2xx responses through; turn anything else into `VendorRejected`
/// carrying the vendor's raw body.
pub async fn ensure_success(vendor: &str, response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string());
    tracing::error!(
        vendor,
        status = status.as_u16(),
        body = %truncate(&body, MAX_DETAIL_CHARS),
        "vendor rejected request"
    );
    Err(AppError::VendorRejected { status: status.as_u16(), body })
}

/// Decode a successful JSON response. The body is read as text first so a
/// shape we cannot parse is reported together with what the vendor sent.
pub async fn read_json<T: DeserializeOwned>(vendor: &str, response: Response) -> AppResult<T> {
    let body = response.text().await?;
    parse_json(vendor, &body)
}

pub(crate) fn parse_json<T: DeserializeOwned>(vendor: &str, body: &str) -> AppResult<T> {
    serde_json::from_str(body).map_err(|e| {
        let dump = truncate(body, MAX_DETAIL_CHARS);
        tracing::error!(vendor, error = %e, body = %dump, "unexpected vendor response shape");
        AppError::MalformedResponse(format!("{}: {}", e, dump))
    })
}

pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// The response's `content-type` when it names an image, else `fallback`.
pub fn image_mime(headers: &HeaderMap, fallback: &str) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim())
        .filter(|v| v.starts_with("image/"))
        .unwrap_or(fallback)
        .to_string()
}

/// Read a successful raw-bytes response into a `data:` URI.
pub async fn read_image(response: Response, fallback_mime: &str) -> AppResult<String> {
    let mime = image_mime(response.headers(), fallback_mime);
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
        return Err(AppError::MalformedResponse("vendor returned an empty image body".to_string()));
    }
    Ok(data_uri(&mime, &bytes))
}

/// Download a hosted image and inline it.
pub async fn fetch_as_data_uri(client: &Client, url: &str, fallback_mime: &str) -> AppResult<String> {
    tracing::debug!(url, "fetching generated image for inlining");
    let response = client.get(url).send().await?;
    let response = ensure_success("image host", response).await?;
    read_image(response, fallback_mime).await
}

/// Final step for URL-returning vendors.
pub async fn resolve_output(client: &Client, url: &str, embed: bool) -> AppResult<GeneratedImage> {
    let image_url = if embed {
        fetch_as_data_uri(client, url, "image/png").await?
    } else {
        url.to_string()
    };
    Ok(GeneratedImage { image_url })
}

pub fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn encodes_data_uri() {
        assert_eq!(data_uri("image/jpeg", b"abc"), "data:image/jpeg;base64,YWJj");
    }

    #[test]
    fn mime_falls_back_for_non_images() {
        let mut headers = HeaderMap::new();
        assert_eq!(image_mime(&headers, "image/jpeg"), "image/jpeg");
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert_eq!(image_mime(&headers, "image/jpeg"), "image/jpeg");
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/webp; charset=binary"));
        assert_eq!(image_mime(&headers, "image/jpeg"), "image/webp");
    }

    #[test]
    fn unparsable_json_keeps_the_body() {
        let err = parse_json::<serde_json::Value>("modelslab", "<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, AppError::MalformedResponse(_)));
        assert!(err.to_string().contains("<html>maintenance</html>"));
    }

    #[test]
    fn wrong_shape_keeps_the_body() {
        #[derive(Debug, serde::Deserialize)]
        struct Job {
            #[allow(dead_code)]
            status: String,
        }
        let err = parse_json::<Job>("replicate", r#"{"id":"p-1","state":"odd"}"#).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("missing field `status`"));
        assert!(text.contains(r#""state":"odd""#));
    }

    #[test]
    fn joins_without_double_slashes() {
        assert_eq!(join_url("https://api.example/", "/v1/x"), "https://api.example/v1/x");
        assert_eq!(join_url("https://api.example", "v1/x"), "https://api.example/v1/x");
    }
}
