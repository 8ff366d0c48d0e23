//! Common utilities for the AWS gateway
//!
//! Provides the HTTP wrapper shared by every API family and the error
//! classification applied to every non-2xx response.

use crate::error::EksError;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Header carrying the AWS error code on REST responses.
pub const ERROR_TYPE_HEADER: &str = "x-amzn-ErrorType";

/// Header selecting the operation on JSON-protocol services.
pub const TARGET_HEADER: &str = "X-Amz-Target";

const JSON_PROTOCOL_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// HTTP client wrapper
///
/// Requests go to a signing endpoint that adds SigV4 credentials and forwards
/// them to the regional service, so this layer only deals in JSON.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    region: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, region: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            region,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Region requests are signed for
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Make a GET request against a REST service
    pub async fn get<T: DeserializeOwned>(&self, service: &str, path: &str) -> Result<T, EksError> {
        let url = self.build_url(&format!("/{service}{path}"));
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .header("X-Amz-Region", &self.region)
            .send()
            .await?;
        Self::decode(response, path).await
    }

    /// Make a POST request against a REST service
    pub async fn post<T: DeserializeOwned>(
        &self,
        service: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, EksError> {
        let url = self.build_url(&format!("/{service}{path}"));
        debug!("POST {} with body: {}", url, body);

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header("X-Amz-Region", &self.region)
            .json(body)
            .send()
            .await?;
        Self::decode(response, path).await
    }

    /// Make a DELETE request against a REST service
    pub async fn delete<T: DeserializeOwned>(&self, service: &str, path: &str) -> Result<T, EksError> {
        let url = self.build_url(&format!("/{service}{path}"));
        debug!("DELETE {}", url);

        let response = self
            .client
            .delete(&url)
            .header("Accept", "application/json")
            .header("X-Amz-Region", &self.region)
            .send()
            .await?;
        Self::decode(response, path).await
    }

    /// Invoke an operation on a JSON-protocol service (IAM, ELB, EC2, tagging)
    pub async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        target: &str,
        body: &serde_json::Value,
    ) -> Result<T, EksError> {
        let url = self.build_url(&format!("/{service}"));
        debug!("POST {} {}", url, target);

        let response = self
            .client
            .post(&url)
            .header("Content-Type", JSON_PROTOCOL_CONTENT_TYPE)
            .header(TARGET_HEADER, target)
            .header("X-Amz-Region", &self.region)
            .json(body)
            .send()
            .await?;
        Self::decode(response, target).await
    }

    /// Fetch every page of an EKS list call, following `nextToken`
    pub async fn fetch_all_pages(&self, service: &str, path: &str, field: &str) -> Result<Vec<String>, EksError> {
        let mut all_results = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page_path = match &next_token {
                Some(token) => format!("{path}?nextToken={}", urlencoding::encode(token)),
                None => path.to_string(),
            };
            debug!("Fetching page: {}", page_path);

            let page: serde_json::Value = self.get(service, &page_path).await?;
            if let Some(items) = page.get(field).and_then(|v| v.as_array()) {
                all_results.extend(items.iter().filter_map(|v| v.as_str().map(String::from)));
            }

            match page.get("nextToken").and_then(|v| v.as_str()) {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(all_results)
    }

    async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, EksError> {
        let status = response.status();
        let error_type = response
            .headers()
            .get(ERROR_TYPE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = response.text().await?;

        if !status.is_success() {
            debug!("{} failed: {} - {}", what, status, body);
            return Err(classify_error(status, error_type.as_deref(), &body));
        }

        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body).map_err(EksError::Serialization)
    }
}

/// Strip the namespace and suffix AWS adds around error codes.
///
/// `aws.protocols#ThrottlingException` and `ThrottlingException:http://..`
/// both become `ThrottlingException`.
fn normalize_code(raw: &str) -> &str {
    let code = raw.rsplit('#').next().unwrap_or(raw);
    code.split(':').next().unwrap_or(code).trim()
}

/// Classify a failed response into the gateway error taxonomy.
pub fn classify_error(status: StatusCode, error_type: Option<&str>, body: &str) -> EksError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let field = |names: &[&str]| -> Option<String> {
        let value = parsed.as_ref()?;
        names
            .iter()
            .find_map(|n| value.get(*n).and_then(|v| v.as_str()).map(String::from))
    };

    let code = error_type
        .map(String::from)
        .or_else(|| field(&["__type", "code", "Code"]))
        .map(|c| normalize_code(&c).to_string())
        .unwrap_or_default();
    let message = field(&["message", "Message"]).unwrap_or_else(|| {
        if body.is_empty() {
            status.to_string()
        } else {
            body.to_string()
        }
    });

    match code.as_str() {
        "ThrottlingException" | "Throttling" | "TooManyRequestsException" | "RequestLimitExceeded" => {
            return EksError::Throttling(message);
        }
        "ServiceUnavailableException" | "ServerException" | "InternalFailure" => {
            return EksError::Unavailable(message);
        }
        "ResourceInUseException" | "DependencyViolation" | "ResourceInUse" => {
            return EksError::ResourceInUse(message);
        }
        "ResourceNotFoundException"
        | "NoSuchEntity"
        | "LoadBalancerNotFound"
        | "AccessPointNotFound"
        | "TargetGroupNotFound"
        | "InvalidGroup.NotFound" => return EksError::NotFound(message),
        "AccessDeniedException" | "UnrecognizedClientException" | "InvalidClientTokenId" => {
            return EksError::Authentication(message);
        }
        _ => {}
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => EksError::Throttling(message),
        StatusCode::NOT_FOUND => EksError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EksError::Authentication(message),
        s if s.is_server_error() => EksError::Unavailable(message),
        _ => EksError::NonRetryable {
            code: if code.is_empty() { status.to_string() } else { code },
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_header() {
        let err = classify_error(
            StatusCode::BAD_REQUEST,
            Some("ThrottlingException:http://internal.amazon.com/coral/"),
            r#"{"message":"Rate exceeded"}"#,
        );
        assert!(matches!(err, EksError::Throttling(ref m) if m == "Rate exceeded"));
    }

    #[test]
    fn test_classify_by_body_type() {
        let body = r#"{"__type":"com.amazonaws.eks#ResourceNotFoundException","message":"No cluster found for name: c1."}"#;
        assert!(classify_error(StatusCode::BAD_REQUEST, None, body).is_not_found());

        let body = r#"{"__type":"ResourceInUseException","message":"Cluster already exists with name: c1"}"#;
        let err = classify_error(StatusCode::CONFLICT, None, body);
        assert!(err.is_resource_in_use());
        assert!(err.on_create().is_conflict());
    }

    #[test]
    fn test_classify_non_retryable() {
        let body = r#"{"__type":"InvalidParameterException","message":"unsupported Kubernetes version 1.10"}"#;
        match classify_error(StatusCode::BAD_REQUEST, None, body) {
            EksError::NonRetryable { code, message } => {
                assert_eq!(code, "InvalidParameterException");
                assert_eq!(message, "unsupported Kubernetes version 1.10");
            }
            other => panic!("unexpected {other:?}"),
        }
        let body = r#"{"__type":"UnsupportedAvailabilityZoneException","message":"no capacity"}"#;
        assert!(classify_error(StatusCode::BAD_REQUEST, None, body).is_non_retryable());
    }

    #[test]
    fn test_classify_by_status() {
        assert!(matches!(classify_error(StatusCode::TOO_MANY_REQUESTS, None, ""), EksError::Throttling(_)));
        assert!(classify_error(StatusCode::SERVICE_UNAVAILABLE, None, "").is_transient());
        assert!(classify_error(StatusCode::NOT_FOUND, None, "").is_not_found());
        assert!(matches!(classify_error(StatusCode::FORBIDDEN, None, ""), EksError::Authentication(_)));
        assert!(classify_error(StatusCode::UNPROCESSABLE_ENTITY, None, "oops").is_non_retryable());
    }

    #[test]
    fn test_dependency_violation_is_in_use() {
        let body = r#"{"Code":"DependencyViolation","Message":"resource sg-123 has a dependent object"}"#;
        assert!(classify_error(StatusCode::BAD_REQUEST, None, body).is_resource_in_use());
    }
}
