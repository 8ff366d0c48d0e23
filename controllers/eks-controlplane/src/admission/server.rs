//! Admission webhook server.
//!
//! Serves the mutating (defaulting) and validating endpoints for
//! EKSControlPlane over TLS. Requests arrive as `AdmissionReview` documents
//! carrying untyped objects; they are decoded through the kind registry before
//! the pure defaulting and validation functions run.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use crds::{EksControlPlane, Registry};
use kube::core::DynamicObject;
use kube::core::admission::{
    AdmissionRequest, AdmissionResponse, AdmissionReview, ConvertAdmissionReviewError, Operation,
};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::{default, validate};
use crate::config::OperatorConfig;

/// Path of the defaulting endpoint
pub const MUTATE_PATH: &str = "/mutate-eks-controlplane";
/// Path of the validating endpoint
pub const VALIDATE_PATH: &str = "/validate-eks-controlplane";

/// Errors that can occur when serving admission requests
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The admission review was malformed
    #[error("invalid admission review: {0}")]
    InvalidReview(String),

    /// Certificates could not be loaded
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    /// The listener failed
    #[error("Webhook server error: {0}")]
    Server(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::InvalidReview(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({"error": self.to_string()}))).into_response()
    }
}

/// Shared state for webhook handlers
#[derive(Debug)]
pub struct WebhookState {
    registry: Arc<Registry>,
}

impl WebhookState {
    /// Create state decoding through `registry`
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(MUTATE_PATH, post(mutate_handler))
        .route(VALIDATE_PATH, post(validate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create a denial response with the reason embedded in the message.
fn deny_with_reason(request: &AdmissionRequest<DynamicObject>, message: &str, reason: &str) -> AdmissionResponse {
    AdmissionResponse::from(request).deny(format!("[{reason}] {message}"))
}

fn into_request(review: AdmissionReview<DynamicObject>) -> Result<AdmissionRequest<DynamicObject>, WebhookError> {
    review.try_into().map_err(|e: ConvertAdmissionReviewError| {
        error!(error = %e, "Failed to extract admission request");
        WebhookError::InvalidReview(e.to_string())
    })
}

async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let request = into_request(review)?;
    Ok(Json(mutate(&state, &request).into_review()))
}

async fn validate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Result<Json<AdmissionReview<DynamicObject>>, WebhookError> {
    let request = into_request(review)?;
    Ok(Json(admit(&state, &request).into_review()))
}

fn mutate(state: &WebhookState, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let uid = &request.uid;
    if request.operation == Operation::Delete {
        return AdmissionResponse::from(request);
    }
    let Some(obj) = &request.object else {
        debug!(uid = %uid, "No object in request, allowing unchanged");
        return AdmissionResponse::from(request);
    };

    let patch = match defaulting_patch(&state.registry, obj) {
        Ok(patch) => patch,
        Err(message) => return deny_with_reason(request, &message, "InvalidRequest"),
    };
    if patch.0.is_empty() {
        debug!(uid = %uid, name = %request.name, "Defaults already applied");
        return AdmissionResponse::from(request);
    }

    debug!(uid = %uid, name = %request.name, ops = patch.0.len(), "Applying defaults");
    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => response,
        Err(e) => {
            error!(uid = %uid, error = %e, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {e}"))
        }
    }
}

/// RFC 6902 patch taking `obj` to its defaulted form.
///
/// The diff is taken against the raw object so that paths are valid for what
/// the API server holds, including parents the typed form would fill in.
pub fn defaulting_patch(registry: &Registry, obj: &DynamicObject) -> Result<json_patch::Patch, String> {
    let cp: EksControlPlane = registry.decode(obj).map_err(|e| e.to_string())?;
    let defaulted = default(&cp);
    if defaulted == cp.spec {
        return Ok(json_patch::Patch(Vec::new()));
    }

    let before = serde_json::to_value(obj).map_err(|e| e.to_string())?;
    let mut after = before.clone();
    after["spec"] = serde_json::to_value(&defaulted).map_err(|e| e.to_string())?;
    Ok(json_patch::diff(&before, &after))
}

fn admit(state: &WebhookState, request: &AdmissionRequest<DynamicObject>) -> AdmissionResponse {
    let uid = &request.uid;
    if request.operation == Operation::Delete {
        info!(uid = %uid, "Admission request allowed (DELETE)");
        return AdmissionResponse::from(request);
    }

    let Some(obj) = &request.object else {
        return deny_with_reason(request, "Missing object in request", "InvalidRequest");
    };
    let new: EksControlPlane = match state.registry.decode(obj) {
        Ok(cp) => cp,
        Err(e) => return deny_with_reason(request, &e.to_string(), "InvalidRequest"),
    };
    let old: Option<EksControlPlane> = match (&request.operation, &request.old_object) {
        (Operation::Update, Some(old)) => match state.registry.decode(old) {
            Ok(cp) => Some(cp),
            Err(e) => return deny_with_reason(request, &e.to_string(), "InvalidRequest"),
        },
        _ => None,
    };

    match validate(old.as_ref(), &new) {
        Ok(()) => {
            info!(uid = %uid, name = %request.name, "Admission request allowed");
            AdmissionResponse::from(request)
        }
        Err(e) => {
            warn!(uid = %uid, name = %request.name, violations = e.violations.len(), error = %e, "Admission request denied");
            AdmissionResponse::from(request).deny(e.to_string())
        }
    }
}

/// Run the webhook server with TLS
///
/// Certificates are read from `config.webhook_cert_dir`.
pub async fn run_webhook_server(config: &OperatorConfig, registry: Arc<Registry>) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;

    let app = create_webhook_router(Arc::new(WebhookState::new(registry)));

    let tls = RustlsConfig::from_pem_file(config.webhook_cert_path(), config.webhook_key_path())
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    info!(port = config.webhook_port, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, tls)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_control_plane;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn review(operation: &str, object: Value, old_object: Option<Value>) -> Value {
        json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {
                "uid": "705ab4f5-6393-11e8-b7cc-42010a800002",
                "kind": {"group": "controlplane.cluster.x-k8s.io", "version": "v1beta2", "kind": "EKSControlPlane"},
                "resource": {"group": "controlplane.cluster.x-k8s.io", "version": "v1beta2", "resource": "ekscontrolplanes"},
                "name": "cp",
                "namespace": "team-a",
                "operation": operation,
                "userInfo": {"username": "admin"},
                "object": object,
                "oldObject": old_object,
                "dryRun": false
            }
        })
    }

    fn object(cp: &EksControlPlane) -> Value {
        let mut value = serde_json::to_value(cp).unwrap();
        value["apiVersion"] = json!("controlplane.cluster.x-k8s.io/v1beta2");
        value["kind"] = json!("EKSControlPlane");
        value
    }

    async fn post(path: &str, body: Value) -> (StatusCode, Value) {
        let app = create_webhook_router(Arc::new(WebhookState::new(Arc::new(Registry::with_defaults()))));
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validate_allows_valid_create() {
        let cp = create_test_control_plane("cp", "team-a");
        let (status, body) = post(VALIDATE_PATH, review("CREATE", object(&cp), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], json!(true));
        assert_eq!(body["response"]["uid"], json!("705ab4f5-6393-11e8-b7cc-42010a800002"));
    }

    #[tokio::test]
    async fn test_validate_denies_version_downgrade() {
        let old = create_test_control_plane("cp", "team-a");
        let mut new = old.clone();
        new.spec.version = Some("v1.27".to_string());
        let (status, body) = post(VALIDATE_PATH, review("UPDATE", object(&new), Some(object(&old)))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], json!(false));
        let message = body["response"]["status"]["message"].as_str().unwrap();
        assert!(message.contains("new version less than old version"), "{message}");
    }

    #[tokio::test]
    async fn test_validate_allows_delete() {
        let cp = create_test_control_plane("cp", "team-a");
        let (_, body) = post(VALIDATE_PATH, review("DELETE", Value::Null, Some(object(&cp)))).await;
        assert_eq!(body["response"]["allowed"], json!(true));
    }

    #[tokio::test]
    async fn test_validate_denies_unknown_kind() {
        let cp = create_test_control_plane("cp", "team-a");
        let mut obj = object(&cp);
        obj["kind"] = json!("AWSManagedMachinePool");
        let (_, body) = post(VALIDATE_PATH, review("CREATE", obj, None)).await;
        assert_eq!(body["response"]["allowed"], json!(false));
        assert!(body["response"]["status"]["message"].as_str().unwrap().starts_with("[InvalidRequest]"));
    }

    #[tokio::test]
    async fn test_malformed_review_is_bad_request() {
        let (status, body) = post(VALIDATE_PATH, json!({"apiVersion": "admission.k8s.io/v1", "kind": "AdmissionReview"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid admission review"));
    }

    #[tokio::test]
    async fn test_mutate_returns_patch() {
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.eks_cluster_name = None;
        let (status, body) = post(MUTATE_PATH, review("CREATE", object(&cp), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"]["allowed"], json!(true));
        assert_eq!(body["response"]["patchType"], json!("JSONPatch"));
    }

    #[test]
    fn test_defaulting_patch_applies_and_converges() {
        let registry = Registry::with_defaults();
        let mut cp = create_test_control_plane("cp", "team-a");
        cp.spec.eks_cluster_name = None;
        cp.spec.version = Some("1.29.1".to_string());
        let raw: DynamicObject = serde_json::from_value(object(&cp)).unwrap();

        let patch = defaulting_patch(&registry, &raw).unwrap();
        assert!(!patch.0.is_empty());

        let mut patched = serde_json::to_value(&raw).unwrap();
        json_patch::patch(&mut patched, &patch).unwrap();
        assert_eq!(patched["spec"]["eksClusterName"], json!("team-a_cp"));
        assert_eq!(patched["spec"]["version"], json!("v1.29"));

        let again: DynamicObject = serde_json::from_value(patched).unwrap();
        assert!(defaulting_patch(&registry, &again).unwrap().0.is_empty());
    }
}
