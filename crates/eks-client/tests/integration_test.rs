//! Integration tests for the AWS gateway
//!
//! These tests require a reachable signing endpoint with AWS credentials.
//! Set EKS_ENDPOINT and AWS_REGION environment variables to run.

use eks_client::{DEFAULT_TIMEOUT, EksClient, EksClientTrait, TagFilter};

fn client() -> EksClient {
    let endpoint = std::env::var("EKS_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    let region = std::env::var("AWS_REGION")
        .expect("AWS_REGION environment variable must be set");
    EksClient::new(endpoint, region, DEFAULT_TIMEOUT).expect("Failed to create client")
}

#[tokio::test]
#[ignore] // Requires AWS access
async fn test_validate_connectivity() {
    let client = client();
    client.validate_connectivity().await.expect("endpoint should be reachable");
}

#[tokio::test]
#[ignore]
async fn test_describe_missing_cluster_is_not_found() {
    let client = client();
    let err = client
        .describe_cluster("eks-operator-integration-does-not-exist")
        .await
        .expect_err("cluster should not exist");
    assert!(err.is_not_found(), "unexpected error: {err}");
}

#[tokio::test]
#[ignore]
async fn test_describe_load_balancers() {
    let client = client();
    let lbs = client.describe_load_balancers().await
        .expect("Failed to describe load balancers");
    println!("Found {} load balancers", lbs.len());
}

#[tokio::test]
#[ignore]
async fn test_get_resources_by_tag() {
    let client = client();
    let cluster = std::env::var("EKS_CLUSTER_NAME")
        .unwrap_or_else(|_| "eks-operator-integration".to_string());
    let filters = [TagFilter {
        key: format!("kubernetes.io/cluster/{cluster}"),
        values: vec!["owned".to_string()],
    }];
    let resources = client.get_resources_by_tag(&filters).await
        .expect("Failed to enumerate tagged resources");
    println!("Found {} resources owned by {}", resources.len(), cluster);
}
