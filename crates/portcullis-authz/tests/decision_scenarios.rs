//! End-to-end decisions over an index compiled from an OpenAPI document.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, Uri};
use parking_lot::Mutex;
use portcullis_authz::{
    Authorizer, AuthzError, AuthzResult, CheckPermissionRequest, IndexHandle, Permissionship,
    PermissionsClient, RequestContext,
};
use portcullis_core::{DenyReason, IdentityOptions, SubjectExtractor, Verdict};
use portcullis_spec::SpecCompiler;
use serde_json::json;

const DOCUMENT: &str = r#"{
  "openapi": "3.0.3",
  "paths": {
    "/providers/{providerCode}/payment-accounts/{accountCode}": {
      "get": {
        "parameters": [
          {"name": "providerCode", "in": "path", "x-security": {"resource": "provider", "permission": "view"}},
          {"name": "accountCode", "in": "path", "x-security": {"resource": "payment-account", "permission": "view"}}
        ]
      }
    },
    "/providers/{providerCode}/contracts": {
      "post": {
        "x-security": {
          "roles": ["PROVIDER"],
          "parameters": [
            {"name": "payerId", "in": "request", "resource": "payer", "permission": "view"}
          ]
        }
      }
    },
    "/providers": {
      "get": {
        "parameters": [
          {"name": "providercodes", "in": "query", "x-security": {"resource": "provider", "permission": "view"}}
        ]
      }
    },
    "/things/{id}": {
      "get": {
        "parameters": [
          {"name": "id", "in": "path", "x-security": {"resource": "thing", "permission": "read"}}
        ]
      }
    }
  },
  "x-tyk-api-gateway": {"server": {"listenPath": {"value": "/", "strip": false}}}
}"#;

/// Answers by resource type and records every call.
#[derive(Default)]
struct ScriptedClient {
    answers: HashMap<&'static str, Permissionship>,
    fail: bool,
    calls: Mutex<Vec<CheckPermissionRequest>>,
}

impl ScriptedClient {
    fn answering(answers: &[(&'static str, Permissionship)]) -> Arc<Self> {
        Arc::new(Self {
            answers: answers.iter().copied().collect(),
            ..Self::default()
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    fn checked(&self) -> Vec<(String, String, String)> {
        self.calls
            .lock()
            .iter()
            .map(|c| {
                (
                    c.resource.object_type.clone(),
                    c.resource.object_id.clone(),
                    c.subject.object.object_id.clone(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl PermissionsClient for ScriptedClient {
    async fn check_permission(&self, request: CheckPermissionRequest) -> AuthzResult<Permissionship> {
        let answer = self.answers.get(request.resource.object_type.as_str()).copied();
        self.calls.lock().push(request);
        if self.fail {
            return Err(AuthzError::UpstreamStatus {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(answer.unwrap_or(Permissionship::NoPermission))
    }
}

fn token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.")
}

fn authorizer(client: Arc<ScriptedClient>) -> Authorizer {
    let mut compiler = SpecCompiler::default();
    compiler.add_document("scenarios", DOCUMENT).unwrap();
    Authorizer::new(
        IndexHandle::new(compiler.finish()),
        client,
        SubjectExtractor::new(IdentityOptions::default()),
    )
}

fn request(method: Method, uri: &'static str, claims: Option<serde_json::Value>) -> RequestContext {
    request_with_body(method, uri, claims, None, Bytes::new())
}

fn request_with_body(
    method: Method,
    uri: &'static str,
    claims: Option<serde_json::Value>,
    content_type: Option<&'static str>,
    body: Bytes,
) -> RequestContext {
    let mut headers = HeaderMap::new();
    if let Some(claims) = claims {
        let value = format!("Bearer {}", token(claims));
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
    }
    if let Some(content_type) = content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    }
    RequestContext::new(method, Uri::from_static(uri), headers, body)
}

#[tokio::test]
async fn test_all_checks_granted_allows() {
    let client = ScriptedClient::answering(&[
        ("provider", Permissionship::HasPermission),
        ("payment-account", Permissionship::HasPermission),
    ]);
    let verdict = authorizer(client.clone())
        .authorize(&request(
            Method::GET,
            "/providers/AAR/payment-accounts/123",
            Some(json!({"userId": "123"})),
        ))
        .await;

    assert_eq!(verdict, Verdict::Allow);
    assert_eq!(
        client.checked(),
        vec![
            ("provider".to_string(), "AAR".to_string(), "123".to_string()),
            ("payment-account".to_string(), "123".to_string(), "123".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_first_denial_stops_further_checks() {
    let client = ScriptedClient::answering(&[
        ("provider", Permissionship::NoPermission),
        ("payment-account", Permissionship::HasPermission),
    ]);
    let verdict = authorizer(client.clone())
        .authorize(&request(
            Method::GET,
            "/providers/AAR/payment-accounts/123",
            Some(json!({"userId": "123"})),
        ))
        .await;

    assert_eq!(verdict.reason(), Some(DenyReason::PermissionDenied));
    assert_eq!(verdict.status_code(), http::StatusCode::FORBIDDEN);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn test_missing_role_makes_no_calls() {
    let client = ScriptedClient::answering(&[("payer", Permissionship::HasPermission)]);
    let verdict = authorizer(client.clone())
        .authorize(&request_with_body(
            Method::POST,
            "/providers/AAR/contracts",
            Some(json!({"userId": "123", "roles": ["ACCOUNTHOLDER"]})),
            Some("application/json"),
            Bytes::from_static(br#"{"payerId": "P1"}"#),
        ))
        .await;

    assert_eq!(verdict.reason(), Some(DenyReason::MissingRole));
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_unknown_route_allows() {
    let client = ScriptedClient::answering(&[]);
    let verdict = authorizer(client.clone())
        .authorize(&request(Method::GET, "/unknown/route", None))
        .await;

    assert_eq!(verdict, Verdict::Allow);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_path_value_reaches_the_service_once() {
    let client = ScriptedClient::answering(&[("thing", Permissionship::HasPermission)]);
    let verdict = authorizer(client.clone())
        .authorize(&request(Method::GET, "/things/42", Some(json!({"userId": 7}))))
        .await;

    assert!(verdict.is_allowed());
    assert_eq!(
        client.checked(),
        vec![("thing".to_string(), "42".to_string(), "7".to_string())]
    );
}

#[tokio::test]
async fn test_service_error_is_upstream_error() {
    let client = ScriptedClient::failing();
    let verdict = authorizer(client.clone())
        .authorize(&request(Method::GET, "/things/42", Some(json!({"userId": "1"}))))
        .await;

    assert_eq!(verdict.reason(), Some(DenyReason::UpstreamError));
    assert_eq!(verdict.status_code(), http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn test_query_values_checked_in_order() {
    let client = ScriptedClient::answering(&[("provider", Permissionship::HasPermission)]);
    let verdict = authorizer(client.clone())
        .authorize(&request(
            Method::GET,
            "/providers?providercodes=AAR&providercodes=BBR",
            Some(json!({"userId": "576985"})),
        ))
        .await;

    assert!(verdict.is_allowed());
    let ids: Vec<_> = client.checked().into_iter().map(|(_, id, _)| id).collect();
    assert_eq!(ids, vec!["AAR", "BBR"]);
}

#[tokio::test]
async fn test_absent_query_parameter_allows() {
    let client = ScriptedClient::answering(&[]);
    let verdict = authorizer(client.clone())
        .authorize(&request(Method::GET, "/providers", Some(json!({"userId": "1"}))))
        .await;

    assert!(verdict.is_allowed());
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_json_and_form_bodies() {
    let roles = json!({"userId": "9", "roles": ["PROVIDER"]});

    let client = ScriptedClient::answering(&[("payer", Permissionship::HasPermission)]);
    let verdict = authorizer(client.clone())
        .authorize(&request_with_body(
            Method::POST,
            "/providers/AAR/contracts",
            Some(roles.clone()),
            Some("application/json"),
            Bytes::from_static(br#"{"payerId": "P1", "amount": 10}"#),
        ))
        .await;
    assert!(verdict.is_allowed());
    assert_eq!(client.checked()[0].1, "P1");

    let client = ScriptedClient::answering(&[("payer", Permissionship::HasPermission)]);
    let verdict = authorizer(client.clone())
        .authorize(&request_with_body(
            Method::POST,
            "/providers/AAR/contracts",
            Some(roles),
            Some("application/x-www-form-urlencoded"),
            Bytes::from_static(b"payerId=P2&note=x"),
        ))
        .await;
    assert!(verdict.is_allowed());
    assert_eq!(client.checked()[0].1, "P2");
}

async fn contract_with_body(client: Arc<ScriptedClient>, body: &'static [u8]) -> Verdict {
    authorizer(client)
        .authorize(&request_with_body(
            Method::POST,
            "/providers/AAR/contracts",
            Some(json!({"userId": "9", "roles": ["PROVIDER"]})),
            Some("application/json"),
            Bytes::from_static(body),
        ))
        .await
}

#[tokio::test]
async fn test_present_null_body_field_is_denied() {
    let client = ScriptedClient::answering(&[("payer", Permissionship::HasPermission)]);
    let verdict = contract_with_body(client.clone(), br#"{"payerId": null}"#).await;

    assert!(!verdict.is_allowed());
    assert_eq!(verdict.reason(), Some(DenyReason::BodyDecode));
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_empty_array_body_field_is_denied() {
    let client = ScriptedClient::answering(&[("payer", Permissionship::HasPermission)]);
    let verdict = contract_with_body(client.clone(), br#"{"payerId": []}"#).await;

    assert_eq!(verdict.reason(), Some(DenyReason::BodyDecode));
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_structured_body_fields_are_checked() {
    let client = ScriptedClient::answering(&[]);
    let verdict = contract_with_body(client.clone(), br#"{"payerId": {"id": "P9"}}"#).await;
    assert_eq!(verdict.reason(), Some(DenyReason::PermissionDenied));
    assert_eq!(client.checked()[0].1, r#"{"id":"P9"}"#);

    let client = ScriptedClient::answering(&[("payer", Permissionship::HasPermission)]);
    let verdict = contract_with_body(client.clone(), br#"{"payerId": ["P1", ["P2"]]}"#).await;
    assert!(verdict.is_allowed());
    let ids: Vec<_> = client.checked().into_iter().map(|(_, id, _)| id).collect();
    assert_eq!(ids, vec!["P1", r#"["P2"]"#]);
}

#[tokio::test]
async fn test_absent_body_field_allows() {
    let client = ScriptedClient::answering(&[]);
    let verdict = contract_with_body(client.clone(), br#"{"amount": 10}"#).await;

    assert!(verdict.is_allowed());
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_malformed_json_body_is_bad_request() {
    let client = ScriptedClient::answering(&[("payer", Permissionship::HasPermission)]);
    let verdict = authorizer(client.clone())
        .authorize(&request_with_body(
            Method::POST,
            "/providers/AAR/contracts",
            Some(json!({"userId": "9", "roles": ["PROVIDER"]})),
            Some("application/json"),
            Bytes::from_static(b"{not json"),
        ))
        .await;

    assert_eq!(verdict.reason(), Some(DenyReason::BodyDecode));
    assert_eq!(verdict.status_code(), http::StatusCode::BAD_REQUEST);
    assert_eq!(client.call_count(), 0);
}

#[tokio::test]
async fn test_missing_token_is_unauthenticated() {
    let client = ScriptedClient::answering(&[]);
    let verdict = authorizer(client.clone())
        .authorize(&request(Method::GET, "/things/42", None))
        .await;

    assert_eq!(verdict.reason(), Some(DenyReason::Unauthenticated));
    let envelope = verdict.to_envelope(Some("req-1")).unwrap();
    assert_eq!(envelope.error.code, "UNAUTHENTICATED");
    assert_eq!(client.call_count(), 0);
}
