use super::*;
use crate::claims::test_helpers::token_for;
use crate::net::types::Document;
use crate::session::TOKEN_KEY;
use crate::storage::{KeyValueStore, MemoryStore};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// =============================================================================
// Mock service
// =============================================================================

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body should be JSON")
    }
}

#[derive(Clone, Default)]
struct MockService {
    requests: Arc<Mutex<Vec<Recorded>>>,
    responses: Arc<Mutex<HashMap<String, (u16, String)>>>,
}

impl MockService {
    fn respond(&self, path: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(format!("/api/{path}"), (status, body.to_owned()));
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    fn last(&self) -> Recorded {
        self.requests().pop().expect("at least one request")
    }
}

async fn record(
    State(mock): State<MockService>,
    method: axum::http::Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    mock.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: uri.path().to_owned(),
        headers,
        body: body.to_vec(),
    });
    let (status, body) = mock
        .responses
        .lock()
        .unwrap()
        .get(uri.path())
        .cloned()
        .unwrap_or((200, "{}".to_owned()));
    (StatusCode::from_u16(status).unwrap(), body).into_response()
}

async fn spawn_mock() -> (MockService, String) {
    let mock = MockService::default();
    let app = Router::new().fallback(record).with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, format!("http://{addr}/api/"))
}

fn client_for(base_url: &str) -> (ApiClient, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let session = Session::load(store.clone());
    let config = ClientConfig::default().with_base_url(base_url).unwrap();
    (ApiClient::new(&config, session).unwrap(), store)
}

// =============================================================================
// Request shaping
// =============================================================================

#[test]
fn id_segments_are_appended_to_prefix() {
    let (client, _) = client_for("http://127.0.0.1:9/api/");
    let path = |prefix: &str, segments: &[&str]| {
        client.url_with_segments(prefix, segments).unwrap().path().to_owned()
    };
    assert_eq!(path("admin/users/", &["42"]), "/api/admin/users/42");
    assert_eq!(
        path("admin/users/", &["u1", "documents", "front.pdf"]),
        "/api/admin/users/u1/documents/front.pdf"
    );
    assert_eq!(path("gifts/", &["g1"]), "/api/gifts/g1");
}

#[test]
fn id_segments_cannot_escape_their_route() {
    let (client, _) = client_for("http://127.0.0.1:9/api/");
    let url = client.url_with_segments("admin/users/", &["../../tokens"]).unwrap();
    assert_eq!(url.path(), "/api/admin/users/..%2F..%2Ftokens");
    let url = client.url_with_segments("gifts/", &["a b?c#d"]).unwrap();
    assert_eq!(url.path(), "/api/gifts/a%20b%3Fc%23d");
    assert_eq!(url.query(), None);

    for bad in ["", ".", ".."] {
        assert!(matches!(client.url_with_segments("admin/users/", &[bad]), Err(ApiError::Url(_))));
    }
}

#[tokio::test]
async fn traversal_id_stays_under_admin_users() {
    let (mock, base) = spawn_mock().await;
    mock.respond("tokens", 200, r#"{"token":"leaked"}"#);
    let (client, _) = client_for(&base);

    let _ = client.get_user("../../tokens").await;

    let req = mock.last();
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/api/admin/users/..%2F..%2Ftokens");
}

#[test]
fn parse_json_reads_empty_body_as_null() {
    assert_eq!(parse_json(b"").unwrap(), Value::Null);
    assert_eq!(parse_json(b" \n").unwrap(), Value::Null);
    assert_eq!(parse_json(b"{\"a\":1}").unwrap(), json!({ "a": 1 }));
    assert!(matches!(parse_json(b"<html>"), Err(ApiError::Decode(_))));
}

#[tokio::test]
async fn post_rewrites_top_level_keys() {
    let (mock, base) = spawn_mock().await;
    let (client, _) = client_for(&base);

    client
        .post("users/me/use-gift-code", &json!({ "giftCode": "x", "meta": { "innerKey": 1 } }))
        .await
        .unwrap();

    let req = mock.last();
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/api/users/me/use-gift-code");
    assert_eq!(req.header("content-type"), Some("application/json"));
    assert_eq!(req.json(), json!({ "gift_code": "x", "meta": { "innerKey": 1 } }));
}

#[tokio::test]
async fn requests_disable_caching() {
    let (mock, base) = spawn_mock().await;
    let (client, _) = client_for(&base);
    client.get("users/me").await.unwrap();
    assert_eq!(mock.last().header("cache-control"), Some("no-cache"));
}

#[tokio::test]
async fn bearer_header_present_only_with_token() {
    let (mock, base) = spawn_mock().await;
    let (client, _) = client_for(&base);

    client.get("users/me").await.unwrap();
    assert_eq!(mock.last().header("authorization"), None);

    client.session().set_token("abc");
    client.get("users/me").await.unwrap();
    assert_eq!(mock.last().header("authorization"), Some("Bearer abc"));

    client.session().sign_out();
    client.post("tokens", &json!({ "email": "a", "password": "b" })).await.unwrap();
    assert_eq!(mock.last().header("authorization"), None);
}

#[tokio::test]
async fn get_user_issues_get_without_body() {
    let (mock, base) = spawn_mock().await;
    let id = uuid::Uuid::new_v4();
    mock.respond(
        "admin/users/42",
        200,
        &json!({
            "id": id, "confirmed": true, "admin": false, "email": "a@example.test",
            "firstName": "A", "lastName": "B", "phoneNumber": "0", "address": "x",
            "postalCode": "1", "city": "c", "country": "FR", "category": "supporters",
            "reason": null, "identityFront": null, "identityBack": null, "addressProof": null,
            "shares": 2
        })
        .to_string(),
    );
    let (client, _) = client_for(&base);

    let user = client.get_user("42").await.unwrap();
    assert_eq!(user.id, id);

    let req = mock.last();
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/api/admin/users/42");
    assert!(req.body.is_empty());
}

// =============================================================================
// Failure classification
// =============================================================================

#[tokio::test]
async fn token_expired_signs_out_and_surfaces_body() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/me", 401, r#"{"code":"token-expired"}"#);
    let (client, store) = client_for(&base);
    client.session().set_token("stale");

    let err = client.get_current_user().await.unwrap_err();

    assert_eq!(client.session().token(), None);
    assert!(!store.contains(TOKEN_KEY).unwrap());
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.body(), Some(&json!({ "code": "token-expired" })));
    assert!(err.is_token_invalidation());
    // The request itself still went out with the old token.
    assert_eq!(mock.last().header("authorization"), Some("Bearer stale"));
}

#[tokio::test]
async fn token_invalid_signs_out_and_navigates_home() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/me/checkout/sessions", 400, r#"{"code":"token-invalid","error":"The token is invalid."}"#);
    let (client, _) = client_for(&base);
    let routes = Arc::new(Mutex::new(Vec::new()));
    let sink = routes.clone();
    client
        .session()
        .set_navigator(move |path: &str| sink.lock().unwrap().push(path.to_owned()));
    client.session().set_token("bad");

    let err = client
        .create_checkout_session(&CreateCheckoutSessionRequest { quantity: 1, gift: None })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Some("token-invalid"));
    assert_eq!(err.message(), Some("The token is invalid."));
    assert_eq!(client.session().token(), None);
    assert_eq!(*routes.lock().unwrap(), vec!["/".to_owned()]);
}

#[tokio::test]
async fn other_errors_keep_token() {
    let (mock, base) = spawn_mock().await;
    let body = json!({ "code": "validation-error", "message": "quantity must be positive" });
    mock.respond("users/me/checkout/sessions", 400, &body.to_string());
    let (client, store) = client_for(&base);
    client.session().set_token("good");

    let err = client
        .create_checkout_session(&CreateCheckoutSessionRequest { quantity: 0, gift: None })
        .await
        .unwrap_err();

    assert_eq!(client.session().token().as_deref(), Some("good"));
    assert!(store.contains(TOKEN_KEY).unwrap());
    assert_eq!(err.body(), Some(&body));
    assert_eq!(err.message(), Some("quantity must be positive"));
    assert!(!err.is_token_invalidation());
    assert_eq!(err.to_string(), "service returned 400: quantity must be positive (validation-error)");
}

#[tokio::test]
async fn not_admin_error_does_not_sign_out() {
    let (mock, base) = spawn_mock().await;
    mock.respond("admin/users", 401, r#"{"code":"not-admin","error":"You must be admin to call this route."}"#);
    let (client, _) = client_for(&base);
    client.session().set_token(token_for("u-1", false));

    let err = client.get_users().await.unwrap_err();
    assert_eq!(err.code(), Some("not-admin"));
    assert!(client.session().is_signed_in());
}

#[tokio::test]
async fn malformed_error_body_is_decode_error() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/me", 502, "<html>bad gateway</html>");
    let (client, _) = client_for(&base);
    client.session().set_token("abc");

    let err = client.get_current_user().await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
    assert!(client.session().is_signed_in());
}

#[tokio::test]
async fn empty_error_body_is_decode_error() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/me", 502, "");
    let (client, _) = client_for(&base);
    client.session().set_token("abc");

    let err = client.get("users/me").await.unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)), "{err:?}");
    assert_eq!(client.session().token().as_deref(), Some("abc"));
}

#[tokio::test]
async fn malformed_success_body_is_decode_error() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/me", 200, "not json");
    let (client, _) = client_for(&base);
    assert!(matches!(client.get("users/me").await, Err(ApiError::Decode(_))));
}

#[tokio::test]
async fn unexpected_shape_is_decode_error() {
    let (mock, base) = spawn_mock().await;
    mock.respond("tokens", 200, r#"{"nope":true}"#);
    let (client, _) = client_for(&base);
    let err = client
        .create_token(&CreateTokenRequest { email: "a".into(), password: "b".into() })
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode(_)));
}

#[tokio::test]
async fn connection_refused_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let (client, _) = client_for(&format!("http://{addr}/"));
    client.session().set_token("abc");

    let err = client.get("users/me").await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
    assert!(client.session().is_signed_in());
}

// =============================================================================
// Endpoints
// =============================================================================

#[tokio::test]
async fn create_token_returns_token_without_storing_it() {
    let (mock, base) = spawn_mock().await;
    mock.respond("tokens", 200, r#"{"token":"issued"}"#);
    let (client, _) = client_for(&base);

    let token = client
        .create_token(&CreateTokenRequest { email: "a@example.test".into(), password: "pw".into() })
        .await
        .unwrap();

    assert_eq!(token.token, "issued");
    assert_eq!(client.session().token(), None);
    assert_eq!(mock.last().json(), json!({ "email": "a@example.test", "password": "pw" }));
}

#[tokio::test]
async fn account_endpoints_hit_expected_paths() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/confirm", 200, r#"{"token":"t1"}"#);
    mock.respond("users/reset", 200, r#"{"token":"t2"}"#);
    let (client, _) = client_for(&base);
    let email = EmailRequest { email: "a@example.test".into() };

    client.start_confirm_user(&email).await.unwrap();
    client.start_reset_user(&email).await.unwrap();
    let confirmed = client
        .confirm_user(&ConfirmUserRequest { email: "a@example.test".into(), token: "123456".into() })
        .await
        .unwrap();
    let reset = client
        .reset_user(&ResetUserRequest {
            email: "a@example.test".into(),
            password: "new".into(),
            token: "654321".into(),
        })
        .await
        .unwrap();

    assert_eq!(confirmed.token, "t1");
    assert_eq!(reset.token, "t2");
    let paths: Vec<String> = mock.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec!["/api/users/confirm/start", "/api/users/reset/start", "/api/users/confirm", "/api/users/reset"]
    );
}

#[tokio::test]
async fn create_user_posts_registration() {
    let (mock, base) = spawn_mock().await;
    let (client, _) = client_for(&base);
    let form = CreateUserRequest {
        email: "a@example.test".into(),
        password: "pw".into(),
        phone_number: "0600000000".into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        address: "1 rue".into(),
        postal_code: "75002".into(),
        city: "Paris".into(),
        country: "FR".into(),
        category: crate::categories::Category::Supporters,
        reason: None,
    };

    client.create_user(&form).await.unwrap();

    let req = mock.last();
    assert_eq!(req.path, "/api/users");
    let body = req.json();
    assert_eq!(body["phone_number"], "0600000000");
    assert_eq!(body["category"], "supporters");
    assert_eq!(body["reason"], Value::Null);
}

#[tokio::test]
async fn use_gift_code_accepts_empty_success_body() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/me/use-gift-code", 200, "");
    let (client, _) = client_for(&base);
    client.session().set_token("abc");

    client
        .use_gift_code(&UseGiftCodeRequest { gift_code: "ABCD1234".into() })
        .await
        .unwrap();
    assert_eq!(mock.last().json(), json!({ "gift_code": "ABCD1234" }));
}

#[tokio::test]
async fn checkout_and_current_user_parse_responses() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/me/checkout/sessions", 200, r#"{"url":"https://pay.example/s/1"}"#);
    mock.respond("users/me", 200, r#"{"email":"a@example.test","mustUploadDocuments":false,"shares":4}"#);
    let (client, _) = client_for(&base);
    client.session().set_token("abc");

    let checkout = client
        .create_checkout_session(&CreateCheckoutSessionRequest { quantity: 4, gift: Some(true) })
        .await
        .unwrap();
    assert_eq!(checkout.url, "https://pay.example/s/1");
    assert_eq!(mock.last().json(), json!({ "quantity": 4, "gift": true }));

    let me = client.get_current_user().await.unwrap();
    assert_eq!(me.shares, 4);
    assert!(!me.must_upload_documents);
}

#[tokio::test]
async fn upload_documents_sends_multipart_without_json_header() {
    let (mock, base) = spawn_mock().await;
    let (client, _) = client_for(&base);
    client.session().set_token("abc");

    client
        .upload_documents(DocumentUpload {
            identity_front: Document::new("front.png", "image/png", b"FRONT".to_vec()),
            identity_back: None,
            address_proof: Document::new("proof.pdf", "application/pdf", b"PROOF".to_vec()),
        })
        .await
        .unwrap();

    let req = mock.last();
    assert_eq!(req.path, "/api/users/me/documents");
    assert_eq!(req.header("authorization"), Some("Bearer abc"));
    let content_type = req.header("content-type").unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="), "{content_type}");
    let body = String::from_utf8_lossy(&req.body);
    assert!(body.contains(r#"name="identity_front"; filename="front.png""#));
    assert!(body.contains(r#"name="address_proof"; filename="proof.pdf""#));
    assert!(!body.contains("identity_back"));
    assert!(body.contains("FRONT"));
}

#[tokio::test]
async fn raw_endpoints_return_bodies() {
    let (mock, base) = spawn_mock().await;
    mock.respond("admin/csv/users", 200, "id,email\n1,a@example.test\n");
    mock.respond("admin/users/u1/documents/front.png", 200, "PNGDATA");
    mock.respond("gifts/g1", 200, "GIFTPNG");
    let (client, _) = client_for(&base);

    assert_eq!(client.export_users_csv().await.unwrap(), "id,email\n1,a@example.test\n");
    assert_eq!(client.get_user_document("u1", "front.png").await.unwrap(), b"PNGDATA");
    assert_eq!(client.get_gift_card("g1").await.unwrap(), b"GIFTPNG");
}

#[tokio::test]
async fn raw_endpoint_errors_are_classified() {
    let (mock, base) = spawn_mock().await;
    mock.respond("admin/csv/users", 400, r#"{"code":"token-expired","error":"The token has expired."}"#);
    let (client, _) = client_for(&base);
    client.session().set_token("abc");

    let err = client.export_users_csv().await.unwrap_err();
    assert_eq!(err.code(), Some("token-expired"));
    assert_eq!(client.session().token(), None);
}

#[tokio::test]
async fn concurrent_calls_are_independent() {
    let (mock, base) = spawn_mock().await;
    mock.respond("users/me", 200, r#"{"email":"a@example.test","mustUploadDocuments":true,"shares":0}"#);
    let (client, _) = client_for(&base);
    client.session().set_token("abc");

    let (a, b, c) = tokio::join!(client.get_current_user(), client.get("users/me"), client.get_users());
    assert!(a.is_ok());
    assert!(b.is_ok());
    // `{}` is not a member list.
    assert!(matches!(c, Err(ApiError::Decode(_))));
    assert_eq!(mock.requests().len(), 3);
}
