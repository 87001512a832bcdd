//! Integration tests for the auth, mail and image-host adapters.

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use storefront::services::auth::{AuthError, AuthService, SupabaseAuth};
use storefront::services::email::{EmailMessage, MailError, Mailer, ResendMailer};
use storefront::services::images::{CloudinaryHost, ImageHost, ImageHostError};

#[tokio::test]
async fn auth_reads_role_from_app_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("apikey", "anon-key"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "u1",
            "email": "ana@example.com",
            "user_metadata": { "full_name": "Ana Pérez", "role": "admin" },
            "app_metadata": { "role": "customer" }
        })))
        .mount(&server)
        .await;

    let auth = SupabaseAuth::new(server.uri(), "anon-key").expect("client");
    let user = auth.current_user("tok-1").await.expect("lookup").expect("user");

    assert_eq!(user.id, "u1");
    assert_eq!(user.full_name.as_deref(), Some("Ana Pérez"));
    assert!(!user.is_admin());
}

#[tokio::test]
async fn auth_treats_rejected_token_as_anonymous() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "invalid JWT" })))
        .mount(&server)
        .await;

    let auth = SupabaseAuth::new(server.uri(), "anon-key").expect("client");
    assert_eq!(auth.current_user("expired").await.expect("lookup"), None);
}

#[tokio::test]
async fn auth_surfaces_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let auth = SupabaseAuth::new(server.uri(), "anon-key").expect("client");
    let err = auth.current_user("tok").await.expect_err("should fail");
    assert!(matches!(err, AuthError::UnexpectedStatus(503)));
}

#[tokio::test]
async fn mailer_posts_message_with_branded_sender() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("authorization", "Bearer re_key"))
        .and(body_partial_json(json!({
            "from": "Aurum <pedidos@shop.test>",
            "to": ["ana@example.com"],
            "subject": "Hola"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "email_1" })))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = ResendMailer::with_base(server.uri(), "re_key", "pedidos@shop.test").expect("client");
    let message = EmailMessage { to: "ana@example.com".into(), subject: "Hola".into(), html: "<p>hola</p>".into() };
    mailer.send(message).await.expect("sent");
}

#[tokio::test]
async fn mailer_reports_rejection_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(422).set_body_string("invalid `to` field"))
        .mount(&server)
        .await;

    let mailer = ResendMailer::with_base(server.uri(), "re_key", "pedidos@shop.test").expect("client");
    let message = EmailMessage { to: "nope".into(), subject: "Hola".into(), html: String::new() };
    match mailer.send(message).await {
        Err(MailError::Rejected { status, body }) => {
            assert_eq!(status, 422);
            assert!(body.contains("invalid"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn image_upload_returns_secure_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/image/upload"))
        .and(body_string_contains("upload_preset=store"))
        .and(body_string_contains("public_id=abrigo_largo"))
        .and(body_string_contains("data%3Aimage%2Fpng%3Bbase64%2CAQID"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "public_id": "abrigo_largo",
            "secure_url": "https://res.cloudinary.test/demo/image/upload/abrigo_largo.png"
        })))
        .mount(&server)
        .await;

    let host = CloudinaryHost::with_base(server.uri(), "demo", "store").expect("client");
    let url = host.upload("Abrigo Largo.png", "image/png", vec![1, 2, 3]).await.expect("upload");
    assert_eq!(url, "https://res.cloudinary.test/demo/image/upload/abrigo_largo.png");
}

#[tokio::test]
async fn image_upload_maps_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1_1/demo/image/upload"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": { "message": "Upload preset not found" } })))
        .mount(&server)
        .await;

    let host = CloudinaryHost::with_base(server.uri(), "demo", "missing").expect("client");
    match host.upload("a.png", "image/png", vec![1]).await {
        Err(ImageHostError::Rejected { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Upload preset not found");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn empty_image_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

    let host = CloudinaryHost::with_base(server.uri(), "demo", "store").expect("client");
    let err = host.upload("a.png", "image/png", Vec::new()).await.expect_err("should fail");
    assert!(matches!(err, ImageHostError::Empty));
}
