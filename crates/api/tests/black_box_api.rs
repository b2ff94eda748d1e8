use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use warden_api::config::{AppConfig, DEFAULT_BASE_URL};
use warden_auth::{Argon2Passwords, InMemoryStore};
use warden_core::{Attributes, UserId};

const SECRET: &[u8] = b"black-box-test-secret";
const ROOT_PASSWORD: &str = "root-password";

struct TestServer {
    base_url: String,
    store: Arc<InMemoryStore>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let mut config = AppConfig::in_memory(SECRET);
        config.root_password = Some(ROOT_PASSWORD.to_string());

        // Same router as prod, over an in-memory store the test can arrange.
        let store = Arc::new(InMemoryStore::new());
        let app = warden_api::app::build_app_with_store(&config, store.clone())
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A user whose only role grants exactly `permissions`.
    fn user_with(&self, username: &str, password: &str, permissions: &[&str]) -> UserId {
        let hash = Argon2Passwords::new().hash(password).unwrap();
        let user = self.store.create_user(username, &hash, Attributes::new()).unwrap();
        let role = self.store.create_role(&format!("{username}-role")).unwrap();
        self.store.assign_role(user.id, role.id).unwrap();
        for permission in permissions {
            self.store.grant(role.id, permission).unwrap();
        }
        user.id
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn login(client: &reqwest::Client, srv: &TestServer, username: &str, password: &str) -> Value {
    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

fn token(body: &Value, field: &str) -> String {
    body[field].as_str().unwrap().to_string()
}

fn sign(claims: &Value, alg: Algorithm, secret: &[u8]) -> String {
    jsonwebtoken::encode(&Header::new(alg), claims, &EncodingKey::from_secret(secret)).unwrap()
}

fn access_claims(sub: &str) -> Value {
    let now = Utc::now().timestamp();
    json!({
        "jti": uuid_like(),
        "iss": DEFAULT_BASE_URL,
        "aud": DEFAULT_BASE_URL,
        "sub": sub,
        "iat": now,
        "exp": now + 600,
        "typ": "access",
        "roles": ["root"],
        "attrs": {},
    })
}

fn uuid_like() -> String {
    "0192f5e4-6c1a-7b3e-9d2f-3a4b5c6d7e8f".to_string()
}

async fn whoami(client: &reqwest::Client, srv: &TestServer, authorization: &str) -> reqwest::Response {
    client
        .get(srv.url("/auth/whoami"))
        .header("authorization", authorization)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_is_open() {
    let srv = TestServer::spawn().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn login_returns_a_pair_and_session_cookies() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/auth/login"))
        .json(&json!({ "username": "root", "password": ROOT_PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let cookies: Vec<String> = res
        .headers()
        .get_all("set-cookie")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("access_token=") && c.contains("HttpOnly")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("refresh_token=") && c.contains("Path=/auth/token")));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().unwrap().split('.').count() == 3);
    assert!(body["refresh_token"].is_string());
}

#[tokio::test]
async fn whoami_accepts_the_header_or_the_cookie() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let pair = login(&client, &srv, "root", ROOT_PASSWORD).await;
    let access = token(&pair, "access_token");

    let res = whoami(&client, &srv, &format!("Bearer {access}")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["username"], "root");
    assert_eq!(body["user_id"], 1);
    assert_eq!(body["token_kind"], "access");
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "root"));

    let res = client
        .get(srv.url("/auth/whoami"))
        .header("cookie", format!("access_token={access}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn authentication_failures_share_one_response() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let foreign = sign(&access_claims("1"), Algorithm::HS256, b"some-other-secret");
    let wrong_alg = sign(&access_claims("1"), Algorithm::HS512, SECRET);
    let mut expired_claims = access_claims("1");
    expired_claims["iat"] = json!(Utc::now().timestamp() - 7200);
    expired_claims["exp"] = json!(Utc::now().timestamp() - 3600);
    let expired = sign(&expired_claims, Algorithm::HS256, SECRET);
    let unknown_subject = sign(&access_claims("424242"), Algorithm::HS256, SECRET);

    let missing = client.get(srv.url("/auth/whoami")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let expected: Value = missing.json().await.unwrap();
    assert_eq!(expected["error"], "unauthorized");

    for authorization in [
        "Bearer not-a-jwt".to_string(),
        "Basic cm9vdDpyb290".to_string(),
        format!("Bearer {foreign}"),
        format!("Bearer {wrong_alg}"),
        format!("Bearer {expired}"),
        format!("Bearer {unknown_subject}"),
        format!("Token {}", sign(&access_claims("1"), Algorithm::HS256, SECRET)),
    ] {
        let res = whoami(&client, &srv, &authorization).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{authorization}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body, expected, "{authorization}");
    }
}

#[tokio::test]
async fn login_failures_are_uniform() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let mut bodies = Vec::new();
    for (username, password) in [("root", "wrong"), ("nobody", ROOT_PASSWORD)] {
        let res = client
            .post(srv.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        bodies.push(res.json::<Value>().await.unwrap());
    }
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0]["error"], "invalid_credentials");
}

#[tokio::test]
async fn refresh_issues_a_working_pair() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let pair = login(&client, &srv, "root", ROOT_PASSWORD).await;

    let res = client
        .post(srv.url("/auth/token"))
        .json(&json!({ "refresh_token": token(&pair, "refresh_token") }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fresh: Value = res.json().await.unwrap();
    assert_ne!(fresh["access_token"], pair["access_token"]);

    let res = whoami(&client, &srv, &format!("Bearer {}", token(&fresh, "access_token"))).await;
    assert_eq!(res.status(), StatusCode::OK);

    // The refresh cookie works as well.
    let res = client
        .post(srv.url("/auth/token"))
        .header("cookie", format!("refresh_token={}", token(&pair, "refresh_token")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn refresh_rejects_other_kinds() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let pair = login(&client, &srv, "root", ROOT_PASSWORD).await;

    let res = client
        .post(srv.url("/auth/token"))
        .json(&json!({ "refresh_token": token(&pair, "access_token") }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.post(srv.url("/auth/token")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_revokes_both_tokens() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let pair = login(&client, &srv, "root", ROOT_PASSWORD).await;
    let access = token(&pair, "access_token");
    let refresh = token(&pair, "refresh_token");

    let logout = || {
        client
            .delete(srv.url("/auth/token"))
            .bearer_auth(&access)
            .json(&json!({ "refresh_token": refresh }))
            .send()
    };

    let res = logout().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(res
        .headers()
        .get_all("set-cookie")
        .iter()
        .any(|v| v.to_str().unwrap().starts_with("access_token=;")));

    let res = whoami(&client, &srv, &format!("Bearer {access}")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/auth/token"))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Repeating the logout is harmless.
    assert_eq!(logout().await.unwrap().status(), StatusCode::NO_CONTENT);

    // Other sessions are unaffected.
    let other = login(&client, &srv, "root", ROOT_PASSWORD).await;
    let res = whoami(&client, &srv, &format!("Bearer {}", token(&other, "access_token"))).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn personal_token_lifecycle() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let pair = login(&client, &srv, "root", ROOT_PASSWORD).await;
    let access = token(&pair, "access_token");

    let res = client
        .post(srv.url("/auth/personal-tokens"))
        .bearer_auth(&access)
        .json(&json!({ "description": "ci deploys", "scopes": ["deploy"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let personal = token(&created, "token");
    let id = created["id"].as_u64().unwrap();

    let res = whoami(&client, &srv, &format!("Token {personal}")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["token_kind"], "personal");
    assert_eq!(body["scopes"], json!(["deploy"]));

    // A personal token is not an access token.
    let res = whoami(&client, &srv, &format!("Bearer {personal}")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/auth/personal-tokens"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: Value = res.json().await.unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["description"], "ci deploys");
    assert!(listed[0].get("token").is_none());

    let delete = |path: String| client.delete(srv.url(&path)).bearer_auth(&access).send();
    assert_eq!(
        delete(format!("/auth/personal-tokens/{id}")).await.unwrap().status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        whoami(&client, &srv, &format!("Token {personal}")).await.status(),
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        delete(format!("/auth/personal-tokens/{id}")).await.unwrap().status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        delete("/auth/personal-tokens/not-a-number".to_string()).await.unwrap().status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn personal_token_needs_a_description() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let pair = login(&client, &srv, "root", ROOT_PASSWORD).await;

    let res = client
        .post(srv.url("/auth/personal-tokens"))
        .bearer_auth(token(&pair, "access_token"))
        .json(&json!({ "description": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn roles_without_the_grant_are_forbidden() {
    let srv = TestServer::spawn().await;
    srv.user_with("viewer", "viewer-password", &["auth:WhoAmI", "auth:CheckPermission"]);
    let client = reqwest::Client::new();
    let pair = login(&client, &srv, "viewer", "viewer-password").await;
    let access = token(&pair, "access_token");

    let res = whoami(&client, &srv, &format!("Bearer {access}")).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["roles"], json!(["viewer-role"]));

    let res = client
        .get(srv.url("/auth/permissions/ReadUser"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let explanation: Value = res.json().await.unwrap();
    assert_eq!(explanation["granted"], false);
    assert_eq!(explanation["required_permission"], "auth:ReadUser");

    let res = client
        .get(srv.url("/auth/permissions/WhoAmI"))
        .bearer_auth(&access)
        .send()
        .await
        .unwrap();
    let explanation: Value = res.json().await.unwrap();
    assert_eq!(explanation["granted"], true);

    let res = client
        .post(srv.url("/auth/personal-tokens"))
        .bearer_auth(&access)
        .json(&json!({ "description": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn grants_are_read_per_request() {
    let srv = TestServer::spawn().await;
    let user = srv.user_with("late", "late-password", &[]);
    let client = reqwest::Client::new();
    let pair = login(&client, &srv, "late", "late-password").await;
    let access = token(&pair, "access_token");

    assert_eq!(
        whoami(&client, &srv, &format!("Bearer {access}")).await.status(),
        StatusCode::FORBIDDEN
    );

    let role = srv.store.create_role("whoami-only").unwrap();
    srv.store.assign_role(user, role.id).unwrap();
    srv.store.grant(role.id, "auth:WhoAmI").unwrap();

    assert_eq!(
        whoami(&client, &srv, &format!("Bearer {access}")).await.status(),
        StatusCode::OK
    );
}
