//! End-to-end HTTP flows against a server on an ephemeral port, SSO backend
//! with the in-memory store.

use reqwest::{StatusCode, header};
use serde_json::Value;
use ssogate_auth::Client;
use ssogate_server::config::UserCredential;
use ssogate_server::{AppConfig, build_app, hash_password};
use tokio::task::JoinHandle;

fn user(uid: i64, username: &str, password: &str) -> UserCredential {
    UserCredential {
        uid,
        username: username.into(),
        password_hash: hash_password(password).expect("hash"),
    }
}

fn base_config() -> AppConfig {
    AppConfig {
        clients: vec![Client::new("1234", "aabbccdd", "http://localhost/cb")],
        users: vec![user(7, "alice", "wonderland"), user(8, "bob", "builder")],
        ..Default::default()
    }
}

async fn start_server() -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    start_server_with(base_config()).await
}

async fn start_server_with(
    config: AppConfig,
) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let app = build_app(&config).await.expect("build app");

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn location(response: &reqwest::Response) -> reqwest::Url {
    let value = response.headers()[header::LOCATION].to_str().unwrap();
    reqwest::Url::parse(value).unwrap()
}

fn query_value(url: &reqwest::Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

fn session_cookie(response: &reqwest::Response) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("ssogate_session="))
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string()
}

async fn password_login(base: &str) -> reqwest::Response {
    http()
        .post(format!("{base}/authorize"))
        .form(&[
            ("response_type", "code"),
            ("client_id", "1234"),
            ("state", "xyz"),
            ("username", "alice"),
            ("password", "wonderland"),
        ])
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn code_flow_session_and_logout() {
    let (base, shutdown, server) = start_server().await;
    let client = http();

    let response = password_login(&base).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let redirect = location(&response);
    assert!(redirect.as_str().starts_with("http://localhost/cb?"));
    assert_eq!(query_value(&redirect, "state").as_deref(), Some("xyz"));
    let code = query_value(&redirect, "code").expect("code");
    let cookie = session_cookie(&response);

    let token: Value = client
        .post(format!("{base}/token"))
        .basic_auth("1234", Some("aabbccdd"))
        .form(&[("grant_type", "authorization_code"), ("code", code.as_str())])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(token["access_token"].is_string());
    assert!(token["refresh_token"].is_string());
    assert_eq!(token["token_type"], "Bearer");

    let session = client
        .get(format!("{base}/session"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(session.status(), StatusCode::OK);
    let body: Value = session.json().await.unwrap();
    assert_eq!(body["uids"], serde_json::json!([7]));

    // The cookie alone signs the user in again.
    let again = client
        .get(format!("{base}/authorize"))
        .query(&[("response_type", "code"), ("client_id", "1234")])
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), StatusCode::SEE_OTHER);
    assert!(query_value(&location(&again), "code").is_some());

    let logout = client
        .post(format!("{base}/logout"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);

    let after = client
        .get(format!("{base}/session"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::UNAUTHORIZED);

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn wrong_password_redirects_with_access_denied() {
    let (base, shutdown, server) = start_server().await;

    let response = http()
        .post(format!("{base}/authorize"))
        .form(&[
            ("response_type", "code"),
            ("client_id", "1234"),
            ("state", "s1"),
            ("username", "alice"),
            ("password", "nope"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let redirect = location(&response);
    assert_eq!(query_value(&redirect, "error").as_deref(), Some("access_denied"));
    assert_eq!(query_value(&redirect, "state").as_deref(), Some("s1"));
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn anonymous_and_unknown_client_are_rejected() {
    let (base, shutdown, server) = start_server().await;
    let client = http();

    let anonymous = client
        .get(format!("{base}/authorize"))
        .query(&[("response_type", "code"), ("client_id", "1234")])
        .send()
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let unknown = client
        .get(format!("{base}/authorize"))
        .query(&[("response_type", "code"), ("client_id", "nobody")])
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    let body: Value = unknown.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized_client");

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn token_errors_follow_rfc6749() {
    let (base, shutdown, server) = start_server().await;

    let response = http()
        .post(format!("{base}/token"))
        .basic_auth("1234", Some("aabbccdd"))
        .form(&[("grant_type", "authorization_code"), ("code", "bogus")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_grant");
    assert!(body.get("access_token").is_none());

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn login_sets_session_without_redirect() {
    let (base, shutdown, server) = start_server().await;

    let response = http()
        .post(format!("{base}/authorize"))
        .form(&[
            ("response_type", "login"),
            ("username", "alice"),
            ("password", "wonderland"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let body: Value = response.json().await.unwrap();
    assert!(body["expires_in"].as_i64().unwrap() > 0);

    let session: Value = http()
        .get(format!("{base}/session"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(session["uids"], serde_json::json!([7]));

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn second_account_joins_cookie_session() {
    let mut config = base_config();
    config.sso.enable_multiple_accounts = true;
    let (base, shutdown, server) = start_server_with(config).await;
    let client = http();

    let first = password_login(&base).await;
    assert_eq!(first.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie(&first);

    let second = client
        .post(format!("{base}/authorize"))
        .header(header::COOKIE, &cookie)
        .form(&[
            ("response_type", "code"),
            ("client_id", "1234"),
            ("username", "bob"),
            ("password", "builder"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::SEE_OTHER);
    assert!(query_value(&location(&second), "code").is_some());
    // Same parent session, re-issued
    assert_eq!(session_cookie(&second), cookie);

    let session: Value = client
        .get(format!("{base}/session"))
        .header(header::COOKIE, &cookie)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let mut uids: Vec<i64> = session["uids"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_i64().unwrap())
        .collect();
    uids.sort_unstable();
    assert_eq!(uids, vec![7, 8]);

    let _ = shutdown.send(());
    let _ = server.await;
}

#[tokio::test]
async fn bad_password_with_live_cookie_is_denied() {
    let (base, shutdown, server) = start_server().await;

    let first = password_login(&base).await;
    let cookie = session_cookie(&first);

    let response = http()
        .post(format!("{base}/authorize"))
        .header(header::COOKIE, &cookie)
        .form(&[
            ("response_type", "code"),
            ("client_id", "1234"),
            ("username", "bob"),
            ("password", "wrong"),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        query_value(&location(&response), "error").as_deref(),
        Some("access_denied")
    );

    let _ = shutdown.send(());
    let _ = server.await;
}
