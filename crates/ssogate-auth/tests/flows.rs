//! End-to-end flows through the public engine API.

use std::sync::Arc;

use ssogate_auth::{
    AccessOptions, AccessParams, AuthorizeOptions, AuthorizeParams, AuthorizeRequestType,
    ClientAuth, ErrorCode, MemoryStorage, OAuthServer, OAuthServerConfig, Storage,
};

fn server_with(config: OAuthServerConfig) -> (OAuthServer, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    storage.set_client(ssogate_auth::Client::new(
        "1234",
        "aabbccdd",
        "http://localhost/cb",
    ));
    let server = OAuthServer::new(config, storage.clone());
    (server, storage)
}

fn authorize(response_type: &str) -> AuthorizeParams {
    AuthorizeParams {
        client_id: "1234".to_string(),
        response_type: response_type.to_string(),
        state: "a".to_string(),
        ..Default::default()
    }
}

fn exchange(code: &str) -> AccessParams {
    AccessParams {
        method: "POST".to_string(),
        grant_type: "authorization_code".to_string(),
        code: code.to_string(),
        client_auth: Some(ClientAuth::new("1234", "aabbccdd")),
        ..Default::default()
    }
}

#[tokio::test]
async fn authorization_code_flow() {
    let (server, _storage) = server_with(OAuthServerConfig::default());

    let mut request = server.handle_authorize_request(authorize("code")).await;
    assert!(request.error().is_none());
    request.build(AuthorizeOptions::authorized()).await.unwrap();

    let response = request.response();
    let code = response.get_str("code").unwrap().to_string();
    assert_eq!(response.get_str("state"), Some("a"));

    let redirect = response.redirect_url().unwrap();
    assert!(redirect.as_str().starts_with("http://localhost/cb?"));
    assert!(redirect.query().unwrap().contains(&format!("code={code}")));

    let mut access = server.handle_access_request(exchange(&code)).await;
    assert!(access.error().is_none());
    access.build(AccessOptions::authorized()).await.unwrap();

    let output = access.response();
    assert!(output.get_str("access_token").is_some());
    assert!(output.get_str("refresh_token").is_some());
    assert_eq!(output.get("expires_in").and_then(|v| v.as_i64()), Some(86_400));
    assert_eq!(output.get_str("token_type"), Some("Bearer"));
}

#[tokio::test]
async fn consumed_code_cannot_be_loaded_again() {
    let (server, storage) = server_with(OAuthServerConfig::default());

    let mut request = server.handle_authorize_request(authorize("code")).await;
    request.build(AuthorizeOptions::authorized()).await.unwrap();
    let code = request.response().get_str("code").unwrap().to_string();

    let mut access = server.handle_access_request(exchange(&code)).await;
    access.build(AccessOptions::authorized()).await.unwrap();

    let err = storage.load_authorize(&code).await.unwrap_err();
    assert!(err.is_not_found());

    let replay = server.handle_access_request(exchange(&code)).await;
    assert_eq!(replay.error().unwrap().code, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn implicit_flow_never_returns_refresh_token() {
    let config = OAuthServerConfig {
        allowed_authorize_types: vec![AuthorizeRequestType::Code, AuthorizeRequestType::Token],
        generate_refresh: true,
        ..Default::default()
    };
    let (server, storage) = server_with(config);

    let mut request = server.handle_authorize_request(authorize("token")).await;
    assert!(request.error().is_none());
    request.build(AuthorizeOptions::authorized()).await.unwrap();

    let response = request.response();
    assert!(response.redirect_in_fragment());
    assert!(response.get("code").is_none());
    assert!(response.get("refresh_token").is_none());
    let token = response.get_str("access_token").unwrap().to_string();
    assert_eq!(response.get_str("state"), Some("a"));

    let url = response.redirect_url().unwrap();
    assert!(url.query().is_none());
    assert!(url.fragment().unwrap().contains("access_token="));

    let stored = storage.load_access(&token).await.unwrap();
    assert!(stored.refresh_token.is_none());
    assert!(stored.authorize_data().is_none());
    assert!(stored.previous_access().is_none());
}

#[tokio::test]
async fn refresh_flow_links_predecessor() {
    let (server, storage) = server_with(OAuthServerConfig::default());

    let mut request = server.handle_authorize_request(authorize("code")).await;
    request.build(AuthorizeOptions::authorized()).await.unwrap();
    let code = request.response().get_str("code").unwrap().to_string();

    let mut first = server.handle_access_request(exchange(&code)).await;
    first.build(AccessOptions::authorized()).await.unwrap();
    let access_1 = first.response().get_str("access_token").unwrap().to_string();
    let refresh_1 = first.response().get_str("refresh_token").unwrap().to_string();

    let stored_1 = storage.load_access(&access_1).await.unwrap();
    assert_eq!(stored_1.authorize_code(), Some(code.as_str()));

    let mut second = server
        .handle_access_request(AccessParams {
            method: "POST".to_string(),
            grant_type: "refresh_token".to_string(),
            refresh_token: refresh_1,
            client_auth: Some(ClientAuth::new("1234", "aabbccdd")),
            ..Default::default()
        })
        .await;
    second
        .build(AccessOptions::authorized().with_client_ip("127.0.0.1"))
        .await
        .unwrap();
    let access_2 = second.response().get_str("access_token").unwrap().to_string();
    assert_ne!(access_1, access_2);

    let stored_2 = storage.load_access(&access_2).await.unwrap();
    assert_eq!(stored_2.previous_access_token(), Some(access_1.as_str()));
    assert_eq!(stored_2.client_ip, "127.0.0.1");
}

#[tokio::test]
async fn error_redirect_carries_code_and_state() {
    let (server, _storage) = server_with(OAuthServerConfig::default());

    let mut request = server.handle_authorize_request(authorize("code")).await;
    let err = request.build(AuthorizeOptions::denied()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);

    let url = request.response().redirect_url().unwrap();
    let query = url.query().unwrap();
    assert!(query.contains("error=access_denied"));
    assert!(query.contains("state=a"));
}
