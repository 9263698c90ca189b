//! Registration and login integration tests.

mod common;

use common::TestApp;
use serde_json::json;
use serial_test::serial;

// ============================================================================
// Registration Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn register_without_code_creates_patient() {
    let app = TestApp::spawn().await;
    let username = TestApp::unique_username();
    let email = TestApp::unique_email();

    let response = app
        .post_public(
            "/register",
            json!({
                "username": username,
                "password": "senha123",
                "email": email,
                "birth_date": "01/01/2000"
            }),
        )
        .await;

    assert_status!(response, 201);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["user"]["role"].as_str().unwrap(), "patient");
    assert_eq!(body["user"]["email"].as_str().unwrap(), email);
    assert!(body["access_token"].as_str().is_some());
    assert!(body["user"]["password_hash"].is_null());
}

#[tokio::test]
#[serial]
async fn register_with_master_code_creates_psychologist() {
    let app = TestApp::spawn().await;
    let code = app.seed_master_code();

    let response = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": TestApp::unique_email(),
                "birth_date": "15/06/1985",
                "code": code
            }),
        )
        .await;

    assert_status!(response, 201);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["user"]["role"].as_str().unwrap(), "psychologist");
}

#[tokio::test]
#[serial]
async fn register_with_invalid_code_returns_422() {
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();

    let response = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": email,
                "birth_date": "01/01/2000",
                "code": "XXXX-XXXX"
            }),
        )
        .await;

    assert_status!(response, 422);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["detail"].as_str().unwrap(), "Código de Acesso inválido.");

    // The account must not exist after the rollback: login fails.
    let login = app
        .post_public("/login", json!({ "email": email, "password": "senha123" }))
        .await;
    assert_status!(login, 401);
}

#[tokio::test]
#[serial]
async fn master_code_is_single_use() {
    let app = TestApp::spawn().await;
    let code = app.seed_master_code();

    let first = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": TestApp::unique_email(),
                "birth_date": "01/01/1990",
                "code": code
            }),
        )
        .await;
    assert_status!(first, 201);

    let second = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": TestApp::unique_email(),
                "birth_date": "01/01/1990",
                "code": code
            }),
        )
        .await;
    assert_status!(second, 422);
}

#[tokio::test]
#[serial]
async fn concurrent_registrations_redeem_master_code_once() {
    let app = TestApp::spawn().await;
    let code = app.seed_master_code();

    let req_a = app.post_public(
        "/register",
        json!({
            "username": TestApp::unique_username(),
            "password": "senha123",
            "email": TestApp::unique_email(),
            "birth_date": "01/01/1990",
            "code": code.clone()
        }),
    );
    let req_b = app.post_public(
        "/register",
        json!({
            "username": TestApp::unique_username(),
            "password": "senha123",
            "email": TestApp::unique_email(),
            "birth_date": "01/01/1990",
            "code": code.clone()
        }),
    );

    let (resp_a, resp_b) = tokio::join!(req_a, req_b);

    let statuses = [resp_a.status().as_u16(), resp_b.status().as_u16()];
    assert_eq!(
        statuses.iter().filter(|&&s| s == 201).count(),
        1,
        "Exactly one registration should claim the code, got {:?}",
        statuses
    );

    // The loser's account must have rolled back with the failed redemption.
    let validate = app
        .get_public(&format!("/codes/master/validate/{}", code))
        .await;
    let body: serde_json::Value = validate.json().await.expect("Failed to parse response");
    assert!(!body["valid"].as_bool().unwrap());
}

#[tokio::test]
#[serial]
async fn concurrent_registrations_with_same_username_create_one_account() {
    let app = TestApp::spawn().await;
    let username = TestApp::unique_username();

    let req_a = app.post_public(
        "/register",
        json!({
            "username": username,
            "password": "senha123",
            "email": TestApp::unique_email(),
            "birth_date": "01/01/2000"
        }),
    );
    let req_b = app.post_public(
        "/register",
        json!({
            "username": username,
            "password": "senha123",
            "email": TestApp::unique_email(),
            "birth_date": "01/01/2000"
        }),
    );

    let (resp_a, resp_b) = tokio::join!(req_a, req_b);

    let statuses = [resp_a.status().as_u16(), resp_b.status().as_u16()];
    assert_eq!(
        statuses.iter().filter(|&&s| s == 201).count(),
        1,
        "Exactly one registration should win the username, got {:?}",
        statuses
    );
    assert!(
        statuses.contains(&409),
        "The loser should get a conflict, got {:?}",
        statuses
    );
}

#[tokio::test]
#[serial]
async fn register_duplicate_username_returns_409() {
    let app = TestApp::spawn().await;
    let username = TestApp::unique_username();

    let first = app
        .post_public(
            "/register",
            json!({
                "username": username,
                "password": "senha123",
                "email": TestApp::unique_email(),
                "birth_date": "01/01/2000"
            }),
        )
        .await;
    assert_status!(first, 201);

    let second = app
        .post_public(
            "/register",
            json!({
                "username": username,
                "password": "senha123",
                "email": TestApp::unique_email(),
                "birth_date": "01/01/2000"
            }),
        )
        .await;
    assert_status!(second, 409);

    let body: serde_json::Value = second.json().await.expect("Failed to parse response");
    assert_eq!(
        body["detail"].as_str().unwrap(),
        "Nome de usuário já cadastrado."
    );
}

#[tokio::test]
#[serial]
async fn register_duplicate_email_returns_409() {
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();

    let first = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": email,
                "birth_date": "01/01/2000"
            }),
        )
        .await;
    assert_status!(first, 201);

    let second = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": email,
                "birth_date": "01/01/2000"
            }),
        )
        .await;
    assert_status!(second, 409);
}

#[tokio::test]
#[serial]
async fn register_invalid_email_returns_422() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": "nao-e-email",
                "birth_date": "01/01/2000"
            }),
        )
        .await;

    assert_status!(response, 422);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["detail"].as_str().unwrap(), "E-mail inválido.");
}

#[tokio::test]
#[serial]
async fn register_invalid_birth_date_returns_422() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": TestApp::unique_email(),
                "birth_date": "2000-01-01"
            }),
        )
        .await;

    assert_status!(response, 422);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(
        body["detail"].as_str().unwrap(),
        "Data de nascimento inválida."
    );
}

#[tokio::test]
#[serial]
async fn register_short_password_returns_422() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "ab",
                "email": TestApp::unique_email(),
                "birth_date": "01/01/2000"
            }),
        )
        .await;

    assert_status!(response, 422);
}

#[tokio::test]
#[serial]
async fn register_blank_username_returns_422() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/register",
            json!({
                "username": "   ",
                "password": "senha123",
                "email": TestApp::unique_email(),
                "birth_date": "01/01/2000"
            }),
        )
        .await;

    assert_status!(response, 422);
}

// ============================================================================
// Login Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn login_returns_token_for_valid_credentials() {
    let app = TestApp::spawn().await;
    let user = app.register_patient().await;

    let response = app
        .post_public(
            "/login",
            json!({ "email": user.email, "password": user.password }),
        )
        .await;

    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["user"]["id"].as_str().unwrap(), user.id.to_string());
    assert!(body["access_token"].as_str().is_some());
}

#[tokio::test]
#[serial]
async fn login_wrong_password_returns_401() {
    let app = TestApp::spawn().await;
    let user = app.register_patient().await;

    let response = app
        .post_public(
            "/login",
            json!({ "email": user.email, "password": "senha_errada" }),
        )
        .await;

    assert_status!(response, 401);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["detail"].as_str().unwrap(), "Usuário ou senha inválidos.");
}

#[tokio::test]
#[serial]
async fn login_unknown_email_returns_same_message() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/login",
            json!({ "email": TestApp::unique_email(), "password": "senha123" }),
        )
        .await;

    assert_status!(response, 401);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["detail"].as_str().unwrap(), "Usuário ou senha inválidos.");
}

#[tokio::test]
#[serial]
async fn login_email_is_case_insensitive() {
    let app = TestApp::spawn().await;
    let user = app.register_patient().await;

    let response = app
        .post_public(
            "/login",
            json!({ "email": user.email.to_uppercase(), "password": user.password }),
        )
        .await;

    assert_status!(response, 200);
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn me_returns_current_user() {
    let app = TestApp::spawn().await;
    let user = app.register_patient().await;

    let response = app.get("/me", &user.access_token).await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["id"].as_str().unwrap(), user.id.to_string());
    assert_eq!(body["username"].as_str().unwrap(), user.username);
}

#[tokio::test]
#[serial]
async fn me_without_token_returns_401() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/me").await;
    assert_status!(response, 401);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["detail"].as_str().unwrap(), "Sessão ausente. Faça login.");
}

#[tokio::test]
#[serial]
async fn me_with_garbage_token_returns_401() {
    let app = TestApp::spawn().await;

    let response = app.get("/me", "nao.e.um.token").await;
    assert_status!(response, 401);
}

// ============================================================================
// Master Code Validation Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn validate_master_code_reports_redeemable() {
    let app = TestApp::spawn().await;
    let code = app.seed_master_code();

    let response = app
        .get_public(&format!("/codes/master/validate/{}", code))
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert!(body["valid"].as_bool().unwrap());
}

#[tokio::test]
#[serial]
async fn validate_master_code_reports_spent_code() {
    let app = TestApp::spawn().await;
    let code = app.seed_master_code();

    let register = app
        .post_public(
            "/register",
            json!({
                "username": TestApp::unique_username(),
                "password": "senha123",
                "email": TestApp::unique_email(),
                "birth_date": "01/01/1990",
                "code": code
            }),
        )
        .await;
    assert_status!(register, 201);

    let response = app
        .get_public(&format!("/codes/master/validate/{}", code))
        .await;
    assert_status!(response, 200);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    assert!(!body["valid"].as_bool().unwrap());
}

// ============================================================================
// Admin Master Code Issuance Tests
// ============================================================================

#[tokio::test]
#[serial]
async fn create_master_code_with_admin_token_returns_201() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/codes/master", app.base_url))
        .header("x-admin-token", "test-admin-token")
        .send()
        .await
        .expect("Failed to send request");

    assert_status!(response, 201);

    let body: serde_json::Value = response.json().await.expect("Failed to parse response");
    let code = body["code"].as_str().unwrap();
    assert_eq!(code.len(), 9);
    assert_eq!(code.chars().filter(|&c| c == '-').count(), 1);
}

#[tokio::test]
#[serial]
async fn create_master_code_without_token_returns_401() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/codes/master", app.base_url))
        .send()
        .await
        .expect("Failed to send request");

    assert_status!(response, 401);
}

#[tokio::test]
#[serial]
async fn create_master_code_with_wrong_token_returns_401() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/codes/master", app.base_url))
        .header("x-admin-token", "token-errado")
        .send()
        .await
        .expect("Failed to send request");

    assert_status!(response, 401);
}
