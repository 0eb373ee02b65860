use std::{env, fs};

use gatehouse_auth::oidc::ResourceMethod;
use gatehouse_auth::{AuthFlow, ClientAuthMethod, ResponseMode};
use gatehouse_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("gatehouse.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
production = true

[logging]
level = "debug"

[auth]
flow = "authorization_code"

[auth.oidc]
discovery_url = "https://login.example.com/tenant/v2.0"
client_id = "my-app"
client_secret = "shh"
redirect_uri = "https://app.example.com/login/callback"
scopes = ["openid", "email"]
request_timeout = "5s"
token_auth_method = "client_secret_basic"

[auth.oidc.extra_auth_params]
prompt = "select_account"

[auth.cookie]
secret = "cookie-secret"

[auth.session]
idle_timeout = "1h"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.auth.flow, AuthFlow::AuthorizationCode);
    assert_eq!(cfg.auth.oidc.client_id, "my-app");
    assert_eq!(cfg.auth.oidc.scope_param(), "openid email");
    assert_eq!(cfg.auth.oidc.request_timeout.as_secs(), 5);
    assert_eq!(cfg.auth.oidc.token_auth_method, ClientAuthMethod::ClientSecretBasic);
    assert_eq!(cfg.auth.oidc.response_mode, ResponseMode::Query);
    assert_eq!(cfg.auth.oidc.extra_auth_params["prompt"], "select_account");
    assert_eq!(cfg.auth.session.idle_timeout.as_secs(), 3600);
    assert!(cfg.relying_party().cookie.secure);

    // 2) Env override should win over file
    unsafe {
        env::set_var("GATEHOUSE__AUTH__OIDC__CLIENT_ID", "from-env");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.auth.oidc.client_id, "from-env");
    unsafe {
        env::remove_var("GATEHOUSE__AUTH__OIDC__CLIENT_ID");
    }

    // 3) Missing discovery endpoint is a startup error
    let invalid_path = dir.path().join("invalid.toml");
    let invalid_toml = r#"
[auth.oidc]
client_id = "my-app"
client_secret = "shh"

[auth.cookie]
secret = "cookie-secret"
"#;
    fs::write(&invalid_path, invalid_toml).expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("oidc.discovery_url is required"));
}

#[test]
fn client_credentials_config_needs_no_cookie_secret() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("machine.toml");
    fs::write(
        &path,
        r#"
[auth]
flow = "client_credentials"

[auth.oidc]
discovery_url = "https://login.example.com"
client_id = "daemon"
client_secret = "shh"

[auth.client_credentials]
scope = "api://resource/.default"

[auth.client_credentials.resource]
url = "https://api.example.com/bookings/check"
method = "POST"
body = { datetime = "2026-03-01T12:00:00Z" }
"#,
    )
    .expect("write toml");

    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.auth.flow, AuthFlow::ClientCredentials);
    assert_eq!(
        cfg.auth.client_credentials.scope.as_deref(),
        Some("api://resource/.default")
    );
    assert_eq!(
        cfg.auth.client_credentials.auth_method,
        ClientAuthMethod::ClientSecretBasic
    );

    let resource = cfg.auth.client_credentials.resource.expect("resource request");
    assert_eq!(resource.url, "https://api.example.com/bookings/check");
    assert_eq!(resource.method, ResourceMethod::Post);
    assert_eq!(
        resource.body,
        Some(serde_json::json!({"datetime": "2026-03-01T12:00:00Z"}))
    );
}
