use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use tokengate::config::{AuthConfig, LOGIN_METHOD, REGISTER_METHOD};
use tokengate::error::{AppError, AppResult};
use tokengate::identity::{
    AuthService, CallContext, ChangePasswordRequest, InMemoryCredentials, LoginRequest, RegisterRequest, RevocationStore,
    TokenCodec, UserRecord, ROLE_CUSTOMER,
};
use tokengate::interceptor::{guarded, handler_fn, Request};

const LOGOUT_METHOD: &str = "/auth.AuthService/Logout";
const PROFILE_METHOD: &str = "/auth.AuthService/GetProfile";
const CHANGE_PASSWORD_METHOD: &str = "/auth.AuthService/ChangePassword";
const HELLO_METHOD: &str = "/service.HelloWorldService/HelloWorld";

fn decode<T: serde::de::DeserializeOwned>(payload: Value) -> AppResult<T> {
    serde_json::from_value(payload).map_err(|e| AppError::exec("bad_request".to_string(), e.to_string()))
}

fn dispatch(svc: &AuthService, ctx: CallContext, req: Request) -> AppResult<Value> {
    let now = Utc::now();
    match req.method.as_str() {
        REGISTER_METHOD => {
            let register: RegisterRequest = decode(req.payload)?;
            let user_id = svc.register(&register, now)?;
            Ok(json!({"message": "User is Registered", "user_id": user_id}))
        }
        LOGIN_METHOD => {
            let login: LoginRequest = decode(req.payload)?;
            let resp = svc.login(&login, now)?;
            Ok(json!({"message": "Login Success", "access_token": resp.access_token}))
        }
        LOGOUT_METHOD => {
            svc.logout(&ctx, now)?;
            Ok(json!({"message": "Logout Success"}))
        }
        CHANGE_PASSWORD_METHOD => {
            let change: ChangePasswordRequest = decode(req.payload)?;
            svc.change_password(&ctx, &change)?;
            Ok(json!({"message": "Change Password Success"}))
        }
        PROFILE_METHOD => {
            let c = svc.profile(&ctx)?;
            Ok(json!({"user_id": c.sub, "email": c.email, "full_name": c.full_name, "role_code": c.role}))
        }
        HELLO_METHOD => {
            let name = req.payload.get("name").and_then(|v| v.as_str()).unwrap_or("world");
            Ok(json!({"message": format!("Hello {}", name)}))
        }
        other => Err(AppError::exec("unimplemented".to_string(), format!("unknown method {}", other))),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let cfg = AuthConfig::from_env().context("loading authentication config")?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "tokengate", "tokengate starting: RUST_LOG='{}', config={:?}", rust_log, cfg);

    let codec = Arc::new(TokenCodec::new(&cfg));
    let revocations = RevocationStore::new();
    let sweeper = revocations.spawn_sweeper(cfg.sweep_interval);

    let creds = InMemoryCredentials::new();
    creds.insert(UserRecord {
        id: uuid::Uuid::new_v4().to_string(),
        email: "demo@example.com".into(),
        full_name: "Demo Customer".into(),
        password_hash: tokengate::security::hash_password("demo")?,
        role: ROLE_CUSTOMER.into(),
        created_at: Utc::now(),
    });
    let svc = Arc::new(AuthService::new(Arc::new(creds), codec.clone(), revocations.clone()));

    let business = {
        let svc = svc.clone();
        handler_fn(move |ctx, req| {
            let svc = svc.clone();
            async move { dispatch(&svc, ctx, req) }
        })
    };
    let chain = guarded(&cfg, codec, revocations, business);

    // Scripted session: register, login, authenticated calls, logout, replay of the revoked token.
    let register = chain
        .serve(Request::new(REGISTER_METHOD).with_payload(json!({
            "full_name": "New Customer",
            "email": "new@example.com",
            "password": "pw",
            "password_confirmation": "pw",
        })))
        .await;
    info!(target: "tokengate", "register -> {:?}", register);
    let login = chain
        .serve(Request::new(LOGIN_METHOD).with_payload(json!({"email": "demo@example.com", "password": "demo"})))
        .await;
    info!(target: "tokengate", "login -> {:?}", login);
    let token = login
        .ok()
        .and_then(|v| v.get("access_token").and_then(|t| t.as_str()).map(str::to_string))
        .context("demo login did not return a token")?;

    let hello = chain.serve(Request::new(HELLO_METHOD).with_bearer(&token).with_payload(json!({"name": "Demo"}))).await;
    info!(target: "tokengate", "hello -> {:?}", hello);
    let profile = chain.serve(Request::new(PROFILE_METHOD).with_bearer(&token)).await;
    info!(target: "tokengate", "profile -> {:?}", profile);
    let change = chain
        .serve(Request::new(CHANGE_PASSWORD_METHOD).with_bearer(&token).with_payload(json!({
            "old_password": "demo",
            "new_password": "demo2",
            "new_password_confirmation": "demo2",
        })))
        .await;
    info!(target: "tokengate", "change password -> {:?}", change);
    let logout = chain.serve(Request::new(LOGOUT_METHOD).with_bearer(&token)).await;
    info!(target: "tokengate", "logout -> {:?}", logout);
    let replay = chain.serve(Request::new(HELLO_METHOD).with_bearer(&token)).await;
    info!(target: "tokengate", "replay after logout -> {:?}", replay);
    let anonymous = chain.serve(Request::new(HELLO_METHOD)).await;
    info!(target: "tokengate", "anonymous -> {:?}", anonymous);

    sweeper.abort();
    Ok(())
}
