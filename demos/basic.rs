//! Minimal pipemux example: an API-key middleware, a grouped JSON/CSV API and
//! a centralized error handler.
//!
//! Run with:
//!   RUST_LOG=pipemux=debug cargo run --example basic
//!
//! Try:
//!   curl -H 'x-api-key: demo' http://localhost:3000/api/users/42
//!   curl -H 'x-api-key: demo' http://localhost:3000/api/users.csv
//!   curl -H 'x-api-key: demo' -X POST http://localhost:3000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl http://localhost:3000/api/users/42          # 401
//!   curl -H 'x-api-key: demo' http://localhost:3000/api/users/x   # 400

use pipemux::{Context, Error, Mux, Server, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
struct User {
    id: i64,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let mut mux = Mux::new();

    mux.handle_func("GET /healthz", |ctx| Box::pin(async move {
        ctx.write_text(StatusCode::OK, "ok")
    }));

    // Everything registered from here on requires an API key.
    mux.pre(|ctx| Box::pin(async move {
        match ctx.header("x-api-key") {
            Some("demo") => {
                ctx.set("caller", "demo".to_owned());
                Ok(())
            }
            _ => Err(Error::msg("unauthorized")),
        }
    }));
    mux.set_error_handler(error_handler);

    let mut api = mux.group("/api");
    api.handle_func("GET /users/{id}", |ctx| Box::pin(async move {
        let id = ctx.path_int("id", 10, 64)?;
        ctx.write_json(StatusCode::OK, &User { id, name: "alice".into() })
    }));
    api.handle_func("GET /users.csv", |ctx| Box::pin(async move {
        ctx.write_csv(StatusCode::OK, false, ',', [["id", "name"], ["1", "alice"], ["2", "bob"]])
    }));
    api.handle_func("POST /users", |ctx| Box::pin(async move {
        let input: NewUser = ctx.read_json().await?;
        ctx.set_header(http::header::LOCATION, http::HeaderValue::from_static("/api/users/99"));
        ctx.write_json(StatusCode::CREATED, &User { id: 99, name: input.name })
    }));

    Server::bind("0.0.0.0:3000")
        .serve(mux)
        .await
        .expect("server error");
}

fn error_handler(ctx: &mut Context, err: Error) {
    let status = match &err {
        Error::Message(msg) if msg == "unauthorized" => StatusCode::UNAUTHORIZED,
        Error::Parse(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(%status, error = %err, "request failed");
    if ctx.write_json(status, &serde_json::json!({ "error": err.to_string() })).is_err() {
        ctx.error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
    }
}
