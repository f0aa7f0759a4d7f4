mod common;

use std::sync::{Arc, Mutex};

use common::get;
use pipemux::{Context, Error, HandlerResult, Mux, StatusCode};

type Trail = Arc<Mutex<Vec<&'static str>>>;

fn mark(trail: &Trail, name: &'static str) -> impl for<'a> Fn(&'a mut Context) -> pipemux::BoxFuture<'a, HandlerResult> + Send + Sync + 'static {
    let trail = Arc::clone(trail);
    move |_ctx| {
        trail.lock().unwrap().push(name);
        Box::pin(async move { Ok(()) })
    }
}

fn take(trail: &Trail) -> Vec<&'static str> {
    std::mem::take(&mut *trail.lock().unwrap())
}

#[tokio::test]
async fn group_prefix_goes_between_method_and_path() {
    let mux = Mux::new();
    let mut group = mux.group("/group");
    group.handle_func("GET /yoo", |ctx| Box::pin(async move {
        ctx.write_json(StatusCode::ACCEPTED, &serde_json::json!({ "boo": "yoo" }))
    }));
    let router = mux.into_router();

    let res = get(&router, "/group/yoo").await;
    assert_eq!(res.status, StatusCode::ACCEPTED);
    assert_eq!(res.header("content-type"), Some("application/json"));
    assert_eq!(res.body, "{\"boo\":\"yoo\"}\n");

    assert_eq!(get(&router, "/yoo").await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn parent_middleware_added_later_does_not_reach_the_group() {
    let trail = Trail::default();
    let mut mux = Mux::new();
    mux.pre(mark(&trail, "m1"));

    let mut group = mux.group("/g");
    mux.pre(mark(&trail, "m2"));

    group.handle_func("/route", mark(&trail, "handler"));
    mux.handle_func("/root", mark(&trail, "handler"));
    let router = mux.into_router();

    get(&router, "/g/route").await;
    assert_eq!(take(&trail), ["m1", "handler"]);

    get(&router, "/root").await;
    assert_eq!(take(&trail), ["m1", "m2", "handler"]);
}

#[tokio::test]
async fn group_middleware_stay_inside_the_group() {
    let trail = Trail::default();
    let mut mux = Mux::new();
    mux.pre(mark(&trail, "root"));

    let mut admin = mux.group("/admin");
    admin.pre(mark(&trail, "admin"));
    let mut public = mux.group("/public");
    public.pre(mark(&trail, "public"));

    admin.handle_func("/x", mark(&trail, "handler"));
    public.handle_func("/x", mark(&trail, "handler"));
    mux.handle_func("/x", mark(&trail, "handler"));
    let router = mux.into_router();

    get(&router, "/admin/x").await;
    assert_eq!(take(&trail), ["root", "admin", "handler"]);

    get(&router, "/public/x").await;
    assert_eq!(take(&trail), ["root", "public", "handler"]);

    get(&router, "/x").await;
    assert_eq!(take(&trail), ["root", "handler"]);
}

#[tokio::test]
async fn nested_groups_concatenate_prefixes_and_chains() {
    let trail = Trail::default();
    let mut mux = Mux::new();
    mux.pre(mark(&trail, "root"));

    let mut v1 = mux.group("/v1");
    v1.pre(mark(&trail, "v1"));
    let mut users = v1.group("/users");
    users.pre(mark(&trail, "users"));
    assert_eq!(users.prefix(), "/v1/users");

    users.handle_func("GET /{id}", |ctx| Box::pin(async move {
        let id = ctx.path_int("id", 10, 64)?;
        ctx.write_json(StatusCode::OK, &id)
    }));
    let router = mux.into_router();

    let res = get(&router, "/v1/users/7").await;
    assert_eq!(res.body, "7\n");
    assert_eq!(take(&trail), ["root", "v1", "users"]);
}

#[tokio::test]
async fn group_error_handler_does_not_change_the_parent() {
    let mut mux = Mux::new();
    let mut api = mux.group("/api");
    api.set_error_handler(|ctx, err| {
        let body = serde_json::json!({ "error": err.to_string() });
        if ctx.write_json(StatusCode::BAD_REQUEST, &body).is_err() {
            ctx.error(StatusCode::INTERNAL_SERVER_ERROR, "encoding error");
        }
    });

    fn fail(_ctx: &mut Context) -> pipemux::BoxFuture<'_, HandlerResult> {
        Box::pin(async move { Err(Error::msg("boom")) })
    }
    api.handle_func("/fail", fail);
    mux.handle_func("/fail", fail);
    let router = mux.into_router();

    let res = get(&router, "/api/fail").await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.body, "{\"error\":\"boom\"}\n");

    let res = get(&router, "/fail").await;
    assert_eq!(res.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.body, "boom\n");
}

#[tokio::test]
async fn nested_group_inherits_the_error_handler_in_effect() {
    let mux = Mux::new();
    let mut api = mux.group("/api");
    api.set_error_handler(|ctx, _err| ctx.error(StatusCode::SERVICE_UNAVAILABLE, "try later"));
    let mut inner = api.group("/inner");
    inner.handle_func("/fail", |_ctx| Box::pin(async move { Err(Error::msg("boom")) }));
    let router = mux.into_router();

    let res = get(&router, "/api/inner/fail").await;
    assert_eq!(res.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(res.body, "try later\n");
}

#[test]
#[should_panic(expected = "after the mux was handed over")]
fn registering_on_a_group_after_serving_starts_panics() {
    let mux = Mux::new();
    let mut group = mux.group("/late");
    let _router = mux.into_router();
    group.handle_func("/x", |_ctx| Box::pin(async move { Ok(()) }));
}
