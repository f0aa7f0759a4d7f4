use pipemux::{Mux, Server, StatusCode};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn roundtrip(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    String::from_utf8(raw).unwrap()
}

#[tokio::test]
async fn serves_over_tcp_and_shuts_down_gracefully() {
    let mut mux = Mux::new();
    mux.pre(|ctx| Box::pin(async move {
        let peer = ctx.true_client_ip();
        ctx.set("peer", peer);
        Ok(())
    }));
    let mut group = mux.group("/group");
    group.handle_func("GET /yoo", |ctx| Box::pin(async move {
        ctx.write_json(StatusCode::ACCEPTED, &serde_json::json!({ "boo": "yoo" }))
    }));
    group.handle_func("GET /peer", |ctx| Box::pin(async move {
        let peer = ctx.try_value::<String>("peer")?.clone();
        ctx.write_text(StatusCode::OK, &peer)
    }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let server = Server::from_listener(listener).with_shutdown(async move {
        let _ = stopped.await;
    });
    let addr = server.local_addr().unwrap();
    let serving = tokio::spawn(server.serve(mux));

    let response = roundtrip(addr, "GET /group/yoo HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    let lower = response.to_ascii_lowercase();
    assert!(response.starts_with("HTTP/1.1 202"), "{response}");
    assert!(lower.contains("content-type: application/json"), "{response}");
    assert!(response.ends_with("{\"boo\":\"yoo\"}\n"), "{response}");

    let response = roundtrip(addr, "GET /group/peer HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(response.contains("\r\n\r\n127.0.0.1:"), "{response}");

    let response = roundtrip(
        addr,
        "GET /group/peer HTTP/1.1\r\nHost: x\r\nTrue-Client-IP: 198.51.100.4\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.ends_with("\r\n\r\n198.51.100.4"), "{response}");

    let response = roundtrip(addr, "GET /nowhere HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");

    stop.send(()).unwrap();
    serving.await.unwrap().unwrap();
}
