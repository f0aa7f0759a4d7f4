#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use pipemux::{Method, Router, StatusCode};

pub struct Reply {
    pub status: StatusCode,
    pub headers: http::HeaderMap,
    pub body: String,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn send(router: &Router, method: Method, uri: &str, body: &'static str) -> Reply {
    let req = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap();
    into_reply(router.call(req).await).await
}

pub async fn send_request(router: &Router, req: http::Request<Full<Bytes>>) -> Reply {
    into_reply(router.call(req).await).await
}

pub async fn get(router: &Router, uri: &str) -> Reply {
    send(router, Method::GET, uri, "").await
}

async fn into_reply(res: pipemux::Response) -> Reply {
    let (parts, body) = res.into_parts();
    let bytes = body.collect().await.unwrap().to_bytes();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: String::from_utf8(bytes.to_vec()).unwrap(),
    }
}
