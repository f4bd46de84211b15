//! Integration tests for the request pipeline using wiremock.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use ferry::tower::ServiceExt;
use ferry::{Client, Error, Executor, Method, Middleware, Request, opt};
use serde::{Deserialize, Serialize};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, body_string, header, method, path, query_param},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
}

async fn test_server() -> MockServer {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/test/get"))
        .respond_with(ResponseTemplate::new(200).set_body_string("this is a get request"))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/test/post"))
        .respond_with(ResponseTemplate::new(200).set_body_string("this is a post request"))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/test/timeout"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("too late")
                .set_delay(Duration::from_secs(1)),
        )
        .mount(&mock_server)
        .await;

    mock_server
}

#[tokio::test]
async fn test_get_request() {
    let mock_server = test_server().await;

    let response = ferry::get(
        &format!("{}/test/get", mock_server.uri()),
        &[
            opt::timeout(Duration::from_millis(500)),
            opt::middleware(Middleware::expect_status(200)),
        ],
    )
    .await
    .expect("response");

    assert_eq!(response.status(), 200);
    assert_eq!(response.status_line(), "200 OK");
    assert_eq!(response.text(), "this is a get request");
}

#[tokio::test]
async fn test_post_form_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/test/post"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .and(body_string("a=1&b=2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("this is a post request"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::new();
    let response = client
        .post_form(
            &format!("{}/test/post", mock_server.uri()),
            [("b", "2"), ("a", "1")],
            &[opt::middleware(Middleware::expect_status(200))],
        )
        .await
        .expect("response");

    assert_eq!(response.text(), "this is a post request");
}

#[tokio::test]
async fn test_timeout() {
    let mock_server = test_server().await;

    let result = ferry::get(
        &format!("{}/test/timeout", mock_server.uri()),
        &[
            opt::timeout(Duration::from_millis(100)),
            opt::middleware(Middleware::expect_status(200)),
        ],
    )
    .await;

    assert!(matches!(result, Err(Error::Timeout)), "{result:?}");
}

#[tokio::test]
async fn test_json_body() {
    let mock_server = MockServer::start().await;

    let input = User {
        id: 0,
        name: "Bob".to_string(),
    };
    let output = User {
        id: 42,
        name: "Bob".to_string(),
    };

    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(&input))
        .respond_with(ResponseTemplate::new(201).set_body_json(&output))
        .mount(&mock_server)
        .await;

    let client = Client::new();
    let request =
        Request::parse(Method::POST, &format!("{}/users", mock_server.uri())).expect("request");

    let response = client
        .execute(request, &[opt::json(input)])
        .await
        .expect("response");

    assert_eq!(response.status(), 201);
    let body: User = response.json().expect("json");
    assert_eq!(body, output);
}

#[tokio::test]
async fn test_query_and_headers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "ferry boat"))
        .and(query_param("page", "2"))
        .and(header("Accept", "application/json"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = Client::builder()
        .option(opt::header("Accept", "text/plain"))
        .option(opt::basic_auth("user", "pass"))
        .build();

    let response = client
        .get(
            &format!("{}/search?page=9", mock_server.uri()),
            &[
                opt::header("Accept", "application/json"),
                opt::query("q", "ferry boat"),
                opt::query("page", "2"),
            ],
        )
        .await
        .expect("response");

    assert!(response.is_success());
}

#[tokio::test]
async fn test_cookies_are_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/cookies"))
        .and(header("Cookie", "session=abc; note=hello+world"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let response = ferry::get(
        &format!("{}/cookies", mock_server.uri()),
        &[
            opt::cookie("session", "abc"),
            opt::cookie("note", "hello world"),
        ],
    )
    .await
    .expect("response");

    assert_eq!(response.status(), 204);
}

#[tokio::test]
async fn test_retry_until_expected_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .expect(3) // Initial + 2 retries
        .mount(&mock_server)
        .await;

    let result = ferry::get(
        &format!("{}/flaky", mock_server.uri()),
        &[
            opt::retry_times(2),
            opt::middleware(Middleware::expect_status(200)),
        ],
    )
    .await;

    let Err(err) = result else {
        panic!("expected an error, got {result:?}");
    };
    assert_eq!(err.status(), Some(503));
    assert!(err.to_string().contains("503 Service Unavailable"));
    assert!(err.to_string().contains("try later"));
}

#[tokio::test]
async fn test_no_retry_without_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/not-found"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1) // A 404 is a response, not an error
        .mount(&mock_server)
        .await;

    let response = ferry::get(
        &format!("{}/not-found", mock_server.uri()),
        &[opt::retry_times(3)],
    )
    .await
    .expect("response");

    assert_eq!(response.status(), 404);
    assert!(response.is_client_error());
}

#[tokio::test]
async fn test_connection_refused_is_retried() {
    // Bind then drop a listener to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let count = Middleware::from_fn(move |request, next: Executor| {
        counter.fetch_add(1, Ordering::SeqCst);
        next.oneshot(request)
    });

    let result = ferry::get(
        &format!("http://{addr}/"),
        &[opt::retry_times(2), opt::middleware(count)],
    )
    .await;

    let Err(err) = result else {
        panic!("expected an error, got {result:?}");
    };
    assert!(err.is_connection(), "{err:?}");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_url() {
    let result = ferry::get("not a url", &[]).await;

    assert!(matches!(result, Err(Error::InvalidUrl(_))));
}

#[tokio::test]
async fn test_head_and_delete() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/items/1", mock_server.uri());
    let client = Client::new();

    let head = client.head(&url, &[]).await.expect("head");
    let delete = client.delete(&url, &[]).await.expect("delete");

    assert_eq!(head.status(), 200);
    assert_eq!(delete.status(), 204);
}

#[tokio::test]
async fn test_concurrent_requests() {
    let mock_server = test_server().await;
    let client = Client::new();
    let url = format!("{}/test/get", mock_server.uri());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move { client.get(&url, &[]).await }));
    }

    for task in tasks {
        let response = task.await.expect("join").expect("response");
        assert_eq!(response.text(), "this is a get request");
    }
}
