use action_primitives::{BrowserDriver, DriverError, Locator};
use serde_json::json;
use std::time::Duration;
use wd_driver::{WebDriverConfig, WebDriverDriver};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

const SESSION: &str = "s1";

fn driver_for(server: &MockServer) -> WebDriverDriver {
    WebDriverDriver::new(
        WebDriverConfig::new(server.uri(), SESSION)
            .with_request_timeout(Duration::from_secs(5))
            .with_poll_interval(Duration::from_millis(10)),
    )
    .unwrap()
}

fn element(id: &str) -> serde_json::Value {
    json!({ "value": { "element-6066-11e4-a52e-4f735466cecf": id } })
}

fn w3c_error(code: &str, message: &str) -> serde_json::Value {
    json!({ "value": { "error": code, "message": message, "stacktrace": "" } })
}

#[tokio::test]
async fn click_finds_role_locator_by_xpath_then_clicks() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/session/s1/element"))
        .and(matchers::body_partial_json(json!({ "using": "xpath" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(element("e1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/session/s1/element/e1/click"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
        .expect(1)
        .mount(&server)
        .await;

    let driver = driver_for(&server);
    driver
        .click(&Locator::role_name("button", "Sign In"))
        .await
        .unwrap();
}

#[tokio::test]
async fn missing_element_maps_to_element_not_found() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/session/s1/element"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(w3c_error("no such element", "#login-btn")),
        )
        .mount(&server)
        .await;

    let err = driver_for(&server)
        .click(&Locator::css("#login-btn"))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::ElementNotFound(_)));
    assert!(!err.is_fatal());
}

#[tokio::test]
async fn invalid_session_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/session/s1/url"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(w3c_error("invalid session id", "gone")),
        )
        .mount(&server)
        .await;

    let err = driver_for(&server).current_url().await.unwrap_err();
    assert!(matches!(err, DriverError::SessionLost(_)));
}

#[tokio::test]
async fn unreachable_server_is_session_loss() {
    let driver = WebDriverDriver::new(
        WebDriverConfig::new("http://127.0.0.1:1", SESSION)
            .with_request_timeout(Duration::from_secs(2)),
    )
    .unwrap();
    let err = driver.navigate("https://app.test").await.unwrap_err();
    assert!(err.is_fatal(), "{err:?}");
}

#[tokio::test]
async fn fill_clears_then_sends_keys() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/session/s1/element"))
        .and(matchers::body_partial_json(json!({
            "using": "css selector",
            "value": "[placeholder=\"you@example.com\"]"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(element("email")))
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/session/s1/element/email/clear"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/session/s1/element/email/value"))
        .and(matchers::body_json(json!({ "text": "ada@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": null })))
        .expect(1)
        .mount(&server)
        .await;

    driver_for(&server)
        .fill(&Locator::placeholder("you@example.com"), "ada@example.com")
        .await
        .unwrap();
}

#[tokio::test]
async fn snapshot_and_screenshot_are_decoded() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/session/s1/execute/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": {
                "url": "https://app.test/login",
                "title": "Login",
                "nodes": [
                    { "role": "button", "name": "Sign In", "text": "Sign In", "depth": 4,
                      "css": "form > button.primary", "visible": true }
                ]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(matchers::method("GET"))
        .and(matchers::path("/session/s1/screenshot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": "iVBORw0KGgo=" })))
        .mount(&server)
        .await;

    let driver = driver_for(&server);
    let snapshot = driver.snapshot().await.unwrap();
    assert_eq!(snapshot.url, "https://app.test/login");
    assert_eq!(snapshot.nodes[0].css.as_deref(), Some("form > button.primary"));

    let png = driver.screenshot().await.unwrap();
    assert_eq!(&png[1..4], b"PNG");
}

#[tokio::test]
async fn wait_for_times_out_when_element_never_appears() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/session/s1/element"))
        .respond_with(ResponseTemplate::new(404).set_body_json(w3c_error("no such element", "")))
        .mount(&server)
        .await;

    let err = driver_for(&server)
        .wait_for(&Locator::css("#spinner-done"), Duration::from_millis(60))
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::Timeout(_)));
}
