use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use kids_learning_core::ports::SetMode;
use kids_learning_core::session::USERS_COLLECTION;
use kids_learning_core::DocumentStore;
use portal_lib::config::Config;
use portal_lib::web::router;
use portal_lib::web::state::{AppState, Backend};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "portal-test-boundary";

struct TestApp {
    app: Router,
    state: Arc<AppState>,
}

impl TestApp {
    fn new() -> Self {
        let vars: HashMap<&str, &str> = [("PORTAL_BACKEND", "memory")].into_iter().collect();
        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        let state = Arc::new(AppState::new(Arc::new(config), Backend::memory()));
        Self {
            app: router(state.clone()),
            state,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_json(&self, uri: &str, cookie: Option<&str>, body: Value) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    /// Signs up on a fresh client and returns its cookie.
    async fn sign_up(&self, email: &str, name: &str) -> String {
        let response = self
            .post_json(
                "/auth/signup",
                None,
                json!({"email": email, "password": "secret1", "display_name": name}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        client_cookie(&response)
    }

    /// Signs up, promotes the account to admin in the backend, and signs in again.
    async fn sign_up_admin(&self, email: &str) -> String {
        let cookie = self.sign_up(email, "Teacher").await;
        let client_id = cookie.trim_start_matches("client=");
        let uid = self
            .state
            .portal(client_id)
            .await
            .session()
            .current_user()
            .unwrap()
            .uid;

        let Backend::Memory { documents, .. } = &self.state.backend else {
            panic!("memory backend expected");
        };
        let promote = json!({"role": "admin"}).as_object().cloned().unwrap();
        documents
            .set(USERS_COLLECTION, &uid, promote, SetMode::Merge)
            .await
            .unwrap();

        let response = self.post_json("/auth/logout", Some(&cookie), json!({})).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = self
            .post_json(
                "/auth/login",
                Some(&cookie),
                json!({"email": email, "password": "secret1"}),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["redirect"], "/pages/dashboard-admin");
        cookie
    }
}

fn client_cookie(response: &Response<Body>) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap()
}

fn multipart_body(payload: &Value, image: Option<(&str, &[u8])>) -> Body {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"payload\"\r\n\r\n{p}\r\n",
            b = BOUNDARY,
            p = payload
        )
        .as_bytes(),
    );
    if let Some((name, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{n}\"\r\nContent-Type: image/png\r\n\r\n",
                b = BOUNDARY,
                n = name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    Body::from(body)
}

fn save_request(cookie: &str, payload: &Value, image: Option<(&str, &[u8])>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/admin/lessons")
        .header(header::COOKIE, cookie)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(multipart_body(payload, image))
        .unwrap()
}

#[tokio::test]
async fn first_visit_gets_a_client_cookie_and_a_page() {
    let t = TestApp::new();
    let response = t.get("/pages/home", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = client_cookie(&response);
    assert!(cookie.starts_with("client="));

    let view = body_json(response).await;
    assert_eq!(view["page"], "home");
    assert_eq!(view["body"]["kind"], "home");
    assert_eq!(view["body"]["show_dashboard"], false);

    // A known client is not issued a new cookie.
    let again = t.get("/pages/home", Some(&cookie)).await;
    assert!(again.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(t.state.client_count().await, 1);
}

#[tokio::test]
async fn unknown_pages_are_ignored_and_guarded_pages_redirect() {
    let t = TestApp::new();
    assert_eq!(t.get("/pages/science", None).await.status(), StatusCode::NO_CONTENT);

    let response = t.get("/pages/dashboard-admin", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/pages/login");

    let student = t.sign_up("kid@school.et", "Kid").await;
    let response = t.get("/pages/dashboard-admin", Some(&student)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/pages/dashboard-student");
}

#[tokio::test]
async fn stateless_requests_do_not_register_clients() {
    let t = TestApp::new();
    for n in 0..20 {
        let response = t.get("/pages/nothing", None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let made_up = format!("client=made-up-{}", n);
        let response = t.get("/pages/nothing", Some(&made_up)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
    assert_eq!(t.state.client_count().await, 0);

    // An id the server never issued is replaced, not adopted.
    let response = t.get("/pages/home", Some("client=made-up")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = client_cookie(&response);
    assert_ne!(cookie, "client=made-up");
    assert!(!t.state.is_registered("made-up").await);
    assert_eq!(t.state.client_count().await, 1);
}

#[tokio::test]
async fn logout_keeps_the_client_cookie_usable() {
    let t = TestApp::new();
    let cookie = t.sign_up("kid@school.et", "Kid").await;

    let response = t.post_json("/auth/logout", Some(&cookie), json!({})).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(t.state.client_count().await, 1);

    let response = t
        .post_json(
            "/auth/login",
            Some(&cookie),
            json!({"email": "kid@school.et", "password": "secret1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let response = t.get("/pages/dashboard-student", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // Logging out without ever having a portal is a no-op.
    let response = t.post_json("/auth/logout", None, json!({})).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(t.state.client_count().await, 1);
}

#[tokio::test]
async fn signup_reports_provider_errors_verbatim() {
    let t = TestApp::new();
    let response = t
        .post_json(
            "/auth/signup",
            None,
            json!({"email": "a@b.com", "password": "secret1", "display_name": "Abel"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Account created! Redirecting...");
    assert_eq!(body["kind"], "success");
    assert_eq!(body["redirect"], "/pages/dashboard-student");

    let response = t
        .post_json(
            "/auth/signup",
            None,
            json!({"email": "a@b.com", "password": "secret1"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["message"], "EMAIL_EXISTS");
    assert_eq!(body["kind"], "error");
    assert_eq!(body["redirect"], Value::Null);
}

#[tokio::test]
async fn buttons_resolve_destinations() {
    let t = TestApp::new();
    let response = t.post_json("/pages/buttons/get-started", None, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["redirect"], "/pages/signup");

    let response = t.post_json("/pages/buttons/explore", None, json!({})).await;
    assert_eq!(body_json(response).await["redirect"], "/pages/home#subjects");

    let response = t.post_json("/pages/buttons/teleport", None, json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_subjects_are_rejected() {
    let t = TestApp::new();
    let response = t.get("/lessons/science", None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn students_cannot_reach_the_editor() {
    let t = TestApp::new();
    let student = t.sign_up("kid@school.et", "Kid").await;

    let response = t.get("/admin/lessons/editor", Some(&student)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let payload = json!({"subject": "Maths", "lesson_title": "Counting", "admin_subject": "Maths"});
    let response = t.send(save_request(&student, &payload, None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/pages/dashboard-student");
}

#[tokio::test]
async fn admin_saves_a_lesson_that_students_can_take() {
    let t = TestApp::new();
    let admin = t.sign_up_admin("teacher@school.et").await;

    let response = t.get("/admin/lessons/editor?subject=maths", Some(&admin)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let form = body_json(response).await;
    assert_eq!(form["subject"], "Maths");
    assert_eq!(form["difficulty"], "Easy");
    assert_eq!(form["quiz"], "[]");

    let payload = json!({
        "subject": "Maths",
        "lesson_title": "Counting",
        "content": "One, two, three",
        "quiz": r#"[{"question": "How many apples?", "options": ["2", "3"]}]"#,
        "admin_subject": "Maths",
    });
    let response = t
        .send(save_request(&admin, &payload, Some(("apples.png", &b"\x89PNG"[..]))))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome = body_json(response).await;
    assert_eq!(outcome["message"]["text"], "Saved");
    let id = outcome["lesson_id"].as_str().unwrap().to_string();
    assert_eq!(
        outcome["media"]["imageUrl"],
        format!("memory://blobs/lesson_images/{}_apples.png", id)
    );
    assert_eq!(outcome["lessons"][0]["title"], "Counting");

    let student = t.sign_up("kid@school.et", "Kid").await;
    let page = body_json(t.get("/lessons/maths", Some(&student)).await).await;
    assert_eq!(page["subject"], "Maths");
    assert_eq!(page["cards"][0]["id"], id.as_str());
    assert_eq!(page["cards"][0]["actions"], json!(["start", "quiz"]));

    let started = t
        .post_json(&format!("/lessons/maths/{}/start", id), Some(&student), json!({}))
        .await;
    assert_eq!(started.status(), StatusCode::OK);
    assert_eq!(body_json(started).await["recorded"], true);

    let quiz = t
        .post_json(&format!("/lessons/maths/{}/quiz", id), Some(&student), json!({}))
        .await;
    assert_eq!(quiz.status(), StatusCode::OK);
    let quiz = body_json(quiz).await;
    assert_eq!(quiz["title"], "Quiz: Counting");
    assert_eq!(quiz["fieldsets"][0]["legend"], "1. How many apples?");

    let submitted = t
        .post_json(
            "/quiz/submit",
            Some(&student),
            json!({"subject": "Maths", "lesson_id": id, "answers": {"q0": "2"}}),
        )
        .await;
    let submitted = body_json(submitted).await;
    assert_eq!(submitted["message"]["text"], "Submitted!");
    assert_eq!(submitted["answered"], 1);
    assert_eq!(submitted["score"], Value::Null);

    let dashboard = body_json(t.get("/pages/dashboard-student", Some(&student)).await).await;
    assert_eq!(dashboard["body"]["stars"], 1);
    assert_eq!(dashboard["body"]["progress_percent"], 100);
}

#[tokio::test]
async fn lessons_beyond_the_first_page_can_be_started_and_edited() {
    let t = TestApp::new();
    let admin = t.sign_up_admin("teacher@school.et").await;

    let mut ids = Vec::new();
    for title in ["one", "two", "three"] {
        let payload = json!({"subject": "Reading", "lesson_title": title, "admin_subject": "Reading"});
        let response = t.send(save_request(&admin, &payload, None)).await;
        assert_eq!(response.status(), StatusCode::OK);
        ids.push(body_json(response).await["lesson_id"].as_str().unwrap().to_string());
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    // The admin's client holds the reloaded grid in cache; list from a fresh one.
    let student = t.sign_up("kid@school.et", "Kid").await;
    let first = body_json(t.get("/lessons/reading?page_size=2", Some(&student)).await).await;
    assert_eq!(first["cards"].as_array().unwrap().len(), 2);
    let cursor = first["next_cursor"].as_str().unwrap().to_string();
    let second = body_json(
        t.get(&format!("/lessons/reading?page_size=2&cursor={}", cursor), Some(&student))
            .await,
    )
    .await;
    assert_eq!(second["cards"][0]["id"], ids[0].as_str());

    let editor = t
        .get(
            &format!("/admin/lessons/editor?id={}&subject=reading", ids[0]),
            Some(&admin),
        )
        .await;
    assert_eq!(editor.status(), StatusCode::OK);
    assert_eq!(body_json(editor).await["lesson_title"], "one");

    let started = t
        .post_json(&format!("/lessons/reading/{}/start", ids[0]), Some(&student), json!({}))
        .await;
    assert_eq!(started.status(), StatusCode::OK);
    assert_eq!(body_json(started).await["recorded"], true);
}

#[tokio::test]
async fn failed_editor_steps_report_their_message() {
    let t = TestApp::new();
    let admin = t.sign_up_admin("teacher@school.et").await;

    let payload = json!({
        "subject": "Reading",
        "lesson_title": "Letters",
        "quiz": "[not json",
        "admin_subject": "Reading",
    });
    let response = t.send(save_request(&admin, &payload, None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let outcome = body_json(response).await;
    assert_eq!(outcome["message"]["kind"], "error");
    assert!(outcome["message"]["text"]
        .as_str()
        .unwrap()
        .starts_with("Quiz is not valid JSON"));
    assert_eq!(outcome["lessons"], Value::Null);
}
