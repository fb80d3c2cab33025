use actix_web::{test, web, App};
use chrono::Utc;
use std::sync::Arc;

use social_feed::api::{self, AppState};
use social_feed::auth::AuthService;
use social_feed::models::User;
use social_feed::store::Store;

fn test_state() -> (Arc<Store>, Arc<AuthService>) {
    let store = Arc::new(Store::in_memory().unwrap());
    let auth_service = Arc::new(AuthService::new("test_secret".to_string()));
    (store, auth_service)
}

fn create_test_user_with_token(
    store: &Arc<Store>,
    auth_service: &Arc<AuthService>,
    username: &str,
) -> (User, String) {
    let password_hash = auth_service.hash_password("testpass123").unwrap();
    let mut user = User {
        id: String::new(),
        username: username.to_string(),
        email: format!("{}@test.com", username),
        password_hash,
        display_name: username.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.create_user(&mut user).unwrap();
    let token = auth_service.generate_token(&user.id).unwrap();
    (user, token)
}

macro_rules! init_app {
    ($store:expr, $auth:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($auth.clone()))
                .app_data(web::Data::new(AppState {
                    store: $store.clone(),
                    auth_service: $auth.clone(),
                }))
                .configure(api::configure_routes),
        )
        .await
    };
}

#[actix_web::test]
async fn test_follow_toggle_updates_both_profiles() {
    let (store, auth_service) = test_state();
    let (alice, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");
    let (bob, _) = create_test_user_with_token(&store, &auth_service, "bob");
    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/follow", bob.id))
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["active"], true);
    assert_eq!(body["data"]["count"], 1);

    assert_eq!(store.get_profile(&bob.id).unwrap().followers_count, 1);
    assert_eq!(store.get_profile(&alice.id).unwrap().following_count, 1);

    // Toggle back to zero on both sides.
    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/follow", bob.id))
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["active"], false);
    assert_eq!(body["data"]["count"], 0);

    assert_eq!(store.get_profile(&bob.id).unwrap().followers_count, 0);
    assert_eq!(store.get_profile(&alice.id).unwrap().following_count, 0);
}

#[actix_web::test]
async fn test_self_follow_rejected() {
    let (store, auth_service) = test_state();
    let (alice, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");
    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri(&format!("/api/users/{}/follow", alice.id))
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    assert_eq!(store.get_profile(&alice.id).unwrap().followers_count, 0);
}

#[actix_web::test]
async fn test_follow_unknown_user_not_found() {
    let (store, auth_service) = test_state();
    let (_, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");
    let app = init_app!(store, auth_service);

    let req = test::TestRequest::post()
        .uri("/api/users/missing-id/follow")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_follower_and_following_listings() {
    let (store, auth_service) = test_state();
    let (alice, _) = create_test_user_with_token(&store, &auth_service, "alice");
    let (bob, _) = create_test_user_with_token(&store, &auth_service, "bob");
    let (carol, _) = create_test_user_with_token(&store, &auth_service, "carol");
    store.toggle_follow(&bob.id, &alice.id).unwrap();
    store.toggle_follow(&carol.id, &alice.id).unwrap();
    store.toggle_follow(&alice.id, &bob.id).unwrap();
    let app = init_app!(store, auth_service);

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}/followers", alice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}/following", alice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let follows = body["data"].as_array().unwrap();
    assert_eq!(follows.len(), 1);
    assert_eq!(follows[0]["following_username"], "bob");
}

#[actix_web::test]
async fn test_profile_update_and_fetch() {
    let (store, auth_service) = test_state();
    let (alice, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");
    let app = init_app!(store, auth_service);

    let req = test::TestRequest::put()
        .uri("/api/profile")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .set_json(serde_json::json!({"bio": "rustacean", "location": "moon"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    let req = test::TestRequest::get()
        .uri(&format!("/api/users/{}/profile", alice.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["profile"]["bio"], "rustacean");
    assert_eq!(body["data"]["profile"]["location"], "moon");
    assert_eq!(body["data"]["user"]["username"], "alice");
}

#[actix_web::test]
async fn test_profile_bio_length_limit() {
    let (store, auth_service) = test_state();
    let (_, alice_token) = create_test_user_with_token(&store, &auth_service, "alice");
    let app = init_app!(store, auth_service);

    let req = test::TestRequest::put()
        .uri("/api/profile")
        .insert_header(("Authorization", format!("Bearer {}", alice_token)))
        .set_json(serde_json::json!({"bio": "b".repeat(501)}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_user_search() {
    let (store, auth_service) = test_state();
    create_test_user_with_token(&store, &auth_service, "alice");
    create_test_user_with_token(&store, &auth_service, "alicia");
    create_test_user_with_token(&store, &auth_service, "bob");
    let app = init_app!(store, auth_service);

    let req = test::TestRequest::get()
        .uri("/api/users?search=ali")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
}
