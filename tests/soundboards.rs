mod common;

use std::sync::Arc;

use common::{
    authenticated_json_request, authenticated_request, multipart_upload, parse_body, pcm_clip,
    soundboard_body, ClipServer, FailingEncodeCodec, ServerOptions, TestServer, PUBLIC_URL,
};
use http::{Method, StatusCode};
use tower::ServiceExt;
use whamserver::db;
use whamserver::models::soundboard::{SoundboardStatus, SoundboardWrite};
use whamserver::sprite::codec::SpriteFormat;
use whamserver::storage::key_from_url;

const BYTES_PER_MS: usize = 44_100 * 4 / 1000;

async fn clip_server() -> ClipServer {
    ClipServer::start(vec![
        ("one.wav", "audio/wav", pcm_clip(1000, 1)),
        ("two.wav", "audio/wav", pcm_clip(1500, 2)),
        ("three.wav", "audio/wav", pcm_clip(500, 3)),
        ("page.wav", "text/html; charset=utf-8", b"<html></html>".to_vec()),
    ])
    .await
}

async fn total_mine(server: &TestServer, auth: &str) -> serde_json::Value {
    let response = server
        .router()
        .oneshot(authenticated_request(
            Method::GET,
            "/api/v1/soundboards/mine",
            auth,
        ))
        .await
        .unwrap();
    parse_body(response).await["total"].clone()
}

async fn create(
    server: &TestServer,
    auth: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::POST,
            "/api/v1/soundboards",
            auth,
            body,
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, parse_body(response).await)
}

// ---------------------------------------------------------------------------
// Clip upload / delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_upload_clip_is_public() {
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;

    let response = server
        .router()
        .oneshot(multipart_upload(
            "/api/v1/soundboards/upload",
            &user.auth_header(),
            "boom.wav",
            "audio/wav",
            &pcm_clip(100, 9),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let json = parse_body(response).await;
    let url = json["data"]["url"].as_str().unwrap();
    let key = json["data"]["key"].as_str().unwrap();
    assert!(url.starts_with(&format!("{PUBLIC_URL}/cdn/user-{}-", user.user.id)));
    assert!(key.ends_with(".wav"));
    assert_eq!(server.public_objects(), vec![key.to_string()]);
}

#[tokio::test]
async fn test_upload_rejects_non_audio() {
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;

    let response = server
        .router()
        .oneshot(multipart_upload(
            "/api/v1/soundboards/upload",
            &user.auth_header(),
            "cat.png",
            "image/png",
            b"png",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(server.public_objects().is_empty());
}

#[tokio::test]
async fn test_delete_clip_only_for_owner() {
    let server = TestServer::new().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;

    let response = server
        .router()
        .oneshot(multipart_upload(
            "/api/v1/soundboards/upload",
            &alice.auth_header(),
            "boom.mp3",
            "audio/mpeg",
            b"ID3 fake mp3",
        ))
        .await
        .unwrap();
    let url = parse_body(response).await["data"]["url"]
        .as_str()
        .unwrap()
        .to_string();

    let body = serde_json::json!({ "filename": url });
    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::POST,
            "/api/v1/soundboards/delete",
            &bob.auth_header(),
            &body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(server.public_objects().len(), 1);

    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::POST,
            "/api/v1/soundboards/delete",
            &alice.auth_header(),
            &body,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(server.public_objects().is_empty());

    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::POST,
            "/api/v1/soundboards/delete",
            &alice.auth_header(),
            &serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Sprite pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_builds_sprite_with_gap() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;

    let body = soundboard_body("Party", None, &[clips.url("one.wav"), clips.url("two.wav")]);
    let (status, json) = create(&server, &user.auth_header(), &body).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");

    let data = &json["data"];
    assert_eq!(data["title"], "Party");
    assert_eq!(data["status"], "drafted");
    assert_eq!(data["author"], user.user.id);
    assert_eq!(data["sounds"][0]["times"], serde_json::json!([0, 1000]));
    assert_eq!(data["sounds"][1]["times"], serde_json::json!([2000, 3500]));
    assert_eq!(data["sounds"][0]["uid"], "s0");
    assert_eq!(data["sounds"][0]["emojiSkin"], "1");

    let sprite = data["sprite"].as_str().unwrap();
    assert!(sprite.starts_with(&format!("{PUBLIC_URL}/cdn/sprite-user-{}-", user.user.id)));
    assert!(sprite.ends_with(".mp3"));

    let bytes = server.read_public(key_from_url(sprite).unwrap());
    assert_eq!(bytes.len(), (1000 + 1000 + 1500) * BYTES_PER_MS);
    assert!(bytes[..1000 * BYTES_PER_MS].iter().all(|&b| b == 1));
    assert!(bytes[1000 * BYTES_PER_MS..2000 * BYTES_PER_MS]
        .iter()
        .all(|&b| b == 0));
    assert!(bytes[2000 * BYTES_PER_MS..].iter().all(|&b| b == 2));

    assert_eq!(server.staging_entries(), 0, "staging must be cleaned up");
}

#[tokio::test]
async fn test_create_without_gap_is_back_to_back() {
    let clips = clip_server().await;
    let server = TestServer::with_sprite_options(0, vec![SpriteFormat::Mp3]).await;
    let user = server.create_user_with_token("alice").await;

    let body = soundboard_body("Tight", None, &[clips.url("one.wav"), clips.url("two.wav")]);
    let (status, json) = create(&server, &user.auth_header(), &body).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["sounds"][0]["times"], serde_json::json!([0, 1000]));
    assert_eq!(json["data"]["sounds"][1]["times"], serde_json::json!([1000, 2500]));
}

#[tokio::test]
async fn test_sprite_keeps_request_order() {
    let clips = clip_server().await;
    let server = TestServer::with_sprite_options(0, vec![SpriteFormat::Mp3]).await;
    let user = server.create_user_with_token("alice").await;

    // Request order differs from the alphabetical order of the clip names.
    let body = soundboard_body(
        "Order",
        None,
        &[clips.url("two.wav"), clips.url("three.wav"), clips.url("one.wav")],
    );
    let (status, json) = create(&server, &user.auth_header(), &body).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");

    let times: Vec<serde_json::Value> = json["data"]["sounds"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["times"].clone())
        .collect();
    assert_eq!(
        times,
        vec![
            serde_json::json!([0, 1500]),
            serde_json::json!([1500, 2000]),
            serde_json::json!([2000, 3000]),
        ]
    );

    let bytes = server.read_public(key_from_url(json["data"]["sprite"].as_str().unwrap()).unwrap());
    assert_eq!(bytes[0], 2);
    assert_eq!(bytes[1500 * BYTES_PER_MS], 3);
    assert_eq!(bytes[2000 * BYTES_PER_MS], 1);
}

#[tokio::test]
async fn test_client_times_are_overwritten() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;

    let body = serde_json::json!({
        "data": {
            "sounds": [{ "audio": clips.url("one.wav"), "times": [123, 456] }]
        }
    });
    let (status, json) = create(&server, &user.auth_header(), &body).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["title"], "My new soundboard");
    assert_eq!(json["data"]["sounds"][0]["times"], serde_json::json!([0, 1000]));
}

#[tokio::test]
async fn test_every_format_is_published() {
    let clips = clip_server().await;
    let server = TestServer::with_sprite_options(1000, vec![SpriteFormat::Ogg, SpriteFormat::Mp3]).await;
    let user = server.create_user_with_token("alice").await;

    let body = soundboard_body("Formats", None, &[clips.url("one.wav")]);
    let (status, json) = create(&server, &user.auth_header(), &body).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");

    let sprite = json["data"]["sprite"].as_str().unwrap();
    assert!(sprite.ends_with(".ogg"), "first format is the sprite");
    let objects = server.public_objects();
    assert_eq!(objects.len(), 2);
    assert!(objects.iter().any(|o| o.ends_with(".mp3")));
    assert!(objects.iter().any(|o| o.ends_with(".ogg")));
}

#[tokio::test]
async fn test_unreachable_source_fails_without_side_effects() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;

    let body = soundboard_body("Broken", None, &[clips.url("one.wav"), clips.url("missing.wav")]);
    let (status, json) = create(&server, &user.auth_header(), &body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "fetch_failed");

    assert!(server.public_objects().is_empty());
    assert_eq!(server.staging_entries(), 0);

    let response = server
        .router()
        .oneshot(authenticated_request(
            Method::GET,
            "/api/v1/soundboards/mine",
            &user.auth_header(),
        ))
        .await
        .unwrap();
    assert_eq!(parse_body(response).await["total"], 0);
}

#[tokio::test]
async fn test_non_audio_source_is_a_fetch_error() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;

    let body = soundboard_body("Html", None, &[clips.url("page.wav")]);
    let (status, json) = create(&server, &user.auth_header(), &body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["code"], "fetch_failed");
}

#[tokio::test]
async fn test_create_validation() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;
    let auth = user.auth_header();

    let empty = serde_json::json!({ "data": { "title": "Empty", "sounds": [] } });
    let (status, _) = create(&server, &auth, &empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let missing = serde_json::json!({ "data": { "title": "None" } });
    let (status, _) = create(&server, &auth, &missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_status = soundboard_body("Live", Some("live"), &[clips.url("one.wav")]);
    let (status, json) = create(&server, &auth, &bad_status).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "invalid_request");

    let bad_url = soundboard_body("Ftp", None, &["ftp://host/a.mp3".to_string()]);
    let (status, _) = create(&server, &auth, &bad_url).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(server.staging_entries(), 0);
}

#[tokio::test]
async fn test_concurrent_builds_for_one_owner() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;
    let auth = user.auth_header();

    let first = soundboard_body("A", None, &[clips.url("one.wav"), clips.url("two.wav")]);
    let second = soundboard_body("B", None, &[clips.url("three.wav")]);
    let (a, b) = tokio::join!(
        create(&server, &auth, &first),
        create(&server, &auth, &second)
    );
    assert_eq!(a.0, StatusCode::CREATED, "{}", a.1);
    assert_eq!(b.0, StatusCode::CREATED, "{}", b.1);
    assert_eq!(a.1["data"]["sounds"][1]["times"], serde_json::json!([2000, 3500]));
    assert_eq!(b.1["data"]["sounds"][0]["times"], serde_json::json!([0, 500]));
    assert_ne!(a.1["data"]["sprite"], b.1["data"]["sprite"]);
    assert_eq!(server.staging_entries(), 0);
}

#[tokio::test]
async fn test_concurrent_builds_for_two_owners() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;

    let first = soundboard_body("Alice", None, &[clips.url("one.wav"), clips.url("two.wav")]);
    let second = soundboard_body("Bob", None, &[clips.url("three.wav")]);
    let alice_auth = alice.auth_header();
    let bob_auth = bob.auth_header();
    let (a, b) = tokio::join!(
        create(&server, &alice_auth, &first),
        create(&server, &bob_auth, &second)
    );
    assert_eq!(a.0, StatusCode::CREATED, "{}", a.1);
    assert_eq!(b.0, StatusCode::CREATED, "{}", b.1);

    assert_eq!(a.1["data"]["author"], alice.user.id);
    assert_eq!(a.1["data"]["sounds"][0]["times"], serde_json::json!([0, 1000]));
    assert_eq!(a.1["data"]["sounds"][1]["times"], serde_json::json!([2000, 3500]));
    assert_eq!(b.1["data"]["author"], bob.user.id);
    assert_eq!(b.1["data"]["sounds"][0]["times"], serde_json::json!([0, 500]));

    let alice_sprite = a.1["data"]["sprite"].as_str().unwrap();
    let bob_sprite = b.1["data"]["sprite"].as_str().unwrap();
    assert!(alice_sprite.starts_with(&format!("{PUBLIC_URL}/cdn/sprite-user-{}-", alice.user.id)));
    assert!(bob_sprite.starts_with(&format!("{PUBLIC_URL}/cdn/sprite-user-{}-", bob.user.id)));

    let alice_bytes = server.read_public(key_from_url(alice_sprite).unwrap());
    assert_eq!(alice_bytes.len(), 3500 * BYTES_PER_MS);
    assert!(alice_bytes[..1000 * BYTES_PER_MS].iter().all(|&b| b == 1));
    assert!(alice_bytes[2000 * BYTES_PER_MS..].iter().all(|&b| b == 2));

    let bob_bytes = server.read_public(key_from_url(bob_sprite).unwrap());
    assert_eq!(bob_bytes.len(), 500 * BYTES_PER_MS);
    assert!(bob_bytes.iter().all(|&b| b == 3));

    assert_eq!(server.public_objects().len(), 2);
    assert_eq!(server.staging_entries(), 0);
}

#[tokio::test]
async fn test_failed_upload_discards_published_formats() {
    let clips = clip_server().await;
    let server = TestServer::with_options(ServerOptions {
        formats: vec![SpriteFormat::Mp3, SpriteFormat::Ogg],
        failing_upload_ext: Some("ogg"),
        ..Default::default()
    })
    .await;
    let user = server.create_user_with_token("alice").await;
    let auth = user.auth_header();

    let body = soundboard_body("Offline", None, &[clips.url("one.wav")]);
    let (status, json) = create(&server, &auth, &body).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY, "{json}");
    assert_eq!(json["error"]["code"], "upload_failed");

    assert!(server.public_objects().is_empty(), "mp3 must be removed again");
    assert_eq!(server.staging_entries(), 0);
    assert_eq!(total_mine(&server, &auth).await, 0);
}

#[tokio::test]
async fn test_failed_encode_leaves_nothing_behind() {
    let clips = clip_server().await;
    let server = TestServer::with_options(ServerOptions {
        codec: Arc::new(FailingEncodeCodec),
        ..Default::default()
    })
    .await;
    let user = server.create_user_with_token("alice").await;
    let auth = user.auth_header();

    let body = soundboard_body("Broken", None, &[clips.url("one.wav"), clips.url("two.wav")]);
    let (status, json) = create(&server, &auth, &body).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{json}");
    assert_eq!(json["error"]["code"], "encode_failed");

    assert!(server.public_objects().is_empty());
    assert_eq!(server.staging_entries(), 0);
    assert_eq!(total_mine(&server, &auth).await, 0);
}

#[tokio::test]
async fn test_sources_outside_allowed_prefixes_are_rejected() {
    let clips = clip_server().await;
    let server = TestServer::with_options(ServerOptions {
        source_prefixes: vec![format!("{PUBLIC_URL}/cdn/")],
        ..Default::default()
    })
    .await;
    let user = server.create_user_with_token("alice").await;
    let auth = user.auth_header();

    let body = soundboard_body("Elsewhere", None, &[clips.url("one.wav")]);
    let (status, json) = create(&server, &auth, &body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
    assert_eq!(json["error"]["code"], "invalid_request");

    let climb = soundboard_body("Climb", None, &[format!("{PUBLIC_URL}/cdn/../admin.wav")]);
    let (status, _) = create(&server, &auth, &climb).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(server.public_objects().is_empty());
    assert_eq!(server.staging_entries(), 0);
}

// ---------------------------------------------------------------------------
// Soundboard CRUD
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_public_read_only_for_published() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;

    let (_, draft) = create(
        &server,
        &user.auth_header(),
        &soundboard_body("Draft", None, &[clips.url("one.wav")]),
    )
    .await;
    let (_, published) = create(
        &server,
        &user.auth_header(),
        &soundboard_body("Live", Some("published"), &[clips.url("one.wav")]),
    )
    .await;

    let draft_id = draft["data"]["id"].as_str().unwrap();
    let published_id = published["data"]["id"].as_str().unwrap();

    let response = server
        .router()
        .oneshot(
            http::Request::builder()
                .uri(format!("/api/v1/soundboards/{draft_id}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .router()
        .oneshot(
            http::Request::builder()
                .uri(format!("/api/v1/soundboards/{published_id}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = parse_body(response).await;
    assert_eq!(json["data"]["status"], "published");
    assert!(!json["data"]["sprite"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_mine_paginates_with_total() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;

    for title in ["a", "b", "c"] {
        let (status, _) = create(
            &server,
            &alice.auth_header(),
            &soundboard_body(title, None, &[clips.url("three.wav")]),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    create(
        &server,
        &bob.auth_header(),
        &soundboard_body("bob's", None, &[clips.url("three.wav")]),
    )
    .await;

    let response = server
        .router()
        .oneshot(authenticated_request(
            Method::GET,
            "/api/v1/soundboards/mine?page=1&limit=2&sort=title",
            &alice.auth_header(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = parse_body(response).await;
    assert_eq!(json["total"], 3);
    let titles: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["a", "b"]);

    let response = server
        .router()
        .oneshot(authenticated_request(
            Method::GET,
            "/api/v1/soundboards/mine?page=2&limit=2&sort=title",
            &alice.auth_header(),
        ))
        .await
        .unwrap();
    let json = parse_body(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["title"], "c");
}

#[tokio::test]
async fn test_update_without_sounds_keeps_sprite() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;
    let auth = user.auth_header();

    let (_, created) = create(
        &server,
        &auth,
        &soundboard_body("Before", None, &[clips.url("one.wav")]),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();

    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::PATCH,
            &format!("/api/v1/soundboards/my/{id}"),
            &auth,
            &serde_json::json!({ "data": { "title": "After", "status": "published" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = parse_body(response).await;
    assert_eq!(json["data"]["title"], "After");
    assert_eq!(json["data"]["status"], "published");
    assert_eq!(json["data"]["sprite"], created["data"]["sprite"]);
    assert_eq!(json["data"]["sounds"], created["data"]["sounds"]);
    assert_eq!(server.public_objects().len(), 1);
}

#[tokio::test]
async fn test_metadata_update_keeps_concurrently_rebuilt_sprite() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;

    let (_, created) = create(
        &server,
        &user.auth_header(),
        &soundboard_body("Before", None, &[clips.url("one.wav")]),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();

    // Snapshot read by a metadata-only update before a rebuild commits.
    let stale = db::soundboards::get_owned(server.pool(), id, &user.user.id)
        .await
        .unwrap();

    let mut rebuilt_sound = stale.sounds[0].clone();
    rebuilt_sound.audio = clips.url("three.wav");
    rebuilt_sound.times = vec![0, 500];
    let rebuilt = SoundboardWrite {
        title: stale.title.clone(),
        status: stale.status,
        sounds: vec![rebuilt_sound],
        sprite: format!("{PUBLIC_URL}/cdn/sprite-user-{}-2-abcdef.mp3", user.user.id),
    };
    db::soundboards::update_owned(server.pool(), id, &user.user.id, &rebuilt, true)
        .await
        .unwrap();

    let late = SoundboardWrite {
        title: "Renamed".to_string(),
        status: SoundboardStatus::Published,
        sounds: stale.sounds.clone(),
        sprite: stale.sprite.clone(),
    };
    let updated = db::soundboards::update_owned(server.pool(), id, &user.user.id, &late, false)
        .await
        .unwrap();

    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.status, SoundboardStatus::Published);
    assert_eq!(updated.sprite, rebuilt.sprite);
    assert_eq!(updated.sounds.len(), 1);
    assert_eq!(updated.sounds[0].times, vec![0, 500]);
    assert_eq!(updated.sounds[0].audio, clips.url("three.wav"));
}

#[tokio::test]
async fn test_update_with_sounds_replaces_sprite() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;
    let auth = user.auth_header();

    let (_, created) = create(
        &server,
        &auth,
        &soundboard_body("Board", None, &[clips.url("one.wav")]),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();
    let old_key = key_from_url(created["data"]["sprite"].as_str().unwrap())
        .unwrap()
        .to_string();

    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::PATCH,
            &format!("/api/v1/soundboards/my/{id}"),
            &auth,
            &soundboard_body("Board", None, &[clips.url("three.wav"), clips.url("one.wav")]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = parse_body(response).await;
    assert_eq!(json["data"]["sounds"].as_array().unwrap().len(), 2);
    assert_eq!(json["data"]["sounds"][1]["times"], serde_json::json!([1500, 2500]));
    assert_ne!(json["data"]["sprite"], created["data"]["sprite"]);

    let objects = server.public_objects();
    assert_eq!(objects.len(), 1, "old sprite is released");
    assert!(!objects.contains(&old_key));
}

#[tokio::test]
async fn test_update_with_empty_sounds_is_rejected() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let user = server.create_user_with_token("alice").await;
    let auth = user.auth_header();

    let (_, created) = create(
        &server,
        &auth,
        &soundboard_body("Board", None, &[clips.url("one.wav")]),
    )
    .await;
    let id = created["data"]["id"].as_str().unwrap();

    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::PATCH,
            &format!("/api/v1/soundboards/my/{id}"),
            &auth,
            &serde_json::json!({ "data": { "sounds": [] } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_owner_only_access_and_delete() {
    let clips = clip_server().await;
    let server = TestServer::new().await;
    let alice = server.create_user_with_token("alice").await;
    let bob = server.create_user_with_token("bob").await;

    let (_, created) = create(
        &server,
        &alice.auth_header(),
        &soundboard_body("Mine", None, &[clips.url("one.wav")]),
    )
    .await;
    let uri = format!("/api/v1/soundboards/my/{}", created["data"]["id"].as_str().unwrap());

    for method in [Method::GET, Method::DELETE] {
        let response = server
            .router()
            .oneshot(authenticated_request(method, &uri, &bob.auth_header()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    let response = server
        .router()
        .oneshot(authenticated_json_request(
            Method::PATCH,
            &uri,
            &bob.auth_header(),
            &serde_json::json!({ "data": { "title": "Stolen" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server
        .router()
        .oneshot(authenticated_request(Method::DELETE, &uri, &alice.auth_header()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(server.public_objects().is_empty(), "sprite is released");

    let response = server
        .router()
        .oneshot(authenticated_request(Method::GET, &uri, &alice.auth_header()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
