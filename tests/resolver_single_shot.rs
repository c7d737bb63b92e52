//! Integration tests for the single-shot resolvers.

use mediafetch_core::auth::{CredentialStore, SessionId};
use mediafetch_core::resolver::{
    KuaikanResolver, PixivResolver, ResolveError, Resolver, WeiboResolver,
};
use mediafetch_core::task::Platform;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn creds_with(platform: Platform, session: &str) -> CredentialStore {
    let store = CredentialStore::new();
    store.set_session_id(platform, SessionId(session.to_string()));
    store
}

#[tokio::test]
async fn test_pixiv_single_page_work() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/illust/123456"))
        .and(header("cookie", "PHPSESSID=sid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": {
                "title": "sunset",
                "userName": "painter",
                "userId": "9",
                "pageCount": 1,
                "urls": {"original": "https://i.pximg.test/orig/p0.png"}
            }
        })))
        .mount(&server)
        .await;

    let resolver = PixivResolver::with_base_url(server.uri()).expect("resolver");
    let items = resolver
        .resolve(
            "https://www.pixiv.net/artworks/123456",
            &creds_with(Platform::Pixiv, "sid"),
        )
        .await
        .expect("resolve");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].author, "painter");
    assert_eq!(items[0].photos, vec!["https://i.pximg.test/orig/p0.png"]);
}

#[tokio::test]
async fn test_pixiv_multi_page_work_fetches_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/illust/777"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": {
                "title": "set",
                "userName": "painter",
                "userId": "9",
                "pageCount": 2,
                "urls": {"original": "https://i.pximg.test/orig/p0.png"}
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ajax/illust/777/pages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "body": [
                {"urls": {"original": "https://i.pximg.test/orig/p0.png"}},
                {"urls": {"original": "https://i.pximg.test/orig/p1.png"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let resolver = PixivResolver::with_base_url(server.uri()).expect("resolver");
    let items = resolver
        .resolve(
            "https://www.pixiv.net/artworks/777",
            &creds_with(Platform::Pixiv, "sid"),
        )
        .await
        .expect("resolve");

    assert_eq!(items[0].photos.len(), 2);
}

#[tokio::test]
async fn test_pixiv_without_credentials_is_auth_missing() {
    let resolver = PixivResolver::new().expect("resolver");
    let result = resolver
        .resolve("https://www.pixiv.net/artworks/1", &CredentialStore::new())
        .await;
    assert!(matches!(
        result,
        Err(ResolveError::AuthMissing {
            platform: Platform::Pixiv
        })
    ));
}

#[tokio::test]
async fn test_weibo_extracts_video_and_photos() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ajax/statuses/show"))
        .and(header("cookie", "SUB=sub-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": 7, "screen_name": "poster"},
            "page_info": {"media_info": {"stream_url": "https://v.test/s.mp4"}},
            "pics": [
                {"large": {"url": "https://p.test/1.jpg"}},
                {"large": {"url": "https://p.test/2.jpg"}}
            ],
            "text_raw": "a post"
        })))
        .mount(&server)
        .await;

    let resolver = WeiboResolver::with_base_url(server.uri()).expect("resolver");
    let items = resolver
        .resolve(
            "https://weibo.com/7/NaBcDeF",
            &creds_with(Platform::Weibo, "sub-token"),
        )
        .await
        .expect("resolve");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].videos, vec!["https://v.test/s.mp4"]);
    assert_eq!(items[0].photos.len(), 2);
}

#[tokio::test]
async fn test_kuaikan_chapter_becomes_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/comics/652963"))
        .and(header("cookie", "session_id=kk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "title": "chapter 12",
                "author": "someone",
                "images": [
                    "https://i.kk.test/1.webp",
                    "https://i.kk.test/2.webp",
                    "https://i.kk.test/3.webp"
                ]
            }
        })))
        .mount(&server)
        .await;

    let resolver = KuaikanResolver::with_base_url(server.uri()).expect("resolver");
    let items = resolver
        .resolve(
            "https://www.kuaikanmanhua.com/webs/comic-next/652963",
            &creds_with(Platform::Kuaikan, "kk"),
        )
        .await
        .expect("resolve");

    assert_eq!(items.len(), 1);
    assert!(items[0].photos.is_empty());
    let doc = &items[0].documents[0];
    assert_eq!(doc.name, "chapter 12.pdf");
    assert_eq!(doc.page_urls.len(), 3);
}

#[tokio::test]
async fn test_kuaikan_http_error_propagates_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/comics/1"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let resolver = KuaikanResolver::with_base_url(server.uri()).expect("resolver");
    let result = resolver
        .resolve(
            "https://www.kuaikanmanhua.com/webs/comic-next/1",
            &creds_with(Platform::Kuaikan, "kk"),
        )
        .await;

    assert!(matches!(
        result,
        Err(ResolveError::Network {
            status: Some(403),
            ..
        })
    ));
}
