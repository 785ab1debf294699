use std::time::Duration;

use futures::future::join_all;
use imageloader_service::config::Config;
use imageloader_service::fetch::{Fetch, FetchError, HttpFetcher};
use uuid::Uuid;

use crate::{HitCounter, setup_loader};

#[tokio::test]
async fn test_load_image() {
    let loader = setup_loader(|_| {});
    let server = HitCounter::new();
    let url = server.url("images/32/24/photo.png");

    let image = loader.request(url.clone(), Uuid::new_v4()).await.unwrap();
    assert_eq!((image.width(), image.height()), (32, 24));

    // served from the cache the second time around
    let again = loader.request(url, Uuid::new_v4()).await.unwrap();
    assert!(std::sync::Arc::ptr_eq(&image, &again));
    assert_eq!(server.accesses(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_a_download() {
    let loader = setup_loader(|_| {});
    let server = HitCounter::new();
    let url = server.url("delay/100ms/images/8/8/shared.png");

    let requests = (0..8).map(|_| loader.request(url.clone(), Uuid::new_v4()));
    let images = join_all(requests).await;

    assert!(images.iter().all(Option::is_some));
    assert_eq!(
        server.all_hits(),
        vec![
            ("/delay/100ms/images/8/8/shared.png".to_owned(), 1),
            ("/images/8/8/shared.png".to_owned(), 1),
        ]
    );
}

#[tokio::test]
async fn test_failures_yield_none() {
    let loader = setup_loader(|config| {
        config.max_download_timeout = Duration::from_millis(200);
    });
    let server = HitCounter::new();

    for path in [
        "respond_statuscode/404/missing.png",
        "respond_statuscode/500/broken.png",
        "garbage_data/not-an-image.png",
        "delay/1h/images/8/8/slow.png",
    ] {
        let image = loader.request(server.url(path), Uuid::new_v4()).await;
        assert!(image.is_none(), "loaded an image from {path}");
    }

    // failures are not cached
    loader
        .request(server.url("respond_statuscode/404/missing.png"), Uuid::new_v4())
        .await;
    assert_eq!(server.accesses(), 5);
}

#[tokio::test]
async fn test_cancel_single_requester() {
    let loader = setup_loader(|_| {});
    let server = HitCounter::new();
    let url = server.url("delay/200ms/images/8/8/photo.png");
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let load_a = tokio::spawn({
        let (loader, url) = (loader.clone(), url.clone());
        async move { loader.request(url, a).await }
    });
    let load_b = tokio::spawn({
        let (loader, url) = (loader.clone(), url.clone());
        async move { loader.request(url, b).await }
    });

    while loader.coordinator().waiter_count(&url) < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    loader.cancel(&url, a);

    assert!(load_a.await.unwrap().is_none());
    assert!(load_b.await.unwrap().is_some());
    assert!(loader.cached(&url).is_some());
}

#[tokio::test]
async fn test_cancel_last_requester() {
    let loader = setup_loader(|_| {});
    let server = HitCounter::new();
    let url = server.url("delay/200ms/images/8/8/photo.png");
    let id = Uuid::new_v4();

    let load = tokio::spawn({
        let (loader, url) = (loader.clone(), url.clone());
        async move { loader.request(url, id).await }
    });

    while loader.coordinator().waiter_count(&url) < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    loader.cancel(&url, id);
    assert!(load.await.unwrap().is_none());
    assert_eq!(loader.coordinator().pending_count(), 0);

    // the redirect target is never requested
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(loader.cached(&url).is_none());
    assert_eq!(
        server.all_hits(),
        vec![("/delay/200ms/images/8/8/photo.png".to_owned(), 1)]
    );
}

#[tokio::test]
async fn test_http_fetcher_errors() {
    imageloader_test::setup();
    let server = HitCounter::new();
    let config = Config {
        max_download_timeout: Duration::from_millis(100),
        ..Config::default()
    };
    let fetcher = HttpFetcher::from_config(&config).unwrap();

    let data = fetcher.fetch(&server.url("garbage_data/hello")).await.unwrap();
    assert_eq!(&data[..], b"hello");

    let result = fetcher.fetch(&server.url("respond_statuscode/404/x")).await;
    assert_eq!(result.unwrap_err(), FetchError::NotFound);

    let result = fetcher.fetch(&server.url("respond_statuscode/403/x")).await;
    assert_eq!(
        result.unwrap_err(),
        FetchError::PermissionDenied("403 Forbidden".into())
    );

    let result = fetcher.fetch(&server.url("respond_statuscode/400/x")).await;
    assert_eq!(
        result.unwrap_err(),
        FetchError::DownloadError("400 Bad Request".into())
    );

    let result = fetcher.fetch(&server.url("respond_statuscode/500/x")).await;
    assert_eq!(
        result.unwrap_err(),
        FetchError::DownloadError("500 Internal Server Error".into())
    );

    let result = fetcher.fetch(&server.url("delay/1h/x")).await;
    assert_eq!(
        result.unwrap_err(),
        FetchError::Timeout(Duration::from_millis(100))
    );
}
