//! Helpers for testing the image loader.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using a [`HitCounter`], make sure that it is held until all requests to it have been
//!    made. If the server is dropped, the ports remain open and all connections to it will time
//!    out. To avoid this, assign it to a variable: `let server = HitCounter::new();`.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use axum::extract::{self, Host, Request};
use axum::middleware::{self, Next};
use axum::routing::get;
use axum::{Json, Router};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use reqwest::{StatusCode, Url};
use serde_json::{Value, json};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `imageloader` crates and mutes all
///    other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("imageloader_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Encodes a solid PNG image of the given dimensions.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([0xe0, 0x6c, 0x3c]));
    let mut data = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut data), ImageFormat::Png)
        .unwrap();
    data
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Serves `router` on an ephemeral port on localhost.
    pub fn with_router(router: Router) -> Self {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://127.0.0.1:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The recipes document served at `/recipes.json`, with photos pointing back at `host`.
///
/// Two recipes share the same small photo, one photo is missing on the server, and one recipe
/// has no photos at all.
pub fn recipes_document(host: &str) -> Value {
    let url = |path: &str| format!("http://{host}/{path}");
    json!({
        "recipes": [
            {
                "uuid": "0c6ca6e7-e32a-4053-b824-1dbf749910d8",
                "name": "Apam Balik",
                "cuisine": "Malaysian",
                "photo_url_large": url("images/64/48/apam-balik/large.png"),
                "photo_url_small": url("images/16/12/shared/small.png"),
                "source_url": "https://www.nyonyacooking.com/recipes/apam-balik~SJ5WuvsDf9WQ",
                "youtube_url": "https://www.youtube.com/watch?v=6R8ffRRJcrg",
            },
            {
                "uuid": "599344f4-3c5c-4cca-b914-2210e3b3312f",
                "name": "Apple & Blackberry Crumble",
                "cuisine": "British",
                "photo_url_large": url("images/64/64/crumble/large.png"),
                "photo_url_small": url("images/16/12/shared/small.png"),
            },
            {
                "uuid": "74f6d4eb-da50-4901-94d1-deae2d8af1d1",
                "name": "Apple Frangipan Tart",
                "cuisine": "British",
                "photo_url_large": url("respond_statuscode/404/tart/large.png"),
                "photo_url_small": url("respond_statuscode/404/tart/small.png"),
            },
            {
                "uuid": "1a86ef7d-a9f1-44c1-a4a0-2278f5916d49",
                "name": "Eton Mess",
                "cuisine": "British",
            },
        ]
    })
}

/// A test server counting the hits to every path.
///
/// Serves:
///
///  - `/images/:width/:height/*tail`: a PNG image of the given dimensions
///  - `/delay/:time/*path`: redirects to `/path` after `time` has passed
///  - `/respond_statuscode/:num/*tail`: an empty response with the given status code
///  - `/garbage_data/*tail`: the `tail` as plain text
///  - `/recipes.json`: see [`recipes_document`]
pub struct HitCounter {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl HitCounter {
    pub fn new() -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |extract::OriginalUri(uri), req: Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        let hits = hits.entry(uri.to_string()).or_default();
                        *hits += 1;
                    }

                    next.run(req).await
                }
            }
        };

        let router = Router::new()
            .route(
                "/images/:width/:height/*tail",
                get(
                    |extract::Path((width, height, _)): extract::Path<(u32, u32, String)>| async move {
                        ([("Content-Type", "image/png")], png_bytes(width, height))
                    },
                ),
            )
            .route(
                "/delay/:time/*path",
                get(
                    |extract::Path((time, path)): extract::Path<(String, String)>| async move {
                        let duration = humantime::parse_duration(&time).unwrap();
                        tokio::time::sleep(duration).await;

                        (StatusCode::FOUND, [("Location", format!("/{}", path))])
                    },
                ),
            )
            .route(
                "/respond_statuscode/:num/*tail",
                get(
                    |extract::Path((num, _)): extract::Path<(u16, String)>| async move {
                        StatusCode::from_u16(num).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
                    },
                ),
            )
            .route(
                "/garbage_data/*tail",
                get(|extract::Path(tail): extract::Path<String>| async move { tail }),
            )
            .route(
                "/recipes.json",
                get(|Host(host): Host| async move { Json(recipes_document(&host)) }),
            )
            .layer(middleware::from_fn(hitcounter));

        let server = Server::with_router(router);

        Self { server, hits }
    }

    /// Returns the total number of hits and resets the counter.
    pub fn accesses(&self) -> usize {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_values().sum()
    }

    /// Returns the hits per path and resets the counter.
    pub fn all_hits(&self) -> Vec<(String, usize)> {
        let map = std::mem::take(&mut *self.hits.lock().unwrap());
        map.into_iter().collect()
    }

    pub fn url(&self, path: &str) -> Url {
        self.server.url(path)
    }
}

impl Default for HitCounter {
    fn default() -> Self {
        Self::new()
    }
}
