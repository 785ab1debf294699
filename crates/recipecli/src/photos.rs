use std::time::Duration;

use futures::future::join_all;
use image::DynamicImage;
use imageloader_service::LoadImages;
use imageloader_service::recipes::{PhotoSize, Recipe};
use serde::Serialize;
use url::Url;
use uuid::Uuid;

/// What became of a recipe's photo.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhotoState {
    /// The recipe has no photo of the requested size.
    Missing,
    Loaded { width: u32, height: u32 },
    /// The photo could not be loaded.
    Failed,
    /// Loading took too long and was cancelled.
    TimedOut,
}

/// A recipe together with its photo, as rendered by the output.
#[derive(Clone, Debug, Serialize)]
pub struct RecipeRow {
    pub id: Uuid,
    pub name: String,
    pub cuisine: String,
    pub photo_url: Option<Url>,
    pub photo: PhotoState,
}

/// Loads the photo of every recipe concurrently.
///
/// Every row requests its photo under its own requester id, so that a timed out row only
/// cancels its own interest in a photo shared with other rows.
pub async fn load_photos<L>(
    loader: &L,
    recipes: Vec<Recipe>,
    size: PhotoSize,
    timeout: Duration,
) -> Vec<RecipeRow>
where
    L: LoadImages<Image = DynamicImage>,
{
    let rows = recipes.into_iter().map(|recipe| async move {
        let photo_url = recipe.photo_url(size).cloned();
        let photo = match &photo_url {
            Some(url) => load_photo(loader, url, timeout).await,
            None => PhotoState::Missing,
        };

        RecipeRow {
            id: recipe.id,
            name: recipe.name,
            cuisine: recipe.cuisine,
            photo_url,
            photo,
        }
    });

    join_all(rows).await
}

async fn load_photo<L>(loader: &L, url: &Url, timeout: Duration) -> PhotoState
where
    L: LoadImages<Image = DynamicImage>,
{
    let id = Uuid::new_v4();
    match tokio::time::timeout(timeout, loader.load_image(url.clone(), id)).await {
        Ok(Some(image)) => PhotoState::Loaded {
            width: image.width(),
            height: image.height(),
        },
        Ok(None) => PhotoState::Failed,
        Err(_) => {
            tracing::debug!(%url, %id, "Photo timed out");
            loader.cancel_load(url, id);
            PhotoState::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::FutureExt;
    use futures::future::BoxFuture;

    use super::*;

    #[derive(Default)]
    struct FakeLoader {
        cancelled: Mutex<Vec<(Url, Uuid)>>,
    }

    impl LoadImages for FakeLoader {
        type Image = DynamicImage;

        fn load_image(&self, url: Url, _id: Uuid) -> BoxFuture<'_, Option<Arc<DynamicImage>>> {
            async move {
                match url.path() {
                    "/ok.png" => Some(Arc::new(DynamicImage::new_rgb8(4, 3))),
                    "/slow.png" => futures::future::pending().await,
                    _ => None,
                }
            }
            .boxed()
        }

        fn cancel_load(&self, url: &Url, id: Uuid) {
            self.cancelled.lock().unwrap().push((url.clone(), id));
        }
    }

    fn recipe(name: &str, photo: Option<&str>) -> Recipe {
        Recipe {
            small_photo_url: photo.map(|photo| photo.parse().unwrap()),
            ..Recipe::new(Uuid::new_v4(), name, "British")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_photos() {
        let loader = FakeLoader::default();
        let recipes = vec![
            recipe("Loaded", Some("http://example.com/ok.png")),
            recipe("Broken", Some("http://example.com/broken.png")),
            recipe("Slow", Some("http://example.com/slow.png")),
            recipe("Plain", None),
        ];

        let rows = load_photos(&loader, recipes, PhotoSize::Small, Duration::from_secs(1)).await;
        let states: Vec<_> = rows.iter().map(|row| row.photo).collect();
        assert_eq!(
            states,
            [
                PhotoState::Loaded {
                    width: 4,
                    height: 3
                },
                PhotoState::Failed,
                PhotoState::TimedOut,
                PhotoState::Missing,
            ]
        );

        let cancelled = loader.cancelled.lock().unwrap();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(cancelled[0].0.path(), "/slow.png");
    }

    #[tokio::test]
    async fn test_large_photos() {
        let loader = FakeLoader::default();
        let recipes = vec![recipe("Small only", Some("http://example.com/ok.png"))];

        let rows = load_photos(&loader, recipes, PhotoSize::Large, Duration::from_secs(1)).await;
        assert_eq!(rows[0].photo, PhotoState::Missing);
        assert_eq!(rows[0].photo_url, None);
    }
}
