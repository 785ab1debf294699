use imageloader_service::recipes::{FetchRecipes, HttpRecipeFetcher, PhotoSize, RecipeError};
use imageloader_service::utils::http::{FetchTimeouts, create_client};
use uuid::Uuid;

use crate::{HitCounter, setup_loader};

fn recipe_fetcher(server: &HitCounter, path: &str) -> HttpRecipeFetcher {
    let client = create_client(&FetchTimeouts::default()).unwrap();
    HttpRecipeFetcher::new(server.url(path), client)
}

#[tokio::test]
async fn test_fetch_recipes() {
    imageloader_test::setup();
    let server = HitCounter::new();

    let recipes = recipe_fetcher(&server, "recipes.json")
        .fetch_recipes()
        .await
        .unwrap();

    let names: Vec<_> = recipes.iter().map(|recipe| recipe.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "Apam Balik",
            "Apple & Blackberry Crumble",
            "Apple Frangipan Tart",
            "Eton Mess"
        ]
    );
    assert!(recipes[3].photo_url(PhotoSize::Small).is_none());
}

#[tokio::test]
async fn test_fetch_recipes_errors() {
    imageloader_test::setup();
    let server = HitCounter::new();

    let result = recipe_fetcher(&server, "garbage_data/recipes.json")
        .fetch_recipes()
        .await;
    assert!(matches!(result, Err(RecipeError::Decode(_))));

    let result = recipe_fetcher(&server, "respond_statuscode/500/recipes.json")
        .fetch_recipes()
        .await;
    assert!(matches!(result, Err(RecipeError::Request(_))));
}

#[tokio::test]
async fn test_load_recipe_photos() {
    let loader = setup_loader(|_| {});
    let server = HitCounter::new();

    let recipes = recipe_fetcher(&server, "recipes.json")
        .fetch_recipes()
        .await
        .unwrap();
    server.accesses();

    let loads = recipes.iter().map(|recipe| {
        let loader = &loader;
        async move {
            let url = recipe.photo_url(PhotoSize::Small)?.clone();
            loader.request(url, Uuid::new_v4()).await
        }
    });
    let photos = futures::future::join_all(loads).await;

    let loaded: Vec<_> = photos.iter().map(Option::is_some).collect();
    assert_eq!(loaded, [true, true, false, false]);

    // the two recipes sharing a photo trigger a single download
    assert_eq!(
        server.all_hits(),
        vec![
            ("/images/16/12/shared/small.png".to_owned(), 1),
            ("/respond_statuscode/404/tart/small.png".to_owned(), 1),
        ]
    );
}
