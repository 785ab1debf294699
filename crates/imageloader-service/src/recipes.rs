//! The recipe list: data model, wire format and sources.
//!
//! Recipes are served as a JSON document with a single `recipes` array at its root. A single
//! malformed entry fails the whole list.

use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize, de};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::utils::http::{self, FetchTimeouts};

/// Parses a UUID in its hyphenated form only, e.g. `0c6ca6e7-e32a-4053-b824-1dbf749910d8`.
///
/// The simple, braced and URN forms are rejected.
fn deserialize_hyphenated_uuid<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Uuid, D::Error> {
    let value = String::deserialize(deserializer)?;
    let bytes = value.as_bytes();
    let is_hyphenated =
        bytes.len() == 36 && [8, 13, 18, 23].into_iter().all(|index| bytes[index] == b'-');

    is_hyphenated
        .then(|| Uuid::parse_str(&value).ok())
        .flatten()
        .ok_or_else(|| de::Error::invalid_value(de::Unexpected::Str(&value), &"a hyphenated UUID"))
}

/// A recipe, as shown in the recipe list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipe {
    #[serde(rename = "uuid", deserialize_with = "deserialize_hyphenated_uuid")]
    pub id: Uuid,
    pub name: String,
    pub cuisine: String,
    #[serde(default, rename = "photo_url_large")]
    pub large_photo_url: Option<Url>,
    #[serde(default, rename = "photo_url_small")]
    pub small_photo_url: Option<Url>,
    #[serde(default)]
    pub source_url: Option<Url>,
    #[serde(default)]
    pub youtube_url: Option<Url>,
}

impl Recipe {
    /// Creates a recipe without any links.
    pub fn new(id: Uuid, name: impl Into<String>, cuisine: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            cuisine: cuisine.into(),
            large_photo_url: None,
            small_photo_url: None,
            source_url: None,
            youtube_url: None,
        }
    }

    /// The photo of the given size, if the recipe has one.
    pub fn photo_url(&self, size: PhotoSize) -> Option<&Url> {
        match size {
            PhotoSize::Small => self.small_photo_url.as_ref(),
            PhotoSize::Large => self.large_photo_url.as_ref(),
        }
    }
}

/// The two photo sizes every recipe may link to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoSize {
    #[default]
    Small,
    Large,
}

/// The document served by the recipes endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipesResponse {
    pub recipes: Vec<Recipe>,
}

impl RecipesResponse {
    /// Parses a recipes document.
    pub fn from_slice(data: &[u8]) -> Result<Self, RecipeError> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// An error that happens when the recipe list can not be obtained.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("failed to request recipes")]
    Request(#[from] reqwest::Error),
    #[error("failed to parse recipes")]
    Decode(#[from] serde_json::Error),
    #[error("recipes unavailable: {0}")]
    Unavailable(String),
}

/// A source of recipes.
pub trait FetchRecipes: Send + Sync {
    fn fetch_recipes(&self) -> BoxFuture<'_, Result<Vec<Recipe>, RecipeError>>;
}

/// Fetches the recipe list from an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpRecipeFetcher {
    url: Url,
    client: Client,
}

impl HttpRecipeFetcher {
    pub fn new(url: Url, client: Client) -> Self {
        Self { url, client }
    }

    /// Creates a fetcher for the configured `recipes_url`.
    pub fn from_config(config: &Config) -> reqwest::Result<Self> {
        let client = http::create_client(&FetchTimeouts::from_config(config))?;
        Ok(Self::new(config.recipes_url.clone(), client))
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn fetch(&self) -> Result<Vec<Recipe>, RecipeError> {
        tracing::debug!(url = %self.url, "Fetching recipes");
        let response = self.client.get(self.url.clone()).send().await?;
        let data = response.error_for_status()?.bytes().await?;

        let recipes = RecipesResponse::from_slice(&data)?.recipes;
        tracing::debug!(count = recipes.len(), "Fetched recipes");
        Ok(recipes)
    }
}

impl FetchRecipes for HttpRecipeFetcher {
    fn fetch_recipes(&self) -> BoxFuture<'_, Result<Vec<Recipe>, RecipeError>> {
        self.fetch().boxed()
    }
}

/// What a [`StaticRecipeFetcher`] responds with.
#[derive(Debug, Clone)]
pub enum StaticRecipes {
    Recipes(Vec<Recipe>),
    /// Fails with [`RecipeError::Unavailable`] and this message.
    Error(String),
}

/// Serves a fixed response, optionally after a delay.
#[derive(Debug, Clone)]
pub struct StaticRecipeFetcher {
    response: StaticRecipes,
    delay: Option<Duration>,
}

impl StaticRecipeFetcher {
    pub fn recipes(recipes: Vec<Recipe>) -> Self {
        Self {
            response: StaticRecipes::Recipes(recipes),
            delay: None,
        }
    }

    pub fn empty() -> Self {
        Self::recipes(Vec::new())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            response: StaticRecipes::Error(message.into()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl FetchRecipes for StaticRecipeFetcher {
    fn fetch_recipes(&self) -> BoxFuture<'_, Result<Vec<Recipe>, RecipeError>> {
        async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.response {
                StaticRecipes::Recipes(recipes) => Ok(recipes.clone()),
                StaticRecipes::Error(message) => Err(RecipeError::Unavailable(message.clone())),
            }
        }
        .boxed()
    }
}
