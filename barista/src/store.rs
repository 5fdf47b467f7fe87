//! Storage for the drinks menu

use std::{collections::BTreeMap, error::Error as StdError, fmt};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::drink::{Drink, DrinkId, DrinkPatch, Ingredient, NewDrink, Recipe};

/// A failure reported by a [`DrinkStore`]
#[derive(Debug, Error)]
pub enum StoreError {
    /// No drink has the requested id
    #[error("drink {0} not found")]
    NotFound(DrinkId),

    /// Another drink already has the requested title
    #[error("a drink titled `{0}` already exists")]
    Conflict(String),

    /// The store itself failed
    #[error("drink store unavailable")]
    Unavailable(#[source] Box<dyn StdError + Send + Sync>),
}

/// Where drinks are kept
///
/// Each operation completes atomically.
#[async_trait]
pub trait DrinkStore: Send + Sync + fmt::Debug {
    /// All drinks, ordered by id
    async fn list(&self) -> Result<Vec<Drink>, StoreError>;

    /// The drink with the given id
    async fn get(&self, id: DrinkId) -> Result<Drink, StoreError>;

    /// Adds a drink under a fresh id
    async fn insert(&self, drink: NewDrink) -> Result<Drink, StoreError>;

    /// Applies a patch to an existing drink
    async fn update(&self, id: DrinkId, patch: DrinkPatch) -> Result<Drink, StoreError>;

    /// Removes a drink
    async fn delete(&self, id: DrinkId) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct Menu {
    next_id: DrinkId,
    drinks: BTreeMap<DrinkId, Drink>,
}

impl Menu {
    fn title_taken(&self, title: &str, except: Option<DrinkId>) -> bool {
        self.drinks
            .values()
            .any(|d| d.title == title && Some(d.id) != except)
    }
}

/// A [`DrinkStore`] held in process memory
#[derive(Debug)]
pub struct InMemoryStore {
    menu: RwLock<Menu>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// An empty menu
    #[must_use]
    pub fn new() -> Self {
        Self {
            menu: RwLock::new(Menu {
                next_id: 1,
                drinks: BTreeMap::new(),
            }),
        }
    }

    /// A menu holding a single glass of water
    #[must_use]
    pub fn with_sample_menu() -> Self {
        let water = Drink {
            id: 1,
            title: "water".to_owned(),
            recipe: Recipe::from(vec![Ingredient {
                name: "water".to_owned(),
                color: "blue".to_owned(),
                parts: 1,
            }]),
        };

        Self {
            menu: RwLock::new(Menu {
                next_id: 2,
                drinks: BTreeMap::from([(water.id, water)]),
            }),
        }
    }
}

#[async_trait]
impl DrinkStore for InMemoryStore {
    async fn list(&self) -> Result<Vec<Drink>, StoreError> {
        Ok(self.menu.read().await.drinks.values().cloned().collect())
    }

    async fn get(&self, id: DrinkId) -> Result<Drink, StoreError> {
        self.menu
            .read()
            .await
            .drinks
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn insert(&self, drink: NewDrink) -> Result<Drink, StoreError> {
        let mut menu = self.menu.write().await;
        if menu.title_taken(&drink.title, None) {
            return Err(StoreError::Conflict(drink.title));
        }

        let id = menu.next_id;
        menu.next_id += 1;

        let drink = Drink {
            id,
            title: drink.title,
            recipe: drink.recipe,
        };
        menu.drinks.insert(id, drink.clone());

        Ok(drink)
    }

    async fn update(&self, id: DrinkId, patch: DrinkPatch) -> Result<Drink, StoreError> {
        let mut menu = self.menu.write().await;
        if !menu.drinks.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }

        if let Some(title) = &patch.title {
            if menu.title_taken(title, Some(id)) {
                return Err(StoreError::Conflict(title.clone()));
            }
        }

        let drink = menu.drinks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(title) = patch.title {
            drink.title = title;
        }
        if let Some(recipe) = patch.recipe {
            drink.recipe = recipe;
        }

        Ok(drink.clone())
    }

    async fn delete(&self, id: DrinkId) -> Result<(), StoreError> {
        self.menu
            .write()
            .await
            .drinks
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
