//! Handlers for the drinks routes
//!
//! Each protected handler takes its permission guard first, so that an
//! authorization failure is reported before any path or body problem.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    Json,
};
use serde::Serialize;

use crate::{
    drink::{Drink, DrinkId, DrinkPatch, NewDrink, ShortDrink},
    error::ApiError,
    permission::{DeleteDrinks, GetDrinksDetail, PatchDrinks, PostDrinks},
    store::DrinkStore,
};

/// A successful answer carrying drinks
#[derive(Debug, Serialize)]
pub struct DrinksResponse<T> {
    success: bool,
    drinks: Vec<T>,
}

impl<T> DrinksResponse<T> {
    fn new(drinks: Vec<T>) -> Json<Self> {
        Json(Self {
            success: true,
            drinks,
        })
    }
}

/// A successful answer to a deletion
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    success: bool,
    delete: DrinkId,
}

type Store = State<Arc<dyn DrinkStore>>;

fn drink_id(path: Result<Path<DrinkId>, PathRejection>) -> Result<DrinkId, ApiError> {
    match path {
        Ok(Path(id)) => Ok(id),
        Err(rejection) => {
            tracing::debug!(%rejection, "drink id not understood");
            Err(ApiError::NotFound)
        }
    }
}

fn body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::Unprocessable(rejection.body_text()))
}

/// `GET /drinks`: the public menu
pub async fn list_drinks(
    State(store): Store,
) -> Result<Json<DrinksResponse<ShortDrink>>, ApiError> {
    let drinks = store.list().await?;
    Ok(DrinksResponse::new(
        drinks.iter().map(Drink::short).collect(),
    ))
}

/// `GET /drinks-detail`: the menu with full recipes
pub async fn list_drinks_detail(
    _: GetDrinksDetail,
    State(store): Store,
) -> Result<Json<DrinksResponse<Drink>>, ApiError> {
    Ok(DrinksResponse::new(store.list().await?))
}

/// `POST /drinks`: adds a drink
pub async fn create_drink(
    _: PostDrinks,
    State(store): Store,
    payload: Result<Json<NewDrink>, JsonRejection>,
) -> Result<Json<DrinksResponse<Drink>>, ApiError> {
    let drink = body(payload)?;
    drink
        .validate()
        .map_err(|detail| ApiError::Unprocessable(detail.to_owned()))?;

    let drink = store.insert(drink).await?;
    tracing::info!(drink.id = drink.id, drink.title = %drink.title, "drink added");
    Ok(DrinksResponse::new(vec![drink]))
}

/// `PATCH /drinks/:id`: changes a drink's title or recipe
pub async fn update_drink(
    _: PatchDrinks,
    State(store): Store,
    id: Result<Path<DrinkId>, PathRejection>,
    payload: Result<Json<DrinkPatch>, JsonRejection>,
) -> Result<Json<DrinksResponse<Drink>>, ApiError> {
    let id = drink_id(id)?;
    let patch = body(payload)?;
    patch
        .validate()
        .map_err(|detail| ApiError::Unprocessable(detail.to_owned()))?;

    let drink = store.update(id, patch).await?;
    tracing::info!(drink.id = drink.id, "drink updated");
    Ok(DrinksResponse::new(vec![drink]))
}

/// `DELETE /drinks/:id`: removes a drink
pub async fn delete_drink(
    _: DeleteDrinks,
    State(store): Store,
    id: Result<Path<DrinkId>, PathRejection>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = drink_id(id)?;
    store.delete(id).await?;
    tracing::info!(drink.id = id, "drink deleted");
    Ok(Json(DeleteResponse {
        success: true,
        delete: id,
    }))
}

/// Answers requests for unknown routes
pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
