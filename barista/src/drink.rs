//! Drinks and the two forms they are presented in

use barista_auth::jwt::OneOrMany;
use serde::{Deserialize, Serialize};

/// Identifies a drink on the menu
pub type DrinkId = u64;

/// One part of a drink's recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    pub color: String,
    pub parts: u32,
}

/// The ingredients of a drink, in pouring order
///
/// Request bodies may give a single ingredient or a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "OneOrMany<Ingredient>")]
pub struct Recipe(Vec<Ingredient>);

impl Recipe {
    /// Whether the recipe has no ingredients
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The ingredients
    #[must_use]
    pub fn ingredients(&self) -> &[Ingredient] {
        &self.0
    }
}

impl From<OneOrMany<Ingredient>> for Recipe {
    fn from(vals: OneOrMany<Ingredient>) -> Self {
        match vals {
            OneOrMany::One(x) => Self(vec![x]),
            OneOrMany::Many(v) => Self(v),
        }
    }
}

impl From<Vec<Ingredient>> for Recipe {
    fn from(ingredients: Vec<Ingredient>) -> Self {
        Self(ingredients)
    }
}

/// A drink on the menu
///
/// Serializes as the long form, which reveals ingredient names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drink {
    pub id: DrinkId,
    pub title: String,
    pub recipe: Recipe,
}

impl Drink {
    /// The public form, which hides ingredient names
    #[must_use]
    pub fn short(&self) -> ShortDrink {
        ShortDrink {
            id: self.id,
            title: self.title.clone(),
            recipe: self
                .recipe
                .ingredients()
                .iter()
                .map(|i| ShortIngredient {
                    color: i.color.clone(),
                    parts: i.parts,
                })
                .collect(),
        }
    }
}

/// The public form of a drink
#[derive(Debug, Clone, Serialize)]
pub struct ShortDrink {
    id: DrinkId,
    title: String,
    recipe: Vec<ShortIngredient>,
}

#[derive(Debug, Clone, Serialize)]
struct ShortIngredient {
    color: String,
    parts: u32,
}

/// A drink to add to the menu
#[derive(Debug, Clone, Deserialize)]
pub struct NewDrink {
    pub title: String,
    pub recipe: Recipe,
}

impl NewDrink {
    /// Checks that the drink has a title and at least one ingredient
    ///
    /// # Errors
    ///
    /// Describes the first missing part.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty");
        }

        if self.recipe.is_empty() {
            return Err("recipe must have at least one ingredient");
        }

        Ok(())
    }
}

/// Changes to a drink; absent fields are left alone
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrinkPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub recipe: Option<Recipe>,
}

impl DrinkPatch {
    /// Checks that any given title or recipe is not empty
    ///
    /// # Errors
    ///
    /// Describes the first empty field.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be empty");
        }

        if self.recipe.as_ref().is_some_and(Recipe::is_empty) {
            return Err("recipe must have at least one ingredient");
        }

        Ok(())
    }
}
