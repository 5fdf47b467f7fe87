//! Guards for the permissions the drinks routes require

barista_axum::permission_guards! {
    pub permission GetDrinksDetail = "get:drinks-detail";
    pub permission PostDrinks = "post:drinks";
    pub permission PatchDrinks = "patch:drinks";
    pub permission DeleteDrinks = "delete:drinks";
}
