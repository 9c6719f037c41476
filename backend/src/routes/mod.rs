//! Route definitions for the Nursery Management Platform

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::{
    handlers,
    middleware::{admin_middleware, auth_middleware},
    AppState,
};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Auth routes (public)
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh))
        .merge(session_routes(state.clone()))
        .nest("/categories", category_routes(state.clone()))
        .nest("/varieties", variety_routes(state.clone()))
        .nest("/seed-inward", seed_inward_routes(state.clone()))
        .nest("/lots", lot_routes(state.clone()))
        .nest("/orders", order_routes(state.clone()))
        .nest("/customers", customer_routes(state.clone()))
        .nest("/reports", report_routes(state.clone()))
        .merge(admin_routes(state))
}

/// Signed-in session routes (protected)
fn session_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/logout", post(handlers::logout))
        .route("/user", get(handlers::current_user))
        .route("/my-permissions", get(handlers::my_permissions))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Category routes (protected)
fn category_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_categories).post(handlers::create_category),
        )
        .route(
            "/:id",
            get(handlers::get_category)
                .put(handlers::update_category)
                .delete(handlers::delete_category),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Variety routes (protected)
fn variety_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_varieties).post(handlers::create_variety),
        )
        .route(
            "/:id",
            get(handlers::get_variety)
                .put(handlers::update_variety)
                .delete(handlers::delete_variety),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Seed inward routes (protected)
fn seed_inward_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_batches).post(handlers::receive_batch))
        .route("/lots", get(handlers::list_available_batches))
        .route(
            "/:id",
            get(handlers::get_batch)
                .put(handlers::update_batch)
                .delete(handlers::delete_batch),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Sowing lot routes (protected)
fn lot_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_lots).post(handlers::create_lot))
        .route(
            "/:lot_id",
            get(handlers::get_lot)
                .put(handlers::update_lot)
                .delete(handlers::delete_lot),
        )
        .route("/:lot_id/damage", post(handlers::record_damage))
        .route("/:lot_id/assign-orders", post(handlers::assign_orders))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Order and delivery routes (protected)
fn order_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route(
            "/:order_id",
            get(handlers::get_order)
                .put(handlers::update_order)
                .delete(handlers::delete_order),
        )
        .route("/:order_id/deliver", post(handlers::deliver_order))
        .route("/:order_id/cancel", post(handlers::cancel_order))
        .route("/:order_id/undo-delivery", post(handlers::undo_delivery))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Customer lookup (protected)
fn customer_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/lookup", get(handlers::lookup_customer))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Dashboard and schedule routes (protected)
fn report_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/summary", get(handlers::get_summary))
        .route("/deliveries", get(handlers::get_delivery_schedule))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// User, role and audit administration (admin only)
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/roles/:role/permissions",
            get(handlers::get_role_permissions).put(handlers::update_role_permissions),
        )
        .route("/audit-logs", get(handlers::list_audit_logs))
        // Layers run bottom-up: authenticate first, then check the role
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
