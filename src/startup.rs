use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::auth::{RefreshCoordinator, TokenIssuer};
use crate::configuration::JwtSettings;
use crate::logger::RequestLogger;
use crate::middleware::TokenValidator;
use crate::routes::{
    change_role, delete_profile, get_user, health_check, list_posts, refresh_tokens, register,
    signin, signout, update_profile,
};
use crate::store::{SessionStore, UserStore};

/// The two persistence seams the server needs. Production wires the
/// Postgres implementations; tests wire the in-memory ones.
pub struct AppStores {
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
}

pub fn run(
    listener: TcpListener,
    stores: AppStores,
    jwt_config: JwtSettings,
) -> Result<Server, std::io::Error> {
    let users: web::Data<dyn UserStore> = web::Data::from(stores.users.clone());
    let sessions: web::Data<dyn SessionStore> = web::Data::from(stores.sessions.clone());
    let issuer = web::Data::new(TokenIssuer::new(stores.sessions.clone(), jwt_config.clone()));
    let coordinator = web::Data::new(RefreshCoordinator::new(
        stores.users.clone(),
        stores.sessions.clone(),
        jwt_config.clone(),
    ));

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            // Shared state
            .app_data(users.clone())
            .app_data(sessions.clone())
            .app_data(issuer.clone())
            .app_data(coordinator.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/signin", web::post().to(signin))
            .route("/signout", web::post().to(signout))
            .route("/refresh-tokens", web::post().to(refresh_tokens))
            .route("/users", web::post().to(register))
            .route("/users/{id}", web::get().to(get_user))
            // Protected routes: the validator gates everything in this
            // scope before a handler runs
            .service(
                web::scope("/users")
                    .wrap(TokenValidator::new(jwt_config.clone()))
                    .route("/{id}/posts", web::get().to(list_posts))
                    .route("/{id}/change-role", web::post().to(change_role))
                    .route("/{id}", web::patch().to(update_profile))
                    .route("/{id}", web::delete().to(delete_profile)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
