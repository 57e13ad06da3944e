//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oauth2::OAUTH2_TAG;
use crate::oauth2::endpoints::SUPPORTED_SCOPES;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{
        AuthorizationCode, Flow, HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme,
    },
};

/// Security schemes referenced by the OAuth2 endpoints.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .description(Some(
                "Access token for `/oauth2/userinfo`, or the user's own session token for \
                 `POST /oauth2/login`.",
            ))
            .build();
        components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));

        let descriptions = [
            "OpenID Connect scope",
            "Access to user profile",
            "Access to user email",
        ];
        let oauth2 = OAuth2::new([Flow::AuthorizationCode(AuthorizationCode::new(
            "/oauth2/authorize",
            "/oauth2/token",
            Scopes::from_iter(SUPPORTED_SCOPES.into_iter().zip(descriptions)),
        ))]);
        components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "OAuth2 Authorization Server",
        version = "1.0.0",
        description = "OAuth2 / OpenID Connect authorization code grant with refresh token rotation, \
                       introspection and revocation."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 and OpenID Connect endpoints")
    )
)]
pub struct ApiDoc;
