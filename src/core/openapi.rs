use utoipa::openapi::security::{
    ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme,
};
use utoipa::{Modify, OpenApi};

use crate::features::auth::model::INTEGRATIONS_TOKEN_HEADER;
use crate::features::files::{dtos as files_dtos, handlers as files_handlers};
use crate::shared::types::{ApiResponse, Meta};

#[derive(OpenApi)]
#[openapi(
    paths(
        // Files
        files_handlers::upload,
        files_handlers::download,
        files_handlers::files_list,
        files_handlers::delete_file,
    ),
    components(
        schemas(
            // Shared
            Meta,
            // Files
            files_dtos::UploadBody,
            files_dtos::FileResponseDto,
            files_dtos::FileItemDto,
            files_dtos::FilesListResponseDto,
            files_dtos::DeleteFileResponseDto,
            ApiResponse<files_dtos::FileResponseDto>,
            ApiResponse<files_dtos::FilesListResponseDto>,
            ApiResponse<files_dtos::DeleteFileResponseDto>,
        )
    ),
    tags(
        (name = "files", description = "File upload, download and listing"),
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Storage Gateway API",
        version = "0.1.0",
        description = "Upload files to object storage and stream them back",
    )
)]
pub struct ApiDoc;

/// Adds the session bearer token and the integration token schemes
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
            components.add_security_scheme(
                "integrations_token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    INTEGRATIONS_TOKEN_HEADER,
                ))),
            );
        }
    }
}

/// Modifier to override OpenAPI info from config
pub struct SwaggerInfoModifier {
    pub title: String,
    pub version: String,
    pub description: String,
}

impl Modify for SwaggerInfoModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        openapi.info.title = self.title.clone();
        openapi.info.version = self.version.clone();
        openapi.info.description = Some(self.description.clone());
    }
}
