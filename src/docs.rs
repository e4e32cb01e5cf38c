use utoipa::OpenApi;
use crate::modules::video::dto::{UploadVideoRequest, VideoResponse};
use crate::modules::video::model::{OwnerSummary, VideoRecord};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::modules::video::handler::upload_video,
        crate::modules::video::handler::list_videos,
        crate::modules::video::handler::get_video,
    ),
    components(
        schemas(
            UploadVideoRequest, VideoRecord, VideoResponse, OwnerSummary,
        )
    ),
    tags(
        (name = "Videos", description = "Video upload, transcoding and catalog")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

use utoipa::Modify;
use utoipa::openapi::security::{SecurityScheme, HttpAuthScheme, HttpBuilder};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
