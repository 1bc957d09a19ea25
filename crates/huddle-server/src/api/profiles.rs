use crate::auth::CurrentProfile;
use crate::error::Result;
use crate::models::Profile;
use axum::Json;

pub async fn get_me(CurrentProfile(profile): CurrentProfile) -> Result<Json<Profile>> {
    Ok(Json(profile))
}
