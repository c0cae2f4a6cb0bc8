/// Profiles, follows and avatars
///
/// `:user` accepts a user id or a username.

use super::{non_empty, read_file_field};
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    hooks::{self, RewardSummary},
};
use axum::{
    extract::{Multipart, Path, Query, State},
    Json,
};
use readhub_shared::{
    auth::middleware::{AuthContext, MaybeAuth},
    domain::UserId,
    gamification::XpEvent,
    models::{
        follow::{Follow, FollowEntry, FollowState},
        user::{PublicProfile, UpdateProfile, User},
    },
    pagination::{Page, PageQuery},
    storage,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub profile: PublicProfile,

    /// Present when the caller is signed in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_following: Option<bool>,
}

/// Absent fields are kept; an empty string clears the field
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(length(max = 100, message = "Display name must be at most 100 characters"))]
    pub display_name: Option<String>,

    #[validate(length(max = 500, message = "Bio must be at most 500 characters"))]
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FollowResponse {
    #[serde(flatten)]
    pub state: FollowState,
    #[serde(flatten)]
    pub rewards: RewardSummary,
}

/// Looks a user up by id, falling back to username
pub(crate) async fn resolve_user(state: &AppState, raw: &str) -> ApiResult<User> {
    let user = match UserId::parse(raw) {
        Ok(id) => User::find_by_id(&state.db, id).await?,
        Err(_) => User::find_by_username(&state.db, raw).await?,
    };
    user.ok_or_else(|| ApiError::not_found("User"))
}

pub async fn get_profile(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Path(user): Path<String>,
) -> ApiResult<Json<ProfileResponse>> {
    let user = resolve_user(&state, &user).await?;
    let (followers, following) = Follow::counts(&state.db, user.id).await?;

    let is_following = match auth {
        Some(auth) if auth.user_id != user.id => {
            Some(Follow::is_following(&state.db, auth.user_id, user.id).await?)
        }
        _ => None,
    };

    Ok(Json(ProfileResponse {
        profile: user.public_profile(followers, following),
        is_following,
    }))
}

pub async fn followers(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<FollowEntry>>> {
    let page = page.into_request()?;
    let user = resolve_user(&state, &user).await?;
    Ok(Json(Follow::followers(&state.db, user.id, &page).await?))
}

pub async fn following(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Page<FollowEntry>>> {
    let page = page.into_request()?;
    let user = resolve_user(&state, &user).await?;
    Ok(Json(Follow::following(&state.db, user.id, &page).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<UpdateMeRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    let update = UpdateProfile {
        display_name: req.display_name.map(|v| non_empty(Some(v))),
        bio: req.bio.map(|v| non_empty(Some(v))),
    };

    let user = User::update_profile(&state.db, auth.user_id, update)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(user))
}

/// Replace the avatar with an uploaded image (multipart field `file`)
pub async fn upload_avatar(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> ApiResult<Json<User>> {
    let (bytes, content_type) = read_file_field(&mut multipart).await?;
    if !storage::is_image(&content_type) {
        return Err(ApiError::invalid("file", "Avatar must be a PNG, JPEG, WebP or GIF image"));
    }

    let stored = state.storage.save(&bytes, &content_type, "avatars").await?;

    let previous = match User::set_avatar(&state.db, auth.user_id, Some(stored.url.clone())).await {
        Ok(Some(previous)) => previous,
        Ok(None) => {
            discard_file(&state, &stored.url).await;
            return Err(ApiError::not_found("User"));
        }
        Err(e) => {
            discard_file(&state, &stored.url).await;
            return Err(e.into());
        }
    };

    if let Some(old) = previous {
        discard_file(&state, &old).await;
    }

    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

/// Follow or unfollow
pub async fn toggle_follow(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user): Path<String>,
) -> ApiResult<Json<FollowResponse>> {
    let followee = resolve_user(&state, &user).await?;
    let follow_state = Follow::toggle(&state.db, auth.user_id, followee.id).await?;

    let rewards = if follow_state.following {
        hooks::reward(&state, auth.user_id, XpEvent::Follow).await
    } else {
        hooks::revoke_xp(&state, auth.user_id, XpEvent::Follow).await;
        RewardSummary::default()
    };

    tracing::debug!(
        follower = %auth.user_id,
        followee = %followee.id,
        following = follow_state.following,
        "Follow toggled"
    );

    Ok(Json(FollowResponse {
        state: follow_state,
        rewards,
    }))
}

/// Best-effort removal of a stored upload
pub(crate) async fn discard_file(state: &AppState, url: &str) {
    if let Err(e) = state.storage.delete(url).await {
        tracing::warn!(error = %e, url, "Failed to delete stored file");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_me_distinguishes_absent_and_empty() {
        let req: UpdateMeRequest =
            serde_json::from_value(serde_json::json!({ "display_name": "" })).unwrap();
        assert_eq!(req.display_name.as_deref(), Some(""));
        assert!(req.bio.is_none());

        let cleared = req.display_name.map(|v| non_empty(Some(v)));
        assert_eq!(cleared, Some(None));
    }

    #[test]
    fn test_update_me_bio_limit() {
        let req = UpdateMeRequest {
            display_name: None,
            bio: Some("x".repeat(501)),
        };
        assert!(req.validate().is_err());
    }
}
