/// Like toggles for books, chapters, comments and posts
///
/// Liking someone's comment or post gives the author XP; unliking takes
/// it back. Self-likes count but earn nothing.

use super::parse_target;
use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    hooks,
};
use axum::{
    extract::{Path, State},
    Json,
};
use readhub_shared::{
    auth::middleware::{AuthContext, MaybeAuth},
    gamification::XpEvent,
    models::{
        like::{Like, LikeState},
        target,
    },
};

pub async fn like_status(
    State(state): State<AppState>,
    MaybeAuth(auth): MaybeAuth,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<LikeState>> {
    let (kind, id) = parse_target(&kind, &id)?;
    let user = auth.map(|a| a.user_id);
    Ok(Json(Like::status(&state.db, user, kind, id).await?))
}

pub async fn toggle_like(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<LikeState>> {
    let (kind, id) = parse_target(&kind, &id)?;

    if !target::exists(&state.db, kind, id).await? {
        return Err(ApiError::NotFound(format!("{} not found", kind)));
    }

    let like = Like::toggle(&state.db, auth.user_id, kind, id).await?;

    match target::owner(&state.db, kind, id).await {
        Ok(Some(owner)) if owner != auth.user_id => {
            if like.liked {
                hooks::reward(&state, owner, XpEvent::ReceiveLike).await;
            } else {
                hooks::revoke_xp(&state, owner, XpEvent::ReceiveLike).await;
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, kind = %kind, target_id = %id, "Failed to load like target owner"),
    }

    Ok(Json(like))
}
