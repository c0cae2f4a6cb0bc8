/// Onboarding step machine endpoints
///
/// ```text
/// welcome -> pick_genres -> reading_goal -> follow_suggestions -> completed
/// ```
///
/// Each call loads the reader's row, applies one transition and saves it.

use crate::{app::AppState, error::ApiResult};
use axum::{extract::State, Json};
use readhub_shared::{
    auth::middleware::AuthContext,
    domain::UserId,
    models::{genre::Genre, onboarding::Onboarding, user::User},
    onboarding::{OnboardingStep, StepInput},
};
use serde::Serialize;

const SUGGESTION_COUNT: i64 = 5;

#[derive(Debug, Serialize)]
pub struct Suggestion {
    pub id: UserId,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<User> for Suggestion {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OnboardingView {
    #[serde(flatten)]
    pub onboarding: Onboarding,

    /// 0.0 at welcome, 1.0 when completed
    pub progress: f64,

    /// Readers to follow, filled at the follow step
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Suggestion>,
}

async fn view(state: &AppState, onboarding: Onboarding) -> ApiResult<Json<OnboardingView>> {
    let suggestions = if onboarding.step == OnboardingStep::FollowSuggestions {
        User::suggestions(&state.db, onboarding.user_id, SUGGESTION_COUNT)
            .await?
            .into_iter()
            .map(Suggestion::from)
            .collect()
    } else {
        Vec::new()
    };

    Ok(Json(OnboardingView {
        progress: onboarding.state().progress(),
        onboarding,
        suggestions,
    }))
}

pub async fn get_state(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<OnboardingView>> {
    let onboarding = Onboarding::get_or_create(&state.db, auth.user_id).await?;
    view(&state, onboarding).await
}

/// Submit the current step's input and move on
///
/// ```text
/// POST /v1/onboarding/advance
///
/// { "genres": ["fantasy", "sci-fi"] }
/// ```
pub async fn advance(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(input): Json<StepInput>,
) -> ApiResult<Json<OnboardingView>> {
    let mut machine = Onboarding::get_or_create(&state.db, auth.user_id)
        .await?
        .state();

    let known_genres = Genre::slugs(&state.db).await?;
    let step = machine.advance(&input, &known_genres)?;

    let onboarding = Onboarding::save(&state.db, auth.user_id, &machine).await?;
    tracing::debug!(user_id = %auth.user_id, step = %step, "Onboarding advanced");
    view(&state, onboarding).await
}

pub async fn back(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<OnboardingView>> {
    let mut machine = Onboarding::get_or_create(&state.db, auth.user_id)
        .await?
        .state();
    machine.back()?;

    let onboarding = Onboarding::save(&state.db, auth.user_id, &machine).await?;
    view(&state, onboarding).await
}

pub async fn skip(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<OnboardingView>> {
    let mut machine = Onboarding::get_or_create(&state.db, auth.user_id)
        .await?
        .state();
    machine.skip()?;

    let onboarding = Onboarding::save(&state.db, auth.user_id, &machine).await?;
    tracing::info!(user_id = %auth.user_id, "Onboarding skipped");
    view(&state, onboarding).await
}
