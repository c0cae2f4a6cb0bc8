/// Onboarding step machine
///
/// New readers walk through a fixed sequence:
///
/// ```text
/// welcome -> pick_genres -> follow_suggestions -> reading_goal -> completed
/// ```
///
/// [`OnboardingState`] holds what the reader entered so far. The machine is
/// pure; `models::onboarding` loads and saves it.
///
/// # Example
///
/// ```
/// use readhub_shared::onboarding::{OnboardingState, OnboardingStep, StepInput};
///
/// let known = vec!["fantasy".to_string(), "mystery".to_string()];
/// let mut state = OnboardingState::default();
///
/// state.advance(&StepInput::default(), &known).unwrap();
/// assert_eq!(state.step, OnboardingStep::PickGenres);
///
/// let genres = StepInput { genres: Some(vec!["fantasy".into()]), ..Default::default() };
/// state.advance(&genres, &known).unwrap();
/// assert_eq!(state.favorite_genres, vec!["fantasy".to_string()]);
/// ```

use crate::domain::GenreSlug;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Most genres a reader may pick
pub const MAX_FAVORITE_GENRES: usize = 5;

/// Weekly reading goal bounds (chapters per week)
pub const MIN_READING_GOAL: i32 = 1;
pub const MAX_READING_GOAL: i32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "onboarding_step", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Welcome,
    PickGenres,
    FollowSuggestions,
    ReadingGoal,
    Completed,
}

impl OnboardingStep {
    pub const ORDER: [OnboardingStep; 5] = [
        OnboardingStep::Welcome,
        OnboardingStep::PickGenres,
        OnboardingStep::FollowSuggestions,
        OnboardingStep::ReadingGoal,
        OnboardingStep::Completed,
    ];

    pub fn index(&self) -> usize {
        match self {
            OnboardingStep::Welcome => 0,
            OnboardingStep::PickGenres => 1,
            OnboardingStep::FollowSuggestions => 2,
            OnboardingStep::ReadingGoal => 3,
            OnboardingStep::Completed => 4,
        }
    }

    pub fn next(&self) -> Option<OnboardingStep> {
        Self::ORDER.get(self.index() + 1).copied()
    }

    pub fn previous(&self) -> Option<OnboardingStep> {
        self.index().checked_sub(1).map(|i| Self::ORDER[i])
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OnboardingStep::Welcome => "welcome",
            OnboardingStep::PickGenres => "pick_genres",
            OnboardingStep::FollowSuggestions => "follow_suggestions",
            OnboardingStep::ReadingGoal => "reading_goal",
            OnboardingStep::Completed => "completed",
        }
    }
}

impl fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OnboardingError {
    #[error("Onboarding is already completed")]
    AlreadyCompleted,

    #[error("Cannot go back from step '{0}'")]
    CannotGoBack(OnboardingStep),

    #[error("Pick at least one genre")]
    MissingGenres,

    #[error("Pick at most 5 genres")]
    TooManyGenres,

    #[error("Unknown genre: {0}")]
    UnknownGenre(String),

    #[error("A reading goal is required")]
    MissingReadingGoal,

    #[error("Reading goal must be between 1 and 100 chapters per week, got {0}")]
    InvalidReadingGoal(i32),
}

/// Input submitted with an `advance` call
///
/// Only the field belonging to the current step is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StepInput {
    pub genres: Option<Vec<String>>,
    pub reading_goal: Option<i32>,
}

/// A reader's position in onboarding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnboardingState {
    pub step: OnboardingStep,
    pub favorite_genres: Vec<String>,
    pub reading_goal: Option<i32>,
    pub skipped: bool,
}

impl Default for OnboardingState {
    fn default() -> Self {
        Self {
            step: OnboardingStep::Welcome,
            favorite_genres: Vec::new(),
            reading_goal: None,
            skipped: false,
        }
    }
}

impl OnboardingState {
    pub fn is_completed(&self) -> bool {
        self.step == OnboardingStep::Completed
    }

    /// Validates `input` for the current step, records it and moves on
    ///
    /// `known_genres` is the set of genre slugs that exist in the catalogue.
    pub fn advance(
        &mut self,
        input: &StepInput,
        known_genres: &[String],
    ) -> Result<OnboardingStep, OnboardingError> {
        match self.step {
            OnboardingStep::Completed => return Err(OnboardingError::AlreadyCompleted),
            OnboardingStep::PickGenres => {
                self.favorite_genres = validate_genres(input.genres.as_deref(), known_genres)?;
            }
            OnboardingStep::ReadingGoal => {
                self.reading_goal = Some(validate_reading_goal(input.reading_goal)?);
            }
            OnboardingStep::Welcome | OnboardingStep::FollowSuggestions => {}
        }

        // Completed is the only step without a successor and was handled above.
        self.step = self.step.next().unwrap_or(OnboardingStep::Completed);
        Ok(self.step)
    }

    /// Abandons onboarding, keeping whatever was entered
    pub fn skip(&mut self) -> Result<OnboardingStep, OnboardingError> {
        if self.is_completed() {
            return Err(OnboardingError::AlreadyCompleted);
        }
        self.step = OnboardingStep::Completed;
        self.skipped = true;
        Ok(self.step)
    }

    /// Returns to the previous step
    pub fn back(&mut self) -> Result<OnboardingStep, OnboardingError> {
        match (self.step, self.step.previous()) {
            (OnboardingStep::Completed, _) | (_, None) => {
                Err(OnboardingError::CannotGoBack(self.step))
            }
            (_, Some(previous)) => {
                self.step = previous;
                Ok(previous)
            }
        }
    }

    /// Fraction of steps done, from 0.0 at `welcome` to 1.0 at `completed`
    pub fn progress(&self) -> f64 {
        let last = OnboardingStep::ORDER.len() - 1;
        self.step.index() as f64 / last as f64
    }
}

fn validate_genres(
    genres: Option<&[String]>,
    known_genres: &[String],
) -> Result<Vec<String>, OnboardingError> {
    let genres = genres.unwrap_or_default();

    let mut picked: Vec<String> = Vec::with_capacity(genres.len());
    for raw in genres {
        let slug = GenreSlug::parse(&raw.to_lowercase())
            .map_err(|_| OnboardingError::UnknownGenre(raw.clone()))?;
        if !known_genres.iter().any(|known| known == slug.as_str()) {
            return Err(OnboardingError::UnknownGenre(raw.clone()));
        }
        let slug = String::from(slug);
        if !picked.contains(&slug) {
            picked.push(slug);
        }
    }

    if picked.is_empty() {
        return Err(OnboardingError::MissingGenres);
    }
    if picked.len() > MAX_FAVORITE_GENRES {
        return Err(OnboardingError::TooManyGenres);
    }
    Ok(picked)
}

fn validate_reading_goal(goal: Option<i32>) -> Result<i32, OnboardingError> {
    let goal = goal.ok_or(OnboardingError::MissingReadingGoal)?;
    if (MIN_READING_GOAL..=MAX_READING_GOAL).contains(&goal) {
        Ok(goal)
    } else {
        Err(OnboardingError::InvalidReadingGoal(goal))
    }
}
