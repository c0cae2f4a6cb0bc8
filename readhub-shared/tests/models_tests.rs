/// Integration tests for the model queries
///
/// Require a running PostgreSQL database; ignored by default.

mod common;

use common::{create_book, create_user, setup};
use readhub_shared::domain::TargetKind;
use readhub_shared::models::chapter::{Chapter, CreateChapter};
use readhub_shared::models::comment::{Comment, CommentError, CreateComment};
use readhub_shared::models::follow::{Follow, FollowError};
use readhub_shared::models::job::{EmbedPayload, Job, JobKind, JobState};
use readhub_shared::models::like::Like;
use readhub_shared::models::onboarding::Onboarding;
use readhub_shared::models::reading::{ProgressUpdate, Reading, ReadingError, ReadingStatus};
use readhub_shared::onboarding::{OnboardingState, OnboardingStep};
use readhub_shared::pagination::{Cursor, PageRequest};

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_follow_toggle() {
    let pool = setup().await;
    let alice = create_user(&pool).await;
    let bob = create_user(&pool).await;

    let state = Follow::toggle(&pool, alice.id, bob.id).await.unwrap();
    assert!(state.following);
    assert_eq!(state.followers, 1);
    assert!(Follow::is_following(&pool, alice.id, bob.id).await.unwrap());

    let page = Follow::followers(&pool, bob.id, &PageRequest::first(10)).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].user_id, alice.id);

    let state = Follow::toggle(&pool, alice.id, bob.id).await.unwrap();
    assert!(!state.following);
    assert_eq!(state.followers, 0);

    assert!(matches!(
        Follow::toggle(&pool, alice.id, alice.id).await,
        Err(FollowError::SelfFollow)
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_like_toggle_and_status() {
    let pool = setup().await;
    let user = create_user(&pool).await;
    let other = create_user(&pool).await;
    let book = create_book(&pool).await;
    let target = book.id.as_uuid();

    let state = Like::toggle(&pool, user.id, TargetKind::Book, target).await.unwrap();
    assert!(state.liked);
    assert_eq!(state.count, 1);

    let seen_by_other = Like::status(&pool, Some(other.id), TargetKind::Book, target)
        .await
        .unwrap();
    assert!(!seen_by_other.liked);
    assert_eq!(seen_by_other.count, 1);

    let anonymous = Like::status(&pool, None, TargetKind::Book, target).await.unwrap();
    assert!(!anonymous.liked);

    let state = Like::toggle(&pool, user.id, TargetKind::Book, target).await.unwrap();
    assert!(!state.liked);
    assert_eq!(state.count, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_comment_threads_and_paging() {
    let pool = setup().await;
    let user = create_user(&pool).await;
    let book = create_book(&pool).await;

    let mut ids = Vec::new();
    for i in 0..3 {
        let comment = Comment::create(
            &pool,
            CreateComment {
                user_id: user.id,
                target_kind: TargetKind::Book,
                target_id: book.id.as_uuid(),
                parent_id: None,
                body: format!("  comment {}  ", i),
            },
        )
        .await
        .unwrap();
        assert_eq!(comment.body, format!("comment {}", i));
        ids.push(comment.id);
    }

    let first = Comment::list_for_target(&pool, TargetKind::Book, book.id.as_uuid(), &PageRequest::first(2))
        .await
        .unwrap();
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].id, ids[2]);
    let cursor = first.next_cursor.clone().expect("second page expected");

    let second = Comment::list_for_target(
        &pool,
        TargetKind::Book,
        book.id.as_uuid(),
        &PageRequest::new(Some(2), Some(Cursor::decode(&cursor).unwrap())),
    )
    .await
    .unwrap();
    assert_eq!(second.items.len(), 1);
    assert_eq!(second.items[0].id, ids[0]);
    assert!(second.next_cursor.is_none());

    let reply = Comment::create(
        &pool,
        CreateComment {
            user_id: user.id,
            target_kind: TargetKind::Book,
            target_id: book.id.as_uuid(),
            parent_id: Some(ids[0]),
            body: "a reply".into(),
        },
    )
    .await
    .unwrap();

    let nested = Comment::create(
        &pool,
        CreateComment {
            user_id: user.id,
            target_kind: TargetKind::Book,
            target_id: book.id.as_uuid(),
            parent_id: Some(reply.id),
            body: "too deep".into(),
        },
    )
    .await;
    assert!(matches!(nested, Err(CommentError::NestedReply)));

    assert!(Comment::soft_delete(&pool, ids[0]).await.unwrap());
    let deleted = Comment::find(&pool, ids[0]).await.unwrap().unwrap();
    assert!(deleted.deleted);
    assert_eq!(deleted.reply_count, 1);
    assert!(matches!(
        Comment::update(&pool, ids[0], "edit").await,
        Err(CommentError::Deleted)
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_reading_progress_and_list() {
    let pool = setup().await;
    let user = create_user(&pool).await;
    let book = create_book(&pool).await;
    let chapter = Chapter::create(
        &pool,
        CreateChapter {
            book_id: book.id,
            number: None,
            title: "Opening".into(),
            content: "It was a dark and stormy night".into(),
            source_url: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(chapter.number, 1);

    let progress = Reading::upsert_progress(
        &pool,
        user.id,
        ProgressUpdate {
            book_id: book.id,
            chapter_id: Some(chapter.id),
            percent: 140,
        },
    )
    .await
    .unwrap();
    assert_eq!(progress.percent, 100);
    assert_eq!(progress.chapter_number, 1);

    let shelf = Reading::list(&pool, user.id, Some(ReadingStatus::Reading), &PageRequest::first(10))
        .await
        .unwrap();
    assert_eq!(shelf.items.len(), 1);

    let change = Reading::set_list_status(&pool, user.id, book.id, ReadingStatus::Completed)
        .await
        .unwrap();
    assert_eq!(change.entry.status, ReadingStatus::Completed);
    assert_eq!(change.previous, Some(ReadingStatus::Reading));
    assert!(change.first_finish);

    assert!(Reading::record_chapter_read(&pool, user.id, chapter.id, book.id).await.unwrap());
    assert!(!Reading::record_chapter_read(&pool, user.id, chapter.id, book.id).await.unwrap());

    let other_book = create_book(&pool).await;
    let mismatch = Reading::upsert_progress(
        &pool,
        user.id,
        ProgressUpdate {
            book_id: other_book.id,
            chapter_id: Some(chapter.id),
            percent: 10,
        },
    )
    .await;
    assert!(matches!(mismatch, Err(ReadingError::ChapterNotInBook)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_onboarding_roundtrip() {
    let pool = setup().await;
    let user = create_user(&pool).await;

    let row = Onboarding::get_or_create(&pool, user.id).await.unwrap();
    assert_eq!(row.step, OnboardingStep::Welcome);
    assert!(row.completed_at.is_none());

    let mut state = OnboardingState::default();
    state.skip().unwrap();
    let saved = Onboarding::save(&pool, user.id, &state).await.unwrap();
    assert_eq!(saved.step, OnboardingStep::Completed);
    assert!(saved.skipped);
    assert!(saved.completed_at.is_some());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_finishing_a_book_counts_once() {
    let pool = setup().await;
    let user = create_user(&pool).await;
    let book = create_book(&pool).await;

    let sequence = [
        ReadingStatus::Completed,
        ReadingStatus::Reading,
        ReadingStatus::Completed,
        ReadingStatus::Reading,
        ReadingStatus::Completed,
    ];
    let mut first_finishes = Vec::new();
    for status in sequence {
        let change = Reading::set_list_status(&pool, user.id, book.id, status).await.unwrap();
        first_finishes.push(change.first_finish);
    }
    assert_eq!(first_finishes, vec![true, false, false, false, false]);

    // Leaving the shelf entirely does not reset it either.
    assert!(Reading::remove_from_list(&pool, user.id, book.id).await.unwrap());
    let change = Reading::set_list_status(&pool, user.id, book.id, ReadingStatus::Completed)
        .await
        .unwrap();
    assert_eq!(change.previous, None);
    assert!(!change.first_finish);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_job_claim_and_retry() {
    let pool = setup().await;
    let book = create_book(&pool).await;

    let job = Job::enqueue(&pool, JobKind::Embed, &EmbedPayload { book_id: book.id })
        .await
        .unwrap();
    assert_eq!(job.state, JobState::Pending);

    let claimed = Job::claim_batch(&pool, 100).await.unwrap();
    let ours = claimed.iter().find(|j| j.id == job.id).expect("job should be claimed");
    assert_eq!(ours.state, JobState::Running);
    assert_eq!(ours.attempts, 1);

    let state = Job::mark_failed(&pool, ours, "boom", true).await.unwrap();
    assert_eq!(state, Some(JobState::Pending));

    // Backoff keeps it out of the next claim
    let again = Job::claim_batch(&pool, 100).await.unwrap();
    assert!(again.iter().all(|j| j.id != job.id));

    make_runnable(&pool, &job).await;
    let claimed = Job::claim_batch(&pool, 100).await.unwrap();
    let second = claimed.iter().find(|j| j.id == job.id).expect("job should be claimed again");
    assert_eq!(second.attempts, 2);

    let state = Job::mark_failed(&pool, second, "fatal", false).await.unwrap();
    assert_eq!(state, Some(JobState::Failed));
    let reloaded = Job::find(&pool, job.id).await.unwrap().unwrap();
    assert!(reloaded.is_terminal());
    assert_eq!(reloaded.error.as_deref(), Some("fatal"));
}

async fn make_runnable(pool: &sqlx::PgPool, job: &Job) {
    sqlx::query("UPDATE jobs SET run_after = NOW() - INTERVAL '1 second' WHERE id = $1")
        .bind(job.id)
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_outdated_run_cannot_overwrite_new_claim() {
    let pool = setup().await;
    let book = create_book(&pool).await;

    let job = Job::enqueue(&pool, JobKind::Embed, &EmbedPayload { book_id: book.id })
        .await
        .unwrap();
    let claimed = Job::claim_batch(&pool, 100).await.unwrap();
    let first = claimed.into_iter().find(|j| j.id == job.id).expect("job should be claimed");

    // The first worker hangs past the stale timeout.
    sqlx::query("UPDATE jobs SET started_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(job.id)
        .execute(&pool)
        .await
        .unwrap();
    assert!(Job::recover_stale(&pool, 60).await.unwrap() >= 1);

    let claimed = Job::claim_batch(&pool, 100).await.unwrap();
    let second = claimed.into_iter().find(|j| j.id == job.id).expect("job should be reclaimed");
    assert_eq!(second.attempts, 2);

    assert_eq!(Job::mark_failed(&pool, &first, "late failure", false).await.unwrap(), None);
    assert!(!Job::mark_succeeded(&pool, &first).await.unwrap());
    let current = Job::find(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(current.state, JobState::Running);

    assert!(Job::mark_succeeded(&pool, &second).await.unwrap());
    let done = Job::find(&pool, job.id).await.unwrap().unwrap();
    assert_eq!(done.state, JobState::Succeeded);
}
