/// Integration tests for database migrations
///
/// Require a running PostgreSQL database; ignored by default.

mod common;

use common::{setup, test_database_url};
use readhub_shared::db::migrations::{ensure_database_exists, get_migration_status, run_migrations};

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_ensure_database_exists() {
    let result = ensure_database_exists(&test_database_url()).await;
    assert!(result.is_ok(), "Failed to ensure database exists: {:?}", result.err());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_migrations_are_idempotent() {
    let pool = setup().await;

    run_migrations(&pool).await.expect("Second run should be a no-op");

    let status = get_migration_status(&pool).await.expect("status");
    assert!(status.is_up_to_date);
    assert_eq!(status.applied_migrations, status.known_migrations);
    assert!(status.latest_version.is_some());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_migration_creates_all_tables() {
    let pool = setup().await;

    let expected_tables = [
        "users",
        "genres",
        "books",
        "book_genres",
        "chapters",
        "comments",
        "likes",
        "follows",
        "posts",
        "reading_progress",
        "chapter_reads",
        "reading_list",
        "onboarding",
        "user_achievements",
        "jobs",
        "text_to_speech",
        "book_embeddings",
        "finished_books",
    ];

    for table_name in expected_tables {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )",
        )
        .bind(table_name)
        .fetch_one(&pool)
        .await
        .unwrap_or_else(|e| panic!("Failed to check for table {}: {}", table_name, e));

        assert!(exists, "Table '{}' should exist after migrations", table_name);
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_migration_creates_enums() {
    let pool = setup().await;

    let expected_enums = [
        "user_role",
        "book_status",
        "target_kind",
        "reading_status",
        "onboarding_step",
        "job_kind",
        "job_state",
        "tts_status",
    ];

    for enum_name in expected_enums {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT FROM pg_type WHERE typname = $1)")
            .bind(enum_name)
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("Failed to check for enum {}: {}", enum_name, e));

        assert!(exists, "Enum '{}' should exist after migrations", enum_name);
    }
}
