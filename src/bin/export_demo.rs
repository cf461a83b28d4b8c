use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use stream_export::export::fetcher::SqliteChunkFetcher;
use stream_export::ExportService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Streaming CSV Export Demo");
    println!("=========================");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    seed_signups(&pool).await?;

    let service = ExportService::new().register_csv(json!({
        "fields": [
            "email",
            {"field": "source", "label": "Signup Source"},
            {"field": "confirmed", "label": "Confirmed", "decorator": "yes_no"}
        ],
        "limit": 100,
        "find_options": {"order": ["id ASC"]}
    }));

    let fetcher = SqliteChunkFetcher::new(pool, "email_signups");
    let path = std::env::temp_dir().join("email_signups_export.csv");
    let file = tokio::fs::File::create(&path).await?;

    let run = service
        .export("csv", "EmailSignup", &fetcher, None, file)
        .await?;

    println!("Wrote {}", path.display());
    println!();
    println!("Response headers:");
    for (name, value) in run.headers.pairs() {
        println!("  {}: {}", name, value);
    }
    println!();
    println!(
        "{} rows over {} pages ({} bytes) in {} ms",
        run.completion.stats.rows_written,
        run.completion.stats.pages_rendered,
        run.completion.stats.bytes_written,
        run.completion.stats.duration_ms
    );

    Ok(())
}

async fn seed_signups(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE email_signups (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL,
            source TEXT NOT NULL,
            confirmed INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    for i in 1..=250 {
        sqlx::query("INSERT INTO email_signups (email, source, confirmed) VALUES (?, ?, ?)")
            .bind(format!("user{}@example.com", i))
            .bind(if i % 3 == 0 { "newsletter" } else { "web" })
            .bind(i % 2)
            .execute(pool)
            .await?;
    }

    Ok(())
}
