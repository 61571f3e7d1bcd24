//! `pto db init`: create the database if needed and apply migrations.

use anyhow::Result;
use pto_db::config::DbConfig;
use pto_db::pool;

pub async fn run_init(db_config: &DbConfig) -> Result<()> {
    pool::ensure_database_exists(db_config).await?;

    let pool = pool::create_pool(db_config).await?;
    pool::run_migrations(&pool, pool::default_migrations_path()).await?;

    let counts = pool::table_counts(&pool).await?;
    println!("Database ready at {}", db_config.database_url);
    for (table, count) in counts {
        println!("  {table}: {count} row(s)");
    }

    pool.close().await;
    Ok(())
}
