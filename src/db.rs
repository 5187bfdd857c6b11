use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::config::Config;

pub type Db = Pool<Postgres>;

pub async fn connect(url: &str, cfg: &Config) -> Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .acquire_timeout(cfg.store_timeout)
        .connect(url)
        .await?;
    // crate-relative path for sqlx migrations
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
