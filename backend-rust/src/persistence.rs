//! Match outcome and command-tally persistence (SPEC_FULL.md §8), grounded
//! on the original sqlite3 schema in `battle/persistence.py`, ported to
//! `sqlx` against an embedded SQLite database file.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

#[derive(Clone)]
pub struct ResultSink {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub winner: String,
    pub wins: i64,
}

impl ResultSink {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            "create table if not exists match (
                match_id integer primary key autoincrement,
                arena_id integer not null,
                end_time datetime not null,
                winner text not null
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "create table if not exists match_stat (
                stat_id integer primary key autoincrement,
                match_id integer not null references match(match_id),
                robot_name text not null,
                command text not null,
                total integer not null
            )",
        )
        .execute(&pool)
        .await?;

        info!("result sink ready");
        Ok(Self { pool })
    }

    /// Records a finished match's outcome, returning the new row's id.
    pub async fn record_match_outcome(
        &self,
        arena_id: u32,
        end_time: DateTime<Utc>,
        winner: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("insert into match (arena_id, end_time, winner) values (?, ?, ?)")
            .bind(arena_id)
            .bind(end_time)
            .bind(winner)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Records how many times a robot issued a given command type over the
    /// course of a match.
    pub async fn record_command_tally(
        &self,
        match_id: i64,
        robot_name: &str,
        command: &str,
        total: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("insert into match_stat (match_id, robot_name, command, total) values (?, ?, ?, ?)")
            .bind(match_id)
            .bind(robot_name)
            .bind(command)
            .bind(total)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn leaderboard(&self, arena_id: u32) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        sqlx::query_as::<_, LeaderboardEntry>(
            "select winner, count(*) as wins from match where arena_id = ? group by winner order by wins desc limit 10",
        )
        .bind(arena_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_and_reads_back_a_leaderboard() {
        let sink = ResultSink::connect("sqlite::memory:").await.unwrap();
        sink.record_match_outcome(0, Utc::now(), "bolt").await.unwrap();
        sink.record_match_outcome(0, Utc::now(), "bolt").await.unwrap();
        sink.record_match_outcome(0, Utc::now(), "radarbot").await.unwrap();
        let board = sink.leaderboard(0).await.unwrap();
        assert_eq!(board[0].winner, "bolt");
        assert_eq!(board[0].wins, 2);
    }
}
