use anyhow::{Context, Result};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::storage::models::{ConversationTurn, NewReport, ResearchThread, ThreadRow};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                database_url
                    .parse::<sqlx::sqlite::SqliteConnectOptions>()?
                    .create_if_missing(true),
            )
            .await
            .with_context(|| format!("连接数据库失败: {}", database_url))?;

        info!("数据库连接成功: {}", database_url);
        Ok(Self { pool })
    }

    /// 单连接的内存数据库，连接不回收以免数据丢失
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// 关闭连接池，之后的所有查询都会失败
    #[cfg(test)]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS research_threads (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                references_json TEXT NOT NULL DEFAULT '[]',
                timestamp TEXT NOT NULL,
                thread_id TEXT UNIQUE,
                conversation TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_research_threads_email ON research_threads(email, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        info!("数据库表结构初始化完成");
        Ok(())
    }

    /// 保存一次生成结果，返回行的内部 ID
    ///
    /// 以 thread_id 为键原子地插入或更新：已存在的行覆盖 response、references、
    /// timestamp，并在 conversation 末尾追加用户与助手两轮；email 和 prompt 保持不变。
    /// thread_id 为空时总是插入新行。
    pub async fn save_report(&self, report: &NewReport<'_>) -> Result<String> {
        let references_json = serde_json::to_string(report.references)?;
        let user_turn = serde_json::to_string(&report.user_turn)?;
        let assistant_turn = serde_json::to_string(&report.assistant_turn)?;
        let timestamp = chrono::Utc::now().to_rfc3339();

        let id = sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO research_threads
                (id, email, prompt, response, references_json, timestamp, thread_id, conversation)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, json_array(json(?8), json(?9)))
            ON CONFLICT(thread_id) DO UPDATE SET
                response = excluded.response,
                references_json = excluded.references_json,
                timestamp = excluded.timestamp,
                conversation = json_insert(research_threads.conversation, '$[#]', json(?8), '$[#]', json(?9))
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(report.email)
        .bind(report.prompt)
        .bind(report.response)
        .bind(&references_json)
        .bind(&timestamp)
        .bind(report.thread_id)
        .bind(&user_turn)
        .bind(&assistant_turn)
        .fetch_one(&self.pool)
        .await
        .context("保存研究报告失败")?;

        Ok(id)
    }

    /// 只替换 conversation 列，返回是否命中
    pub async fn update_conversation(&self, id: &str, conversation: &[ConversationTurn]) -> Result<bool> {
        let conversation_json = serde_json::to_string(conversation)?;
        let result = sqlx::query("UPDATE research_threads SET conversation = ? WHERE id = ?")
            .bind(&conversation_json)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("更新对话失败")?;

        if result.rows_affected() == 0 {
            warn!("更新对话时未找到记录: {}", id);
        }
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_thread(&self, id: &str) -> Result<Option<ResearchThread>> {
        let row = sqlx::query_as::<_, ThreadRow>("SELECT * FROM research_threads WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ResearchThread::try_from).transpose()
    }

    pub async fn find_by_thread_id(&self, thread_id: &str) -> Result<Option<ResearchThread>> {
        let row =
            sqlx::query_as::<_, ThreadRow>("SELECT * FROM research_threads WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(ResearchThread::try_from).transpose()
    }

    /// 按时间倒序列出会话，可按邮箱过滤
    pub async fn list_threads(&self, email: Option<&str>, limit: i64) -> Result<Vec<ResearchThread>> {
        let rows = sqlx::query_as::<_, ThreadRow>(
            r#"
            SELECT * FROM research_threads
            WHERE (?1 IS NULL OR email = ?1)
            ORDER BY timestamp DESC
            LIMIT ?2
            "#,
        )
        .bind(email)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ResearchThread::try_from).collect()
    }
}
