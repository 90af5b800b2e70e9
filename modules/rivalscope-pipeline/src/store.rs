// Postgres-backed store.
//
// Plain runtime queries, no compile-time macros, so the crate builds
// without a live database. Schema setup is idempotent and runs at startup.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use rivalscope_common::types::{
    AnalysisCard, Competitor, OrgProfile, Run, RunStatus, Source, SourceHealth, SourceKind,
    StoredItem, TimelineState,
};

use crate::traits::Store;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Idempotent schema setup, run once at startup.
    pub async fn migrate(&self) -> Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                url TEXT,
                selector_hint TEXT,
                competitor_id UUID,
                enabled BOOLEAN NOT NULL DEFAULT TRUE,
                last_attempt_at TIMESTAMPTZ,
                last_success_at TIMESTAMPTZ,
                consecutive_errors INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                handle TEXT,
                user_id TEXT,
                last_seen_id TEXT,
                backfill_completed BOOLEAN NOT NULL DEFAULT FALSE,
                backfill_days BIGINT NOT NULL DEFAULT 30,
                include_retweets BOOLEAN NOT NULL DEFAULT FALSE,
                include_replies BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id UUID PRIMARY KEY,
                source_id UUID NOT NULL REFERENCES sources(id),
                external_id TEXT NOT NULL,
                title TEXT,
                url TEXT NOT NULL,
                author TEXT,
                published_at TIMESTAMPTZ NOT NULL,
                content TEXT NOT NULL,
                metadata JSONB,
                processed BOOLEAN NOT NULL DEFAULT FALSE,
                relevant BOOLEAN,
                irrelevance_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                UNIQUE (source_id, external_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS competitors (
                id UUID PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                key_products TEXT NOT NULL DEFAULT '',
                target_customers TEXT NOT NULL DEFAULT '',
                known_strengths TEXT NOT NULL DEFAULT '',
                known_weaknesses TEXT NOT NULL DEFAULT '',
                overlap TEXT NOT NULL DEFAULT '',
                pricing TEXT NOT NULL DEFAULT '',
                active BOOLEAN NOT NULL DEFAULT TRUE,
                suggested BOOLEAN NOT NULL DEFAULT FALSE,
                suggested_reason TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS analysis_cards (
                id UUID PRIMARY KEY,
                item_id UUID REFERENCES items(id),
                run_id UUID,
                event_type TEXT NOT NULL,
                priority TEXT NOT NULL,
                title TEXT NOT NULL,
                summary TEXT NOT NULL DEFAULT '',
                impact_assessment TEXT NOT NULL DEFAULT '',
                suggested_counter_moves TEXT NOT NULL DEFAULT '',
                raw_llm_output JSONB,
                status TEXT NOT NULL DEFAULT 'draft',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS analysis_card_competitors (
                card_id UUID NOT NULL REFERENCES analysis_cards(id),
                competitor_id UUID NOT NULL REFERENCES competitors(id),
                PRIMARY KEY (card_id, competitor_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS org_profile (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                company_description TEXT NOT NULL DEFAULT '',
                key_differentiators TEXT NOT NULL DEFAULT '',
                target_customer_segments TEXT NOT NULL DEFAULT '',
                product_capabilities TEXT NOT NULL DEFAULT '',
                strategic_priorities TEXT NOT NULL DEFAULT '',
                pricing TEXT NOT NULL DEFAULT ''
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id UUID PRIMARY KEY,
                scheduled_at TIMESTAMPTZ NOT NULL,
                started_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ,
                status TEXT NOT NULL,
                sources_checked INTEGER NOT NULL DEFAULT 0,
                new_items INTEGER NOT NULL DEFAULT 0,
                cards_generated INTEGER NOT NULL DEFAULT 0,
                error_log TEXT
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema up to date");
        Ok(())
    }
}

const SOURCE_COLUMNS: &str = "id, name, kind, url, selector_hint, competitor_id, enabled, \
     last_attempt_at, last_success_at, consecutive_errors, last_error, \
     handle, user_id, last_seen_id, backfill_completed, backfill_days, \
     include_retweets, include_replies, created_at";

fn row_to_source(row: &PgRow) -> Result<Source> {
    let kind_str: String = row.try_get("kind")?;
    let kind = SourceKind::parse(&kind_str)
        .ok_or_else(|| anyhow::anyhow!("unknown source kind: {kind_str}"))?;

    let handle: Option<String> = row.try_get("handle")?;
    let timeline = match (kind, handle) {
        (SourceKind::Timeline, Some(handle)) => Some(TimelineState {
            handle,
            user_id: row.try_get("user_id")?,
            last_seen_id: row.try_get("last_seen_id")?,
            backfill_completed: row.try_get("backfill_completed")?,
            backfill_days: row.try_get("backfill_days")?,
            include_retweets: row.try_get("include_retweets")?,
            include_replies: row.try_get("include_replies")?,
        }),
        _ => None,
    };

    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind,
        url: row.try_get("url")?,
        selector_hint: row.try_get("selector_hint")?,
        competitor_id: row.try_get("competitor_id")?,
        enabled: row.try_get("enabled")?,
        health: SourceHealth {
            last_attempt_at: row.try_get("last_attempt_at")?,
            last_success_at: row.try_get("last_success_at")?,
            consecutive_errors: row.try_get("consecutive_errors")?,
            last_error: row.try_get("last_error")?,
        },
        timeline,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_item(row: &PgRow) -> Result<StoredItem> {
    Ok(StoredItem {
        id: row.try_get("id")?,
        source_id: row.try_get("source_id")?,
        external_id: row.try_get("external_id")?,
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        author: row.try_get("author")?,
        published_at: row.try_get("published_at")?,
        content: row.try_get("content")?,
        metadata: row.try_get("metadata")?,
        processed: row.try_get("processed")?,
        relevant: row.try_get("relevant")?,
        irrelevance_reason: row.try_get("irrelevance_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_competitor(row: &PgRow) -> Result<Competitor> {
    Ok(Competitor {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        key_products: row.try_get("key_products")?,
        target_customers: row.try_get("target_customers")?,
        known_strengths: row.try_get("known_strengths")?,
        known_weaknesses: row.try_get("known_weaknesses")?,
        overlap: row.try_get("overlap")?,
        pricing: row.try_get("pricing")?,
        active: row.try_get("active")?,
        suggested: row.try_get("suggested")?,
        suggested_reason: row.try_get("suggested_reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_run(row: &PgRow) -> Result<Run> {
    let status_str: String = row.try_get("status")?;
    let status = match status_str.as_str() {
        "running" => RunStatus::Running,
        "completed" => RunStatus::Completed,
        "failed" => RunStatus::Failed,
        other => anyhow::bail!("unknown run status: {other}"),
    };
    Ok(Run {
        id: row.try_get("id")?,
        scheduled_at: row.try_get("scheduled_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        status,
        sources_checked: row.try_get("sources_checked")?,
        new_items: row.try_get("new_items")?,
        cards_generated: row.try_get("cards_generated")?,
        error_log: row.try_get("error_log")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE enabled = TRUE ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_source).collect()
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let row = sqlx::query(&format!(
            "SELECT {SOURCE_COLUMNS} FROM sources WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_source).transpose()
    }

    async fn upsert_source(&self, source: &Source) -> Result<()> {
        let timeline = source.timeline.as_ref();
        sqlx::query(
            r#"
            INSERT INTO sources (
                id, name, kind, url, selector_hint, competitor_id, enabled,
                last_attempt_at, last_success_at, consecutive_errors, last_error,
                handle, user_id, last_seen_id, backfill_completed, backfill_days,
                include_retweets, include_replies, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                url = EXCLUDED.url,
                selector_hint = EXCLUDED.selector_hint,
                competitor_id = EXCLUDED.competitor_id,
                enabled = EXCLUDED.enabled,
                last_attempt_at = EXCLUDED.last_attempt_at,
                last_success_at = EXCLUDED.last_success_at,
                consecutive_errors = EXCLUDED.consecutive_errors,
                last_error = EXCLUDED.last_error,
                handle = EXCLUDED.handle,
                user_id = EXCLUDED.user_id,
                last_seen_id = EXCLUDED.last_seen_id,
                backfill_completed = EXCLUDED.backfill_completed,
                backfill_days = EXCLUDED.backfill_days,
                include_retweets = EXCLUDED.include_retweets,
                include_replies = EXCLUDED.include_replies
            "#,
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(source.kind.as_str())
        .bind(&source.url)
        .bind(&source.selector_hint)
        .bind(source.competitor_id)
        .bind(source.enabled)
        .bind(source.health.last_attempt_at)
        .bind(source.health.last_success_at)
        .bind(source.health.consecutive_errors)
        .bind(&source.health.last_error)
        .bind(timeline.map(|t| t.handle.clone()))
        .bind(timeline.and_then(|t| t.user_id.clone()))
        .bind(timeline.and_then(|t| t.last_seen_id.clone()))
        .bind(timeline.map(|t| t.backfill_completed).unwrap_or(false))
        .bind(timeline.map(|t| t.backfill_days).unwrap_or(30))
        .bind(timeline.map(|t| t.include_retweets).unwrap_or(false))
        .bind(timeline.map(|t| t.include_replies).unwrap_or(false))
        .bind(source.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn item_exists(&self, source_id: Uuid, external_id: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM items WHERE source_id = $1 AND external_id = $2 LIMIT 1",
        )
        .bind(source_id)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn insert_item(&self, item: &StoredItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (
                id, source_id, external_id, title, url, author, published_at,
                content, metadata, processed, relevant, irrelevance_reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (source_id, external_id) DO NOTHING
            "#,
        )
        .bind(item.id)
        .bind(item.source_id)
        .bind(&item.external_id)
        .bind(&item.title)
        .bind(&item.url)
        .bind(&item.author)
        .bind(item.published_at)
        .bind(&item.content)
        .bind(&item.metadata)
        .bind(item.processed)
        .bind(item.relevant)
        .bind(&item.irrelevance_reason)
        .bind(item.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn unprocessed_items(&self) -> Result<Vec<StoredItem>> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE processed = FALSE ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_item).collect()
    }

    async fn mark_item_processed(
        &self,
        item_id: Uuid,
        relevant: bool,
        irrelevance_reason: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE items
            SET processed = TRUE, relevant = $2, irrelevance_reason = $3
            WHERE id = $1 AND processed = FALSE
            "#,
        )
        .bind(item_id)
        .bind(relevant)
        .bind(irrelevance_reason)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn org_profile(&self) -> Result<Option<OrgProfile>> {
        let row = sqlx::query("SELECT * FROM org_profile WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(OrgProfile {
                company_description: row.try_get("company_description")?,
                key_differentiators: row.try_get("key_differentiators")?,
                target_customer_segments: row.try_get("target_customer_segments")?,
                product_capabilities: row.try_get("product_capabilities")?,
                strategic_priorities: row.try_get("strategic_priorities")?,
                pricing: row.try_get("pricing")?,
            })
        })
        .transpose()
    }

    async fn active_competitors(&self) -> Result<Vec<Competitor>> {
        let rows = sqlx::query("SELECT * FROM competitors WHERE active = TRUE ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_competitor).collect()
    }

    async fn find_competitor_by_name(&self, name: &str) -> Result<Option<Competitor>> {
        let row = sqlx::query("SELECT * FROM competitors WHERE lower(name) = lower($1) LIMIT 1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_competitor).transpose()
    }

    async fn insert_competitor(&self, competitor: &Competitor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO competitors (
                id, name, description, key_products, target_customers,
                known_strengths, known_weaknesses, overlap, pricing,
                active, suggested, suggested_reason, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(competitor.id)
        .bind(&competitor.name)
        .bind(&competitor.description)
        .bind(&competitor.key_products)
        .bind(&competitor.target_customers)
        .bind(&competitor.known_strengths)
        .bind(&competitor.known_weaknesses)
        .bind(&competitor.overlap)
        .bind(&competitor.pricing)
        .bind(competitor.active)
        .bind(competitor.suggested)
        .bind(&competitor.suggested_reason)
        .bind(competitor.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_card(&self, card: &AnalysisCard) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_cards (
                id, item_id, run_id, event_type, priority, title, summary,
                impact_assessment, suggested_counter_moves, raw_llm_output,
                status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(card.id)
        .bind(card.item_id)
        .bind(card.run_id)
        .bind(card.event_type.as_str())
        .bind(card.priority.as_str())
        .bind(&card.title)
        .bind(&card.summary)
        .bind(&card.impact_assessment)
        .bind(&card.suggested_counter_moves)
        .bind(&card.raw_llm_output)
        .bind(card.status.as_str())
        .bind(card.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn link_card_competitor(&self, card_id: Uuid, competitor_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO analysis_card_competitors (card_id, competitor_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(card_id)
        .bind(competitor_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_run(&self, run: &Run) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO runs (
                id, scheduled_at, started_at, completed_at, status,
                sources_checked, new_items, cards_generated, error_log
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(run.id)
        .bind(run.scheduled_at)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.status.as_str())
        .bind(run.sources_checked)
        .bind(run.new_items)
        .bind(run.cards_generated)
        .bind(&run.error_log)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE runs
            SET completed_at = $2, status = $3, sources_checked = $4,
                new_items = $5, cards_generated = $6, error_log = $7
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(run.completed_at)
        .bind(run.status.as_str())
        .bind(run.sources_checked)
        .bind(run.new_items)
        .bind(run.cards_generated)
        .bind(&run.error_log)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_runs(&self, limit: i64) -> Result<Vec<Run>> {
        let rows = sqlx::query("SELECT * FROM runs ORDER BY started_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_run).collect()
    }
}
