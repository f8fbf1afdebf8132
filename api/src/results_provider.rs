use async_trait::async_trait;
use socra_core::error::TutorError;
use socra_core::results::{DiagnosticRow, SessionResultProvider};
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct EnrichedItemRow {
    seq_in_session: i32,
    item_id: String,
    concept_name: String,
    is_correct: bool,
    tag_accuracy: f64,
    global_accuracy: f64,
    personal_vs_global_delta: f64,
}

impl From<EnrichedItemRow> for DiagnosticRow {
    fn from(row: EnrichedItemRow) -> Self {
        DiagnosticRow {
            seq: row.seq_in_session,
            item_id: row.item_id,
            concept: row.concept_name,
            is_correct: row.is_correct,
            personal_accuracy: row.tag_accuracy,
            global_accuracy: row.global_accuracy,
            delta: row.personal_vs_global_delta,
        }
    }
}

fn unavailable(err: sqlx::Error) -> TutorError {
    tracing::error!(error = ?err, "Diagnostic results query failed");
    TutorError::ResultsUnavailable(err.to_string())
}

/// Reads diagnostic results from the `vw_personal_item_enriched` view.
#[derive(Clone)]
pub struct PgSessionResultProvider {
    pool: PgPool,
}

impl PgSessionResultProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionResultProvider for PgSessionResultProvider {
    async fn get_results(
        &self,
        learner_id: &str,
        session_id: &str,
    ) -> Result<Vec<DiagnosticRow>, TutorError> {
        let rows = sqlx::query_as::<_, EnrichedItemRow>(
            r#"
            SELECT seq_in_session, item_id, concept_name, is_correct,
                   tag_accuracy, global_accuracy, personal_vs_global_delta
            FROM vw_personal_item_enriched
            WHERE learner_id = $1 AND session_id = $2
            ORDER BY seq_in_session
            "#,
        )
        .bind(learner_id)
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(rows.into_iter().map(DiagnosticRow::from).collect())
    }

    async fn get_item_id(
        &self,
        learner_id: &str,
        session_id: &str,
        seq: i32,
    ) -> Result<Option<String>, TutorError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT item_id
            FROM vw_personal_item_enriched
            WHERE learner_id = $1 AND session_id = $2 AND seq_in_session = $3
            "#,
        )
        .bind(learner_id)
        .bind(session_id)
        .bind(seq)
        .fetch_optional(&self.pool)
        .await
        .map_err(unavailable)
    }
}
