//! Aggregation Engine
//!
//! Reporting pipelines composed from up to four discovered shapes
//! (patients, sessions, runs, comments). Reports are always scoped to
//! the calling clinician's own activity. Each metric degrades
//! independently: a metric is computed only when every column it needs
//! resolved AND its date column is really a date/timestamp; otherwise
//! it contributes a zero or empty default instead of failing the
//! report.
//!
//! Day windows are clamped and interpolated as integers into the
//! INTERVAL literal; all other values are bind parameters.

use crate::error::ApiResult;
use crate::query::ParamBuffer;
use crate::schema::{field, PgCatalog, SchemaError, Shape, ShapeProfile};
use crate::schema::{COMMENT, PATIENT, RUN, SESSION};
use crate::types::SessionRecord;
use chrono::NaiveDate;
use clinica_core::{bounds, canonical_module_kind, EntityId, SortDirection, Timestamp};
use serde::Serialize;
use tokio_postgres::Client;

// ============================================================================
// REPORT TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Serialize)]
pub struct PatientCounts {
    pub total: i64,
    pub last_7d: i64,
    pub last_30d: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NoteCounts {
    pub last_7d: i64,
    pub last_30d: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleCount {
    pub kind: String,
    pub total: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OverviewReport {
    pub patients: PatientCounts,
    pub notes: NoteCounts,
    pub modules_30d: Vec<ModuleCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordsReportRow {
    pub id: EntityId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sex: Option<String>,
    pub age: Option<i32>,
    pub clinician_id: Option<EntityId>,
    pub created: Option<Timestamp>,
    pub updated: Option<Timestamp>,
    pub comments_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordsReport {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub data: Vec<RecordsReportRow>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ModuleSummary {
    pub total: i64,
    pub completed: i64,
    pub avg_duration_s: Option<f64>,
    pub p95_duration_s: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub day: NaiveDate,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TopPatient {
    pub patient_id: Option<EntityId>,
    pub total: i64,
}

/// Filters for the paginated records report.
#[derive(Debug, Clone, Default)]
pub struct RecordsReportFilter {
    pub q: Option<String>,
    pub sex: Option<String>,
    pub order: SortDirection,
    pub limit: Option<i64>,
    pub page: Option<i64>,
}

/// Whether the run and session shapes carry everything the per-kind
/// module reports need: a kind column, a join key, a real date on the
/// run side, and an ownership column on the session side.
fn module_join_usable(run: &Shape, ses: &Shape) -> bool {
    run.has(field::KIND)
        && run.has(field::SESSION_ID)
        && run.is_date_like(field::STARTED_AT)
        && ses.has(field::ID)
        && ses.has(field::CLINICIAN_ID)
}

// ============================================================================
// ENGINE
// ============================================================================

/// Report pipelines over one checked-out connection.
pub struct Reports<'a> {
    client: &'a Client,
    clinician_id: EntityId,
}

impl<'a> Reports<'a> {
    pub fn new(client: &'a Client, clinician_id: EntityId) -> Self {
        Self {
            client,
            clinician_id,
        }
    }

    fn catalog(&self) -> PgCatalog<'a> {
        PgCatalog::new(self.client)
    }

    /// Discovery that degrades: a missing table family is `None`, only
    /// transport failures propagate.
    async fn try_discover(&self, profile: &ShapeProfile) -> ApiResult<Option<Shape>> {
        match Shape::discover(&self.catalog(), profile).await {
            Ok(shape) => Ok(Some(shape)),
            Err(SchemaError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn count(&self, sql: &str, params: &ParamBuffer) -> ApiResult<i64> {
        let row = self.client.query_one(sql, &params.as_refs()).await?;
        Ok(row.try_get(0)?)
    }

    // ========================================================================
    // OVERVIEW
    // ========================================================================

    pub async fn overview(&self) -> ApiResult<OverviewReport> {
        let pac = self.try_discover(&PATIENT).await?;
        let ses = self.try_discover(&SESSION).await?;
        let run = self.try_discover(&RUN).await?;

        let mut report = OverviewReport::default();

        report.patients.total = self.patient_total(pac.as_ref(), ses.as_ref()).await?;

        // Recent patient counts: own creation dates when real, session
        // activity otherwise.
        let (p7, p30) = self.patient_window_counts(pac.as_ref(), ses.as_ref()).await?;
        report.patients.last_7d = p7;
        report.patients.last_30d = p30;

        if let Some(ses) = ses.as_ref() {
            if ses.has(field::CLINICIAN_ID) && ses.is_date_like(field::OCCURRED_AT) {
                report.notes.last_7d = self.windowed_count(ses, field::OCCURRED_AT, 7).await?;
                report.notes.last_30d = self.windowed_count(ses, field::OCCURRED_AT, 30).await?;
            }
        }

        if let Some(run) = run.as_ref() {
            report.modules_30d = self.module_counts(run, 30).await?;
        }

        Ok(report)
    }

    async fn patient_total(&self, pac: Option<&Shape>, ses: Option<&Shape>) -> ApiResult<i64> {
        let Some(pac) = pac else { return Ok(0) };
        let Some(pac_id) = pac.col(field::ID) else {
            return Ok(0);
        };

        if let Some(owner) = pac.col(field::CLINICIAN_ID) {
            let mut params = ParamBuffer::new();
            let ph = params.push(self.clinician_id);
            let sql = format!(
                "SELECT COUNT(*)::bigint FROM {} WHERE {} = {}",
                pac.table, owner, ph
            );
            return self.count(&sql, &params).await;
        }

        // No ownership column on the patient table: a patient is "mine"
        // when I have at least one session with them.
        if let Some(ses) = ses {
            if let (Some(s_pid), Some(s_owner)) =
                (ses.col(field::PATIENT_ID), ses.col(field::CLINICIAN_ID))
            {
                let mut params = ParamBuffer::new();
                let ph = params.push(self.clinician_id);
                let sql = format!(
                    "SELECT COUNT(DISTINCT p.{pid})::bigint FROM {pt} p \
                     WHERE EXISTS (SELECT 1 FROM {st} s \
                       WHERE s.{spid} = p.{pid} AND s.{sown} = {ph})",
                    pid = pac_id,
                    pt = pac.table,
                    st = ses.table,
                    spid = s_pid,
                    sown = s_owner,
                    ph = ph,
                );
                return self.count(&sql, &params).await;
            }
        }

        Ok(0)
    }

    async fn patient_window_counts(
        &self,
        pac: Option<&Shape>,
        ses: Option<&Shape>,
    ) -> ApiResult<(i64, i64)> {
        if let Some(pac) = pac {
            if pac.has(field::CLINICIAN_ID) && pac.is_date_like(field::CREATED) {
                return Ok((
                    self.windowed_count(pac, field::CREATED, 7).await?,
                    self.windowed_count(pac, field::CREATED, 30).await?,
                ));
            }
        }

        if let Some(ses) = ses {
            if let (Some(pid), Some(owner), true) = (
                ses.col(field::PATIENT_ID),
                ses.col(field::CLINICIAN_ID),
                ses.is_date_like(field::OCCURRED_AT),
            ) {
                let fecha = ses.require(field::OCCURRED_AT)?;
                let q = |days: i64| {
                    format!(
                        "SELECT COUNT(DISTINCT {pid})::bigint FROM {t} \
                         WHERE {owner} = $1 AND {fecha} >= NOW() - INTERVAL '{days} days'",
                        pid = pid,
                        t = ses.table,
                        owner = owner,
                        fecha = fecha,
                        days = days,
                    )
                };
                let mut params = ParamBuffer::new();
                params.push(self.clinician_id);
                return Ok((
                    self.count(&q(7), &params).await?,
                    self.count(&q(30), &params).await?,
                ));
            }
        }

        Ok((0, 0))
    }

    /// COUNT of own rows with `date_field` inside the last `days` days.
    /// Caller guarantees the owner column and date-likeness.
    async fn windowed_count(
        &self,
        shape: &Shape,
        date_field: &'static str,
        days: i64,
    ) -> ApiResult<i64> {
        let owner = shape.require(field::CLINICIAN_ID)?;
        let date_col = shape.require(date_field)?;
        let days = bounds::clamp_days(Some(days), 30);

        let mut params = ParamBuffer::new();
        let ph = params.push(self.clinician_id);
        let sql = format!(
            "SELECT COUNT(*)::bigint FROM {} WHERE {} = {} \
             AND {} >= NOW() - INTERVAL '{} days'",
            shape.table, owner, ph, date_col, days
        );
        self.count(&sql, &params).await
    }

    // ========================================================================
    // MODULE USAGE
    // ========================================================================

    /// Usage counts per module kind over the window. Empty unless the
    /// run shape has kind, owner and a date-like start.
    pub async fn modules(&self, days: Option<i64>) -> ApiResult<Vec<ModuleCount>> {
        let days = bounds::clamp_days(days, 30);
        match self.try_discover(&RUN).await? {
            Some(run) => self.module_counts(&run, days).await,
            None => Ok(Vec::new()),
        }
    }

    async fn module_counts(&self, run: &Shape, days: i64) -> ApiResult<Vec<ModuleCount>> {
        let (Some(kind), Some(owner), true) = (
            run.col(field::KIND),
            run.col(field::CLINICIAN_ID),
            run.is_date_like(field::STARTED_AT),
        ) else {
            return Ok(Vec::new());
        };
        let started = run.require(field::STARTED_AT)?;

        let mut params = ParamBuffer::new();
        let ph = params.push(self.clinician_id);
        let sql = format!(
            "SELECT ({kind})::text AS kind, COUNT(*)::bigint AS total FROM {t} \
             WHERE {owner} = {ph} AND {started} >= NOW() - INTERVAL '{days} days' \
             GROUP BY {kind} ORDER BY total DESC",
            kind = kind,
            t = run.table,
            owner = owner,
            ph = ph,
            started = started,
            days = days,
        );

        let rows = self.client.query(&sql, &params.as_refs()).await?;
        rows.iter()
            .map(|r| {
                Ok(ModuleCount {
                    kind: canonical_module_kind(r.try_get::<_, String>("kind")?.as_str()),
                    total: r.try_get("total")?,
                })
            })
            .collect()
    }

    /// Shapes and columns the per-kind module reports need: runs joined
    /// to own sessions. `None` means the report degrades to its empty
    /// default.
    async fn module_join(&self) -> ApiResult<Option<(Shape, Shape)>> {
        let Some(run) = self.try_discover(&RUN).await? else {
            return Ok(None);
        };
        let Some(ses) = self.try_discover(&SESSION).await? else {
            return Ok(None);
        };
        Ok(module_join_usable(&run, &ses).then_some((run, ses)))
    }

    /// Duration stats for one module kind over the window.
    pub async fn module_summary(&self, kind: &str, days: Option<i64>) -> ApiResult<ModuleSummary> {
        let days = bounds::clamp_days(days, 30);
        let kind = canonical_module_kind(kind);

        let Some((run, ses)) = self.module_join().await? else {
            return Ok(ModuleSummary::default());
        };

        let (r_kind, r_sid, r_start) = (
            run.require(field::KIND)?,
            run.require(field::SESSION_ID)?,
            run.require(field::STARTED_AT)?,
        );
        let (s_id, s_owner) = (ses.require(field::ID)?, ses.require(field::CLINICIAN_ID)?);

        // Durations only when the run shape records an end timestamp.
        let duration_cols = match run.col(field::ENDED_AT) {
            Some(r_end) => format!(
                "COUNT(*) FILTER (WHERE r.{end} IS NOT NULL)::bigint AS completed, \
                 ROUND(AVG(EXTRACT(EPOCH FROM (r.{end} - r.{start}))) \
                       FILTER (WHERE r.{end} IS NOT NULL)::numeric, 2)::float8 AS avg_duration_s, \
                 ROUND(PERCENTILE_CONT(0.95) WITHIN GROUP \
                       (ORDER BY EXTRACT(EPOCH FROM (r.{end} - r.{start}))) \
                       FILTER (WHERE r.{end} IS NOT NULL)::numeric, 2)::float8 AS p95_duration_s",
                end = r_end,
                start = r_start,
            ),
            None => "0::bigint AS completed, NULL::float8 AS avg_duration_s, \
                     NULL::float8 AS p95_duration_s"
                .to_string(),
        };

        let mut params = ParamBuffer::new();
        let ph_owner = params.push(self.clinician_id);
        let ph_kind = params.push(kind);
        let sql = format!(
            "SELECT COUNT(*)::bigint AS total, {durations} \
             FROM {rt} r JOIN {st} s ON s.{sid} = r.{rsid} \
             WHERE s.{owner} = {ph_owner} AND r.{rkind} = {ph_kind} \
               AND r.{rstart} >= NOW() - INTERVAL '{days} days'",
            durations = duration_cols,
            rt = run.table,
            st = ses.table,
            sid = s_id,
            rsid = r_sid,
            owner = s_owner,
            ph_owner = ph_owner,
            rkind = r_kind,
            ph_kind = ph_kind,
            rstart = r_start,
            days = days,
        );

        let row = self.client.query_one(&sql, &params.as_refs()).await?;
        Ok(ModuleSummary {
            total: row.try_get("total")?,
            completed: row.try_get("completed")?,
            avg_duration_s: row.try_get("avg_duration_s")?,
            p95_duration_s: row.try_get("p95_duration_s")?,
        })
    }

    /// Daily usage counts for one module kind.
    pub async fn module_series(&self, kind: &str, days: Option<i64>) -> ApiResult<Vec<SeriesPoint>> {
        let days = bounds::clamp_days(days, 30);
        let kind = canonical_module_kind(kind);

        let Some((run, ses)) = self.module_join().await? else {
            return Ok(Vec::new());
        };

        let mut params = ParamBuffer::new();
        let ph_owner = params.push(self.clinician_id);
        let ph_kind = params.push(kind);
        let sql = format!(
            "SELECT date_trunc('day', r.{start})::date AS day, COUNT(*)::bigint AS total \
             FROM {rt} r JOIN {st} s ON s.{sid} = r.{rsid} \
             WHERE s.{owner} = {ph_owner} AND r.{rkind} = {ph_kind} \
               AND r.{start} >= NOW() - INTERVAL '{days} days' \
             GROUP BY 1 ORDER BY 1",
            start = run.require(field::STARTED_AT)?,
            rt = run.table,
            st = ses.table,
            sid = ses.require(field::ID)?,
            rsid = run.require(field::SESSION_ID)?,
            owner = ses.require(field::CLINICIAN_ID)?,
            ph_owner = ph_owner,
            rkind = run.require(field::KIND)?,
            ph_kind = ph_kind,
            days = days,
        );

        let rows = self.client.query(&sql, &params.as_refs()).await?;
        rows.iter()
            .map(|r| {
                Ok(SeriesPoint {
                    day: r.try_get("day")?,
                    total: r.try_get("total")?,
                })
            })
            .collect()
    }

    /// Patients with the most runs of one module kind.
    pub async fn module_top(
        &self,
        kind: &str,
        days: Option<i64>,
        limit: Option<i64>,
    ) -> ApiResult<Vec<TopPatient>> {
        let days = bounds::clamp_days(days, 30);
        let limit = bounds::clamp_limit(limit, 10, 200);
        let kind = canonical_module_kind(kind);

        let Some((run, ses)) = self.module_join().await? else {
            return Ok(Vec::new());
        };
        let Some(s_pid) = ses.col(field::PATIENT_ID) else {
            return Ok(Vec::new());
        };

        let mut params = ParamBuffer::new();
        let ph_owner = params.push(self.clinician_id);
        let ph_kind = params.push(kind);
        let sql = format!(
            "SELECT (s.{pid})::bigint AS patient_id, COUNT(*)::bigint AS total \
             FROM {rt} r JOIN {st} s ON s.{sid} = r.{rsid} \
             WHERE s.{owner} = {ph_owner} AND r.{rkind} = {ph_kind} \
               AND r.{start} >= NOW() - INTERVAL '{days} days' \
             GROUP BY s.{pid} ORDER BY total DESC LIMIT {limit}",
            pid = s_pid,
            rt = run.table,
            st = ses.table,
            sid = ses.require(field::ID)?,
            rsid = run.require(field::SESSION_ID)?,
            owner = ses.require(field::CLINICIAN_ID)?,
            ph_owner = ph_owner,
            rkind = run.require(field::KIND)?,
            ph_kind = ph_kind,
            start = run.require(field::STARTED_AT)?,
            days = days,
            limit = limit,
        );

        let rows = self.client.query(&sql, &params.as_refs()).await?;
        rows.iter()
            .map(|r| {
                Ok(TopPatient {
                    patient_id: r.try_get("patient_id")?,
                    total: r.try_get("total")?,
                })
            })
            .collect()
    }

    // ========================================================================
    // RECENT NOTES
    // ========================================================================

    /// Latest own session notes, newest first. Empty unless the session
    /// shape has an owner and a date-like session date.
    pub async fn recent_notes(&self, limit: Option<i64>) -> ApiResult<Vec<SessionRecord>> {
        let limit = bounds::clamp_limit(limit, 30, 200);

        let Some(ses) = self.try_discover(&SESSION).await? else {
            return Ok(Vec::new());
        };
        if !ses.has(field::CLINICIAN_ID) || !ses.is_date_like(field::OCCURRED_AT) {
            return Ok(Vec::new());
        }

        use crate::query::{ProjType, SelectBuilder};
        let (sql, params) = SelectBuilder::new(&ses)
            .project(field::ID, ProjType::BigInt)
            .project(field::PATIENT_ID, ProjType::BigInt)
            .project(field::CLINICIAN_ID, ProjType::BigInt)
            .project(field::OCCURRED_AT, ProjType::Timestamp)
            .project(field::TITLE, ProjType::Text)
            .project(field::NOTE, ProjType::Text)
            .filter_eq(field::CLINICIAN_ID, self.clinician_id)
            .order_preferring(&[field::OCCURRED_AT], SortDirection::Desc)
            .limit(limit)
            .build();

        let rows = self.client.query(&sql, &params.as_refs()).await?;
        rows.iter().map(|r| Ok(SessionRecord::from_row(r)?)).collect()
    }

    // ========================================================================
    // PAGINATED RECORDS REPORT
    // ========================================================================

    /// Per-patient activity report: own patients with comment counts
    /// and activity-derived created/updated fallbacks.
    pub async fn records_report(&self, filter: &RecordsReportFilter) -> ApiResult<RecordsReport> {
        let limit = bounds::clamp_limit(filter.limit, 10, 200);
        let page = bounds::clamp_page(filter.page);
        let offset = (page - 1) * limit;

        let Some(pac) = self.try_discover(&PATIENT).await? else {
            return Ok(RecordsReport {
                total: 0,
                page,
                limit,
                data: Vec::new(),
            });
        };
        let Some(pac_id) = pac.col(field::ID).map(str::to_string) else {
            return Ok(RecordsReport {
                total: 0,
                page,
                limit,
                data: Vec::new(),
            });
        };
        let ses = self.try_discover(&SESSION).await?;
        let cmt = self.try_discover(&COMMENT).await?;

        // Session shapes usable for activity fallbacks and comment joins.
        let ses_activity = ses.as_ref().filter(|s| {
            s.has(field::PATIENT_ID)
                && s.has(field::CLINICIAN_ID)
                && s.is_date_like(field::OCCURRED_AT)
        });

        let mut params = ParamBuffer::new();
        let mut conds: Vec<String> = Vec::new();

        // Ownership: direct column, else session-activity EXISTS.
        if let Some(owner) = pac.col(field::CLINICIAN_ID) {
            let ph = params.push(self.clinician_id);
            conds.push(format!("p.{} = {}", owner, ph));
        } else if let Some(s) = ses.as_ref() {
            if let (Some(spid), Some(sown)) =
                (s.col(field::PATIENT_ID), s.col(field::CLINICIAN_ID))
            {
                let ph = params.push(self.clinician_id);
                conds.push(format!(
                    "EXISTS (SELECT 1 FROM {st} s WHERE s.{spid} = p.{pid} AND s.{sown} = {ph})",
                    st = s.table,
                    spid = spid,
                    pid = pac_id,
                    sown = sown,
                    ph = ph,
                ));
            }
        }

        if let Some(sex) = filter.sex.as_deref() {
            if let Some(sex) = clinica_core::Sex::parse(sex) {
                if let Some(col) = pac.col(field::SEX) {
                    let ph = params.push(sex.as_str());
                    conds.push(format!("p.{} = {}", col, ph));
                }
            }
        }

        if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let cols: Vec<String> = [field::LAST_NAME, field::FIRST_NAME]
                .iter()
                .filter_map(|f| pac.col(f))
                .map(|c| format!("COALESCE(p.{}, '')", c))
                .collect();
            if !cols.is_empty() {
                let ph = params.push(format!("%{}%", q.to_lowercase()));
                conds.push(format!("LOWER({}) LIKE {}", cols.join(" || ' ' || "), ph));
            }
        }

        let where_sql = if conds.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conds.join(" AND "))
        };

        // Total before pagination; the buffer holds exactly the WHERE binds.
        let total = self
            .count(
                &format!("SELECT COUNT(*)::bigint FROM {} p{}", pac.table, where_sql),
                &params,
            )
            .await?;

        // created/updated: real patient date columns when date-like,
        // MIN/MAX of own session dates otherwise, NULL as last resort.
        let activity_expr = |agg: &str, params: &mut ParamBuffer| -> Option<String> {
            ses_activity.map(|s| {
                let ph = params.push(self.clinician_id);
                format!(
                    "(SELECT {agg}(s.{f}) FROM {st} s \
                     WHERE s.{spid} = p.{pid} AND s.{sown} = {ph})",
                    agg = agg,
                    f = s.col(field::OCCURRED_AT).unwrap_or_default(),
                    st = s.table,
                    spid = s.col(field::PATIENT_ID).unwrap_or_default(),
                    pid = pac_id,
                    sown = s.col(field::CLINICIAN_ID).unwrap_or_default(),
                    ph = ph,
                )
            })
        };

        let created_expr = if pac.is_date_like(field::CREATED) {
            format!("p.{}", pac.require(field::CREATED)?)
        } else {
            activity_expr("MIN", &mut params).unwrap_or_else(|| "NULL".to_string())
        };
        let updated_is_real = pac.is_date_like(field::UPDATED);
        let updated_expr = if updated_is_real {
            format!("p.{}", pac.require(field::UPDATED)?)
        } else {
            activity_expr("MAX", &mut params).unwrap_or_else(|| "NULL".to_string())
        };

        // Comment counts through the comment -> session join.
        let comments_expr = match (cmt.as_ref(), ses.as_ref()) {
            (Some(c), Some(s))
                if c.has(field::SESSION_ID)
                    && s.has(field::ID)
                    && s.has(field::PATIENT_ID)
                    && s.has(field::CLINICIAN_ID) =>
            {
                let ph = params.push(self.clinician_id);
                format!(
                    "(SELECT COUNT(*) FROM {ct} c JOIN {st} s2 ON s2.{sid} = c.{csid} \
                     WHERE s2.{spid} = p.{pid} AND s2.{sown} = {ph})::bigint",
                    ct = c.table,
                    st = s.table,
                    sid = s.col(field::ID).unwrap_or_default(),
                    csid = c.col(field::SESSION_ID).unwrap_or_default(),
                    spid = s.col(field::PATIENT_ID).unwrap_or_default(),
                    pid = pac_id,
                    sown = s.col(field::CLINICIAN_ID).unwrap_or_default(),
                    ph = ph,
                )
            }
            _ => "0::bigint".to_string(),
        };

        let order_expr = if updated_is_real {
            updated_expr.clone()
        } else if pac.is_date_like(field::CREATED) {
            created_expr.clone()
        } else {
            format!("p.{}", pac_id)
        };

        let proj = |f: &'static str, ty: &str| match pac.col(f) {
            Some(c) => format!("(p.{})::{} AS {}", c, ty, f),
            None => format!("NULL::{} AS {}", ty, f),
        };

        let sql = format!(
            "SELECT (p.{pid})::bigint AS id, {fname}, {lname}, {sex}, {age}, {owner}, \
             ({created})::timestamptz AS created, ({updated})::timestamptz AS updated, \
             {comments} AS comments_count \
             FROM {pt} p{where_sql} ORDER BY {order} {dir} LIMIT {limit} OFFSET {offset}",
            pid = pac_id,
            fname = proj(field::FIRST_NAME, "text"),
            lname = proj(field::LAST_NAME, "text"),
            sex = proj(field::SEX, "text"),
            age = proj(field::AGE, "integer"),
            owner = proj(field::CLINICIAN_ID, "bigint"),
            created = created_expr,
            updated = updated_expr,
            comments = comments_expr,
            pt = pac.table,
            where_sql = where_sql,
            order = order_expr,
            dir = filter.order.as_sql(),
            limit = limit,
            offset = offset,
        );

        let rows = self.client.query(&sql, &params.as_refs()).await?;
        let data = rows
            .iter()
            .map(|r| {
                Ok(RecordsReportRow {
                    id: r.try_get("id")?,
                    first_name: r.try_get("first_name")?,
                    last_name: r.try_get("last_name")?,
                    sex: r.try_get("sex")?,
                    age: r.try_get("age")?,
                    clinician_id: r.try_get("clinician_id")?,
                    created: r.try_get("created")?,
                    updated: r.try_get("updated")?,
                    comments_count: r.try_get("comments_count")?,
                })
            })
            .collect::<Result<Vec<_>, tokio_postgres::Error>>()?;

        Ok(RecordsReport {
            total,
            page,
            limit,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_shape(started_type: &str) -> Shape {
        Shape::for_test(
            "run",
            "runs_modulo",
            &[
                (field::ID, "id", "integer"),
                (field::SESSION_ID, "sesion_id", "integer"),
                (field::KIND, "modulo", "character varying"),
                (field::STARTED_AT, "inicio", started_type),
            ],
        )
    }

    fn session_shape() -> Shape {
        Shape::for_test(
            "session",
            "sesiones",
            &[
                (field::ID, "id", "integer"),
                (field::CLINICIAN_ID, "terapeuta_id", "integer"),
            ],
        )
    }

    #[test]
    fn test_module_join_usable() {
        assert!(module_join_usable(
            &run_shape("timestamp without time zone"),
            &session_shape()
        ));
        assert!(module_join_usable(&run_shape("timestamptz"), &session_shape()));
    }

    #[test]
    fn test_module_join_degrades_on_non_date_start() {
        // A varchar start column cannot anchor a day window.
        assert!(!module_join_usable(
            &run_shape("character varying"),
            &session_shape()
        ));
    }

    #[test]
    fn test_module_join_degrades_on_missing_owner() {
        let ses = Shape::for_test("session", "sesiones", &[(field::ID, "id", "integer")]);
        assert!(!module_join_usable(
            &run_shape("timestamp without time zone"),
            &ses
        ));
    }

    #[test]
    fn test_default_reports_are_empty() {
        let overview = OverviewReport::default();
        assert_eq!(overview.patients.total, 0);
        assert!(overview.modules_30d.is_empty());

        let summary = ModuleSummary::default();
        assert_eq!(summary.total, 0);
        assert!(summary.avg_duration_s.is_none());
    }

    #[test]
    fn test_report_serialization_shape() {
        let report = RecordsReport {
            total: 3,
            page: 1,
            limit: 10,
            data: vec![RecordsReportRow {
                id: 5,
                first_name: Some("Ana".into()),
                last_name: None,
                sex: Some("F".into()),
                age: None,
                clinician_id: Some(2),
                created: None,
                updated: None,
                comments_count: 4,
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total"], 3);
        assert_eq!(json["data"][0]["comments_count"], 4);
        assert!(json["data"][0]["age"].is_null());
    }
}
