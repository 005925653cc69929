// ==========================================
// 生产派工系统 - 工序卡仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 表: job_card (原材料/产出明细以 JSON 列保存), job_card_time_log
// 并发: revision 乐观锁
// ==========================================

use crate::domain::job_card::{
    CommittedInterval, FinalizedCardSummary, JobCard, JobCardSummary, ProducedItemLine, RawMaterialLine,
    TimeInterval,
};
use crate::domain::types::{DocState, JobCardStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Transaction};
use std::sync::{Arc, Mutex};

/// 时间列存储格式
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S%.f";

const JOB_CARD_COLUMNS: &str = r#"
    job_card_id, routing_id, step_id, production_item, operation, sales_order_line,
    workstation, employee, source_location, target_location,
    transfer_entry, consumes_rm, final_step, operation_seq_no,
    for_quantity, total_qty, total_completed_qty, total_rejected_qty, available_qty, short_close,
    priority, status, doc_state, rm_status_pct, rm_shortage,
    manual_posting, posting_time, total_time_mins,
    raw_materials_json, produced_items_json, created_at, revision
"#;

fn format_dt(dt: &NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_dt(idx: usize, raw: &str) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATETIME_FMT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn parse_opt_dt(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<NaiveDateTime>> {
    raw.map(|s| parse_dt(idx, &s)).transpose()
}

fn invalid_text(idx: usize, what: &str, raw: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("无效的{}: {}", what, raw).into(),
    )
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

// ==========================================
// JobCardRepository - 工序卡仓储
// ==========================================
pub struct JobCardRepository {
    conn: Arc<Mutex<Connection>>,
}

impl JobCardRepository {
    /// 创建新的 JobCardRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新建工序卡 (含工时行)
    pub fn insert(&self, card: &JobCard) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let raw_materials_json = serde_json::to_string(&card.raw_materials)?;
        let produced_items_json = serde_json::to_string(&card.produced_items)?;

        tx.execute(
            &format!(
                "INSERT INTO job_card ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                 ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32)",
                JOB_CARD_COLUMNS
            ),
            params![
                card.job_card_id,
                card.routing_id,
                card.step_id,
                card.production_item,
                card.operation,
                card.sales_order_line,
                card.workstation,
                card.employee,
                card.source_location,
                card.target_location,
                card.transfer_entry,
                card.consumes_rm,
                card.final_step,
                card.operation_seq_no,
                card.for_quantity,
                card.total_qty,
                card.total_completed_qty,
                card.total_rejected_qty,
                card.available_qty,
                card.short_close,
                card.priority,
                card.status.to_db_str(),
                card.doc_state.to_db_str(),
                card.rm_status_pct,
                card.rm_shortage,
                card.manual_posting,
                card.posting_time.as_ref().map(format_dt),
                card.total_time_mins,
                raw_materials_json,
                produced_items_json,
                format_dt(&card.created_at),
                card.revision,
            ],
        )?;
        Self::write_time_logs(&tx, card)?;
        tx.commit()?;

        tracing::debug!(job_card = %card.job_card_id, "工序卡已新建");
        Ok(())
    }

    /// 更新工序卡 (带乐观锁检查)
    ///
    /// # 返回
    /// - Ok(new_revision): 更新成功后的修订号
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配 (其他调用方已更新)
    /// - `RepositoryError::NotFound`: 工序卡不存在
    pub fn update(&self, card: &JobCard) -> RepositoryResult<i32> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;
        let raw_materials_json = serde_json::to_string(&card.raw_materials)?;
        let produced_items_json = serde_json::to_string(&card.produced_items)?;

        let rows_affected = tx.execute(
            r#"UPDATE job_card SET
                   workstation = ?1, employee = ?2, source_location = ?3, target_location = ?4,
                   transfer_entry = ?5, consumes_rm = ?6, final_step = ?7, operation_seq_no = ?8,
                   for_quantity = ?9, total_qty = ?10, total_completed_qty = ?11, total_rejected_qty = ?12,
                   available_qty = ?13, short_close = ?14, priority = ?15, status = ?16, doc_state = ?17,
                   rm_status_pct = ?18, rm_shortage = ?19, manual_posting = ?20, posting_time = ?21,
                   total_time_mins = ?22, raw_materials_json = ?23, produced_items_json = ?24,
                   revision = revision + 1
               WHERE job_card_id = ?25 AND revision = ?26"#,
            params![
                card.workstation,
                card.employee,
                card.source_location,
                card.target_location,
                card.transfer_entry,
                card.consumes_rm,
                card.final_step,
                card.operation_seq_no,
                card.for_quantity,
                card.total_qty,
                card.total_completed_qty,
                card.total_rejected_qty,
                card.available_qty,
                card.short_close,
                card.priority,
                card.status.to_db_str(),
                card.doc_state.to_db_str(),
                card.rm_status_pct,
                card.rm_shortage,
                card.manual_posting,
                card.posting_time.as_ref().map(format_dt),
                card.total_time_mins,
                raw_materials_json,
                produced_items_json,
                card.job_card_id,
                card.revision,
            ],
        )?;

        if rows_affected == 0 {
            // 判断是记录不存在还是revision冲突
            let exists: Result<i32, _> = tx.query_row(
                "SELECT revision FROM job_card WHERE job_card_id = ?1",
                params![card.job_card_id],
                |row| row.get(0),
            );
            return match exists {
                Ok(actual_revision) => Err(RepositoryError::OptimisticLockFailure {
                    job_card_id: card.job_card_id.clone(),
                    expected: card.revision,
                    actual: actual_revision,
                }),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
                    entity: "JobCard".to_string(),
                    id: card.job_card_id.clone(),
                }),
                Err(e) => Err(e.into()),
            };
        }

        tx.execute(
            "DELETE FROM job_card_time_log WHERE job_card_id = ?1",
            params![card.job_card_id],
        )?;
        Self::write_time_logs(&tx, card)?;
        tx.commit()?;

        Ok(card.revision + 1)
    }

    fn write_time_logs(tx: &Transaction<'_>, card: &JobCard) -> RepositoryResult<()> {
        let mut stmt = tx.prepare(
            r#"INSERT INTO job_card_time_log (
                   interval_id, job_card_id, sequence_no, from_time, to_time, workstation,
                   completed_qty, rejected_qty, salvage_qty, salvage_location, time_in_mins
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
        )?;
        for row in &card.time_logs {
            stmt.execute(params![
                row.interval_id,
                card.job_card_id,
                row.sequence_no,
                row.from_time.as_ref().map(format_dt),
                row.to_time.as_ref().map(format_dt),
                row.workstation.as_ref().or(card.workstation.as_ref()),
                row.completed_qty,
                row.rejected_qty,
                row.salvage_qty,
                row.salvage_location,
                row.time_in_mins,
            ])?;
        }
        Ok(())
    }

    fn load_time_logs(conn: &Connection, job_card_id: &str) -> RepositoryResult<Vec<TimeInterval>> {
        let mut stmt = conn.prepare(
            r#"SELECT interval_id, sequence_no, from_time, to_time, workstation,
                      completed_qty, rejected_qty, salvage_qty, salvage_location, time_in_mins
               FROM job_card_time_log
               WHERE job_card_id = ?1
               ORDER BY sequence_no"#,
        )?;
        let rows = stmt
            .query_map(params![job_card_id], |row| {
                Ok(TimeInterval {
                    interval_id: row.get(0)?,
                    sequence_no: row.get(1)?,
                    from_time: parse_opt_dt(2, row.get(2)?)?,
                    to_time: parse_opt_dt(3, row.get(3)?)?,
                    workstation: row.get(4)?,
                    completed_qty: row.get(5)?,
                    rejected_qty: row.get(6)?,
                    salvage_qty: row.get(7)?,
                    salvage_location: row.get(8)?,
                    time_in_mins: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<JobCard> {
        let status_raw: String = row.get(21)?;
        let doc_state_raw: String = row.get(22)?;
        Ok(JobCard {
            job_card_id: row.get(0)?,
            routing_id: row.get(1)?,
            step_id: row.get(2)?,
            production_item: row.get(3)?,
            operation: row.get(4)?,
            sales_order_line: row.get(5)?,
            workstation: row.get(6)?,
            employee: row.get(7)?,
            source_location: row.get(8)?,
            target_location: row.get(9)?,
            transfer_entry: row.get(10)?,
            consumes_rm: row.get(11)?,
            final_step: row.get(12)?,
            operation_seq_no: row.get(13)?,
            for_quantity: row.get(14)?,
            total_qty: row.get(15)?,
            total_completed_qty: row.get(16)?,
            total_rejected_qty: row.get(17)?,
            available_qty: row.get(18)?,
            short_close: row.get(19)?,
            priority: row.get(20)?,
            status: JobCardStatus::from_db_str(&status_raw)
                .ok_or_else(|| invalid_text(21, "工序卡状态", &status_raw))?,
            doc_state: DocState::from_db_str(&doc_state_raw)
                .ok_or_else(|| invalid_text(22, "单据状态", &doc_state_raw))?,
            rm_status_pct: row.get(23)?,
            rm_shortage: row.get(24)?,
            manual_posting: row.get(25)?,
            posting_time: parse_opt_dt(26, row.get(26)?)?,
            total_time_mins: row.get(27)?,
            raw_materials: parse_json::<Vec<RawMaterialLine>>(28, &row.get::<_, String>(28)?)?,
            produced_items: parse_json::<Vec<ProducedItemLine>>(29, &row.get::<_, String>(29)?)?,
            time_logs: Vec::new(),
            created_at: parse_dt(30, &row.get::<_, String>(30)?)?,
            revision: row.get(31)?,
        })
    }

    fn query_cards<P: rusqlite::Params>(conn: &Connection, where_clause: &str, args: P) -> RepositoryResult<Vec<JobCard>> {
        let sql = format!("SELECT {} FROM job_card {}", JOB_CARD_COLUMNS, where_clause);
        let mut stmt = conn.prepare(&sql)?;
        let mut cards = stmt
            .query_map(args, Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for card in cards.iter_mut() {
            card.time_logs = Self::load_time_logs(conn, &card.job_card_id)?;
        }
        Ok(cards)
    }

    /// 按主键查询
    ///
    /// # 返回
    /// - Ok(Some(JobCard)): 找到工序卡
    /// - Ok(None): 未找到
    pub fn find_by_id(&self, job_card_id: &str) -> RepositoryResult<Option<JobCard>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            &format!("SELECT {} FROM job_card WHERE job_card_id = ?1", JOB_CARD_COLUMNS),
            params![job_card_id],
            Self::map_row,
        );

        match result {
            Ok(mut card) => {
                card.time_logs = Self::load_time_logs(&conn, &card.job_card_id)?;
                Ok(Some(card))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按主键查询, 不存在时返回 NotFound
    pub fn get(&self, job_card_id: &str) -> RepositoryResult<JobCard> {
        self.find_by_id(job_card_id)?.ok_or_else(|| RepositoryError::NotFound {
            entity: "JobCard".to_string(),
            id: job_card_id.to_string(),
        })
    }

    /// 同一 (物料, 工序) 下的待执行工序卡, 按创建时间升序
    pub fn find_pending(&self, production_item: &str, operation: &str) -> RepositoryResult<Vec<JobCard>> {
        let conn = self.get_conn()?;
        Self::query_cards(
            &conn,
            "WHERE production_item = ?1 AND operation = ?2 AND doc_state = 'DRAFT' ORDER BY created_at",
            params![production_item, operation],
        )
    }

    /// 全部待执行工序卡, 按 (物料, 工序, 创建时间) 排序
    pub fn list_pending_all(&self) -> RepositoryResult<Vec<JobCard>> {
        let conn = self.get_conn()?;
        Self::query_cards(
            &conn,
            "WHERE doc_state = 'DRAFT' ORDER BY production_item, operation, created_at",
            [],
        )
    }

    /// 物料的待执行工序卡摘要, 按工序序号降序
    pub fn open_for_item(&self, production_item: &str) -> RepositoryResult<Vec<JobCardSummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT job_card_id, operation_seq_no, transfer_entry, for_quantity, available_qty, source_location
               FROM job_card
               WHERE production_item = ?1 AND doc_state = 'DRAFT'
               ORDER BY operation_seq_no DESC, created_at"#,
        )?;
        let rows = stmt
            .query_map(params![production_item], |row| {
                Ok(JobCardSummary {
                    job_card_id: row.get(0)?,
                    operation_seq_no: row.get(1)?,
                    transfer_entry: row.get(2)?,
                    for_quantity: row.get(3)?,
                    available_qty: row.get(4)?,
                    source_location: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 物料的待执行工序卡 (完整), 按工序序号降序
    pub fn open_cards_for_item(&self, production_item: &str) -> RepositoryResult<Vec<JobCard>> {
        let conn = self.get_conn()?;
        Self::query_cards(
            &conn,
            "WHERE production_item = ?1 AND doc_state = 'DRAFT' ORDER BY operation_seq_no DESC, created_at",
            params![production_item],
        )
    }

    /// 有待执行工序卡的物料
    pub fn items_with_open_cards(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT production_item FROM job_card WHERE doc_state = 'DRAFT' ORDER BY production_item",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 销售行下已提交的工序卡
    pub fn finalized_for_sales_line(&self, sales_order_line: &str) -> RepositoryResult<Vec<FinalizedCardSummary>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT job_card_id, sales_order_line, source_location, target_location, total_completed_qty
               FROM job_card
               WHERE sales_order_line = ?1 AND doc_state = 'SUBMITTED'"#,
        )?;
        let rows = stmt
            .query_map(params![sales_order_line], |row| {
                Ok(FinalizedCardSummary {
                    job_card_id: row.get(0)?,
                    sales_order_line: row.get(1)?,
                    source_location: row.get(2)?,
                    target_location: row.get(3)?,
                    total_completed_qty: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 工位上已占用的时段 (不含已取消工序卡)
    pub fn committed_intervals(&self, workstation: &str) -> RepositoryResult<Vec<CommittedInterval>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT tl.interval_id, tl.job_card_id, COALESCE(tl.workstation, jc.workstation),
                      tl.from_time, tl.to_time, jc.doc_state
               FROM job_card_time_log tl
               JOIN job_card jc ON jc.job_card_id = tl.job_card_id
               WHERE COALESCE(tl.workstation, jc.workstation) = ?1
                 AND jc.doc_state != 'CANCELLED'
                 AND tl.from_time IS NOT NULL
                 AND tl.to_time IS NOT NULL"#,
        )?;
        let rows = stmt
            .query_map(params![workstation], |row| {
                let doc_state_raw: String = row.get(5)?;
                Ok(CommittedInterval {
                    interval_id: row.get(0)?,
                    job_card_id: row.get(1)?,
                    workstation: row.get(2)?,
                    from_time: parse_dt(3, &row.get::<_, String>(3)?)?,
                    to_time: parse_dt(4, &row.get::<_, String>(4)?)?,
                    doc_state: DocState::from_db_str(&doc_state_raw)
                        .ok_or_else(|| invalid_text(5, "单据状态", &doc_state_raw))?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::routing::{OperationStep, RoutingInstance};
    use chrono::NaiveDate;

    fn repo() -> JobCardRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        JobCardRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn card(op: &str) -> JobCard {
        let mut step = OperationStep::new("S1", 1, op);
        step.workstation = Some("WS-1".into());
        step.consumes_rm = true;
        let routing = RoutingInstance {
            routing_id: "PS-1".into(),
            production_item: "FG".into(),
            sales_order_line: None,
            template_id: None,
            operations: vec![step.clone()],
            raw_materials: vec![RawMaterialLine::new("RM-A", 2.0)],
        };
        JobCard::from_routing_step(&routing, &step, 5.0)
    }

    #[test]
    fn test_insert_and_find_round_trip_with_time_logs() {
        let repo = repo();
        let mut jc = card("CUT");
        let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(9, 0, 0).unwrap();
        jc.time_logs.push(TimeInterval::new(1, from, to).with_completed(2.0));
        repo.insert(&jc).unwrap();

        let loaded = repo.get(&jc.job_card_id).unwrap();
        assert_eq!(loaded.raw_materials.len(), 1);
        assert_eq!(loaded.time_logs.len(), 1);
        assert_eq!(loaded.time_logs[0].from_time, Some(from));
        assert_eq!(loaded.created_at, jc.created_at);

        let intervals = repo.committed_intervals("WS-1").unwrap();
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].job_card_id, jc.job_card_id);
        assert!(repo.find_by_id("JC-missing").unwrap().is_none());
    }

    #[test]
    fn test_update_bumps_revision_and_detects_stale_write() {
        let repo = repo();
        let mut jc = card("CUT");
        repo.insert(&jc).unwrap();

        let stale = jc.clone();
        jc.priority = 3;
        jc.revision = repo.update(&jc).unwrap();
        assert_eq!(jc.revision, 1);

        let err = repo.update(&stale).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::OptimisticLockFailure { expected: 0, actual: 1, .. }
        ));

        let mut ghost = card("CUT");
        ghost.job_card_id = "JC-ghost".into();
        assert!(matches!(repo.update(&ghost), Err(RepositoryError::NotFound { .. })));
    }

    #[test]
    fn test_pending_queries_exclude_finalized() {
        let repo = repo();
        let a = card("CUT");
        let mut b = card("CUT");
        b.doc_state = DocState::Submitted;
        let c = card("PACK");
        repo.insert(&a).unwrap();
        repo.insert(&b).unwrap();
        repo.insert(&c).unwrap();

        let pending = repo.find_pending("FG", "CUT").unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_card_id, a.job_card_id);
        assert_eq!(repo.list_pending_all().unwrap().len(), 2);
        assert_eq!(repo.open_for_item("FG").unwrap().len(), 2);
        assert_eq!(repo.items_with_open_cards().unwrap(), vec!["FG".to_string()]);
    }
}
