//! Risk record and status history queries.

use super::RiskStore;
use crate::{error::RiskResult, risk::RiskRecord, risk_register::StatusChange};
use rusqlite::params;

impl RiskStore {
    /// Insert or replace the latest snapshot of a record.
    pub fn upsert_risk_record(&self, run_id: &str, record: &RiskRecord) -> RiskResult<()> {
        let payload = serde_json::to_string(record)?;
        self.conn.execute(
            "INSERT INTO risk_record (run_id, risk_id, category, status, risk_level, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(run_id, risk_id) DO UPDATE SET
                 category = excluded.category,
                 status = excluded.status,
                 risk_level = excluded.risk_level,
                 payload = excluded.payload",
            params![
                run_id,
                record.risk_id,
                record.category.as_str(),
                record.status.as_str(),
                record.risk_level.map(|l| l.as_str()),
                payload,
            ],
        )?;
        Ok(())
    }

    pub fn load_risk_records(&self, run_id: &str) -> RiskResult<Vec<RiskRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM risk_record WHERE run_id = ?1 ORDER BY risk_id",
        )?;
        let payloads = stmt
            .query_map(params![run_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads {
            records.push(serde_json::from_str(&payload)?);
        }
        Ok(records)
    }

    pub fn append_status_change(&self, run_id: &str, change: &StatusChange) -> RiskResult<()> {
        self.conn.execute(
            "INSERT INTO risk_status_history
                 (run_id, risk_id, from_status, to_status, changed_at, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                run_id,
                change.risk_id,
                change.from.map(|s| s.as_str()),
                change.to.as_str(),
                change.at.to_rfc3339(),
                serde_json::to_string(change)?,
            ],
        )?;
        Ok(())
    }

    pub fn status_history(&self, run_id: &str, risk_id: &str) -> RiskResult<Vec<StatusChange>> {
        let mut stmt = self.conn.prepare(
            "SELECT payload FROM risk_status_history
             WHERE run_id = ?1 AND risk_id = ?2
             ORDER BY id ASC",
        )?;
        let payloads = stmt
            .query_map(params![run_id, risk_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut changes = Vec::with_capacity(payloads.len());
        for payload in payloads {
            changes.push(serde_json::from_str(&payload)?);
        }
        Ok(changes)
    }
}
