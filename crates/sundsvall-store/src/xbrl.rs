//! Annual-report and XBRL-fact persistence.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use sundsvall_xbrl::{Availability, FactCategory, FactValue, ParseResult};

use crate::error::{Result, StoreError};
use crate::store::Store;

/// Facts are bulk-inserted in batches of this size.
const FACT_BATCH_SIZE: usize = 100;

/// One stored annual-report row.
#[derive(Debug, Clone)]
pub struct AnnualReportRow {
    /// Row id, referenced by fact rows and financials provenance.
    pub id: i64,
    /// Company orgnr.
    pub company_orgnr: String,
    /// Upstream document id.
    pub document_id: Option<String>,
    /// Fiscal year (year of the period end date).
    pub fiscal_year: i32,
    /// Fiscal year start date.
    pub fiscal_year_start: Option<String>,
    /// Fiscal year end date.
    pub fiscal_year_end: Option<String>,
    /// Number of facts extracted.
    pub total_facts_extracted: i64,
    /// Namespace prefixes seen in the document.
    pub namespaces_used: Vec<String>,
    /// Whether the report carries an audit.
    pub is_audited: bool,
    /// `pending`, `processed` or `failed`.
    pub processing_status: String,
    /// Auditor first name.
    pub auditor_first_name: Option<String>,
    /// Auditor last name.
    pub auditor_last_name: Option<String>,
    /// Audit firm.
    pub audit_firm: Option<String>,
    /// Audit completion date.
    pub audit_completion_date: Option<String>,
    /// Audit opinion text.
    pub audit_opinion: Option<String>,
}

/// One stored XBRL fact row.
#[derive(Debug, Clone)]
pub struct XbrlFactRow {
    /// Owning annual report.
    pub annual_report_id: i64,
    /// Company orgnr.
    pub company_orgnr: String,
    /// Qualified name.
    pub xbrl_name: String,
    /// Namespace prefix.
    pub namespace: String,
    /// Local name.
    pub local_name: String,
    /// Context reference.
    pub context_ref: String,
    /// Period classification.
    pub period_type: String,
    /// Numeric value, when numeric.
    pub value_numeric: Option<f64>,
    /// Text value, when textual.
    pub value_text: Option<String>,
    /// Boolean value (reserved; facts never carry one today).
    pub value_boolean: Option<bool>,
    /// Unit reference.
    pub unit_ref: Option<String>,
    /// Decimals attribute.
    pub decimals: Option<i32>,
    /// Scale attribute.
    pub scale: Option<i32>,
    /// Category by namespace.
    pub category: String,
    /// Availability class.
    pub availability: String,
}

impl Store {
    /// Persist a parsed annual report: metadata, facts, audit and board
    /// history, and the matching financials row.
    ///
    /// The report row is upserted on `(orgnr, fiscal_year)`, prior fact
    /// rows for the report are deleted and the new set bulk-inserted, and
    /// the current-year figures are folded into `financials` without
    /// clobbering columns the report does not carry.
    ///
    /// Returns the annual-report row id.
    pub fn store_annual_report(
        &self,
        result: &ParseResult,
        document_id: Option<&str>,
    ) -> Result<i64> {
        let orgnr = result.company.orgnr.clone();
        if orgnr.is_empty() {
            return Err(StoreError::MissingOrgnr);
        }
        let fiscal_year = result
            .fiscal_year()
            .ok_or_else(|| StoreError::MissingFiscalYear(orgnr.clone()))?;

        let now = Utc::now().to_rfc3339();
        let namespaces = serde_json::to_string(&result.namespaces)?;
        let audit = result.audit.as_ref();

        let report_id: i64 = {
            let conn = self.lock();
            conn.execute(
                "INSERT INTO annual_reports (
                    company_orgnr, document_id, fiscal_year, fiscal_year_start, fiscal_year_end,
                    total_facts_extracted, namespaces_used, is_audited, processing_status,
                    auditor_first_name, auditor_last_name, audit_firm,
                    audit_completion_date, audit_opinion,
                    created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'processed', ?9, ?10, ?11, ?12, ?13, ?14, ?14)
                ON CONFLICT(company_orgnr, fiscal_year) DO UPDATE SET
                    document_id = excluded.document_id,
                    fiscal_year_start = excluded.fiscal_year_start,
                    fiscal_year_end = excluded.fiscal_year_end,
                    total_facts_extracted = excluded.total_facts_extracted,
                    namespaces_used = excluded.namespaces_used,
                    is_audited = excluded.is_audited,
                    processing_status = 'processed',
                    auditor_first_name = excluded.auditor_first_name,
                    auditor_last_name = excluded.auditor_last_name,
                    audit_firm = excluded.audit_firm,
                    audit_completion_date = excluded.audit_completion_date,
                    audit_opinion = excluded.audit_opinion,
                    updated_at = excluded.updated_at",
                params![
                    orgnr,
                    document_id,
                    fiscal_year,
                    result.company.fiscal_year_start.map(|d| d.to_string()),
                    result.company.fiscal_year_end.map(|d| d.to_string()),
                    result.facts.len() as i64,
                    namespaces,
                    i64::from(audit.is_some()),
                    audit.and_then(|a| a.auditor_first_name.clone()),
                    audit.and_then(|a| a.auditor_last_name.clone()),
                    audit.and_then(|a| a.audit_firm.clone()),
                    audit.and_then(|a| a.audit_completion_date.map(|d| d.to_string())),
                    audit.and_then(|a| a.audit_opinion.clone()),
                    now,
                ],
            )?;

            conn.query_row(
                "SELECT id FROM annual_reports WHERE company_orgnr = ?1 AND fiscal_year = ?2",
                params![orgnr, fiscal_year],
                |row| row.get(0),
            )?
        };

        self.replace_xbrl_facts(report_id, &orgnr, result)?;

        if let Some(audit) = audit {
            self.lock().execute(
                "INSERT INTO audit_history (
                    company_orgnr, fiscal_year, auditor_first_name, auditor_last_name,
                    audit_firm, audit_completion_date, audit_opinion, source
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'xbrl')
                ON CONFLICT(company_orgnr, fiscal_year) DO UPDATE SET
                    auditor_first_name = excluded.auditor_first_name,
                    auditor_last_name = excluded.auditor_last_name,
                    audit_firm = excluded.audit_firm,
                    audit_completion_date = excluded.audit_completion_date,
                    audit_opinion = excluded.audit_opinion",
                params![
                    orgnr,
                    fiscal_year,
                    audit.auditor_first_name,
                    audit.auditor_last_name,
                    audit.audit_firm,
                    audit.audit_completion_date.map(|d| d.to_string()),
                    audit.audit_opinion,
                ],
            )?;
        }

        if let Some(board) = &result.board {
            let conn = self.lock();
            conn.execute(
                "DELETE FROM board_history WHERE company_orgnr = ?1 AND fiscal_year = ?2",
                params![orgnr, fiscal_year],
            )?;
            conn.execute(
                "INSERT INTO board_history
                    (company_orgnr, fiscal_year, percent_women, percent_men, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'xbrl', ?5)",
                params![
                    orgnr,
                    fiscal_year,
                    board.percent_women.and_then(|d| d.to_f64()),
                    board.percent_men.and_then(|d| d.to_f64()),
                    now,
                ],
            )?;
        }

        self.update_financials_from_report(&orgnr, fiscal_year, result, report_id)?;

        tracing::info!(
            orgnr = %orgnr,
            fiscal_year,
            facts = result.facts.len(),
            "stored annual report"
        );
        Ok(report_id)
    }

    /// Wholesale replacement of a report's fact rows.
    fn replace_xbrl_facts(&self, report_id: i64, orgnr: &str, result: &ParseResult) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();

        conn.execute(
            "DELETE FROM xbrl_facts WHERE annual_report_id = ?1",
            params![report_id],
        )?;

        for chunk in result.facts.chunks(FACT_BATCH_SIZE) {
            let tx = conn.unchecked_transaction()?;
            for fact in chunk {
                let (value_numeric, value_text) = match &fact.value {
                    FactValue::Number(d) => (d.to_f64(), None),
                    FactValue::Text(t) => (None, Some(t.clone())),
                    FactValue::Missing => (None, None),
                };

                tx.execute(
                    "INSERT INTO xbrl_facts (
                        annual_report_id, company_orgnr, xbrl_name, namespace, local_name,
                        context_ref, period_type, value_numeric, value_text, value_boolean,
                        unit_ref, decimals, scale, category, availability, created_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        report_id,
                        orgnr,
                        fact.name,
                        fact.namespace(),
                        fact.local_name(),
                        fact.context_ref,
                        fact.period_type.as_str(),
                        value_numeric,
                        value_text,
                        fact.unit_ref,
                        fact.decimals,
                        fact.scale,
                        FactCategory::from_namespace(fact.namespace()).as_str(),
                        Availability::of(&fact.name).as_str(),
                        now,
                    ],
                )?;
            }
            tx.commit()?;
        }

        Ok(())
    }

    /// Fold current-year figures into the financials row for the fiscal
    /// year. Monetary amounts are rounded to whole SEK; columns the report
    /// does not carry are left untouched on update.
    fn update_financials_from_report(
        &self,
        orgnr: &str,
        fiscal_year: i32,
        result: &ParseResult,
        report_id: i64,
    ) -> Result<()> {
        let Some(current) = result.current_year() else {
            return Ok(());
        };

        let sek = |d: &Option<Decimal>| d.as_ref().and_then(|v| v.round().to_i64());
        let ratio = |d: &Option<Decimal>| d.as_ref().and_then(|v| v.to_f64());

        let now = Utc::now().to_rfc3339();
        self.lock().execute(
            "INSERT INTO financials (
                company_orgnr, period_year, is_consolidated, period_months, source,
                revenue, operating_profit, net_profit, profit_after_financial,
                profit_before_tax, operating_costs, other_external_costs, personnel_costs,
                total_assets, fixed_assets, current_assets, receivables, cash,
                equity, share_capital, restricted_equity, unrestricted_equity,
                retained_earnings, short_term_liabilities,
                equity_ratio, num_employees, source_annual_report_id, created_at
            ) VALUES (?1, ?2, 0, 12, 'xbrl',
                      ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                      ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)
            ON CONFLICT(company_orgnr, period_year, is_consolidated) DO UPDATE SET
                revenue = COALESCE(excluded.revenue, revenue),
                operating_profit = COALESCE(excluded.operating_profit, operating_profit),
                net_profit = COALESCE(excluded.net_profit, net_profit),
                profit_after_financial =
                    COALESCE(excluded.profit_after_financial, profit_after_financial),
                profit_before_tax = COALESCE(excluded.profit_before_tax, profit_before_tax),
                operating_costs = COALESCE(excluded.operating_costs, operating_costs),
                other_external_costs =
                    COALESCE(excluded.other_external_costs, other_external_costs),
                personnel_costs = COALESCE(excluded.personnel_costs, personnel_costs),
                total_assets = COALESCE(excluded.total_assets, total_assets),
                fixed_assets = COALESCE(excluded.fixed_assets, fixed_assets),
                current_assets = COALESCE(excluded.current_assets, current_assets),
                receivables = COALESCE(excluded.receivables, receivables),
                cash = COALESCE(excluded.cash, cash),
                equity = COALESCE(excluded.equity, equity),
                share_capital = COALESCE(excluded.share_capital, share_capital),
                restricted_equity = COALESCE(excluded.restricted_equity, restricted_equity),
                unrestricted_equity =
                    COALESCE(excluded.unrestricted_equity, unrestricted_equity),
                retained_earnings = COALESCE(excluded.retained_earnings, retained_earnings),
                short_term_liabilities =
                    COALESCE(excluded.short_term_liabilities, short_term_liabilities),
                equity_ratio = COALESCE(excluded.equity_ratio, equity_ratio),
                num_employees = COALESCE(excluded.num_employees, num_employees),
                source_annual_report_id = excluded.source_annual_report_id",
            params![
                orgnr,
                fiscal_year,
                sek(&current.revenue),
                sek(&current.operating_profit),
                sek(&current.net_profit),
                sek(&current.profit_after_financial),
                sek(&current.profit_before_tax),
                sek(&current.operating_costs),
                sek(&current.other_external_costs),
                sek(&current.personnel_costs),
                sek(&current.total_assets),
                sek(&current.fixed_assets),
                sek(&current.current_assets),
                sek(&current.receivables),
                sek(&current.cash),
                sek(&current.equity),
                sek(&current.share_capital),
                sek(&current.restricted_equity),
                sek(&current.unrestricted_equity),
                sek(&current.retained_earnings),
                sek(&current.current_liabilities),
                ratio(&current.equity_ratio),
                sek(&current.num_employees),
                report_id,
                now,
            ],
        )?;

        Ok(())
    }

    /// Mark a stored report as failed.
    ///
    /// Reports that were never stored are skipped silently; returns
    /// whether a row was updated.
    pub fn mark_report_failed(&self, orgnr: &str, fiscal_year: i32) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let updated = self.lock().execute(
            "UPDATE annual_reports SET processing_status = 'failed', updated_at = ?3
             WHERE company_orgnr = ?1 AND fiscal_year = ?2",
            params![orgnr, fiscal_year, now],
        )?;
        Ok(updated > 0)
    }

    /// Annual report metadata for a company and fiscal year.
    pub fn get_annual_report(&self, orgnr: &str, fiscal_year: i32) -> Result<Option<AnnualReportRow>> {
        let conn = self.lock();
        let report = conn
            .query_row(
                "SELECT id, company_orgnr, document_id, fiscal_year, fiscal_year_start,
                        fiscal_year_end, total_facts_extracted, namespaces_used, is_audited,
                        processing_status, auditor_first_name, auditor_last_name, audit_firm,
                        audit_completion_date, audit_opinion
                 FROM annual_reports WHERE company_orgnr = ?1 AND fiscal_year = ?2",
                params![orgnr, fiscal_year],
                row_to_report,
            )
            .optional()?;
        Ok(report)
    }

    /// All annual reports for a company, newest first.
    pub fn get_annual_reports_for_company(&self, orgnr: &str) -> Result<Vec<AnnualReportRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, company_orgnr, document_id, fiscal_year, fiscal_year_start,
                    fiscal_year_end, total_facts_extracted, namespaces_used, is_audited,
                    processing_status, auditor_first_name, auditor_last_name, audit_firm,
                    audit_completion_date, audit_opinion
             FROM annual_reports WHERE company_orgnr = ?1 ORDER BY fiscal_year DESC",
        )?;
        let reports = stmt
            .query_map(params![orgnr], row_to_report)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(reports)
    }

    /// XBRL facts for a company, optionally filtered by fiscal year and
    /// namespace.
    pub fn get_xbrl_facts(
        &self,
        orgnr: &str,
        fiscal_year: Option<i32>,
        namespace: Option<&str>,
    ) -> Result<Vec<XbrlFactRow>> {
        let report_id = match fiscal_year {
            Some(year) => match self.get_annual_report(orgnr, year)? {
                Some(report) => Some(report.id),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT annual_report_id, company_orgnr, xbrl_name, namespace, local_name,
                    context_ref, period_type, value_numeric, value_text, value_boolean,
                    unit_ref, decimals, scale, category, availability
             FROM xbrl_facts
             WHERE company_orgnr = ?1
               AND (?2 IS NULL OR annual_report_id = ?2)
               AND (?3 IS NULL OR namespace = ?3)
             ORDER BY id",
        )?;
        let facts = stmt
            .query_map(params![orgnr, report_id, namespace], |row| {
                Ok(XbrlFactRow {
                    annual_report_id: row.get(0)?,
                    company_orgnr: row.get(1)?,
                    xbrl_name: row.get(2)?,
                    namespace: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    local_name: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    context_ref: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                    period_type: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                    value_numeric: row.get(7)?,
                    value_text: row.get(8)?,
                    value_boolean: row.get::<_, Option<i64>>(9)?.map(|v| v != 0),
                    unit_ref: row.get(10)?,
                    decimals: row.get(11)?,
                    scale: row.get(12)?,
                    category: row.get::<_, Option<String>>(13)?.unwrap_or_default(),
                    availability: row.get::<_, Option<String>>(14)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    /// Processing counts over all annual reports: (total, processed,
    /// failed).
    pub fn report_processing_stats(&self) -> Result<(usize, usize, usize)> {
        let conn = self.lock();
        let total: i64 =
            conn.query_row("SELECT COUNT(*) FROM annual_reports", [], |row| row.get(0))?;
        let processed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM annual_reports WHERE processing_status = 'processed'",
            [],
            |row| row.get(0),
        )?;
        let failed: i64 = conn.query_row(
            "SELECT COUNT(*) FROM annual_reports WHERE processing_status = 'failed'",
            [],
            |row| row.get(0),
        )?;
        Ok((total as usize, processed as usize, failed as usize))
    }
}

fn row_to_report(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnnualReportRow> {
    let namespaces_json: Option<String> = row.get(7)?;
    Ok(AnnualReportRow {
        id: row.get(0)?,
        company_orgnr: row.get(1)?,
        document_id: row.get(2)?,
        fiscal_year: row.get(3)?,
        fiscal_year_start: row.get(4)?,
        fiscal_year_end: row.get(5)?,
        total_facts_extracted: row.get(6)?,
        namespaces_used: namespaces_json
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default(),
        is_audited: row.get::<_, i64>(8)? != 0,
        processing_status: row.get(9)?,
        auditor_first_name: row.get(10)?,
        auditor_last_name: row.get(11)?,
        audit_firm: row.get(12)?,
        audit_completion_date: row.get(13)?,
        audit_opinion: row.get(14)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sundsvall_xbrl::parse_document;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns:ix="http://www.xbrl.org/2013/inlineXBRL" xmlns:xbrli="http://www.xbrl.org/2003/instance">
<body>
  <xbrli:context id="period0">
    <xbrli:period>
      <xbrli:startDate>2024-01-01</xbrli:startDate>
      <xbrli:endDate>2024-12-31</xbrli:endDate>
    </xbrli:period>
  </xbrli:context>
  <p><ix:nonNumeric name="se-cd-base:ForetagetsNamn" contextRef="period0">Testbolaget AB</ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-cd-base:Organisationsnummer" contextRef="period0">556012-5791</ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-cd-base:RakenskapsarForstaDag" contextRef="period0">2024-01-01</ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-cd-base:RakenskapsarSistaDag" contextRef="period0">2024-12-31</ix:nonNumeric></p>
  <td><ix:nonFraction name="se-gen-base:Nettoomsattning" contextRef="period0" unitRef="SEK" decimals="-3" scale="3">12 345</ix:nonFraction></td>
  <td><ix:nonFraction name="se-gen-base:AretsResultat" contextRef="period0" unitRef="SEK" scale="3">1 000</ix:nonFraction></td>
  <td><ix:nonFraction name="se-gen-base:Soliditet" contextRef="period0">45,2</ix:nonFraction></td>
  <p><ix:nonNumeric name="se-ar-base:UnderskriftRevisionsberattelseRevisorTilltalsnamn" contextRef="period0">Anna</ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-ar-base:UnderskriftRevisionsberattelseRevisorEfternamn" contextRef="period0">Svensson</ix:nonNumeric></p>
</body>
</html>"#;

    fn parsed() -> ParseResult {
        parse_document(REPORT).unwrap()
    }

    #[test]
    fn test_store_annual_report_creates_rows() {
        let store = Store::in_memory().unwrap();
        let report_id = store.store_annual_report(&parsed(), Some("doc-1")).unwrap();

        let report = store.get_annual_report("5560125791", 2024).unwrap().unwrap();
        assert_eq!(report.id, report_id);
        assert_eq!(report.document_id.as_deref(), Some("doc-1"));
        assert_eq!(report.processing_status, "processed");
        assert!(report.is_audited);
        assert!(report.namespaces_used.contains(&"se-gen-base".to_string()));
        assert!(report.total_facts_extracted > 0);

        let facts = store.get_xbrl_facts("5560125791", Some(2024), None).unwrap();
        assert_eq!(facts.len() as i64, report.total_facts_extracted);

        let revenue = facts
            .iter()
            .find(|f| f.xbrl_name == "se-gen-base:Nettoomsattning")
            .unwrap();
        assert_eq!(revenue.period_type, "current");
        assert_eq!(revenue.value_numeric, Some(12_345_000.0));
        assert_eq!(revenue.category, "financial");
        assert_eq!(revenue.availability, "core");
        assert_eq!(revenue.unit_ref.as_deref(), Some("SEK"));
    }

    #[test]
    fn test_store_annual_report_updates_financials() {
        let store = Store::in_memory().unwrap();
        let report_id = store.store_annual_report(&parsed(), None).unwrap();

        let financials = store.get_financials("5560125791").unwrap();
        assert_eq!(financials.len(), 1);
        let fin = &financials[0];
        assert_eq!(fin.period_year, 2024);
        assert!(!fin.is_consolidated);
        assert_eq!(fin.source, "xbrl");
        assert_eq!(fin.revenue, Some(12_345_000));
        assert_eq!(fin.net_profit, Some(1_000_000));
        assert_eq!(fin.equity_ratio, Some(45.2));
        assert_eq!(fin.source_annual_report_id, Some(report_id));
    }

    #[test]
    fn test_store_annual_report_preserves_scraped_columns() {
        use sundsvall_model::FinancialPeriod;

        let store = Store::in_memory().unwrap();
        store
            .upsert_financials_batch(
                "5560125791",
                &[FinancialPeriod {
                    period_year: 2024,
                    period_months: 12,
                    is_consolidated: false,
                    source: "allabolag".to_string(),
                    total_assets: Some(99_000),
                    ..FinancialPeriod::default()
                }],
            )
            .unwrap();

        store.store_annual_report(&parsed(), None).unwrap();

        let fin = &store.get_financials("5560125791").unwrap()[0];
        // XBRL revenue landed, scraped total_assets survived.
        assert_eq!(fin.revenue, Some(12_345_000));
        assert_eq!(fin.total_assets, Some(99_000));
        assert_eq!(fin.source, "allabolag");
    }

    #[test]
    fn test_restore_replaces_facts_wholesale() {
        let store = Store::in_memory().unwrap();
        let first_id = store.store_annual_report(&parsed(), None).unwrap();
        let first_count = store
            .get_xbrl_facts("5560125791", Some(2024), None)
            .unwrap()
            .len();

        let second_id = store.store_annual_report(&parsed(), None).unwrap();
        let second_count = store
            .get_xbrl_facts("5560125791", Some(2024), None)
            .unwrap()
            .len();

        assert_eq!(first_id, second_id);
        assert_eq!(first_count, second_count);
    }

    #[test]
    fn test_audit_history_upserted() {
        let store = Store::in_memory().unwrap();
        store.store_annual_report(&parsed(), None).unwrap();
        store.store_annual_report(&parsed(), None).unwrap();

        let conn = store.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM audit_history WHERE company_orgnr = '5560125791'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_namespace_filter() {
        let store = Store::in_memory().unwrap();
        store.store_annual_report(&parsed(), None).unwrap();

        let gen_facts = store
            .get_xbrl_facts("5560125791", Some(2024), Some("se-gen-base"))
            .unwrap();
        assert!(!gen_facts.is_empty());
        assert!(gen_facts.iter().all(|f| f.namespace == "se-gen-base"));
    }

    #[test]
    fn test_mark_report_failed() {
        let store = Store::in_memory().unwrap();
        // Never-stored reports are skipped silently.
        assert!(!store.mark_report_failed("5560125791", 2024).unwrap());

        store.store_annual_report(&parsed(), None).unwrap();
        assert!(store.mark_report_failed("5560125791", 2024).unwrap());

        let report = store.get_annual_report("5560125791", 2024).unwrap().unwrap();
        assert_eq!(report.processing_status, "failed");
    }

    #[test]
    fn test_processing_stats() {
        let store = Store::in_memory().unwrap();
        store.store_annual_report(&parsed(), None).unwrap();
        let (total, processed, failed) = store.report_processing_stats().unwrap();
        assert_eq!((total, processed, failed), (1, 1, 0));

        store.mark_report_failed("5560125791", 2024).unwrap();
        let (_, processed, failed) = store.report_processing_stats().unwrap();
        assert_eq!((processed, failed), (0, 1));
    }
}
