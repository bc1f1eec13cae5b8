//! End-to-end ingestion flow: provider fan-out, merge, snapshot-first
//! persistence, then an annual report folding into the same records.

use std::io::{Cursor, Write};
use std::sync::Arc;

use async_trait::async_trait;

use sundsvall::Orchestrator;
use sundsvall_model::{
    CompanyRecord, CompanyStatus, FinancialPeriod, Role, RoleCategory, normalize_orgnr,
};
use sundsvall_sources::{CompanyProvider, SourceError};
use sundsvall_store::Store;
use sundsvall_xbrl::parse_zip_bytes;

struct StaticProvider {
    name: &'static str,
    record: Option<CompanyRecord>,
}

#[async_trait]
impl CompanyProvider for StaticProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch_company(
        &self,
        _orgnr: &str,
    ) -> Result<Option<CompanyRecord>, SourceError> {
        Ok(self.record.clone())
    }
}

fn registry_record() -> CompanyRecord {
    CompanyRecord {
        name: Some("Testbolaget AB".to_string()),
        status: Some(CompanyStatus::Active),
        company_type: Some("Aktiebolag".to_string()),
        postal_city: Some("Sundsvall".to_string()),
        ..CompanyRecord::new("5560125791")
    }
}

fn scraper_record() -> CompanyRecord {
    CompanyRecord {
        name: Some("Testbolaget Aktiebolag".to_string()),
        status: Some(CompanyStatus::Inactive),
        roles: vec![Role {
            name: "Anna Svensson".to_string(),
            birth_year: Some(1975),
            role_type: "Ordförande".to_string(),
            role_category: RoleCategory::Board,
            source: "allabolag".to_string(),
        }],
        financials: vec![FinancialPeriod {
            period_year: 2024,
            period_months: 12,
            is_consolidated: false,
            source: "allabolag".to_string(),
            total_assets: Some(20_000_000),
            ..FinancialPeriod::default()
        }],
        ..CompanyRecord::new("5560125791")
    }
}

const REPORT_XHTML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
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
  <p><ix:nonNumeric name="se-cd-base:RakenskapsarSistaDag" contextRef="period0">2024-12-31</ix:nonNumeric></p>
  <td><ix:nonFraction name="se-gen-base:Nettoomsattning" contextRef="period0" unitRef="SEK" decimals="-3" scale="3">12 345</ix:nonFraction></td>
</body>
</html>"#;

fn report_zip() -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    let mut writer = zip::ZipWriter::new(&mut buf);
    writer
        .start_file("arsredovisning.xhtml", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(REPORT_XHTML.as_bytes()).unwrap();
    writer.finish().unwrap();
    buf.into_inner()
}

#[tokio::test]
async fn test_full_ingestion_flow() {
    let store = Arc::new(Store::in_memory().unwrap());
    let orchestrator = Orchestrator::new(
        store.clone(),
        Arc::new(StaticProvider {
            name: "bolagsverket",
            record: Some(registry_record()),
        }),
        Arc::new(StaticProvider {
            name: "allabolag",
            record: Some(scraper_record()),
        }),
        24,
    );

    // 1. First lookup fans out, merges with registry-wins identity, and
    //    persists with provenance.
    let record = orchestrator
        .get_company("556012-5791", false)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.orgnr, normalize_orgnr("556012-5791"));
    assert_eq!(record.name.as_deref(), Some("Testbolaget AB"));
    assert_eq!(record.status, Some(CompanyStatus::Active));
    assert_eq!(record.source_basic.as_deref(), Some("bolagsverket"));
    assert_eq!(record.source_financials.as_deref(), Some("allabolag"));
    assert_eq!(record.roles.len(), 1);
    assert_eq!(record.financials.len(), 1);
    assert!(!record.from_cache);

    // 2. Second lookup is served from the cache.
    let cached = orchestrator
        .get_company("5560125791", false)
        .await
        .unwrap()
        .unwrap();
    assert!(cached.from_cache);

    // 3. The annual report folds into the same financial row, preserving
    //    the scraped balance-sheet total.
    let parsed = parse_zip_bytes(&report_zip()).unwrap();
    let report_id = store.store_annual_report(&parsed, Some("doc-1")).unwrap();

    let financials = store.get_financials("5560125791").unwrap();
    assert_eq!(financials.len(), 1);
    assert_eq!(financials[0].revenue, Some(12_345_000));
    assert_eq!(financials[0].total_assets, Some(20_000_000));
    assert_eq!(financials[0].source_annual_report_id, Some(report_id));

    // 4. A forced refresh snapshots the prior state before updating.
    orchestrator
        .get_company("5560125791", true)
        .await
        .unwrap()
        .unwrap();
    let history = store.get_company_history("5560125791").unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].data.contains("Testbolaget AB"));
}
