//! Allabolag scraper.
//!
//! Primary source for financials, board and management roles, corporate
//! structure, trademarks and announcements. The pages embed a Next.js
//! JSON payload in a `<script id="__NEXT_DATA__">` tag; parsing is purely
//! structural on the decoded JSON, there is no DOM walking beyond locating
//! the script element.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;

use sundsvall_model::{
    Announcement, CompanyRecord, CompanyStatus, FinancialPeriod, Industry, RelatedCompany, Role,
    RoleCategory, SearchHit, Trademark, normalize_orgnr,
};
use sundsvall_net::{Gateway, NetError};

use crate::error::Result;
use crate::provider::CompanyProvider;

/// Breaker key and provenance name for this source.
pub const SOURCE_NAME: &str = "allabolag";

/// Production base URL.
pub const BASE_URL: &str = "https://www.allabolag.se";

/// Scraper for allabolag.se.
#[derive(Debug)]
pub struct AllabolagScraper {
    gateway: Arc<Gateway>,
    base_url: String,
}

impl AllabolagScraper {
    /// Create a scraper against the production site.
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self::with_base_url(gateway, BASE_URL)
    }

    /// Create a scraper against an explicit base URL (tests).
    pub fn with_base_url(gateway: Arc<Gateway>, base_url: &str) -> Self {
        Self {
            gateway,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Scrape complete company data.
    ///
    /// The summary page and the organisation page are fetched in parallel;
    /// the organisation page is optional and only contributes group links.
    pub async fn get_company(&self, orgnr: &str) -> Result<Option<CompanyRecord>> {
        let clean = normalize_orgnr(orgnr);
        let main_url = format!("{}/{}", self.base_url, clean);
        let org_url = format!("{}/{}/organisation", self.base_url, clean);

        let (main_html, org_html) =
            tokio::join!(self.fetch_page(&main_url), self.fetch_page(&org_url));

        let Some(main_html) = main_html? else {
            return Ok(None);
        };
        let org_html = org_html.unwrap_or_else(|e| {
            tracing::warn!(orgnr = %clean, error = %e, "organisation page fetch failed");
            None
        });

        let Some(main_data) = extract_embedded_json(&main_html) else {
            tracing::warn!(orgnr = %clean, "no embedded JSON payload found");
            return Ok(None);
        };
        let org_data = org_html.as_deref().and_then(extract_embedded_json);

        let record = structure_company(&main_data, org_data.as_ref(), &clean);
        tracing::info!(orgnr = %clean, "scraped from allabolag");
        Ok(Some(record))
    }

    /// Search for companies by free text.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let request = self
            .gateway
            .client()
            .get(format!("{}/sok", self.base_url))
            .query(&[("q", query)])
            .build()
            .map_err(NetError::from)?;

        let html = match self.gateway.execute(SOURCE_NAME, request).await {
            Ok(response) => response.text().await.map_err(NetError::from)?,
            Err(NetError::Status { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let Some(data) = extract_embedded_json(&html) else {
            return Ok(Vec::new());
        };
        Ok(structure_search_hits(&data, limit))
    }

    /// Fetch one page; `Ok(None)` on 404.
    async fn fetch_page(&self, url: &str) -> Result<Option<String>> {
        let request = self
            .gateway
            .client()
            .get(url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "sv-SE,sv;q=0.9,en-US;q=0.8,en;q=0.7")
            .build()
            .map_err(NetError::from)?;

        match self.gateway.execute(SOURCE_NAME, request).await {
            Ok(response) => Ok(Some(response.text().await.map_err(NetError::from)?)),
            Err(NetError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CompanyProvider for AllabolagScraper {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn fetch_company(&self, orgnr: &str) -> Result<Option<CompanyRecord>> {
        self.get_company(orgnr).await
    }
}

/// Extract the embedded JSON payload from a page.
///
/// Prefers the Next.js `__NEXT_DATA__` script; falls back to the legacy
/// `window.__INITIAL_DATA__ = {...};` assignment.
pub fn extract_embedded_json(html: &str) -> Option<Value> {
    let document = Html::parse_document(html);

    if let Ok(selector) = Selector::parse("script#__NEXT_DATA__") {
        if let Some(script) = document.select(&selector).next() {
            let text: String = script.text().collect();
            if let Ok(data) = serde_json::from_str::<Value>(&text) {
                if let Some(page_props) = data.pointer("/props/pageProps") {
                    if page_props.get("company").is_some() {
                        return Some(page_props.clone());
                    }
                }
            }
        }
    }

    // Legacy format: a plain script assigning window.__INITIAL_DATA__.
    if let Ok(selector) = Selector::parse("script") {
        for script in document.select(&selector) {
            let text: String = script.text().collect();
            if let Some(idx) = text.find("window.__INITIAL_DATA__") {
                if let Some(json) = extract_balanced_json(&text[idx..]) {
                    if let Ok(data) = serde_json::from_str::<Value>(json) {
                        return Some(data);
                    }
                }
            }
        }
    }

    None
}

/// Slice out the first balanced `{...}` object in a script fragment.
fn extract_balanced_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Structure the extracted payload into a partial record.
fn structure_company(main_data: &Value, org_data: Option<&Value>, orgnr: &str) -> CompanyRecord {
    let company = main_data.get("company").cloned().unwrap_or(Value::Null);
    let mut record = CompanyRecord::new(orgnr);

    record.name = str_of(&company, "name").or_else(|| str_of(&company, "legalName"));
    record.company_type = company
        .pointer("/companyType/code")
        .and_then(Value::as_str)
        .map(String::from);
    record.status = company
        .pointer("/status/status")
        .and_then(Value::as_str)
        .map(CompanyStatus::from_db_str);
    record.purpose = str_of(&company, "purpose");
    record.registered_date = str_of(&company, "registrationDate");
    record.foundation_year = company
        .get("foundationYear")
        .and_then(value_to_i64)
        .map(|y| y as i32);

    if let Some(postal) = company.get("postalAddress") {
        record.postal_street = str_of(postal, "addressLine");
        record.postal_code = str_of(postal, "zipCode");
        record.postal_city = str_of(postal, "postPlace");
    }
    if let Some(visitor) = company.get("visitorAddress") {
        record.visiting_street = str_of(visitor, "addressLine");
        record.visiting_code = str_of(visitor, "zipCode");
        record.visiting_city = str_of(visitor, "postPlace");
    }

    record.phone = str_of(&company, "phone").or_else(|| str_of(&company, "legalPhone"));
    record.email = str_of(&company, "email");
    record.website = str_of(&company, "homePage");

    if let Some(location) = company.get("location") {
        record.municipality = str_of(location, "municipality");
        record.county = str_of(location, "county");
    }

    record.lei_code = str_of(&company, "leiCode").or_else(|| str_of(&company, "lei"));

    // Registrations: direct boolean fields, F-skatt from the VAT
    // description or the registry status entries.
    record.moms_registered = company.get("registeredForVat").and_then(Value::as_bool);
    record.employer_registered = company
        .get("registeredForPayrollTax")
        .and_then(Value::as_bool);

    let mut has_fskatt = str_of(&company, "registeredForVatDescription")
        .map(|d| d.to_lowercase().contains("f-skatt"))
        .unwrap_or(false);
    if let Some(entries) = company.get("registryStatusEntries").and_then(Value::as_array) {
        for entry in entries {
            if str_of(entry, "label").as_deref() == Some("registeredForPrepayment")
                && entry.get("value").and_then(Value::as_bool) == Some(true)
            {
                has_fskatt = true;
                break;
            }
        }
    }
    record.f_skatt = Some(has_fskatt);

    // Group structure, with the direct parent field as fallback.
    if let Some(corp) = company.get("corporateStructure") {
        let subsidiaries = corp
            .get("numberOfSubsidiaries")
            .and_then(value_to_i64)
            .unwrap_or(0);
        record.is_group = Some(subsidiaries > 0);
        record.companies_in_group = corp
            .get("numberOfCompanies")
            .and_then(value_to_i64)
            .filter(|n| *n > 0);
        record.parent_orgnr = str_of(corp, "parentCompanyOrganisationNumber");
        record.parent_name = str_of(corp, "parentCompanyName");
    }
    if record.parent_orgnr.is_none() {
        if let Some(parent) = company.get("parent") {
            record.parent_orgnr =
                str_of(parent, "orgnr").or_else(|| str_of(parent, "organizationNumber"));
            record.parent_name = str_of(parent, "name").or_else(|| str_of(parent, "namn"));
        }
    }

    record.share_capital = company.get("shareCapital").and_then(value_to_i64);

    // Summary figures; the site reports them in TSEK.
    record.revenue = company
        .get("revenue")
        .and_then(value_to_f64)
        .map(|v| (v * 1000.0).round() as i64);
    record.net_profit = company
        .get("profit")
        .and_then(value_to_f64)
        .map(|v| (v * 1000.0).round() as i64);
    record.num_employees = parse_employee_count(company.get("numberOfEmployees"));

    // Industries: "71110 Arkitektverksamhet" strings.
    if let Some(nace) = company.get("naceIndustries").and_then(Value::as_array) {
        for entry in nace.iter().filter_map(Value::as_str) {
            if let Some((code, description)) = entry.split_once(' ') {
                record.industries.push(Industry {
                    sni_code: code.to_string(),
                    sni_description: Some(description.to_string()),
                    is_primary: record.industries.is_empty(),
                    source: SOURCE_NAME.to_string(),
                });
            }
        }
    }

    // Financial periods from company and consolidated accounts.
    for (key, consolidated) in [("companyAccounts", false), ("corporateAccounts", true)] {
        if let Some(periods) = company.get(key).and_then(Value::as_array) {
            for period in periods {
                if let Some(fin) = parse_financial_period(period, consolidated) {
                    record.financials.push(fin);
                }
            }
        }
    }

    // Backfill summary figures from the latest non-consolidated period.
    if let Some(latest) = record.financials.iter().find(|f| !f.is_consolidated) {
        let latest = latest.clone();
        if record.revenue.is_none() {
            record.revenue = latest.revenue;
        }
        if record.net_profit.is_none() {
            record.net_profit = latest.net_profit;
        }
        if record.num_employees.is_none() {
            record.num_employees = latest.num_employees;
        }
        record.total_assets = latest.total_assets;
        record.equity = latest.equity;
        record.equity_ratio = latest.equity_ratio;
        record.return_on_equity = latest.return_on_equity;
    }

    // Roles grouped by Management / Board / Revision / Other.
    if let Some(groups) = company.pointer("/roles/roleGroups").and_then(Value::as_array) {
        for group in groups {
            let group_name = str_of(group, "name").unwrap_or_default();
            let Some(entries) = group.get("roles").and_then(Value::as_array) else {
                continue;
            };
            for entry in entries {
                // Company entries denote the audit firm, not a person.
                if str_of(entry, "type").as_deref() == Some("Company") {
                    continue;
                }
                let Some(name) = str_of(entry, "name") else {
                    continue;
                };
                let role_type = str_of(entry, "role").unwrap_or_default();
                let role_category = RoleCategory::from_role_type(&role_type)
                    .unwrap_or_else(|| RoleCategory::from_group_name(&group_name));
                record.roles.push(Role {
                    name,
                    birth_year: parse_birth_year(str_of(entry, "birthDate").as_deref()),
                    role_type,
                    role_category,
                    source: SOURCE_NAME.to_string(),
                });
            }
        }
    }

    // Fallback: at least keep the contact person.
    if record.roles.is_empty() {
        if let Some(contact) = company.get("contactPerson") {
            if let Some(name) = str_of(contact, "name") {
                let role_type = str_of(contact, "role").unwrap_or_default();
                let role_category =
                    RoleCategory::from_role_type(&role_type).unwrap_or(RoleCategory::Board);
                record.roles.push(Role {
                    name,
                    birth_year: parse_birth_year(str_of(contact, "birthDate").as_deref()),
                    role_type,
                    role_category,
                    source: SOURCE_NAME.to_string(),
                });
            }
        }
    }

    // Related companies come from the organisation page.
    if let Some(org_data) = org_data {
        let subsidiaries = org_data
            .pointer("/companyOverview/dotterbolag")
            .and_then(Value::as_array)
            .or_else(|| org_data.get("relatedCompanies").and_then(Value::as_array))
            .or_else(|| {
                org_data
                    .pointer("/company/relatedCompanies")
                    .and_then(Value::as_array)
            });
        if let Some(subsidiaries) = subsidiaries {
            for rel in subsidiaries.iter().filter(|r| r.is_object()) {
                record.related_companies.push(RelatedCompany {
                    related_orgnr: str_of(rel, "orgnr").or_else(|| str_of(rel, "orgNumber")),
                    related_name: str_of(rel, "namn").or_else(|| str_of(rel, "name")),
                    relation_type: str_of(rel, "relation_type")
                        .unwrap_or_else(|| "subsidiary".to_string()),
                    source: SOURCE_NAME.to_string(),
                });
            }
        }
    }

    // Trademarks live next to the company in the page payload.
    if let Some(trademarks) = main_data
        .pointer("/trademarks/trademarks")
        .and_then(Value::as_array)
    {
        for tm in trademarks {
            let Some(name) = str_of(tm, "title") else {
                continue;
            };
            let registration = tm.get("registration").cloned().unwrap_or(Value::Null);
            let registration_id = str_of(&registration, "id");
            record.trademarks.push(Trademark {
                name,
                status: Some(if registration_id.is_some() {
                    "registered".to_string()
                } else {
                    "pending".to_string()
                }),
                registration_number: registration_id,
                class_codes: None,
                registration_date: str_of(&registration, "date"),
                expiry_date: str_of(&registration, "expiry"),
                source: SOURCE_NAME.to_string(),
            });
        }
    }

    // Announcements, capped to the ten most recent.
    let announcements = company
        .get("announcements")
        .and_then(Value::as_array)
        .or_else(|| company.get("kungorelser").and_then(Value::as_array))
        .or_else(|| main_data.get("announcements").and_then(Value::as_array));
    if let Some(announcements) = announcements {
        for ann in announcements.iter().take(10) {
            record.announcements.push(Announcement {
                announcement_type: str_of(ann, "type").or_else(|| str_of(ann, "typ")),
                announcement_date: str_of(ann, "date").or_else(|| str_of(ann, "datum")),
                description: str_of(ann, "text").or_else(|| str_of(ann, "description")),
                source: SOURCE_NAME.to_string(),
            });
        }
    }

    record
}

/// Parse one financial period from the accounts array.
///
/// Amounts are reported in TSEK and converted to SEK, except for the
/// codes carrying counts or percentages.
fn parse_financial_period(period: &Value, is_consolidated: bool) -> Option<FinancialPeriod> {
    let year = period.get("year").and_then(value_to_i64)? as i32;
    let period_months = period
        .get("length")
        .and_then(value_to_i64)
        .unwrap_or(12) as i32;

    let mut fin = FinancialPeriod {
        period_year: year,
        period_months,
        is_consolidated,
        source: SOURCE_NAME.to_string(),
        ..FinancialPeriod::default()
    };

    if let Some(accounts) = period.get("accounts").and_then(Value::as_array) {
        for account in accounts {
            let Some(code) = str_of(account, "code") else {
                continue;
            };
            let Some(amount) = account.get("amount").and_then(value_to_f64) else {
                continue;
            };
            apply_account(&mut fin, &code, amount);
        }
    }

    Some(fin)
}

/// Map one account line onto the period's fields.
fn apply_account(fin: &mut FinancialPeriod, code: &str, amount: f64) {
    // Amounts are in TSEK except for counts and percentages, which are
    // preserved as reported.
    let sek = || Some((amount * 1000.0).round() as i64);
    let count = || Some(amount.round() as i64);

    match code {
        // Income statement
        "SDI" => fin.revenue = sek(),
        "AVI" => fin.other_income = sek(),
        "RRK" => fin.operating_costs = sek(),
        "RVK" => fin.raw_materials = sek(),
        "HVK" => fin.goods = sek(),
        "ADI" => fin.depreciation_intangible = sek(),
        "ADK" => fin.depreciation_tangible = sek(),
        "AEK" => fin.other_external_costs = sek(),
        "LFL" => fin.inventory_change = sek(),
        "RR" => fin.operating_profit = sek(),
        "FI" => fin.financial_income = sek(),
        "FK" => fin.financial_costs = sek(),
        "RFFN" => fin.profit_after_financial = sek(),
        "DR" => fin.net_profit = sek(),

        // Balance sheet, assets
        "SIA" => fin.intangible_assets = sek(),
        "SMA" => fin.tangible_assets = sek(),
        "SFA" => fin.financial_assets = sek(),
        "SVL" => fin.inventory = sek(),
        "SKG" => fin.receivables = sek(),
        "SKO" => fin.cash = sek(),
        "SGE" => fin.total_assets = sek(),

        // Balance sheet, equity and liabilities
        "AKT" => fin.share_capital = sek(),
        "SEK" => fin.equity = sek(),
        "SOB" => fin.untaxed_reserves = sek(),
        "SAS" => fin.provisions = sek(),
        "SLS" => fin.long_term_liabilities = sek(),
        "SKS" => fin.short_term_liabilities = sek(),

        // Key ratios, kept as percentages
        "avk_eget_kapital" => fin.return_on_equity = Some(amount),
        "avk_totalt_kapital" => fin.return_on_assets = Some(amount),
        "EKA" => fin.equity_ratio = Some(amount),
        "RG" => fin.profit_margin = Some(amount),
        "kassalikviditet" => fin.quick_ratio = Some(amount),

        // Personnel
        "ANT" => fin.num_employees = count(),
        "loner_styrelse_vd" => fin.salaries_board_ceo = sek(),
        "loner_ovriga" => fin.salaries_other = sek(),
        "sociala_avgifter" => fin.social_costs = sek(),
        "RPE" => fin.revenue_per_employee = count(),

        _ => {}
    }
}

/// Birth year from a date string like `01.02.1989`.
fn parse_birth_year(birth_date: Option<&str>) -> Option<i32> {
    let parts: Vec<&str> = birth_date?.split('.').collect();
    if parts.len() >= 3 {
        parts[2].parse().ok()
    } else {
        None
    }
}

/// Employee counts can be an integer or a range like "1-4".
fn parse_employee_count(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => {
            let first = s.split('-').next()?.trim();
            first.parse().ok()
        }
        _ => None,
    }
}

/// Parse search-page payload into summary hits.
fn structure_search_hits(data: &Value, limit: usize) -> Vec<SearchHit> {
    data.pointer("/searchResults/companies")
        .and_then(Value::as_array)
        .map(|companies| {
            companies
                .iter()
                .take(limit)
                .filter_map(|item| {
                    Some(SearchHit {
                        orgnr: str_of(item, "orgnr")?,
                        name: str_of(item, "namn").or_else(|| str_of(item, "name")),
                        city: str_of(item, "ort"),
                        status: str_of(item, "status"),
                        source: SOURCE_NAME.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn str_of(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}
