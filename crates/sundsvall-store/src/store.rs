//! Canonical-record persistence.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use sundsvall_model::{
    Announcement, CompanyRecord, CompanyStatus, FinancialPeriod, Industry, RegistryEntry,
    RelatedCompany, Role, RoleCategory, SearchHit, Trademark,
};

use crate::error::{Result, StoreError};
use crate::sanitize::sanitize_search_input;

/// Cache-freshness metadata for one company.
#[derive(Debug, Clone)]
pub struct CacheMetadata {
    /// Organization number.
    pub orgnr: String,
    /// Last successful refresh.
    pub last_refresh: DateTime<Utc>,
    /// Source of the last refresh, when recorded.
    pub source: Option<String>,
}

/// One append-only history row.
#[derive(Debug, Clone)]
pub struct HistorySnapshot {
    /// When the snapshot was taken.
    pub snapshot_date: String,
    /// Full prior state serialized as JSON.
    pub data: String,
}

/// Aggregate row counts for monitoring.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Company rows.
    pub companies: usize,
    /// Role rows.
    pub roles: usize,
    /// Financial period rows.
    pub financial_periods: usize,
    /// Annual report rows.
    pub annual_reports: usize,
    /// XBRL fact rows.
    pub xbrl_facts: usize,
    /// Registry name-lookup entries.
    pub registry_entries: usize,
}

/// SQLite store for all engine entities.
///
/// The connection lives behind a mutex so an `Arc<Store>` can be shared
/// across concurrent tasks; every method takes the lock for the duration
/// of its statement(s).
#[derive(Debug)]
pub struct Store {
    pub(crate) conn: Mutex<Connection>,
}

const FINANCIAL_COLUMNS: &str = "period_year, period_months, is_consolidated, source, \
     revenue, other_income, operating_costs, raw_materials, goods, \
     depreciation_intangible, depreciation_tangible, other_external_costs, personnel_costs, \
     inventory_change, operating_profit, financial_income, financial_costs, \
     profit_after_financial, profit_before_tax, net_profit, \
     intangible_assets, tangible_assets, financial_assets, fixed_assets, inventory, \
     receivables, cash, current_assets, total_assets, \
     share_capital, equity, restricted_equity, unrestricted_equity, retained_earnings, \
     untaxed_reserves, provisions, long_term_liabilities, short_term_liabilities, \
     accounts_payable, return_on_equity, return_on_assets, equity_ratio, profit_margin, \
     quick_ratio, num_employees, salaries_board_ceo, salaries_other, social_costs, \
     revenue_per_employee, source_annual_report_id";

impl Store {
    /// Open (or create) a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// In-memory store, useful for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock();

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS companies (
                orgnr TEXT PRIMARY KEY,
                name TEXT,
                company_type TEXT,
                status TEXT,
                purpose TEXT,
                registered_date TEXT,
                foundation_year INTEGER,
                postal_street TEXT,
                postal_code TEXT,
                postal_city TEXT,
                visiting_street TEXT,
                visiting_code TEXT,
                visiting_city TEXT,
                phone TEXT,
                email TEXT,
                website TEXT,
                municipality TEXT,
                county TEXT,
                lei_code TEXT,
                f_skatt INTEGER,
                moms_registered INTEGER,
                employer_registered INTEGER,
                share_capital INTEGER,
                is_group INTEGER,
                parent_orgnr TEXT,
                parent_name TEXT,
                companies_in_group INTEGER,
                revenue INTEGER,
                net_profit INTEGER,
                total_assets INTEGER,
                equity INTEGER,
                num_employees INTEGER,
                equity_ratio REAL,
                return_on_equity REAL,
                source_basic TEXT,
                source_board TEXT,
                source_financials TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                name TEXT NOT NULL,
                birth_year INTEGER,
                role_type TEXT,
                role_category TEXT,
                source TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_roles_company ON roles(company_orgnr);

            CREATE TABLE IF NOT EXISTS financials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                period_year INTEGER NOT NULL,
                period_months INTEGER,
                is_consolidated INTEGER NOT NULL DEFAULT 0,
                source TEXT,
                revenue INTEGER,
                other_income INTEGER,
                operating_costs INTEGER,
                raw_materials INTEGER,
                goods INTEGER,
                depreciation_intangible INTEGER,
                depreciation_tangible INTEGER,
                other_external_costs INTEGER,
                personnel_costs INTEGER,
                inventory_change INTEGER,
                operating_profit INTEGER,
                financial_income INTEGER,
                financial_costs INTEGER,
                profit_after_financial INTEGER,
                profit_before_tax INTEGER,
                net_profit INTEGER,
                intangible_assets INTEGER,
                tangible_assets INTEGER,
                financial_assets INTEGER,
                fixed_assets INTEGER,
                inventory INTEGER,
                receivables INTEGER,
                cash INTEGER,
                current_assets INTEGER,
                total_assets INTEGER,
                share_capital INTEGER,
                equity INTEGER,
                restricted_equity INTEGER,
                unrestricted_equity INTEGER,
                retained_earnings INTEGER,
                untaxed_reserves INTEGER,
                provisions INTEGER,
                long_term_liabilities INTEGER,
                short_term_liabilities INTEGER,
                accounts_payable INTEGER,
                return_on_equity REAL,
                return_on_assets REAL,
                equity_ratio REAL,
                profit_margin REAL,
                quick_ratio REAL,
                num_employees INTEGER,
                salaries_board_ceo INTEGER,
                salaries_other INTEGER,
                social_costs INTEGER,
                revenue_per_employee INTEGER,
                source_annual_report_id INTEGER,
                created_at TEXT NOT NULL,
                UNIQUE(company_orgnr, period_year, is_consolidated)
            );
            CREATE INDEX IF NOT EXISTS idx_financials_company ON financials(company_orgnr);

            CREATE TABLE IF NOT EXISTS industries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                sni_code TEXT NOT NULL,
                sni_description TEXT,
                is_primary INTEGER NOT NULL DEFAULT 0,
                source TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_industries_company ON industries(company_orgnr);

            CREATE TABLE IF NOT EXISTS trademarks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                name TEXT NOT NULL,
                registration_number TEXT,
                status TEXT,
                class_codes TEXT,
                registration_date TEXT,
                expiry_date TEXT,
                source TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trademarks_company ON trademarks(company_orgnr);

            CREATE TABLE IF NOT EXISTS related_companies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                related_orgnr TEXT,
                related_name TEXT,
                relation_type TEXT,
                source TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_related_company ON related_companies(company_orgnr);

            CREATE TABLE IF NOT EXISTS announcements (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                announcement_type TEXT,
                announcement_date TEXT,
                description TEXT,
                source TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_announcements_company ON announcements(company_orgnr);

            CREATE TABLE IF NOT EXISTS companies_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                orgnr TEXT NOT NULL,
                snapshot_date TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_companies_history
                ON companies_history(orgnr, snapshot_date);

            CREATE TABLE IF NOT EXISTS roles_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                snapshot_date TEXT NOT NULL,
                roles_json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_roles_history
                ON roles_history(company_orgnr, snapshot_date);

            CREATE TABLE IF NOT EXISTS cache_metadata (
                orgnr TEXT PRIMARY KEY,
                last_refresh TEXT NOT NULL,
                source TEXT
            );

            CREATE TABLE IF NOT EXISTS company_registry (
                orgnr TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                org_form TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_registry_name ON company_registry(name);

            CREATE TABLE IF NOT EXISTS annual_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                document_id TEXT,
                fiscal_year INTEGER NOT NULL,
                fiscal_year_start TEXT,
                fiscal_year_end TEXT,
                total_facts_extracted INTEGER NOT NULL DEFAULT 0,
                namespaces_used TEXT,
                is_audited INTEGER NOT NULL DEFAULT 0,
                processing_status TEXT NOT NULL DEFAULT 'pending',
                auditor_first_name TEXT,
                auditor_last_name TEXT,
                audit_firm TEXT,
                audit_completion_date TEXT,
                audit_opinion TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(company_orgnr, fiscal_year)
            );

            CREATE TABLE IF NOT EXISTS xbrl_facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                annual_report_id INTEGER NOT NULL,
                company_orgnr TEXT NOT NULL,
                xbrl_name TEXT NOT NULL,
                namespace TEXT,
                local_name TEXT,
                context_ref TEXT,
                period_type TEXT,
                value_numeric REAL,
                value_text TEXT,
                value_boolean INTEGER,
                unit_ref TEXT,
                decimals INTEGER,
                scale INTEGER,
                category TEXT,
                availability TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_facts_report ON xbrl_facts(annual_report_id);
            CREATE INDEX IF NOT EXISTS idx_facts_company
                ON xbrl_facts(company_orgnr, namespace);

            CREATE TABLE IF NOT EXISTS audit_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                fiscal_year INTEGER NOT NULL,
                auditor_first_name TEXT,
                auditor_last_name TEXT,
                audit_firm TEXT,
                audit_completion_date TEXT,
                audit_opinion TEXT,
                source TEXT,
                UNIQUE(company_orgnr, fiscal_year)
            );

            CREATE TABLE IF NOT EXISTS board_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                company_orgnr TEXT NOT NULL,
                fiscal_year INTEGER NOT NULL,
                percent_women REAL,
                percent_men REAL,
                source TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_board_history
                ON board_history(company_orgnr, fiscal_year);",
        )?;

        Ok(())
    }

    pub(crate) fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store lock poisoned")
    }

    // =========================================================================
    // Company operations
    // =========================================================================

    /// Insert or update the company row.
    ///
    /// `updated_at` is stamped with the current time; `created_at` is only
    /// set on first insert, so it survives updates.
    pub fn upsert_company(&self, record: &CompanyRecord) -> Result<()> {
        if record.orgnr.is_empty() {
            return Err(StoreError::MissingOrgnr);
        }

        let now = Utc::now().to_rfc3339();
        let created_at = record
            .created_at
            .map_or_else(|| now.clone(), |t| t.to_rfc3339());

        let conn = self.lock();
        conn.execute(
            "INSERT INTO companies (
                orgnr, name, company_type, status, purpose, registered_date, foundation_year,
                postal_street, postal_code, postal_city,
                visiting_street, visiting_code, visiting_city,
                phone, email, website, municipality, county, lei_code,
                f_skatt, moms_registered, employer_registered,
                share_capital, is_group, parent_orgnr, parent_name, companies_in_group,
                revenue, net_profit, total_assets, equity, num_employees,
                equity_ratio, return_on_equity,
                source_basic, source_board, source_financials,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                      ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(orgnr) DO UPDATE SET
                name = excluded.name,
                company_type = excluded.company_type,
                status = excluded.status,
                purpose = excluded.purpose,
                registered_date = excluded.registered_date,
                foundation_year = excluded.foundation_year,
                postal_street = excluded.postal_street,
                postal_code = excluded.postal_code,
                postal_city = excluded.postal_city,
                visiting_street = excluded.visiting_street,
                visiting_code = excluded.visiting_code,
                visiting_city = excluded.visiting_city,
                phone = excluded.phone,
                email = excluded.email,
                website = excluded.website,
                municipality = excluded.municipality,
                county = excluded.county,
                lei_code = excluded.lei_code,
                f_skatt = excluded.f_skatt,
                moms_registered = excluded.moms_registered,
                employer_registered = excluded.employer_registered,
                share_capital = excluded.share_capital,
                is_group = excluded.is_group,
                parent_orgnr = excluded.parent_orgnr,
                parent_name = excluded.parent_name,
                companies_in_group = excluded.companies_in_group,
                revenue = excluded.revenue,
                net_profit = excluded.net_profit,
                total_assets = excluded.total_assets,
                equity = excluded.equity,
                num_employees = excluded.num_employees,
                equity_ratio = excluded.equity_ratio,
                return_on_equity = excluded.return_on_equity,
                source_basic = excluded.source_basic,
                source_board = excluded.source_board,
                source_financials = excluded.source_financials,
                updated_at = excluded.updated_at",
            params![
                record.orgnr,
                record.name,
                record.company_type,
                record.status.map(|s| s.as_str()),
                record.purpose,
                record.registered_date,
                record.foundation_year,
                record.postal_street,
                record.postal_code,
                record.postal_city,
                record.visiting_street,
                record.visiting_code,
                record.visiting_city,
                record.phone,
                record.email,
                record.website,
                record.municipality,
                record.county,
                record.lei_code,
                record.f_skatt.map(i64::from),
                record.moms_registered.map(i64::from),
                record.employer_registered.map(i64::from),
                record.share_capital,
                record.is_group.map(i64::from),
                record.parent_orgnr,
                record.parent_name,
                record.companies_in_group,
                record.revenue,
                record.net_profit,
                record.total_assets,
                record.equity,
                record.num_employees,
                record.equity_ratio,
                record.return_on_equity,
                record.source_basic,
                record.source_board,
                record.source_financials,
                created_at,
                now,
            ],
        )?;

        Ok(())
    }

    /// Whether a company row exists.
    pub fn company_exists(&self, orgnr: &str) -> Result<bool> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM companies WHERE orgnr = ?1",
            params![orgnr],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Company row without related data.
    pub fn get_company_basic(&self, orgnr: &str) -> Result<Option<CompanyRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT orgnr, name, company_type, status, purpose, registered_date,
                        foundation_year, postal_street, postal_code, postal_city,
                        visiting_street, visiting_code, visiting_city,
                        phone, email, website, municipality, county, lei_code,
                        f_skatt, moms_registered, employer_registered,
                        share_capital, is_group, parent_orgnr, parent_name, companies_in_group,
                        revenue, net_profit, total_assets, equity, num_employees,
                        equity_ratio, return_on_equity,
                        source_basic, source_board, source_financials,
                        created_at, updated_at
                 FROM companies WHERE orgnr = ?1",
                params![orgnr],
                row_to_company,
            )
            .optional()?;
        Ok(record)
    }

    /// Company with all related rows loaded.
    pub fn get_company(&self, orgnr: &str) -> Result<Option<CompanyRecord>> {
        let Some(mut record) = self.get_company_basic(orgnr)? else {
            return Ok(None);
        };

        record.roles = self.get_roles(orgnr)?;
        record.financials = self.get_financials(orgnr)?;
        record.industries = self.get_industries(orgnr)?;
        record.trademarks = self.get_trademarks(orgnr)?;
        record.related_companies = self.get_related_companies(orgnr)?;
        record.announcements = self.get_announcements(orgnr)?;

        Ok(Some(record))
    }

    // =========================================================================
    // Roles
    // =========================================================================

    /// All roles for a company.
    pub fn get_roles(&self, orgnr: &str) -> Result<Vec<Role>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name, birth_year, role_type, role_category, source
             FROM roles WHERE company_orgnr = ?1 ORDER BY id",
        )?;
        let roles = stmt
            .query_map(params![orgnr], |row| {
                Ok(Role {
                    name: row.get(0)?,
                    birth_year: row.get(1)?,
                    role_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    role_category: RoleCategory::from_db_str(
                        &row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    ),
                    source: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(roles)
    }

    /// Delete all roles for a company.
    pub fn clear_roles(&self, orgnr: &str) -> Result<()> {
        self.lock()
            .execute("DELETE FROM roles WHERE company_orgnr = ?1", params![orgnr])?;
        Ok(())
    }

    /// Insert roles in one transaction.
    pub fn add_roles_batch(&self, orgnr: &str, roles: &[Role]) -> Result<()> {
        if roles.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        for role in roles {
            tx.execute(
                "INSERT INTO roles
                    (company_orgnr, name, birth_year, role_type, role_category, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    orgnr,
                    role.name,
                    role.birth_year,
                    role.role_type,
                    role.role_category.as_str(),
                    role.source,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Financials
    // =========================================================================

    /// All financial periods, newest first.
    pub fn get_financials(&self, orgnr: &str) -> Result<Vec<FinancialPeriod>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {FINANCIAL_COLUMNS} FROM financials
             WHERE company_orgnr = ?1
             ORDER BY period_year DESC, is_consolidated ASC"
        ))?;
        let financials = stmt
            .query_map(params![orgnr], row_to_financial)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(financials)
    }

    /// Upsert financial periods, de-duplicating within the input.
    ///
    /// Rows are keyed `(company_orgnr, period_year, is_consolidated)`; when
    /// the input carries the same key twice, the last entry wins, which
    /// keeps the merge deterministic (providers are applied in a fixed
    /// order upstream). Existing rows for other periods are never deleted.
    pub fn upsert_financials_batch(&self, orgnr: &str, financials: &[FinancialPeriod]) -> Result<()> {
        if financials.is_empty() {
            return Ok(());
        }

        let mut deduped: Vec<&FinancialPeriod> = Vec::new();
        for fin in financials {
            if let Some(slot) = deduped
                .iter_mut()
                .find(|f| f.period_year == fin.period_year && f.is_consolidated == fin.is_consolidated)
            {
                *slot = fin;
            } else {
                deduped.push(fin);
            }
        }

        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        for fin in deduped {
            tx.execute(
                &format!(
                    "INSERT INTO financials (company_orgnr, {FINANCIAL_COLUMNS}, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                             ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                             ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(company_orgnr, period_year, is_consolidated) DO UPDATE SET
                        period_months = excluded.period_months,
                        source = excluded.source,
                        revenue = excluded.revenue,
                        other_income = excluded.other_income,
                        operating_costs = excluded.operating_costs,
                        raw_materials = excluded.raw_materials,
                        goods = excluded.goods,
                        depreciation_intangible = excluded.depreciation_intangible,
                        depreciation_tangible = excluded.depreciation_tangible,
                        other_external_costs = excluded.other_external_costs,
                        personnel_costs = excluded.personnel_costs,
                        inventory_change = excluded.inventory_change,
                        operating_profit = excluded.operating_profit,
                        financial_income = excluded.financial_income,
                        financial_costs = excluded.financial_costs,
                        profit_after_financial = excluded.profit_after_financial,
                        profit_before_tax = excluded.profit_before_tax,
                        net_profit = excluded.net_profit,
                        intangible_assets = excluded.intangible_assets,
                        tangible_assets = excluded.tangible_assets,
                        financial_assets = excluded.financial_assets,
                        fixed_assets = excluded.fixed_assets,
                        inventory = excluded.inventory,
                        receivables = excluded.receivables,
                        cash = excluded.cash,
                        current_assets = excluded.current_assets,
                        total_assets = excluded.total_assets,
                        share_capital = excluded.share_capital,
                        equity = excluded.equity,
                        restricted_equity = excluded.restricted_equity,
                        unrestricted_equity = excluded.unrestricted_equity,
                        retained_earnings = excluded.retained_earnings,
                        untaxed_reserves = excluded.untaxed_reserves,
                        provisions = excluded.provisions,
                        long_term_liabilities = excluded.long_term_liabilities,
                        short_term_liabilities = excluded.short_term_liabilities,
                        accounts_payable = excluded.accounts_payable,
                        return_on_equity = excluded.return_on_equity,
                        return_on_assets = excluded.return_on_assets,
                        equity_ratio = excluded.equity_ratio,
                        profit_margin = excluded.profit_margin,
                        quick_ratio = excluded.quick_ratio,
                        num_employees = excluded.num_employees,
                        salaries_board_ceo = excluded.salaries_board_ceo,
                        salaries_other = excluded.salaries_other,
                        social_costs = excluded.social_costs,
                        revenue_per_employee = excluded.revenue_per_employee,
                        source_annual_report_id = excluded.source_annual_report_id"
                ),
                rusqlite::params_from_iter(financial_values(orgnr, fin, &now)),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Industries, trademarks, related companies, announcements
    // =========================================================================

    /// All industries for a company.
    pub fn get_industries(&self, orgnr: &str) -> Result<Vec<Industry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT sni_code, sni_description, is_primary, source
             FROM industries WHERE company_orgnr = ?1 ORDER BY is_primary DESC, id",
        )?;
        let industries = stmt
            .query_map(params![orgnr], |row| {
                Ok(Industry {
                    sni_code: row.get(0)?,
                    sni_description: row.get(1)?,
                    is_primary: row.get::<_, i64>(2)? != 0,
                    source: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(industries)
    }

    /// Replace all industries for a company.
    pub fn replace_industries(&self, orgnr: &str, industries: &[Industry]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM industries WHERE company_orgnr = ?1",
            params![orgnr],
        )?;
        for industry in industries {
            tx.execute(
                "INSERT INTO industries
                    (company_orgnr, sni_code, sni_description, is_primary, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    orgnr,
                    industry.sni_code,
                    industry.sni_description,
                    i64::from(industry.is_primary),
                    industry.source,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All trademarks for a company.
    pub fn get_trademarks(&self, orgnr: &str) -> Result<Vec<Trademark>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT name, registration_number, status, class_codes,
                    registration_date, expiry_date, source
             FROM trademarks WHERE company_orgnr = ?1 ORDER BY id",
        )?;
        let trademarks = stmt
            .query_map(params![orgnr], |row| {
                Ok(Trademark {
                    name: row.get(0)?,
                    registration_number: row.get(1)?,
                    status: row.get(2)?,
                    class_codes: row.get(3)?,
                    registration_date: row.get(4)?,
                    expiry_date: row.get(5)?,
                    source: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(trademarks)
    }

    /// Replace all trademarks for a company.
    pub fn replace_trademarks(&self, orgnr: &str, trademarks: &[Trademark]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM trademarks WHERE company_orgnr = ?1",
            params![orgnr],
        )?;
        for tm in trademarks {
            tx.execute(
                "INSERT INTO trademarks
                    (company_orgnr, name, registration_number, status, class_codes,
                     registration_date, expiry_date, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    orgnr,
                    tm.name,
                    tm.registration_number,
                    tm.status,
                    tm.class_codes,
                    tm.registration_date,
                    tm.expiry_date,
                    tm.source,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All group links for a company.
    pub fn get_related_companies(&self, orgnr: &str) -> Result<Vec<RelatedCompany>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT related_orgnr, related_name, relation_type, source
             FROM related_companies WHERE company_orgnr = ?1 ORDER BY id",
        )?;
        let related = stmt
            .query_map(params![orgnr], |row| {
                Ok(RelatedCompany {
                    related_orgnr: row.get(0)?,
                    related_name: row.get(1)?,
                    relation_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    source: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(related)
    }

    /// Replace all group links for a company.
    pub fn replace_related_companies(&self, orgnr: &str, related: &[RelatedCompany]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM related_companies WHERE company_orgnr = ?1",
            params![orgnr],
        )?;
        for rel in related {
            tx.execute(
                "INSERT INTO related_companies
                    (company_orgnr, related_orgnr, related_name, relation_type, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    orgnr,
                    rel.related_orgnr,
                    rel.related_name,
                    rel.relation_type,
                    rel.source,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// All announcements for a company.
    pub fn get_announcements(&self, orgnr: &str) -> Result<Vec<Announcement>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT announcement_type, announcement_date, description, source
             FROM announcements WHERE company_orgnr = ?1 ORDER BY id",
        )?;
        let announcements = stmt
            .query_map(params![orgnr], |row| {
                Ok(Announcement {
                    announcement_type: row.get(0)?,
                    announcement_date: row.get(1)?,
                    description: row.get(2)?,
                    source: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(announcements)
    }

    /// Replace all announcements for a company.
    pub fn replace_announcements(&self, orgnr: &str, announcements: &[Announcement]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM announcements WHERE company_orgnr = ?1",
            params![orgnr],
        )?;
        for ann in announcements {
            tx.execute(
                "INSERT INTO announcements
                    (company_orgnr, announcement_type, announcement_date, description, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    orgnr,
                    ann.announcement_type,
                    ann.announcement_date,
                    ann.description,
                    ann.source,
                    now,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // History snapshots
    // =========================================================================

    /// Snapshot the current company state into the history tables.
    ///
    /// Inserts one `companies_history` row with the full prior company row
    /// and, when roles exist, one `roles_history` row with the full prior
    /// roles list. Returns false when the company does not exist.
    pub fn snapshot_company(&self, orgnr: &str) -> Result<bool> {
        let Some(company) = self.get_company_basic(orgnr)? else {
            return Ok(false);
        };
        let roles = self.get_roles(orgnr)?;

        let now = Utc::now().to_rfc3339();
        let company_json = serde_json::to_string(&company)?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO companies_history (orgnr, snapshot_date, data) VALUES (?1, ?2, ?3)",
            params![orgnr, now, company_json],
        )?;

        if !roles.is_empty() {
            let roles_json = serde_json::to_string(&roles)?;
            conn.execute(
                "INSERT INTO roles_history (company_orgnr, snapshot_date, roles_json)
                 VALUES (?1, ?2, ?3)",
                params![orgnr, now, roles_json],
            )?;
        }

        Ok(true)
    }

    /// Company history, newest first.
    pub fn get_company_history(&self, orgnr: &str) -> Result<Vec<HistorySnapshot>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT snapshot_date, data FROM companies_history
             WHERE orgnr = ?1 ORDER BY snapshot_date DESC, id DESC",
        )?;
        let history = stmt
            .query_map(params![orgnr], |row| {
                Ok(HistorySnapshot {
                    snapshot_date: row.get(0)?,
                    data: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(history)
    }

    /// Roles history, newest first.
    pub fn get_roles_history(&self, orgnr: &str) -> Result<Vec<HistorySnapshot>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT snapshot_date, roles_json FROM roles_history
             WHERE company_orgnr = ?1 ORDER BY snapshot_date DESC, id DESC",
        )?;
        let history = stmt
            .query_map(params![orgnr], |row| {
                Ok(HistorySnapshot {
                    snapshot_date: row.get(0)?,
                    data: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(history)
    }

    // =========================================================================
    // Cache metadata
    // =========================================================================

    /// Stamp the cache metadata for a company.
    pub fn update_cache_metadata(&self, orgnr: &str, source: Option<&str>) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.lock().execute(
            "INSERT INTO cache_metadata (orgnr, last_refresh, source) VALUES (?1, ?2, ?3)
             ON CONFLICT(orgnr) DO UPDATE SET
                last_refresh = excluded.last_refresh,
                source = COALESCE(excluded.source, source)",
            params![orgnr, now, source],
        )?;
        Ok(())
    }

    /// Cache metadata for a company.
    pub fn get_cache_metadata(&self, orgnr: &str) -> Result<Option<CacheMetadata>> {
        let conn = self.lock();
        let metadata = conn
            .query_row(
                "SELECT orgnr, last_refresh, source FROM cache_metadata WHERE orgnr = ?1",
                params![orgnr],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(metadata.and_then(|(orgnr, last_refresh, source)| {
            DateTime::parse_from_rfc3339(&last_refresh)
                .ok()
                .map(|t| CacheMetadata {
                    orgnr,
                    last_refresh: t.with_timezone(&Utc),
                    source,
                })
        }))
    }

    /// Whether the cached record is within the freshness window.
    pub fn is_cache_fresh(&self, orgnr: &str, ttl_hours: i64) -> Result<bool> {
        let Some(metadata) = self.get_cache_metadata(orgnr)? else {
            return Ok(false);
        };
        let age = Utc::now() - metadata.last_refresh;
        Ok(age < chrono::Duration::hours(ttl_hours))
    }

    // =========================================================================
    // Composite storage
    // =========================================================================

    /// Persist a complete company record with history discipline.
    ///
    /// When the company already exists and `snapshot_first` is set, the
    /// prior state is snapshotted before any mutation. Child tables are
    /// replaced only when the incoming list is non-empty, so a provider
    /// that transiently returned nothing never wipes stored rows.
    /// Financials are upserted per `(period_year, is_consolidated)` and
    /// never deleted. Finishes by stamping the cache metadata.
    pub fn store_company_complete(&self, record: &CompanyRecord, snapshot_first: bool) -> Result<()> {
        if record.orgnr.is_empty() {
            return Err(StoreError::MissingOrgnr);
        }
        let orgnr = &record.orgnr;

        if snapshot_first && self.company_exists(orgnr)? {
            self.snapshot_company(orgnr)?;
        }

        self.upsert_company(record)?;

        if !record.roles.is_empty() {
            self.clear_roles(orgnr)?;
            self.add_roles_batch(orgnr, &record.roles)?;
        }
        if !record.financials.is_empty() {
            self.upsert_financials_batch(orgnr, &record.financials)?;
        }
        if !record.industries.is_empty() {
            self.replace_industries(orgnr, &record.industries)?;
        }
        if !record.trademarks.is_empty() {
            self.replace_trademarks(orgnr, &record.trademarks)?;
        }
        if !record.related_companies.is_empty() {
            self.replace_related_companies(orgnr, &record.related_companies)?;
        }
        if !record.announcements.is_empty() {
            self.replace_announcements(orgnr, &record.announcements)?;
        }

        self.update_cache_metadata(orgnr, None)?;
        tracing::info!(orgnr = %orgnr, "stored complete company data");
        Ok(())
    }

    // =========================================================================
    // Search
    // =========================================================================

    /// Search cached companies by name or orgnr prefix.
    pub fn search_companies(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let safe = sanitize_search_input(query, 100);
        if safe.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT orgnr, name, postal_city, status FROM companies
             WHERE name LIKE ?1 ESCAPE '\\' OR orgnr LIKE ?2 ESCAPE '\\'
             ORDER BY name LIMIT ?3",
        )?;
        let hits = stmt
            .query_map(
                params![format!("%{safe}%"), format!("{safe}%"), limit as i64],
                |row| {
                    Ok(SearchHit {
                        orgnr: row.get(0)?,
                        name: row.get(1)?,
                        city: row.get(2)?,
                        status: row.get(3)?,
                        source: "store".to_string(),
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Search the registry name-lookup table.
    ///
    /// Tries a prefix match first; falls back to a contains match.
    pub fn search_company_registry(&self, name: &str, limit: usize) -> Result<Vec<RegistryEntry>> {
        let safe = sanitize_search_input(name, 100);
        if safe.is_empty() {
            return Ok(Vec::new());
        }

        let prefix = self.registry_query(&format!("{safe}%"), limit)?;
        if !prefix.is_empty() {
            return Ok(prefix);
        }
        self.registry_query(&format!("%{safe}%"), limit)
    }

    fn registry_query(&self, pattern: &str, limit: usize) -> Result<Vec<RegistryEntry>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT orgnr, name, org_form FROM company_registry
             WHERE name LIKE ?1 ESCAPE '\\' ORDER BY name LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![pattern, limit as i64], |row| {
                Ok(RegistryEntry {
                    orgnr: row.get(0)?,
                    name: row.get(1)?,
                    org_form: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Load registry name-lookup entries.
    pub fn upsert_registry_entries(&self, entries: &[RegistryEntry]) -> Result<()> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT OR REPLACE INTO company_registry (orgnr, name, org_form)
                 VALUES (?1, ?2, ?3)",
                params![entry.orgnr, entry.name, entry.org_form],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // =========================================================================
    // Misc
    // =========================================================================

    /// Every tracked company orgnr.
    pub fn all_orgnrs(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT orgnr FROM companies ORDER BY orgnr")?;
        let orgnrs = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(orgnrs)
    }

    /// Aggregate row counts.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock();
        let count = |table: &str| -> Result<usize> {
            let n: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            companies: count("companies")?,
            roles: count("roles")?,
            financial_periods: count("financials")?,
            annual_reports: count("annual_reports")?,
            xbrl_facts: count("xbrl_facts")?,
            registry_entries: count("company_registry")?,
        })
    }
}

fn row_to_company(row: &Row<'_>) -> rusqlite::Result<CompanyRecord> {
    Ok(CompanyRecord {
        orgnr: row.get(0)?,
        name: row.get(1)?,
        company_type: row.get(2)?,
        status: row
            .get::<_, Option<String>>(3)?
            .map(|s| CompanyStatus::from_db_str(&s)),
        purpose: row.get(4)?,
        registered_date: row.get(5)?,
        foundation_year: row.get(6)?,
        postal_street: row.get(7)?,
        postal_code: row.get(8)?,
        postal_city: row.get(9)?,
        visiting_street: row.get(10)?,
        visiting_code: row.get(11)?,
        visiting_city: row.get(12)?,
        phone: row.get(13)?,
        email: row.get(14)?,
        website: row.get(15)?,
        municipality: row.get(16)?,
        county: row.get(17)?,
        lei_code: row.get(18)?,
        f_skatt: row.get::<_, Option<i64>>(19)?.map(|v| v != 0),
        moms_registered: row.get::<_, Option<i64>>(20)?.map(|v| v != 0),
        employer_registered: row.get::<_, Option<i64>>(21)?.map(|v| v != 0),
        share_capital: row.get(22)?,
        is_group: row.get::<_, Option<i64>>(23)?.map(|v| v != 0),
        parent_orgnr: row.get(24)?,
        parent_name: row.get(25)?,
        companies_in_group: row.get(26)?,
        revenue: row.get(27)?,
        net_profit: row.get(28)?,
        total_assets: row.get(29)?,
        equity: row.get(30)?,
        num_employees: row.get(31)?,
        equity_ratio: row.get(32)?,
        return_on_equity: row.get(33)?,
        source_basic: row.get(34)?,
        source_board: row.get(35)?,
        source_financials: row.get(36)?,
        created_at: parse_rfc3339(row.get::<_, Option<String>>(37)?),
        updated_at: parse_rfc3339(row.get::<_, Option<String>>(38)?),
        roles: Vec::new(),
        financials: Vec::new(),
        industries: Vec::new(),
        trademarks: Vec::new(),
        related_companies: Vec::new(),
        announcements: Vec::new(),
        from_cache: false,
    })
}

fn parse_rfc3339(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn row_to_financial(row: &Row<'_>) -> rusqlite::Result<FinancialPeriod> {
    Ok(FinancialPeriod {
        period_year: row.get(0)?,
        period_months: row.get::<_, Option<i32>>(1)?.unwrap_or(12),
        is_consolidated: row.get::<_, i64>(2)? != 0,
        source: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        revenue: row.get(4)?,
        other_income: row.get(5)?,
        operating_costs: row.get(6)?,
        raw_materials: row.get(7)?,
        goods: row.get(8)?,
        depreciation_intangible: row.get(9)?,
        depreciation_tangible: row.get(10)?,
        other_external_costs: row.get(11)?,
        personnel_costs: row.get(12)?,
        inventory_change: row.get(13)?,
        operating_profit: row.get(14)?,
        financial_income: row.get(15)?,
        financial_costs: row.get(16)?,
        profit_after_financial: row.get(17)?,
        profit_before_tax: row.get(18)?,
        net_profit: row.get(19)?,
        intangible_assets: row.get(20)?,
        tangible_assets: row.get(21)?,
        financial_assets: row.get(22)?,
        fixed_assets: row.get(23)?,
        inventory: row.get(24)?,
        receivables: row.get(25)?,
        cash: row.get(26)?,
        current_assets: row.get(27)?,
        total_assets: row.get(28)?,
        share_capital: row.get(29)?,
        equity: row.get(30)?,
        restricted_equity: row.get(31)?,
        unrestricted_equity: row.get(32)?,
        retained_earnings: row.get(33)?,
        untaxed_reserves: row.get(34)?,
        provisions: row.get(35)?,
        long_term_liabilities: row.get(36)?,
        short_term_liabilities: row.get(37)?,
        accounts_payable: row.get(38)?,
        return_on_equity: row.get(39)?,
        return_on_assets: row.get(40)?,
        equity_ratio: row.get(41)?,
        profit_margin: row.get(42)?,
        quick_ratio: row.get(43)?,
        num_employees: row.get(44)?,
        salaries_board_ceo: row.get(45)?,
        salaries_other: row.get(46)?,
        social_costs: row.get(47)?,
        revenue_per_employee: row.get(48)?,
        source_annual_report_id: row.get(49)?,
    })
}

/// Owned parameter values for one financials row, in `FINANCIAL_COLUMNS`
/// order, bracketed by `company_orgnr` and `created_at`.
fn financial_values(
    orgnr: &str,
    fin: &FinancialPeriod,
    created_at: &str,
) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value as V;
    vec![
        V::from(orgnr.to_string()),
        V::from(fin.period_year),
        V::from(fin.period_months),
        V::from(i64::from(fin.is_consolidated)),
        V::from(fin.source.clone()),
        V::from(fin.revenue),
        V::from(fin.other_income),
        V::from(fin.operating_costs),
        V::from(fin.raw_materials),
        V::from(fin.goods),
        V::from(fin.depreciation_intangible),
        V::from(fin.depreciation_tangible),
        V::from(fin.other_external_costs),
        V::from(fin.personnel_costs),
        V::from(fin.inventory_change),
        V::from(fin.operating_profit),
        V::from(fin.financial_income),
        V::from(fin.financial_costs),
        V::from(fin.profit_after_financial),
        V::from(fin.profit_before_tax),
        V::from(fin.net_profit),
        V::from(fin.intangible_assets),
        V::from(fin.tangible_assets),
        V::from(fin.financial_assets),
        V::from(fin.fixed_assets),
        V::from(fin.inventory),
        V::from(fin.receivables),
        V::from(fin.cash),
        V::from(fin.current_assets),
        V::from(fin.total_assets),
        V::from(fin.share_capital),
        V::from(fin.equity),
        V::from(fin.restricted_equity),
        V::from(fin.unrestricted_equity),
        V::from(fin.retained_earnings),
        V::from(fin.untaxed_reserves),
        V::from(fin.provisions),
        V::from(fin.long_term_liabilities),
        V::from(fin.short_term_liabilities),
        V::from(fin.accounts_payable),
        V::from(fin.return_on_equity),
        V::from(fin.return_on_assets),
        V::from(fin.equity_ratio),
        V::from(fin.profit_margin),
        V::from(fin.quick_ratio),
        V::from(fin.num_employees),
        V::from(fin.salaries_board_ceo),
        V::from(fin.salaries_other),
        V::from(fin.social_costs),
        V::from(fin.revenue_per_employee),
        V::from(fin.source_annual_report_id),
        V::from(created_at.to_string()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company(orgnr: &str, name: &str) -> CompanyRecord {
        CompanyRecord {
            name: Some(name.to_string()),
            status: Some(CompanyStatus::Active),
            ..CompanyRecord::new(orgnr)
        }
    }

    fn role(name: &str) -> Role {
        Role {
            name: name.to_string(),
            birth_year: Some(1980),
            role_type: "Ledamot".to_string(),
            role_category: RoleCategory::Board,
            source: "allabolag".to_string(),
        }
    }

    fn period(year: i32, consolidated: bool, revenue: i64) -> FinancialPeriod {
        FinancialPeriod {
            period_year: year,
            period_months: 12,
            is_consolidated: consolidated,
            source: "allabolag".to_string(),
            revenue: Some(revenue),
            ..FinancialPeriod::default()
        }
    }

    #[test]
    fn test_store_initialization() {
        assert!(Store::in_memory().is_ok());
    }

    #[test]
    fn test_company_round_trip() {
        let store = Store::in_memory().unwrap();
        let mut record = company("5560125791", "Testbolaget AB");
        record.postal_city = Some("Sundsvall".to_string());
        record.f_skatt = Some(true);
        record.share_capital = Some(500_000);

        store.upsert_company(&record).unwrap();
        let loaded = store.get_company("5560125791").unwrap().unwrap();

        assert_eq!(loaded.name.as_deref(), Some("Testbolaget AB"));
        assert_eq!(loaded.status, Some(CompanyStatus::Active));
        assert_eq!(loaded.postal_city.as_deref(), Some("Sundsvall"));
        assert_eq!(loaded.f_skatt, Some(true));
        assert_eq!(loaded.share_capital, Some(500_000));
        assert!(loaded.created_at.is_some());
        assert!(loaded.updated_at.is_some());
    }

    #[test]
    fn test_upsert_preserves_created_at() {
        let store = Store::in_memory().unwrap();
        let record = company("5560125791", "Old");
        store.upsert_company(&record).unwrap();
        let first = store.get_company_basic("5560125791").unwrap().unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        store
            .upsert_company(&company("5560125791", "New"))
            .unwrap();
        let second = store.get_company_basic("5560125791").unwrap().unwrap();

        assert_eq!(second.name.as_deref(), Some("New"));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_missing_company_is_none() {
        let store = Store::in_memory().unwrap();
        assert!(store.get_company("0000000000").unwrap().is_none());
        assert!(!store.company_exists("0000000000").unwrap());
    }

    #[test]
    fn test_roles_replace() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_company(&company("5560125791", "AB"))
            .unwrap();

        store
            .add_roles_batch("5560125791", &[role("Anna"), role("Erik")])
            .unwrap();
        assert_eq!(store.get_roles("5560125791").unwrap().len(), 2);

        store.clear_roles("5560125791").unwrap();
        store.add_roles_batch("5560125791", &[role("Maria")]).unwrap();
        let roles = store.get_roles("5560125791").unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "Maria");
        assert_eq!(roles[0].role_category, RoleCategory::Board);
    }

    #[test]
    fn test_financials_unique_per_period() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_company(&company("5560125791", "AB"))
            .unwrap();

        store
            .upsert_financials_batch("5560125791", &[period(2024, false, 100)])
            .unwrap();
        store
            .upsert_financials_batch("5560125791", &[period(2024, false, 200)])
            .unwrap();

        let financials = store.get_financials("5560125791").unwrap();
        assert_eq!(financials.len(), 1);
        assert_eq!(financials[0].revenue, Some(200));
    }

    #[test]
    fn test_financials_consolidated_is_separate_row() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_financials_batch(
                "5560125791",
                &[period(2024, false, 100), period(2024, true, 500)],
            )
            .unwrap();

        let financials = store.get_financials("5560125791").unwrap();
        assert_eq!(financials.len(), 2);
    }

    #[test]
    fn test_financials_dedupe_within_batch_last_wins() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_financials_batch(
                "5560125791",
                &[period(2024, false, 100), period(2024, false, 300)],
            )
            .unwrap();

        let financials = store.get_financials("5560125791").unwrap();
        assert_eq!(financials.len(), 1);
        assert_eq!(financials[0].revenue, Some(300));
    }

    #[test]
    fn test_snapshot_before_update() {
        let store = Store::in_memory().unwrap();
        let mut record = company("5560125791", "Old");
        record.roles.push(role("Anna"));
        store.store_company_complete(&record, true).unwrap();

        // First store of a new company takes no snapshot.
        assert!(store.get_company_history("5560125791").unwrap().is_empty());

        let updated = company("5560125791", "New");
        store.store_company_complete(&updated, true).unwrap();

        let history = store.get_company_history("5560125791").unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].data.contains("Old"));

        let roles_history = store.get_roles_history("5560125791").unwrap();
        assert_eq!(roles_history.len(), 1);
        assert!(roles_history[0].data.contains("Anna"));

        let current = store.get_company("5560125791").unwrap().unwrap();
        assert_eq!(current.name.as_deref(), Some("New"));
    }

    #[test]
    fn test_store_complete_is_idempotent_except_history() {
        let store = Store::in_memory().unwrap();
        let mut record = company("5560125791", "AB");
        record.roles.push(role("Anna"));
        record.financials.push(period(2024, false, 100));

        store.store_company_complete(&record, true).unwrap();
        store.store_company_complete(&record, true).unwrap();
        store.store_company_complete(&record, true).unwrap();

        let loaded = store.get_company("5560125791").unwrap().unwrap();
        assert_eq!(loaded.roles.len(), 1);
        assert_eq!(loaded.financials.len(), 1);

        // One snapshot per call once the company exists.
        assert_eq!(store.get_company_history("5560125791").unwrap().len(), 2);
    }

    #[test]
    fn test_empty_roles_do_not_wipe_stored_roles() {
        let store = Store::in_memory().unwrap();
        let mut record = company("5560125791", "AB");
        record.roles.push(role("Anna"));
        store.store_company_complete(&record, true).unwrap();

        // A refresh where the provider produced no roles must keep them.
        let record_without_roles = company("5560125791", "AB");
        store
            .store_company_complete(&record_without_roles, true)
            .unwrap();

        assert_eq!(store.get_roles("5560125791").unwrap().len(), 1);
    }

    #[test]
    fn test_cache_freshness() {
        let store = Store::in_memory().unwrap();
        assert!(!store.is_cache_fresh("5560125791", 24).unwrap());

        store.update_cache_metadata("5560125791", Some("test")).unwrap();
        assert!(store.is_cache_fresh("5560125791", 24).unwrap());
        assert!(!store.is_cache_fresh("5560125791", 0).unwrap());

        let metadata = store.get_cache_metadata("5560125791").unwrap().unwrap();
        assert_eq!(metadata.source.as_deref(), Some("test"));
    }

    #[test]
    fn test_search_companies() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_company(&company("5560125791", "Testbolaget AB"))
            .unwrap();
        store
            .upsert_company(&company("5560000001", "Annat Bolag AB"))
            .unwrap();

        let hits = store.search_companies("Testbolaget", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].orgnr, "5560125791");

        // Orgnr prefix also matches.
        let hits = store.search_companies("556012", 10).unwrap();
        assert_eq!(hits.len(), 1);

        // Wildcards in input are literals, not patterns.
        let hits = store.search_companies("%", 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_registry_prefix_then_contains() {
        let store = Store::in_memory().unwrap();
        store
            .upsert_registry_entries(&[
                RegistryEntry {
                    orgnr: "5560125791".to_string(),
                    name: "Testbolaget AB".to_string(),
                    org_form: Some("AB".to_string()),
                },
                RegistryEntry {
                    orgnr: "5560000001".to_string(),
                    name: "Norra Testbolaget AB".to_string(),
                    org_form: Some("AB".to_string()),
                },
            ])
            .unwrap();

        // Prefix match wins when it produces hits.
        let hits = store.search_company_registry("Testbolaget", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].orgnr, "5560125791");

        // Contains fallback when the prefix finds nothing.
        let hits = store.search_company_registry("Norra Test", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].orgnr, "5560000001");
    }

    #[test]
    fn test_all_orgnrs_and_stats() {
        let store = Store::in_memory().unwrap();
        store.upsert_company(&company("5560125791", "A")).unwrap();
        store.upsert_company(&company("5560000001", "B")).unwrap();

        let orgnrs = store.all_orgnrs().unwrap();
        assert_eq!(orgnrs, vec!["5560000001", "5560125791"]);

        let stats = store.stats().unwrap();
        assert_eq!(stats.companies, 2);
        assert_eq!(stats.roles, 0);
    }

    #[test]
    fn test_child_tables_round_trip() {
        let store = Store::in_memory().unwrap();
        let mut record = company("5560125791", "AB");
        record.industries.push(Industry {
            sni_code: "71110".to_string(),
            sni_description: Some("Arkitektverksamhet".to_string()),
            is_primary: true,
            source: "allabolag".to_string(),
        });
        record.trademarks.push(Trademark {
            name: "MÄRKE".to_string(),
            registration_number: Some("TM-1".to_string()),
            status: Some("registered".to_string()),
            class_codes: None,
            registration_date: Some("2010-01-01".to_string()),
            expiry_date: None,
            source: "allabolag".to_string(),
        });
        record.related_companies.push(RelatedCompany {
            related_orgnr: Some("5560000002".to_string()),
            related_name: Some("Dotter AB".to_string()),
            relation_type: "subsidiary".to_string(),
            source: "allabolag".to_string(),
        });
        record.announcements.push(Announcement {
            announcement_type: Some("Nyregistrering".to_string()),
            announcement_date: Some("2001-05-15".to_string()),
            description: Some("Bolaget registrerat".to_string()),
            source: "allabolag".to_string(),
        });

        store.store_company_complete(&record, true).unwrap();
        let loaded = store.get_company("5560125791").unwrap().unwrap();

        assert_eq!(loaded.industries.len(), 1);
        assert!(loaded.industries[0].is_primary);
        assert_eq!(loaded.trademarks.len(), 1);
        assert_eq!(loaded.related_companies.len(), 1);
        assert_eq!(loaded.announcements.len(), 1);
    }
}
