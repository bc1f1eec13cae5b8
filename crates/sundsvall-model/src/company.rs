//! Canonical company record and its child entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::roles::Role;

/// Registration status of a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompanyStatus {
    /// Actively registered.
    Active,
    /// Registered but not active.
    Inactive,
    /// Deregistered.
    Deregistered,
    /// Ongoing bankruptcy procedure.
    Bankruptcy,
    /// Ongoing liquidation procedure.
    Liquidation,
    /// Provider did not report a recognizable status.
    Unknown,
}

impl CompanyStatus {
    /// Database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Inactive => "INACTIVE",
            Self::Deregistered => "DEREGISTERED",
            Self::Bankruptcy => "BANKRUPTCY",
            Self::Liquidation => "LIQUIDATION",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Self {
        match s {
            "ACTIVE" => Self::Active,
            "INACTIVE" => Self::Inactive,
            "DEREGISTERED" => Self::Deregistered,
            "BANKRUPTCY" => Self::Bankruptcy,
            "LIQUIDATION" => Self::Liquidation,
            _ => Self::Unknown,
        }
    }
}

/// One financial period for a company.
///
/// Uniquely identified by `(orgnr, period_year, is_consolidated)`. Monetary
/// amounts are whole SEK; ratios are percentages as reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialPeriod {
    /// Reporting year (year of the period's end date).
    pub period_year: i32,
    /// Period length in months (usually 12).
    pub period_months: i32,
    /// True for consolidated (group) accounts.
    pub is_consolidated: bool,
    /// Provider that reported the period.
    pub source: String,

    // Income statement
    /// Net revenue.
    pub revenue: Option<i64>,
    /// Other operating income.
    pub other_income: Option<i64>,
    /// Total operating costs.
    pub operating_costs: Option<i64>,
    /// Raw materials and consumables.
    pub raw_materials: Option<i64>,
    /// Goods for resale.
    pub goods: Option<i64>,
    /// Depreciation of intangible assets.
    pub depreciation_intangible: Option<i64>,
    /// Depreciation of tangible assets.
    pub depreciation_tangible: Option<i64>,
    /// Other external costs.
    pub other_external_costs: Option<i64>,
    /// Personnel costs.
    pub personnel_costs: Option<i64>,
    /// Inventory change.
    pub inventory_change: Option<i64>,
    /// Operating profit.
    pub operating_profit: Option<i64>,
    /// Financial income.
    pub financial_income: Option<i64>,
    /// Financial costs.
    pub financial_costs: Option<i64>,
    /// Profit after financial items.
    pub profit_after_financial: Option<i64>,
    /// Profit before tax.
    pub profit_before_tax: Option<i64>,
    /// Net profit for the year.
    pub net_profit: Option<i64>,

    // Balance sheet, assets
    /// Intangible fixed assets.
    pub intangible_assets: Option<i64>,
    /// Tangible fixed assets.
    pub tangible_assets: Option<i64>,
    /// Financial fixed assets.
    pub financial_assets: Option<i64>,
    /// Total fixed assets.
    pub fixed_assets: Option<i64>,
    /// Inventory.
    pub inventory: Option<i64>,
    /// Short-term receivables.
    pub receivables: Option<i64>,
    /// Cash and bank.
    pub cash: Option<i64>,
    /// Total current assets.
    pub current_assets: Option<i64>,
    /// Balance-sheet total.
    pub total_assets: Option<i64>,

    // Balance sheet, equity and liabilities
    /// Share capital.
    pub share_capital: Option<i64>,
    /// Total equity.
    pub equity: Option<i64>,
    /// Restricted equity.
    pub restricted_equity: Option<i64>,
    /// Unrestricted equity.
    pub unrestricted_equity: Option<i64>,
    /// Retained earnings.
    pub retained_earnings: Option<i64>,
    /// Untaxed reserves.
    pub untaxed_reserves: Option<i64>,
    /// Provisions.
    pub provisions: Option<i64>,
    /// Long-term liabilities.
    pub long_term_liabilities: Option<i64>,
    /// Short-term liabilities.
    pub short_term_liabilities: Option<i64>,
    /// Accounts payable.
    pub accounts_payable: Option<i64>,

    // Key ratios
    /// Return on equity, percent.
    pub return_on_equity: Option<f64>,
    /// Return on total assets, percent.
    pub return_on_assets: Option<f64>,
    /// Equity ratio (soliditet), percent.
    pub equity_ratio: Option<f64>,
    /// Profit margin, percent.
    pub profit_margin: Option<f64>,
    /// Quick ratio (kassalikviditet), percent.
    pub quick_ratio: Option<f64>,

    // Personnel
    /// Average number of employees.
    pub num_employees: Option<i64>,
    /// Salaries to board and CEO.
    pub salaries_board_ceo: Option<i64>,
    /// Salaries to other employees.
    pub salaries_other: Option<i64>,
    /// Social security costs.
    pub social_costs: Option<i64>,
    /// Revenue per employee.
    pub revenue_per_employee: Option<i64>,

    /// Annual report the figures were extracted from, when XBRL-sourced.
    pub source_annual_report_id: Option<i64>,
}

/// An SNI industry classification attached to a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Industry {
    /// SNI code, e.g. "71110".
    pub sni_code: String,
    /// Human-readable description.
    pub sni_description: Option<String>,
    /// At most one primary industry per company.
    pub is_primary: bool,
    /// Provider that reported the classification.
    pub source: String,
}

/// A registered trademark attached to a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trademark {
    /// Trademark name.
    pub name: String,
    /// Registration number, when registered.
    pub registration_number: Option<String>,
    /// "registered" or "pending".
    pub status: Option<String>,
    /// Nice class codes.
    pub class_codes: Option<String>,
    /// Registration date.
    pub registration_date: Option<String>,
    /// Expiry date.
    pub expiry_date: Option<String>,
    /// Provider that reported the trademark.
    pub source: String,
}

/// A group-structure link to another company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedCompany {
    /// Related company's orgnr.
    pub related_orgnr: Option<String>,
    /// Related company's name.
    pub related_name: Option<String>,
    /// Relation type (e.g. "subsidiary").
    pub relation_type: String,
    /// Provider that reported the link.
    pub source: String,
}

/// A legal announcement attached to a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    /// Announcement type.
    pub announcement_type: Option<String>,
    /// Publication date.
    pub announcement_date: Option<String>,
    /// Announcement text.
    pub description: Option<String>,
    /// Provider that reported the announcement.
    pub source: String,
}

/// A search result summary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Organization number.
    pub orgnr: String,
    /// Company name.
    pub name: Option<String>,
    /// City.
    pub city: Option<String>,
    /// Status string as reported.
    pub status: Option<String>,
    /// Where the hit came from ("store" or a provider name).
    pub source: String,
}

/// A read-only registry name-lookup entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Organization number.
    pub orgnr: String,
    /// Registered name.
    pub name: String,
    /// Organizational form code.
    pub org_form: Option<String>,
}

/// The canonical company record.
///
/// Providers return partial records; the orchestrator merges them and the
/// store persists exactly one per `orgnr`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    /// Normalized 10-digit organization number.
    pub orgnr: String,
    /// Company name.
    pub name: Option<String>,
    /// Organizational form (e.g. "Aktiebolag").
    pub company_type: Option<String>,
    /// Registration status.
    pub status: Option<CompanyStatus>,
    /// Legal form / stated purpose.
    pub purpose: Option<String>,
    /// Registration date (ISO).
    pub registered_date: Option<String>,
    /// Foundation year.
    pub foundation_year: Option<i32>,

    /// Postal street address.
    pub postal_street: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// Postal city.
    pub postal_city: Option<String>,
    /// Visiting street address.
    pub visiting_street: Option<String>,
    /// Visiting postal code.
    pub visiting_code: Option<String>,
    /// Visiting city.
    pub visiting_city: Option<String>,

    /// Phone number.
    pub phone: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Website URL.
    pub website: Option<String>,
    /// Municipality name.
    pub municipality: Option<String>,
    /// County name.
    pub county: Option<String>,
    /// Legal Entity Identifier.
    pub lei_code: Option<String>,

    /// F-skatt registration.
    pub f_skatt: Option<bool>,
    /// VAT registration.
    pub moms_registered: Option<bool>,
    /// Employer registration.
    pub employer_registered: Option<bool>,

    /// Share capital, SEK.
    pub share_capital: Option<i64>,
    /// True when the company heads or belongs to a group.
    pub is_group: Option<bool>,
    /// Parent company orgnr.
    pub parent_orgnr: Option<String>,
    /// Parent company name.
    pub parent_name: Option<String>,
    /// Number of companies in the group.
    pub companies_in_group: Option<i64>,

    // Summary figures from the latest non-consolidated period.
    /// Latest revenue, SEK.
    pub revenue: Option<i64>,
    /// Latest net profit, SEK.
    pub net_profit: Option<i64>,
    /// Latest balance-sheet total, SEK.
    pub total_assets: Option<i64>,
    /// Latest equity, SEK.
    pub equity: Option<i64>,
    /// Latest employee count.
    pub num_employees: Option<i64>,
    /// Latest equity ratio, percent.
    pub equity_ratio: Option<f64>,
    /// Latest return on equity, percent.
    pub return_on_equity: Option<f64>,

    /// Provider of identity data.
    pub source_basic: Option<String>,
    /// Provider of board data.
    pub source_board: Option<String>,
    /// Provider of financial data.
    pub source_financials: Option<String>,

    /// Row creation timestamp.
    pub created_at: Option<DateTime<Utc>>,
    /// Last mutation timestamp; monotonic non-decreasing.
    pub updated_at: Option<DateTime<Utc>>,

    /// Board, management, auditor and other roles.
    pub roles: Vec<Role>,
    /// Financial periods.
    pub financials: Vec<FinancialPeriod>,
    /// Industry classifications.
    pub industries: Vec<Industry>,
    /// Registered trademarks.
    pub trademarks: Vec<Trademark>,
    /// Group-structure links.
    pub related_companies: Vec<RelatedCompany>,
    /// Legal announcements.
    pub announcements: Vec<Announcement>,

    /// True when this record was served from the cache without any fetch.
    #[serde(skip)]
    pub from_cache: bool,
}

macro_rules! merge_scalar {
    ($base:ident, $other:ident, $( $field:ident ),* $(,)?) => {
        $(
            if $other.$field.is_some() {
                $base.$field = $other.$field;
            }
        )*
    };
}

impl CompanyRecord {
    /// Create an empty record for an orgnr.
    pub fn new(orgnr: impl Into<String>) -> Self {
        Self {
            orgnr: orgnr.into(),
            ..Self::default()
        }
    }

    /// Merge another partial record into this one.
    ///
    /// Scalar fields take the incoming value when present. When
    /// `prefer_existing_identity` is set, `name`, `orgnr` and `status`
    /// keep their current values if already populated (the registry wins
    /// on identity fields). List fields are concatenated; de-duplication
    /// is the store's responsibility.
    pub fn merge_from(&mut self, other: Self, prefer_existing_identity: bool) {
        if !prefer_existing_identity || self.name.is_none() {
            if other.name.is_some() {
                self.name = other.name;
            }
        }
        if !prefer_existing_identity || self.status.is_none() {
            if other.status.is_some() {
                self.status = other.status;
            }
        }

        merge_scalar!(
            self,
            other,
            company_type,
            purpose,
            registered_date,
            foundation_year,
            postal_street,
            postal_code,
            postal_city,
            visiting_street,
            visiting_code,
            visiting_city,
            phone,
            email,
            website,
            municipality,
            county,
            lei_code,
            f_skatt,
            moms_registered,
            employer_registered,
            share_capital,
            is_group,
            parent_orgnr,
            parent_name,
            companies_in_group,
            revenue,
            net_profit,
            total_assets,
            equity,
            num_employees,
            equity_ratio,
            return_on_equity,
        );

        self.roles.extend(other.roles);
        self.financials.extend(other.financials);
        self.industries.extend(other.industries);
        self.trademarks.extend(other.trademarks);
        self.related_companies.extend(other.related_companies);
        self.announcements.extend(other.announcements);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(orgnr: &str) -> CompanyRecord {
        CompanyRecord::new(orgnr)
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            CompanyStatus::Active,
            CompanyStatus::Inactive,
            CompanyStatus::Deregistered,
            CompanyStatus::Bankruptcy,
            CompanyStatus::Liquidation,
            CompanyStatus::Unknown,
        ] {
            assert_eq!(CompanyStatus::from_db_str(status.as_str()), status);
        }
        assert_eq!(
            CompanyStatus::from_db_str("whatever"),
            CompanyStatus::Unknown
        );
    }

    #[test]
    fn test_merge_prefers_existing_identity() {
        let mut base = record("5560125791");
        base.name = Some("Canonical AB".into());
        base.status = Some(CompanyStatus::Active);

        let mut incoming = record("5560125791");
        incoming.name = Some("Canonical Aktiebolag".into());
        incoming.status = Some(CompanyStatus::Inactive);
        incoming.phone = Some("060-123456".into());

        base.merge_from(incoming, true);

        assert_eq!(base.name.as_deref(), Some("Canonical AB"));
        assert_eq!(base.status, Some(CompanyStatus::Active));
        assert_eq!(base.phone.as_deref(), Some("060-123456"));
    }

    #[test]
    fn test_merge_fills_missing_identity() {
        let mut base = record("5560125791");

        let mut incoming = record("5560125791");
        incoming.name = Some("Test AB".into());
        incoming.status = Some(CompanyStatus::Active);

        base.merge_from(incoming, true);

        assert_eq!(base.name.as_deref(), Some("Test AB"));
        assert_eq!(base.status, Some(CompanyStatus::Active));
    }

    #[test]
    fn test_merge_concatenates_lists() {
        let mut base = record("5560125791");
        base.financials.push(FinancialPeriod {
            period_year: 2024,
            period_months: 12,
            source: "bolagsverket".into(),
            ..FinancialPeriod::default()
        });

        let mut incoming = record("5560125791");
        incoming.financials.push(FinancialPeriod {
            period_year: 2024,
            period_months: 12,
            source: "allabolag".into(),
            ..FinancialPeriod::default()
        });
        incoming.financials.push(FinancialPeriod {
            period_year: 2023,
            period_months: 12,
            source: "allabolag".into(),
            ..FinancialPeriod::default()
        });

        base.merge_from(incoming, true);
        assert_eq!(base.financials.len(), 3);
        // Provider order is preserved: registry first, scraper after.
        assert_eq!(base.financials[0].source, "bolagsverket");
        assert_eq!(base.financials[2].period_year, 2023);
    }
}
