//! Extracted fact types and per-period financial figures.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reporting period inferred from an iXBRL context identifier.
///
/// Context ids follow the patterns `period{0..3}` (duration) and
/// `balans{0..3}` (instant), where 0 is the current year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeriodType {
    /// period0 / balans0.
    Current,
    /// period1 / balans1.
    Previous,
    /// period2 / balans2.
    TwoYears,
    /// period3 / balans3.
    ThreeYears,
    /// Context did not match any known pattern.
    #[default]
    Unknown,
}

impl PeriodType {
    /// Database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Previous => "previous",
            Self::TwoYears => "two_years",
            Self::ThreeYears => "three_years",
            Self::Unknown => "unknown",
        }
    }

    /// Infer the period from a context reference.
    pub fn from_context_ref(context_ref: &str) -> Self {
        let ctx = context_ref.to_ascii_lowercase();
        for (needle, period) in [
            ("period0", Self::Current),
            ("balans0", Self::Current),
            ("period1", Self::Previous),
            ("balans1", Self::Previous),
            ("period2", Self::TwoYears),
            ("balans2", Self::TwoYears),
            ("period3", Self::ThreeYears),
            ("balans3", Self::ThreeYears),
        ] {
            if ctx.contains(needle) {
                return period;
            }
        }
        Self::Unknown
    }

    /// Years to subtract from the fiscal year to reach this period.
    pub const fn years_back(&self) -> Option<i32> {
        match self {
            Self::Current => Some(0),
            Self::Previous => Some(1),
            Self::TwoYears => Some(2),
            Self::ThreeYears => Some(3),
            Self::Unknown => None,
        }
    }
}

/// Parsed fact value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FactValue {
    /// Numeric value with scale applied.
    Number(Decimal),
    /// Plain-text value with markup stripped.
    Text(String),
    /// Numeric fact whose value could not be parsed.
    Missing,
}

impl FactValue {
    /// The numeric value, if any.
    pub const fn as_number(&self) -> Option<&Decimal> {
        match self {
            Self::Number(d) => Some(d),
            _ => None,
        }
    }

    /// The text value, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A single fact extracted from the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XbrlFact {
    /// Qualified name with namespace prefix, e.g. `se-gen-base:Nettoomsattning`.
    pub name: String,
    /// Parsed value.
    pub value: FactValue,
    /// Original string value before cleaning.
    pub raw_value: String,
    /// Context reference, e.g. `period0`.
    pub context_ref: String,
    /// Unit reference (numeric facts only).
    pub unit_ref: Option<String>,
    /// Decimal precision attribute (numeric facts only).
    pub decimals: Option<i32>,
    /// Scale attribute (numeric facts only).
    pub scale: Option<i32>,
    /// Inferred reporting period.
    pub period_type: PeriodType,
    /// True for `ix:nonFraction`, false for `ix:nonNumeric`.
    pub is_numeric: bool,
}

impl XbrlFact {
    /// Namespace prefix of the qualified name ("" when unprefixed).
    pub fn namespace(&self) -> &str {
        self.name.split_once(':').map_or("", |(ns, _)| ns)
    }

    /// Local part of the qualified name.
    pub fn local_name(&self) -> &str {
        self.name.split_once(':').map_or(&*self.name, |(_, l)| l)
    }
}

/// Period bounds parsed from a context definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPeriod {
    /// Instant date (balance contexts).
    pub instant: Option<String>,
    /// Period start date (duration contexts).
    pub start: Option<String>,
    /// Period end date (duration contexts).
    pub end: Option<String>,
}

/// Company identification extracted from `se-cd-base` facts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyFacts {
    /// Company name.
    pub name: String,
    /// Normalized organization number.
    pub orgnr: String,
    /// First day of the fiscal year.
    pub fiscal_year_start: Option<NaiveDate>,
    /// Last day of the fiscal year; its year is the fiscal year.
    pub fiscal_year_end: Option<NaiveDate>,
}

/// Audit report information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditInfo {
    /// Auditor first name.
    pub auditor_first_name: Option<String>,
    /// Auditor last name.
    pub auditor_last_name: Option<String>,
    /// Audit firm name.
    pub audit_firm: Option<String>,
    /// Audit completion date.
    pub audit_completion_date: Option<NaiveDate>,
    /// Audit opinion text.
    pub audit_opinion: Option<String>,
}

impl AuditInfo {
    /// True when no audit field was populated.
    pub const fn is_empty(&self) -> bool {
        self.auditor_first_name.is_none()
            && self.auditor_last_name.is_none()
            && self.audit_firm.is_none()
            && self.audit_completion_date.is_none()
            && self.audit_opinion.is_none()
    }
}

/// Board composition information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardInfo {
    /// Share of women among board members, percent.
    pub percent_women: Option<Decimal>,
    /// Share of men among board members, percent.
    pub percent_men: Option<Decimal>,
}

impl BoardInfo {
    /// True when no board field was populated.
    pub const fn is_empty(&self) -> bool {
        self.percent_women.is_none() && self.percent_men.is_none()
    }
}

/// Financial figures for one reporting period.
///
/// Known taxonomy names are projected onto the named fields; everything
/// else lands in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialFigures {
    /// Which period these figures cover.
    pub period_type: PeriodType,
    /// Period start, when the context carried one.
    pub period_start: Option<NaiveDate>,
    /// Period end, when the context carried one.
    pub period_end: Option<NaiveDate>,

    /// Nettoomsättning.
    pub revenue: Option<Decimal>,
    /// Rörelseintäkter.
    pub operating_income: Option<Decimal>,
    /// Rörelsekostnader.
    pub operating_costs: Option<Decimal>,
    /// Rörelseresultat.
    pub operating_profit: Option<Decimal>,
    /// Resultat efter finansiella poster.
    pub profit_after_financial: Option<Decimal>,
    /// Resultat före skatt.
    pub profit_before_tax: Option<Decimal>,
    /// Årets resultat.
    pub net_profit: Option<Decimal>,

    /// Övriga externa kostnader.
    pub other_external_costs: Option<Decimal>,
    /// Personalkostnader.
    pub personnel_costs: Option<Decimal>,
    /// Råvaror och förnödenheter.
    pub raw_materials_costs: Option<Decimal>,
    /// Handelsvaror.
    pub goods_costs: Option<Decimal>,
    /// Avskrivningar.
    pub depreciation: Option<Decimal>,

    /// Tillgångar.
    pub total_assets: Option<Decimal>,
    /// Anläggningstillgångar.
    pub fixed_assets: Option<Decimal>,
    /// Immateriella anläggningstillgångar.
    pub intangible_assets: Option<Decimal>,
    /// Materiella anläggningstillgångar.
    pub tangible_assets: Option<Decimal>,
    /// Finansiella anläggningstillgångar.
    pub financial_assets: Option<Decimal>,
    /// Omsättningstillgångar.
    pub current_assets: Option<Decimal>,
    /// Kortfristiga fordringar.
    pub receivables: Option<Decimal>,
    /// Kassa och bank.
    pub cash: Option<Decimal>,

    /// Eget kapital.
    pub equity: Option<Decimal>,
    /// Aktiekapital.
    pub share_capital: Option<Decimal>,
    /// Bundet eget kapital.
    pub restricted_equity: Option<Decimal>,
    /// Fritt eget kapital.
    pub unrestricted_equity: Option<Decimal>,
    /// Balanserat resultat.
    pub retained_earnings: Option<Decimal>,
    /// Kortfristiga skulder.
    pub current_liabilities: Option<Decimal>,
    /// Långfristiga skulder.
    pub long_term_liabilities: Option<Decimal>,
    /// Leverantörsskulder.
    pub accounts_payable: Option<Decimal>,

    /// Soliditet.
    pub equity_ratio: Option<Decimal>,
    /// Kassalikviditet.
    pub quick_ratio: Option<Decimal>,
    /// Avkastning eget kapital.
    pub return_on_equity: Option<Decimal>,
    /// Medelantal anställda.
    pub num_employees: Option<Decimal>,

    /// Unmapped numeric facts, keyed by qualified name.
    pub extra: BTreeMap<String, Decimal>,
}

impl FinancialFigures {
    /// Figures for a period with nothing populated yet.
    pub fn for_period(period_type: PeriodType) -> Self {
        Self {
            period_type,
            ..Self::default()
        }
    }
}

/// Complete result from parsing an annual report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    /// Company identification.
    pub company: CompanyFacts,
    /// Financial figures keyed by period.
    pub financials: BTreeMap<PeriodType, FinancialFigures>,
    /// Audit information, when the report carries an audit.
    pub audit: Option<AuditInfo>,
    /// Board composition, when reported.
    pub board: Option<BoardInfo>,
    /// Every extracted fact.
    pub facts: Vec<XbrlFact>,
    /// Context definitions keyed by id.
    pub contexts: BTreeMap<String, ContextPeriod>,
    /// Namespace prefixes seen among the facts.
    pub namespaces: BTreeSet<String>,
    /// Non-fatal problems encountered while parsing.
    pub warnings: Vec<String>,
}

impl ParseResult {
    /// Current-year figures.
    pub fn current_year(&self) -> Option<&FinancialFigures> {
        self.financials.get(&PeriodType::Current)
    }

    /// Previous-year figures.
    pub fn previous_year(&self) -> Option<&FinancialFigures> {
        self.financials.get(&PeriodType::Previous)
    }

    /// Fiscal year, taken from the fiscal-year end date.
    pub fn fiscal_year(&self) -> Option<i32> {
        use chrono::Datelike;
        self.company.fiscal_year_end.map(|d| d.year())
    }
}
