//! Taxonomy knowledge: field mapping, fact categories, availability.

use rust_decimal::Decimal;

use crate::facts::FinancialFigures;

/// Coarse category of a fact, derived from its namespace prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactCategory {
    /// `se-gen-base`: general financial data.
    Financial,
    /// `se-ar-base`: audit report data.
    Audit,
    /// `se-cd-base`: company description.
    Company,
    /// `se-comp-base`: company compliance.
    Compliance,
    /// `se-bol-base`: company law compliance.
    Legal,
    /// `se-misc-base`: miscellaneous.
    Misc,
    /// Anything else.
    Other,
}

impl FactCategory {
    /// Database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Financial => "financial",
            Self::Audit => "audit",
            Self::Company => "company",
            Self::Compliance => "compliance",
            Self::Legal => "legal",
            Self::Misc => "misc",
            Self::Other => "other",
        }
    }

    /// Categorize by namespace prefix.
    pub fn from_namespace(namespace: &str) -> Self {
        match namespace {
            "se-gen-base" => Self::Financial,
            "se-ar-base" => Self::Audit,
            "se-cd-base" => Self::Company,
            "se-comp-base" => Self::Compliance,
            "se-bol-base" => Self::Legal,
            "se-misc-base" => Self::Misc,
            _ => Self::Other,
        }
    }
}

/// How widely a fact is present across filings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Present in every document.
    Core,
    /// Common `se-gen-base` fields.
    Common,
    /// Audit-report fields, only in audited filings.
    Optional,
    /// Everything else.
    Extended,
}

impl Availability {
    /// Database string representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Common => "common",
            Self::Optional => "optional",
            Self::Extended => "extended",
        }
    }

    /// Classify a qualified fact name.
    pub fn of(xbrl_name: &str) -> Self {
        const CORE_FIELDS: [&str; 9] = [
            "se-gen-base:Nettoomsattning",
            "se-gen-base:Rorelseresultat",
            "se-gen-base:AretsResultat",
            "se-gen-base:Tillgangar",
            "se-gen-base:EgetKapital",
            "se-gen-base:KortfristigaSkulder",
            "se-gen-base:Soliditet",
            "se-cd-base:ForetagetsNamn",
            "se-cd-base:Organisationsnummer",
        ];

        if CORE_FIELDS.contains(&xbrl_name) {
            Self::Core
        } else if xbrl_name.starts_with("se-gen-base:") {
            Self::Common
        } else if xbrl_name.starts_with("se-ar-base:") {
            Self::Optional
        } else {
            Self::Extended
        }
    }
}

// Company-description fact names.
pub(crate) const FACT_COMPANY_NAME: &str = "se-cd-base:ForetagetsNamn";
pub(crate) const FACT_ORGNR: &str = "se-cd-base:Organisationsnummer";
pub(crate) const FACT_FISCAL_START: &str = "se-cd-base:RakenskapsarForstaDag";
pub(crate) const FACT_FISCAL_END: &str = "se-cd-base:RakenskapsarSistaDag";

// Audit fact names.
pub(crate) const FACT_AUDITOR_FIRST_NAME: &str =
    "se-ar-base:UnderskriftRevisionsberattelseRevisorTilltalsnamn";
pub(crate) const FACT_AUDITOR_LAST_NAME: &str =
    "se-ar-base:UnderskriftRevisionsberattelseRevisorEfternamn";
pub(crate) const FACT_AUDIT_FIRM: &str = "se-cd-base:ValtRevisionsbolagsnamn";
pub(crate) const FACT_AUDIT_COMPLETION: &str = "se-ar-base:RevisionAvslutandeDatum";
pub(crate) const FACT_AUDIT_OPINION: &str = "se-ar-base:UttalandeText";

// Board composition fact names.
pub(crate) const FACT_BOARD_WOMEN: &str = "se-gen-base:FordelningStyrelseledamoterAndelKvinnor";
pub(crate) const FACT_BOARD_MEN: &str = "se-gen-base:FordelningStyrelseledamoterAndelMan";

/// Apply a numeric fact to the period's figures.
///
/// Returns true when the name mapped to a known field; unmapped facts go
/// into the `extra` bag by the caller.
pub(crate) fn apply_financial_fact(
    figures: &mut FinancialFigures,
    name: &str,
    value: Decimal,
) -> bool {
    let slot = match name {
        // Income statement
        "se-gen-base:Nettoomsattning" => &mut figures.revenue,
        "se-gen-base:RorelseintakterLagerforandringarMm" => &mut figures.operating_income,
        "se-gen-base:Rorelsekostnader" => &mut figures.operating_costs,
        "se-gen-base:Rorelseresultat" => &mut figures.operating_profit,
        "se-gen-base:ResultatEfterFinansiellaPoster" => &mut figures.profit_after_financial,
        "se-gen-base:ResultatForeSkatt" => &mut figures.profit_before_tax,
        "se-gen-base:AretsResultat" => &mut figures.net_profit,
        "se-gen-base:OvrigaExternaKostnader" => &mut figures.other_external_costs,
        "se-gen-base:Personalkostnader" => &mut figures.personnel_costs,
        "se-gen-base:RavarorFornodenheterKostnader" => &mut figures.raw_materials_costs,
        "se-gen-base:HandelsvarorKostnader" => &mut figures.goods_costs,
        "se-gen-base:AvsrivningarNedskrivningarMateriellaImmateriellaAnlaggningstillgangar" => {
            &mut figures.depreciation
        }

        // Balance sheet, assets
        "se-gen-base:Tillgangar" => &mut figures.total_assets,
        "se-gen-base:Anlaggningstillgangar" => &mut figures.fixed_assets,
        "se-gen-base:ImmateriellaAnlaggningstillgangar" => &mut figures.intangible_assets,
        "se-gen-base:MateriellaAnlaggningstillgangar" => &mut figures.tangible_assets,
        "se-gen-base:FinansiellaAnlaggningstillgangar" => &mut figures.financial_assets,
        "se-gen-base:Omsattningstillgangar" => &mut figures.current_assets,
        "se-gen-base:KortfristigaFordringar" => &mut figures.receivables,
        "se-gen-base:KassaBankExklRedovisningsmedel" => &mut figures.cash,

        // Balance sheet, equity and liabilities
        "se-gen-base:EgetKapital" => &mut figures.equity,
        "se-gen-base:Aktiekapital" => &mut figures.share_capital,
        "se-gen-base:BundetEgetKapital" => &mut figures.restricted_equity,
        "se-gen-base:FrittEgetKapital" => &mut figures.unrestricted_equity,
        "se-gen-base:BalanseratResultat" => &mut figures.retained_earnings,
        "se-gen-base:KortfristigaSkulder" => &mut figures.current_liabilities,
        "se-gen-base:LangfristigaSkulder" => &mut figures.long_term_liabilities,
        "se-gen-base:Leverantorsskulder" => &mut figures.accounts_payable,

        // Key ratios
        "se-gen-base:Soliditet" => &mut figures.equity_ratio,
        "se-gen-base:Kassalikviditet" => &mut figures.quick_ratio,
        "se-gen-base:AvkastningEgetKapital" => &mut figures.return_on_equity,
        "se-gen-base:MedelantaletAnstallda" => &mut figures.num_employees,

        _ => return false,
    };

    *slot = Some(value);
    true
}
