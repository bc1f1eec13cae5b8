//! iXBRL fact extraction from XHTML documents.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;

use crate::archive::extract_xhtml;
use crate::error::{Result, XbrlError};
use crate::facts::{
    AuditInfo, BoardInfo, CompanyFacts, ContextPeriod, FactValue, FinancialFigures, ParseResult,
    PeriodType, XbrlFact,
};
use crate::taxonomy::{
    FACT_AUDIT_COMPLETION, FACT_AUDIT_FIRM, FACT_AUDIT_OPINION, FACT_AUDITOR_FIRST_NAME,
    FACT_AUDITOR_LAST_NAME, FACT_BOARD_MEN, FACT_BOARD_WOMEN, FACT_COMPANY_NAME, FACT_FISCAL_END,
    FACT_FISCAL_START, FACT_ORGNR, apply_financial_fact,
};

/// Parse an annual report from downloaded ZIP bytes.
pub fn parse_zip_bytes(content: &[u8]) -> Result<ParseResult> {
    let (xhtml, mut warnings) = extract_xhtml(content)?;
    let mut result = parse_document(&xhtml)?;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(result)
}

/// Parse an XHTML document with embedded iXBRL facts.
pub fn parse_document(content: &str) -> Result<ParseResult> {
    // NBSP frequently appears as a named entity, which XML does not
    // define; substitute it before parsing.
    let content = content.replace("&nbsp;", "\u{a0}");

    let mut reader = Reader::from_str(&content);
    reader.config_mut().check_end_names = false;

    let mut facts: Vec<XbrlFact> = Vec::new();
    let mut contexts = std::collections::BTreeMap::new();
    let mut warnings: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name.eq_ignore_ascii_case("ix:nonFraction") {
                    let attrs = attr_map(&e);
                    let raw = collect_inner_text(&mut reader)?;
                    if let Some(fact) = build_numeric_fact(&attrs, &raw, &mut warnings) {
                        facts.push(fact);
                    }
                } else if name.eq_ignore_ascii_case("ix:nonNumeric") {
                    let attrs = attr_map(&e);
                    let raw = collect_inner_text(&mut reader)?;
                    if let Some(fact) = build_text_fact(&attrs, &raw) {
                        facts.push(fact);
                    }
                } else if name.eq_ignore_ascii_case("xbrli:context") {
                    let attrs = attr_map(&e);
                    if let Some(id) = attrs.get("id") {
                        let period = read_context_period(&mut reader)?;
                        contexts.insert(id.clone(), period);
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name.eq_ignore_ascii_case("ix:nonFraction") {
                    let attrs = attr_map(&e);
                    if let Some(fact) = build_numeric_fact(&attrs, "", &mut warnings) {
                        facts.push(fact);
                    }
                } else if name.eq_ignore_ascii_case("ix:nonNumeric") {
                    let attrs = attr_map(&e);
                    if let Some(fact) = build_text_fact(&attrs, "") {
                        facts.push(fact);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XbrlError::Parse(format!("XML error: {e}"))),
        }
    }

    let namespaces = facts
        .iter()
        .filter(|f| f.name.contains(':'))
        .map(|f| f.namespace().to_string())
        .collect();

    let company = build_company_facts(&facts);
    let financials = build_financials(&facts, &contexts);
    let audit = build_audit_info(&facts);
    let board = build_board_info(&facts);

    Ok(ParseResult {
        company,
        financials,
        audit,
        board,
        facts,
        contexts,
        namespaces,
        warnings,
    })
}

/// Collect attribute key/value pairs from a start tag.
fn attr_map(e: &BytesStart<'_>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
        map.insert(key, value);
    }
    map
}

/// Collect the inner text of the element just opened, stripping any nested
/// markup and collapsing whitespace.
fn collect_inner_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut depth: u32 = 0;
    let mut pieces: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(_)) => depth += 1,
            Ok(Event::End(_)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                pieces.push(text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XbrlError::Parse(format!("XML error: {e}"))),
        }
    }

    Ok(pieces
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" "))
}

/// Resolve a predefined or numeric character reference.
fn resolve_entity(name: &str) -> Option<String> {
    match name {
        "amp" => Some("&".to_string()),
        "lt" => Some("<".to_string()),
        "gt" => Some(">".to_string()),
        "quot" => Some("\"".to_string()),
        "apos" => Some("'".to_string()),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code).map(|c| c.to_string())
        }
    }
}

/// Read the period definition inside an `xbrli:context` element.
fn read_context_period(reader: &mut Reader<&[u8]>) -> Result<ContextPeriod> {
    let mut period = ContextPeriod::default();
    let mut depth: u32 = 0;
    let mut current: Option<&'static str> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                current = if name.eq_ignore_ascii_case("xbrli:instant") {
                    Some("instant")
                } else if name.eq_ignore_ascii_case("xbrli:startDate") {
                    Some("start")
                } else if name.eq_ignore_ascii_case("xbrli:endDate") {
                    Some("end")
                } else {
                    None
                };
            }
            Ok(Event::End(_)) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                current = None;
            }
            Ok(Event::Text(t)) => {
                if let Some(field) = current {
                    let text = t
                        .unescape()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(t.as_ref()).into_owned());
                    let text = text.trim().to_string();
                    match field {
                        "instant" => period.instant = Some(text),
                        "start" => period.start = Some(text),
                        _ => period.end = Some(text),
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XbrlError::Parse(format!("XML error: {e}"))),
        }
    }

    Ok(period)
}

fn build_numeric_fact(
    attrs: &HashMap<String, String>,
    raw_value: &str,
    warnings: &mut Vec<String>,
) -> Option<XbrlFact> {
    let name = attrs.get("name")?.clone();
    let context_ref = attrs.get("contextRef").cloned().unwrap_or_default();
    let decimals = attrs.get("decimals").and_then(|d| d.parse::<i32>().ok());
    let scale = attrs.get("scale").and_then(|s| s.parse::<i32>().ok());

    let value = if raw_value.is_empty() {
        FactValue::Missing
    } else {
        match parse_numeric_value(raw_value, scale) {
            Some(v) => FactValue::Number(v),
            None => {
                warnings.push(format!("failed to parse numeric value '{raw_value}'"));
                tracing::warn!(name = %name, raw = raw_value, "numeric fact did not parse");
                FactValue::Missing
            }
        }
    };

    Some(XbrlFact {
        period_type: PeriodType::from_context_ref(&context_ref),
        name,
        value,
        raw_value: raw_value.to_string(),
        unit_ref: attrs.get("unitRef").cloned(),
        decimals,
        scale,
        context_ref,
        is_numeric: true,
    })
}

fn build_text_fact(attrs: &HashMap<String, String>, raw_value: &str) -> Option<XbrlFact> {
    let name = attrs.get("name")?.clone();
    let context_ref = attrs.get("contextRef").cloned().unwrap_or_default();

    Some(XbrlFact {
        period_type: PeriodType::from_context_ref(&context_ref),
        name,
        value: FactValue::Text(raw_value.to_string()),
        raw_value: raw_value.to_string(),
        unit_ref: None,
        decimals: None,
        scale: None,
        context_ref,
        is_numeric: false,
    })
}

/// Clean and parse a numeric string, applying the scale factor.
///
/// Handles Swedish formatting: spaces and NBSP as thousand separators,
/// comma decimal separator, and `-`, `−` or parentheses as negation.
fn parse_numeric_value(raw: &str, scale: Option<i32>) -> Option<Decimal> {
    let mut s: String = raw
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}')
        .collect::<String>()
        .replace(',', ".");

    let mut negative = false;
    if let Some(stripped) = s.strip_prefix('-').or_else(|| s.strip_prefix('−')) {
        negative = true;
        s = stripped.to_string();
    }
    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }

    let mut value = Decimal::from_str(&s).ok()?;
    if negative {
        value = -value;
    }
    if let Some(exp) = scale {
        value *= pow10(exp);
    }
    Some(value)
}

fn pow10(exp: i32) -> Decimal {
    let ten = Decimal::from(10);
    let mut result = Decimal::ONE;
    for _ in 0..exp.unsigned_abs() {
        if exp >= 0 {
            result *= ten;
        } else {
            result /= ten;
        }
    }
    result
}

/// Parse a date in any of the formats seen in filings.
fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d", "%Y%m%d", "%d.%m.%Y", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }
    None
}

fn fact_text(facts: &[XbrlFact], name: &str) -> Option<String> {
    facts.iter().find(|f| f.name == name).map(|f| match &f.value {
        FactValue::Text(t) => t.clone(),
        FactValue::Number(n) => n.to_string(),
        FactValue::Missing => f.raw_value.clone(),
    })
}

fn build_company_facts(facts: &[XbrlFact]) -> CompanyFacts {
    CompanyFacts {
        name: fact_text(facts, FACT_COMPANY_NAME).unwrap_or_default(),
        orgnr: fact_text(facts, FACT_ORGNR)
            .map(|s| s.chars().filter(|c| *c != '-' && *c != ' ').collect())
            .unwrap_or_default(),
        fiscal_year_start: fact_text(facts, FACT_FISCAL_START).and_then(|s| parse_date(&s)),
        fiscal_year_end: fact_text(facts, FACT_FISCAL_END).and_then(|s| parse_date(&s)),
    }
}

fn build_financials(
    facts: &[XbrlFact],
    contexts: &std::collections::BTreeMap<String, ContextPeriod>,
) -> std::collections::BTreeMap<PeriodType, FinancialFigures> {
    let mut financials = std::collections::BTreeMap::new();

    for fact in facts {
        if fact.period_type == PeriodType::Unknown || !fact.is_numeric {
            continue;
        }
        let FactValue::Number(value) = &fact.value else {
            continue;
        };

        let figures = financials
            .entry(fact.period_type)
            .or_insert_with(|| FinancialFigures::for_period(fact.period_type));

        if !apply_financial_fact(figures, &fact.name, *value) {
            figures.extra.insert(fact.name.clone(), *value);
        }
    }

    // Attach period bounds from the context definitions.
    for (id, ctx) in contexts {
        let period = PeriodType::from_context_ref(id);
        let Some(figures) = financials.get_mut(&period) else {
            continue;
        };
        if let Some(instant) = ctx.instant.as_deref().and_then(parse_date_opt) {
            figures.period_end.get_or_insert(instant);
        }
        if let Some(start) = ctx.start.as_deref().and_then(parse_date_opt) {
            figures.period_start.get_or_insert(start);
        }
        if let Some(end) = ctx.end.as_deref().and_then(parse_date_opt) {
            figures.period_end = Some(end);
        }
    }

    financials
}

fn parse_date_opt(s: &str) -> Option<NaiveDate> {
    parse_date(s)
}

fn build_audit_info(facts: &[XbrlFact]) -> Option<AuditInfo> {
    let audit = AuditInfo {
        auditor_first_name: fact_text(facts, FACT_AUDITOR_FIRST_NAME),
        auditor_last_name: fact_text(facts, FACT_AUDITOR_LAST_NAME),
        audit_firm: fact_text(facts, FACT_AUDIT_FIRM),
        audit_completion_date: fact_text(facts, FACT_AUDIT_COMPLETION)
            .and_then(|s| parse_date(&s)),
        audit_opinion: fact_text(facts, FACT_AUDIT_OPINION),
    };
    (!audit.is_empty()).then_some(audit)
}

fn build_board_info(facts: &[XbrlFact]) -> Option<BoardInfo> {
    let number_of = |name: &str| {
        facts
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.value.as_number().copied())
    };

    let board = BoardInfo {
        percent_women: number_of(FACT_BOARD_WOMEN),
        percent_men: number_of(FACT_BOARD_MEN),
    };
    (!board.is_empty()).then_some(board)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_numeric_plain() {
        assert_eq!(parse_numeric_value("123", None), Some(dec("123")));
        assert_eq!(parse_numeric_value("12 345", None), Some(dec("12345")));
        assert_eq!(parse_numeric_value("12\u{a0}345", None), Some(dec("12345")));
    }

    #[test]
    fn test_parse_numeric_decimal_comma() {
        assert_eq!(parse_numeric_value("1,5", None), Some(dec("1.5")));
    }

    #[test]
    fn test_parse_numeric_negatives() {
        assert_eq!(parse_numeric_value("-45", None), Some(dec("-45")));
        assert_eq!(parse_numeric_value("−45", None), Some(dec("-45")));
        assert_eq!(parse_numeric_value("(45)", None), Some(dec("-45")));
    }

    #[test]
    fn test_parse_numeric_scale() {
        assert_eq!(parse_numeric_value("123", Some(3)), Some(dec("123000")));
        assert_eq!(parse_numeric_value("1234", Some(-2)), Some(dec("12.34")));
        assert_eq!(parse_numeric_value("123", Some(0)), Some(dec("123")));
    }

    #[test]
    fn test_parse_numeric_garbage() {
        assert_eq!(parse_numeric_value("ej till.", None), None);
    }

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:ix="http://www.xbrl.org/2013/inlineXBRL" xmlns:xbrli="http://www.xbrl.org/2003/instance">
<head><title>Arsredovisning</title></head>
<body>
  <div style="display:none">
    <xbrli:context id="period0">
      <xbrli:period>
        <xbrli:startDate>2024-01-01</xbrli:startDate>
        <xbrli:endDate>2024-12-31</xbrli:endDate>
      </xbrli:period>
    </xbrli:context>
    <xbrli:context id="balans0">
      <xbrli:period><xbrli:instant>2024-12-31</xbrli:instant></xbrli:period>
    </xbrli:context>
    <xbrli:context id="period1">
      <xbrli:period>
        <xbrli:startDate>2023-01-01</xbrli:startDate>
        <xbrli:endDate>2023-12-31</xbrli:endDate>
      </xbrli:period>
    </xbrli:context>
  </div>
  <p><ix:nonNumeric name="se-cd-base:ForetagetsNamn" contextRef="period0">Test <b>AB</b></ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-cd-base:Organisationsnummer" contextRef="period0">556012-5791</ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-cd-base:RakenskapsarForstaDag" contextRef="period0">2024-01-01</ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-cd-base:RakenskapsarSistaDag" contextRef="period0">2024-12-31</ix:nonNumeric></p>
  <td><ix:nonFraction name="se-gen-base:Nettoomsattning" contextRef="period0" unitRef="SEK" decimals="-3" scale="3">12 345</ix:nonFraction></td>
  <td><ix:nonFraction name="se-gen-base:Nettoomsattning" contextRef="period1" unitRef="SEK" decimals="-3" scale="3">10 000</ix:nonFraction></td>
  <td><ix:nonFraction name="se-gen-base:AretsResultat" contextRef="period0" unitRef="SEK" scale="3">(45)</ix:nonFraction></td>
  <td><ix:nonFraction name="se-gen-base:Soliditet" contextRef="period0" scale="0">45,2</ix:nonFraction></td>
  <td><ix:nonFraction name="se-gen-base:EttOkantFalt" contextRef="period0">7</ix:nonFraction></td>
  <td><ix:nonFraction name="se-gen-base:Trasig" contextRef="period0">ej tillämpl.</ix:nonFraction></td>
  <p><ix:nonNumeric name="se-ar-base:UttalandeText" contextRef="period0">Revisionen har utförts enligt god sed.</ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-ar-base:UnderskriftRevisionsberattelseRevisorTilltalsnamn" contextRef="period0">Anna</ix:nonNumeric></p>
  <p><ix:nonNumeric name="se-ar-base:UnderskriftRevisionsberattelseRevisorEfternamn" contextRef="period0">Svensson</ix:nonNumeric></p>
  <td><ix:nonFraction name="se-gen-base:FordelningStyrelseledamoterAndelKvinnor" contextRef="period0">40</ix:nonFraction></td>
  <td><ix:nonFraction name="se-gen-base:FordelningStyrelseledamoterAndelMan" contextRef="period0">60</ix:nonFraction></td>
</body>
</html>"#;

    #[test]
    fn test_parse_document_company_info() {
        let result = parse_document(SAMPLE).unwrap();
        assert_eq!(result.company.name, "Test AB");
        assert_eq!(result.company.orgnr, "5560125791");
        assert_eq!(
            result.company.fiscal_year_end,
            Some(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap())
        );
        assert_eq!(result.fiscal_year(), Some(2024));
    }

    #[test]
    fn test_parse_document_financials() {
        let result = parse_document(SAMPLE).unwrap();

        let current = result.current_year().unwrap();
        assert_eq!(current.revenue, Some(dec("12345000")));
        assert_eq!(current.net_profit, Some(dec("-45000")));
        assert_eq!(current.equity_ratio, Some(dec("45.2")));
        assert_eq!(
            current.period_start,
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        );
        assert_eq!(
            current.period_end,
            Some(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap())
        );

        let previous = result.previous_year().unwrap();
        assert_eq!(previous.revenue, Some(dec("10000000")));

        // Unmapped numeric facts land in the extra bag.
        assert_eq!(
            current.extra.get("se-gen-base:EttOkantFalt"),
            Some(&dec("7"))
        );
    }

    #[test]
    fn test_parse_document_contexts() {
        let result = parse_document(SAMPLE).unwrap();
        let ctx = result.contexts.get("period0").unwrap();
        assert_eq!(ctx.start.as_deref(), Some("2024-01-01"));
        assert_eq!(ctx.end.as_deref(), Some("2024-12-31"));
        let balans = result.contexts.get("balans0").unwrap();
        assert_eq!(balans.instant.as_deref(), Some("2024-12-31"));
    }

    #[test]
    fn test_parse_document_audit_and_board() {
        let result = parse_document(SAMPLE).unwrap();
        let audit = result.audit.unwrap();
        assert_eq!(audit.auditor_first_name.as_deref(), Some("Anna"));
        assert_eq!(audit.auditor_last_name.as_deref(), Some("Svensson"));
        assert!(audit.audit_opinion.unwrap().contains("god sed"));

        let board = result.board.unwrap();
        assert_eq!(board.percent_women, Some(dec("40")));
        assert_eq!(board.percent_men, Some(dec("60")));
    }

    #[test]
    fn test_unparseable_numeric_is_warning_not_error() {
        let result = parse_document(SAMPLE).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("ej tillämpl.")));
        let broken = result
            .facts
            .iter()
            .find(|f| f.name == "se-gen-base:Trasig")
            .unwrap();
        assert_eq!(broken.value, FactValue::Missing);
    }

    #[test]
    fn test_namespaces_collected() {
        let result = parse_document(SAMPLE).unwrap();
        assert!(result.namespaces.contains("se-gen-base"));
        assert!(result.namespaces.contains("se-cd-base"));
        assert!(result.namespaces.contains("se-ar-base"));
    }

    #[test]
    fn test_fact_serde_round_trip() {
        let result = parse_document(SAMPLE).unwrap();
        let fact = result
            .facts
            .iter()
            .find(|f| f.name == "se-gen-base:Nettoomsattning")
            .unwrap();
        let json = serde_json::to_string(fact).unwrap();
        let back: XbrlFact = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, fact);
    }

    #[test]
    fn test_amp_entity_in_text_fact() {
        let doc = r#"<html xmlns:ix="x"><body>
            <ix:nonNumeric name="se-cd-base:ValtRevisionsbolagsnamn" contextRef="period0">Eriksson &amp; Co</ix:nonNumeric>
        </body></html>"#;
        let result = parse_document(doc).unwrap();
        assert_eq!(result.facts[0].value.as_text(), Some("Eriksson & Co"));
    }

    #[test]
    fn test_nbsp_entity_in_value() {
        let doc = r#"<html xmlns:ix="x"><body>
            <ix:nonFraction name="se-gen-base:Tillgangar" contextRef="balans0">1&nbsp;234</ix:nonFraction>
        </body></html>"#;
        let result = parse_document(doc).unwrap();
        let fact = &result.facts[0];
        assert_eq!(fact.value, FactValue::Number(dec("1234")));
    }

    #[test]
    fn test_zip_round_trip() {
        use std::io::{Cursor, Write};
        use zip::write::SimpleFileOptions;

        let mut buf = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buf);
        writer
            .start_file("report.xhtml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(SAMPLE.as_bytes()).unwrap();
        writer.finish().unwrap();
        let bytes = buf.into_inner();

        let result = parse_zip_bytes(&bytes).unwrap();
        assert_eq!(result.company.orgnr, "5560125791");
        assert_eq!(
            result.current_year().unwrap().revenue,
            Some(dec("12345000"))
        );
    }
}
