//! Bolagsverket VDM API client.
//!
//! Official OAuth2-authenticated JSON API. Provides authoritative identity
//! data (name, status, addresses, SNI codes) and the annual-report
//! document endpoints. Does not provide board members or financials.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use sundsvall_model::{
    CompanyRecord, CompanyStatus, Industry, format_orgnr, normalize_orgnr,
};
use sundsvall_net::{Gateway, NetError, RetryPolicy, TokenConfig, TokenManager};

use crate::error::{Result, SourceError};
use crate::provider::CompanyProvider;

/// Breaker key and provenance name for this source.
pub const SOURCE_NAME: &str = "bolagsverket";

/// Production API base URL.
pub const API_BASE_URL: &str = "https://gw.api.bolagsverket.se/vardefulla-datamangder/v1";

/// Production token endpoint.
pub const TOKEN_URL: &str = "https://portal.api.bolagsverket.se/oauth2/token";

/// Scope string sent with every token request.
pub const TOKEN_SCOPE: &str = "vardefulla-datamangder:ping vardefulla-datamangder:read";

/// Document downloads get a longer deadline than ordinary calls.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// ZIP local-file-header magic.
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4b, 0x03, 0x04];

/// Annual-report document metadata as returned by `/dokumentlista`.
///
/// The upstream schema has drifted over the years, so the record keeps the
/// raw object and answers questions structurally.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    raw: Value,
}

impl DocumentMeta {
    /// Wrap a raw document object.
    pub const fn new(raw: Value) -> Self {
        Self { raw }
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Value::as_str)
    }

    /// Document id used for download.
    pub fn document_id(&self) -> Option<&str> {
        self.str_field("dokumentId")
            .or_else(|| self.str_field("documentId"))
            .or_else(|| self.str_field("id"))
    }

    /// Fiscal year of the reporting period.
    ///
    /// Precedence: reporting-period fields, English synonyms, date
    /// fields, then a `20NN` scan of the document name and finally the
    /// document id.
    pub fn fiscal_year(&self) -> Option<i32> {
        for key in [
            "rapporteringsperiodTom",
            "rapporteringsperiodFrom",
            "rakenskapsarSlut",
            "rakenskapsarStart",
        ] {
            if let Some(year) = self.year_from_field(key) {
                return Some(year);
            }
        }

        for key in ["fiscalYear", "fiscal_year", "year"] {
            if let Some(year) = self.year_from_field(key) {
                return Some(year);
            }
        }

        for key in ["slutdatum", "periodEnd", "period_end", "endDate", "end_date"] {
            if let Some(year) = self.year_from_field(key) {
                return Some(year);
            }
        }

        for key in ["dokumentnamn", "name", "title"] {
            if let Some(year) = self.str_field(key).and_then(find_year) {
                return Some(year);
            }
        }

        self.str_field("dokumentId").and_then(find_year)
    }

    fn year_from_field(&self, key: &str) -> Option<i32> {
        match self.raw.get(key)? {
            Value::String(s) if s.len() >= 4 => s[..4].parse().ok(),
            Value::Number(n) => n.as_i64().map(|y| y as i32),
            _ => None,
        }
    }
}

/// Scan a string for a `20NN` year.
fn find_year(s: &str) -> Option<i32> {
    let bytes = s.as_bytes();
    bytes.windows(4).find_map(|w| {
        if w[0] == b'2' && w[1] == b'0' && w[2].is_ascii_digit() && w[3].is_ascii_digit() {
            std::str::from_utf8(w).ok()?.parse().ok()
        } else {
            None
        }
    })
}

/// Client for the Bolagsverket registry API.
#[derive(Debug)]
pub struct BolagsverketClient {
    gateway: Arc<Gateway>,
    tokens: TokenManager,
    api_base_url: String,
    document_retry: RetryPolicy,
}

impl BolagsverketClient {
    /// Create a client against the production endpoints.
    pub fn new(
        gateway: Arc<Gateway>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self::with_urls(gateway, client_id, client_secret, TOKEN_URL, API_BASE_URL)
    }

    /// Create a client against explicit endpoints (test environment).
    pub fn with_urls(
        gateway: Arc<Gateway>,
        client_id: Option<String>,
        client_secret: Option<String>,
        token_url: &str,
        api_base_url: &str,
    ) -> Self {
        let tokens = TokenManager::new(TokenConfig {
            token_url: token_url.to_string(),
            client_id,
            client_secret,
            scope: TOKEN_SCOPE.to_string(),
        });

        Self {
            gateway,
            tokens,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            document_retry: RetryPolicy::for_document_endpoints(),
        }
    }

    /// Whether OAuth credentials are configured.
    pub const fn is_configured(&self) -> bool {
        self.tokens.is_configured()
    }

    /// Fetch identity data for a company.
    ///
    /// Returns `Ok(None)` when the company is unknown upstream or when no
    /// token could be minted (provider-wide outage for this call).
    pub async fn get_company(&self, orgnr: &str) -> Result<Option<CompanyRecord>> {
        let clean = normalize_orgnr(orgnr);
        let formatted = format_orgnr(orgnr);

        // One transparent retry after a token refresh on 401.
        for attempt in 0..=1u8 {
            let Some(token) = self.tokens.token().await else {
                tracing::warn!(orgnr = %clean, "no OAuth token available");
                return Ok(None);
            };

            let request = self
                .gateway
                .client()
                .post(format!("{}/organisationer", self.api_base_url))
                .bearer_auth(&token)
                .json(&serde_json::json!({ "identitetsbeteckning": formatted }))
                .build()
                .map_err(NetError::from)?;

            match self.gateway.execute(SOURCE_NAME, request).await {
                Ok(response) => {
                    let data: Value = response.json().await.map_err(NetError::from)?;
                    tracing::info!(orgnr = %clean, "fetched from Bolagsverket");
                    return Ok(parse_organisation(&data, &clean));
                }
                Err(NetError::Status { status: 404, .. }) => {
                    tracing::info!(orgnr = %clean, "company not found at Bolagsverket");
                    return Ok(None);
                }
                Err(NetError::Status { status: 401, .. }) if attempt == 0 => {
                    tracing::warn!(orgnr = %clean, "got 401, refreshing token and retrying");
                    self.tokens.invalidate().await;
                }
                Err(NetError::Status { status: 401, .. }) => {
                    return Err(SourceError::Auth(SOURCE_NAME.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("the 401 retry loop always returns");
    }

    /// List annual-report documents for a company.
    pub async fn list_documents(&self, orgnr: &str) -> Result<Vec<DocumentMeta>> {
        let formatted = format_orgnr(orgnr);

        for attempt in 0..=1u8 {
            let Some(token) = self.tokens.token().await else {
                tracing::warn!(orgnr, "no OAuth token available for document list");
                return Ok(Vec::new());
            };

            let request = self
                .gateway
                .client()
                .post(format!("{}/dokumentlista", self.api_base_url))
                .bearer_auth(&token)
                .json(&serde_json::json!({ "identitetsbeteckning": formatted }))
                .build()
                .map_err(NetError::from)?;

            match self
                .gateway
                .execute_with_policy(SOURCE_NAME, request, &self.document_retry)
                .await
            {
                Ok(response) => {
                    let data: Value = response.json().await.map_err(NetError::from)?;
                    let documents: Vec<DocumentMeta> = data
                        .get("dokument")
                        .and_then(Value::as_array)
                        .map(|docs| docs.iter().cloned().map(DocumentMeta::new).collect())
                        .unwrap_or_default();
                    tracing::info!(orgnr, count = documents.len(), "listed annual reports");
                    return Ok(documents);
                }
                Err(NetError::Status { status: 404, .. }) => return Ok(Vec::new()),
                Err(NetError::Status { status: 401, .. }) if attempt == 0 => {
                    tracing::warn!(orgnr, "got 401 for document list, refreshing token");
                    self.tokens.invalidate().await;
                }
                Err(NetError::Status { status: 401, .. }) => {
                    return Err(SourceError::Auth(SOURCE_NAME.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("the 401 retry loop always returns");
    }

    /// Download an annual report as a ZIP archive.
    ///
    /// Returns `Ok(None)` when the document is missing or the body is not
    /// a ZIP archive.
    pub async fn download_document(&self, document_id: &str) -> Result<Option<Vec<u8>>> {
        for attempt in 0..=1u8 {
            let Some(token) = self.tokens.token().await else {
                return Ok(None);
            };

            let mut request = self
                .gateway
                .client()
                .get(format!("{}/dokument/{}", self.api_base_url, document_id))
                .bearer_auth(&token)
                .header("Accept", "application/zip")
                .build()
                .map_err(NetError::from)?;
            *request.timeout_mut() = Some(DOWNLOAD_TIMEOUT);

            match self
                .gateway
                .execute_with_policy(SOURCE_NAME, request, &self.document_retry)
                .await
            {
                Ok(response) => {
                    let bytes = response.bytes().await.map_err(NetError::from)?;
                    if !bytes.starts_with(&ZIP_MAGIC) {
                        tracing::warn!(document_id, "downloaded content is not a ZIP");
                        return Ok(None);
                    }
                    return Ok(Some(bytes.to_vec()));
                }
                Err(NetError::Status { status: 404, .. }) => return Ok(None),
                Err(NetError::Status { status: 401, .. }) if attempt == 0 => {
                    tracing::warn!(document_id, "got 401 for document, refreshing token");
                    self.tokens.invalidate().await;
                }
                Err(NetError::Status { status: 401, .. }) => {
                    return Err(SourceError::Auth(SOURCE_NAME.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("the 401 retry loop always returns");
    }

    /// Health probe: whether the API answers and the credentials work.
    pub async fn is_alive(&self) -> bool {
        let Some(token) = self.tokens.token().await else {
            return false;
        };

        let Ok(request) = self
            .gateway
            .client()
            .get(format!("{}/isalive", self.api_base_url))
            .bearer_auth(&token)
            .build()
        else {
            return false;
        };

        match self.gateway.execute(SOURCE_NAME, request).await {
            Ok(response) => response
                .text()
                .await
                .map(|body| body.trim() == "OK")
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl CompanyProvider for BolagsverketClient {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    async fn fetch_company(&self, orgnr: &str) -> Result<Option<CompanyRecord>> {
        self.get_company(orgnr).await
    }
}

/// Parse an `/organisationer` response into a partial record.
fn parse_organisation(data: &Value, orgnr: &str) -> Option<CompanyRecord> {
    let org = data.get("organisationer")?.as_array()?.first()?;
    let mut record = CompanyRecord::new(orgnr);

    // Primary name is the FORETAGSNAMN entry; fall back to the first.
    if let Some(name_list) = org
        .get("organisationsnamn")
        .and_then(|n| n.get("organisationsnamnLista"))
        .and_then(Value::as_array)
    {
        record.name = name_list
            .iter()
            .find(|n| {
                n.get("organisationsnamntyp")
                    .and_then(|t| t.get("kod"))
                    .and_then(Value::as_str)
                    == Some("FORETAGSNAMN")
            })
            .or_else(|| name_list.first())
            .and_then(|n| n.get("namn"))
            .and_then(Value::as_str)
            .map(String::from);
    }

    if let Some(form) = clear_text(org.get("organisationsform")) {
        record.company_type = Some(form);
    }
    if let Some(legal_form) = clear_text(org.get("juridiskForm")) {
        record.purpose = Some(legal_form);
    }

    if let Some(verksam) = org.get("verksamOrganisation") {
        if verksam.get("fel").is_none() {
            if let Some(kod) = verksam.get("kod").and_then(Value::as_str) {
                record.status = Some(if kod == "JA" {
                    CompanyStatus::Active
                } else {
                    CompanyStatus::Inactive
                });
            }
        }
    }

    if let Some(avreg) = org.get("avregistreradOrganisation") {
        if avreg
            .get("avregistreringsdatum")
            .and_then(Value::as_str)
            .is_some()
        {
            record.status = Some(CompanyStatus::Deregistered);
        }
    }

    // Ongoing procedures override the status.
    if let Some(lista) = org
        .get("pagaendeAvvecklingsEllerOmstruktureringsforfarande")
        .and_then(|f| f.get("pagaendeAvvecklingsEllerOmstruktureringsforfarandeLista"))
        .and_then(Value::as_array)
    {
        let codes: Vec<&str> = lista
            .iter()
            .filter_map(|p| p.get("kod").and_then(Value::as_str))
            .collect();
        if codes.contains(&"KK") {
            record.status = Some(CompanyStatus::Bankruptcy);
        } else if codes.contains(&"LI") {
            record.status = Some(CompanyStatus::Liquidation);
        }
    }

    if let Some(datum) = org.get("organisationsdatum") {
        if datum.get("fel").is_none() {
            record.registered_date = datum
                .get("registreringsdatum")
                .and_then(Value::as_str)
                .map(String::from);
        }
    }

    if let Some(postadress) = org.get("postadressOrganisation") {
        if postadress.get("fel").is_none() {
            if let Some(adress) = postadress.get("postadress") {
                record.postal_street = json_str(adress, "utdelningsadress");
                record.postal_code = json_str(adress, "postnummer");
                record.postal_city = json_str(adress, "postort");
            }
        }
    }

    if let Some(naringsgren) = org.get("naringsgrenOrganisation") {
        if naringsgren.get("fel").is_none() {
            if let Some(sni_list) = naringsgren.get("sni").and_then(Value::as_array) {
                record.industries = sni_list
                    .iter()
                    .enumerate()
                    .filter_map(|(i, sni)| {
                        Some(Industry {
                            sni_code: sni.get("kod")?.as_str()?.to_string(),
                            sni_description: json_str(sni, "klartext"),
                            is_primary: i == 0,
                            source: SOURCE_NAME.to_string(),
                        })
                    })
                    .collect();
            }
        }
    }

    Some(record)
}

/// `klartext` of a coded field, unless the API flagged an error for it.
fn clear_text(field: Option<&Value>) -> Option<String> {
    let field = field?;
    if field.get("fel").is_some() {
        return None;
    }
    json_str(field, "klartext")
}

fn json_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::Arc;
    use sundsvall_net::{BreakerRegistry, GatewayConfig, RateLimiter};

    fn sample_response() -> Value {
        serde_json::json!({
            "organisationer": [{
                "organisationsnamn": {
                    "organisationsnamnLista": [
                        {"namn": "Bifirma Nord", "organisationsnamntyp": {"kod": "BIFIRMA"}},
                        {"namn": "Testbolaget AB", "organisationsnamntyp": {"kod": "FORETAGSNAMN"}}
                    ]
                },
                "organisationsform": {"kod": "AB", "klartext": "Aktiebolag"},
                "juridiskForm": {"kod": "49", "klartext": "Övriga aktiebolag"},
                "verksamOrganisation": {"kod": "JA"},
                "organisationsdatum": {"registreringsdatum": "2001-05-15"},
                "postadressOrganisation": {
                    "postadress": {
                        "utdelningsadress": "Storgatan 1",
                        "postnummer": "85230",
                        "postort": "Sundsvall"
                    }
                },
                "naringsgrenOrganisation": {
                    "sni": [
                        {"kod": "62010", "klartext": "Dataprogrammering"},
                        {"kod": "71110", "klartext": "Arkitektverksamhet"}
                    ]
                }
            }]
        })
    }

    #[test]
    fn test_parse_organisation_happy_path() {
        let record = parse_organisation(&sample_response(), "5560125791").unwrap();
        assert_eq!(record.name.as_deref(), Some("Testbolaget AB"));
        assert_eq!(record.company_type.as_deref(), Some("Aktiebolag"));
        assert_eq!(record.status, Some(CompanyStatus::Active));
        assert_eq!(record.registered_date.as_deref(), Some("2001-05-15"));
        assert_eq!(record.postal_city.as_deref(), Some("Sundsvall"));
        assert_eq!(record.industries.len(), 2);
        assert!(record.industries[0].is_primary);
        assert!(!record.industries[1].is_primary);
    }

    #[test]
    fn test_parse_organisation_status_overrides() {
        let mut data = sample_response();
        data["organisationer"][0]["avregistreradOrganisation"] =
            serde_json::json!({"avregistreringsdatum": "2020-01-01"});
        let record = parse_organisation(&data, "5560125791").unwrap();
        assert_eq!(record.status, Some(CompanyStatus::Deregistered));

        data["organisationer"][0]["pagaendeAvvecklingsEllerOmstruktureringsforfarande"] =
            serde_json::json!({
                "pagaendeAvvecklingsEllerOmstruktureringsforfarandeLista": [{"kod": "KK"}]
            });
        let record = parse_organisation(&data, "5560125791").unwrap();
        assert_eq!(record.status, Some(CompanyStatus::Bankruptcy));
    }

    #[test]
    fn test_parse_organisation_empty() {
        let data = serde_json::json!({"organisationer": []});
        assert!(parse_organisation(&data, "5560125791").is_none());
    }

    #[test]
    fn test_find_year() {
        assert_eq!(find_year("arsredovisning-2023.zip"), Some(2023));
        assert_eq!(find_year("dok-1999"), None);
        assert_eq!(find_year("utan år"), None);
    }

    #[test]
    fn test_fiscal_year_precedence() {
        let doc = DocumentMeta::new(serde_json::json!({
            "dokumentId": "abc-2019-x",
            "dokumentnamn": "arsredovisning 2021",
            "rapporteringsperiodTom": "2023-12-31"
        }));
        assert_eq!(doc.fiscal_year(), Some(2023));

        let doc = DocumentMeta::new(serde_json::json!({
            "dokumentId": "abc-2019-x",
            "dokumentnamn": "arsredovisning 2021"
        }));
        assert_eq!(doc.fiscal_year(), Some(2021));

        let doc = DocumentMeta::new(serde_json::json!({"dokumentId": "abc-2019-x"}));
        assert_eq!(doc.fiscal_year(), Some(2019));

        let doc = DocumentMeta::new(serde_json::json!({"dokumentId": "abc"}));
        assert_eq!(doc.fiscal_year(), None);
    }

    fn test_client(server: &MockServer) -> BolagsverketClient {
        let gateway = Arc::new(
            Gateway::new(
                GatewayConfig {
                    retry: RetryPolicy {
                        max_retries: 0,
                        jitter: false,
                        ..RetryPolicy::default()
                    },
                    ..GatewayConfig::default()
                },
                Arc::new(RateLimiter::new()),
                Arc::new(BreakerRegistry::with_defaults()),
            )
            .unwrap(),
        );
        BolagsverketClient::with_urls(
            gateway,
            Some("id".into()),
            Some("secret".into()),
            &server.url("/oauth2/token"),
            &server.url("/vdm/v1"),
        )
    }

    async fn mock_token(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(200)
                    .json_body(serde_json::json!({"access_token": "tok", "expires_in": 3600}));
            })
            .await;
    }

    #[tokio::test]
    async fn test_get_company_not_found() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/vdm/v1/organisationer");
                then.status(404);
            })
            .await;

        let client = test_client(&server);
        let result = client.get_company("5560125791").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_get_company_sends_hyphenated_orgnr() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/vdm/v1/organisationer")
                    .header("authorization", "Bearer tok")
                    .json_body_includes(r#"{"identitetsbeteckning": "556012-5791"}"#);
                then.status(200).json_body(sample_response());
            })
            .await;

        let client = test_client(&server);
        let record = client.get_company("5560125791").await.unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("Testbolaget AB"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_persistent_401_retries_once_then_fails() {
        let server = MockServer::start_async().await;
        let token_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/oauth2/token");
                then.status(200)
                    .json_body(serde_json::json!({"access_token": "tok", "expires_in": 3600}));
            })
            .await;
        let resource_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/vdm/v1/organisationer");
                then.status(401);
            })
            .await;

        let client = test_client(&server);
        let err = client.get_company("5560125791").await.unwrap_err();
        assert!(matches!(err, SourceError::Auth(_)));

        // Exactly one transparent retry: two resource calls, and a fresh
        // token was minted after the invalidation.
        resource_mock.assert_hits_async(2).await;
        token_mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn test_list_documents() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/vdm/v1/dokumentlista");
                then.status(200).json_body(serde_json::json!({
                    "dokument": [
                        {"dokumentId": "d1", "rapporteringsperiodTom": "2023-12-31"},
                        {"dokumentId": "d2", "rapporteringsperiodTom": "2022-12-31"}
                    ]
                }));
            })
            .await;

        let client = test_client(&server);
        let docs = client.list_documents("5560125791").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].document_id(), Some("d1"));
        assert_eq!(docs[0].fiscal_year(), Some(2023));
    }

    #[tokio::test]
    async fn test_download_rejects_non_zip() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/vdm/v1/dokument/d1");
                then.status(200).body("<html>error page</html>");
            })
            .await;

        let client = test_client(&server);
        assert!(client.download_document("d1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_download_accepts_zip_magic() {
        let server = MockServer::start_async().await;
        mock_token(&server).await;
        let body: Vec<u8> = [0x50, 0x4b, 0x03, 0x04, 0x00, 0x01].to_vec();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/vdm/v1/dokument/d1");
                then.status(200).body(body.clone());
            })
            .await;

        let client = test_client(&server);
        let bytes = client.download_document("d1").await.unwrap().unwrap();
        assert!(bytes.starts_with(&ZIP_MAGIC));
    }
}
