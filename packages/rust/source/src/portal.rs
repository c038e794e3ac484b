//! The procurement portal, driven over plain HTTP.
//!
//! Login and search are regular HTML forms: we replay their hidden fields and
//! fill in the visible ones. The results table is scraped with the same
//! selectors the portal has used for years.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use tenderflow_shared::{
    BundleHandle, Credentials, Result, SourceConfig, Tender, TenderflowError,
};

use crate::download::fetch_into;
use crate::{PORTAL_DATE_FORMAT, TenderSource};

/// User-Agent string for portal requests.
const USER_AGENT: &str = concat!("tenderflow/", env!("CARGO_PKG_VERSION"));

// Form control ids on the portal pages.
const LOGIN_FIELD_ID: &str = "ctl0_CONTENU_PAGE_login";
const PASSWORD_FIELD_ID: &str = "ctl0_CONTENU_PAGE_password";
const LOGIN_BUTTON_ID: &str = "ctl0_CONTENU_PAGE_authentificationButton";
const DATE_FIELD_ID: &str = "ctl0_CONTENU_PAGE_AdvancedSearch_dateMiseEnLigneCalculeStart";
const SEARCH_BUTTON_ID: &str = "ctl0_CONTENU_PAGE_AdvancedSearch_lancerRecherche";
const PAGE_SIZE_ID: &str = "ctl0_CONTENU_PAGE_resultSearch_listePageSizeTop";
const DCE_LINK_ID: &str = "ctl0_CONTENU_PAGE_linkDownloadDce";

static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table.table-results tbody tr").expect("valid selector"));
static REF_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".ref").expect("valid selector"));
static SUBJECT_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[id*="panelBlocObjet"]"#).expect("valid selector"));
static BUYER_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"div[id*="panelBlocDenomination"]"#).expect("valid selector")
});
static LOCATION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[id*="panelBlocLieuxExec"]"#).expect("valid selector"));
static DEADLINE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"td[headers="cons_dateEnd"]"#).expect("valid selector"));
static ACTION_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.actions a[href]").expect("valid selector"));
static FORM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("form").expect("valid selector"));
static HIDDEN_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"input[type="hidden"][name]"#).expect("valid selector")
});

// ---------------------------------------------------------------------------
// PortalSource
// ---------------------------------------------------------------------------

/// Tender source backed by the procurement portal.
pub struct PortalSource {
    client: Client,
    login_url: Url,
    search_url: Url,
    credentials: Credentials,
    page_size: u32,
}

impl std::fmt::Debug for PortalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalSource")
            .field("login_url", &self.login_url.as_str())
            .field("search_url", &self.search_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl PortalSource {
    /// Build a portal source; both portal URLs must be configured.
    pub fn new(config: &SourceConfig, credentials: Credentials) -> Result<Self> {
        let login_url = required_url(config.login_url.as_deref(), "source.login_url")?;
        let search_url = required_url(config.search_url.as_deref(), "source.search_url")?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .timeout(Duration::from_secs(config.page_timeout_secs))
            .build()
            .map_err(|e| TenderflowError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            login_url,
            search_url,
            credentials,
            page_size: config.page_size,
        })
    }

    async fn get_page(&self, url: &Url) -> Result<(Url, String)> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TenderflowError::Network(format!("{url}: {e}")))?;
        read_page(response).await
    }

    async fn post_form(&self, url: &Url, fields: &HashMap<String, String>) -> Result<(Url, String)> {
        let response = self
            .client
            .post(url.clone())
            .form(fields)
            .send()
            .await
            .map_err(|e| TenderflowError::Network(format!("{url}: {e}")))?;
        read_page(response).await
    }
}

#[async_trait]
impl TenderSource for PortalSource {
    fn name(&self) -> &str {
        "portal"
    }

    #[instrument(skip_all, fields(url = %self.login_url))]
    async fn connect(&self) -> Result<()> {
        let (page_url, html) = self.get_page(&self.login_url).await?;
        let (action, mut fields) = {
            let doc = Html::parse_document(&html);
            let form = form_containing(&doc, LOGIN_FIELD_ID).ok_or_else(|| {
                TenderflowError::Source("login form not found on login page".into())
            })?;
            (form_action(&form, &page_url), hidden_fields(&form))
        };

        fields.insert(field_name(LOGIN_FIELD_ID), self.credentials.username.clone());
        fields.insert(field_name(PASSWORD_FIELD_ID), self.credentials.password.clone());
        fields.insert(field_name(LOGIN_BUTTON_ID), String::new());

        let (_, body) = self.post_form(&action, &fields).await?;

        // A rejected login re-renders the form.
        if Html::parse_document(&body)
            .select(&id_selector(PASSWORD_FIELD_ID))
            .next()
            .is_some()
        {
            return Err(TenderflowError::Source("portal rejected the credentials".into()));
        }

        info!("logged in to portal");
        Ok(())
    }

    #[instrument(skip_all, fields(date = %date.format(PORTAL_DATE_FORMAT)))]
    async fn list_tenders(&self, date: NaiveDate) -> Result<Vec<Tender>> {
        let (page_url, html) = self.get_page(&self.search_url).await?;
        let (action, mut fields) = {
            let doc = Html::parse_document(&html);
            let form = form_containing(&doc, DATE_FIELD_ID).ok_or_else(|| {
                TenderflowError::Source("search form not found on search page".into())
            })?;
            (form_action(&form, &page_url), hidden_fields(&form))
        };

        fields.insert(
            field_name(DATE_FIELD_ID),
            date.format(PORTAL_DATE_FORMAT).to_string(),
        );
        fields.insert(field_name(SEARCH_BUTTON_ID), String::new());
        fields.insert(field_name(PAGE_SIZE_ID), self.page_size.to_string());

        let (results_url, body) = self.post_form(&action, &fields).await?;
        let tenders = parse_results(&body, &results_url);

        info!(count = tenders.len(), "tenders listed");
        Ok(tenders)
    }

    #[instrument(skip_all, fields(handle = %handle))]
    async fn trigger_download(&self, handle: &BundleHandle, landing_dir: &Path) -> Result<()> {
        let url = Url::parse(handle.as_str())
            .map_err(|e| TenderflowError::validation(format!("bad bundle handle {handle}: {e}")))?;

        // The handle points at the tender's detail page; the bundle sits behind
        // its DCE link. Handles that already point at a file are fetched directly.
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| TenderflowError::Download(format!("{url}: {e}")))?;

        if !is_html(&response) {
            drop(response);
            fetch_into(&self.client, &url, landing_dir).await?;
            return Ok(());
        }

        let (page_url, html) = read_page(response).await?;
        let dce_url = {
            let doc = Html::parse_document(&html);
            doc.select(&id_selector(DCE_LINK_ID))
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| page_url.join(href).ok())
        }
        .ok_or_else(|| TenderflowError::Source("download link not found on tender page".into()))?;

        debug!(%dce_url, "following DCE link");
        fetch_into(&self.client, &dce_url, landing_dir).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results table
// ---------------------------------------------------------------------------

/// Scrape tender rows from a results page. Rows missing any field are skipped.
pub fn parse_results(html: &str, base: &Url) -> Vec<Tender> {
    let doc = Html::parse_document(html);
    let mut tenders = Vec::new();

    for (index, row) in doc.select(&ROW_SEL).enumerate() {
        match parse_row(&row, base) {
            Some(tender) => tenders.push(tender),
            None => debug!(row = index, "skipping incomplete results row"),
        }
    }

    tenders
}

fn parse_row(row: &ElementRef<'_>, base: &Url) -> Option<Tender> {
    let reference = first_lines(row, &REF_SEL)?.join(" ");
    let subject = strip_label(&first_lines(row, &SUBJECT_SEL)?.join(" "), "Objet");
    let buyer = strip_label(&first_lines(row, &BUYER_SEL)?.join(" "), "Acheteur public");
    let location = first_lines(row, &LOCATION_SEL)?.join(", ");
    let deadline = first_lines(row, &DEADLINE_SEL)?.join(" ");
    let href = row
        .select(&ACTION_LINK_SEL)
        .next()
        .and_then(|a| a.value().attr("href"))?;
    let handle = base.join(href).ok()?;

    if reference.is_empty() || subject.is_empty() {
        return None;
    }

    Some(Tender {
        reference,
        subject,
        buyer,
        location,
        deadline,
        bundle_handle: BundleHandle(handle.to_string()),
    })
}

/// Trimmed non-empty text lines of the first element matching `sel`.
fn first_lines(row: &ElementRef<'_>, sel: &Selector) -> Option<Vec<String>> {
    let el = row.select(sel).next()?;
    Some(
        el.text()
            .flat_map(str::lines)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Drop a leading `Label :` prefix.
fn strip_label(text: &str, label: &str) -> String {
    match text.strip_prefix(label) {
        Some(rest) if rest.trim_start().starts_with(':') => {
            rest.trim_start().trim_start_matches(':').trim().to_string()
        }
        _ => text.trim().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Form helpers
// ---------------------------------------------------------------------------

/// The portal names controls `a$b$c` and ids them `a_b_c`.
fn field_name(id: &str) -> String {
    id.replacen("ctl0_CONTENU_PAGE_", "ctl0$CONTENU_PAGE$", 1)
        .replacen("AdvancedSearch_", "AdvancedSearch$", 1)
        .replacen("resultSearch_", "resultSearch$", 1)
}

fn id_selector(id: &str) -> Selector {
    Selector::parse(&format!("#{id}")).expect("control ids are valid CSS identifiers")
}

fn form_containing<'a>(doc: &'a Html, control_id: &str) -> Option<ElementRef<'a>> {
    let control = id_selector(control_id);
    doc.select(&FORM_SEL)
        .find(|form| form.select(&control).next().is_some())
}

fn form_action(form: &ElementRef<'_>, page_url: &Url) -> Url {
    form.value()
        .attr("action")
        .filter(|a| !a.trim().is_empty())
        .and_then(|a| page_url.join(a).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn hidden_fields(form: &ElementRef<'_>) -> HashMap<String, String> {
    form.select(&HIDDEN_SEL)
        .filter_map(|input| {
            let name = input.value().attr("name")?;
            let value = input.value().attr("value").unwrap_or_default();
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

fn required_url(raw: Option<&str>, key: &str) -> Result<Url> {
    let raw = raw.ok_or_else(|| {
        TenderflowError::config(format!("{key} is not set (config file or environment)"))
    })?;
    Url::parse(raw).map_err(|e| TenderflowError::config(format!("{key}: invalid URL {raw:?}: {e}")))
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("text/html"))
}

async fn read_page(response: reqwest::Response) -> Result<(Url, String)> {
    let url = response.url().clone();
    let status = response.status();
    if !status.is_success() {
        warn!(%url, %status, "portal returned an error page");
        return Err(TenderflowError::Network(format!("{url}: HTTP {status}")));
    }
    let body = response
        .text()
        .await
        .map_err(|e| TenderflowError::Network(format!("{url}: failed to read body: {e}")))?;
    Ok((url, body))
}
