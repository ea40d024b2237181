pub mod session;
pub mod store;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use survey_spec::answers::PAGE_ID_FIELD;
use survey_spec::{
    AssetRegistry, DryRunReport, RespondentDocument, SurveyError, SurveySpec, content_type,
    merge, render_live_page,
};

pub use session::{is_valid_token, issue_token};
pub use store::{DocumentStore, FileStore, MemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read survey spec {}: {source}", .path.display())]
    ReadSpec {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Survey(#[from] SurveyError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
    #[error("asset '{0}' is not available")]
    MissingAsset(String),
}

/// One incoming page request, already decoded from the transport.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageRequest {
    pub token: Option<String>,
    pub pix: Option<String>,
    /// Submitted form fields, present for POST requests.
    pub form: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageResponse {
    /// Start over under a fresh session.
    Redirect { location: String },
    Page {
        markup: String,
        page_id: String,
        /// The respondent reached the terminal page.
        finished: bool,
    },
}

/// Image bytes served for an alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// A loaded, validated survey ready to serve.
pub struct LoadedSurvey {
    pub spec: SurveySpec,
    pub assets: AssetRegistry,
    pub report: DryRunReport,
}

/// Reads, flattens, and dry-runs the survey at `path`.
///
/// Image paths resolve relative to the spec file's directory.
pub fn load_survey(path: &Path) -> Result<LoadedSurvey, EngineError> {
    let text = fs::read_to_string(path).map_err(|source| EngineError::ReadSpec {
        path: path.to_path_buf(),
        source,
    })?;
    let base = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let assets = AssetRegistry::new(base);
    let (spec, report) = survey_spec::load(&text, &assets)?;
    info!(
        path = %path.display(),
        pages = spec.len(),
        "loaded survey '{}'",
        spec.title
    );
    Ok(LoadedSurvey {
        spec,
        assets,
        report,
    })
}

/// Normalizes a base URL to `/prefix` form; the root is the empty string.
pub fn normalize_base_url(base: &str) -> String {
    let trimmed = base.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Serves survey pages and records answers for every respondent.
pub struct SurveyEngine {
    spec: SurveySpec,
    assets: AssetRegistry,
    store: Box<dyn DocumentStore>,
    base_url: String,
    lock: Mutex<()>,
}

impl SurveyEngine {
    pub fn new(spec: SurveySpec, assets: AssetRegistry, store: Box<dyn DocumentStore>) -> Self {
        let base_url = normalize_base_url(spec.url_base.as_deref().unwrap_or_default());
        Self {
            spec,
            assets,
            store,
            base_url,
            lock: Mutex::new(()),
        }
    }

    pub fn from_loaded(loaded: LoadedSurvey, store: Box<dyn DocumentStore>) -> Self {
        Self::new(loaded.spec, loaded.assets, store)
    }

    /// Overrides the base URL taken from the survey document.
    pub fn with_base_url(mut self, base: &str) -> Self {
        self.base_url = normalize_base_url(base);
        self
    }

    pub fn spec(&self) -> &SurveySpec {
        &self.spec
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handles one page request.
    ///
    /// Without a usable token the respondent is redirected to a fresh
    /// session. Submitted fields are merged into the stored document before
    /// the requested page is rendered; a stale page index also restarts.
    pub fn handle(&self, request: &PageRequest) -> Result<PageResponse, EngineError> {
        let Some(token) = request
            .token
            .as_deref()
            .filter(|token| is_valid_token(token))
        else {
            if let Some(token) = &request.token {
                warn!(token = %token, "rejecting malformed session token");
            }
            return Ok(self.restart());
        };

        let doc = match &request.form {
            Some(form) => self.record(token, form)?,
            None => self.load(token)?,
        };

        let Some(pix) = request
            .pix
            .as_deref()
            .and_then(|pix| pix.trim().parse::<usize>().ok())
        else {
            debug!(token, "missing or malformed page index");
            return Ok(self.restart());
        };

        let url = format!("?pix={}&token={}", pix + 1, token);
        match render_live_page(&self.spec, pix, &url, token, &doc, &self.assets) {
            Ok(page) => {
                if page.terminal {
                    info!(token, "respondent finished");
                }
                Ok(PageResponse::Page {
                    markup: page.markup,
                    page_id: page.page_id,
                    finished: page.terminal,
                })
            }
            Err(SurveyError::OutOfRange { index, len }) => {
                info!(token, index, len, "stale page index, starting over");
                Ok(self.restart())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Returns the bytes behind an image alias.
    pub fn asset(&self, alias: &str) -> Result<Asset, EngineError> {
        let path = self
            .assets
            .resolve(alias)
            .ok_or_else(|| EngineError::MissingAsset(alias.to_string()))?;
        let bytes = fs::read(&path).map_err(|err| {
            warn!(alias, path = %path.display(), "failed to read asset: {}", err);
            EngineError::MissingAsset(alias.to_string())
        })?;
        Ok(Asset {
            bytes,
            content_type: content_type(&path),
        })
    }

    fn restart(&self) -> PageResponse {
        let token = issue_token();
        debug!(token = %token, "issued session");
        PageResponse::Redirect {
            location: format!("{}/?pix=0&token={}", self.base_url, token),
        }
    }

    fn load(&self, token: &str) -> Result<RespondentDocument, EngineError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.store.load(token)?)
    }

    fn record(
        &self,
        token: &str,
        form: &Map<String, Value>,
    ) -> Result<RespondentDocument, EngineError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.store.load(token)?;
        match form.get(PAGE_ID_FIELD).and_then(Value::as_str) {
            Some(page_id) => {
                merge(&mut doc, page_id, form);
                self.store.save(token, &doc)?;
                debug!(token, page_id, "recorded answers");
            }
            None => warn!(token, "submission without page id, nothing recorded"),
        }
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use survey_spec::{SurveyDocument, flatten};
    use tempfile::TempDir;

    fn spec() -> SurveySpec {
        let document = SurveyDocument::from_value(json!({
            "title": "Test",
            "pages": [
                { "pid": "intro", "lines": ["Hello {token}"] },
                {
                    "pid": "q",
                    "lines": [["likert", "Rate it", "score"]],
                    "continue": "choice",
                    "values": ["Yes", "No"]
                },
                { "pid": "bye", "lines": ["Done"], "continue": "end" }
            ]
        }))
        .expect("deserialize");
        flatten(&document).expect("flatten")
    }

    fn engine() -> SurveyEngine {
        SurveyEngine::new(spec(), AssetRegistry::new("."), Box::new(MemoryStore::new()))
    }

    fn request(token: Option<&str>, pix: Option<&str>, form: Option<Value>) -> PageRequest {
        PageRequest {
            token: token.map(str::to_string),
            pix: pix.map(str::to_string),
            form: form.map(|value| value.as_object().cloned().expect("object")),
        }
    }

    fn redirect_token(response: PageResponse, base: &str) -> String {
        match response {
            PageResponse::Redirect { location } => {
                let prefix = format!("{base}/?pix=0&token=");
                let token = location
                    .strip_prefix(&prefix)
                    .unwrap_or_else(|| panic!("unexpected location {location}"));
                assert!(is_valid_token(token));
                token.to_string()
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    fn page(response: PageResponse) -> (String, String, bool) {
        match response {
            PageResponse::Page {
                markup,
                page_id,
                finished,
            } => (markup, page_id, finished),
            other => panic!("expected page, got {other:?}"),
        }
    }

    #[test]
    fn sessionless_visit_redirects_to_first_page() {
        let engine = engine();
        let response = engine.handle(&request(None, None, None)).expect("handle");
        redirect_token(response, "");
    }

    #[test]
    fn malformed_token_is_treated_as_missing() {
        let engine = engine();
        let response = engine
            .handle(&request(Some("../../etc"), Some("0"), None))
            .expect("handle");
        redirect_token(response, "");
    }

    #[test]
    fn base_url_prefixes_redirects() {
        let engine = engine().with_base_url("study/");
        assert_eq!(engine.base_url(), "/study");
        let response = engine.handle(&request(None, None, None)).expect("handle");
        redirect_token(response, "/study");
    }

    #[test]
    fn get_renders_requested_page_with_next_link() {
        let engine = engine();
        let (markup, page_id, finished) =
            page(engine.handle(&request(Some("tok"), Some("0"), None)).expect("handle"));
        assert_eq!(page_id, "intro");
        assert!(!finished);
        assert!(markup.contains("Hello tok"));
        assert!(markup.contains("token&#x3D;tok") || markup.contains("token=tok"));
    }

    #[test]
    fn post_merges_answers_before_rendering() {
        let store = MemoryStore::new();
        let engine = SurveyEngine::new(spec(), AssetRegistry::new("."), Box::new(store));
        let form = json!({ "_pid": "q", "score": "2", "_res": "No" });
        let (markup, page_id, finished) = page(
            engine
                .handle(&request(Some("tok"), Some("2"), Some(form)))
                .expect("handle"),
        );
        assert_eq!(page_id, "bye");
        assert!(finished);
        assert!(markup.contains("Done"));

        let doc = engine.load("tok").expect("load");
        assert_eq!(Value::Object(doc), json!({ "q": { "score": "2", "_res": "No" } }));

        // revisiting the question page restores the stored answer
        let (markup, _, _) =
            page(engine.handle(&request(Some("tok"), Some("1"), None)).expect("handle"));
        assert!(markup.contains(r#"value="2" checked="checked""#));
    }

    #[test]
    fn seeded_answers_preselect_likert() {
        let mut doc = RespondentDocument::new();
        merge(&mut doc, "q", json!({ "score": "-2" }).as_object().expect("object"));
        let store = MemoryStore::with_document("tok", doc);
        let engine = SurveyEngine::new(spec(), AssetRegistry::new("."), Box::new(store));
        let (markup, page_id, _) =
            page(engine.handle(&request(Some("tok"), Some("1"), None)).expect("handle"));
        assert_eq!(page_id, "q");
        assert!(markup.contains(r#"value="-2" checked="checked""#));
    }

    #[test]
    fn missing_session_image_does_not_fail_the_page() {
        let dir = TempDir::new().expect("temp dir");
        let document = SurveyDocument::from_value(json!({
            "pages": [ { "lines": [["img", "{token}.png"], "Look"], "continue": "end" } ]
        }))
        .expect("deserialize");
        let engine = SurveyEngine::new(
            flatten(&document).expect("flatten"),
            AssetRegistry::new(dir.path()),
            Box::new(MemoryStore::new()),
        );
        let (markup, _, finished) =
            page(engine.handle(&request(Some("tok"), Some("0"), None)).expect("handle"));
        assert!(finished);
        assert!(markup.contains(r#"src="img/missing""#));
        assert!(matches!(
            engine.asset("missing"),
            Err(EngineError::MissingAsset(_))
        ));
    }

    #[test]
    fn next_button_records_nothing() {
        let engine = engine();
        let form = json!({ "_pid": "intro", "__next": "Next" });
        engine
            .handle(&request(Some("tok"), Some("1"), Some(form)))
            .expect("handle");
        assert!(engine.load("tok").expect("load").is_empty());
    }

    #[test]
    fn submission_without_page_id_is_ignored() {
        let engine = engine();
        let form = json!({ "score": "1" });
        engine
            .handle(&request(Some("tok"), Some("1"), Some(form)))
            .expect("handle");
        assert!(engine.load("tok").expect("load").is_empty());
    }

    #[test]
    fn stale_or_malformed_index_restarts() {
        let engine = engine();
        for pix in [Some("3"), Some("-1"), Some("abc"), None] {
            let response = engine.handle(&request(Some("tok"), pix, None)).expect("handle");
            redirect_token(response, "");
        }
    }

    #[test]
    fn corrupt_document_aborts_without_overwriting() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::new(dir.path());
        fs::write(store.path_for("tok"), "{broken").unwrap();
        let engine = SurveyEngine::new(spec(), AssetRegistry::new("."), Box::new(store.clone()));

        let form = json!({ "_pid": "q", "score": "1" });
        let err = engine
            .handle(&request(Some("tok"), Some("2"), Some(form)))
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(StoreError::Parse { .. })));
        assert_eq!(fs::read_to_string(store.path_for("tok")).unwrap(), "{broken");
    }

    #[test]
    fn file_store_persists_submissions() {
        let dir = TempDir::new().expect("temp dir");
        let store = FileStore::new(dir.path().join("answers"));
        let engine = SurveyEngine::new(spec(), AssetRegistry::new("."), Box::new(store.clone()));
        let form = json!({ "_pid": "q", "score": "-1", "_res": "Yes" });
        engine
            .handle(&request(Some("tok"), Some("2"), Some(form)))
            .expect("handle");
        let saved: Value =
            serde_json::from_str(&fs::read_to_string(store.path_for("tok")).unwrap()).unwrap();
        assert_eq!(saved, json!({ "q": { "_res": "Yes", "score": "-1" } }));
    }

    #[test]
    fn assets_resolve_registered_aliases_only() {
        let dir = TempDir::new().expect("temp dir");
        fs::write(dir.path().join("pic.svg"), b"<svg/>").unwrap();
        let assets = AssetRegistry::new(dir.path());
        let alias = assets.register("pic.svg").expect("register");
        let engine = SurveyEngine::new(spec(), assets, Box::new(MemoryStore::new()));

        let asset = engine.asset(&alias).expect("asset");
        assert_eq!(asset.bytes, b"<svg/>");
        assert_eq!(asset.content_type, "image/svg+xml");
        assert!(matches!(
            engine.asset("9.png"),
            Err(EngineError::MissingAsset(_))
        ));
    }

    #[test]
    fn load_survey_dry_runs_the_file() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("survey.json");
        fs::write(
            &path,
            json!({ "urlbase": "/s", "pages": [ { "lines": ["{x}"], "continue": "end" } ] }).to_string(),
        )
        .unwrap();
        let err = load_survey(&path).err().expect("dry run should fail");
        assert!(matches!(err, EngineError::Survey(ref inner) if inner.is_unresolved_variable()));

        fs::write(
            &path,
            json!({ "urlbase": "/s/", "pages": [ { "lines": ["ok"], "continue": "end" } ] }).to_string(),
        )
        .unwrap();
        let loaded = load_survey(&path).expect("load");
        assert_eq!(loaded.report.page_ids, vec!["p0"]);
        let engine = SurveyEngine::from_loaded(loaded, Box::new(MemoryStore::new()));
        assert_eq!(engine.base_url(), "/s");
    }
}
