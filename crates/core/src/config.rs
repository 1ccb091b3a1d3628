//! Core runtime configuration.
//!
//! Configuration is resolved once at process start-up and passed into the core services. Nothing
//! in this crate reads environment variables while handling a request; the binaries call the
//! `*_from_env_value` helpers below and build a [`CoreConfig`] from the results.

use crate::constants::{
    DEFAULT_CATEGORY, DEFAULT_COMPOSER_NAME, DEFAULT_LANGUAGE, DEFAULT_OPENEHR_BASE_URL,
    DEFAULT_SETTING, DEFAULT_TERRITORY, DEFAULT_VITALS_TEMPLATE_ID, ENV_CLINIC_COMPOSER_NAME,
    ENV_CLINIC_LANGUAGE, ENV_CLINIC_TEMPLATE_DIR, ENV_CLINIC_TERRITORY, ENV_OPENEHR_BASE_URL,
    ENV_OPENEHR_PASSWORD, ENV_OPENEHR_TIMEOUT_SECS, ENV_OPENEHR_USERNAME, ENV_VITALS_CACHE_READS,
    ENV_VITALS_QUERY_SHAPE, ENV_VITALS_TEMPLATE_ID,
};
use crate::query::QueryShape;
use crate::{VitalsError, VitalsResult};
use clinic_types::TemplateId;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Basic-auth credentials for the clinical data repository.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Administrative values written to the flat `ctx/` block when a record omits them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositionDefaults {
    pub composer_name: String,
    pub language: String,
    pub territory: String,
    pub category: String,
    pub setting: String,
}

impl Default for CompositionDefaults {
    fn default() -> Self {
        Self {
            composer_name: DEFAULT_COMPOSER_NAME.into(),
            language: DEFAULT_LANGUAGE.into(),
            territory: DEFAULT_TERRITORY.into(),
            category: DEFAULT_CATEGORY.into(),
            setting: DEFAULT_SETTING.into(),
        }
    }
}

/// Core configuration resolved at start-up.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    base_url: Url,
    template_id: TemplateId,
    timeout: Option<Duration>,
    credentials: Option<Credentials>,
    cache_reads: bool,
    query_shape: QueryShape,
    local_template_dir: Option<PathBuf>,
    defaults: CompositionDefaults,
}

impl CoreConfig {
    /// Create a new `CoreConfig` pointing at `base_url` with the given default template.
    ///
    /// Optional settings start switched off and are enabled with the `with_*` builders.
    pub fn new(base_url: Url, template_id: TemplateId) -> VitalsResult<Self> {
        if base_url.cannot_be_a_base() {
            return Err(VitalsError::InvalidInput(format!(
                "base URL {base_url} cannot carry path segments"
            )));
        }
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(VitalsError::InvalidInput(format!(
                "base URL scheme must be http or https, got {}",
                base_url.scheme()
            )));
        }

        Ok(Self {
            base_url,
            template_id,
            timeout: None,
            credentials: None,
            cache_reads: false,
            query_shape: QueryShape::default(),
            local_template_dir: None,
            defaults: CompositionDefaults::default(),
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_cache_reads(mut self, cache_reads: bool) -> Self {
        self.cache_reads = cache_reads;
        self
    }

    /// Row layout of history queries. Composition rows are the default.
    pub fn with_query_shape(mut self, query_shape: QueryShape) -> Self {
        self.query_shape = query_shape;
        self
    }

    pub fn with_local_template_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.local_template_dir = dir;
        self
    }

    pub fn with_defaults(mut self, defaults: CompositionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn template_id(&self) -> &TemplateId {
        &self.template_id
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn cache_reads(&self) -> bool {
        self.cache_reads
    }

    pub fn query_shape(&self) -> QueryShape {
        self.query_shape
    }

    pub fn local_template_dir(&self) -> Option<&Path> {
        self.local_template_dir.as_deref()
    }

    pub fn defaults(&self) -> &CompositionDefaults {
        &self.defaults
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the repository base URL, falling back to the bootcamp server when unset.
pub fn base_url_from_env_value(value: Option<String>) -> VitalsResult<Url> {
    let raw = trimmed(value).unwrap_or_else(|| DEFAULT_OPENEHR_BASE_URL.to_string());
    Ok(Url::parse(&raw)?)
}

/// Parse the default template id, falling back to the vitals template when unset.
pub fn template_id_from_env_value(value: Option<String>) -> VitalsResult<TemplateId> {
    let raw = trimmed(value).unwrap_or_else(|| DEFAULT_VITALS_TEMPLATE_ID.to_string());
    Ok(TemplateId::new(raw)?)
}

/// Parse a request deadline in whole seconds. Unset or `0` means no deadline.
pub fn timeout_from_env_value(value: Option<String>) -> VitalsResult<Option<Duration>> {
    let Some(raw) = trimmed(value) else {
        return Ok(None);
    };
    let secs: u64 = raw
        .parse()
        .map_err(|_| VitalsError::InvalidInput(format!("timeout must be whole seconds, got {raw:?}")))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

/// Parse a boolean switch (`1`, `true`, `yes`, `on` and their negations). Unset means `false`.
pub fn flag_from_env_value(value: Option<String>) -> VitalsResult<bool> {
    let Some(raw) = trimmed(value) else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(VitalsError::InvalidInput(format!(
            "expected a boolean switch, got {raw:?}"
        ))),
    }
}

/// Parse the history query shape: `composition` or `projection`. Unset means composition rows.
pub fn query_shape_from_env_value(value: Option<String>) -> VitalsResult<QueryShape> {
    let Some(raw) = trimmed(value) else {
        return Ok(QueryShape::default());
    };
    match raw.to_ascii_lowercase().as_str() {
        "composition" => Ok(QueryShape::Composition),
        "projection" => Ok(QueryShape::Projection),
        _ => Err(VitalsError::InvalidInput(format!(
            "query shape must be composition or projection, got {raw:?}"
        ))),
    }
}

/// Pair a username and password. Both must be set, or neither.
pub fn credentials_from_env_values(
    username: Option<String>,
    password: Option<String>,
) -> VitalsResult<Option<Credentials>> {
    match (trimmed(username), password.filter(|p| !p.is_empty())) {
        (Some(username), Some(password)) => Ok(Some(Credentials { username, password })),
        (None, None) => Ok(None),
        _ => Err(VitalsError::InvalidInput(
            "username and password must be configured together".into(),
        )),
    }
}

/// Build composition defaults, keeping the built-in value for anything unset.
pub fn defaults_from_env_values(
    composer_name: Option<String>,
    language: Option<String>,
    territory: Option<String>,
) -> CompositionDefaults {
    let mut defaults = CompositionDefaults::default();
    if let Some(name) = trimmed(composer_name) {
        defaults.composer_name = name;
    }
    if let Some(language) = trimmed(language) {
        defaults.language = language;
    }
    if let Some(territory) = trimmed(territory) {
        defaults.territory = territory;
    }
    defaults
}

/// Build a [`CoreConfig`] from environment-style lookups.
///
/// The binaries pass `|name| std::env::var(name).ok()`; tests pass a map.
///
/// # Errors
///
/// Returns the first error of the individual `*_from_env_value` helpers.
pub fn config_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> VitalsResult<CoreConfig> {
    let base_url = base_url_from_env_value(lookup(ENV_OPENEHR_BASE_URL))?;
    let template_id = template_id_from_env_value(lookup(ENV_VITALS_TEMPLATE_ID))?;
    let cfg = CoreConfig::new(base_url, template_id)?
        .with_timeout(timeout_from_env_value(lookup(ENV_OPENEHR_TIMEOUT_SECS))?)
        .with_credentials(credentials_from_env_values(
            lookup(ENV_OPENEHR_USERNAME),
            lookup(ENV_OPENEHR_PASSWORD),
        )?)
        .with_cache_reads(flag_from_env_value(lookup(ENV_VITALS_CACHE_READS))?)
        .with_query_shape(query_shape_from_env_value(lookup(ENV_VITALS_QUERY_SHAPE))?)
        .with_local_template_dir(trimmed(lookup(ENV_CLINIC_TEMPLATE_DIR)).map(PathBuf::from))
        .with_defaults(defaults_from_env_values(
            lookup(ENV_CLINIC_COMPOSER_NAME),
            lookup(ENV_CLINIC_LANGUAGE),
            lookup(ENV_CLINIC_TERRITORY),
        ));
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_builds_a_full_config() {
        let vars: std::collections::HashMap<&str, &str> = [
            (ENV_OPENEHR_BASE_URL, "http://localhost:8080/ehrbase/rest/openehr/v1"),
            (ENV_VITALS_TEMPLATE_ID, "vitals.v1"),
            (ENV_OPENEHR_TIMEOUT_SECS, "15"),
            (ENV_VITALS_CACHE_READS, "yes"),
            (ENV_VITALS_QUERY_SHAPE, "Projection"),
            (ENV_CLINIC_TEMPLATE_DIR, "/srv/templates"),
            (ENV_CLINIC_TERRITORY, "GB"),
        ]
        .into_iter()
        .collect();
        let cfg = config_from_lookup(|name| vars.get(name).map(|v| v.to_string())).expect("config");

        assert_eq!(cfg.template_id().as_str(), "vitals.v1");
        assert_eq!(cfg.timeout(), Some(Duration::from_secs(15)));
        assert!(cfg.cache_reads());
        assert_eq!(cfg.query_shape(), QueryShape::Projection);
        assert!(cfg.credentials().is_none());
        assert_eq!(cfg.local_template_dir(), Some(Path::new("/srv/templates")));
        assert_eq!(cfg.defaults().territory, "GB");
        assert_eq!(cfg.defaults().language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn empty_lookup_uses_defaults() {
        let cfg = config_from_lookup(|_| None).expect("config");
        assert_eq!(cfg.base_url().as_str(), DEFAULT_OPENEHR_BASE_URL);
        assert_eq!(cfg.template_id().as_str(), DEFAULT_VITALS_TEMPLATE_ID);
        assert!(!cfg.cache_reads());
    }

    #[test]
    fn base_url_defaults_to_bootcamp_server() {
        let url = base_url_from_env_value(None).expect("default url");
        assert_eq!(url.as_str(), DEFAULT_OPENEHR_BASE_URL);

        let url = base_url_from_env_value(Some("  ".into())).expect("blank falls back");
        assert_eq!(url.as_str(), DEFAULT_OPENEHR_BASE_URL);
    }

    #[test]
    fn base_url_rejects_garbage() {
        let err = base_url_from_env_value(Some("not a url".into())).expect_err("should fail");
        assert!(matches!(err, VitalsError::InvalidUrl(_)));
    }

    #[test]
    fn new_rejects_non_http_schemes() {
        let url = Url::parse("mailto:someone@example.org").expect("url");
        let template = TemplateId::new("vitals.v1").expect("template");
        let err = CoreConfig::new(url, template).expect_err("should fail");
        assert!(matches!(err, VitalsError::InvalidInput(_)));

        let url = Url::parse("ftp://example.org/openehr").expect("url");
        let template = TemplateId::new("vitals.v1").expect("template");
        assert!(CoreConfig::new(url, template).is_err());
    }

    #[test]
    fn new_starts_with_optional_settings_off() {
        let cfg = CoreConfig::new(
            base_url_from_env_value(None).expect("url"),
            template_id_from_env_value(None).expect("template"),
        )
        .expect("config");

        assert_eq!(cfg.template_id().as_str(), DEFAULT_VITALS_TEMPLATE_ID);
        assert!(cfg.timeout().is_none());
        assert!(cfg.credentials().is_none());
        assert!(!cfg.cache_reads());
        assert_eq!(cfg.query_shape(), QueryShape::Composition);
        assert!(cfg.local_template_dir().is_none());
        assert_eq!(cfg.defaults(), &CompositionDefaults::default());
    }

    #[test]
    fn timeout_parses_seconds() {
        assert_eq!(timeout_from_env_value(None).expect("unset"), None);
        assert_eq!(timeout_from_env_value(Some("0".into())).expect("zero"), None);
        assert_eq!(
            timeout_from_env_value(Some(" 15 ".into())).expect("15"),
            Some(Duration::from_secs(15))
        );
        let err = timeout_from_env_value(Some("1.5".into())).expect_err("fractional");
        assert!(matches!(err, VitalsError::InvalidInput(_)));
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(!flag_from_env_value(None).expect("unset"));
        assert!(flag_from_env_value(Some("TRUE".into())).expect("true"));
        assert!(flag_from_env_value(Some("1".into())).expect("1"));
        assert!(!flag_from_env_value(Some("off".into())).expect("off"));
        assert!(flag_from_env_value(Some("maybe".into())).is_err());
    }

    #[test]
    fn query_shape_names_either_layout() {
        assert_eq!(query_shape_from_env_value(None).expect("unset"), QueryShape::Composition);
        assert_eq!(
            query_shape_from_env_value(Some(" projection ".into())).expect("projection"),
            QueryShape::Projection
        );
        let err = query_shape_from_env_value(Some("rows".into())).expect_err("unknown");
        assert!(matches!(err, VitalsError::InvalidInput(_)));
    }

    #[test]
    fn credentials_must_be_paired() {
        assert_eq!(credentials_from_env_values(None, None).expect("none"), None);

        let creds = credentials_from_env_values(Some("ehrbase".into()), Some("secret".into()))
            .expect("pair")
            .expect("some");
        assert_eq!(creds.username, "ehrbase");
        assert!(!format!("{creds:?}").contains("secret"));

        let err = credentials_from_env_values(Some("ehrbase".into()), None).expect_err("half");
        assert!(matches!(err, VitalsError::InvalidInput(_)));
    }

    #[test]
    fn defaults_keep_built_ins_for_unset_values() {
        let defaults = defaults_from_env_values(Some("Dr Rao".into()), None, Some(" GB ".into()));
        assert_eq!(defaults.composer_name, "Dr Rao");
        assert_eq!(defaults.language, DEFAULT_LANGUAGE);
        assert_eq!(defaults.territory, "GB");
        assert_eq!(defaults.category, DEFAULT_CATEGORY);
    }
}
