//! Vitals service: the entry point used by the REST API and the CLI.
//!
//! A [`VitalsService`] is cheap to clone. `with_cancel` and `with_timeout` return a copy whose
//! calls use different per-call options; the transport, template registry and cache are shared.

use crate::cache::ReadCache;
use crate::config::CoreConfig;
use crate::ehr::{self, EhrSummary};
use crate::history::{chart_points, ChartPoint};
use crate::query::QueryShape;
use crate::record::VitalsRecord;
use crate::templates::{
    self, get_web_template, list_remote, load_local_templates, merge_listing, TemplateRegistry,
    TemplateSummary,
};
use crate::transport::{CallOptions, CancelSignal, HttpTransport, Transport};
use crate::{reader, writer, VitalsError, VitalsResult};
use chrono::Utc;
use clinic_types::{CompositionUid, EhrId, TemplateId};
use openehr::FlatComposition;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct VitalsService {
    cfg: Arc<CoreConfig>,
    transport: Arc<dyn Transport>,
    templates: Arc<TemplateRegistry>,
    cache: Option<Arc<ReadCache>>,
    shape: QueryShape,
    options: CallOptions,
}

impl std::fmt::Debug for VitalsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VitalsService")
            .field("base_url", &self.cfg.base_url().as_str())
            .field("template_id", &self.cfg.template_id().as_str())
            .field("cache", &self.cache.is_some())
            .field("shape", &self.shape)
            .finish()
    }
}

impl VitalsService {
    /// Build the service against the configured repository over HTTP.
    ///
    /// Local web templates are loaded here, once.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the local template directory
    /// cannot be read.
    pub fn new(cfg: Arc<CoreConfig>) -> VitalsResult<Self> {
        let transport = Arc::new(HttpTransport::new(&cfg)?);
        let mut registry = TemplateRegistry::new(cfg.template_id().clone());
        if let Some(dir) = cfg.local_template_dir() {
            registry = registry.with_local_templates(load_local_templates(dir)?);
        }
        Ok(Self::with_transport(cfg, transport, registry))
    }

    /// Build the service over any [`Transport`].
    pub fn with_transport(
        cfg: Arc<CoreConfig>,
        transport: Arc<dyn Transport>,
        templates: TemplateRegistry,
    ) -> Self {
        let cache = cfg.cache_reads().then(|| Arc::new(ReadCache::new()));
        let options = CallOptions::default().with_timeout(cfg.timeout());
        let shape = cfg.query_shape();
        Self {
            cfg,
            transport,
            templates: Arc::new(templates),
            cache,
            shape,
            options,
        }
    }

    /// A copy whose calls are abandoned when `signal` fires.
    pub fn with_cancel(&self, signal: CancelSignal) -> Self {
        let mut scoped = self.clone();
        scoped.options = scoped.options.with_cancel(signal);
        scoped
    }

    /// A copy whose calls use `timeout` instead of the configured deadline.
    pub fn with_timeout(&self, timeout: Option<Duration>) -> Self {
        let mut scoped = self.clone();
        scoped.options = scoped.options.with_timeout(timeout);
        scoped
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    /// The template a record belongs to: its own `templateId`, or the configured default.
    fn template_for(&self, record: &VitalsRecord) -> VitalsResult<TemplateId> {
        match record.template_id.as_deref() {
            Some(raw) => Ok(TemplateId::new(raw)?),
            None => Ok(self.cfg.template_id().clone()),
        }
    }

    async fn invalidate(&self, ehr_id: &EhrId) {
        if let Some(cache) = &self.cache {
            cache.invalidate_ehr(ehr_id).await;
        }
    }

    /// Creates a new EHR in the repository.
    pub async fn create_ehr(&self) -> VitalsResult<EhrSummary> {
        ehr::create_ehr(self.transport(), &self.options).await
    }

    pub async fn get_ehr(&self, ehr_id: &EhrId) -> VitalsResult<EhrSummary> {
        ehr::get_ehr(self.transport(), &self.options, ehr_id).await
    }

    /// Saves a new vitals recording.
    ///
    /// # Arguments
    ///
    /// * `ehr_id` - EHR of the patient.
    /// * `record` - The recording. It must not carry a `uid`; `templateId` defaults to the
    ///   configured template and `startTime` to now.
    ///
    /// # Returns
    ///
    /// The uid the repository assigned.
    ///
    /// # Errors
    ///
    /// Returns [`VitalsError::InvalidInput`] for a record that already has a uid or fails
    /// validation, and any transport error unchanged.
    pub async fn create(&self, ehr_id: &EhrId, record: &VitalsRecord) -> VitalsResult<CompositionUid> {
        if let Some(uid) = &record.uid {
            return Err(VitalsError::InvalidInput(format!(
                "record already saved as {uid}; update it instead"
            )));
        }
        let template_id = self.template_for(record)?;
        let table = self.templates.field_table(&template_id);
        let flat = writer::to_flat(record, &table, self.cfg.defaults(), Utc::now())?;

        let result = writer::create(self.transport(), &self.options, ehr_id, &template_id, flat).await;
        self.invalidate(ehr_id).await;
        result
    }

    /// Replaces the stored recording `uid` with `record`.
    ///
    /// # Returns
    ///
    /// The uid of the new version.
    pub async fn update(
        &self,
        ehr_id: &EhrId,
        uid: &CompositionUid,
        record: &VitalsRecord,
    ) -> VitalsResult<CompositionUid> {
        let template_id = self.template_for(record)?;
        let table = self.templates.field_table(&template_id);
        let flat = writer::to_flat(record, &table, self.cfg.defaults(), Utc::now())?;

        let result =
            writer::update(self.transport(), &self.options, ehr_id, uid, &template_id, flat).await;
        self.invalidate(ehr_id).await;
        result
    }

    /// Creates or updates depending on whether `record` carries a uid.
    pub async fn save(&self, ehr_id: &EhrId, record: &VitalsRecord) -> VitalsResult<CompositionUid> {
        match &record.uid {
            Some(uid) => self.update(ehr_id, uid, record).await,
            None => self.create(ehr_id, record).await,
        }
    }

    /// Deletes the recording `uid`. Deleting an unknown or already deleted uid is an error.
    pub async fn delete(&self, ehr_id: &EhrId, uid: &CompositionUid) -> VitalsResult<()> {
        let result = writer::delete(self.transport(), &self.options, ehr_id, uid).await;
        self.invalidate(ehr_id).await;
        result
    }

    /// Vitals history of the configured template, newest first.
    pub async fn list(&self, ehr_id: &EhrId) -> VitalsResult<Vec<VitalsRecord>> {
        let template_id = self.cfg.template_id().clone();
        self.list_for_template(ehr_id, &template_id).await
    }

    /// Vitals history of `template_id`, in repository order.
    pub async fn list_for_template(
        &self,
        ehr_id: &EhrId,
        template_id: &TemplateId,
    ) -> VitalsResult<Vec<VitalsRecord>> {
        let mut generation = None;
        if let Some(cache) = &self.cache {
            if let Some(records) = cache.get(ehr_id, template_id).await {
                debug!(%ehr_id, %template_id, "vitals history served from cache");
                return Ok(records);
            }
            generation = Some(cache.generation(ehr_id).await);
        }

        let table = self.templates.field_table(template_id);
        let records = reader::list(
            self.transport(),
            &self.options,
            ehr_id,
            template_id,
            &table,
            self.shape,
        )
        .await?;

        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            if !cache.insert(ehr_id, template_id, generation, records.clone()).await {
                debug!(%ehr_id, %template_id, "EHR changed during read, history not cached");
            }
        }
        Ok(records)
    }

    pub async fn get_flat(&self, ehr_id: &EhrId, uid: &CompositionUid) -> VitalsResult<FlatComposition> {
        reader::get_flat(self.transport(), &self.options, ehr_id, uid).await
    }

    /// One recording, read through the vocabulary of the template it was written with.
    ///
    /// The template is recognised by the flat document's root node. An unknown root falls back
    /// to the configured template.
    pub async fn get_record(&self, ehr_id: &EhrId, uid: &CompositionUid) -> VitalsResult<VitalsRecord> {
        let flat = self.get_flat(ehr_id, uid).await?;
        let root = flat.root();
        let template_id = match root.and_then(|root| self.templates.template_for_root(root)) {
            Some(template_id) => template_id,
            None => {
                warn!(%uid, root = root.unwrap_or("<none>"), "no known template for flat root");
                self.cfg.template_id().clone()
            }
        };
        let table = self.templates.field_table(&template_id);
        Ok(reader::stored_record(&flat, uid, &template_id, &table))
    }

    /// Dashboard series for the configured template, oldest first.
    pub async fn chart(&self, ehr_id: &EhrId) -> VitalsResult<Vec<ChartPoint>> {
        Ok(chart_points(&self.list(ehr_id).await?))
    }

    /// Merged template listing. A repository failure degrades to the local templates.
    pub async fn list_templates(&self) -> Vec<TemplateSummary> {
        let remote = list_remote(self.transport(), &self.options)
            .await
            .map(|items| items.iter().map(TemplateSummary::from_remote).collect());
        merge_listing(
            self.templates.local_summaries(),
            remote,
            self.cfg.template_id().as_str(),
        )
    }

    /// Web template of `template_id`: the local copy if there is one, else the repository's.
    pub async fn web_template(&self, template_id: &TemplateId) -> VitalsResult<Value> {
        if let Some(local) = self.templates.local_web_template(template_id) {
            return Ok(local.clone());
        }
        get_web_template(self.transport(), &self.options, template_id).await
    }

    /// Display name of `template_id`.
    pub async fn template_name(&self, template_id: &TemplateId) -> VitalsResult<String> {
        let web_template = self.web_template(template_id).await?;
        Ok(templates::friendly_name(template_id.as_str(), &web_template))
    }
}
