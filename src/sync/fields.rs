use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::model::task::RemoteField;
use crate::providers::{ApiError, TaskSystem};

/// Names of the two fields the sync cannot fully work without.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalFields {
    pub ticket_field: String,
    pub status_field: String,
}

/// Immutable snapshot of a project's custom fields, keyed by exact name.
#[derive(Debug, Clone, Default)]
pub struct FieldMapping {
    by_name: HashMap<String, RemoteField>,
    ticket_field_id: Option<String>,
    status_field_id: Option<String>,
}

impl FieldMapping {
    pub fn build(fields: Vec<RemoteField>, critical: &CriticalFields) -> Self {
        let mut by_name = HashMap::with_capacity(fields.len());
        for field in fields {
            if by_name.contains_key(&field.name) {
                warn!(field = %field.name, id = %field.id, "duplicate custom field name ignored");
                continue;
            }
            by_name.insert(field.name.clone(), field);
        }

        let ticket_field_id = by_name.get(&critical.ticket_field).map(|f| f.id.clone());
        let status_field_id = by_name.get(&critical.status_field).map(|f| f.id.clone());

        if ticket_field_id.is_none() {
            warn!(
                field = %critical.ticket_field,
                "ticket id custom field missing; task-side link lookups disabled"
            );
        }
        if status_field_id.is_none() {
            warn!(
                field = %critical.status_field,
                "status custom field missing; status sync disabled"
            );
        }

        Self {
            by_name,
            ticket_field_id,
            status_field_id,
        }
    }

    /// Case-sensitive exact-match lookup.
    pub fn get(&self, name: &str) -> Option<&RemoteField> {
        self.by_name.get(name)
    }

    pub fn by_id(&self, id: &str) -> Option<&RemoteField> {
        self.by_name.values().find(|f| f.id == id)
    }

    pub fn ticket_field(&self) -> Option<&RemoteField> {
        self.ticket_field_id.as_deref().and_then(|id| self.by_id(id))
    }

    pub fn status_field(&self) -> Option<&RemoteField> {
        self.status_field_id.as_deref().and_then(|id| self.by_id(id))
    }

    pub fn is_status_field(&self, field_id: &str) -> bool {
        self.status_field_id.as_deref() == Some(field_id)
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Fields sorted by name, for display.
    pub fn sorted(&self) -> Vec<&RemoteField> {
        let mut fields: Vec<&RemoteField> = self.by_name.values().collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));
        fields
    }
}

pub async fn load_field_schema(
    tasks: &dyn TaskSystem,
    project_id: &str,
    critical: &CriticalFields,
) -> Result<FieldMapping, ApiError> {
    let fields = tasks.list_custom_fields(project_id).await?;
    debug!(project = project_id, count = fields.len(), "custom field schema fetched");
    Ok(FieldMapping::build(fields, critical))
}

/// Process-wide mapping cache. No TTL: reloaded when invalidated or found empty.
pub struct FieldMapper {
    tasks: Arc<dyn TaskSystem>,
    project_id: String,
    critical: CriticalFields,
    cache: RwLock<Option<Arc<FieldMapping>>>,
}

impl FieldMapper {
    pub fn new(tasks: Arc<dyn TaskSystem>, project_id: String, critical: CriticalFields) -> Self {
        Self {
            tasks,
            project_id,
            critical,
            cache: RwLock::new(None),
        }
    }

    fn cached(&self) -> Option<Arc<FieldMapping>> {
        self.cache
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .filter(|m| !m.is_empty())
    }

    /// Mapping for one operation. Load failures yield an empty mapping, which
    /// disables field-dependent features for that operation only.
    pub async fn snapshot(&self) -> Arc<FieldMapping> {
        if let Some(mapping) = self.cached() {
            return mapping;
        }
        match self.refresh().await {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!(project = %self.project_id, error = %e, "custom field schema unavailable");
                Arc::new(FieldMapping::default())
            }
        }
    }

    pub async fn refresh(&self) -> Result<Arc<FieldMapping>, ApiError> {
        let mapping =
            Arc::new(load_field_schema(self.tasks.as_ref(), &self.project_id, &self.critical).await?);
        info!(project = %self.project_id, fields = mapping.len(), "custom field mapping loaded");
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(mapping.clone());
        }
        Ok(mapping)
    }

    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = None;
        }
    }
}
