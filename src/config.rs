use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const OVERRIDE_FILE_NAME: &str = "desk.yaml";
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeskSettings {
    /// Delay between an accepted write and the converging refresh.
    pub refresh_delay_ms: u64,
    pub default_tolerance_days: u32,
    /// Cached feed snapshots kept after each save.
    pub snapshot_retention: u32,
    pub log_filter: String,
    pub max_attachment_bytes: u64,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            refresh_delay_ms: 5_000,
            default_tolerance_days: 0,
            snapshot_retention: 5,
            log_filter: "info".to_string(),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl DeskSettings {
    /// Applies a partial JSON object over these settings.
    pub fn merged(&self, update: serde_json::Value) -> AppResult<Self> {
        let mut merged = serde_json::to_value(self)?;
        merge_json(&mut merged, update);
        let settings: Self =
            serde_json::from_value(merged).map_err(|error| AppError::Validation(error.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Layers `desk.yaml` from `data_dir` on top, if the file exists.
    pub fn with_overrides(&self, data_dir: &Path) -> AppResult<Self> {
        let path = data_dir.join(OVERRIDE_FILE_NAME);
        if !path.is_file() {
            return Ok(self.clone());
        }
        let raw = fs::read_to_string(&path)?;
        if raw.trim().is_empty() {
            return Ok(self.clone());
        }
        let overrides: serde_yaml::Value = serde_yaml::from_str(&raw)?;
        let overrides = serde_json::to_value(overrides)?;
        if !overrides.is_object() {
            return Err(AppError::Validation(format!(
                "{} must contain a mapping",
                path.display()
            )));
        }
        self.merged(overrides)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.snapshot_retention == 0 {
            return Err(AppError::Validation("snapshotRetention must be at least 1".to_string()));
        }
        if self.max_attachment_bytes == 0 {
            return Err(AppError::Validation("maxAttachmentBytes must be positive".to_string()));
        }
        if self.log_filter.trim().is_empty() {
            return Err(AppError::Validation("logFilter cannot be empty".to_string()));
        }
        Ok(())
    }
}

pub(crate) fn merge_json(target: &mut serde_json::Value, update: serde_json::Value) {
    match (target, update) {
        (serde_json::Value::Object(target_map), serde_json::Value::Object(update_map)) => {
            for (key, value) in update_map {
                merge_json(target_map.entry(key).or_insert(serde_json::Value::Null), value);
            }
        }
        (target, update) => {
            *target = update;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeskSettings, OVERRIDE_FILE_NAME};
    use crate::errors::AppError;
    use serde_json::json;

    #[test]
    fn merge_keeps_untouched_fields() {
        let settings = DeskSettings::default()
            .merged(json!({ "refreshDelayMs": 250 }))
            .expect("merge");
        assert_eq!(settings.refresh_delay_ms, 250);
        assert_eq!(settings.snapshot_retention, 5);
        assert_eq!(settings.log_filter, "info");
    }

    #[test]
    fn merge_rejects_invalid_values() {
        let error = DeskSettings::default()
            .merged(json!({ "snapshotRetention": 0 }))
            .expect_err("zero retention");
        assert!(matches!(error, AppError::Validation(_)));

        let error = DeskSettings::default()
            .merged(json!({ "refreshDelayMs": "soon" }))
            .expect_err("wrong type");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn yaml_file_overrides_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = DeskSettings::default();
        assert_eq!(base.with_overrides(dir.path()).expect("no file"), base);

        std::fs::write(
            dir.path().join(OVERRIDE_FILE_NAME),
            "defaultToleranceDays: 3\nlogFilter: pendency_desk=debug\n",
        )
        .expect("write yaml");
        let settings = base.with_overrides(dir.path()).expect("overrides");
        assert_eq!(settings.default_tolerance_days, 3);
        assert_eq!(settings.log_filter, "pendency_desk=debug");
        assert_eq!(settings.refresh_delay_ms, 5_000);
    }

    #[test]
    fn yaml_scalar_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(OVERRIDE_FILE_NAME), "just text\n").expect("write yaml");
        assert!(DeskSettings::default().with_overrides(dir.path()).is_err());
    }
}
