use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::SqlitePool;

use crate::domain::{Setting, SettingValue};
use crate::repository::{RepositoryError, SqliteSettingsRepository};
use crate::utils::config::TaggingDefaults;

/// Fully resolved runtime configuration for one tagging pass: seed values
/// from `config.toml`'s `[tagging]` table, overridden field-by-field by
/// whatever rows exist in the `settings` table. A typed struct instead of a
/// loosely-typed dict the rest of the codebase has to re-coerce on every read.
#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub auto_tag_on_scan: bool,
    pub confidence_auto_threshold: f64,
    pub confidence_review_threshold: f64,
    pub artwork_min_size: i64,
    pub artwork_max_size: i64,
    pub artwork_sources: Vec<String>,
    pub preferred_countries: Vec<String>,
    pub preferred_media: Vec<String>,
    pub disc_subfolder_patterns: Vec<String>,
    pub fanarttv_api_key: String,
    pub acoustid_api_key: String,
    pub fingerprint_enabled: bool,
    pub lyrics_enabled: bool,
    pub lyrics_auto_fetch: bool,
    pub replaygain_enabled: bool,
    pub replaygain_auto_calculate: bool,
    pub replaygain_reference_loudness: f64,
    pub backup_enabled: bool,
    pub backup_max_per_album: i64,
    pub watch_stabilization_delay: i64,
    pub watch_poll_interval_secs: i64,
}

impl From<&TaggingDefaults> for ResolvedSettings {
    fn from(d: &TaggingDefaults) -> Self {
        Self {
            auto_tag_on_scan: d.auto_tag_on_scan,
            confidence_auto_threshold: d.confidence_auto_threshold,
            confidence_review_threshold: d.confidence_review_threshold,
            artwork_min_size: d.artwork_min_size,
            artwork_max_size: d.artwork_max_size,
            artwork_sources: d.artwork_sources.clone(),
            preferred_countries: d.preferred_countries.clone(),
            preferred_media: d.preferred_media.clone(),
            disc_subfolder_patterns: vec![
                r"^(?:cd|disc|disk)[\s_-]*(\d+)$".to_string(),
                r"^(?:cd|disc|disk)[\s_-]*([A-Za-z])$".to_string(),
            ],
            fanarttv_api_key: d.fanarttv_api_key.clone(),
            acoustid_api_key: String::new(),
            fingerprint_enabled: false,
            lyrics_enabled: d.lyrics_enabled,
            lyrics_auto_fetch: d.lyrics_auto_fetch,
            replaygain_enabled: d.replaygain_enabled,
            replaygain_auto_calculate: d.replaygain_auto_calculate,
            replaygain_reference_loudness: d.replaygain_reference_loudness,
            backup_enabled: true,
            backup_max_per_album: 5,
            watch_stabilization_delay: d.watch_stabilization_delay,
            watch_poll_interval_secs: d.watch_poll_interval_secs,
        }
    }
}

impl ResolvedSettings {
    fn apply(&mut self, setting: &Setting) {
        let v = setting.value();
        match setting.key() {
            "auto_tag_on_scan" => if let Some(b) = v.as_bool() { self.auto_tag_on_scan = b; },
            "confidence_auto_threshold" => if let Some(f) = v.as_f64() { self.confidence_auto_threshold = f; },
            "confidence_review_threshold" => if let Some(f) = v.as_f64() { self.confidence_review_threshold = f; },
            "artwork_min_size" => if let Some(f) = v.as_f64() { self.artwork_min_size = f as i64; },
            "artwork_max_size" => if let Some(f) = v.as_f64() { self.artwork_max_size = f as i64; },
            "artwork_sources" => if let Some(list) = v.as_str_list() { self.artwork_sources = list.to_vec(); },
            "preferred_countries" => if let Some(list) = v.as_str_list() { self.preferred_countries = list.to_vec(); },
            "preferred_media" => if let Some(list) = v.as_str_list() { self.preferred_media = list.to_vec(); },
            "disc_subfolder_patterns" => if let Some(list) = v.as_str_list() { self.disc_subfolder_patterns = list.to_vec(); },
            "fanarttv_api_key" => if let SettingValue::Str(s) = v { self.fanarttv_api_key = s.clone(); },
            "acoustid_api_key" => if let SettingValue::Str(s) = v { self.acoustid_api_key = s.clone(); },
            "fingerprint_enabled" => if let Some(b) = v.as_bool() { self.fingerprint_enabled = b; },
            "lyrics_enabled" => if let Some(b) = v.as_bool() { self.lyrics_enabled = b; },
            "lyrics_auto_fetch" => if let Some(b) = v.as_bool() { self.lyrics_auto_fetch = b; },
            "replaygain_enabled" => if let Some(b) = v.as_bool() { self.replaygain_enabled = b; },
            "replaygain_auto_calculate" => if let Some(b) = v.as_bool() { self.replaygain_auto_calculate = b; },
            "replaygain_reference_loudness" => if let Some(f) = v.as_f64() { self.replaygain_reference_loudness = f; },
            "backup_enabled" => if let Some(b) = v.as_bool() { self.backup_enabled = b; },
            "backup_max_per_album" => if let Some(f) = v.as_f64() { self.backup_max_per_album = f as i64; },
            "watch_stabilization_delay" => if let Some(f) = v.as_f64() { self.watch_stabilization_delay = f as i64; },
            "watch_poll_interval_secs" => if let Some(f) = v.as_f64() { self.watch_poll_interval_secs = f as i64; },
            _ => {}
        }
    }
}

/// Resolves live settings on demand and tracks a version counter so the
/// Scanner/Watcher's compiled `DiscPatternSet` knows when to recompile
/// after a settings change, without restarting either. One instance is
/// shared across the Orchestrator, Scanner and Watcher.
pub struct SettingsStore {
    repo: SqliteSettingsRepository,
    defaults: TaggingDefaults,
    version: AtomicU64,
}

impl SettingsStore {
    pub fn new(defaults: TaggingDefaults) -> Self {
        Self { repo: SqliteSettingsRepository::new(), defaults, version: AtomicU64::new(0) }
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Reads every row in `settings` and overlays it onto the config-file
    /// defaults. Cheap enough (small table, one query) to call per pipeline
    /// run rather than caching indefinitely and risking staleness.
    pub async fn resolve(&self, pool: &SqlitePool) -> Result<ResolvedSettings, RepositoryError> {
        let mut resolved = ResolvedSettings::from(&self.defaults);
        for setting in self.repo.all(pool).await? {
            resolved.apply(&setting);
        }
        Ok(resolved)
    }

    /// Persists `key` and bumps the version so any cached `DiscPatternSet`
    /// built before this call reports stale on its next `is_stale` check.
    pub async fn set(&self, pool: &SqlitePool, key: &str, value: SettingValue, description: Option<&str>) -> Result<(), RepositoryError> {
        self.repo.upsert(pool, key, &value, description).await?;
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_helpers::prepare_db;

    #[tokio::test]
    async fn resolve_overlays_db_rows_on_top_of_defaults() {
        let pool = prepare_db().await.unwrap();
        let store = SettingsStore::new(TaggingDefaults::default());

        let baseline = store.resolve(&pool).await.unwrap();
        assert_eq!(baseline.confidence_auto_threshold, 85.0);

        store.set(&pool, "confidence_auto_threshold", SettingValue::Float(90.0), None).await.unwrap();
        let updated = store.resolve(&pool).await.unwrap();
        assert_eq!(updated.confidence_auto_threshold, 90.0);
    }

    #[tokio::test]
    async fn set_bumps_version() {
        let pool = prepare_db().await.unwrap();
        let store = SettingsStore::new(TaggingDefaults::default());
        let before = store.version();
        store.set(&pool, "auto_tag_on_scan", SettingValue::Bool(true), None).await.unwrap();
        assert!(store.version() > before);
    }
}
