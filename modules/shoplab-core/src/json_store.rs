use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use shoplab_common::{ListingFields, ListingId, ListingImage, ShopLabError};

use crate::experiment::{DailyViews, Experiment, PerformanceHistory, ProposalBundle};
use crate::store::{ExperimentSettings, ExperimentStore, StoreResult};

const PROPOSALS_FILE: &str = "proposals.json";
const UNTESTED_FILE: &str = "untested_experiments.json";
const TESTING_FILE: &str = "testing_experiments.json";
const TESTED_FILE: &str = "tested_experiments.json";
const LISTINGS_FILE: &str = "current_listings.json";
const IMAGES_FILE: &str = "images.json";
const PERFORMANCE_FILE: &str = "performance.json";
const SETTINGS_FILE: &str = "experiment_settings.json";

type BundleManifest = BTreeMap<ListingId, ProposalBundle>;
type UntestedManifest = BTreeMap<ListingId, BTreeMap<String, Experiment>>;
type TestingManifest = BTreeMap<ListingId, Experiment>;
type TestedManifest = BTreeMap<ListingId, Vec<Experiment>>;
type ListingManifest = BTreeMap<ListingId, ListingFields>;
type ImagesManifest = BTreeMap<ListingId, ImageRecord>;

/// Image manifest entry: the live ordering plus an optional archived copy
/// stashed when a thumbnail experiment is accepted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ImageRecord {
    #[serde(default)]
    current: Vec<ListingImage>,
    #[serde(default)]
    archived: Option<Vec<ListingImage>>,
}

/// File-backed [`ExperimentStore`]: one JSON file per logical manifest under
/// a data directory. Writes go to a temp file then rename, so a crashed write
/// never leaves a half-written manifest. A store-wide mutex serializes every
/// read-modify-write.
pub struct JsonStore {
    root: PathBuf,
    io: Mutex<()>,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), io: Mutex::new(()) }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    fn read<T: DeserializeOwned + Default>(&self, file: &str) -> StoreResult<T> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(T::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| store_err(&path, "read", e))?;
        serde_json::from_str(&raw).map_err(|e| store_err(&path, "parse", e))
    }

    fn write<T: Serialize>(&self, file: &str, value: &T) -> StoreResult<()> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| store_err(&self.root, "create data dir", e))?;
        let path = self.path(file);
        let tmp = self.root.join(format!("{file}.tmp"));
        let raw = serde_json::to_string_pretty(value)
            .map_err(|e| store_err(&path, "serialize", e))?;
        std::fs::write(&tmp, raw).map_err(|e| store_err(&tmp, "write", e))?;
        std::fs::rename(&tmp, &path).map_err(|e| store_err(&path, "rename", e))?;
        debug!(file, "Manifest written");
        Ok(())
    }

    /// Atomic read-modify-write of one manifest under the store lock.
    fn with_manifest<T, R, F>(&self, file: &str, mutate: F) -> StoreResult<R>
    where
        T: DeserializeOwned + Default + Serialize,
        F: FnOnce(&mut T) -> R,
    {
        let _guard = self.io.lock().expect("store lock poisoned");
        let mut manifest: T = self.read(file)?;
        let result = mutate(&mut manifest);
        self.write(file, &manifest)?;
        Ok(result)
    }

    fn read_locked<T: DeserializeOwned + Default>(&self, file: &str) -> StoreResult<T> {
        let _guard = self.io.lock().expect("store lock poisoned");
        self.read(file)
    }
}

fn store_err(path: &Path, action: &str, err: impl std::fmt::Display) -> ShopLabError {
    ShopLabError::Store(format!("{action} {}: {err}", path.display()))
}

impl ExperimentStore for JsonStore {
    // --- Proposal bundles ---

    fn get_bundle(&self, listing_id: ListingId) -> StoreResult<Option<ProposalBundle>> {
        let manifest: BundleManifest = self.read_locked(PROPOSALS_FILE)?;
        Ok(manifest.get(&listing_id).cloned())
    }

    fn all_bundles(&self) -> StoreResult<Vec<ProposalBundle>> {
        let manifest: BundleManifest = self.read_locked(PROPOSALS_FILE)?;
        Ok(manifest.into_values().collect())
    }

    fn save_bundle(&self, bundle: &ProposalBundle) -> StoreResult<()> {
        self.with_manifest(PROPOSALS_FILE, |manifest: &mut BundleManifest| {
            manifest.insert(bundle.listing_id, bundle.clone());
        })
    }

    fn delete_bundle(&self, listing_id: ListingId) -> StoreResult<()> {
        self.with_manifest(PROPOSALS_FILE, |manifest: &mut BundleManifest| {
            manifest.remove(&listing_id);
        })
    }

    // --- Untested backlog ---

    fn untested_for_listing(&self, listing_id: ListingId) -> StoreResult<Vec<Experiment>> {
        let manifest: UntestedManifest = self.read_locked(UNTESTED_FILE)?;
        Ok(manifest
            .get(&listing_id)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default())
    }

    fn get_untested(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> StoreResult<Option<Experiment>> {
        let manifest: UntestedManifest = self.read_locked(UNTESTED_FILE)?;
        Ok(manifest
            .get(&listing_id)
            .and_then(|by_id| by_id.get(experiment_id))
            .cloned())
    }

    fn add_untested(&self, records: &[Experiment]) -> StoreResult<()> {
        self.with_manifest(UNTESTED_FILE, |manifest: &mut UntestedManifest| {
            for record in records {
                manifest
                    .entry(record.listing_id)
                    .or_default()
                    .insert(record.experiment_id.clone(), record.clone());
            }
        })
    }

    fn remove_untested(
        &self,
        listing_id: ListingId,
        experiment_id: &str,
    ) -> StoreResult<Option<Experiment>> {
        self.with_manifest(UNTESTED_FILE, |manifest: &mut UntestedManifest| {
            let by_id = manifest.get_mut(&listing_id)?;
            let removed = by_id.remove(experiment_id);
            if by_id.is_empty() {
                manifest.remove(&listing_id);
            }
            removed
        })
    }

    fn all_untested(&self) -> StoreResult<Vec<Experiment>> {
        let manifest: UntestedManifest = self.read_locked(UNTESTED_FILE)?;
        Ok(manifest
            .into_values()
            .flat_map(|by_id| by_id.into_values())
            .collect())
    }

    // --- Testing ---

    fn testing_for_listing(&self, listing_id: ListingId) -> StoreResult<Option<Experiment>> {
        let manifest: TestingManifest = self.read_locked(TESTING_FILE)?;
        Ok(manifest.get(&listing_id).cloned())
    }

    fn save_testing(&self, record: &Experiment) -> StoreResult<()> {
        self.with_manifest(TESTING_FILE, |manifest: &mut TestingManifest| {
            manifest.insert(record.listing_id, record.clone());
        })
    }

    fn clear_testing(&self, listing_id: ListingId) -> StoreResult<()> {
        self.with_manifest(TESTING_FILE, |manifest: &mut TestingManifest| {
            manifest.remove(&listing_id);
        })
    }

    fn all_testing(&self) -> StoreResult<Vec<Experiment>> {
        let manifest: TestingManifest = self.read_locked(TESTING_FILE)?;
        Ok(manifest.into_values().collect())
    }

    // --- Tested history ---

    fn tested_for_listing(&self, listing_id: ListingId) -> StoreResult<Vec<Experiment>> {
        let manifest: TestedManifest = self.read_locked(TESTED_FILE)?;
        Ok(manifest.get(&listing_id).cloned().unwrap_or_default())
    }

    fn append_tested(&self, record: &Experiment) -> StoreResult<()> {
        self.with_manifest(TESTED_FILE, |manifest: &mut TestedManifest| {
            manifest
                .entry(record.listing_id)
                .or_default()
                .push(record.clone());
        })
    }

    fn update_tested(&self, record: &Experiment) -> StoreResult<()> {
        let found = self.with_manifest(TESTED_FILE, |manifest: &mut TestedManifest| {
            let records = match manifest.get_mut(&record.listing_id) {
                Some(records) => records,
                None => return false,
            };
            match records
                .iter_mut()
                .find(|r| r.experiment_id == record.experiment_id)
            {
                Some(slot) => {
                    *slot = record.clone();
                    true
                }
                None => false,
            }
        })?;
        if !found {
            return Err(ShopLabError::not_found(format!(
                "tested experiment {} for listing {}",
                record.experiment_id, record.listing_id
            )));
        }
        Ok(())
    }

    // --- Listing snapshots ---

    fn save_listings(&self, listings: &[ListingFields]) -> StoreResult<()> {
        self.with_manifest(LISTINGS_FILE, |manifest: &mut ListingManifest| {
            manifest.clear();
            for listing in listings {
                manifest.insert(listing.listing_id, listing.clone());
            }
        })
    }

    fn load_listings(&self) -> StoreResult<Vec<ListingFields>> {
        let manifest: ListingManifest = self.read_locked(LISTINGS_FILE)?;
        Ok(manifest.into_values().collect())
    }

    fn get_listing(&self, listing_id: ListingId) -> StoreResult<Option<ListingFields>> {
        let manifest: ListingManifest = self.read_locked(LISTINGS_FILE)?;
        Ok(manifest.get(&listing_id).cloned())
    }

    fn upsert_listing(&self, listing: &ListingFields) -> StoreResult<()> {
        self.with_manifest(LISTINGS_FILE, |manifest: &mut ListingManifest| {
            manifest.insert(listing.listing_id, listing.clone());
        })
    }

    // --- Image manifests ---

    fn save_images(&self, listing_id: ListingId, images: &[ListingImage]) -> StoreResult<()> {
        self.with_manifest(IMAGES_FILE, |manifest: &mut ImagesManifest| {
            manifest.entry(listing_id).or_default().current = images.to_vec();
        })
    }

    fn get_images(&self, listing_id: ListingId) -> StoreResult<Option<Vec<ListingImage>>> {
        let manifest: ImagesManifest = self.read_locked(IMAGES_FILE)?;
        Ok(manifest.get(&listing_id).map(|record| record.current.clone()))
    }

    fn archive_images(&self, listing_id: ListingId, images: &[ListingImage]) -> StoreResult<()> {
        self.with_manifest(IMAGES_FILE, |manifest: &mut ImagesManifest| {
            manifest.entry(listing_id).or_default().archived = Some(images.to_vec());
        })
    }

    fn take_archived_images(
        &self,
        listing_id: ListingId,
    ) -> StoreResult<Option<Vec<ListingImage>>> {
        self.with_manifest(IMAGES_FILE, |manifest: &mut ImagesManifest| {
            manifest
                .get_mut(&listing_id)
                .and_then(|record| record.archived.take())
        })
    }

    // --- Performance history ---

    fn append_performance_row(&self, date: NaiveDate, views: &DailyViews) -> StoreResult<()> {
        self.with_manifest(PERFORMANCE_FILE, |history: &mut PerformanceHistory| {
            history.insert(date, views.clone());
        })
    }

    fn load_performance(&self) -> StoreResult<PerformanceHistory> {
        self.read_locked(PERFORMANCE_FILE)
    }

    // --- Settings ---

    fn load_settings(&self) -> StoreResult<ExperimentSettings> {
        let path = self.path(SETTINGS_FILE);
        if !path.exists() {
            return Ok(ExperimentSettings::default());
        }
        let _guard = self.io.lock().expect("store lock poisoned");
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| store_err(&path, "read", e))?;
        serde_json::from_str(&raw).map_err(|e| store_err(&path, "parse", e))
    }

    fn save_settings(&self, settings: &ExperimentSettings) -> StoreResult<()> {
        let _guard = self.io.lock().expect("store lock poisoned");
        self.write(SETTINGS_FILE, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{ExperimentState, ListingChange};

    fn store() -> (tempfile::TempDir, JsonStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        (dir, store)
    }

    fn experiment(listing_id: ListingId, id: &str) -> Experiment {
        let mut exp = Experiment::proposed(
            listing_id,
            ListingChange::Title { new_title: "New title".into() },
            Some("hypothesis".into()),
            14,
            None,
        );
        exp.experiment_id = id.to_string();
        exp
    }

    #[test]
    fn untested_records_survive_reload() {
        let (_dir, store) = store();
        store.add_untested(&[experiment(7, "exp-1"), experiment(7, "exp-2")]).unwrap();

        let records = store.untested_for_listing(7).unwrap();
        assert_eq!(records.len(), 2);

        let removed = store.remove_untested(7, "exp-1").unwrap();
        assert_eq!(removed.unwrap().experiment_id, "exp-1");
        assert_eq!(store.untested_for_listing(7).unwrap().len(), 1);
        assert!(store.get_untested(7, "exp-1").unwrap().is_none());
    }

    #[test]
    fn testing_slot_holds_one_record_per_listing() {
        let (_dir, store) = store();
        let mut exp = experiment(7, "exp-1");
        exp.state = ExperimentState::Testing;
        store.save_testing(&exp).unwrap();

        assert!(store.testing_for_listing(7).unwrap().is_some());
        assert!(store.testing_for_listing(8).unwrap().is_none());

        store.clear_testing(7).unwrap();
        assert!(store.testing_for_listing(7).unwrap().is_none());
    }

    #[test]
    fn update_tested_rejects_unknown_record() {
        let (_dir, store) = store();
        let exp = experiment(7, "exp-1");
        assert!(matches!(
            store.update_tested(&exp),
            Err(ShopLabError::NotFound(_))
        ));

        store.append_tested(&exp).unwrap();
        store.update_tested(&exp).unwrap();
        assert_eq!(store.tested_for_listing(7).unwrap().len(), 1);
    }

    #[test]
    fn archived_images_are_consumed_once() {
        let (_dir, store) = store();
        let images = vec![ListingImage { image_id: 1, rank: 1, url: None }];
        store.archive_images(7, &images).unwrap();

        assert_eq!(store.take_archived_images(7).unwrap().unwrap().len(), 1);
        assert!(store.take_archived_images(7).unwrap().is_none());
    }

    #[test]
    fn performance_rows_accumulate_by_date() {
        let (_dir, store) = store();
        let d1: NaiveDate = "2024-01-01".parse().unwrap();
        let d2: NaiveDate = "2024-01-02".parse().unwrap();
        store.append_performance_row(d1, &DailyViews::from([(7, 10)])).unwrap();
        store.append_performance_row(d2, &DailyViews::from([(7, 12)])).unwrap();

        let history = store.load_performance().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[&d2][&7], 12);
    }

    #[test]
    fn settings_default_when_absent() {
        let (_dir, store) = store();
        let settings = store.load_settings().unwrap();
        assert_eq!(settings.run_duration_days, 14);
        assert!((settings.tolerance - 0.05).abs() < f64::EPSILON);

        let custom = ExperimentSettings {
            run_duration_days: 7,
            generation_model: Some("gpt-4.1".into()),
            tolerance: 0.1,
        };
        store.save_settings(&custom).unwrap();
        assert_eq!(store.load_settings().unwrap(), custom);
    }
}
