//! File-backed snapshot store: one JSON file per key in the data directory.

use anyhow::Result;
use cadence_core::{SnapshotStore, StoreError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::config::project_dirs;

pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn open_default() -> Result<Self> {
        let proj_dirs =
            project_dirs().ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(Self::new(proj_dirs.data_dir().join("runs"))?)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Percent-encodes the key, so distinct keys never share a file and no
    /// key can name a path separator.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", urlencoding::encode(key)))
    }
}

impl SnapshotStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("runs")).unwrap();

        assert_eq!(store.get("timer-run:a").unwrap(), None);
        store.put("timer-run:a", "{\"x\":1}").unwrap();
        store.put("timer-run:a", "{\"x\":2}").unwrap();
        assert_eq!(store.get("timer-run:a").unwrap().as_deref(), Some("{\"x\":2}"));

        store.delete("timer-run:a").unwrap();
        assert_eq!(store.get("timer-run:a").unwrap(), None);
        store.delete("timer-run:a").unwrap();
    }

    #[test]
    fn keys_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let path = store.path_for("timer-run:../../etc/passwd");
        assert_eq!(path.parent(), Some(store.dir()));
        let path = store.path_for("..");
        assert_eq!(path.parent(), Some(store.dir()));
    }

    #[test]
    fn keys_differing_only_in_punctuation_get_their_own_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path()).unwrap();
        assert_ne!(store.path_for("timer-run:leg.day"), store.path_for("timer-run:leg_day"));

        store.put("timer-run:leg.day", "dot").unwrap();
        store.put("timer-run:leg_day", "underscore").unwrap();
        store.delete("timer-run:leg_day").unwrap();
        assert_eq!(store.get("timer-run:leg.day").unwrap().as_deref(), Some("dot"));
    }

    #[test]
    fn paused_run_survives_another_timer_attaching() {
        use cadence_core::{
            CycleLimit, IntervalSpec, ManualClock, RecordingSink, Runner, RunnerPersistence, Status,
            TimerDefinition,
        };
        use chrono::{TimeZone, Utc};

        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 9, 17, 0, 0).unwrap());
        let attach = |id: &str| {
            Runner::attach(
                clock.clone(),
                RunnerPersistence::new(FileStore::new(dir.path()).unwrap()),
                RecordingSink::default(),
                TimerDefinition::new(id, id, vec![IntervalSpec::work(40), IntervalSpec::rest(20)]),
            )
        };

        let mut legs = attach("leg.day");
        legs.start(CycleLimit::finite(3)).unwrap();
        clock.advance_ms(5_000);
        legs.pause().unwrap();

        let mut other = attach("leg_day");
        assert_eq!(other.engine().status(), Status::Idle);
        other.start(CycleLimit::finite(1)).unwrap();
        other.reset().unwrap();

        let legs = attach("leg.day");
        assert_eq!(legs.engine().status(), Status::Paused);
        assert_eq!(legs.status().remaining_ms, 35_000);
    }
}
