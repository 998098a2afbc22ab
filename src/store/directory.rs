// Directory-backed waveform store speaking the legacy on-disk layout:
//
//   <root>/info.txt
//   <root>/<partition dir>/{C2|D1}--waveforms--NNNNN.txt
//   <root>/calculations[_shaping]/D1--waveforms--NNNNN.txt

use super::{waveform_file_name, CalculationTable, Partition, WaveformStore};
use crate::error::StoreError;
use crate::waveform::{parse_waveform, write_waveform, AcquisitionInfo, WaveformId, WaveformRecord};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

const INFO_FILE: &str = "info.txt";

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    header_lines: usize,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>, header_lines: usize) -> Self {
        Self {
            root: root.into(),
            header_lines,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_dir(&self, partition: Partition) -> PathBuf {
        self.root.join(partition.dir_name())
    }

    pub fn waveform_path(&self, partition: Partition, id: WaveformId) -> PathBuf {
        self.partition_dir(partition)
            .join(waveform_file_name(partition, id))
    }

    pub fn calculation_path(&self, table: CalculationTable, id: WaveformId) -> PathBuf {
        self.root
            .join(table.dir_name())
            .join(waveform_file_name(Partition::Accepted, id))
    }

    pub fn load_info(&self) -> Result<AcquisitionInfo, StoreError> {
        let path = self.root.join(INFO_FILE);
        let text = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        AcquisitionInfo::parse(&text)
    }

    pub fn save_info(&self, info: &AcquisitionInfo) -> Result<(), StoreError> {
        write_atomic(&self.root.join(INFO_FILE), info.to_text().as_bytes())
    }

    /// Create the root and every partition directory
    pub fn ensure_layout(&self) -> Result<(), StoreError> {
        let mut dirs: Vec<PathBuf> = [
            Partition::Raw,
            Partition::Accepted,
            Partition::Rejected,
            Partition::Uncertain,
        ]
        .iter()
        .chain(Partition::DERIVED.iter().skip(1))
        .map(|p| self.partition_dir(*p))
        .collect();
        dirs.extend(
            CalculationTable::ALL
                .iter()
                .map(|t| self.root.join(t.dir_name())),
        );
        for dir in dirs {
            fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
        Ok(())
    }
}

/// Write through a uniquely named sibling temp file, then rename into place
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let temp = temp_path(path);
    fs::write(&temp, bytes).map_err(|e| StoreError::io(&temp, e))?;
    fs::rename(&temp, path).map_err(|e| {
        let _ = fs::remove_file(&temp);
        StoreError::io(path, e)
    })
}

/// Publish `bytes` at `path` only when nothing is there yet
///
/// The finished temp file is hard-linked into place. Linking fails on an
/// existing target, so concurrent writers cannot replace a published record
/// and readers never see a partial one.
fn write_new(path: &Path, bytes: &[u8]) -> Result<bool, StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    let temp = temp_path(path);
    fs::write(&temp, bytes).map_err(|e| StoreError::io(&temp, e))?;
    let linked = fs::hard_link(&temp, path);
    let _ = fs::remove_file(&temp);
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn parse_id(file_name: &str, prefix: &str) -> Option<WaveformId> {
    file_name
        .strip_prefix(prefix)?
        .strip_prefix("--waveforms--")?
        .strip_suffix(".txt")?
        .parse()
        .ok()
}

impl WaveformStore for DirectoryStore {
    fn get(&self, partition: Partition, id: WaveformId) -> Result<WaveformRecord, StoreError> {
        let path = self.waveform_path(partition, id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound { partition, id })
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        Ok(parse_waveform(&bytes, self.header_lines)?)
    }

    fn put(
        &self,
        partition: Partition,
        id: WaveformId,
        record: &WaveformRecord,
    ) -> Result<(), StoreError> {
        write_atomic(&self.waveform_path(partition, id), &write_waveform(record))
    }

    fn remove(&self, partition: Partition, id: WaveformId) -> Result<bool, StoreError> {
        remove_if_present(&self.waveform_path(partition, id))
    }

    fn contains(&self, partition: Partition, id: WaveformId) -> bool {
        self.waveform_path(partition, id).is_file()
    }

    fn ids(&self, partition: Partition) -> Result<Vec<WaveformId>, StoreError> {
        let dir = self.partition_dir(partition);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            if let Some(id) = parse_id(&entry.file_name().to_string_lossy(), partition.file_prefix())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn load_calculation(
        &self,
        table: CalculationTable,
        id: WaveformId,
    ) -> Result<Option<String>, StoreError> {
        let path = self.calculation_path(table, id);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&path, e)),
        }
    }

    fn save_calculation(
        &self,
        table: CalculationTable,
        id: WaveformId,
        contents: &str,
    ) -> Result<bool, StoreError> {
        write_new(&self.calculation_path(table, id), contents.as_bytes())
    }

    fn remove_calculation(
        &self,
        table: CalculationTable,
        id: WaveformId,
    ) -> Result<bool, StoreError> {
        remove_if_present(&self.calculation_path(table, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_put_get_and_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path(), 5);
        let record = fixtures::PulseShape::default()
            .record(&fixtures::SampleClock::default())
            .unwrap();

        store.put(Partition::Raw, 3, &record).unwrap();
        assert!(dir.path().join("d0/C2--waveforms--00003.txt").is_file());
        assert!(store.contains(Partition::Raw, 3));

        let loaded = store.get(Partition::Raw, 3).unwrap();
        assert_eq!(loaded.len(), record.len());
        assert_eq!(loaded.header(), record.header());

        let missing = store.get(Partition::Accepted, 3).unwrap_err();
        assert!(missing.is_not_found());
    }

    #[test]
    fn test_ids_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path(), 5);
        let record = fixtures::PulseShape::default()
            .record(&fixtures::SampleClock::default())
            .unwrap();
        for id in [12, 2, 7] {
            store.put(Partition::Shifted, id, &record).unwrap();
        }
        fs::write(dir.path().join("d1_shifted/notes.txt"), "x").unwrap();
        assert_eq!(store.ids(Partition::Shifted).unwrap(), vec![2, 7, 12]);
        assert!(store.ids(Partition::Rejected).unwrap().is_empty());
    }

    #[test]
    fn test_calculation_is_create_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path(), 5);
        assert!(store
            .save_calculation(CalculationTable::Features, 1, "a,1")
            .unwrap());
        assert!(!store
            .save_calculation(CalculationTable::Features, 1, "a,2")
            .unwrap());
        assert_eq!(
            store
                .load_calculation(CalculationTable::Features, 1)
                .unwrap()
                .as_deref(),
            Some("a,1")
        );
        assert!(dir
            .path()
            .join("calculations/D1--waveforms--00001.txt")
            .is_file());
        assert!(store
            .remove_calculation(CalculationTable::Features, 1)
            .unwrap());
        assert!(!store
            .remove_calculation(CalculationTable::Features, 1)
            .unwrap());
    }

    #[test]
    fn test_racing_calculation_writers_publish_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path(), 5);

        let published: Vec<(bool, String)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|n| {
                    let store = &store;
                    scope.spawn(move || {
                        let contents = format!("charge,{n}e-13");
                        let won = store
                            .save_calculation(CalculationTable::Features, 5, &contents)
                            .unwrap();
                        (won, contents)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners: Vec<_> = published.iter().filter(|(won, _)| *won).collect();
        assert_eq!(winners.len(), 1);
        let stored = store
            .load_calculation(CalculationTable::Features, 5)
            .unwrap()
            .unwrap();
        assert_eq!(stored, winners[0].1);

        let leftovers = fs::read_dir(dir.path().join("calculations"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 1, "temp files are cleaned up");
    }

    #[test]
    fn test_info_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path(), 5);
        store
            .save_info(&AcquisitionInfo::with_acquisition(2.0e10, 50.0))
            .unwrap();
        let info = store.load_info().unwrap();
        assert_eq!(info.sample_rate(), Some(2.0e10));
    }
}
