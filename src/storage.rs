use std::fs::{File as StdFile, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use scopeguard::guard;
use tokio::task;
use tracing::{debug, warn};

use crate::api::Session;
use crate::models::{CheckedSystem, parse_systems};

/// Per-process temp name so concurrent invocations never share a temp file.
fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    PathBuf::from(tmp_name)
}

/// Writes `contents` next to `path` and renames it into place.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)?;
    }

    let tmp_file = tmp_path(path);
    let cleanup = guard(tmp_file.clone(), |path| {
        let _ = std::fs::remove_file(path);
    });
    {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_file)?;
        let mut writer = std::io::BufWriter::new(&file);
        writer.write_all(contents)?;
        writer.flush()?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_file, path)?;
    scopeguard::ScopeGuard::into_inner(cleanup);
    if let Some(dir) = dir {
        if let Ok(dir) = StdFile::open(dir) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Stores the raw `/stats` body exactly as the backend sent it.
pub(crate) async fn save_systems_cache(path: String, raw: String) -> Result<()> {
    task::spawn_blocking(move || write_atomically(Path::new(&path), raw.as_bytes())).await??;
    Ok(())
}

/// `Ok(None)` when there is no usable cache; a corrupt cache is treated as missing.
pub(crate) async fn load_systems_cache(path: String) -> Result<Option<Vec<CheckedSystem>>> {
    task::spawn_blocking(move || -> Result<Option<Vec<CheckedSystem>>> {
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match parse_systems(&raw) {
            Ok(systems) => {
                debug!(path = %path, systems = systems.len(), "loaded systems cache");
                Ok(Some(systems))
            }
            Err(e) => {
                warn!(path = %path, error = %e, "ignoring unreadable systems cache");
                Ok(None)
            }
        }
    })
    .await?
}

pub(crate) async fn save_session(path: String, session: &Session) -> Result<()> {
    let contents = serde_json::to_vec_pretty(session)?;
    task::spawn_blocking(move || write_atomically(Path::new(&path), &contents)).await??;
    Ok(())
}

pub(crate) async fn load_session(path: String) -> Result<Option<Session>> {
    task::spawn_blocking(move || -> Result<Option<Session>> {
        let file = match StdFile::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_reader(BufReader::new(file)) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %path, error = %e, "ignoring unreadable session file");
                Ok(None)
            }
        }
    })
    .await?
}

/// Returns whether a session file was present.
pub(crate) async fn clear_session(path: String) -> Result<bool> {
    task::spawn_blocking(move || -> Result<bool> {
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn missing_cache_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_systems_cache(path_in(&dir, "systems.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn cache_round_trip_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "state/nested/systems.json");
        let raw = r#"[{"id": 5, "checkResults": []}, {"id": 6}]"#.to_string();

        save_systems_cache(path.clone(), raw).await.unwrap();
        let systems = load_systems_cache(path.clone()).await.unwrap().unwrap();
        assert_eq!(systems.iter().map(|s| s.id).collect::<Vec<_>>(), vec![5, 6]);
        assert!(!tmp_path(Path::new(&path)).exists());
        let leftovers: Vec<_> = std::fs::read_dir(Path::new(&path).parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("systems.json")]);
    }

    #[tokio::test]
    async fn corrupt_cache_is_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "systems.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_systems_cache(path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "session.json");
        let session = Session {
            account: "admin".to_string(),
            cookies: vec!["session=abc123".to_string()],
            created: Utc::now(),
        };

        save_session(path.clone(), &session).await.unwrap();
        let loaded = load_session(path.clone()).await.unwrap().unwrap();
        assert_eq!(loaded, session);

        assert!(clear_session(path.clone()).await.unwrap());
        assert!(!clear_session(path.clone()).await.unwrap());
        assert!(load_session(path).await.unwrap().is_none());
    }

    #[test]
    fn temp_name_is_unique_per_process() {
        let tmp = tmp_path(Path::new("state/systems.json"));
        assert_eq!(
            tmp,
            PathBuf::from(format!("state/systems.json.{}.tmp", std::process::id()))
        );
    }

    #[tokio::test]
    async fn stale_temp_file_of_another_process_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "systems.json");
        let foreign = format!("{}.0.tmp", path);
        std::fs::write(&foreign, "partial").unwrap();

        save_systems_cache(path.clone(), "[]".to_string()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&foreign).unwrap(), "partial");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }
}
