use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use cion_base_types::Ia;
use cion_trust_store::TrustDb;
use slog::{debug, Logger};

use crate::discovery::Discovery;

/// A registered path segment: an opaque identifier plus the interface
/// sequence it traverses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub id: Vec<u8>,
    pub interfaces: Vec<u64>,
}

/// An end-to-end path as a sequence of segments. Direct links are a single
/// degenerate segment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Path {
    pub segments: Vec<PathSegment>,
}

/// Read side of the path table, consumed by the segment lookup procedure.
pub trait PathLookup: Send + Sync {
    /// Paths from `src` to `dst`. Empty if none is known.
    fn get_paths(&self, src: Ia, dst: Ia) -> Vec<Path>;
}

/// Write side of the path table, driven by the direct-link client.
pub trait DirectPathWriter: Send + Sync {
    fn set_active_direct_path(&self, dst: Ia, path: Path);
}

/// Shared control-plane state: the local identity, the neighbor table, the
/// trust store handle and the active direct-link table.
///
/// The direct-link table is guarded by a reader-writer lock; the lookup
/// procedure takes the read side, the probe loop the write side.
pub struct ControlPlane {
    log: Logger,
    local_ia: Ia,
    discovery: Arc<Discovery>,
    trust_db: Arc<dyn TrustDb>,
    active_direct_paths: RwLock<HashMap<Ia, Path>>,
}

impl ControlPlane {
    pub fn new(
        log: Logger,
        local_ia: Ia,
        discovery: Arc<Discovery>,
        trust_db: Arc<dyn TrustDb>,
    ) -> ControlPlane {
        ControlPlane {
            log,
            local_ia,
            discovery,
            trust_db,
            active_direct_paths: RwLock::new(HashMap::new()),
        }
    }

    pub fn local_ia(&self) -> Ia {
        self.local_ia
    }

    pub(crate) fn log(&self) -> &Logger {
        &self.log
    }

    pub fn discovery(&self) -> &Arc<Discovery> {
        &self.discovery
    }

    pub fn trust_db(&self) -> &Arc<dyn TrustDb> {
        &self.trust_db
    }
}

impl PathLookup for ControlPlane {
    fn get_paths(&self, _src: Ia, dst: Ia) -> Vec<Path> {
        let paths = self
            .active_direct_paths
            .read()
            .expect("path table is never poisoned");
        paths.get(&dst).map(|path| vec![path.clone()]).unwrap_or_default()
    }
}

impl DirectPathWriter for ControlPlane {
    fn set_active_direct_path(&self, dst: Ia, path: Path) {
        debug!(self.log, "direct path refreshed"; "dst" => %dst);
        self.active_direct_paths
            .write()
            .expect("path table is never poisoned")
            .insert(dst, path);
    }
}

#[cfg(test)]
mod tests {
    use cion_trust_store::SledTrustDb;

    use super::*;

    fn test_control_plane(dir: &tempfile::TempDir) -> ControlPlane {
        let log = Logger::root(slog::Discard, slog::o!());
        let db = Arc::new(SledTrustDb::open(dir.path()).unwrap());
        ControlPlane::new(
            log,
            "1-ff00:0:110".parse().unwrap(),
            Arc::new(Discovery::new()),
            db,
        )
    }

    #[test]
    fn lookup_returns_only_refreshed_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_control_plane(&dir);
        let src = service.local_ia();
        let dst: Ia = "1-ff00:0:111".parse().unwrap();
        assert!(service.get_paths(src, dst).is_empty());

        let path = Path {
            segments: vec![PathSegment { id: b"127.0.0.1:30001".to_vec(), interfaces: vec![1] }],
        };
        service.set_active_direct_path(dst, path.clone());
        assert_eq!(service.get_paths(src, dst), vec![path]);
        assert!(service.get_paths(src, "1-ff00:0:112".parse().unwrap()).is_empty());
    }

    #[test]
    fn refresh_replaces_the_previous_path() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_control_plane(&dir);
        let dst: Ia = "1-ff00:0:111".parse().unwrap();

        let stale = Path {
            segments: vec![PathSegment { id: b"old".to_vec(), interfaces: vec![1] }],
        };
        let fresh = Path {
            segments: vec![PathSegment { id: b"new".to_vec(), interfaces: vec![1] }],
        };
        service.set_active_direct_path(dst, stale);
        service.set_active_direct_path(dst, fresh.clone());
        assert_eq!(service.get_paths(service.local_ia(), dst), vec![fresh]);
    }
}
