use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::RwLock;

use cion_base_types::Ia;

/// A directly connected neighbor AS and the underlay endpoint its control
/// plane listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbor {
    pub ia: Ia,
    pub addr: SocketAddr,
}

/// The neighbor table.
///
/// Neighbors come from the node configuration and today never change after
/// start; all runtime mutation still goes through the single writer entry
/// point so the probe loop's view stays consistent within a tick.
#[derive(Debug, Default)]
pub struct Discovery {
    neighbors: RwLock<HashMap<Ia, Neighbor>>,
}

impl Discovery {
    pub fn new() -> Discovery {
        Discovery::default()
    }

    /// Registers a direct neighbor, replacing any previous entry for the
    /// same AS.
    pub fn add_neighbor(&self, ia: Ia, addr: SocketAddr) {
        self.neighbors
            .write()
            .expect("neighbor table is never poisoned")
            .insert(ia, Neighbor { ia, addr });
    }

    /// All known neighbors.
    pub fn neighbors(&self) -> Vec<Neighbor> {
        self.neighbors
            .read()
            .expect("neighbor table is never poisoned")
            .values()
            .copied()
            .collect()
    }

    /// A specific neighbor, if configured.
    pub fn neighbor(&self, ia: Ia) -> Option<Neighbor> {
        self.neighbors
            .read()
            .expect("neighbor table is never poisoned")
            .get(&ia)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_are_registered_and_looked_up() {
        let discovery = Discovery::new();
        let ia: Ia = "1-ff00:0:111".parse().unwrap();
        let addr: SocketAddr = "127.0.0.1:30001".parse().unwrap();
        assert_eq!(discovery.neighbor(ia), None);

        discovery.add_neighbor(ia, addr);
        assert_eq!(discovery.neighbor(ia), Some(Neighbor { ia, addr }));
        assert_eq!(discovery.neighbors(), vec![Neighbor { ia, addr }]);

        // Re-registration replaces the endpoint.
        let moved: SocketAddr = "127.0.0.1:30002".parse().unwrap();
        discovery.add_neighbor(ia, moved);
        assert_eq!(discovery.neighbor(ia).unwrap().addr, moved);
        assert_eq!(discovery.neighbors().len(), 1);
    }
}
