use std::net::SocketAddr;

use dashmap::DashMap;

use crate::analysis::Phase;

/// Copy of a session's progress, published for the dashboard and logs.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionStats {
    pub samples: u64,
    pub estimates: u64,
    pub last_bpm: Option<f64>,
    pub phase: Phase,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            samples: 0,
            estimates: 0,
            last_bpm: None,
            phase: Phase::Accumulating,
        }
    }
}

/// Registry of live sessions. Analyzers stay with their connection thread;
/// only stats snapshots live here.
pub struct SharedState {
    pub sessions: DashMap<SocketAddr, SessionStats>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn insert(&self, addr: SocketAddr) {
        self.sessions.insert(addr, SessionStats::default());
    }

    pub fn update(&self, addr: &SocketAddr, stats: SessionStats) {
        // A session removed by shutdown stays removed.
        if let Some(mut entry) = self.sessions.get_mut(addr) {
            *entry = stats;
        }
    }

    pub fn remove(&self, addr: &SocketAddr) -> Option<SessionStats> {
        self.sessions.remove(addr).map(|(_, stats)| stats)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn dispose(&self) {
        self.sessions.clear();
    }

    pub fn snapshot(&self) -> Vec<(SocketAddr, SessionStats)> {
        let mut out: Vec<(SocketAddr, SessionStats)> =
            self.sessions.iter().map(|e| (*e.key(), e.value().clone())).collect();
        out.sort_by_key(|(addr, _)| *addr);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn insert_update_remove() {
        let state = SharedState::new();
        state.insert(addr(10000));
        assert_eq!(state.len(), 1);

        let stats = SessionStats {
            samples: 120,
            estimates: 3,
            last_bpm: Some(71.5),
            phase: Phase::Estimating,
        };
        state.update(&addr(10000), stats.clone());
        assert_eq!(state.snapshot(), vec![(addr(10000), stats.clone())]);

        assert_eq!(state.remove(&addr(10000)), Some(stats));
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn update_does_not_resurrect_removed_sessions() {
        let state = SharedState::new();
        state.update(&addr(11000), SessionStats::default());
        assert!(state.sessions.is_empty());
    }

    #[test]
    fn snapshot_is_sorted_by_address() {
        let state = SharedState::new();
        state.insert(addr(12002));
        state.insert(addr(12000));
        state.insert(addr(12001));
        let ports: Vec<u16> = state.snapshot().iter().map(|(a, _)| a.port()).collect();
        assert_eq!(ports, vec![12000, 12001, 12002]);
    }

    #[test]
    fn dispose_clears_all_sessions() {
        let state = SharedState::new();
        state.insert(addr(13000));
        state.insert(addr(13001));
        state.dispose();
        assert!(state.sessions.is_empty());
    }
}
