//! MAC DL UE Manager
//!
//! Registry resolving the scheduler's `(C-RNTI, LCID)` allocations to
//! the RLC bearers the cell processor pulls SDUs from. Mutations arrive
//! from the control executor while lookups run on the cell executors, so
//! the registry is lock-protected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use common::types::{Lcid, Rnti, UeIndex};
use tracing::{info, warn};

use super::MacSduTxBuilder;

struct UeEntry {
    ue_index: UeIndex,
    bearers: HashMap<Lcid, Arc<dyn MacSduTxBuilder>>,
}

/// DL-side registry of attached UEs and their TX bearers
#[derive(Default)]
pub struct MacDlUeManager {
    ues: Mutex<HashMap<Rnti, UeEntry>>,
}

impl MacDlUeManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a UE with its initial set of bearers. Fails on duplicate
    /// RNTI.
    pub fn add_ue(
        &self,
        ue_index: UeIndex,
        rnti: Rnti,
        bearers: Vec<(Lcid, Arc<dyn MacSduTxBuilder>)>,
    ) -> bool {
        let mut ues = self.ues.lock().unwrap();
        if ues.contains_key(&rnti) {
            warn!("UE with rnti={} already exists", rnti);
            return false;
        }
        ues.insert(
            rnti,
            UeEntry {
                ue_index,
                bearers: bearers.into_iter().collect(),
            },
        );
        info!("MAC DL UE added rnti={}", rnti);
        true
    }

    /// Add one bearer to an existing UE.
    pub fn add_bearer(&self, rnti: Rnti, lcid: Lcid, bearer: Arc<dyn MacSduTxBuilder>) -> bool {
        let mut ues = self.ues.lock().unwrap();
        let Some(entry) = ues.get_mut(&rnti) else {
            warn!("Cannot add bearer, unknown rnti={}", rnti);
            return false;
        };
        entry.bearers.insert(lcid, bearer);
        true
    }

    /// Remove a UE and all its bearers.
    pub fn remove_ue(&self, rnti: Rnti) -> bool {
        let removed = self.ues.lock().unwrap().remove(&rnti).is_some();
        if removed {
            info!("MAC DL UE removed rnti={}", rnti);
        } else {
            warn!("Cannot remove unknown rnti={}", rnti);
        }
        removed
    }

    /// TX bearer registered for `(rnti, lcid)`, if any
    pub fn get_bearer(&self, rnti: Rnti, lcid: Lcid) -> Option<Arc<dyn MacSduTxBuilder>> {
        self.ues
            .lock()
            .unwrap()
            .get(&rnti)
            .and_then(|ue| ue.bearers.get(&lcid))
            .cloned()
    }

    /// UE index of an attached RNTI
    pub fn get_ue_index(&self, rnti: Rnti) -> Option<UeIndex> {
        self.ues.lock().unwrap().get(&rnti).map(|ue| ue.ue_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    struct NullBearer;

    impl MacSduTxBuilder for NullBearer {
        fn on_new_tx_sdu(&self, _nof_bytes: usize) -> Bytes {
            Bytes::new()
        }

        fn on_buffer_state_update(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_add_lookup_remove() {
        let mng = MacDlUeManager::new();
        let bearer: Arc<dyn MacSduTxBuilder> = Arc::new(NullBearer);
        assert!(mng.add_ue(UeIndex(3), Rnti(0x4601), vec![(Lcid(4), bearer)]));

        assert!(mng.get_bearer(Rnti(0x4601), Lcid(4)).is_some());
        assert!(mng.get_bearer(Rnti(0x4601), Lcid(5)).is_none());
        assert!(mng.get_bearer(Rnti(0x4602), Lcid(4)).is_none());
        assert_eq!(mng.get_ue_index(Rnti(0x4601)), Some(UeIndex(3)));

        assert!(mng.remove_ue(Rnti(0x4601)));
        assert!(!mng.remove_ue(Rnti(0x4601)));
        assert!(mng.get_bearer(Rnti(0x4601), Lcid(4)).is_none());
    }

    #[test]
    fn test_duplicate_rnti_rejected() {
        let mng = MacDlUeManager::new();
        assert!(mng.add_ue(UeIndex(0), Rnti(0x4601), vec![]));
        assert!(!mng.add_ue(UeIndex(1), Rnti(0x4601), vec![]));
    }

    #[test]
    fn test_add_bearer_to_existing_ue() {
        let mng = MacDlUeManager::new();
        assert!(mng.add_ue(UeIndex(0), Rnti(0x4601), vec![]));
        let bearer: Arc<dyn MacSduTxBuilder> = Arc::new(NullBearer);
        assert!(mng.add_bearer(Rnti(0x4601), Lcid(4), bearer.clone()));
        assert!(!mng.add_bearer(Rnti(0x4602), Lcid(4), bearer));
        assert!(mng.get_bearer(Rnti(0x4601), Lcid(4)).is_some());
    }
}
