//! Player snapshot storage
//!
//! The server only relies on the [`PlayerStore`] contract. [`MemoryStore`]
//! keeps bincode-encoded snapshots in memory, which is enough to carry an
//! inventory across a reconnect within one server run.

use crate::error::Result;
use crate::inventory::Inventory;
use serde::{Deserialize, Serialize};
use shared::{ItemStack, Stats};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerData {
    pub inventory: Vec<Option<ItemStack>>,
    pub stats: Stats,
}

pub trait PlayerStore: Send + Sync {
    fn save(&self, player_id: u32, inventory: &Inventory, stats: &Stats) -> Result<()>;
    fn load(&self, player_id: u32) -> Result<Option<PlayerData>>;
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<u32, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlayerStore for MemoryStore {
    fn save(&self, player_id: u32, inventory: &Inventory, stats: &Stats) -> Result<()> {
        let data = PlayerData {
            inventory: inventory.to_slots(),
            stats: *stats,
        };
        let bytes = bincode::serialize(&data)?;
        // A poisoned map still holds valid snapshots
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(player_id, bytes);
        Ok(())
    }

    fn load(&self, player_id: u32) -> Result<Option<PlayerData>> {
        let bytes = {
            let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
            records.get(&player_id).cloned()
        };
        match bytes {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::items::ids;

    #[test]
    fn test_missing_player_loads_none() {
        let store = MemoryStore::new();
        assert_eq!(store.load(1).unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStore::new();
        let mut inventory = Inventory::starter();
        inventory.add(ids::WOOD, 120);
        let stats = Stats {
            health: 42.0,
            ..Stats::default()
        };

        store.save(7, &inventory, &stats).unwrap();
        let data = store.load(7).unwrap().unwrap();

        assert_eq!(data.stats.health, 42.0);
        assert_eq!(Inventory::from_slots(&data.inventory), inventory);
    }
}
