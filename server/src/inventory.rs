//! Fixed-size slot inventory owned by each player

use crate::error::{Result, ServerError};
use shared::items::{self, ids};
use shared::{ItemStack, SlotData, INVENTORY_SIZE};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    slots: [Option<ItemStack>; INVENTORY_SIZE],
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            slots: [None; INVENTORY_SIZE],
        }
    }
}

/// Sums duplicate item ids so requirements can be checked per item
fn totals(items: &[(u32, u32)]) -> HashMap<u32, u32> {
    let mut totals = HashMap::new();
    for &(item_id, quantity) in items {
        *totals.entry(item_id).or_insert(0) += quantity;
    }
    totals
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kit handed to brand-new players
    pub fn starter() -> Self {
        let mut inventory = Self::new();
        inventory.add(ids::ROCK, 1);
        inventory.add(ids::APPLE, 3);
        inventory.add(ids::WATER_BOTTLE, 2);
        inventory
    }

    /// Rebuilds an inventory from a persisted slot list
    pub fn from_slots(saved: &[Option<ItemStack>]) -> Self {
        let mut inventory = Self::new();
        for (slot, stack) in inventory.slots.iter_mut().zip(saved.iter()) {
            *slot = *stack;
        }
        inventory
    }

    pub fn to_slots(&self) -> Vec<Option<ItemStack>> {
        self.slots.to_vec()
    }

    pub fn slot(&self, index: usize) -> Option<&ItemStack> {
        self.slots.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn count(&self, item_id: u32) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|stack| stack.item_id == item_id)
            .map(|stack| stack.quantity)
            .sum()
    }

    pub fn has_all(&self, items: &[(u32, u32)]) -> bool {
        totals(items)
            .into_iter()
            .all(|(item_id, needed)| self.count(item_id) >= needed)
    }

    /// Adds items, topping up existing stacks before using empty slots.
    /// Returns how many did not fit.
    pub fn add(&mut self, item_id: u32, quantity: u32) -> u32 {
        let max_stack = items::max_stack(item_id);
        if max_stack == 0 {
            return quantity;
        }

        let mut remaining = quantity;

        for stack in self.slots.iter_mut().flatten() {
            if remaining == 0 {
                break;
            }
            if stack.item_id == item_id && stack.quantity < max_stack {
                let moved = remaining.min(max_stack - stack.quantity);
                stack.quantity += moved;
                remaining -= moved;
            }
        }

        for slot in self.slots.iter_mut() {
            if remaining == 0 {
                break;
            }
            if slot.is_none() {
                let moved = remaining.min(max_stack);
                *slot = Some(ItemStack::new(item_id, moved));
                remaining -= moved;
            }
        }

        remaining
    }

    /// Removes `quantity` of `item_id`, or nothing if there is not enough
    pub fn remove(&mut self, item_id: u32, quantity: u32) -> bool {
        if self.count(item_id) < quantity {
            return false;
        }

        let mut remaining = quantity;
        // Drain from the back so the front slots keep their layout
        for slot in self.slots.iter_mut().rev() {
            if remaining == 0 {
                break;
            }
            if let Some(stack) = slot {
                if stack.item_id != item_id {
                    continue;
                }
                let taken = remaining.min(stack.quantity);
                stack.quantity -= taken;
                remaining -= taken;
                if stack.quantity == 0 {
                    *slot = None;
                }
            }
        }
        true
    }

    /// Removes every listed item or none of them
    pub fn consume_all(&mut self, items: &[(u32, u32)]) -> bool {
        if !self.has_all(items) {
            return false;
        }
        for (item_id, quantity) in totals(items) {
            self.remove(item_id, quantity);
        }
        true
    }

    /// Takes up to `quantity` items out of one slot
    pub fn take_from_slot(&mut self, index: usize, quantity: u32) -> Option<ItemStack> {
        let slot = self.slots.get_mut(index)?;
        let stack = slot.as_mut()?;
        let taken = quantity.min(stack.quantity);
        if taken == 0 {
            return None;
        }

        let mut out = *stack;
        out.quantity = taken;
        stack.quantity -= taken;
        if stack.quantity == 0 {
            *slot = None;
        }
        Some(out)
    }

    /// Moves a stack onto another slot: into an empty slot, merged into the
    /// same item up to its stack limit, or swapped otherwise.
    pub fn move_slot(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= INVENTORY_SIZE || to >= INVENTORY_SIZE {
            return Err(ServerError::invalid_state(format!(
                "slot out of range: {} -> {}",
                from, to
            )));
        }
        if from == to {
            return Err(ServerError::invalid_state("cannot move a slot onto itself"));
        }

        let source = self.slots[from]
            .ok_or_else(|| ServerError::invalid_state(format!("slot {} is empty", from)))?;

        match self.slots[to] {
            None => {
                self.slots[to] = Some(source);
                self.slots[from] = None;
            }
            Some(mut target) if target.item_id == source.item_id => {
                let max_stack = items::max_stack(source.item_id);
                let moved = source.quantity.min(max_stack.saturating_sub(target.quantity));
                target.quantity += moved;
                self.slots[to] = Some(target);

                let left = source.quantity - moved;
                self.slots[from] = if left == 0 {
                    None
                } else {
                    Some(ItemStack {
                        quantity: left,
                        ..source
                    })
                };
            }
            Some(_) => self.slots.swap(from, to),
        }
        Ok(())
    }

    /// Wire view of the occupied slots
    pub fn snapshot(&self) -> Vec<SlotData> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.map(|stack| SlotData {
                    slot: index as u32,
                    item_id: stack.item_id,
                    quantity: stack.quantity,
                    durability: stack.durability,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_kit() {
        let inventory = Inventory::starter();
        assert_eq!(inventory.count(ids::ROCK), 1);
        assert_eq!(inventory.count(ids::APPLE), 3);
        assert_eq!(inventory.count(ids::WATER_BOTTLE), 2);
    }

    #[test]
    fn test_add_stacks_before_using_new_slots() {
        let mut inventory = Inventory::new();
        assert_eq!(inventory.add(ids::WOOD, 600), 0);
        assert_eq!(inventory.add(ids::WOOD, 600), 0);

        assert_eq!(inventory.count(ids::WOOD), 1200);
        assert_eq!(inventory.slot(0).unwrap().quantity, 1000);
        assert_eq!(inventory.slot(1).unwrap().quantity, 200);
        assert!(inventory.slot(2).is_none());
    }

    #[test]
    fn test_add_reports_overflow() {
        let mut inventory = Inventory::new();
        for _ in 0..INVENTORY_SIZE {
            inventory.add(ids::METAL_ARMOR, 1);
        }
        assert_eq!(inventory.add(ids::WOOD, 10), 10);
        assert_eq!(inventory.add(9999, 3), 3);
    }

    #[test]
    fn test_remove_is_all_or_nothing() {
        let mut inventory = Inventory::new();
        inventory.add(ids::STONE, 50);

        assert!(!inventory.remove(ids::STONE, 51));
        assert_eq!(inventory.count(ids::STONE), 50);

        assert!(inventory.remove(ids::STONE, 50));
        assert_eq!(inventory.count(ids::STONE), 0);
        assert!(inventory.slot(0).is_none());
    }

    #[test]
    fn test_consume_all_atomic() {
        let mut inventory = Inventory::new();
        inventory.add(ids::WOOD, 100);
        inventory.add(ids::STONE, 10);

        assert!(!inventory.consume_all(&[(ids::WOOD, 50), (ids::STONE, 20)]));
        assert_eq!(inventory.count(ids::WOOD), 100);
        assert_eq!(inventory.count(ids::STONE), 10);

        assert!(inventory.consume_all(&[(ids::WOOD, 50), (ids::STONE, 10)]));
        assert_eq!(inventory.count(ids::WOOD), 50);
        assert_eq!(inventory.count(ids::STONE), 0);
    }

    #[test]
    fn test_has_all_sums_duplicates() {
        let mut inventory = Inventory::new();
        inventory.add(ids::WOOD, 30);
        assert!(inventory.has_all(&[(ids::WOOD, 20)]));
        assert!(!inventory.has_all(&[(ids::WOOD, 20), (ids::WOOD, 20)]));
    }

    #[test]
    fn test_move_into_empty_slot() {
        let mut inventory = Inventory::new();
        inventory.add(ids::ROCK, 1);
        inventory.move_slot(0, 5).unwrap();
        assert!(inventory.slot(0).is_none());
        assert_eq!(inventory.slot(5).unwrap().item_id, ids::ROCK);
    }

    #[test]
    fn test_move_merges_same_item() {
        let mut inventory = Inventory::from_slots(&[
            Some(ItemStack::new(ids::APPLE, 12)),
            Some(ItemStack::new(ids::APPLE, 4)),
        ]);

        // Apples stack to 20, so only 8 fit on top of the 12
        inventory.move_slot(1, 0).unwrap();
        assert_eq!(inventory.slot(0).unwrap().quantity, 16);
        assert!(inventory.slot(1).is_none());

        inventory.add(ids::APPLE, 10);
        assert_eq!(inventory.slot(0).unwrap().quantity, 20);
        assert_eq!(inventory.slot(1).unwrap().quantity, 6);

        inventory.move_slot(1, 0).unwrap();
        assert_eq!(inventory.slot(0).unwrap().quantity, 20);
        assert_eq!(inventory.slot(1).unwrap().quantity, 6);
    }

    #[test]
    fn test_move_swaps_different_items() {
        let mut inventory = Inventory::new();
        inventory.add(ids::ROCK, 1);
        inventory.add(ids::WOOD, 5);
        inventory.move_slot(0, 1).unwrap();
        assert_eq!(inventory.slot(0).unwrap().item_id, ids::WOOD);
        assert_eq!(inventory.slot(1).unwrap().item_id, ids::ROCK);
    }

    #[test]
    fn test_move_rejects_bad_slots() {
        let mut inventory = Inventory::new();
        inventory.add(ids::ROCK, 1);
        assert!(inventory.move_slot(0, 0).is_err());
        assert!(inventory.move_slot(3, 4).is_err());
        assert!(inventory.move_slot(0, INVENTORY_SIZE).is_err());
    }

    #[test]
    fn test_take_from_slot() {
        let mut inventory = Inventory::new();
        inventory.add(ids::APPLE, 3);
        let taken = inventory.take_from_slot(0, 1).unwrap();
        assert_eq!(taken.quantity, 1);
        assert_eq!(inventory.count(ids::APPLE), 2);
        assert!(inventory.take_from_slot(7, 1).is_none());
    }

    #[test]
    fn test_snapshot_lists_occupied_slots() {
        let mut inventory = Inventory::new();
        inventory.add(ids::ROCK, 1);
        inventory.add(ids::WOOD, 10);
        inventory.move_slot(1, 4).unwrap();

        let snapshot = inventory.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].slot, 0);
        assert_eq!(snapshot[1].slot, 4);
        assert_eq!(snapshot[1].quantity, 10);
    }

    #[test]
    fn test_slots_roundtrip_through_persistence_form() {
        let inventory = Inventory::starter();
        assert_eq!(Inventory::from_slots(&inventory.to_slots()), inventory);
    }
}
