//! Timed per-player production queues
//!
//! Each player owns a FIFO whose front entry is the job currently being
//! worked on. Ingredients for the whole order are taken when the order is
//! queued, so finishing a job only has to hand out the result.

use crate::config::RefundPolicy;
use crate::inventory::Inventory;
use log::{debug, warn};
use shared::items::ids;
use shared::{Packet, QueueEntry, RecipeData};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recipe {
    pub id: u32,
    pub name: &'static str,
    pub result_item: u32,
    pub result_quantity: u32,
    /// Seconds per unit
    pub duration: f32,
    pub ingredients: &'static [(u32, u32)],
}

pub static RECIPES: &[Recipe] = &[
    Recipe {
        id: 1,
        name: "Stone Hatchet",
        result_item: ids::STONE_HATCHET,
        result_quantity: 1,
        duration: 30.0,
        ingredients: &[(ids::WOOD, 200), (ids::STONE, 100)],
    },
    Recipe {
        id: 2,
        name: "Stone Pickaxe",
        result_item: ids::STONE_PICKAXE,
        result_quantity: 1,
        duration: 30.0,
        ingredients: &[(ids::WOOD, 200), (ids::STONE, 100)],
    },
    Recipe {
        id: 3,
        name: "Wooden Spear",
        result_item: ids::WOODEN_SPEAR,
        result_quantity: 1,
        duration: 30.0,
        ingredients: &[(ids::WOOD, 300)],
    },
    Recipe {
        id: 4,
        name: "Hunting Bow",
        result_item: ids::HUNTING_BOW,
        result_quantity: 1,
        duration: 30.0,
        ingredients: &[(ids::WOOD, 200), (ids::CLOTH, 50)],
    },
    Recipe {
        id: 5,
        name: "Wooden Arrow",
        result_item: ids::WOODEN_ARROW,
        result_quantity: 2,
        duration: 5.0,
        ingredients: &[(ids::WOOD, 25), (ids::STONE, 10)],
    },
    Recipe {
        id: 6,
        name: "Bandage",
        result_item: ids::BANDAGE,
        result_quantity: 1,
        duration: 5.0,
        ingredients: &[(ids::CLOTH, 4)],
    },
    Recipe {
        id: 7,
        name: "Wood Armor",
        result_item: ids::WOOD_ARMOR,
        result_quantity: 1,
        duration: 20.0,
        ingredients: &[(ids::WOOD, 300), (ids::CLOTH, 20)],
    },
    Recipe {
        id: 8,
        name: "Metal Fragments",
        result_item: ids::METAL_FRAGMENTS,
        result_quantity: 1,
        duration: 2.0,
        ingredients: &[(ids::METAL_ORE, 2), (ids::WOOD, 1)],
    },
    Recipe {
        id: 9,
        name: "Gunpowder",
        result_item: ids::GUNPOWDER,
        result_quantity: 10,
        duration: 10.0,
        ingredients: &[(ids::SULFUR_ORE, 20), (ids::WOOD, 30)],
    },
    Recipe {
        id: 10,
        name: "Machete",
        result_item: ids::MACHETE,
        result_quantity: 1,
        duration: 45.0,
        ingredients: &[(ids::METAL_FRAGMENTS, 75), (ids::WOOD, 50)],
    },
    Recipe {
        id: 11,
        name: "Metal Hatchet",
        result_item: ids::METAL_HATCHET,
        result_quantity: 1,
        duration: 45.0,
        ingredients: &[(ids::METAL_FRAGMENTS, 75), (ids::WOOD, 100)],
    },
    Recipe {
        id: 12,
        name: "Metal Pickaxe",
        result_item: ids::METAL_PICKAXE,
        result_quantity: 1,
        duration: 45.0,
        ingredients: &[(ids::METAL_FRAGMENTS, 75), (ids::WOOD, 100)],
    },
    Recipe {
        id: 13,
        name: "Pistol",
        result_item: ids::PISTOL,
        result_quantity: 1,
        duration: 60.0,
        ingredients: &[(ids::METAL_FRAGMENTS, 150), (ids::WOOD, 100)],
    },
    Recipe {
        id: 14,
        name: "Pistol Bullet",
        result_item: ids::PISTOL_BULLET,
        result_quantity: 4,
        duration: 10.0,
        ingredients: &[(ids::METAL_FRAGMENTS, 10), (ids::GUNPOWDER, 5)],
    },
    Recipe {
        id: 15,
        name: "Metal Armor",
        result_item: ids::METAL_ARMOR,
        result_quantity: 1,
        duration: 60.0,
        ingredients: &[(ids::METAL_FRAGMENTS, 200), (ids::CLOTH, 30)],
    },
];

pub fn find_recipe(recipe_id: u32) -> Option<&'static Recipe> {
    RECIPES.iter().find(|r| r.id == recipe_id)
}

/// Recipe book as sent to clients during sync
pub fn recipe_data() -> Vec<RecipeData> {
    RECIPES
        .iter()
        .map(|r| RecipeData {
            recipe_id: r.id,
            name: r.name.to_string(),
            result_item: r.result_item,
            result_quantity: r.result_quantity,
            duration: r.duration,
            ingredients: r.ingredients.to_vec(),
        })
        .collect()
}

/// Ingredient list for `units` crafts, None if a quantity overflows
fn scaled(ingredients: &[(u32, u32)], units: u32) -> Option<Vec<(u32, u32)>> {
    ingredients
        .iter()
        .map(|&(item_id, quantity)| Some((item_id, quantity.checked_mul(units)?)))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CraftingJob {
    pub recipe_id: u32,
    pub owner_id: u32,
    /// Seconds per unit
    pub total: f32,
    /// Seconds left on the unit being made
    pub remaining: f32,
    /// Units left, including the one being made
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CraftResult {
    pub success: bool,
    pub message: String,
    pub duration: f32,
}

impl CraftResult {
    fn failed(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            duration: 0.0,
        }
    }

    pub fn to_packet(&self, recipe_id: u32) -> Packet {
        Packet::CraftStarted {
            success: self.success,
            message: self.message.clone(),
            recipe_id,
            duration: self.duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedJob {
    pub player_id: u32,
    pub recipe_id: u32,
    pub item_id: u32,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub recipe_id: u32,
    /// Completion of the unit being made, 0..=1
    pub progress: f32,
    /// Seconds until the whole order is done
    pub remaining_secs: f32,
}

impl Progress {
    pub fn to_entry(&self) -> QueueEntry {
        QueueEntry {
            recipe_id: self.recipe_id,
            progress: self.progress,
            remaining_secs: self.remaining_secs,
        }
    }
}

pub struct CraftingQueue {
    queues: HashMap<u32, VecDeque<CraftingJob>>,
    /// Waiting jobs allowed behind the current one
    cap: usize,
    max_amount: u32,
    refund_policy: RefundPolicy,
}

impl CraftingQueue {
    pub fn new(cap: usize, max_amount: u32, refund_policy: RefundPolicy) -> Self {
        Self {
            queues: HashMap::new(),
            cap,
            max_amount,
            refund_policy,
        }
    }

    pub fn add_player(&mut self, player_id: u32) {
        self.queues.entry(player_id).or_default();
    }

    /// Drops a player's queue without refunding anything
    pub fn clear(&mut self, player_id: u32) {
        if let Some(queue) = self.queues.remove(&player_id) {
            if !queue.is_empty() {
                debug!("Discarded {} crafting jobs of player {}", queue.len(), player_id);
            }
        }
    }

    pub fn start(
        &mut self,
        player_id: u32,
        recipe_id: u32,
        amount: u32,
        inventory: &mut Inventory,
    ) -> CraftResult {
        let Some(recipe) = find_recipe(recipe_id) else {
            return CraftResult::failed("Unknown recipe");
        };
        if amount == 0 || amount > self.max_amount {
            return CraftResult::failed("Invalid amount");
        }
        let Some(cost) = scaled(recipe.ingredients, amount) else {
            return CraftResult::failed("Invalid amount");
        };
        let Some(queue) = self.queues.get_mut(&player_id) else {
            return CraftResult::failed("Unknown player");
        };
        if queue.len() > self.cap {
            return CraftResult::failed("Crafting queue is full");
        }
        if !inventory.consume_all(&cost) {
            return CraftResult::failed("Missing ingredients");
        }

        queue.push_back(CraftingJob {
            recipe_id,
            owner_id: player_id,
            total: recipe.duration,
            remaining: recipe.duration,
            amount,
        });
        debug!(
            "Player {} queued {} x{} (position {})",
            player_id,
            recipe.name,
            amount,
            queue.len() - 1
        );

        CraftResult {
            success: true,
            message: format!("Crafting {}", recipe.name),
            duration: recipe.duration * amount as f32,
        }
    }

    /// Cancels the job at `index` (0 is the current job) and refunds it
    pub fn cancel(&mut self, player_id: u32, index: usize, inventory: &mut Inventory) -> bool {
        let Some(queue) = self.queues.get_mut(&player_id) else {
            return false;
        };
        let Some(job) = queue.remove(index) else {
            return false;
        };
        let Some(recipe) = find_recipe(job.recipe_id) else {
            return true;
        };

        let in_progress = index == 0;
        for &(item_id, quantity) in recipe.ingredients {
            let Some(mut refund) = quantity.checked_mul(job.amount) else {
                warn!(
                    "Refund of item {} overflowed for player {}, skipping",
                    item_id, player_id
                );
                continue;
            };
            if in_progress && self.refund_policy == RefundPolicy::Proportional {
                let fraction = (job.remaining / job.total).clamp(0.0, 1.0);
                let kept = quantity - (quantity as f32 * fraction).floor() as u32;
                refund -= kept;
            }
            let lost = inventory.add(item_id, refund);
            if lost > 0 {
                warn!(
                    "Player {} lost {} of item {} refunding a cancelled craft",
                    player_id, lost, item_id
                );
            }
        }
        true
    }

    /// Advances every player's current job by `elapsed` seconds
    pub fn tick(&mut self, elapsed: f32) -> Vec<CompletedJob> {
        let mut completed = Vec::new();

        for (&player_id, queue) in self.queues.iter_mut() {
            let mut budget = elapsed;
            while let Some(job) = queue.front_mut() {
                if job.remaining > budget {
                    job.remaining -= budget;
                    break;
                }
                budget -= job.remaining;

                if let Some(recipe) = find_recipe(job.recipe_id) {
                    completed.push(CompletedJob {
                        player_id,
                        recipe_id: recipe.id,
                        item_id: recipe.result_item,
                        quantity: recipe.result_quantity,
                    });
                }

                if job.amount > 1 {
                    job.amount -= 1;
                    job.remaining = job.total;
                } else {
                    queue.pop_front();
                }
            }
        }

        completed
    }

    /// Current job first
    pub fn queue_of(&self, player_id: u32) -> Vec<Progress> {
        let Some(queue) = self.queues.get(&player_id) else {
            return Vec::new();
        };
        queue
            .iter()
            .map(|job| Progress {
                recipe_id: job.recipe_id,
                progress: if job.total > 0.0 {
                    1.0 - job.remaining / job.total
                } else {
                    1.0
                },
                remaining_secs: job.remaining + job.total * (job.amount - 1) as f32,
            })
            .collect()
    }

    pub fn queue_packet(&self, player_id: u32) -> Packet {
        Packet::CraftQueueUpdate {
            entries: self.queue_of(player_id).iter().map(Progress::to_entry).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::collections::HashSet;

    const ARROW: u32 = 5;
    const SPEAR: u32 = 3;

    fn queue() -> CraftingQueue {
        let mut q = CraftingQueue::new(5, 100, RefundPolicy::Proportional);
        q.add_player(1);
        q
    }

    fn stocked() -> Inventory {
        let mut inventory = Inventory::new();
        inventory.add(ids::WOOD, 1000);
        inventory.add(ids::STONE, 1000);
        inventory
    }

    #[test]
    fn test_recipe_ids_unique() {
        let mut seen = HashSet::new();
        assert!(RECIPES.iter().all(|r| seen.insert(r.id)));
        assert_eq!(recipe_data().len(), RECIPES.len());
    }

    #[test]
    fn test_start_deducts_once() {
        let mut q = queue();
        let mut inventory = stocked();

        let result = q.start(1, ARROW, 3, &mut inventory);
        assert!(result.success);
        assert_approx_eq!(result.duration, 15.0);
        assert_eq!(inventory.count(ids::WOOD), 1000 - 75);
        assert_eq!(inventory.count(ids::STONE), 1000 - 30);

        q.tick(5.0);
        q.tick(5.0);
        assert_eq!(inventory.count(ids::WOOD), 1000 - 75);
    }

    #[test]
    fn test_start_failures() {
        let mut q = queue();
        let mut inventory = Inventory::new();

        assert_eq!(q.start(1, 999, 1, &mut inventory).message, "Unknown recipe");
        assert_eq!(q.start(2, ARROW, 1, &mut inventory).message, "Unknown player");
        assert_eq!(q.start(1, ARROW, 1, &mut inventory).message, "Missing ingredients");
        assert!(q.queue_of(1).is_empty());
    }

    #[test]
    fn test_oversized_amount_rejected_before_deducting() {
        let mut q = queue();
        let mut inventory = stocked();

        for amount in [101, 1 << 30, u32::MAX] {
            let result = q.start(1, ARROW, amount, &mut inventory);
            assert!(!result.success);
            assert_eq!(result.message, "Invalid amount");
        }
        assert_eq!(q.start(1, ARROW, 0, &mut inventory).message, "Invalid amount");
        assert_eq!(inventory.count(ids::WOOD), 1000);
        assert_eq!(inventory.count(ids::STONE), 1000);
        assert!(q.queue_of(1).is_empty());

        // Empty inventory must not slip through on a wrapped cost either
        let mut empty = Inventory::new();
        assert!(!q.start(1, 1, 1 << 30, &mut empty).success);
        assert!(q.queue_of(1).is_empty());
    }

    #[test]
    fn test_scaled_detects_overflow() {
        assert_eq!(scaled(&[(1, 25), (2, 10)], 3), Some(vec![(1, 75), (2, 30)]));
        assert_eq!(scaled(&[(1, 25)], u32::MAX), None);
    }

    #[test]
    fn test_full_queue_has_no_side_effects() {
        let mut q = queue();
        let mut inventory = stocked();

        // One current job plus five waiting
        for _ in 0..6 {
            assert!(q.start(1, ARROW, 1, &mut inventory).success);
        }
        let wood = inventory.count(ids::WOOD);

        let result = q.start(1, ARROW, 1, &mut inventory);
        assert!(!result.success);
        assert_eq!(result.message, "Crafting queue is full");
        assert_eq!(inventory.count(ids::WOOD), wood);
        assert_eq!(q.queue_of(1).len(), 6);
    }

    #[test]
    fn test_multi_amount_resets_duration() {
        let mut q = queue();
        let mut inventory = stocked();
        q.start(1, ARROW, 2, &mut inventory);

        let done = q.tick(5.0);
        assert_eq!(
            done,
            vec![CompletedJob {
                player_id: 1,
                recipe_id: ARROW,
                item_id: ids::WOODEN_ARROW,
                quantity: 2
            }]
        );

        let progress = q.queue_of(1);
        assert_eq!(progress.len(), 1);
        assert_approx_eq!(progress[0].progress, 0.0);
        assert_approx_eq!(progress[0].remaining_secs, 5.0);

        assert_eq!(q.tick(5.0).len(), 1);
        assert!(q.queue_of(1).is_empty());
    }

    #[test]
    fn test_next_job_becomes_current() {
        let mut q = queue();
        let mut inventory = stocked();
        q.start(1, ARROW, 1, &mut inventory);
        q.start(1, SPEAR, 1, &mut inventory);

        let done = q.tick(6.0);
        assert_eq!(done.len(), 1);

        let progress = q.queue_of(1);
        assert_eq!(progress[0].recipe_id, SPEAR);
        // The leftover second already went into the spear
        assert_approx_eq!(progress[0].remaining_secs, 29.0);
    }

    #[test]
    fn test_many_completions_in_one_tick() {
        let mut q = CraftingQueue::new(5, 100, RefundPolicy::Full);
        let mut a = stocked();
        let mut b = stocked();
        q.add_player(1);
        q.add_player(2);
        q.start(1, ARROW, 1, &mut a);
        q.start(1, ARROW, 1, &mut a);
        q.start(2, ARROW, 1, &mut b);

        assert!(q.tick(0.0).is_empty());
        assert_eq!(q.tick(10.0).len(), 3);
        assert!(q.tick(10.0).is_empty());
    }

    #[test]
    fn test_cancel_waiting_job_refunds_fully() {
        let mut q = queue();
        let mut inventory = stocked();
        q.start(1, ARROW, 1, &mut inventory);
        q.start(1, ARROW, 2, &mut inventory);
        q.tick(2.0);

        assert!(q.cancel(1, 1, &mut inventory));
        assert_eq!(inventory.count(ids::WOOD), 1000 - 25);
        assert!(!q.cancel(1, 5, &mut inventory));
    }

    #[test]
    fn test_cancel_current_job_proportional() {
        let mut q = queue();
        let mut inventory = stocked();
        q.start(1, SPEAR, 2, &mut inventory);
        assert_eq!(inventory.count(ids::WOOD), 400);

        // 30 s per spear, 12 s in: 60% of the first unit remains
        q.tick(12.0);
        assert!(q.cancel(1, 0, &mut inventory));
        // Second spear refunds 300, the first one 180
        assert_eq!(inventory.count(ids::WOOD), 400 + 300 + 180);
        assert!(q.queue_of(1).is_empty());
    }

    #[test]
    fn test_cancel_current_job_full_policy() {
        let mut q = CraftingQueue::new(5, 100, RefundPolicy::Full);
        q.add_player(1);
        let mut inventory = stocked();
        q.start(1, SPEAR, 1, &mut inventory);
        q.tick(29.0);
        assert!(q.cancel(1, 0, &mut inventory));
        assert_eq!(inventory.count(ids::WOOD), 1000);
    }

    #[test]
    fn test_clear_discards_queue() {
        let mut q = queue();
        let mut inventory = stocked();
        q.start(1, ARROW, 1, &mut inventory);
        q.clear(1);
        assert!(q.queue_of(1).is_empty());
        assert!(q.tick(100.0).is_empty());
        assert_eq!(q.start(1, ARROW, 1, &mut inventory).message, "Unknown player");
    }
}
