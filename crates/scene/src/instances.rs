//! Per-model instance transforms.
//!
//! Instances are grouped by model so that the flattened transform array can
//! be drawn with one instanced call per model. Each model keeps its matrices
//! in its own vector plus an active count; resetting only zeroes the counts.

use glam::{Mat4, Vec3};
use tracing::error;

/// Upper bound on instances across all models.
pub const MAX_RENDER_INSTANCES: usize = 50_000;

/// A model placed in the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderInstance {
    pub model_index: usize,
    pub transform: Mat4,
}

/// Transforms for every model, capped at [`MAX_RENDER_INSTANCES`] in total.
#[derive(Clone, Debug, Default)]
pub struct InstanceStore {
    transforms: Vec<Vec<Mat4>>,
    counts: Vec<usize>,
    total: usize,
}

impl InstanceStore {
    /// Creates an empty store for `model_count` models.
    pub fn new(model_count: usize) -> Self {
        Self {
            transforms: vec![Vec::new(); model_count],
            counts: vec![0; model_count],
            total: 0,
        }
    }

    /// Places `model_index` at `pos`.
    ///
    /// An unknown model is logged and ignored. Once the cap is reached
    /// further instances are dropped silently.
    pub fn add_render_instance(&mut self, pos: Vec3, model_index: usize) {
        if model_index >= self.counts.len() {
            error!(
                "Model index {} out of range ({} models loaded)",
                model_index,
                self.counts.len()
            );
            return;
        }
        if self.total >= MAX_RENDER_INSTANCES {
            return;
        }

        let count = self.counts[model_index];
        let transform = Mat4::from_translation(pos);
        let slots = &mut self.transforms[model_index];
        if count < slots.len() {
            slots[count] = transform;
        } else {
            slots.push(transform);
        }

        self.counts[model_index] += 1;
        self.total += 1;
    }

    /// Removes every instance, keeping allocated storage.
    pub fn reset_render_instances(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.total = 0;
    }

    /// Active transforms, model by model in append order.
    pub fn flatten(&self) -> Vec<Mat4> {
        let mut out = Vec::with_capacity(self.total);
        for (slots, &count) in self.transforms.iter().zip(&self.counts) {
            out.extend_from_slice(&slots[..count]);
        }
        out
    }

    /// `(first_instance, count)` per model, matching [`Self::flatten`].
    pub fn draw_ranges(&self) -> Vec<(u32, u32)> {
        let mut first = 0u32;
        self.counts
            .iter()
            .map(|&count| {
                let range = (first, count as u32);
                first += count as u32;
                range
            })
            .collect()
    }

    /// Iterates over every active instance.
    pub fn instances(&self) -> impl Iterator<Item = RenderInstance> + '_ {
        self.transforms
            .iter()
            .zip(&self.counts)
            .enumerate()
            .flat_map(|(model_index, (slots, &count))| {
                slots[..count].iter().map(move |&transform| RenderInstance {
                    model_index,
                    transform,
                })
            })
    }

    #[inline]
    pub fn model_count(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn count(&self, model_index: usize) -> usize {
        self.counts.get(model_index).copied().unwrap_or(0)
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_groups_by_model() {
        let mut store = InstanceStore::new(3);
        store.add_render_instance(Vec3::new(2.0, 0.0, 0.0), 2);
        store.add_render_instance(Vec3::new(0.0, 0.0, 0.0), 0);
        store.add_render_instance(Vec3::new(1.0, 0.0, 0.0), 0);
        store.add_render_instance(Vec3::new(3.0, 0.0, 0.0), 2);
        store.add_render_instance(Vec3::new(4.0, 0.0, 0.0), 0);

        let flat = store.flatten();
        assert_eq!(flat.len(), 5);
        let xs: Vec<f32> = flat.iter().map(|m| m.w_axis.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 4.0, 2.0, 3.0]);

        // model 1 has no instances and gets an empty range
        assert_eq!(store.draw_ranges(), vec![(0, 3), (3, 0), (3, 2)]);
        assert_eq!(store.total(), 5);
    }

    #[test]
    fn test_draw_ranges_sum_to_flatten_len() {
        let mut store = InstanceStore::new(4);
        for i in 0..37 {
            store.add_render_instance(Vec3::splat(i as f32), i % 4);
        }
        let total: u32 = store.draw_ranges().iter().map(|&(_, c)| c).sum();
        assert_eq!(total as usize, store.flatten().len());
        assert_eq!(store.instances().count(), 37);
    }

    #[test]
    fn test_out_of_range_model_is_ignored() {
        let mut store = InstanceStore::new(2);
        store.add_render_instance(Vec3::ZERO, 2);
        assert_eq!(store.total(), 0);
        assert!(store.flatten().is_empty());
    }

    #[test]
    fn test_cap_is_never_exceeded() {
        let mut store = InstanceStore::new(1);
        for _ in 0..MAX_RENDER_INSTANCES + 10 {
            store.add_render_instance(Vec3::ZERO, 0);
        }
        assert_eq!(store.total(), MAX_RENDER_INSTANCES);
        assert_eq!(store.flatten().len(), MAX_RENDER_INSTANCES);
    }

    #[test]
    fn test_reset_reuses_storage() {
        let mut store = InstanceStore::new(2);
        store.add_render_instance(Vec3::X, 0);
        store.add_render_instance(Vec3::Y, 1);
        store.reset_render_instances();
        assert_eq!(store.total(), 0);
        assert_eq!(store.count(0), 0);
        assert!(store.flatten().is_empty());

        store.add_render_instance(Vec3::Z, 0);
        assert_eq!(store.flatten(), vec![Mat4::from_translation(Vec3::Z)]);
        assert_eq!(store.draw_ranges(), vec![(0, 1), (1, 0)]);
    }
}
