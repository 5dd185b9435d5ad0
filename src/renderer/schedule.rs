//! Sorts the frame's draw queue and groups it into shader runs.
//!
//! The sort is stable, so entries sharing a shader stay contiguous no matter
//! the submission order. Runs are then bucketed by their shader's declared
//! priority; execution walks buckets in ascending priority, not submission
//! order.

use std::collections::BTreeMap;
use std::ops::Range;

use rayon::prelude::*;

use crate::renderer::handle::{Handle, Registry};
use crate::renderer::passes::Shader;
use crate::renderer::queue::DrawEntry;

/// A maximal run of sorted entries sharing one shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawSet {
    pub shader: Handle<Shader>,
    pub range: Range<usize>,
}

/// One frame's execution plan over the sorted entry slice.
#[derive(Debug, Default)]
pub struct Schedule {
    /// Shader runs keyed by shader priority, ascending.
    pub buckets: BTreeMap<i32, Vec<DrawSet>>,
    /// OR of `needs_lighting` across every pass of every scheduled shader.
    /// When false, all light collection and cluster work is skipped.
    pub lighting_required: bool,
}

impl Schedule {
    pub fn set_count(&self) -> usize {
        self.buckets.values().map(|sets| sets.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Sorts `entries` in place and builds the frame's schedule. Runs whose
/// shader handle does not resolve are dropped (logged, not fatal) and do not
/// contribute to the lighting requirement.
pub fn build_schedule(
    entries: &mut [DrawEntry],
    shaders: &Registry<Shader>,
    pool: &rayon::ThreadPool,
) -> Schedule {
    pool.install(|| entries.par_sort_by_key(|entry| entry.key.sort_key()));

    let mut schedule = Schedule::default();
    let mut start = 0;
    while start < entries.len() {
        let shader = entries[start].key.shader;
        let mut end = start + 1;
        while end < entries.len() && entries[end].key.shader == shader {
            end += 1;
        }

        match shaders.get(shader) {
            Some(def) => {
                schedule.lighting_required |= def.needs_lighting();
                schedule
                    .buckets
                    .entry(def.priority)
                    .or_default()
                    .push(DrawSet {
                        shader,
                        range: start..end,
                    });
            }
            None => log::warn!(
                "dropping draw set of {} entries: shader {:?} is not registered",
                end - start,
                shader
            ),
        }

        start = end;
    }

    schedule
}
