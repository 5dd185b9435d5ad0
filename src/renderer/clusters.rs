//! Light clustering over a fixed 16x8x24 screen-aligned grid.
//!
//! Conventions used here:
//! - Right-handed view space (camera looks down -Z). All cluster math runs in
//!   "depth space", view space with Z negated so depth grows into the screen.
//! - Clip X/Y are in [-1, 1]; grid rows run top-down, so clip Y is flipped
//!   when converting to cell coordinates.
//! - The depth axis is split linearly between the near and far clip planes.
//!
//! Per light the assigner computes a clip-space bounding rectangle from the
//! tangent lines of the light's bounding sphere, converts it to a 3D cell
//! range, then refines each candidate cell with a separating-axis heuristic.
//! The heuristic may over-include lights; it must never drop a cell the light
//! actually touches.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use rayon::prelude::*;

use crate::renderer::lights::LightsData;

pub const GRID_WIDTH: usize = 16;
pub const GRID_HEIGHT: usize = 8;
pub const GRID_DEPTH: usize = 24;
pub const CELL_COUNT: usize = GRID_WIDTH * GRID_HEIGHT * GRID_DEPTH;

const DEGENERATE_EPS: f32 = 1e-6;

/// Flat index of a cell in traversal order.
#[inline]
pub fn cell_index(x: usize, y: usize, z: usize) -> usize {
    ((z * GRID_HEIGHT) + y) * GRID_WIDTH + x
}

/// GPU-facing record for one cell: a slice of the flat index buffer holding
/// the cell's point-light indices followed by its spot-light indices.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ClusterRecord {
    pub offset: u32,
    pub point_count: u32,
    pub spot_count: u32,
    pub _pad: u32,
}

/// Projection parameters the assigner needs for one frame.
#[derive(Clone, Copy, Debug)]
pub struct ClusterParams {
    pub proj: Mat4,
    pub near: f32,
    pub far: f32,
}

impl ClusterParams {
    pub fn new(proj: Mat4, near: f32, far: f32) -> Self {
        Self { proj, near, far }
    }

    /// Projection scale term for the X axis (`proj[0][0]`).
    fn x_scale(&self) -> f32 {
        self.proj.x_axis.x
    }

    /// Projection scale term for the Y axis (`proj[1][1]`).
    fn y_scale(&self) -> f32 {
        self.proj.y_axis.y
    }
}

/// Clip-space bounding rectangle; empty when min crosses max on either axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClipRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl ClipRect {
    const EMPTY: Self = Self {
        min: Vec2::ONE,
        max: Vec2::NEG_ONE,
    };

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }
}

/// Tightens one clip bound from a single tangent-line root `nc`.
///
/// The tangent line through the camera origin with (unnormalized) normal
/// `(nc, nz)` touches the sphere at depth `pz`; only tangents touching in
/// front of the camera constrain the rectangle. The tangent's projection is
/// `-nz * scale / nc`; a positive `nc` means the tangent point lies on the
/// negative side of the axis and raises the minimum, a negative `nc` lowers
/// the maximum.
fn update_clip_root(nc: f32, lc: f32, lz: f32, radius: f32, scale: f32, min: &mut f32, max: &mut f32) {
    if nc.abs() < DEGENERATE_EPS || lz.abs() < DEGENERATE_EPS {
        return;
    }
    let nz = (radius - nc * lc) / lz;
    let pz = lz - radius * nz;
    if pz <= 0.0 {
        return;
    }
    let bound = -nz * scale / nc;
    if nc > 0.0 {
        *min = min.max(bound);
    } else {
        *max = max.min(bound);
    }
}

/// Tightens the clip bounds of one axis for a sphere at (`lc`, depth `lz`)
/// with radius `radius`. A non-positive discriminant means the camera is
/// inside the sphere's silhouette on this axis and the full range stands.
fn update_clip_axis(lc: f32, lz: f32, radius: f32, scale: f32, min: &mut f32, max: &mut f32) {
    if scale.abs() < DEGENERATE_EPS {
        return;
    }
    let denom = lc * lc + lz * lz;
    if denom < DEGENERATE_EPS {
        return;
    }
    let disc = radius * radius * lc * lc - denom * (radius * radius - lz * lz);
    if disc <= 0.0 {
        return;
    }
    let root = disc.sqrt();
    update_clip_root((radius * lc + root) / denom, lc, lz, radius, scale, min, max);
    update_clip_root((radius * lc - root) / denom, lc, lz, radius, scale, min, max);
}

/// Clip-space bounding rectangle of a sphere at `center` (depth space).
/// A sphere entirely on the camera side of the near plane projects to the
/// empty rectangle and is assigned to no cell.
pub fn sphere_clip_rect(center: Vec3, radius: f32, params: &ClusterParams) -> ClipRect {
    if center.z + radius < params.near {
        return ClipRect::EMPTY;
    }

    let mut min = Vec2::splat(-1.0);
    let mut max = Vec2::splat(1.0);
    update_clip_axis(
        center.x,
        center.z,
        radius,
        params.x_scale(),
        &mut min.x,
        &mut max.x,
    );
    update_clip_axis(
        center.y,
        center.z,
        radius,
        params.y_scale(),
        &mut min.y,
        &mut max.y,
    );
    ClipRect { min, max }
}

/// Clip rectangle to cell coordinate ranges, rounding outward. Clip Y is
/// flipped: the rect's top edge lands in the lowest row index.
fn rect_to_cells(rect: &ClipRect) -> Option<(Range<usize>, Range<usize>)> {
    if rect.is_empty() {
        return None;
    }
    let w = GRID_WIDTH as f32;
    let h = GRID_HEIGHT as f32;
    let x0 = ((rect.min.x * 0.5 + 0.5) * w).floor().clamp(0.0, w) as usize;
    let x1 = ((rect.max.x * 0.5 + 0.5) * w).ceil().clamp(0.0, w) as usize;
    let y0 = ((0.5 - rect.max.y * 0.5) * h).floor().clamp(0.0, h) as usize;
    let y1 = ((0.5 - rect.min.y * 0.5) * h).ceil().clamp(0.0, h) as usize;
    if x0 >= x1 || y0 >= y1 {
        None
    } else {
        Some((x0..x1, y0..y1))
    }
}

/// Depth-slice range covered by `[depth - radius, depth + radius]`, linearly
/// interpolated between near and far over `GRID_DEPTH` slices.
pub fn depth_slice_range(depth: f32, radius: f32, near: f32, far: f32) -> Range<usize> {
    let span = far - near;
    if span <= DEGENERATE_EPS {
        return 0..0;
    }
    let scale = GRID_DEPTH as f32 / span;
    let d = GRID_DEPTH as f32;
    let lo = ((depth - radius - near) * scale).floor().clamp(0.0, d) as usize;
    let hi = ((depth + radius - near) * scale).ceil().clamp(0.0, d) as usize;
    lo..hi
}

/// Separating-axis heuristic between a cell's sub-frustum and a sphere.
///
/// The cell's eight corners are reconstructed in depth space at its near/far
/// slice planes; the candidate separating axis is the direction from the cell
/// center toward the light. The light is kept unless its entire projected
/// extent lies beyond the cell's. Returns true (keep) on any degenerate input.
fn cell_overlaps_sphere(
    x: usize,
    y: usize,
    z: usize,
    params: &ClusterParams,
    center: Vec3,
    radius: f32,
) -> bool {
    let x_scale = params.x_scale();
    let y_scale = params.y_scale();
    if x_scale.abs() < DEGENERATE_EPS || y_scale.abs() < DEGENERATE_EPS {
        return true;
    }

    let slice_span = (params.far - params.near) / GRID_DEPTH as f32;
    let z_near = params.near + slice_span * z as f32;
    let z_far = z_near + slice_span;

    let cx0 = x as f32 / GRID_WIDTH as f32 * 2.0 - 1.0;
    let cx1 = (x + 1) as f32 / GRID_WIDTH as f32 * 2.0 - 1.0;
    // row y covers clip Y [1 - 2(y+1)/H, 1 - 2y/H]
    let cy0 = 1.0 - 2.0 * (y + 1) as f32 / GRID_HEIGHT as f32;
    let cy1 = 1.0 - 2.0 * y as f32 / GRID_HEIGHT as f32;

    let mut corners = [Vec3::ZERO; 8];
    let mut corner = 0;
    for &depth in &[z_near, z_far] {
        for &cx in &[cx0, cx1] {
            for &cy in &[cy0, cy1] {
                corners[corner] = Vec3::new(cx * depth / x_scale, cy * depth / y_scale, depth);
                corner += 1;
            }
        }
    }

    let cell_center = corners.iter().sum::<Vec3>() / 8.0;
    let to_light = center - cell_center;
    if to_light.length_squared() < DEGENERATE_EPS {
        return true;
    }
    let normal = to_light.normalize();

    let light_min = normal.dot(center) - radius;
    let cell_max = corners
        .iter()
        .map(|c| normal.dot(*c))
        .fold(f32::NEG_INFINITY, f32::max);
    light_min <= cell_max
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LightKind {
    Point,
    Spot,
}

/// One light's precomputed cell range, in depth space.
struct LightBounds {
    index: u32,
    kind: LightKind,
    center: Vec3,
    range: f32,
    xs: Range<usize>,
    ys: Range<usize>,
    zs: Range<usize>,
}

fn light_bounds(
    index: u32,
    kind: LightKind,
    view_position: Vec3,
    range: f32,
    params: &ClusterParams,
) -> Option<LightBounds> {
    // zero-extent lights contribute nothing (treated as no contribution, not
    // an error)
    if range <= 0.0 {
        return None;
    }
    let center = Vec3::new(view_position.x, view_position.y, -view_position.z);
    let rect = sphere_clip_rect(center, range, params);
    let (xs, ys) = rect_to_cells(&rect)?;
    let zs = depth_slice_range(center.z, range, params.near, params.far);
    if zs.is_empty() {
        return None;
    }
    Some(LightBounds {
        index,
        kind,
        center,
        range,
        xs,
        ys,
        zs,
    })
}

#[derive(Clone, Default)]
struct CellLists {
    point: Vec<u32>,
    spot: Vec<u32>,
}

/// The per-frame cluster grid: per-cell index lists, their serialized
/// records, and the flat index buffer. Cell list capacity and the index
/// buffer allocation are retained across frames; contents are frame-scoped.
pub struct ClusterGrid {
    cells: Vec<CellLists>,
    records: Vec<ClusterRecord>,
    indices: Vec<u32>,
    total_indices: u32,
}

impl ClusterGrid {
    pub fn new() -> Self {
        Self {
            cells: vec![CellLists::default(); CELL_COUNT],
            records: vec![ClusterRecord::zeroed(); CELL_COUNT],
            indices: Vec::new(),
            total_indices: 0,
        }
    }

    /// Records in traversal order, one per cell.
    pub fn records(&self) -> &[ClusterRecord] {
        &self.records
    }

    /// The flat light-index buffer the records point into.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn total_index_count(&self) -> u32 {
        self.total_indices
    }

    pub fn record_at(&self, x: usize, y: usize, z: usize) -> ClusterRecord {
        self.records[cell_index(x, y, z)]
    }

    /// Point-light indices assigned to one cell this frame.
    pub fn point_indices_at(&self, x: usize, y: usize, z: usize) -> &[u32] {
        let record = &self.records[cell_index(x, y, z)];
        let start = record.offset as usize;
        &self.indices[start..start + record.point_count as usize]
    }

    /// Spot-light indices assigned to one cell this frame.
    pub fn spot_indices_at(&self, x: usize, y: usize, z: usize) -> &[u32] {
        let record = &self.records[cell_index(x, y, z)];
        let start = record.offset as usize + record.point_count as usize;
        &self.indices[start..start + record.spot_count as usize]
    }

    /// Assigns every point and spot light to the cells it may influence and
    /// serializes the result. Light collection must be complete before this
    /// runs; records and indices are valid until the next call.
    pub fn assign(&mut self, lights: &LightsData, params: &ClusterParams, pool: &rayon::ThreadPool) {
        pool.install(|| {
            self.cells.par_iter_mut().for_each(|cell| {
                cell.point.clear();
                cell.spot.clear();
            });
        });

        let mut bounded = Vec::new();
        for (i, light) in lights.point_lights().iter().enumerate() {
            if let Some(bounds) =
                light_bounds(i as u32, LightKind::Point, light.position, light.range, params)
            {
                bounded.push(bounds);
            }
        }
        for (i, light) in lights.spot_lights().iter().enumerate() {
            if let Some(bounds) =
                light_bounds(i as u32, LightKind::Spot, light.position, light.range, params)
            {
                bounded.push(bounds);
            }
        }

        // Workers own whole z-slices, so cell writes are disjoint; only the
        // frame total needs an atomic.
        let appended = AtomicU32::new(0);
        let cells_per_slice = GRID_WIDTH * GRID_HEIGHT;
        pool.install(|| {
            self.cells
                .par_chunks_mut(cells_per_slice)
                .enumerate()
                .for_each(|(z, slice)| {
                    for light in &bounded {
                        if z < light.zs.start || z >= light.zs.end {
                            continue;
                        }
                        for y in light.ys.clone() {
                            for x in light.xs.clone() {
                                if !cell_overlaps_sphere(x, y, z, params, light.center, light.range)
                                {
                                    continue;
                                }
                                let cell = &mut slice[y * GRID_WIDTH + x];
                                match light.kind {
                                    LightKind::Point => cell.point.push(light.index),
                                    LightKind::Spot => cell.spot.push(light.index),
                                }
                                appended.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    }
                });
        });

        self.serialize(appended.load(Ordering::Relaxed));
    }

    /// Concatenates per-cell lists (point then spot) into the flat index
    /// buffer and writes one record per cell in traversal order. Offsets
    /// partition the buffer without gaps or overlaps.
    fn serialize(&mut self, appended: u32) {
        self.indices.clear();
        let mut offset = 0u32;
        for (cell, record) in self.cells.iter().zip(self.records.iter_mut()) {
            record.offset = offset;
            record.point_count = cell.point.len() as u32;
            record.spot_count = cell.spot.len() as u32;
            record._pad = 0;
            self.indices.extend_from_slice(&cell.point);
            self.indices.extend_from_slice(&cell.spot);
            offset += record.point_count + record.spot_count;
        }
        debug_assert_eq!(offset, appended);
        self.total_indices = offset;
    }
}

impl Default for ClusterGrid {
    fn default() -> Self {
        Self::new()
    }
}
