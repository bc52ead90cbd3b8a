//! Chunk-scale terrain restoration.
//!
//! Reverts an abandoned area toward a natural state in three strictly
//! ordered steps: **capture** an immutable padded snapshot of one chunk
//! (synchronous with world reads), **classify** every column against a
//! fixed allow-list of natural block kinds (pure, parallel over columns,
//! safe to run off-thread), and **apply** the resulting diff through a
//! caller-supplied world mutator, re-checking claim containment per cell
//! immediately before each write.
//!
//! The engine never mutates world state itself and never touches the
//! registry during classification; columns still covered by an active
//! claim are decided up front and skipped entirely.

use ahash::AHashSet;
use crossbeam_channel::{unbounded, Receiver, Sender};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::thread;
use tracing::{debug, warn};

use claim_schema::BlockChange;

use crate::claim::WorldId;
use crate::geometry::BlockPos;
use crate::registry::ClaimRegistry;

/// Horizontal span of one restoration chunk, in blocks.
pub const CHUNK_SPAN: i32 = 16;
/// Border captured from neighboring chunks on each side.
pub const BORDER: i32 = 1;
const PADDED_SPAN: i32 = CHUNK_SPAN + 2 * BORDER;

/// Block kinds the engine distinguishes. Hosts map their palette onto
/// these; anything unmapped comes through as `Unknown` and classifies as
/// artificial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    Air,
    Stone,
    Dirt,
    Grass,
    Sand,
    Sandstone,
    Gravel,
    Clay,
    Bedrock,
    CoalOre,
    IronOre,
    GoldOre,
    RedstoneOre,
    DiamondOre,
    Water,
    Lava,
    Snow,
    Ice,
    Log,
    Leaves,
    TallGrass,
    Flower,
    Mushroom,
    Cactus,
    SugarCane,
    Vine,
    Cobblestone,
    Planks,
    Glass,
    Brick,
    Chest,
    Torch,
    Rail,
    Wool,
    Door,
    Fence,
    Glowstone,
    Unknown,
}

impl BlockKind {
    /// Stable wire code for diff entries.
    pub fn as_u16(self) -> u16 {
        match self {
            BlockKind::Air => 0,
            BlockKind::Stone => 1,
            BlockKind::Dirt => 2,
            BlockKind::Grass => 3,
            BlockKind::Sand => 4,
            BlockKind::Sandstone => 5,
            BlockKind::Gravel => 6,
            BlockKind::Clay => 7,
            BlockKind::Bedrock => 8,
            BlockKind::CoalOre => 9,
            BlockKind::IronOre => 10,
            BlockKind::GoldOre => 11,
            BlockKind::RedstoneOre => 12,
            BlockKind::DiamondOre => 13,
            BlockKind::Water => 14,
            BlockKind::Lava => 15,
            BlockKind::Snow => 16,
            BlockKind::Ice => 17,
            BlockKind::Log => 18,
            BlockKind::Leaves => 19,
            BlockKind::TallGrass => 20,
            BlockKind::Flower => 21,
            BlockKind::Mushroom => 22,
            BlockKind::Cactus => 23,
            BlockKind::SugarCane => 24,
            BlockKind::Vine => 25,
            BlockKind::Cobblestone => 26,
            BlockKind::Planks => 27,
            BlockKind::Glass => 28,
            BlockKind::Brick => 29,
            BlockKind::Chest => 30,
            BlockKind::Torch => 31,
            BlockKind::Rail => 32,
            BlockKind::Wool => 33,
            BlockKind::Door => 34,
            BlockKind::Fence => 35,
            BlockKind::Glowstone => 36,
            BlockKind::Unknown => u16::MAX,
        }
    }

    /// Inverse of [`as_u16`](Self::as_u16); unmapped codes fold to `Unknown`.
    pub fn from_u16(code: u16) -> Self {
        match code {
            0 => BlockKind::Air,
            1 => BlockKind::Stone,
            2 => BlockKind::Dirt,
            3 => BlockKind::Grass,
            4 => BlockKind::Sand,
            5 => BlockKind::Sandstone,
            6 => BlockKind::Gravel,
            7 => BlockKind::Clay,
            8 => BlockKind::Bedrock,
            9 => BlockKind::CoalOre,
            10 => BlockKind::IronOre,
            11 => BlockKind::GoldOre,
            12 => BlockKind::RedstoneOre,
            13 => BlockKind::DiamondOre,
            14 => BlockKind::Water,
            15 => BlockKind::Lava,
            16 => BlockKind::Snow,
            17 => BlockKind::Ice,
            18 => BlockKind::Log,
            19 => BlockKind::Leaves,
            20 => BlockKind::TallGrass,
            21 => BlockKind::Flower,
            22 => BlockKind::Mushroom,
            23 => BlockKind::Cactus,
            24 => BlockKind::SugarCane,
            25 => BlockKind::Vine,
            26 => BlockKind::Cobblestone,
            27 => BlockKind::Planks,
            28 => BlockKind::Glass,
            29 => BlockKind::Brick,
            30 => BlockKind::Chest,
            31 => BlockKind::Torch,
            32 => BlockKind::Rail,
            33 => BlockKind::Wool,
            34 => BlockKind::Door,
            35 => BlockKind::Fence,
            36 => BlockKind::Glowstone,
            _ => BlockKind::Unknown,
        }
    }

    /// Solid ground that defines the natural surface of a column.
    pub fn is_terrain(self) -> bool {
        matches!(
            self,
            BlockKind::Stone
                | BlockKind::Dirt
                | BlockKind::Grass
                | BlockKind::Sand
                | BlockKind::Sandstone
                | BlockKind::Gravel
                | BlockKind::Clay
                | BlockKind::Bedrock
                | BlockKind::CoalOre
                | BlockKind::IronOre
                | BlockKind::GoldOre
                | BlockKind::RedstoneOre
                | BlockKind::DiamondOre
        )
    }

    /// Natural non-terrain cover that survives even aggressive restoration:
    /// fluids, snow and ice.
    pub fn is_natural_cover(self) -> bool {
        matches!(
            self,
            BlockKind::Water | BlockKind::Lava | BlockKind::Snow | BlockKind::Ice
        )
    }

    /// Vegetation that looks natural but may be player-planted; kept in
    /// conservative mode, stripped in aggressive mode.
    pub fn is_vegetation(self) -> bool {
        matches!(
            self,
            BlockKind::Log
                | BlockKind::Leaves
                | BlockKind::TallGrass
                | BlockKind::Flower
                | BlockKind::Mushroom
                | BlockKind::Cactus
                | BlockKind::SugarCane
                | BlockKind::Vine
        )
    }

    /// Unambiguously player-placed.
    pub fn is_artificial(self) -> bool {
        !self.is_terrain()
            && !self.is_natural_cover()
            && !self.is_vegetation()
            && self != BlockKind::Air
    }
}

/// One chunk-aligned restoration target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRegion {
    pub world: WorldId,
    pub chunk_x: i32,
    pub chunk_z: i32,
    /// Bottom of the captured column range (inclusive).
    pub base_y: i32,
    /// Top of the captured column range (exclusive), usually world height.
    pub top_y: i32,
}

impl RestoreRegion {
    /// World x of the chunk's western interior edge.
    pub fn origin_x(&self) -> i32 {
        self.chunk_x * CHUNK_SPAN
    }

    pub fn origin_z(&self) -> i32 {
        self.chunk_z * CHUNK_SPAN
    }

    pub fn height(&self) -> i32 {
        self.top_y - self.base_y
    }

    /// Interior columns as world (x, z) pairs.
    pub fn columns(&self) -> impl Iterator<Item = (i32, i32)> {
        let ox = self.origin_x();
        let oz = self.origin_z();
        (0..CHUNK_SPAN).flat_map(move |dx| (0..CHUNK_SPAN).map(move |dz| (ox + dx, oz + dz)))
    }
}

/// Immutable padded snapshot of one chunk plus a one-block border. Built
/// synchronously with world reads so no cell reflects a later mutation.
#[derive(Debug, Clone)]
pub struct ChunkSnapshot {
    region: RestoreRegion,
    blocks: Vec<BlockKind>,
}

impl ChunkSnapshot {
    /// Read every cell of the padded grid through `reader`. The caller
    /// must invoke this on the world-read context; classification may then
    /// proceed anywhere.
    pub fn capture(region: RestoreRegion, reader: &mut dyn FnMut(BlockPos) -> BlockKind) -> Self {
        let height = region.height().max(0) as usize;
        let mut blocks = Vec::with_capacity(PADDED_SPAN as usize * PADDED_SPAN as usize * height);
        for lx in 0..PADDED_SPAN {
            for lz in 0..PADDED_SPAN {
                let wx = region.origin_x() - BORDER + lx;
                let wz = region.origin_z() - BORDER + lz;
                for y in region.base_y..region.top_y {
                    blocks.push(reader(BlockPos::new(wx, y, wz)));
                }
            }
        }
        Self { region, blocks }
    }

    pub fn region(&self) -> RestoreRegion {
        self.region
    }

    /// Block at padded-local column (lx, lz), world y. Local 0 is the
    /// border; interior columns are 1..=16.
    fn get(&self, lx: i32, lz: i32, y: i32) -> BlockKind {
        let height = self.region.height();
        let idx = ((lx * PADDED_SPAN + lz) * height + (y - self.region.base_y)) as usize;
        self.blocks[idx]
    }

    /// Highest terrain block in a padded-local column at or above
    /// `min_height`, if any.
    fn terrain_height(&self, lx: i32, lz: i32, min_height: i32) -> Option<i32> {
        let floor = min_height.max(self.region.base_y);
        (floor..self.region.top_y)
            .rev()
            .find(|y| self.get(lx, lz, *y).is_terrain())
    }
}

/// Classification tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Aggressive mode strips everything above the natural surface that is
    /// not terrain, fluid, snow or ice (plausibly-natural vegetation
    /// included) and patches the exposed surface. Conservative mode
    /// removes only unambiguously artificial kinds.
    pub aggressive: bool,
    /// Classification floor, typically sea level minus a fixed margin;
    /// nothing below it is touched.
    pub min_height: i32,
}

/// Pure diff produced by classification: the cells whose restored kind
/// differs from the captured one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionDiff {
    pub world: u32,
    pub entries: Vec<BlockChange>,
}

impl RegionDiff {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Classify a captured snapshot into a restoration diff.
///
/// `skip` holds world (x, z) columns that must stay untouched (columns
/// still covered by an active claim). Border columns inform terrain-height
/// fallback but never produce entries.
pub fn classify(
    snapshot: &ChunkSnapshot,
    options: &RestoreOptions,
    skip: &AHashSet<(i32, i32)>,
) -> RegionDiff {
    let region = snapshot.region();

    // Pass 1: terrain height for every padded column, border included, so
    // a column buried under player construction can borrow its neighbors'
    // surface level.
    let mut heights = vec![None; (PADDED_SPAN * PADDED_SPAN) as usize];
    for lx in 0..PADDED_SPAN {
        for lz in 0..PADDED_SPAN {
            heights[(lx * PADDED_SPAN + lz) as usize] =
                snapshot.terrain_height(lx, lz, options.min_height);
        }
    }

    // Pass 2: per interior column, in parallel. Columns are independent;
    // entry order is kept stable by collecting in column order.
    let columns: Vec<(i32, i32)> = (BORDER..BORDER + CHUNK_SPAN)
        .flat_map(|lx| (BORDER..BORDER + CHUNK_SPAN).map(move |lz| (lx, lz)))
        .collect();
    let per_column: Vec<Vec<BlockChange>> = columns
        .par_iter()
        .map(|&(lx, lz)| {
            let wx = region.origin_x() - BORDER + lx;
            let wz = region.origin_z() - BORDER + lz;
            if skip.contains(&(wx, wz)) {
                return Vec::new();
            }
            classify_column(snapshot, options, &heights, lx, lz, wx, wz)
        })
        .collect();

    let mut diff = RegionDiff {
        world: region.world.0,
        entries: Vec::new(),
    };
    for mut column in per_column {
        diff.entries.append(&mut column);
    }
    debug!(
        world = region.world.0,
        chunk_x = region.chunk_x,
        chunk_z = region.chunk_z,
        entries = diff.entries.len(),
        aggressive = options.aggressive,
        "chunk classified"
    );
    diff
}

fn classify_column(
    snapshot: &ChunkSnapshot,
    options: &RestoreOptions,
    heights: &[Option<i32>],
    lx: i32,
    lz: i32,
    wx: i32,
    wz: i32,
) -> Vec<BlockChange> {
    let region = snapshot.region();
    let floor = options.min_height.max(region.base_y);
    let own_height = heights[(lx * PADDED_SPAN + lz) as usize];
    // A column with no natural terrain borrows its neighbors' surface level
    // in aggressive mode (it will be rebuilt there); conservative mode
    // treats it as all-sky and only strips artificial blocks.
    let surface = match own_height {
        Some(height) => height,
        None if options.aggressive => neighbor_surface(heights, lx, lz, options.min_height),
        None => floor - 1,
    };

    let mut out = Vec::new();
    let mut covered = false;
    for y in (floor..region.top_y).rev() {
        let block = snapshot.get(lx, lz, y);
        let restored = if y > surface {
            // Above the surface.
            let keep = if options.aggressive {
                block.is_natural_cover()
            } else {
                block.is_natural_cover() || block.is_vegetation()
            };
            if keep && block != BlockKind::Air {
                covered = true;
            }
            if keep {
                block
            } else {
                BlockKind::Air
            }
        } else if y == surface && own_height.is_none() {
            // Aggressive rebuild of a column that had no natural terrain:
            // top out at the neighbors' level with their surface kind.
            surface_patch(snapshot, heights, lx, lz)
        } else if y == surface && options.aggressive && !covered && block == BlockKind::Dirt {
            // Clearing structures leaves bare dirt on top; regrow it unless
            // natural cover (water, a kept tree) still sits above.
            BlockKind::Grass
        } else {
            // In the ground: artificial blocks become stone, sealing shafts
            // and buried rooms. Conservative mode spares roots and other
            // buried vegetation.
            let keep = block.is_terrain()
                || block.is_natural_cover()
                || (!options.aggressive && block.is_vegetation());
            if keep {
                block
            } else {
                BlockKind::Stone
            }
        };
        if restored != block {
            out.push(BlockChange {
                x: wx,
                y,
                z: wz,
                block: restored.as_u16(),
            });
        }
    }
    out
}

/// Average surface level of the neighboring columns that do have natural
/// terrain; falls back to the classification floor when none do.
fn neighbor_surface(heights: &[Option<i32>], lx: i32, lz: i32, min_height: i32) -> i32 {
    let mut sum = 0i64;
    let mut count = 0i64;
    for (dx, dz) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
        let nx = lx + dx;
        let nz = lz + dz;
        if nx < 0 || nz < 0 || nx >= PADDED_SPAN || nz >= PADDED_SPAN {
            continue;
        }
        if let Some(height) = heights[(nx * PADDED_SPAN + nz) as usize] {
            sum += height as i64;
            count += 1;
        }
    }
    if count > 0 {
        (sum / count) as i32
    } else {
        min_height
    }
}

/// Surface kind borrowed from the nearest neighbor with real terrain.
fn surface_patch(snapshot: &ChunkSnapshot, heights: &[Option<i32>], lx: i32, lz: i32) -> BlockKind {
    for (dx, dz) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
        let nx = lx + dx;
        let nz = lz + dz;
        if nx < 0 || nz < 0 || nx >= PADDED_SPAN || nz >= PADDED_SPAN {
            continue;
        }
        if let Some(height) = heights[(nx * PADDED_SPAN + nz) as usize] {
            let kind = snapshot.get(nx, nz, height);
            return match kind {
                BlockKind::Sand | BlockKind::Sandstone => BlockKind::Sand,
                _ => BlockKind::Grass,
            };
        }
    }
    BlockKind::Grass
}

/// Apply a diff through `writer`, skipping any cell for which
/// `still_unclaimed` now answers false (the area was reclaimed between
/// classification and apply). Must run on the world-mutation context.
pub fn apply_diff_filtered(
    diff: &RegionDiff,
    still_unclaimed: &mut dyn FnMut(BlockPos) -> bool,
    writer: &mut dyn FnMut(BlockPos, BlockKind),
) -> usize {
    let mut applied = 0usize;
    for entry in &diff.entries {
        let pos = BlockPos::new(entry.x, entry.y, entry.z);
        if !still_unclaimed(pos) {
            continue;
        }
        writer(pos, BlockKind::from_u16(entry.block));
        applied += 1;
    }
    applied
}

/// [`apply_diff_filtered`] with the re-check wired to the registry.
pub fn apply_diff(
    diff: &RegionDiff,
    registry: &ClaimRegistry,
    writer: &mut dyn FnMut(BlockPos, BlockKind),
) -> usize {
    let world = WorldId(diff.world);
    apply_diff_filtered(
        diff,
        &mut |pos| registry.find_claim(world, pos).is_none(),
        writer,
    )
}

/// Capture + consult-registry + classify in one call. The skip set is
/// fixed before classification starts: a column inside any active claim is
/// never restored, whatever its contents.
pub fn restore_region(
    registry: &ClaimRegistry,
    region: RestoreRegion,
    reader: &mut dyn FnMut(BlockPos) -> BlockKind,
    options: &RestoreOptions,
) -> RegionDiff {
    let snapshot = ChunkSnapshot::capture(region, reader);
    let skip = claimed_columns(registry, &region);
    classify(&snapshot, options, &skip)
}

/// Interior columns of `region` covered by any active claim's footprint.
pub fn claimed_columns(registry: &ClaimRegistry, region: &RestoreRegion) -> AHashSet<(i32, i32)> {
    region
        .columns()
        .filter(|&(x, z)| registry.column_claimed(region.world, x, z))
        .collect()
}

/// One in-flight job for the classification worker.
pub struct RestoreJob {
    pub snapshot: ChunkSnapshot,
    pub options: RestoreOptions,
    pub skip: AHashSet<(i32, i32)>,
}

/// Off-thread classification stage.
///
/// Capture happens on the world context, jobs cross to a dedicated worker
/// here, and finished diffs come back over a channel for the world context
/// to apply. This handoff is the only execution-context boundary in the
/// engine.
pub struct RestorePipeline {
    jobs: Sender<RestoreJob>,
    diffs: Receiver<RegionDiff>,
}

impl RestorePipeline {
    pub fn start() -> Self {
        let (job_tx, job_rx) = unbounded::<RestoreJob>();
        let (diff_tx, diff_rx) = unbounded::<RegionDiff>();
        thread::spawn(move || run_classifier(job_rx, diff_tx));
        Self {
            jobs: job_tx,
            diffs: diff_rx,
        }
    }

    pub fn submit(&self, job: RestoreJob) {
        if self.jobs.send(job).is_err() {
            warn!("restore classifier worker is gone; job dropped");
        }
    }

    /// Receiver of classified diffs, in submission order.
    pub fn diffs(&self) -> &Receiver<RegionDiff> {
        &self.diffs
    }
}

fn run_classifier(jobs: Receiver<RestoreJob>, diffs: Sender<RegionDiff>) {
    while let Ok(job) = jobs.recv() {
        let diff = classify(&job.snapshot, &job.options, &job.skip);
        if diffs.send(diff).is_err() {
            return;
        }
    }
}
