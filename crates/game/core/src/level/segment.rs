use bitflags::bitflags;

use crate::state::{Direction, GridPos};

bitflags! {
    /// Boundary exit flags of a segment template. The bit layout follows
    /// the up/right/down/left slot ordering used everywhere else.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ExitFlags: u8 {
        const UP    = 0b0001;
        const RIGHT = 0b0010;
        const DOWN  = 0b0100;
        const LEFT  = 0b1000;
    }
}

impl ExitFlags {
    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Up => ExitFlags::UP,
            Direction::Right => ExitFlags::RIGHT,
            Direction::Down => ExitFlags::DOWN,
            Direction::Left => ExitFlags::LEFT,
        }
    }

    pub fn has(self, direction: Direction) -> bool {
        self.contains(Self::from_direction(direction))
    }
}

/// Index of a placed segment within the level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentId(pub usize);

/// A fixed-size square tile template: a D×D floor mask plus boundary exit
/// flags. Templates are authored in `crawl-content`; the builder only ever
/// reads them.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SegmentTemplate {
    pub name: String,
    pub dim: i32,
    pub exits: ExitFlags,
    /// Row-major walkable mask, `dim * dim` entries, y growing upward.
    pub floor: Vec<bool>,
}

impl SegmentTemplate {
    pub fn new(name: impl Into<String>, dim: i32, exits: ExitFlags, floor: Vec<bool>) -> Self {
        debug_assert_eq!(floor.len(), (dim * dim) as usize);
        Self {
            name: name.into(),
            dim,
            exits,
            floor,
        }
    }

    pub fn exit_count(&self) -> u8 {
        self.exits.bits().count_ones() as u8
    }

    /// Walkability of the local cell `(x, y)`, both in `0..dim`.
    pub fn is_floor(&self, x: i32, y: i32) -> bool {
        if x < 0 || y < 0 || x >= self.dim || y >= self.dim {
            return false;
        }
        self.floor[(y * self.dim + x) as usize]
    }

    /// Checks whether this template can be placed in `direction` from a
    /// base segment, i.e. exposes the complementary exit back toward it.
    /// Zero-exit templates always connect: they are universal end caps.
    pub fn can_connect(&self, direction: Direction) -> bool {
        if self.exit_count() == 0 {
            return true;
        }
        self.exits.has(direction.opposite())
    }

    /// The walkable cell closest to the template center, in local
    /// coordinates. Used to site the stage objective.
    pub fn center_floor_cell(&self) -> Option<(i32, i32)> {
        let center = (self.dim - 1) / 2;
        let mut best: Option<((i32, i32), i32)> = None;
        for y in 0..self.dim {
            for x in 0..self.dim {
                if !self.is_floor(x, y) {
                    continue;
                }
                let dist = (x - center).abs() + (y - center).abs();
                if best.map_or(true, |(_, d)| dist < d) {
                    best = Some(((x, y), dist));
                }
            }
        }
        best.map(|(cell, _)| cell)
    }
}

/// A template instantiated into the world at an integer-multiple-of-D
/// offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlacedSegment {
    pub template: usize,
    /// World position of the segment's lower-left cell.
    pub offset: GridPos,
    /// No further connections will be attempted from this segment.
    pub exits_done: bool,
}

impl PlacedSegment {
    pub fn new(template: usize, offset: GridPos) -> Self {
        Self {
            template,
            offset,
            exits_done: false,
        }
    }

    /// Manhattan distance from the origin, in whole segments.
    pub fn segment_distance(&self, dim: i32) -> u32 {
        (self.offset.x / dim).unsigned_abs() + (self.offset.y / dim).unsigned_abs()
    }
}
