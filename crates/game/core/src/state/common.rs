use std::fmt;

/// Unique identifier for any agent tracked in the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentId(pub u32);

impl AgentId {
    /// Reserved identifier for the controllable player agent.
    pub const PLAYER: Self = Self(0);

    /// Returns true if this identifier represents the player.
    #[inline]
    pub const fn is_player(self) -> bool {
        self.0 == Self::PLAYER.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::PLAYER
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Discrete grid position expressed in cell coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Manhattan distance to another cell. The movement metric for the
    /// whole simulation: there is no diagonal movement.
    pub fn manhattan(self, other: GridPos) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    pub fn offset(self, dx: i32, dy: i32) -> GridPos {
        GridPos::new(self.x + dx, self.y + dy)
    }

    pub fn step(self, direction: Direction) -> GridPos {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy)
    }

    /// Classifies the offset from `self` to `other` as a unit direction.
    /// Returns `None` when the cells are not exactly one orthogonal step
    /// apart, which pathfinding treats as a graph corruption signal.
    pub fn direction_to(self, other: GridPos) -> Option<Direction> {
        match (other.x - self.x, other.y - self.y) {
            (0, 1) => Some(Direction::Up),
            (1, 0) => Some(Direction::Right),
            (0, -1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            _ => None,
        }
    }
}

impl Default for GridPos {
    fn default() -> Self {
        Self::ORIGIN
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The four cardinal unit directions. Indexable (up/right/down/left) so
/// nav-node neighbor slots and exit flags share one ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Right => (1, 0),
            Direction::Down => (0, -1),
            Direction::Left => (-1, 0),
        }
    }

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Right => Direction::Left,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
        }
    }

    /// Slot index into per-node neighbor arrays.
    pub const fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Right => 1,
            Direction::Down => 2,
            Direction::Left => 3,
        }
    }
}

/// Integer resource meter (health, ammo) tracked per agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceMeter {
    pub current: u32,
    pub maximum: u32,
}

impl ResourceMeter {
    pub fn new(current: u32, maximum: u32) -> Self {
        Self { current, maximum }
    }

    pub fn full(maximum: u32) -> Self {
        Self::new(maximum, maximum)
    }

    pub fn is_empty(self) -> bool {
        self.current == 0
    }

    /// Saturating damage application. Returns the amount actually removed.
    pub fn deplete(&mut self, amount: u32) -> u32 {
        let removed = self.current.min(amount);
        self.current -= removed;
        removed
    }

    pub fn restore(&mut self, amount: u32) {
        self.current = (self.current + amount).min(self.maximum);
    }
}

/// Player-intent signal polled once per tick while the player agent is
/// active. This is the only input surface the core consumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerIntent {
    pub direction: Option<Direction>,
    pub confirm: bool,
    pub cancel: bool,
    pub switch_weapon: bool,
    pub discard_weapon: bool,
}

impl PlayerIntent {
    pub const NONE: Self = Self {
        direction: None,
        confirm: false,
        cancel: false,
        switch_weapon: false,
        discard_weapon: false,
    };

    pub fn move_toward(direction: Direction) -> Self {
        Self {
            direction: Some(direction),
            ..Self::NONE
        }
    }

    pub fn confirm() -> Self {
        Self {
            confirm: true,
            ..Self::NONE
        }
    }
}
